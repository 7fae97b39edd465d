pub mod config;
pub mod error;
pub mod huggingface;
pub mod logger;
pub mod models;

pub use config::HuggingFaceConfig;
pub use error::{HfError, Result};
pub use huggingface::{HfClient, ImageClient};
pub use models::*;
