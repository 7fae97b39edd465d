pub mod image_client;

use crate::config::HuggingFaceConfig;

pub use image_client::ImageClient;

/// Top-level handle for the Hugging Face Inference API.
#[derive(Clone)]
pub struct HfClient {
    image_client: ImageClient,
}

impl HfClient {
    pub fn new(config: HuggingFaceConfig) -> Self {
        Self {
            image_client: ImageClient::new(config),
        }
    }

    pub fn image(&self) -> &ImageClient {
        &self.image_client
    }
}
