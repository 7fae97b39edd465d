use thiserror::Error;

#[derive(Debug, Error)]
pub enum HfError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Response error: {0}")]
    ResponseError(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Model warmup exhausted: {0}")]
    WarmupExhausted(String),
    #[error("Generation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, HfError>;
