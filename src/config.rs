use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/models";

/// Retries after the first attempt, so a fully cold model costs
/// `1 + DEFAULT_MAX_RETRIES` requests before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed wait between warmup retries. The provider reports an
/// `estimated_time` but the client does not scale on it.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub api_token: Option<String>,
    pub base_url: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        HuggingFaceConfig {
            api_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl HuggingFaceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let api_token = env::var("HUGGING_FACE_API_KEY").ok();
        let base_url = env::var("HF_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        HuggingFaceConfig {
            api_token,
            base_url,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_token(mut self, api_token: impl Into<String>) -> Self {
        self.api_token = Some(api_token.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        self.base_url = base_url;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}
