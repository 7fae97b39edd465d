use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    config::HuggingFaceConfig,
    error::{HfError, Result},
    models::{
        GenerationStatus, HfErrorBody, ImageGenerationRequest, ImageGenerationResponse, ModelInfo,
    },
};

pub const DEFAULT_MODEL: &str = "runwayml/stable-diffusion-v1-5";

/// Substring the Inference API puts in the 503 error body while a model is
/// still being loaded onto a worker. Only this condition is retried.
pub const MODEL_LOADING_MARKER: &str = "is currently loading";

#[derive(Clone)]
pub struct ImageClient {
    client: Client,
    config: HuggingFaceConfig,
    status_tx: Arc<watch::Sender<GenerationStatus>>,
}

impl ImageClient {
    pub fn new(config: HuggingFaceConfig) -> Self {
        let (status_tx, _) = watch::channel(GenerationStatus::Idle);
        Self {
            client: Client::new(),
            config,
            status_tx: Arc::new(status_tx),
        }
    }

    /// Watch the progress of in-flight submissions. The interesting value is
    /// `WarmingUp`, which holds for the whole backoff wait.
    pub fn subscribe(&self) -> watch::Receiver<GenerationStatus> {
        self.status_tx.subscribe()
    }

    pub fn supported_models() -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "runwayml/stable-diffusion-v1-5".to_string(),
                name: "Stable Diffusion v1.5".to_string(),
                provider: "RunwayML".to_string(),
            },
            ModelInfo {
                id: "stabilityai/stable-diffusion-2-1".to_string(),
                name: "Stable Diffusion v2.1".to_string(),
                provider: "Stability AI".to_string(),
            },
        ]
    }

    pub async fn generate(&self, request: ImageGenerationRequest) -> Result<ImageGenerationResponse> {
        self.generate_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Runs one submission to completion. The request body is serialized
    /// once and resent unchanged on every warmup retry. Exactly one outcome
    /// is produced; cancelling during a backoff wait yields `Cancelled` and
    /// stops further requests.
    pub async fn generate_with_cancel(
        &self,
        request: ImageGenerationRequest,
        cancel: CancellationToken,
    ) -> Result<ImageGenerationResponse> {
        // Precondition failures still publish `Done` so subscribers waiting
        // on the status channel observe a terminal transition.
        let token = match self
            .config
            .api_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
        {
            Some(token) => token,
            None => {
                self.set_status(GenerationStatus::Done);
                return Err(HfError::ConfigError("API token not configured".into()));
            }
        };

        if request.prompt.trim().is_empty() {
            self.set_status(GenerationStatus::Done);
            return Err(HfError::ValidationError("prompt must not be empty".into()));
        }

        let model_id = request.model_id.as_deref().unwrap_or(DEFAULT_MODEL);
        let url = format!("{}/{}", self.config.base_url, model_id);
        let payload = request.payload();
        let max_retries = self.config.max_retries;

        // Retries already spent. Bounded loop rather than re-submission so
        // the attempt budget is explicit.
        let mut attempt: u32 = 0;

        loop {
            self.set_status(GenerationStatus::Requesting);
            log::info!(
                "Generating image with model: {} (attempt {}/{})",
                model_id,
                attempt + 1,
                max_retries + 1
            );

            let response = self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    self.set_status(GenerationStatus::Done);
                    HfError::RequestError(e.to_string())
                })?;

            let status = response.status();
            if status.is_success() {
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);

                let bytes = response.bytes().await.map_err(|e| {
                    self.set_status(GenerationStatus::Done);
                    HfError::ResponseError(e.to_string())
                })?;

                log::info!("Received {} image bytes from {}", bytes.len(), model_id);
                self.set_status(GenerationStatus::Done);
                return Ok(ImageGenerationResponse {
                    image_data: bytes.to_vec(),
                    content_type,
                    model: model_id.to_string(),
                });
            }

            let status_text = status.canonical_reason().unwrap_or("unknown status");
            let body = response.text().await.unwrap_or_default();
            let error_body: Option<HfErrorBody> = serde_json::from_str(&body).ok();

            let model_loading = status == StatusCode::SERVICE_UNAVAILABLE
                && error_body
                    .as_ref()
                    .and_then(|b| b.error.as_deref())
                    .is_some_and(|msg| msg.contains(MODEL_LOADING_MARKER));

            if !model_loading {
                self.set_status(GenerationStatus::Done);
                return Err(HfError::ProviderError(format!(
                    "{} {} - {}",
                    status.as_u16(),
                    status_text,
                    body
                )));
            }

            if attempt >= max_retries {
                self.set_status(GenerationStatus::Done);
                return Err(HfError::WarmupExhausted(format!(
                    "model {} never finished loading after {} attempts: {} {} - {}",
                    model_id,
                    attempt + 1,
                    status.as_u16(),
                    status_text,
                    body
                )));
            }

            if let Some(estimate) = error_body.as_ref().and_then(|b| b.estimated_time) {
                log::debug!("Provider estimates {:.0}s until {} is ready", estimate, model_id);
            }

            attempt += 1;
            self.set_status(GenerationStatus::WarmingUp { attempt });
            log::warn!(
                "Model {} is still loading, retrying in {:?} ({}/{})",
                model_id,
                self.config.retry_delay,
                attempt,
                max_retries
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Generation for {} cancelled during warmup wait", model_id);
                    self.set_status(GenerationStatus::Done);
                    return Err(HfError::Cancelled);
                }
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }
    }

    fn set_status(&self, status: GenerationStatus) {
        self.status_tx.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL_PATH: &str = "/runwayml/stable-diffusion-v1-5";
    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

    fn loading_body() -> serde_json::Value {
        serde_json::json!({
            "error": "Model runwayml/stable-diffusion-v1-5 is currently loading",
            "estimated_time": 20.0
        })
    }

    fn test_client(server: &MockServer) -> ImageClient {
        ImageClient::new(
            HuggingFaceConfig::new()
                .with_token("hf_test")
                .with_base_url(server.uri())
                .with_retry_delay(Duration::from_millis(100)),
        )
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap_or_default().len()
    }

    #[tokio::test]
    async fn blank_prompt_never_reaches_the_network() {
        let server = MockServer::start().await;
        let client = test_client(&server);
        let status_rx = client.subscribe();

        let result = client
            .generate(ImageGenerationRequest::new("   \t\n"))
            .await;

        assert!(matches!(result, Err(HfError::ValidationError(_))));
        assert_eq!(request_count(&server).await, 0);
        // Subscribers still see a terminal transition.
        assert_eq!(*status_rx.borrow(), GenerationStatus::Done);
    }

    #[tokio::test]
    async fn missing_token_never_reaches_the_network() {
        let server = MockServer::start().await;
        let client = ImageClient::new(HuggingFaceConfig::new().with_base_url(server.uri()));
        let status_rx = client.subscribe();

        let result = client.generate(ImageGenerationRequest::new("a fox")).await;

        assert!(matches!(result, Err(HfError::ConfigError(_))));
        assert_eq!(request_count(&server).await, 0);
        assert_eq!(*status_rx.borrow(), GenerationStatus::Done);
    }

    #[tokio::test]
    async fn transport_failures_surface_immediately() {
        // Discard port, nothing listening: the connection is refused before
        // any provider response exists.
        let client = ImageClient::new(
            HuggingFaceConfig::new()
                .with_token("hf_test")
                .with_base_url("http://127.0.0.1:9")
                .with_retry_delay(Duration::from_millis(10)),
        );

        let result = client.generate(ImageGenerationRequest::new("a fox")).await;

        assert!(matches!(result, Err(HfError::RequestError(_))));
    }

    #[tokio::test]
    async fn sends_bearer_auth_and_inference_parameters() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(header("authorization", "Bearer hf_test"))
            .and(body_partial_json(serde_json::json!({
                "inputs": "a fox",
                "parameters": {
                    "num_inference_steps": 50,
                    "guidance_scale": 7.5,
                    "height": 512,
                    "width": 512
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(PNG_MAGIC, "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let response = client.generate(ImageGenerationRequest::new("a fox")).await.unwrap();

        assert_eq!(response.image_data, PNG_MAGIC);
        assert_eq!(response.content_type.as_deref(), Some("image/png"));
        assert_eq!(response.model, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn retries_through_warmup_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_json(loading_body()))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw(PNG_MAGIC, "image/png"))
            .mount(&server)
            .await;

        let client = test_client(&server);

        let mut status_rx = client.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_writer = Arc::clone(&seen);
        let watcher = tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = status_rx.borrow_and_update().clone();
                let done = status == GenerationStatus::Done;
                seen_writer.lock().unwrap().push(status);
                if done {
                    break;
                }
            }
        });

        let response = client.generate(ImageGenerationRequest::new("a fox")).await.unwrap();
        watcher.await.unwrap();

        assert_eq!(response.image_data, PNG_MAGIC);
        assert_eq!(request_count(&server).await, 3);

        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(GenerationStatus::is_warming_up));
        assert_eq!(seen.last(), Some(&GenerationStatus::Done));
    }

    #[tokio::test]
    async fn warmup_exhaustion_is_a_distinct_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_json(loading_body()))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client.generate(ImageGenerationRequest::new("a fox")).await;

        // 1 initial request + 3 retries
        assert_eq!(request_count(&server).await, 4);
        match result {
            Err(HfError::WarmupExhausted(msg)) => {
                assert!(msg.contains("never finished loading"));
                assert!(msg.contains("4 attempts"));
                assert!(msg.contains("is currently loading"));
            }
            other => panic!("expected WarmupExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_warmup_errors_are_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "internal"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client.generate(ImageGenerationRequest::new("a fox")).await;

        assert_eq!(request_count(&server).await, 1);
        match result {
            Err(HfError::ProviderError(msg)) => assert!(msg.contains("internal")),
            other => panic!("expected ProviderError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_503_without_loading_marker_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client.generate(ImageGenerationRequest::new("a fox")).await;

        assert_eq!(request_count(&server).await, 1);
        assert!(matches!(result, Err(HfError::ProviderError(_))));
    }

    #[tokio::test]
    async fn backoff_waits_without_blocking_concurrent_work() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_json(loading_body()))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw(PNG_MAGIC, "image/png"))
            .mount(&server)
            .await;

        let delay = Duration::from_millis(200);
        let client = ImageClient::new(
            HuggingFaceConfig::new()
                .with_token("hf_test")
                .with_base_url(server.uri())
                .with_retry_delay(delay),
        );

        let ticks = Arc::new(AtomicU32::new(0));
        let ticks_writer = Arc::clone(&ticks);
        let ticker = async move {
            for _ in 0..10 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ticks_writer.fetch_add(1, Ordering::SeqCst);
            }
        };

        let ticks_reader = Arc::clone(&ticks);
        let generation = async {
            let result = client.generate(ImageGenerationRequest::new("a fox")).await;
            (result, ticks_reader.load(Ordering::SeqCst))
        };

        let started = Instant::now();
        let ((result, ticks_at_completion), ()) = tokio::join!(generation, ticker);
        let elapsed = started.elapsed();

        assert!(result.is_ok());
        // Two backoff waits at minimum.
        assert!(elapsed >= delay * 2, "elapsed {elapsed:?} shorter than two delays");
        // The ticker made progress while the client waited.
        assert!(
            ticks_at_completion >= 5,
            "only {ticks_at_completion} ticks ran during the backoff waits"
        );
    }

    #[tokio::test]
    async fn cancellation_during_backoff_stops_retrying() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_json(loading_body()))
            .mount(&server)
            .await;

        let client = ImageClient::new(
            HuggingFaceConfig::new()
                .with_token("hf_test")
                .with_base_url(server.uri())
                .with_retry_delay(Duration::from_secs(5)),
        );

        let cancel = CancellationToken::new();
        let handle = {
            let client = client.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                client
                    .generate_with_cancel(ImageGenerationRequest::new("a fox"), cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let result = handle.await.unwrap();

        assert!(matches!(result, Err(HfError::Cancelled)));
        assert_eq!(request_count(&server).await, 1);
    }

    #[test]
    fn catalog_lists_both_checkpoints() {
        let models = ImageClient::supported_models();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, DEFAULT_MODEL);
        assert!(models.iter().all(|m| !m.name.is_empty()));
    }
}
