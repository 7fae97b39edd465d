use hfgen::{HfClient, HuggingFaceConfig, ImageClient, ImageGenerationRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match dotenv::dotenv() {
        Ok(_) => log::info!(".env file loaded successfully"),
        Err(_) => log::warn!("No .env file found, using system environment variables"),
    }

    hfgen::logger::init_with_config(
        hfgen::logger::LoggerConfig::development().with_level(hfgen::logger::LogLevel::Debug),
    )?;

    let config = HuggingFaceConfig::from_env();
    if config.api_token.is_none() {
        log::error!("HUGGING_FACE_API_KEY is not set; generation requests will fail");
        log::info!("Create a token at https://huggingface.co/settings/tokens");
    }

    let client = HfClient::new(config);

    log::info!("Available image generation models:");
    for model in ImageClient::supported_models() {
        log::info!("  {} - {} ({})", model.id, model.name, model.provider);
    }

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "A serene landscape with mountains and a lake at sunset, digital art style".to_string());

    for model in ImageClient::supported_models() {
        log::info!("Generating with model: {}", model.id);

        // Warmup progress, so cold starts are visible while we wait.
        let mut status_rx = client.image().subscribe();
        let progress = tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = status_rx.borrow_and_update().clone();
                if status.is_warming_up() {
                    log::info!("Model is warming up, waiting before retrying...");
                }
                if status == hfgen::GenerationStatus::Done {
                    break;
                }
            }
        });

        let request = ImageGenerationRequest::new(prompt.clone()).with_model(model.id.clone());
        match client.image().generate(request).await {
            Ok(response) => {
                log::info!("Image generation successful with {}", model.id);
                log::info!("Received {} bytes ({})", response.len(), response.content_type.as_deref().unwrap_or("unknown content type"));

                let filename = format!(
                    "generated_image_{}_{}.png",
                    model.id.replace(['/', '.'], "_"),
                    chrono::Utc::now().timestamp()
                );
                match response.save(&filename) {
                    Ok(_) => log::info!("Image saved to: {}", filename),
                    Err(e) => log::error!("Failed to save image: {}", e),
                }
            }
            Err(e) => {
                log::error!("Image generation failed with {}: {}", model.id, e);
            }
        }

        progress.abort();
        log::info!("---");
    }

    Ok(())
}
