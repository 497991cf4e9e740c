//! Generate command - one prompt, reply streamed to stdout.

use std::io::Write;

use tinypad_ollama::{
    CancelFlag, GenerationClient, GenerationEvent, GenerationRequest, ModelCatalog,
    SamplingInput, TinypadConfig,
};

pub(crate) async fn run(
    config: &TinypadConfig,
    model: Option<&str>,
    prompt: &str,
    sampling: &SamplingInput,
) -> miette::Result<()> {
    let params = sampling
        .parse()
        .map_err(|e| miette::miette!("Parameter error: {}", e))?;

    let model = match model {
        Some(model) => model.to_string(),
        None => {
            let catalog = ModelCatalog::from_config(config)
                .map_err(|e| miette::miette!("Failed to create HTTP client: {}", e))?;
            let models = catalog.list_models().await.or_default(&config.default_model);
            models
                .first()
                .unwrap_or(config.default_model.as_str())
                .to_string()
        }
    };

    let client = GenerationClient::from_config(config)
        .map_err(|e| miette::miette!("Failed to create HTTP client: {}", e))?;
    let request = GenerationRequest::new(model, prompt, params);

    let mut stdout = std::io::stdout().lock();
    let mut failure = None;
    client
        .generate(&request, &CancelFlag::new(), |event| match event {
            GenerationEvent::Text(text) => {
                let _ = write!(stdout, "{}", text);
                let _ = stdout.flush();
            }
            GenerationEvent::Complete => {
                let _ = writeln!(stdout);
            }
            GenerationEvent::Error(e) => failure = Some(e),
        })
        .await;

    match failure {
        Some(e) => Err(miette::miette!("Generation failed: {}", e)),
        None => Ok(()),
    }
}
