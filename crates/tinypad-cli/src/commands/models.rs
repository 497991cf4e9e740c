//! Models command - list what the daemon has installed.

use tinypad_ollama::{ModelCatalog, TinypadConfig};

pub(crate) async fn run(config: &TinypadConfig) -> miette::Result<()> {
    let catalog = ModelCatalog::from_config(config)
        .map_err(|e| miette::miette!("Failed to create HTTP client: {}", e))?;

    let models = match catalog.fetch().await {
        Ok(models) => models,
        Err(e) => {
            eprintln!("Could not list models: {}", e);
            Default::default()
        }
    };

    if models.is_empty() {
        println!("No models listed.");
        println!();
        println!("Tinypad will use the default model: {}", config.default_model);
        println!("To install it, run:");
        println!("  ollama pull {}", config.default_model);
        return Ok(());
    }

    println!("Installed models:");
    for (i, model) in models.iter().enumerate() {
        if i == 0 {
            println!("  - {} (selected by default)", model);
        } else {
            println!("  - {}", model);
        }
    }

    Ok(())
}
