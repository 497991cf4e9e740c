//! Status command - check the daemon, starting it when absent.

use tinypad_ollama::{AvailabilitySupervisor, ServiceStatus, TinypadConfig};

pub(crate) async fn run(config: &TinypadConfig, no_start: bool) -> miette::Result<()> {
    println!("Ollama at {}", config.base_url);

    let supervisor = AvailabilitySupervisor::from_config(config);
    let print = |report: tinypad_ollama::StatusReport| println!("  {}", report.message());

    let outcome = if no_start {
        supervisor.check(print).await
    } else {
        supervisor.run(print).await
    };

    if let Some(e) = outcome.spawn_error {
        return Err(miette::miette!(
            "{}\nInstall Ollama or set TINYPAD_OLLAMA_BIN to its path.",
            e
        ));
    }

    match outcome.status {
        ServiceStatus::Running => Ok(()),
        status => Err(miette::miette!("{}", status)),
    }
}
