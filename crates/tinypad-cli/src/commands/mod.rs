//! CLI commands.

use clap::Args;
use tinypad_ollama::SamplingInput;

pub mod chat;
pub mod generate;
pub mod models;
pub mod status;

/// Sampling flags. Values stay text here and are parsed per submission, so a
/// bad value is reported the same way as one typed with `/set`.
#[derive(Debug, Default, Args)]
pub(crate) struct SamplingArgs {
    /// Sampling temperature [default: 0.7]
    #[arg(long)]
    temperature: Option<String>,

    /// Nucleus sampling probability [default: 0.9]
    #[arg(long)]
    top_p: Option<String>,

    /// Top-k cutoff [default: 40]
    #[arg(long)]
    top_k: Option<String>,

    /// Repeat penalty [default: 1.0]
    #[arg(long)]
    repeat_penalty: Option<String>,

    /// Presence penalty [default: 0.0]
    #[arg(long, allow_hyphen_values = true)]
    presence_penalty: Option<String>,

    /// Frequency penalty [default: 0.0]
    #[arg(long, allow_hyphen_values = true)]
    frequency_penalty: Option<String>,

    /// Stop sequences, comma-separated
    #[arg(long)]
    stop: Option<String>,
}

impl SamplingArgs {
    pub(crate) fn into_input(self) -> SamplingInput {
        let mut input = SamplingInput::default();
        let overrides = [
            ("temperature", self.temperature),
            ("top_p", self.top_p),
            ("top_k", self.top_k),
            ("repeat_penalty", self.repeat_penalty),
            ("presence_penalty", self.presence_penalty),
            ("frequency_penalty", self.frequency_penalty),
            ("stop", self.stop),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                input.set(field, value);
            }
        }
        input
    }
}
