//! Ollama client core for Tinypad.
//!
//! This crate talks to a local Ollama daemon: it keeps the daemon available,
//! lists its models, and streams generations back to a single foreground
//! consumer without ever blocking it.
//!
//! ```text
//! ┌──────────────┐  submit   ┌────────────────────┐  POST /api/generate  ┌────────┐
//! │  Foreground  │ --------> │ RequestCoordinator │ -------------------> │ Ollama │
//! │  (Consumer)  │           │  GenerationClient  │ <--- NDJSON chunks - │ daemon │
//! └──────────────┘           │    ChunkDecoder    │                      └────────┘
//!        ^                   └────────────────────┘                          ^
//!        │ UiEvents                    │                                     │
//!        └──────── Dispatcher <────────┴──── AvailabilitySupervisor ─────────┘
//!                                            ModelCatalog
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use tinypad_ollama::{dispatch, AvailabilitySupervisor, GenerationClient, ModelCatalog,
//!     RequestCoordinator, SamplingInput, TinypadConfig};
//!
//! let config = TinypadConfig::from_env();
//! let (dispatcher, mut events) = dispatch::channel();
//!
//! AvailabilitySupervisor::from_config(&config).spawn(dispatcher.clone());
//! ModelCatalog::from_config(&config)?.spawn_load(&config.default_model, dispatcher.clone());
//!
//! let coordinator = RequestCoordinator::new(GenerationClient::from_config(&config)?, dispatcher);
//! coordinator.submit("Why is the sky blue?", "llama3.2", &SamplingInput::default())?;
//!
//! while let Some(event) = events.recv().await {
//!     event.apply(&mut my_consumer);
//! }
//! ```

mod catalog;
mod client;
mod config;
mod coordinator;
mod decoder;
pub mod dispatch;
mod error;
mod params;
mod session;
mod supervisor;

pub use catalog::{ModelCatalog, ModelList};
pub use client::{GenerationClient, GenerationEvent};
pub use config::{normalize_base_url, SupervisorConfig, TinypadConfig, TinypadConfigBuilder};
pub use coordinator::RequestCoordinator;
pub use decoder::{decode_stream, ChunkDecoder, GenerationChunk};
pub use dispatch::{Consumer, Dispatcher, UiEvent, UiEvents};
pub use error::{OllamaError, SubmitError, ValidationError};
pub use params::{
    parse_stop_sequences, GenerationRequest, SamplingInput, SamplingParams, SAMPLING_FIELDS,
};
pub use session::{CancelFlag, Session, SessionSlot};
pub use supervisor::{
    AvailabilitySupervisor, CommandLauncher, DaemonLauncher, HealthProbe, HttpProbe,
    ServiceStatus, Sleeper, StatusReport, SupervisorOutcome, TokioSleeper,
};

/// Default Ollama server URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Model used when the daemon lists none.
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Program started when the daemon is not running.
pub const DEFAULT_DAEMON_PROGRAM: &str = "ollama";
