//! Streaming client for the daemon's generate API.

use std::pin::pin;

use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{endpoint, normalize_base_url, TinypadConfig, GENERATE_PATH};
use crate::decoder::decode_stream;
use crate::error::OllamaError;
use crate::params::GenerationRequest;
use crate::session::CancelFlag;
use crate::DEFAULT_OLLAMA_URL;

/// One step of a generation, in the order the daemon produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// A non-empty text delta.
    Text(String),
    /// Terminal failure. Nothing follows it.
    Error(String),
    /// Terminal success. Nothing follows it.
    Complete,
}

/// Client for streaming generations from the Ollama daemon.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: reqwest::Client,
    base_url: String,
}

/// Error body returned by the daemon on non-success statuses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

impl GenerationClient {
    /// Create a new client with the default URL (localhost:11434).
    pub fn new() -> Self {
        Self::with_url(DEFAULT_OLLAMA_URL)
    }

    /// Create a new client with a custom URL.
    pub fn with_url(base_url: impl AsRef<str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(base_url.as_ref()),
        }
    }

    /// Create a client from configuration.
    pub fn from_config(config: &TinypadConfig) -> Result<Self, OllamaError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one generation, handing every event to `emit` as it happens.
    ///
    /// Exactly one terminal event ([`GenerationEvent::Error`] or
    /// [`GenerationEvent::Complete`]) is emitted, always last. Invalid
    /// requests fail before any connection is attempted. Failed streams are
    /// never retried here: part of the output may already be on screen.
    pub async fn generate<F>(&self, request: &GenerationRequest, cancel: &CancelFlag, mut emit: F)
    where
        F: FnMut(GenerationEvent),
    {
        if let Err(e) = request.validate() {
            debug!("Rejecting generation request: {}", e);
            emit(GenerationEvent::Error(e.to_string()));
            return;
        }

        match self.stream(request, cancel, &mut emit).await {
            Ok(()) => {
                info!("Generation with {} complete", request.model);
                emit(GenerationEvent::Complete);
            }
            Err(e) => {
                warn!("Generation with {} failed: {}", request.model, e);
                emit(GenerationEvent::Error(e.to_string()));
            }
        }
    }

    /// Collect a whole generation into a vector of events.
    pub async fn generate_events(
        &self,
        request: &GenerationRequest,
        cancel: &CancelFlag,
    ) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        self.generate(request, cancel, |event| events.push(event))
            .await;
        events
    }

    // The response body lives inside `chunks`, so every return from this
    // function drops the connection exactly once.
    async fn stream<F>(
        &self,
        request: &GenerationRequest,
        cancel: &CancelFlag,
        emit: &mut F,
    ) -> Result<(), OllamaError>
    where
        F: FnMut(GenerationEvent),
    {
        let url = endpoint(&self.base_url, GENERATE_PATH);
        debug!("POST {} (model {})", url, request.model);

        let response = self
            .client
            .post(&url)
            .json(&request.body())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    OllamaError::ServerNotRunning(self.base_url.clone())
                } else {
                    OllamaError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OllamaError::Api(format!(
                "{}: {}",
                status,
                api_error_message(&text)
            )));
        }

        let mut chunks = pin!(decode_stream(response.bytes_stream()));
        let mut deltas = 0usize;

        while let Some(chunk) = chunks.next().await {
            if cancel.is_cancelled() {
                debug!("Generation cancelled after {} deltas", deltas);
                return Err(OllamaError::Cancelled);
            }

            let chunk = chunk?;
            if let Some(error) = &chunk.error {
                return Err(OllamaError::Api(error.clone()));
            }
            if let Some(text) = chunk.text() {
                deltas += 1;
                emit(GenerationEvent::Text(text.to_string()));
            }
            if chunk.done {
                break;
            }
        }

        debug!("Stream ended after {} deltas", deltas);
        Ok(())
    }
}

impl Default for GenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_string(),
    }
}
