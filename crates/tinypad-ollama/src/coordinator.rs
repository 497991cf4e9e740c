//! Prompt submission: one generation at a time, delivered through the dispatcher.

use tracing::{debug, info};

use crate::client::{GenerationClient, GenerationEvent};
use crate::dispatch::Dispatcher;
use crate::error::SubmitError;
use crate::params::{GenerationRequest, SamplingInput};
use crate::session::SessionSlot;

/// Glues user submissions to the generation client.
#[derive(Debug, Clone)]
pub struct RequestCoordinator {
    client: GenerationClient,
    dispatcher: Dispatcher,
    slot: SessionSlot,
}

impl RequestCoordinator {
    pub fn new(client: GenerationClient, dispatcher: Dispatcher) -> Self {
        Self {
            client,
            dispatcher,
            slot: SessionSlot::new(),
        }
    }

    /// Whether a generation is currently running.
    pub fn is_busy(&self) -> bool {
        self.slot.is_active()
    }

    /// Ask the running generation to stop. Returns `false` if none is running.
    pub fn cancel(&self) -> bool {
        self.slot.cancel_active()
    }

    /// Submit a prompt.
    ///
    /// Rejected submissions produce no output at all. Accepted ones echo the
    /// prompt and model label right away, then stream the reply on a
    /// background task and end with [`UiEvent::GenerationFinished`]. Must be
    /// called from within a tokio runtime.
    ///
    /// [`UiEvent::GenerationFinished`]: crate::dispatch::UiEvent::GenerationFinished
    pub fn submit(
        &self,
        prompt: &str,
        model: &str,
        sampling: &SamplingInput,
    ) -> Result<(), SubmitError> {
        let shown = prompt.trim();
        if shown.is_empty() {
            return Err(SubmitError::BlankPrompt);
        }

        let session = self.slot.try_begin().ok_or(SubmitError::Busy)?;
        info!("Session {} started with model {}", session.id(), model);

        self.dispatcher.append(format!("\nUser: {}\n", shown));
        self.dispatcher.append(format!("Model ({}): ", model));

        let params = match sampling.parse() {
            Ok(params) => params,
            Err(e) => {
                debug!("Session {} rejected: {}", session.id(), e);
                self.dispatcher
                    .append(format!("\n[Parameter error: {}]\n", e));
                drop(session);
                self.dispatcher.generation_finished();
                return Ok(());
            }
        };

        let request = GenerationRequest::new(model, prompt, params);
        let client = self.client.clone();
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            let cancel = session.cancel_flag().clone();
            client
                .generate(&request, &cancel, |event| match event {
                    GenerationEvent::Text(text) => {
                        dispatcher.append(text);
                    }
                    GenerationEvent::Complete => {
                        dispatcher.append("\n");
                    }
                    GenerationEvent::Error(e) => {
                        dispatcher.append(format!("\n[Ollama error: {}]\n", e));
                    }
                })
                .await;

            debug!("Session {} finished", session.id());
            // Free the slot before announcing it so the consumer can submit
            // again as soon as it sees the signal.
            drop(session);
            dispatcher.generation_finished();
        });

        Ok(())
    }
}
