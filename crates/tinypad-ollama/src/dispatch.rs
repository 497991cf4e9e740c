//! Delivery of background results to the foreground consumer.
//!
//! Background tasks never touch display state. They push [`UiEvent`]s into a
//! [`Dispatcher`]; the foreground owns the matching [`UiEvents`] receiver and
//! applies events to its [`Consumer`] on its own schedule. The channel is
//! FIFO per sender, so one generation's deltas arrive in stream order.

use tokio::sync::mpsc;
use tracing::debug;

use crate::catalog::ModelList;

/// Something the foreground should show.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Status(String),
    Append(String),
    ModelsLoaded(ModelList),
    /// The active generation has ended and a new submission will be accepted.
    GenerationFinished,
}

impl UiEvent {
    /// Hand this event to the consumer.
    pub fn apply<C: Consumer + ?Sized>(self, consumer: &mut C) {
        match self {
            UiEvent::Status(text) => consumer.set_status(&text),
            UiEvent::Append(text) => consumer.append_text(&text),
            UiEvent::ModelsLoaded(models) => consumer.models_loaded(&models),
            UiEvent::GenerationFinished => consumer.generation_finished(),
        }
    }
}

/// The display side: text output, a status line and a model picker.
pub trait Consumer {
    fn append_text(&mut self, text: &str);

    fn set_status(&mut self, text: &str);

    fn models_loaded(&mut self, models: &ModelList);

    fn generation_finished(&mut self) {}
}

/// Thread-safe sending half. Cheap to clone into background tasks.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<UiEvent>,
}

/// Foreground receiving half.
#[derive(Debug)]
pub struct UiEvents {
    rx: mpsc::UnboundedReceiver<UiEvent>,
}

/// Create a connected dispatcher/receiver pair.
pub fn channel() -> (Dispatcher, UiEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Dispatcher { tx }, UiEvents { rx })
}

impl Dispatcher {
    /// Queue an event. Returns `false` once the foreground has gone away.
    pub fn send(&self, event: UiEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                debug!("Foreground closed, dropping {:?}", event);
                false
            }
        }
    }

    pub fn status(&self, text: impl Into<String>) -> bool {
        self.send(UiEvent::Status(text.into()))
    }

    pub fn append(&self, text: impl Into<String>) -> bool {
        self.send(UiEvent::Append(text.into()))
    }

    pub fn models_loaded(&self, models: ModelList) -> bool {
        self.send(UiEvent::ModelsLoaded(models))
    }

    pub fn generation_finished(&self) -> bool {
        self.send(UiEvent::GenerationFinished)
    }
}

impl UiEvents {
    /// Wait for the next event; `None` once every dispatcher is dropped.
    pub async fn recv(&mut self) -> Option<UiEvent> {
        self.rx.recv().await
    }

    /// Next event if one is queued.
    pub fn try_recv(&mut self) -> Option<UiEvent> {
        self.rx.try_recv().ok()
    }

    /// Apply every queued event without waiting. Suits an idle or timer
    /// callback in a foreground loop. Returns the number applied.
    pub fn drain_into<C: Consumer + ?Sized>(&mut self, consumer: &mut C) -> usize {
        let mut applied = 0;
        while let Some(event) = self.try_recv() {
            event.apply(consumer);
            applied += 1;
        }
        applied
    }
}
