//! Fire-and-forget notifications published toward other UI regions.
//!
//! The coordinator only publishes; nothing in this crate subscribes. The
//! bus is injected at construction so side effects stay observable in
//! tests instead of flowing through a hidden global.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// The student asked for an easier exercise.
    RequestEasier,
    /// The student asked for a harder exercise.
    RequestHarder,
    /// A worked solution should be displayed.
    ShowSolution,
    /// A stored hint was surfaced; `hint_number` is 1-based.
    HintShown { hint_number: usize },
    AnswerCorrect,
    AnswerIncorrect,
}

pub trait EventBus: Send + Sync {
    fn publish(&self, event: AppEvent);
}

impl EventBus for broadcast::Sender<AppEvent> {
    fn publish(&self, event: AppEvent) {
        if self.send(event).is_err() {
            tracing::debug!("no event subscribers; notification dropped");
        }
    }
}

/// Discards every event; for hosts that do their own bookkeeping.
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&self, _event: AppEvent) {}
}
