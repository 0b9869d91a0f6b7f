//! Handoff of the finished transcript to the persistence collaborator.

use async_trait::async_trait;
use viva_core::transcript::TranscriptMessage;

/// Receives the ordered transcript once at session end. The controller
/// calls this fire-and-forget; a failure is logged and never blocks
/// teardown.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn persist(
        &self,
        subtopic_label: &str,
        transcript: Vec<TranscriptMessage>,
    ) -> anyhow::Result<()>;
}

/// Discards transcripts; for tests and hosts that do their own storage.
pub struct NullSink;

#[async_trait]
impl TranscriptSink for NullSink {
    async fn persist(
        &self,
        subtopic_label: &str,
        transcript: Vec<TranscriptMessage>,
    ) -> anyhow::Result<()> {
        tracing::debug!(
            subtopic = subtopic_label,
            messages = transcript.len(),
            "transcript discarded by NullSink"
        );
        Ok(())
    }
}
