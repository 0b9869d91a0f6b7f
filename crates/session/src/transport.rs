//! Transport-agnostic abstraction over the realtime conversation channel.
//!
//! The coordinator consumes the channel's contract and never defines the
//! wire format: a connector opens a channel with a credential and the
//! prompt/greeting overrides, then the channel streams a fixed set of
//! inbound event kinds and accepts volume/tool-result/close operations.

use crate::{credentials::Credential, error::SessionError};
use async_trait::async_trait;
use serde_json::Value;
use std::{fmt, sync::Arc};
use tokio::sync::mpsc;

/// Which of the two alternative transports an attempt uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Low-latency peer media channel.
    Primary,
    /// Message-socket channel, used for the single automatic retry.
    Fallback,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Primary => write!(f, "peer-media"),
            TransportKind::Fallback => write!(f, "socket"),
        }
    }
}

/// Prompt/greeting overrides handed to the channel at establish time.
/// Computed once per session and reused verbatim by the fallback attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOverrides {
    pub instructions: String,
    pub greeting: String,
    pub language: String,
}

/// Inbound events emitted by a live channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: Option<String> },
    Debug(String),
    /// Final transcription of the student's speech.
    UserTranscript(String),
    /// The agent's spoken response, transcribed.
    AgentResponse(String),
    /// In-place replacement for the agent's most recent response.
    AgentResponseCorrection(String),
    /// The agent invoked a local tool; the result must be sent back with
    /// [`RealtimeChannel::send_tool_result`].
    ToolCall {
        call_id: String,
        name: String,
        arguments: Value,
    },
}

/// A live bidirectional conversation channel.
///
/// Implementations wrap the actual media or socket machinery; the
/// coordinator only drives this surface.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn set_volume(&self, volume: f32) -> anyhow::Result<()>;

    async fn send_tool_result(&self, call_id: &str, output: &str) -> anyhow::Result<()>;

    /// Best-effort shutdown; must tolerate repeated calls and never fail.
    async fn close(&self);
}

/// A freshly opened channel plus its inbound event stream.
pub struct ChannelHandle {
    pub channel: Arc<dyn RealtimeChannel>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Opens a channel of one transport kind. The fallback (socket)
/// connector ships with this crate; the primary peer-media connector is
/// supplied by the embedding application.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(
        &self,
        credential: Credential,
        overrides: &SessionOverrides,
    ) -> Result<ChannelHandle, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kinds_display_their_mechanism() {
        assert_eq!(TransportKind::Primary.to_string(), "peer-media");
        assert_eq!(TransportKind::Fallback.to_string(), "socket");
    }
}
