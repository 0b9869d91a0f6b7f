//! Message-socket implementation of the realtime conversation channel.
//!
//! This is the fallback transport: a WebSocket opened against a signed
//! URL. After the handshake a `configure` frame carries the session
//! overrides; from then on a bridge task proxies wire JSON into
//! [`ChannelEvent`]s and forwards volume/tool-result/close commands.

use crate::{
    credentials::Credential,
    error::SessionError,
    transport::{ChannelConnector, ChannelEvent, ChannelHandle, RealtimeChannel, SessionOverrides},
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

// --- Local wire types (for encapsulation) ---
mod wire {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Serialize, Debug)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub(super) enum ClientEvent {
        Configure {
            instructions: String,
            greeting: String,
            language: String,
        },
        SetVolume {
            value: f32,
        },
        ToolResult {
            call_id: String,
            output: String,
        },
        End,
    }

    #[derive(Deserialize, Debug)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub(super) enum ServerEvent {
        Connected,
        Disconnected {
            reason: Option<String>,
        },
        Debug {
            message: String,
        },
        UserTranscript {
            text: String,
        },
        AgentResponse {
            text: String,
        },
        AgentResponseCorrection {
            text: String,
        },
        ToolCall {
            call_id: String,
            name: String,
            #[serde(default)]
            arguments: Value,
        },
    }
}

enum Command {
    Volume(f32),
    ToolResult { call_id: String, output: String },
    Close,
}

struct SocketChannel {
    cmd_tx: mpsc::Sender<Command>,
}

#[async_trait]
impl RealtimeChannel for SocketChannel {
    async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        self.cmd_tx
            .send(Command::Volume(volume))
            .await
            .map_err(|_| anyhow::anyhow!("socket channel task has shut down"))
    }

    async fn send_tool_result(&self, call_id: &str, output: &str) -> anyhow::Result<()> {
        self.cmd_tx
            .send(Command::ToolResult {
                call_id: call_id.to_string(),
                output: output.to_string(),
            })
            .await
            .map_err(|_| anyhow::anyhow!("socket channel task has shut down"))
    }

    async fn close(&self) {
        // The bridge task may already be gone; that's a successful close.
        let _ = self.cmd_tx.send(Command::Close).await;
    }
}

fn map_event(event: wire::ServerEvent) -> ChannelEvent {
    match event {
        wire::ServerEvent::Connected => ChannelEvent::Connected,
        wire::ServerEvent::Disconnected { reason } => ChannelEvent::Disconnected { reason },
        wire::ServerEvent::Debug { message } => ChannelEvent::Debug(message),
        wire::ServerEvent::UserTranscript { text } => ChannelEvent::UserTranscript(text),
        wire::ServerEvent::AgentResponse { text } => ChannelEvent::AgentResponse(text),
        wire::ServerEvent::AgentResponseCorrection { text } => {
            ChannelEvent::AgentResponseCorrection(text)
        }
        wire::ServerEvent::ToolCall {
            call_id,
            name,
            arguments,
        } => ChannelEvent::ToolCall {
            call_id,
            name,
            arguments,
        },
    }
}

/// Connector for the socket transport. Requires a signed-URL credential.
#[derive(Default)]
pub struct SocketConnector;

impl SocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelConnector for SocketConnector {
    async fn connect(
        &self,
        credential: Credential,
        overrides: &SessionOverrides,
    ) -> Result<ChannelHandle, SessionError> {
        let url = match credential {
            Credential::SignedUrl(url) => url,
            Credential::Token(_) => {
                return Err(SessionError::Transport(
                    "the socket transport requires a signed-url credential".to_string(),
                ));
            }
        };

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::Transport(format!("socket handshake failed: {e}")))?;
        info!("Connected to realtime socket endpoint.");
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let configure = wire::ClientEvent::Configure {
            instructions: overrides.instructions.clone(),
            greeting: overrides.greeting.clone(),
            language: overrides.language.clone(),
        };
        let payload = serde_json::to_string(&configure)
            .map_err(|e| SessionError::Transport(format!("could not encode configure frame: {e}")))?;
        ws_tx
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| SessionError::Transport(format!("could not send configure frame: {e}")))?;

        let (event_tx, event_rx) = mpsc::channel(128);
        let (cmd_tx, mut cmd_rx) = mpsc::channel(32);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(command) = cmd_rx.recv() => {
                        let frame = match command {
                            Command::Volume(value) => wire::ClientEvent::SetVolume { value },
                            Command::ToolResult { call_id, output } => {
                                wire::ClientEvent::ToolResult { call_id, output }
                            }
                            Command::Close => {
                                if let Ok(payload) = serde_json::to_string(&wire::ClientEvent::End) {
                                    let _ = ws_tx.send(WsMessage::Text(payload.into())).await;
                                }
                                let _ = ws_tx.send(WsMessage::Close(None)).await;
                                break;
                            }
                        };
                        match serde_json::to_string(&frame) {
                            Ok(payload) => {
                                if let Err(e) = ws_tx.send(WsMessage::Text(payload.into())).await {
                                    error!("Error writing to realtime socket: {e}");
                                    let _ = event_tx
                                        .send(ChannelEvent::Disconnected { reason: Some(e.to_string()) })
                                        .await;
                                    break;
                                }
                            }
                            Err(e) => error!("Could not encode outbound frame: {e}"),
                        }
                    }
                    message = ws_rx.next() => match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<wire::ServerEvent>(&text) {
                                Ok(event) => {
                                    if event_tx.send(map_event(event)).await.is_err() {
                                        break;
                                    }
                                }
                                // Unknown shapes are diagnostics, never fatal.
                                Err(_) => warn!(raw = %text, "dropping unrecognized event from realtime socket"),
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            let reason = frame.map(|f| f.reason.to_string());
                            let _ = event_tx.send(ChannelEvent::Disconnected { reason }).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Error reading from realtime socket: {e}");
                            let _ = event_tx
                                .send(ChannelEvent::Disconnected { reason: Some(e.to_string()) })
                                .await;
                            break;
                        }
                        None => {
                            let _ = event_tx.send(ChannelEvent::Disconnected { reason: None }).await;
                            break;
                        }
                    },
                }
            }
            debug!("socket channel bridge finished");
        });

        Ok(ChannelHandle {
            channel: Arc::new(SocketChannel { cmd_tx }),
            events: event_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_events_deserialize_from_wire_json() {
        let event: wire::ServerEvent =
            serde_json::from_str(r#"{"type":"connected"}"#).unwrap();
        assert!(matches!(map_event(event), ChannelEvent::Connected));

        let event: wire::ServerEvent =
            serde_json::from_str(r#"{"type":"user_transcript","text":"x is two"}"#).unwrap();
        assert!(matches!(map_event(event), ChannelEvent::UserTranscript(t) if t == "x is two"));

        let event: wire::ServerEvent = serde_json::from_str(
            r#"{"type":"tool_call","call_id":"c1","name":"giveHint","arguments":{"level":2}}"#,
        )
        .unwrap();
        match map_event(event) {
            ChannelEvent::ToolCall { call_id, name, arguments } => {
                assert_eq!(call_id, "c1");
                assert_eq!(name, "giveHint");
                assert_eq!(arguments["level"], 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn tool_call_arguments_default_to_null() {
        let event: wire::ServerEvent =
            serde_json::from_str(r#"{"type":"tool_call","call_id":"c2","name":"slowDown"}"#).unwrap();
        match map_event(event) {
            ChannelEvent::ToolCall { arguments, .. } => assert!(arguments.is_null()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_shapes_fail_to_parse() {
        assert!(serde_json::from_str::<wire::ServerEvent>(r#"{"type":"telemetry","x":1}"#).is_err());
    }

    #[test]
    fn outbound_frames_carry_snake_case_tags() {
        let frame = wire::ClientEvent::ToolResult {
            call_id: "c1".to_string(),
            output: "Here's hint 2: isolate x".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"tool_result""#));
        assert!(json.contains(r#""call_id":"c1""#));

        let json = serde_json::to_string(&wire::ClientEvent::SetVolume { value: 0.5 }).unwrap();
        assert!(json.contains(r#""type":"set_volume""#));
    }
}
