//! Failure taxonomy surfaced by the session coordinator.
//!
//! Tool-handler failures never appear here: the tool router converts
//! them into spoken fallback strings before they reach any boundary.
//! Unrecognized inbound events are logged and dropped at the transport
//! layer and likewise never become an error value.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Microphone access was denied by the platform or the user.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The credential service could not issue a token or signed URL.
    #[error("credential issuance failed: {0}")]
    Credential(String),

    /// The transport handshake failed or the channel dropped.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl SessionError {
    /// Whether calling `start()` again can reasonably succeed.
    /// Microphone denial is terminal until the surrounding platform
    /// grants access; both transports need the same permission.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SessionError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_permission_denial_is_non_retryable() {
        assert!(!SessionError::PermissionDenied.is_retryable());
        assert!(SessionError::Credential("no token".into()).is_retryable());
        assert!(SessionError::Transport("dropped".into()).is_retryable());
    }

    #[test]
    fn display_messages_name_the_failure() {
        assert_eq!(
            SessionError::PermissionDenied.to_string(),
            "microphone permission denied"
        );
        assert_eq!(
            SessionError::Credential("expired key".into()).to_string(),
            "credential issuance failed: expired key"
        );
    }
}
