//! Credential acquisition and transport establishment.

use crate::{
    credentials::CredentialProvider,
    error::SessionError,
    transport::{ChannelConnector, ChannelHandle, RealtimeChannel, SessionOverrides, TransportKind},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Obtains a credential and opens one of the two alternative transports.
///
/// At most one `establish` runs at a time; a previously opened channel
/// is always torn down (best-effort) and given a short settling delay
/// before the next attempt touches the network.
pub struct TransportNegotiator {
    credentials: Arc<dyn CredentialProvider>,
    primary: Arc<dyn ChannelConnector>,
    fallback: Arc<dyn ChannelConnector>,
    settle_delay: Duration,
    // Holding this lock for the whole of establish() is what serializes
    // concurrent attempts.
    active: Mutex<Option<Arc<dyn RealtimeChannel>>>,
}

impl TransportNegotiator {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        primary: Arc<dyn ChannelConnector>,
        fallback: Arc<dyn ChannelConnector>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            credentials,
            primary,
            fallback,
            settle_delay,
            active: Mutex::new(None),
        }
    }

    /// Issues a credential, then opens the matching transport with the
    /// supplied overrides. Credential failure aborts without touching
    /// the transport.
    pub async fn establish(
        &self,
        kind: TransportKind,
        overrides: &SessionOverrides,
    ) -> Result<ChannelHandle, SessionError> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!("tearing down previous channel before reconnecting");
            previous.close().await;
            tokio::time::sleep(self.settle_delay).await;
        }

        let credential = self.credentials.issue(kind).await?;
        info!(transport = %kind, "credential issued; opening channel");

        let connector = match kind {
            TransportKind::Primary => &self.primary,
            TransportKind::Fallback => &self.fallback,
        };
        let handle = connector.connect(credential, overrides).await?;
        *active = Some(handle.channel.clone());
        Ok(handle)
    }

    /// Closes the active channel if any. Safe to call at any time, in
    /// any state, repeatedly.
    pub async fn teardown(&self) {
        if let Some(channel) = self.active.lock().await.take() {
            channel.close().await;
        }
    }
}
