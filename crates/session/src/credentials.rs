//! Client for the external credential service.

use crate::{config::SessionConfig, error::SessionError, transport::TransportKind};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Credential material issued per transport kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Short-lived direct token for the peer-media transport.
    Token(String),
    /// Signed URL for the socket transport.
    SignedUrl(String),
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtains the credential for one connection attempt. Failure means
    /// the attempt is aborted before the transport is touched.
    async fn issue(&self, kind: TransportKind) -> Result<Credential, SessionError>;
}

/// `CredentialProvider` talking HTTP to the token service.
pub struct HttpCredentialProvider {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlResponse {
    signed_url: String,
}

impl HttpCredentialProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.credential_base_url.clone())
    }
}

fn credential_error(error: reqwest::Error) -> SessionError {
    SessionError::Credential(error.to_string())
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn issue(&self, kind: TransportKind) -> Result<Credential, SessionError> {
        debug!(transport = %kind, "requesting credential");
        match kind {
            TransportKind::Primary => {
                let response = self
                    .http
                    .post(format!("{}/realtime/token", self.base_url))
                    .send()
                    .await
                    .map_err(credential_error)?
                    .error_for_status()
                    .map_err(credential_error)?;
                let body: TokenResponse = response.json().await.map_err(credential_error)?;
                Ok(Credential::Token(body.token))
            }
            TransportKind::Fallback => {
                let response = self
                    .http
                    .post(format!("{}/realtime/signed-url", self.base_url))
                    .send()
                    .await
                    .map_err(credential_error)?
                    .error_for_status()
                    .map_err(credential_error)?;
                let body: SignedUrlResponse = response.json().await.map_err(credential_error)?;
                Ok(Credential::SignedUrl(body.signed_url))
            }
        }
    }
}
