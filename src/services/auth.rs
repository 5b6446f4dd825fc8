use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

/// Header carrying the stored session token.
pub const SESSION_HEADER: &str = "x-tryon-session";

/// Where the credential attached to a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Short-lived bearer token issued by the embedding platform bridge.
    BridgeToken,
    /// Session token stored from a previous login.
    StoredSession,
    /// No credential; the request goes out anonymous.
    None,
}

/// A resolved credential ready to be attached to one request.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: Option<String>,
    pub source: CredentialSource,
}

/// Supplies short-lived bearer tokens from an embedding platform bridge.
///
/// Implementations are expected to return a fresh token on every call;
/// the client never caches bridge tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

/// HTTP client that resolves a credential per request and enforces the
/// single-invalidation rule on 401 responses.
///
/// Credential fallback chain, tried in order:
/// 1. bridge-issued bearer token (when a [`TokenProvider`] is wired in),
/// 2. stored session token attached as [`SESSION_HEADER`],
/// 3. anonymous request.
///
/// A 401 against a stored session clears the session and surfaces
/// [`AuthError::AuthRequired`]; a 401 against a bridge token triggers exactly
/// one token refresh and retry. There is no retry loop beyond that.
pub struct AuthClient {
    http: Client,
    bridge: Option<Arc<dyn TokenProvider>>,
    session: RwLock<Option<String>>,
}

impl AuthClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            bridge: None,
            session: RwLock::new(None),
        }
    }

    pub fn with_bridge(http: Client, bridge: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            bridge: Some(bridge),
            session: RwLock::new(None),
        }
    }

    /// The underlying HTTP client, for callers that build their own requests.
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn set_session_token(&self, token: impl Into<String>) {
        *self.session.write().expect("session lock") = Some(token.into());
    }

    pub fn clear_session_token(&self) {
        *self.session.write().expect("session lock") = None;
    }

    pub fn session_token(&self) -> Option<String> {
        self.session.read().expect("session lock").clone()
    }

    /// Resolve a credential via the fallback chain.
    pub async fn resolve_credential(&self) -> Credential {
        if let Some(bridge) = &self.bridge {
            if let Some(token) = bridge.bearer_token().await {
                return Credential {
                    token: Some(token),
                    source: CredentialSource::BridgeToken,
                };
            }
        }
        if let Some(token) = self.session_token() {
            return Credential {
                token: Some(token),
                source: CredentialSource::StoredSession,
            };
        }
        Credential {
            token: None,
            source: CredentialSource::None,
        }
    }

    /// Send a request built by `make`, attaching a resolved credential.
    ///
    /// `make` is called once per attempt so that non-cloneable bodies
    /// (multipart forms) can be rebuilt for the single bridge-token retry.
    /// Ordinary HTTP error codes other than 401 are returned as non-ok
    /// responses for the caller to interpret.
    pub async fn send<F>(&self, make: F) -> Result<Response, AuthError>
    where
        F: Fn() -> RequestBuilder,
    {
        let credential = self.resolve_credential().await;
        let response = self.dispatch(make(), &credential).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        match credential.source {
            CredentialSource::BridgeToken => {
                // Bridge tokens are short-lived; fetch a fresh one and retry once.
                tracing::debug!("bridge token rejected with 401, refreshing once");
                let retry_credential = self.resolve_credential().await;
                let retry = self.dispatch(make(), &retry_credential).await?;
                if retry.status() != StatusCode::UNAUTHORIZED {
                    return Ok(retry);
                }
                Err(AuthError::AuthRequired {
                    requires_login: true,
                })
            }
            CredentialSource::StoredSession => {
                tracing::warn!("stored session rejected with 401, clearing it");
                self.clear_session_token();
                Err(AuthError::AuthRequired {
                    requires_login: true,
                })
            }
            CredentialSource::None => Err(AuthError::AuthRequired {
                requires_login: true,
            }),
        }
    }

    async fn dispatch(
        &self,
        request: RequestBuilder,
        credential: &Credential,
    ) -> Result<Response, AuthError> {
        let request = match (credential.source, credential.token.as_deref()) {
            (CredentialSource::BridgeToken, Some(token)) => request.bearer_auth(token),
            (CredentialSource::StoredSession, Some(token)) => {
                request.header(SESSION_HEADER, token)
            }
            _ => request,
        };
        request.send().await.map_err(AuthError::Network)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("HTTP transport failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication required (requires_login: {requires_login})")]
    AuthRequired { requires_login: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedToken(Option<&'static str>);

    #[async_trait]
    impl TokenProvider for FixedToken {
        async fn bearer_token(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[tokio::test]
    async fn test_bridge_token_wins_over_session() {
        let client = AuthClient::with_bridge(Client::new(), Arc::new(FixedToken(Some("bt"))));
        client.set_session_token("st");

        let credential = client.resolve_credential().await;
        assert_eq!(credential.source, CredentialSource::BridgeToken);
        assert_eq!(credential.token.as_deref(), Some("bt"));
    }

    #[tokio::test]
    async fn test_session_used_when_bridge_yields_nothing() {
        let client = AuthClient::with_bridge(Client::new(), Arc::new(FixedToken(None)));
        client.set_session_token("st");

        let credential = client.resolve_credential().await;
        assert_eq!(credential.source, CredentialSource::StoredSession);
        assert_eq!(credential.token.as_deref(), Some("st"));
    }

    #[tokio::test]
    async fn test_anonymous_when_nothing_available() {
        let client = AuthClient::new(Client::new());
        let credential = client.resolve_credential().await;
        assert_eq!(credential.source, CredentialSource::None);
        assert!(credential.token.is_none());
    }

    #[tokio::test]
    async fn test_session_store_and_clear() {
        let client = AuthClient::new(Client::new());
        client.set_session_token("st");
        assert_eq!(client.session_token().as_deref(), Some("st"));
        client.clear_session_token();
        assert!(client.session_token().is_none());
    }
}
