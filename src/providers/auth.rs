//! OAuth access-token capability shared by the Gmail and Sheets clients.
//!
//! [`OAuthRefresher`] exchanges the refresh token for short-lived access
//! tokens and caches them. [`LoggingCredentials`] wraps any provider and
//! logs acquisitions, refreshes and failures.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::OAuthConfig;
use crate::error::AuthError;

/// Refresh this long before the provider-reported expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Source of bearer credentials for provider calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A credential valid for at least the next request.
    async fn current_credential(&self) -> Result<SecretString, AuthError>;

    /// Drop any cached credential, e.g. after the provider answered 401.
    async fn invalidate(&self) {}
}

/// A fixed credential. Used for tests and pre-minted tokens.
pub struct StaticCredentials(SecretString);

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn current_credential(&self) -> Result<SecretString, AuthError> {
        Ok(self.0.clone())
    }
}

struct CachedToken {
    token: SecretString,
    /// `None` for a seeded token whose lifetime is unknown.
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_none_or(|at| now + Duration::seconds(EXPIRY_SKEW_SECS) < at)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Refresh-token grant against an OAuth 2.0 token endpoint.
pub struct OAuthRefresher {
    client: reqwest::Client,
    config: OAuthConfig,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthRefresher {
    pub fn new(client: reqwest::Client, config: OAuthConfig) -> Self {
        let cached = config.access_token.clone().map(|token| CachedToken {
            token,
            expires_at: None,
        });
        Self {
            client,
            config,
            cached: Mutex::new(cached),
        }
    }

    async fn refresh(&self) -> Result<CachedToken, AuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("refresh_token", self.config.refresh_token.expose_secret()),
        ];

        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        Ok(CachedToken {
            token: SecretString::from(parsed.access_token),
            expires_at: parsed
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

#[async_trait]
impl CredentialProvider for OAuthRefresher {
    async fn current_credential(&self) -> Result<SecretString, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh(Utc::now())
        {
            return Ok(token.token.clone());
        }

        let fresh = self.refresh().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

/// Logs credential activity of the wrapped provider.
pub struct LoggingCredentials<P> {
    inner: P,
    name: String,
    last: Mutex<Option<SecretString>>,
}

impl<P: CredentialProvider> LoggingCredentials<P> {
    pub fn new(name: impl Into<String>, inner: P) -> Self {
        Self {
            inner,
            name: name.into(),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<P: CredentialProvider> CredentialProvider for LoggingCredentials<P> {
    async fn current_credential(&self) -> Result<SecretString, AuthError> {
        let token = match self.inner.current_credential().await {
            Ok(token) => token,
            Err(e) => {
                warn!(provider = %self.name, error = %e, "Credential acquisition failed");
                return Err(e);
            }
        };

        let mut last = self.last.lock().await;
        match last.as_ref() {
            None => info!(provider = %self.name, "Credential acquired"),
            Some(prev) if prev.expose_secret() != token.expose_secret() => {
                info!(provider = %self.name, "Credential refreshed")
            }
            Some(_) => debug!(provider = %self.name, "Using cached credential"),
        }
        *last = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self) {
        info!(provider = %self.name, "Credential invalidated");
        self.inner.invalidate().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Form, Json, Router, extract::State, routing::post};
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Deserialize)]
    struct RefreshForm {
        grant_type: String,
        refresh_token: String,
    }

    async fn token_endpoint(
        State(calls): State<Arc<AtomicUsize>>,
        Form(form): Form<RefreshForm>,
    ) -> Json<serde_json::Value> {
        assert_eq!(form.grant_type, "refresh_token");
        assert_eq!(form.refresh_token, "refresh-1");
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Json(serde_json::json!({
            "access_token": format!("access-{n}"),
            "expires_in": 3599,
            "token_type": "Bearer"
        }))
    }

    async fn start_token_server() -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/token", post(token_endpoint))
            .with_state(Arc::clone(&calls));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/token"), calls)
    }

    fn oauth_config(token_url: String, seed: Option<&str>) -> OAuthConfig {
        OAuthConfig {
            client_id: "client".into(),
            client_secret: SecretString::from("secret"),
            refresh_token: SecretString::from("refresh-1"),
            access_token: seed.map(SecretString::from),
            token_url,
        }
    }

    #[tokio::test]
    async fn refreshes_once_and_caches() {
        let (url, calls) = start_token_server().await;
        let refresher = OAuthRefresher::new(reqwest::Client::new(), oauth_config(url, None));

        let first = refresher.current_credential().await.unwrap();
        let second = refresher.current_credential().await.unwrap();
        assert_eq!(first.expose_secret(), "access-1");
        assert_eq!(second.expose_secret(), "access-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn seeded_token_used_until_invalidated() {
        let (url, calls) = start_token_server().await;
        let refresher =
            OAuthRefresher::new(reqwest::Client::new(), oauth_config(url, Some("seeded")));

        assert_eq!(refresher.current_credential().await.unwrap().expose_secret(), "seeded");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        refresher.invalidate().await;
        assert_eq!(refresher.current_credential().await.unwrap().expose_secret(), "access-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_surfaces_status() {
        let app = Router::new().route(
            "/token",
            post(|| async { (axum::http::StatusCode::BAD_REQUEST, "invalid_grant") }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let refresher = OAuthRefresher::new(
            reqwest::Client::new(),
            oauth_config(format!("http://{addr}/token"), None),
        );
        match refresher.current_credential().await {
            Err(AuthError::Rejected { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("expected rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn logging_wrapper_passes_through() {
        let (url, _calls) = start_token_server().await;
        let creds = LoggingCredentials::new(
            "google",
            OAuthRefresher::new(reqwest::Client::new(), oauth_config(url, Some("seeded"))),
        );
        assert_eq!(creds.current_credential().await.unwrap().expose_secret(), "seeded");
        creds.invalidate().await;
        assert_eq!(creds.current_credential().await.unwrap().expose_secret(), "access-1");
    }

    #[test]
    fn cached_token_freshness() {
        let now = Utc::now();
        let seeded = CachedToken {
            token: SecretString::from("t"),
            expires_at: None,
        };
        assert!(seeded.is_fresh(now));

        let expiring = CachedToken {
            token: SecretString::from("t"),
            expires_at: Some(now + Duration::seconds(30)),
        };
        assert!(!expiring.is_fresh(now));

        let valid = CachedToken {
            token: SecretString::from("t"),
            expires_at: Some(now + Duration::seconds(600)),
        };
        assert!(valid.is_fresh(now));
    }
}
