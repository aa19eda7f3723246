//! Session providers: who is signed in, and with which access token.
//!
//! The managers never sign anybody in. They only ask "is there a valid
//! session right now?" before setting up a channel; a provider answers.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::{CoachLinkError, Result};
use crate::models::Session;

/// Async source of the current [`Session`].
///
/// Called before every channel setup, so implementations should be cheap or
/// cache.
///
/// ```rust,no_run
/// use coach_link::{Session, SessionProvider};
///
/// struct Keychain;
///
/// #[async_trait::async_trait]
/// impl SessionProvider for Keychain {
///     async fn get_session(&self) -> coach_link::Result<Session> {
///         Ok(Session::authenticated("user-1").with_access_token("token"))
///     }
/// }
/// ```
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    async fn get_session(&self) -> Result<Session>;
}

#[async_trait]
impl<T: SessionProvider + ?Sized> SessionProvider for Arc<T> {
    async fn get_session(&self) -> Result<Session> {
        (**self).get_session().await
    }
}

/// A fixed session.
#[derive(Debug, Clone)]
pub struct StaticSession {
    session: Session,
}

impl StaticSession {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Signed-in user with an access token for the realtime join.
    pub fn authenticated(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::new(Session::authenticated(user_id).with_access_token(access_token))
    }

    /// Nobody signed in: every `observe` becomes a no-op.
    pub fn none() -> Self {
        Self::new(Session::none())
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn get_session(&self) -> Result<Session> {
        Ok(self.session.clone())
    }
}

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct SessionCache {
    fetched_at: Option<Instant>,
    session: Option<Session>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Option<String>,
}

/// Resolves the session by validating an access token against the
/// platform's auth endpoint (`GET {base_url}/auth/v1/user`).
///
/// Results (including "not signed in") are cached for a TTL.
#[derive(Debug, Clone)]
pub struct AuthEndpointSession {
    http_client: reqwest::Client,
    user_url: String,
    api_key: String,
    access_token: Option<String>,
    ttl: Duration,
    cache: Arc<Mutex<SessionCache>>,
}

impl AuthEndpointSession {
    pub fn new(
        base_url: impl AsRef<str>,
        api_key: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self> {
        let base = reqwest::Url::parse(base_url.as_ref().trim()).map_err(|e| {
            CoachLinkError::ConfigurationError(format!(
                "Invalid base_url '{}': {}",
                base_url.as_ref(),
                e
            ))
        })?;
        let user_url = format!("{}/auth/v1/user", base.as_str().trim_end_matches('/'));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                CoachLinkError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            user_url,
            api_key: api_key.into(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
            ttl: DEFAULT_SESSION_TTL,
            cache: Arc::new(Mutex::new(SessionCache::default())),
        })
    }

    /// How long a lookup result is reused. Zero disables caching.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn user_url(&self) -> &str {
        &self.user_url
    }

    async fn fetch(&self, token: &str) -> Result<Session> {
        log::debug!("[coach-link] Validating session at {}", self.user_url);
        let response = self
            .http_client
            .get(&self.user_url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            log::info!("[coach-link] Access token rejected (HTTP {})", status.as_u16());
            return Ok(Session::none());
        }
        if !status.is_success() {
            return Err(CoachLinkError::NetworkError(format!(
                "Session lookup failed with HTTP {}",
                status.as_u16()
            )));
        }

        let user = response.json::<AuthUser>().await?;
        match user.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Ok(Session::authenticated(id).with_access_token(token)),
            None => {
                log::warn!("[coach-link] Auth endpoint returned a user without an id");
                Ok(Session::none())
            },
        }
    }
}

#[async_trait]
impl SessionProvider for AuthEndpointSession {
    async fn get_session(&self) -> Result<Session> {
        let Some(token) = self.access_token.as_deref() else {
            return Ok(Session::none());
        };

        if !self.ttl.is_zero() {
            let cache = self.cache.lock().await;
            if let (Some(fetched_at), Some(session)) = (cache.fetched_at, cache.session.clone()) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(session);
                }
            }
        }

        let session = self.fetch(token).await?;

        let mut cache = self.cache.lock().await;
        cache.fetched_at = Some(Instant::now());
        cache.session = Some(session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_session() {
        let provider = StaticSession::authenticated("u1", "tok");
        let session = provider.get_session().await.unwrap();
        assert_eq!(session.user(), Some("u1"));
        assert_eq!(session.access_token.as_deref(), Some("tok"));

        let nobody = StaticSession::none().get_session().await.unwrap();
        assert_eq!(nobody.user(), None);
    }

    #[tokio::test]
    async fn test_auth_endpoint_without_token_is_signed_out() {
        let provider = AuthEndpointSession::new("http://127.0.0.1:9", "anon", Some("  ".into())).unwrap();
        let session = provider.get_session().await.unwrap();
        assert!(!session.valid);
    }

    #[test]
    fn test_auth_endpoint_url() {
        let provider = AuthEndpointSession::new("https://coach.example.com/", "anon", None).unwrap();
        assert_eq!(provider.user_url(), "https://coach.example.com/auth/v1/user");
    }

    #[test]
    fn test_auth_endpoint_rejects_bad_url() {
        let err = AuthEndpointSession::new("not a url", "anon", None).unwrap_err();
        assert!(matches!(err, CoachLinkError::ConfigurationError(_)));
    }
}
