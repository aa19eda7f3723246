//! Main coach-link client with builder pattern.
//!
//! The client holds the realtime platform shared by all managers, plus the
//! retry policy, timeouts and hooks each manager is created with.

use std::sync::Arc;

use crate::{
    error::{CoachLinkError, Result},
    event_handlers::EventHandlers,
    models::{Purpose, RetryPolicy},
    platform::{
        ArcRealtimePlatform, AuthEndpointSession, RealtimeSocket, SessionProvider, SocketConfig,
    },
    subscription::{ManagerConfig, RealtimeSubscriptionManager},
    timeouts::CoachLinkTimeouts,
};

/// Entry point: one shared realtime connection, many managers.
///
/// # Examples
///
/// ```rust,no_run
/// use coach_link::{CoachLinkClient, Target};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CoachLinkClient::builder()
///     .base_url("https://coach.example.com")
///     .api_key("public-anon-key")
///     .access_token("user-access-token")
///     .build()?;
///
/// let messages = client.messages();
/// let handle = messages
///     .observe(Target::new("conv-1")?, |_| println!("new message, refetching"))
///     .await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CoachLinkClient {
    platform: ArcRealtimePlatform,
    retry_policy: RetryPolicy,
    timeouts: CoachLinkTimeouts,
    event_handlers: EventHandlers,
}

impl CoachLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> CoachLinkClientBuilder {
        CoachLinkClientBuilder::new()
    }

    /// Manager for new messages in a conversation.
    pub fn messages(&self) -> RealtimeSubscriptionManager {
        self.manager(Purpose::messages())
    }

    /// Manager for notifications attached to a conversation.
    pub fn notifications(&self) -> RealtimeSubscriptionManager {
        self.manager(Purpose::notifications())
    }

    /// Manager for a custom purpose. Each manager is independent.
    pub fn manager(&self, purpose: Purpose) -> RealtimeSubscriptionManager {
        RealtimeSubscriptionManager::with_config(
            purpose,
            self.platform.clone(),
            ManagerConfig {
                retry_policy: self.retry_policy.clone(),
                timeouts: self.timeouts.clone(),
                event_handlers: self.event_handlers.clone(),
            },
        )
    }

    pub fn platform(&self) -> &ArcRealtimePlatform {
        &self.platform
    }

    pub fn timeouts(&self) -> &CoachLinkTimeouts {
        &self.timeouts
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

/// Builder for configuring [`CoachLinkClient`] instances.
pub struct CoachLinkClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    access_token: Option<String>,
    session_provider: Option<Arc<dyn SessionProvider>>,
    platform: Option<ArcRealtimePlatform>,
    timeouts: CoachLinkTimeouts,
    retry_policy: RetryPolicy,
    event_handlers: EventHandlers,
}

impl CoachLinkClientBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            access_token: None,
            session_provider: None,
            platform: None,
            timeouts: CoachLinkTimeouts::default(),
            retry_policy: RetryPolicy::default(),
            event_handlers: EventHandlers::default(),
        }
    }

    /// Set the base URL of the backend (`http(s)://host[:port]`)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the public API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Access token of the signed-in user, validated against the auth
    /// endpoint. Ignored when [`session_provider`](Self::session_provider)
    /// is set.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Supply sessions from your own source (keychain, app state, ...).
    pub fn session_provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.session_provider = Some(provider);
        self
    }

    /// Use a custom platform instead of the realtime WebSocket. When set,
    /// `base_url`, `api_key` and session settings are not used.
    pub fn platform(mut self, platform: ArcRealtimePlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn timeouts(mut self, timeouts: CoachLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Build the client.
    ///
    /// Without a custom platform this starts the realtime socket task, so it
    /// must run inside a Tokio runtime. The socket itself connects lazily.
    pub fn build(self) -> Result<CoachLinkClient> {
        let platform = match self.platform {
            Some(platform) => platform,
            None => {
                let base_url = self
                    .base_url
                    .ok_or_else(|| CoachLinkError::ConfigurationError("base_url is required".into()))?;
                let api_key = self
                    .api_key
                    .ok_or_else(|| CoachLinkError::ConfigurationError("api_key is required".into()))?;

                let sessions: Arc<dyn SessionProvider> = match self.session_provider {
                    Some(provider) => provider,
                    None => Arc::new(AuthEndpointSession::new(&base_url, api_key.clone(), self.access_token)?),
                };

                let config = SocketConfig::new(base_url, api_key)
                    .with_timeouts(self.timeouts.clone())
                    .with_event_handlers(self.event_handlers.clone());
                let socket = RealtimeSocket::new(config, sessions)?;
                log::debug!("[coach-link] Realtime endpoint {}", socket.url());
                Arc::new(socket)
            },
        };

        Ok(CoachLinkClient {
            platform,
            retry_policy: self.retry_policy,
            timeouts: self.timeouts,
            event_handlers: self.event_handlers,
        })
    }
}
