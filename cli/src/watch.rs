//! `coach watch`: follow one conversation and print change events.
//!
//! Each event is written to stdout as one JSON line tagged with the stream it
//! came from (`messages` or `notifications`). Subscription problems are only
//! logged; the watch keeps running until interrupted.

use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Mutex};

use coach_link::{
    ChangeEvent, CoachLinkClient, CoachLinkTimeouts, EventHandlers, RetryPolicy, Target,
};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::CLIConfiguration;
use crate::error::{CLIError, Result};

/// Values given on the command line. Each one wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub coalesce_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Everything needed to build a [`CoachLinkClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub access_token: Option<String>,
    pub timeouts: CoachLinkTimeouts,
    pub retry_policy: RetryPolicy,
}

impl ClientSettings {
    /// Merge the config file with command-line overrides.
    pub fn resolve(config: &CLIConfiguration, overrides: &Overrides) -> Result<Self> {
        let server = config.resolved_server();

        let base_url = overrides
            .url
            .clone()
            .or(server.url)
            .ok_or_else(|| CLIError::ConfigurationError("no server url (use --url or [server] url)".into()))?;
        let api_key = overrides.api_key.clone().or(server.api_key).ok_or_else(|| {
            CLIError::ConfigurationError("no api key (use --api-key or [server] api_key)".into())
        })?;
        let access_token = overrides.access_token.clone().or_else(|| config.access_token());

        let mut timeouts = config.to_timeouts();
        if let Some(ms) = overrides.coalesce_delay_ms {
            timeouts = CoachLinkTimeouts {
                coalesce_delay: std::time::Duration::from_millis(ms),
                ..timeouts
            };
        }

        let mut retry_policy = config.to_retry_policy();
        if let Some(max) = overrides.max_retries {
            retry_policy = retry_policy.with_max_retries(max);
        }

        Ok(Self {
            base_url,
            api_key,
            access_token,
            timeouts,
            retry_policy,
        })
    }

    /// Build the client, with diagnostics routed to the log.
    pub fn build_client(&self) -> Result<CoachLinkClient> {
        let mut builder = CoachLinkClient::builder()
            .base_url(&self.base_url)
            .api_key(&self.api_key)
            .timeouts(self.timeouts.clone())
            .retry_policy(self.retry_policy.clone())
            .event_handlers(diagnostic_handlers());
        if let Some(token) = &self.access_token {
            builder = builder.access_token(token);
        }
        Ok(builder.build()?)
    }
}

/// Hooks that turn lifecycle events into log lines.
pub fn diagnostic_handlers() -> EventHandlers {
    EventHandlers::new()
        .on_state_change(|change| tracing::debug!("{}", change))
        .on_error(|err| {
            if err.recoverable {
                tracing::info!("{} (retrying)", err);
            } else {
                tracing::warn!("{}; live updates stopped for this stream", err);
            }
        })
        .on_connect(|| tracing::info!("realtime socket connected"))
        .on_disconnect(|reason| tracing::info!("realtime socket closed: {}", reason))
}

/// One line of `watch` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchLine {
    pub stream: String,
    pub conversation: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
}

impl WatchLine {
    pub fn new(stream: &str, conversation: &Target, event: ChangeEvent) -> Self {
        Self {
            stream: stream.to_string(),
            conversation: conversation.to_string(),
            event_type: event.event_type,
            table: event.table,
            record: event.record,
            commit_timestamp: event.commit_timestamp,
        }
    }
}

/// Shared, line-oriented JSON writer used from subscription callbacks.
pub struct EventPrinter<W: Write + Send + 'static> {
    out: Arc<Mutex<W>>,
}

impl<W: Write + Send + 'static> Clone for EventPrinter<W> {
    fn clone(&self) -> Self {
        Self {
            out: Arc::clone(&self.out),
        }
    }
}

impl<W: Write + Send + 'static> EventPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    pub fn print(&self, line: &WatchLine) -> Result<()> {
        let json = serde_json::to_string(line)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| CLIError::OutputError("output lock poisoned".into()))?;
        writeln!(out, "{}", json).map_err(|e| CLIError::OutputError(e.to_string()))?;
        out.flush().map_err(|e| CLIError::OutputError(e.to_string()))
    }

    /// Callback for `observe` that prints every event of `stream`.
    pub fn callback(&self, stream: &str, conversation: &Target) -> impl Fn(ChangeEvent) + Send + Sync + 'static {
        let printer = self.clone();
        let stream = stream.to_string();
        let conversation = conversation.clone();
        move |event| {
            if let Err(e) = printer.print(&WatchLine::new(&stream, &conversation, event)) {
                tracing::error!("{}", e);
            }
        }
    }
}

/// Observe messages and notifications for `conversation` until `shutdown`
/// resolves, then release both subscriptions.
pub async fn run_watch<W, S>(
    client: &CoachLinkClient,
    conversation: Target,
    printer: EventPrinter<W>,
    shutdown: S,
) -> Result<()>
where
    W: Write + Send + 'static,
    S: Future<Output = ()>,
{
    let messages = client.messages();
    let notifications = client.notifications();

    let m = messages
        .observe(conversation.clone(), printer.callback("messages", &conversation))
        .await;
    let n = notifications
        .observe(conversation.clone(), printer.callback("notifications", &conversation))
        .await;

    if m.is_noop() && n.is_noop() {
        tracing::warn!("not signed in; nothing to watch for {}", conversation);
        return Ok(());
    }
    tracing::info!("watching conversation {}", conversation);

    shutdown.await;

    tracing::info!("stopping");
    messages.release(&m).await;
    notifications.release(&n).await;
    messages.shutdown().await;
    notifications.shutdown().await;
    Ok(())
}
