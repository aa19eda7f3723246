use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::change_event::ChangeEvent;
use super::change_filter::ChangeFilter;

/// Topic used for socket-level heartbeats.
pub const HEARTBEAT_TOPIC: &str = "phoenix";

/// One frame on the realtime socket: `{"topic", "event", "payload", "ref"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: JsonValue,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl RealtimeFrame {
    /// Topic for a named channel.
    pub fn channel_topic(channel_name: &str) -> String {
        format!("realtime:{}", channel_name)
    }

    /// Join a channel listening for `filter`.
    pub fn join(topic: &str, filter: &ChangeFilter, access_token: Option<&str>, reference: String) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [filter],
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = JsonValue::String(token.to_string());
        }
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload,
            reference: Some(reference),
        }
    }

    pub fn leave(topic: &str, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference),
        }
    }

    pub fn heartbeat(reference: String) -> Self {
        Self {
            topic: HEARTBEAT_TOPIC.to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference),
        }
    }

    /// Classify an inbound frame.
    pub fn classify(&self) -> InboundEvent {
        match self.event.as_str() {
            "phx_reply" => {
                let status = self
                    .payload
                    .get("status")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("error");
                let message = self
                    .payload
                    .get("response")
                    .and_then(|r| r.get("reason").or_else(|| r.get("message")))
                    .and_then(JsonValue::as_str)
                    .map(str::to_string);
                InboundEvent::Reply {
                    ok: status == "ok",
                    message,
                }
            },
            "phx_error" => InboundEvent::ChannelError,
            "phx_close" => InboundEvent::ChannelClosed,
            "postgres_changes" => {
                let data = self.payload.get("data").cloned().unwrap_or(JsonValue::Null);
                match serde_json::from_value::<ChangeEvent>(data) {
                    Ok(event) => InboundEvent::Change(event),
                    Err(e) => InboundEvent::Malformed(e.to_string()),
                }
            },
            // Server-side status notices (e.g. "system" with status "ok")
            _ => InboundEvent::Other,
        }
    }
}

/// Meaning of an inbound frame for the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Reply to a frame we sent (join, leave, heartbeat), matched by `ref`.
    Reply { ok: bool, message: Option<String> },
    ChannelError,
    ChannelClosed,
    Change(ChangeEvent),
    Malformed(String),
    Other,
}
