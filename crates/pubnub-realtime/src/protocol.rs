//! PubNub REST wire types, URL construction, and response parsing.

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::types::{Message, Presence, PresenceAction};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_ORIGIN: &str = "ps.pndsn.com";
pub const PRESENCE_SUFFIX: &str = "-pnpres";
pub const PNSDK: &str = "pubnub-realtime-rs/0.1";
/// Timetoken that requests a handshake (no messages, fresh cursor).
pub const HANDSHAKE_TIMETOKEN: &str = "0";

// ---------------------------------------------------------------------------
// Wire protocol types (JSON)
// ---------------------------------------------------------------------------

/// Subscribe long-poll response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscribeResponse {
    #[serde(rename = "t")]
    pub cursor: Timetoken,
    #[serde(rename = "m")]
    pub messages: Vec<Envelope>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timetoken {
    #[serde(rename = "t")]
    pub timetoken: String,
    #[serde(rename = "r")]
    pub region: Option<i64>,
}

impl Timetoken {
    pub fn handshake() -> Self {
        Self {
            timetoken: HANDSHAKE_TIMETOKEN.to_string(),
            region: None,
        }
    }
}

/// One entry of the `m` array in a subscribe response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Channel the message was published to.
    #[serde(rename = "c")]
    pub channel: String,
    /// Subscription match (channel group or wildcard).
    #[serde(rename = "b")]
    pub subscription: Option<String>,
    /// Issuing client's user id.
    #[serde(rename = "i")]
    pub issuer: Option<String>,
    #[serde(rename = "p")]
    pub publish_timetoken: Option<Timetoken>,
    #[serde(rename = "d")]
    pub payload: serde_json::Value,
    /// Message type (0 = message, 1 = signal, ...).
    #[serde(rename = "e")]
    pub message_type: Option<i64>,
}

impl Envelope {
    pub fn is_presence(&self) -> bool {
        self.channel.ends_with(PRESENCE_SUFFIX)
    }
}

/// Payload of an envelope on a `-pnpres` channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PresencePayload {
    pub action: String,
    pub uuid: Option<String>,
    pub occupancy: Option<u64>,
    pub timestamp: Option<i64>,
}

/// JSON error body returned by PubNub services on non-2xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: Option<String>,
    service: Option<String>,
}

// ---------------------------------------------------------------------------
// Endpoint / URL construction
// ---------------------------------------------------------------------------

/// Origin plus the identity every request carries.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base: url::Url,
    pub subscribe_key: String,
    pub user_id: String,
}

impl Endpoint {
    /// `origin` is either a bare host (`ps.pndsn.com`, HTTPS implied) or a
    /// full base URL (`http://127.0.0.1:8080`).
    pub fn new(origin: Option<&str>, subscribe_key: &str, user_id: &str) -> Result<Self, Error> {
        let origin = origin.unwrap_or(DEFAULT_ORIGIN);
        let base = if origin.contains("://") {
            url::Url::parse(origin)?
        } else {
            url::Url::parse(&format!("https://{origin}/"))?
        };
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("origin is not a base URL: {origin}")));
        }
        Ok(Self {
            base,
            subscribe_key: subscribe_key.to_string(),
            user_id: user_id.to_string(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<url::Url, Error> {
        let mut u = self.base.clone();
        {
            let mut path = u
                .path_segments_mut()
                .map_err(|()| Error::Config("origin is not a base URL".into()))?;
            path.clear();
            path.extend(segments);
        }
        u.query_pairs_mut()
            .append_pair("uuid", &self.user_id)
            .append_pair("pnsdk", PNSDK);
        Ok(u)
    }

    /// `GET /v2/subscribe/{sub}/{channels}/0`
    pub fn subscribe_url(
        &self,
        channels: &[String],
        cursor: &Timetoken,
        heartbeat: u32,
    ) -> Result<url::Url, Error> {
        let joined = channels.join(",");
        let mut u = self.url(&["v2", "subscribe", &self.subscribe_key, &joined, "0"])?;
        {
            let mut q = u.query_pairs_mut();
            q.append_pair("tt", &cursor.timetoken);
            if let Some(region) = cursor.region {
                q.append_pair("tr", &region.to_string());
            }
            q.append_pair("heartbeat", &heartbeat.to_string());
        }
        Ok(u)
    }

    /// `GET /publish/{pub}/{sub}/0/{channel}/0/{json}`
    pub fn publish_url(
        &self,
        publish_key: &str,
        channel: &str,
        payload: &str,
    ) -> Result<url::Url, Error> {
        self.url(&[
            "publish",
            publish_key,
            &self.subscribe_key,
            "0",
            channel,
            "0",
            payload,
        ])
    }

    /// `GET /v2/presence/sub-key/{sub}/channel/{channels}/leave`
    pub fn leave_url(&self, channels: &[String]) -> Result<url::Url, Error> {
        let joined = channels.join(",");
        self.url(&[
            "v2",
            "presence",
            "sub-key",
            &self.subscribe_key,
            "channel",
            &joined,
            "leave",
        ])
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

pub fn decode_subscribe(body: &str) -> Result<SubscribeResponse, Error> {
    Ok(serde_json::from_str(body)?)
}

/// Parse a publish body: `[1,"Sent","17000000000000000"]` on success,
/// `[0,"<reason>",...]` when the service refused the message.
pub fn decode_publish(status: u16, body: &str) -> Result<String, Error> {
    let (code, description, timetoken): (i64, String, serde_json::Value) =
        serde_json::from_str(body)?;
    if code != 1 {
        return Err(Error::Publish {
            status,
            message: description,
        });
    }
    Ok(match timetoken {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Best-effort human-readable message from a non-2xx body.
pub fn error_message(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ErrorBody>(body)
        && let Some(message) = err.message
    {
        return match err.service {
            Some(service) => format!("{message} ({service})"),
            None => message,
        };
    }
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(serde_json::Value::String(s)) = items.get(1)
    {
        return s.clone();
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

// ---------------------------------------------------------------------------
// Envelope → public event conversion
// ---------------------------------------------------------------------------

pub fn to_message(env: Envelope) -> Message {
    Message {
        subscription: env.subscription.filter(|s| *s != env.channel),
        channel: env.channel,
        publisher: env.issuer,
        data: env.payload,
        timetoken: env.publish_timetoken.map(|t| t.timetoken),
    }
}

/// `None` when the payload is not a presence object.
pub fn to_presence(env: Envelope) -> Option<Presence> {
    let payload: PresencePayload = match serde_json::from_value(env.payload) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(channel = %env.channel, "Malformed presence payload: {e}");
            return None;
        }
    };
    let channel = env
        .channel
        .strip_suffix(PRESENCE_SUFFIX)
        .unwrap_or(&env.channel)
        .to_string();
    Some(Presence {
        channel,
        action: PresenceAction::parse(&payload.action),
        uuid: payload.uuid,
        occupancy: payload.occupancy,
        timestamp: payload.timestamp,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
