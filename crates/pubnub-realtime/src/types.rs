//! Public types for the pubnub-realtime crate.

use std::time::Duration;

/// Placeholder fragments shipped in sample configurations.
const PLACEHOLDER_MARKERS: &[&str] = &["change me", "your-publish-key-here", "your-subscribe-key-here"];

/// Returns `true` if `key` is empty or still one of the sample placeholders.
pub fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim();
    if key.is_empty() {
        return true;
    }
    let lower = key.to_ascii_lowercase();
    PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m))
}

/// Connection state of a [`Client`](crate::Client).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No subscribe request has succeeded yet.
    Connecting,
    /// The first handshake succeeded.
    Connected,
    /// A long-poll failed; the client is retrying.
    Disconnected,
    /// A long-poll succeeded again after a disconnection.
    Reconnected,
}

impl ConnectionState {
    /// `true` for [`Connected`](Self::Connected) and [`Reconnected`](Self::Reconnected).
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Reconnected)
    }
}

/// A message received on a subscribed channel.
#[derive(Debug, Clone)]
pub struct Message {
    /// Channel the message was published to.
    pub channel: String,
    /// Subscription match (wildcard or channel group), if different from `channel`.
    pub subscription: Option<String>,
    /// Publisher's user id.
    pub publisher: Option<String>,
    /// Message payload as published.
    pub data: serde_json::Value,
    /// Publish timetoken (17-digit, 10ns resolution).
    pub timetoken: Option<String>,
}

/// Presence action reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceAction {
    Join,
    Leave,
    /// The participant's presence heartbeat expired.
    Timeout,
    StateChange,
    Other(String),
}

impl PresenceAction {
    pub(crate) fn parse(action: &str) -> Self {
        match action {
            "join" => Self::Join,
            "leave" => Self::Leave,
            "timeout" => Self::Timeout,
            "state-change" => Self::StateChange,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A presence event on a subscribed channel.
#[derive(Debug, Clone)]
pub struct Presence {
    /// Channel name without the `-pnpres` suffix.
    pub channel: String,
    pub action: PresenceAction,
    /// User id the event is about.
    pub uuid: Option<String>,
    /// Number of participants after the event.
    pub occupancy: Option<u64>,
    /// Server timestamp (seconds since epoch).
    pub timestamp: Option<i64>,
}

/// Events emitted on the stream returned by [`Client::events`](crate::Client::events).
#[derive(Debug)]
pub enum Event {
    /// Connection state transition.
    Status(ConnectionState),
    Message(Message),
    Presence(Presence),
    /// An unrecoverable error occurred; the stream ends after this event.
    Error { status: Option<u16>, message: String },
}

/// Successful publish acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResponse {
    /// HTTP status code of the publish request.
    pub status: u16,
    /// Timetoken assigned to the published message.
    pub timetoken: String,
}

/// Tunable timings. Defaults match the PubNub SDKs.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// HTTP timeout for subscribe long-polls. Must exceed the server hold (~280s).
    pub subscribe_timeout: Duration,
    /// HTTP timeout for publish and leave requests.
    pub request_timeout: Duration,
    /// Presence heartbeat sent with each subscribe, in seconds.
    pub presence_timeout: u32,
    pub initial_retry_interval: Duration,
    pub max_retry_interval: Duration,
    /// `None` retries forever.
    pub max_retry_attempts: Option<u32>,
    pub event_channel_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(310),
            request_timeout: Duration::from_secs(10),
            presence_timeout: 300,
            initial_retry_interval: Duration::from_secs(1),
            max_retry_interval: Duration::from_secs(15),
            max_retry_attempts: None,
            event_channel_capacity: 64,
        }
    }
}

/// Configuration for [`Client::connect`](crate::Client::connect).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub publish_key: String,
    pub subscribe_key: String,
    /// User id presented to the backend (also the presence identity).
    pub user_id: String,
    /// Origin host or base URL. Defaults to `"ps.pndsn.com"` over HTTPS.
    pub origin: Option<String>,
    pub timing: Option<TimingConfig>,
}

impl ClientConfig {
    pub fn new(
        publish_key: impl Into<String>,
        subscribe_key: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            publish_key: publish_key.into(),
            subscribe_key: subscribe_key.into(),
            user_id: user_id.into(),
            origin: None,
            timing: None,
        }
    }

    /// Reject missing or placeholder credentials. Performs no I/O.
    pub fn validate(&self) -> Result<(), Error> {
        if is_placeholder_key(&self.publish_key) {
            return Err(Error::Config("publish key is missing or a placeholder".into()));
        }
        if is_placeholder_key(&self.subscribe_key) {
            return Err(Error::Config(
                "subscribe key is missing or a placeholder".into(),
            ));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::Config("user id must not be empty".into()));
        }
        Ok(())
    }
}

/// Errors returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request rejected: status={status}, {message}")]
    Status { status: u16, message: String },

    #[error("publish failed: status={status}, {message}")]
    Publish { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("client closed")]
    Closed,
}

impl Error {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } | Error::Publish { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Invalid keys and access denials will not heal by retrying.
    pub(crate) fn is_fatal(&self) -> bool {
        match self {
            Error::Config(_) | Error::Url(_) | Error::Closed => true,
            Error::Status { status, .. } => matches!(status, 400 | 401 | 403),
            _ => false,
        }
    }
}
