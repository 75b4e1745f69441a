use std::time::Duration;

use pubnub_realtime::is_placeholder_key;

use crate::error::{ChatError, ChatResult};

// Replace with the keys from your PubNub Admin Portal.
pub(crate) const PUBLISH_KEY: &str = "Change me: your-publish-key-here";
pub(crate) const SUBSCRIBE_KEY: &str = "Change me: your-subscribe-key-here";
pub(crate) const CHAT_CHANNEL: &str = "chat-room";

/// Delay after unsubscribing so the leave request can drain.
pub(crate) const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub publish_key: String,
    pub subscribe_key: String,
    pub channel: String,
    /// PubNub origin; `None` uses the public edge.
    pub origin: Option<String>,
    pub shutdown_grace: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            publish_key: PUBLISH_KEY.to_string(),
            subscribe_key: SUBSCRIBE_KEY.to_string(),
            channel: CHAT_CHANNEL.to_string(),
            origin: None,
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }
}

impl ChatConfig {
    /// Reject placeholder credentials before anything touches the network.
    pub fn validate(&self) -> ChatResult<()> {
        if is_placeholder_key(&self.publish_key) || is_placeholder_key(&self.subscribe_key) {
            return Err(ChatError::Config(
                "PubNub publish/subscribe keys are not set (still placeholders)".into(),
            ));
        }
        if self.channel.trim().is_empty() {
            return Err(ChatError::Config("channel name must not be empty".into()));
        }
        Ok(())
    }
}
