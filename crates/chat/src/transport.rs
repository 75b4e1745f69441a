//! Seam between the chat session and the pub/sub backend.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use pubnub_realtime::{Client, ClientConfig, Event};

use crate::codec::WireRecord;
use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};

/// The single inbound event stream, consumed by the router.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start receiving messages (and presence if `with_presence`) on `channel`.
    async fn subscribe(&self, channel: &str, with_presence: bool) -> ChatResult<()>;

    /// Send one record. Returns the HTTP status on success.
    async fn publish(&self, channel: &str, record: &WireRecord) -> ChatResult<u16>;

    /// Leave every channel. Best-effort; never fails.
    async fn unsubscribe_all(&self);
}

/// [`Transport`] backed by a [`pubnub_realtime::Client`].
pub struct PubNubTransport {
    client: Client,
}

impl PubNubTransport {
    /// Build a client bound to `identity` and take its event stream.
    ///
    /// Placeholder credentials fail here with [`ChatError::Config`] before
    /// any request is made.
    pub fn connect(config: &ChatConfig, identity: &str) -> ChatResult<(Self, EventStream)> {
        let mut client_config = ClientConfig::new(
            config.publish_key.clone(),
            config.subscribe_key.clone(),
            identity,
        );
        client_config.origin = config.origin.clone();

        let mut client = Client::connect(client_config)?;
        let events = client
            .events()
            .ok_or_else(|| ChatError::Transport("event stream already taken".into()))?;
        Ok((Self { client }, Box::pin(events)))
    }
}

#[async_trait]
impl Transport for PubNubTransport {
    async fn subscribe(&self, channel: &str, with_presence: bool) -> ChatResult<()> {
        self.client.subscribe(channel, with_presence).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, record: &WireRecord) -> ChatResult<u16> {
        match self.client.publish(channel, record).await {
            Ok(resp) => Ok(resp.status),
            Err(e) => {
                match e.status() {
                    Some(status) => tracing::warn!(status, "Publish failed with status: {e}"),
                    None => tracing::warn!("Failed to publish message: {e}"),
                }
                Err(e.into())
            }
        }
    }

    async fn unsubscribe_all(&self) {
        self.client.unsubscribe_all().await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;

    /// In-memory transport that records calls and replays scripted publish results.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub subscriptions: Mutex<Vec<(String, bool)>>,
        pub published: Mutex<Vec<WireRecord>>,
        pub publish_results: Mutex<VecDeque<ChatResult<u16>>>,
        pub unsubscribed: Mutex<bool>,
    }

    impl FakeTransport {
        pub(crate) fn failing_first_publish() -> Self {
            let fake = Self::default();
            fake.publish_results
                .lock()
                .unwrap()
                .push_back(Err(ChatError::Publish(
                    "publish failed: status=403, Forbidden".into(),
                )));
            fake
        }

        pub(crate) fn published_texts(&self) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.message.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn subscribe(&self, channel: &str, with_presence: bool) -> ChatResult<()> {
            self.subscriptions
                .lock()
                .unwrap()
                .push((channel.to_string(), with_presence));
            Ok(())
        }

        async fn publish(&self, _channel: &str, record: &WireRecord) -> ChatResult<u16> {
            self.published.lock().unwrap().push(record.clone());
            self.publish_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(200))
        }

        async fn unsubscribe_all(&self) {
            *self.unsubscribed.lock().unwrap() = true;
        }
    }

    /// Event stream fed from a channel, so tests control timing.
    pub(crate) fn event_channel() -> (mpsc::UnboundedSender<Event>, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        (tx, Box::pin(stream))
    }
}
