//! Public entry point: [`Client`] and [`Events`].

use std::pin::Pin;
use std::task::{Context, Poll};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use crate::connection::{ChannelSet, Command, EventLoopState, run_event_loop};
use crate::protocol::{Endpoint, Timetoken, decode_publish, error_message};
use crate::types::{ClientConfig, ConnectionState, Error, Event, PublishResponse};

const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// The single stream of [`Event`]s produced by a [`Client`].
///
/// Ends after [`Client::unsubscribe_all`], after an [`Event::Error`], or when
/// the client is dropped.
pub struct Events {
    rx: mpsc::Receiver<Event>,
}

impl Events {
    /// Receive the next event. Returns `None` once the event loop has exited.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl futures_util::Stream for Events {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

/// Handle to a PubNub connection bound to one user id.
///
/// A background task owns the subscribe long-poll; this handle sends it
/// commands and performs publishes directly.
pub struct Client {
    http: reqwest::Client,
    endpoint: Endpoint,
    publish_key: String,
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    events: Option<Events>,
    request_timeout: std::time::Duration,
}

impl Client {
    /// Validate the configuration and spawn the (idle) event loop.
    ///
    /// Credentials are checked before any network activity. Must be called
    /// from within a Tokio runtime.
    pub fn connect(config: ClientConfig) -> Result<Self, Error> {
        config.validate()?;
        let timing = config.timing.unwrap_or_default();
        let endpoint = Endpoint::new(
            config.origin.as_deref(),
            &config.subscribe_key,
            &config.user_id,
        )?;
        let http = reqwest::Client::builder()
            .connect_timeout(timing.request_timeout)
            .build()?;

        let (event_tx, event_rx) = mpsc::channel::<Event>(timing.event_channel_capacity);
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(COMMAND_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let request_timeout = timing.request_timeout;

        tokio::spawn(run_event_loop(
            EventLoopState {
                http: http.clone(),
                endpoint: endpoint.clone(),
                channels: ChannelSet::default(),
                cursor: Timetoken::handshake(),
                event_tx,
                state_tx,
                timing,
            },
            cmd_rx,
        ));

        tracing::debug!(user_id = %config.user_id, "Client created");

        Ok(Self {
            http,
            endpoint,
            publish_key: config.publish_key,
            cmd_tx,
            state_rx,
            events: Some(Events { rx: event_rx }),
            request_timeout,
        })
    }

    /// User id this client presents to the backend.
    pub fn user_id(&self) -> &str {
        &self.endpoint.user_id
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Take the event stream. Only the first call returns `Some`.
    pub fn events(&mut self) -> Option<Events> {
        self.events.take()
    }

    /// Start receiving messages (and presence events if `with_presence`) on
    /// `channel`. Subscribing to an already subscribed channel is a no-op.
    pub async fn subscribe(&self, channel: &str, with_presence: bool) -> Result<(), Error> {
        self.cmd_tx
            .send(Command::Subscribe {
                channel: channel.to_string(),
                with_presence,
            })
            .await
            .map_err(|_| Error::Closed)
    }

    /// Publish one JSON-serializable message to `channel`.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        message: &T,
    ) -> Result<PublishResponse, Error> {
        let payload = serde_json::to_string(message)?;
        let url = self
            .endpoint
            .publish_url(&self.publish_key, channel, &payload)?;
        let resp = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(Error::Publish {
                status,
                message: error_message(&body),
            });
        }
        let timetoken = decode_publish(status, &body)?;
        tracing::debug!(%channel, %timetoken, "Published");
        Ok(PublishResponse { status, timetoken })
    }

    /// Leave every subscribed channel and stop the event loop.
    ///
    /// The leave request is best-effort. Emits a final
    /// [`ConnectionState::Disconnected`] status before the stream ends.
    pub async fn unsubscribe_all(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::UnsubscribeAll { done: done_tx })
            .await
            .is_err()
        {
            tracing::debug!("Event loop already stopped");
            return;
        }
        // Err means the loop exited before acking, which is also done.
        let _ = done_rx.await;
    }
}
