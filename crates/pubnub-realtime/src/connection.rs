//! Connection management: long-poll event loop, reconnection, and leave.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::Error;
use crate::protocol::{
    Endpoint, PRESENCE_SUFFIX, SubscribeResponse, Timetoken, decode_subscribe, error_message,
    to_message, to_presence,
};
use crate::types::{ConnectionState, Event, TimingConfig};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) enum Command {
    Subscribe {
        channel: String,
        with_presence: bool,
    },
    UnsubscribeAll {
        done: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Channel set
// ---------------------------------------------------------------------------

/// Subscribed channels, each with its presence flag.
#[derive(Debug, Default)]
pub(crate) struct ChannelSet {
    channels: BTreeMap<String, bool>,
}

impl ChannelSet {
    /// Returns `true` if the subscription changed.
    pub fn insert(&mut self, channel: &str, with_presence: bool) -> bool {
        match self.channels.get_mut(channel) {
            Some(presence) if *presence || !with_presence => false,
            Some(presence) => {
                *presence = true;
                true
            }
            None => {
                self.channels.insert(channel.to_string(), with_presence);
                true
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Names as they appear on the wire, presence channels included.
    pub fn wire_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.channels.len() * 2);
        for (channel, presence) in &self.channels {
            names.push(channel.clone());
            if *presence {
                names.push(format!("{channel}{PRESENCE_SUFFIX}"));
            }
        }
        names
    }

    /// Names for the presence leave call (no `-pnpres` entries).
    pub fn names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Issue one subscribe request and decode its body.
async fn poll(
    http: &reqwest::Client,
    url: url::Url,
    timeout: Duration,
) -> Result<SubscribeResponse, Error> {
    let resp = http.get(url).timeout(timeout).send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    decode_subscribe(&body)
}

/// Best-effort presence leave. Failures are logged, never returned.
pub(crate) async fn leave(
    http: &reqwest::Client,
    endpoint: &Endpoint,
    channels: &[String],
    timeout: Duration,
) {
    if channels.is_empty() {
        return;
    }
    let url = match endpoint.leave_url(channels) {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!("Failed to build leave URL: {e}");
            return;
        }
    };
    match http.get(url).timeout(timeout).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(?channels, "Left channels");
        }
        Ok(resp) => {
            tracing::warn!(status = resp.status().as_u16(), "Leave request rejected");
        }
        Err(e) => {
            tracing::warn!("Leave request failed: {e}");
        }
    }
}

/// Exponential backoff: 1s, 2s, 4s, 8s, 15s, 15s, ... plus up to 1s of jitter.
pub(crate) fn backoff(retry_count: u32, timing: &TimingConfig) -> Duration {
    let exp = retry_count.saturating_sub(1).min(30);
    let base = timing
        .initial_retry_interval
        .saturating_mul(1u32 << exp)
        .min(timing.max_retry_interval);
    // Use subsecond nanos from wall clock for non-deterministic jitter
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let jitter_cap = timing.initial_retry_interval.as_millis().min(1000) as u64;
    let jitter = if jitter_cap == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(nanos % jitter_cap)
    };
    base + jitter
}

// ---------------------------------------------------------------------------
// Background event loop
// ---------------------------------------------------------------------------

pub(crate) struct EventLoopState {
    pub http: reqwest::Client,
    pub endpoint: Endpoint,
    pub channels: ChannelSet,
    pub cursor: Timetoken,
    pub event_tx: mpsc::Sender<Event>,
    pub state_tx: watch::Sender<ConnectionState>,
    pub timing: TimingConfig,
}

enum LoopAction {
    Continue,
    Stop,
}

impl EventLoopState {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    async fn transition(&mut self, next: ConnectionState) -> LoopAction {
        self.state_tx.send_replace(next);
        tracing::info!(state = ?next, "Connection state changed");
        match self.event_tx.send(Event::Status(next)).await {
            Ok(()) => LoopAction::Continue,
            Err(_) => LoopAction::Stop,
        }
    }

    async fn on_success(&mut self) -> LoopAction {
        match self.state() {
            ConnectionState::Connecting => self.transition(ConnectionState::Connected).await,
            ConnectionState::Disconnected => self.transition(ConnectionState::Reconnected).await,
            ConnectionState::Connected | ConnectionState::Reconnected => LoopAction::Continue,
        }
    }

    async fn on_failure(&mut self) -> LoopAction {
        if self.state().is_connected() {
            self.transition(ConnectionState::Disconnected).await
        } else {
            LoopAction::Continue
        }
    }

    async fn fail(&mut self, status: Option<u16>, message: String) {
        tracing::error!(?status, "{message}");
        // The loop ends either way; a dropped receiver has nobody to tell.
        let _ = self.event_tx.send(Event::Error { status, message }).await;
    }

    /// Forward envelopes in arrival order. Waits on backpressure rather than dropping.
    async fn dispatch(&mut self, response: SubscribeResponse) -> LoopAction {
        for env in response.messages {
            let event = if env.is_presence() {
                match to_presence(env) {
                    Some(p) => Event::Presence(p),
                    None => continue,
                }
            } else {
                Event::Message(to_message(env))
            };
            if self.event_tx.send(event).await.is_err() {
                return LoopAction::Stop;
            }
        }
        self.cursor = response.cursor;
        LoopAction::Continue
    }

    async fn apply(&mut self, cmd: Command) -> LoopAction {
        match cmd {
            Command::Subscribe {
                channel,
                with_presence,
            } => {
                if self.channels.insert(&channel, with_presence) {
                    tracing::info!(%channel, with_presence, "Subscribing");
                } else {
                    tracing::debug!(%channel, "Already subscribed");
                }
                LoopAction::Continue
            }
            Command::UnsubscribeAll { done } => {
                let names = self.channels.names();
                leave(&self.http, &self.endpoint, &names, self.timing.request_timeout).await;
                self.channels.clear();
                // Stopping regardless, and the caller may have stopped waiting.
                let _ = self.transition(ConnectionState::Disconnected).await;
                let _ = done.send(());
                LoopAction::Stop
            }
        }
    }
}

pub(crate) async fn run_event_loop(mut p: EventLoopState, mut cmd_rx: mpsc::Receiver<Command>) {
    let mut retry_count: u32 = 0;

    loop {
        if p.channels.is_empty() {
            match cmd_rx.recv().await {
                Some(cmd) => {
                    if let LoopAction::Stop = p.apply(cmd).await {
                        return;
                    }
                    continue;
                }
                None => return,
            }
        }

        let url = match p.endpoint.subscribe_url(
            &p.channels.wire_names(),
            &p.cursor,
            p.timing.presence_timeout,
        ) {
            Ok(u) => u,
            Err(e) => {
                p.fail(None, format!("Failed to build subscribe URL: {e}")).await;
                return;
            }
        };

        let result = tokio::select! {
            result = poll(&p.http, url, p.timing.subscribe_timeout) => result,
            cmd = cmd_rx.recv() => {
                // Dropping the in-flight long-poll is fine: the cursor is unchanged,
                // so the next request resumes from the same timetoken.
                match cmd {
                    Some(cmd) => {
                        if let LoopAction::Stop = p.apply(cmd).await {
                            return;
                        }
                        continue;
                    }
                    None => {
                        let names = p.channels.names();
                        leave(&p.http, &p.endpoint, &names, p.timing.request_timeout).await;
                        return;
                    }
                }
            }
        };

        match result {
            Ok(response) => {
                retry_count = 0;
                if let LoopAction::Stop = p.on_success().await {
                    return;
                }
                if let LoopAction::Stop = p.dispatch(response).await {
                    return;
                }
            }
            Err(e) if e.is_fatal() => {
                p.fail(e.status(), e.to_string()).await;
                return;
            }
            Err(e) => {
                retry_count += 1;
                tracing::warn!("Subscribe attempt {retry_count} failed: {e}");
                if let LoopAction::Stop = p.on_failure().await {
                    return;
                }
                if let Some(max) = p.timing.max_retry_attempts
                    && retry_count > max
                {
                    p.fail(None, format!("Connection failed after {max} attempts"))
                        .await;
                    return;
                }

                tokio::select! {
                    _ = tokio::time::sleep(backoff(retry_count, &p.timing)) => {}
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(cmd) => {
                                if let LoopAction::Stop = p.apply(cmd).await {
                                    return;
                                }
                            }
                            None => {
                                tracing::info!("Client dropped during reconnect");
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
