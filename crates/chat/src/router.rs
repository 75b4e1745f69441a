//! Dispatches backend events to the terminal in arrival order.

use std::sync::Arc;

use futures_util::StreamExt;
use pubnub_realtime::{ConnectionState, Event, Message, Presence, PresenceAction};
use tokio::sync::oneshot;

use crate::codec;
use crate::console::Console;
use crate::transport::EventStream;

pub struct Router {
    identity: Arc<str>,
    console: Console,
    connected: Option<oneshot::Sender<()>>,
}

impl Router {
    /// `connected` fires once, on the first transition into a connected state.
    pub fn new(identity: Arc<str>, console: Console, connected: oneshot::Sender<()>) -> Self {
        Self {
            identity,
            console,
            connected: Some(connected),
        }
    }

    /// Consume the stream until it ends.
    pub async fn run(mut self, mut events: EventStream) {
        while let Some(event) = events.next().await {
            self.handle(event);
        }
        tracing::debug!("Event stream ended");
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Status(state) => self.on_status(state),
            Event::Message(msg) => self.on_message(&msg),
            Event::Presence(presence) => self.on_presence(&presence),
            Event::Error { status, message } => {
                tracing::error!(?status, "Backend error: {message}");
                self.status_line(&format!("⚠️  PubNub error: {message}"));
            }
        }
    }

    fn on_status(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected | ConnectionState::Reconnected
                if self.connected.is_some() =>
            {
                self.console
                    .line("✅ Connected to PubNub! You can start chatting now.");
                if let Some(gate) = self.connected.take() {
                    // The session may have stopped waiting (Ctrl-C).
                    let _ = gate.send(());
                }
            }
            ConnectionState::Connected => {}
            ConnectionState::Reconnected => self.status_line("🔄 Reconnected to PubNub"),
            ConnectionState::Disconnected => self.status_line("❌ Disconnected from PubNub"),
            ConnectionState::Connecting => {}
        }
    }

    /// Before the gate fires nobody is at the prompt; afterwards the notice
    /// must restore it.
    fn status_line(&self, text: &str) {
        if self.connected.is_some() {
            self.console.line(text);
        } else {
            self.console.notice(text);
        }
    }

    fn on_message(&self, msg: &Message) {
        let Some(chat) = codec::decode(&msg.data) else {
            tracing::debug!(channel = %msg.channel, "Ignoring non-object payload");
            return;
        };
        if chat.username == *self.identity {
            return;
        }
        self.console.notice(&format!(
            "💬 [{}] {}: {}",
            chat.timestamp, chat.username, chat.text
        ));
    }

    fn on_presence(&self, presence: &Presence) {
        let Some(uuid) = presence.uuid.as_deref() else {
            return;
        };
        if uuid == &*self.identity {
            return;
        }
        match presence.action {
            PresenceAction::Join => self.console.notice(&format!("🟢 {uuid} joined the chat")),
            PresenceAction::Leave => self.console.notice(&format!("🔴 {uuid} left the chat")),
            PresenceAction::Timeout => {
                self.console.notice(&format!("🔴 {uuid} left the chat (timed out)"));
            }
            PresenceAction::StateChange | PresenceAction::Other(_) => {
                tracing::trace!(?presence, "Ignoring presence event");
            }
        }
    }
}
