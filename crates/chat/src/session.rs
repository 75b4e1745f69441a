//! Terminal session: username prompt, startup gate, read loop, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::codec::{self, ChatMessage};
use crate::config::ChatConfig;
use crate::console::{Console, INPUT_PROMPT, USERNAME_PROMPT};
use crate::error::{ChatError, ChatResult};
use crate::router::Router;
use crate::transport::{EventStream, PubNubTransport, Transport};

pub const DEFAULT_USERNAME: &str = "Anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    AwaitingConnection,
    Chatting,
    Closing,
    Closed,
}

/// What a line of input asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Blank,
    Quit,
    Chat(String),
}

/// Classify one line. Only an exact `quit` or `exit` (after trimming) ends the session.
pub fn classify(line: &str) -> Input {
    match line.trim() {
        "" => Input::Blank,
        "quit" | "exit" => Input::Quit,
        text => Input::Chat(text.to_string()),
    }
}

/// Read one line without its terminator. Bytes that are not UTF-8 are
/// replaced rather than rejected. `None` at end of input.
pub async fn read_line<R>(input: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if input.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Why the read loop stopped.
enum LoopExit {
    /// quit, exit, end of input, or Ctrl-C.
    User,
    /// The event stream ended while chatting.
    Backend,
}

/// Trimmed username, or [`DEFAULT_USERNAME`] when blank.
pub fn resolve_username(raw: &str) -> String {
    match raw.trim() {
        "" => DEFAULT_USERNAME.to_string(),
        name => name.to_string(),
    }
}

pub struct Session<T: Transport> {
    transport: Arc<T>,
    identity: Arc<str>,
    channel: String,
    console: Console,
    shutdown_grace: Duration,
    state: SessionState,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, identity: Arc<str>, config: &ChatConfig, console: Console) -> Self {
        Self {
            transport: Arc::new(transport),
            identity,
            channel: config.channel.clone(),
            console,
            shutdown_grace: config.shutdown_grace,
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn enter(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state changed");
        self.state = next;
    }

    /// Drive the session from AwaitingConnection to Closed.
    pub async fn run<R>(&mut self, events: EventStream, input: &mut R) -> ChatResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.enter(SessionState::AwaitingConnection);
        let (gate_tx, gate_rx) = oneshot::channel();
        let router = Router::new(self.identity.clone(), self.console.clone(), gate_tx);
        let mut router: JoinHandle<()> = tokio::spawn(router.run(events));

        if let Err(e) = self.transport.subscribe(&self.channel, true).await {
            router.abort();
            return Err(e);
        }

        let ready = tokio::select! {
            gate = gate_rx => gate.is_ok(),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted while connecting");
                self.close(router, JoinSet::new()).await;
                return Ok(());
            }
        };
        if !ready {
            router.abort();
            self.enter(SessionState::Closed);
            return Err(ChatError::Transport(
                "event stream ended before the connection was established".into(),
            ));
        }

        self.enter(SessionState::Chatting);
        let mut inflight = JoinSet::new();
        let exit = self.chat(input, &mut router, &mut inflight).await;
        self.close(router, inflight).await;
        match exit {
            LoopExit::User => Ok(()),
            LoopExit::Backend => Err(ChatError::Transport(
                "connection to PubNub was lost".into(),
            )),
        }
    }

    /// Read loop. Publishes still in flight are left in `inflight`.
    async fn chat<R>(
        &mut self,
        input: &mut R,
        router: &mut JoinHandle<()>,
        inflight: &mut JoinSet<()>,
    ) -> LoopExit
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            self.console.prompt(INPUT_PROMPT);
            let line = tokio::select! {
                line = read_line(input) => match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to read input: {e}");
                        None
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    None
                }
                _ = &mut *router => {
                    warn!("Event stream ended while chatting");
                    return LoopExit::Backend;
                }
            };
            // Reap finished publishes so the set stays small.
            while inflight.try_join_next().is_some() {}

            let Some(line) = line else {
                debug!("Input closed");
                return LoopExit::User;
            };
            match classify(&line) {
                Input::Blank => continue,
                Input::Quit => return LoopExit::User,
                Input::Chat(text) => {
                    let record = codec::encode(&ChatMessage::now(&*self.identity, text));
                    let transport = Arc::clone(&self.transport);
                    let channel = self.channel.clone();
                    inflight.spawn(async move {
                        // Failures are logged by the transport; the loop never waits on them.
                        if let Err(e) = transport.publish(&channel, &record).await {
                            debug!("Publish dropped: {e}");
                        }
                    });
                }
            }
        }
    }

    async fn close(&mut self, router: JoinHandle<()>, mut inflight: JoinSet<()>) {
        self.enter(SessionState::Closing);
        while let Some(res) = inflight.join_next().await {
            if let Err(e) = res {
                warn!("Publish task failed: {e}");
            }
        }
        self.transport.unsubscribe_all().await;
        tokio::time::sleep(self.shutdown_grace).await;
        self.console.line("👋 Goodbye!");
        router.abort();
        self.enter(SessionState::Closed);
    }
}

/// Full client: validate config, ask for a username, connect, and chat.
///
/// Configuration errors are returned before any prompt or network activity.
pub async fn run<R>(config: ChatConfig, console: Console, mut input: R) -> ChatResult<()>
where
    R: AsyncBufRead + Unpin,
{
    config.validate()?;

    console.prompt(USERNAME_PROMPT);
    let raw = match read_line(&mut input).await {
        Ok(raw) => raw.unwrap_or_default(),
        Err(e) => {
            warn!("Failed to read username: {e}");
            String::new()
        }
    };
    let username = resolve_username(&raw);

    console.line(&format!(
        "Welcome {username}! You're now entering the chat room."
    ));
    console.line("Type 'quit' to exit the chat.");
    console.line("=============================");

    let (transport, events) = PubNubTransport::connect(&config, &username)?;
    info!(%username, channel = %config.channel, "Joining chat");
    let mut session = Session::new(transport, Arc::from(username), &config, console);
    session.run(events, &mut input).await
}
