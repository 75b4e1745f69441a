#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("config error: {0}")]
    Config(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<pubnub_realtime::Error> for ChatError {
    fn from(e: pubnub_realtime::Error) -> Self {
        match e {
            pubnub_realtime::Error::Config(msg) => ChatError::Config(msg),
            e @ pubnub_realtime::Error::Publish { .. } => ChatError::Publish(e.to_string()),
            other => ChatError::Transport(other.to_string()),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
