//! Terminal chat over PubNub.
//!
//! The session reads a username, subscribes (with presence) to one channel,
//! prints what other participants say, and publishes each typed line until
//! the user types `quit` or `exit`.

pub mod codec;
pub mod config;
pub mod console;
pub mod error;
pub mod router;
pub mod session;
pub mod transport;

pub use config::ChatConfig;
pub use console::Console;
pub use error::{ChatError, ChatResult};
pub use session::run;
