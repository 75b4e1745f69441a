//! PubNub Pub/Sub client over the HTTP long-poll API.
//!
//! Implements the subset of the PubNub REST protocol a chat client needs:
//! subscribing to channels (with presence), publishing JSON messages, and
//! leaving channels on shutdown.
//!
//! # Features
//! - Credential validation before any network activity
//! - Long-poll subscribe with timetoken/region cursor
//! - Presence events from `-pnpres` channels
//! - Automatic reconnection with exponential backoff
//! - Single ordered event stream for status, message, and presence events
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), pubnub_realtime::Error> {
//! use pubnub_realtime::{Client, ClientConfig, Event};
//!
//! let config = ClientConfig::new("pub-c-...", "sub-c-...", "alice");
//! let mut client = Client::connect(config)?;
//! let mut events = client.events().ok_or(pubnub_realtime::Error::Closed)?;
//! client.subscribe("chat-room", true).await?;
//!
//! while let Some(event) = events.next().await {
//!     match event {
//!         Event::Message(msg) => println!("got: {}", msg.data),
//!         Event::Status(state) => println!("state: {state:?}"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;
pub mod protocol;
mod types;

pub use client::{Client, Events};
pub use types::{
    ClientConfig, ConnectionState, Error, Event, Message, Presence, PresenceAction,
    PublishResponse, TimingConfig, is_placeholder_key,
};
