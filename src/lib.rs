#![warn(missing_docs)]
//! Connect to Twitch chat (TMI) from a Rust application.
//!
//! This library speaks Twitch's IRC-flavored chat protocol over a
//! TLS-secured TCP connection and translates it into a caller-friendly
//! request/response + event API, running on the `tokio` runtime.
//!
//! # Getting started
//!
//! ```no_run
//! use twitch_tmi::{ClientConfig, EventKind, Payload, TmiClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), twitch_tmi::Error> {
//!     tracing_subscriber::fmt::init();
//!
//!     // default configuration joins chat anonymously
//!     let mut config = ClientConfig::default();
//!     config.channels = vec!["sodapoppin".to_owned()];
//!
//!     let client = TmiClient::new(config);
//!     client.on(EventKind::Chat, |payload| {
//!         if let Payload::Message(msg) = payload {
//!             println!("({}) {}: {}", msg.channel, msg.tags.len(), msg.text);
//!         }
//!     })?;
//!
//!     client.connect().await?;
//!
//!     // keep the executor alive; the reader runs as a background task
//!     futures_util::future::pending::<()>().await;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! * Line parser for IRC-with-tags, with the Twitch tag post-processing
//!   (boolean coercion, escape decoding, `badges`/`badge-info`/`emotes`
//!   expansion)
//! * Automatic reconnect with exponential backoff
//! * Three independently rate-limited outbound queues (messages, commands,
//!   joins) and transparent chunking of long messages
//! * Moderation/room commands (`ban`, `timeout`, `slow`, ...) that await
//!   their server acknowledgement and report success or failure
//! * A named event surface covering messages, subscriptions, raids, bans,
//!   room-state changes and connection lifecycle
//!
//! # Sending messages
//!
//! ```no_run
//! # use twitch_tmi::{ClientConfig, TmiClient};
//! # async fn example(client: TmiClient) -> Result<(), twitch_tmi::Error> {
//! client.say("a_channel", "Hello world!").await?;
//! client.timeout("a_channel", "a_user", 600, Some("spam")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Commands time out with [`Error::CommandTimedOut`] when the server does
//! not acknowledge them within 15 seconds, and fail with
//! [`Error::CommandFailed`] when the server reports a failure `msg-id`
//! (e.g. `bad_ban_self`).

pub mod client;
pub mod config;
pub mod emitter;
mod error;
pub mod events;
pub mod message;
mod queue;
mod transport;
pub mod utils;

pub use client::{ReadyState, TmiClient};
pub use config::{ClientConfig, ConnectionConfig, IdentityConfig, LoggingConfig};
pub use emitter::{EventEmitter, ListenerId};
pub use error::Error;
pub use events::{Ack, AckKind, ChatMessage, EventKind, Payload, SubMethods};
pub use message::{IrcMessage, TagValue, Tags};
