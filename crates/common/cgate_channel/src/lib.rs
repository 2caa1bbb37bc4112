//! A library to connect one C-Gate TCP port, send commands and receive lines.
//!
//! C-Gate speaks a newline-terminated ASCII protocol on two ports: a command
//! port answering requests and an event port streaming unsolicited updates.
//! [`CGateConnection`] keeps one such link open for the lifetime of the
//! process, reconnecting with exponential backoff, and is materialized by
//! three channels:
//!
//! ```no_run
//! use cgate_channel::{CGateConnection, Config, LinkKind};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = Config::new("127.0.0.1", 20023, LinkKind::Command);
//! let mut link = CGateConnection::new(&config);
//!
//! // Commands are sent on the commands channel
//! let _ = link.commands.send("EVENT ON\n".into());
//!
//! // Complete response lines arrive on the lines channel
//! while let Some(line) = link.lines.recv().await {
//!     println!("{line}");
//! }
//! # }
//! ```
#![forbid(unsafe_code)]

mod config;
mod connection;
mod line_buffer;

pub use config::*;
pub use connection::*;
pub use line_buffer::*;
