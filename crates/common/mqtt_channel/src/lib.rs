//! A library to connect the MQTT bus, publish messages and subscribe topics.
//!
//! ```no_run
//! use mqtt_channel::{Config, Connection, Message, MqttError, SinkExt, StreamExt, Topic};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MqttError> {
//!     // A client subscribes to its topics on connect
//!     let input_topics = "cbus/write/#".try_into()?;
//!     let config = Config::new("localhost", 1883)
//!         .with_session_name("cgateweb")
//!         .with_subscriptions(input_topics);
//!     let con = Connection::new(&config).await?;
//!
//!     // The connection is materialized by two channels
//!     let mut received_messages = con.received;
//!     let mut published_messages = con.published;
//!
//!     // Messages are published by sending them on the published channel
//!     let output_topic = Topic::new("hello/cgateweb")?;
//!     published_messages.send(Message::new(&output_topic, "Online")).await?;
//!
//!     // Messages are received from the subscriptions on the received channel
//!     let message = received_messages.next().await.ok_or(MqttError::ReadOnClosedConnection)?;
//!     println!("{}", message.payload_str()?);
//!
//!     Ok(())
//! }
//! ```
#![forbid(unsafe_code)]

mod config;
mod connection;
mod errors;
mod messages;
mod topics;

pub use config::*;
pub use connection::*;
pub use errors::*;
pub use messages::*;
pub use topics::*;

pub use futures::channel::mpsc::UnboundedReceiver;
pub use futures::channel::mpsc::UnboundedSender;
pub use futures::Sink;
pub use futures::SinkExt;
pub use futures::Stream;
pub use futures::StreamExt;

pub use rumqttc::QoS;
