//! cgateweb bridges a Clipsal C-Bus installation, fronted by the C-Gate
//! daemon, to an MQTT broker.
//!
//! Inbound `cbus/write/...` messages are translated into C-Gate wire
//! commands; C-Gate events and responses come back as retained
//! `cbus/read/...` state topics; the C-Gate network tree feeds Home
//! Assistant MQTT discovery.

pub mod address;
pub mod bridge;
pub mod cgate;
pub mod discovery;
pub mod labels;
pub mod level_bus;
pub mod logging;
pub mod settings;
pub mod state;
pub mod translator;
