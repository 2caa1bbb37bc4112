//! The C-Gate side of the bridge: outbound command formatting and
//! classification of the lines coming back on the two ports.

pub mod command;
pub mod event;
pub mod wire;
