//! Background producers and the live fan-out they feed.

pub mod heartbeat;
pub mod rooms;
pub mod synthetic;
