//! Minimal Source RCON client.
//!
//! Used by the `rcon` probe to verify a game server answers console
//! commands over its network RCON port.
mod client;
pub mod packet;

pub use client::RconClient;
pub use packet::Packet;
