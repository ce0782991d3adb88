//! Command channel of the runner.
//!
//! The runner serves a tiny HTTP API on a Unix socket in the server
//! directory:
//!
//! | path | field | effect |
//! |---|---|---|
//! | `/` | `command` | write the line to the console |
//! | `/rconPwUpdate` | `password` | rotate the live RCON password |
//!
//! Fields come from a form body or the query string. Responses are plain
//! text: 200 on success, 400 for a missing field, 403 when the peer is
//! not allowed by the ACL, 409 when the console cannot be written.

pub mod acl;
mod actix_error;
mod client;
pub mod handlers;
mod server;

pub use acl::{
    AclGate, AclPolicy, ConnectionIdentity, ConnectionPeer, GroupResolver, PeerCredentials,
    PeerSource, SystemGroups, authorize,
};
pub use client::{ChannelResponse, CommandSender, UnixCommandClient};
pub use handlers::{ChannelState, routes};
pub use server::{CommandChannel, CommandChannelHandle};
