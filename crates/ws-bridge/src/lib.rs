//! Two-role WebSocket relay engine for the stream-bridge project.
//!
//! This crate implements the bridge between a loopback-restricted sender (a
//! wearable's companion runtime that can only open connections to
//! `localhost`) and a receiver on the local network. Two listeners accept one
//! WebSocket connection each — a "device" side and a "client" side — and
//! every data frame read from one side is forwarded verbatim to the other
//! side's most recently accepted connection.
//!
//! # Architecture
//!
//! ```text
//! device (localhost)  <--WS-->  stream-bridge  <--WS-->  client (LAN)
//!                                     |
//!                          [ConnectionRegistry]
//! ```
//!
//! The registry holds at most one connection per role. A newly accepted
//! connection overwrites its role's slot; the relay loop attached to the
//! displaced connection keeps running against its own socket until that
//! socket closes. Frames read while the opposite slot is empty or closed are
//! dropped — the bridge never buffers.

pub mod listener;
pub mod peer;
pub mod registry;
pub mod relay;

// Re-export the primary public types at the crate root for convenience.
pub use listener::{BridgeListener, ListenerConfig};
pub use peer::PeerHandle;
pub use registry::{ConnectionRegistry, Role};
