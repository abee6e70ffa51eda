//! peermail core: transport-agnostic primitives, error types, and wire codecs.
//!
//! This crate defines the address rules, protocol line parsing, the peer wire
//! packet, and the error surface shared by the gateway and its tests. It
//! carries no runtime dependencies so it can be reused outside the gateway.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `PeerMailError`/`Result` so a malformed line
//! or packet from the network can never bring the process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod address;
pub mod error;
pub mod mail;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorCode, PeerMailError, Result};

pub use address::{parse_address, Address, RoomId};
