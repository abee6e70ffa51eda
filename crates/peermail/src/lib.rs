//! Top-level facade crate for peermail.
//!
//! Re-exports core types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use peermail_core::*;
}

pub mod gateway {
    pub use peermail_gateway::*;
}
