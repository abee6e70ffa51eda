//! peermail gateway library entry.
//!
//! This crate wires the SMTP ingress, POP3 egress, peer rooms, gate and
//! mailbox into one gateway. It is consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod config;
pub mod gate;
pub mod mailbox;
pub mod pipeline;
pub mod pop3;
pub mod room;
pub mod smtp;
pub mod transport;
