//! Glue between the protocol surfaces and the rooms.
//!
//! - `outbound::Router`: SMTP completion -> recipient room -> reliable send.
//! - `inbound::InboundPipeline`: room MESSAGE -> gate -> mailbox -> ACK.

pub mod inbound;
pub mod outbound;

pub use inbound::{HeldMessage, InboundPipeline};
pub use outbound::Router;
