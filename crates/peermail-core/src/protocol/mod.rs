//! Protocol modules (line commands + peer packets).
//!
//! - `command`: tokenizes one SMTP line into verb + argument and parses the
//!   `FROM:<...>` / `TO:<...>` path arguments.
//! - `packet`: newline-delimited JSON packets exchanged between room peers.
//!
//! Both parsers are panic-free: malformed input is reported as a value
//! (`None` / `PeerMailError`) instead of panicking or indexing raw buffers.

pub mod command;
pub mod packet;

pub use command::{parse_command, parse_path_arg, CommandLine};
pub use packet::{decode_mime, decode_packet, encode_packet, PeerPacket};
