//! Byte-stream plumbing.
//!
//! `lines` frames any stream into CR/LF-stripped lines. `tcp` is a minimal
//! direct-TCP peer substrate: dial known peers, accept inbound ones, and
//! hand each stream to the room named in its one-line hello.

pub mod lines;
pub mod tcp;
