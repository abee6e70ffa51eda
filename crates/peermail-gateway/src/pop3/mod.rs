//! POP3 egress: list/retrieve/delete over the mailbox collaborator.
//!
//! Deletions are deferred: `DELE` marks, `QUIT` from TRANSACTION commits.

pub mod server;
mod session;

pub use session::{Pop3Session, Pop3State};
