//! SMTP ingress: per-connection state machine plus its TCP listener.
//!
//! The session never routes mail itself. A completed transaction is handed
//! to a [`MailSink`] and the client gets `250` without waiting for delivery.

mod reply;
pub mod server;
mod session;

pub use reply::SmtpReply;
pub use session::{
    Envelope, MailSink, SmtpSession, SmtpState, SmtpTransaction, DEFAULT_MAX_MESSAGE_BYTES,
};
