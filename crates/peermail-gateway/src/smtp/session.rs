//! SMTP session state management

use std::sync::Arc;

use tracing::{debug, info};

use peermail_core::address::parse_address;
use peermail_core::protocol::command::{parse_command, parse_path_arg};

use super::reply::SmtpReply;

/// Default cap on one message body, counted over stored lines plus CRLFs.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Lines that end DATA collection.
const DATA_TERMINATORS: [&str; 4] = [".", ".\r", ".\n", ".\r\n"];

/// Current state of an SMTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Waiting for HELO/EHLO.
    Greeting,
    /// Greeted, no transaction open.
    Ready,
    /// MAIL FROM accepted.
    Mail,
    /// RCPT TO accepted; DATA may follow.
    Rcpt,
    /// Collecting message lines until the terminator.
    Data,
}

/// Transaction buffer owned by one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpTransaction {
    pub from: Option<String>,
    pub to: Option<String>,
    pub data: Vec<String>,
    /// Bytes the joined message would occupy.
    pub data_bytes: usize,
    /// Set once `data_bytes` passed the limit; further lines are discarded.
    pub overflowed: bool,
}

/// Completed transaction handed to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    /// Message lines joined with CRLF.
    pub raw: String,
}

/// Delivery callback. Must not block: implementations spawn their own work
/// and report failures through logging, never back to the SMTP client.
pub trait MailSink: Send + Sync {
    fn deliver(&self, envelope: Envelope);
}

/// State machine for one SMTP connection.
pub struct SmtpSession {
    hostname: Arc<str>,
    state: SmtpState,
    tx: SmtpTransaction,
    client: Option<String>,
    sink: Arc<dyn MailSink>,
    max_message_bytes: usize,
}

impl SmtpSession {
    pub fn new(hostname: impl Into<Arc<str>>, sink: Arc<dyn MailSink>) -> Self {
        Self {
            hostname: hostname.into(),
            state: SmtpState::Greeting,
            tx: SmtpTransaction::default(),
            client: None,
            sink,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Override the per-message size cap.
    pub fn with_message_limit(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    pub fn greeting(&self) -> SmtpReply {
        SmtpReply::new(220, format!("{} ESMTP peermail ready", self.hostname))
    }

    pub fn state(&self) -> SmtpState {
        self.state
    }

    pub fn transaction(&self) -> &SmtpTransaction {
        &self.tx
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    fn reset_transaction(&mut self) {
        self.tx = SmtpTransaction::default();
    }

    /// Feed one line (without its line ending). Returns `None` while DATA is
    /// being collected; otherwise exactly one reply.
    pub fn handle_line(&mut self, line: &str) -> Option<SmtpReply> {
        if self.state == SmtpState::Data {
            return self.handle_data_line(line);
        }
        Some(self.handle_command(line))
    }

    fn handle_data_line(&mut self, line: &str) -> Option<SmtpReply> {
        if DATA_TERMINATORS.contains(&line) {
            return Some(self.finish_data());
        }
        // only a literal ".." prefix is unescaped (one dot removed)
        let stored = match line.strip_prefix("..") {
            Some(rest) => format!(".{rest}"),
            None => line.to_string(),
        };
        if self.tx.overflowed {
            return None;
        }
        let sep = if self.tx.data.is_empty() { 0 } else { 2 };
        self.tx.data_bytes += sep + stored.len();
        if self.tx.data_bytes > self.max_message_bytes {
            debug!(limit = self.max_message_bytes, "message exceeds size limit; discarding");
            self.tx.overflowed = true;
            self.tx.data.clear();
            return None;
        }
        self.tx.data.push(stored);
        None
    }

    fn finish_data(&mut self) -> SmtpReply {
        let tx = std::mem::take(&mut self.tx);
        self.state = SmtpState::Ready;

        if tx.overflowed {
            info!(limit = self.max_message_bytes, "smtp message rejected: too large");
            return SmtpReply::too_large();
        }

        match (tx.from, tx.to) {
            (Some(from), Some(to)) => {
                let raw = tx.data.join("\r\n");
                info!(from = %from, to = %to, bytes = raw.len(), "smtp transaction complete");
                self.sink.deliver(Envelope { from, to, raw });
                SmtpReply::queued()
            }
            // unreachable through the state machine; DATA requires RCPT
            _ => SmtpReply::bad_sequence(),
        }
    }

    fn handle_command(&mut self, line: &str) -> SmtpReply {
        let Some(cmd) = parse_command(line) else {
            return SmtpReply::unrecognized();
        };
        debug!(verb = %cmd.verb, state = ?self.state, "smtp command");

        match cmd.verb.as_str() {
            "HELO" | "EHLO" => self.handle_helo(&cmd.verb, cmd.arg),
            "MAIL" => self.handle_mail(cmd.arg),
            "RCPT" => self.handle_rcpt(cmd.arg),
            "DATA" => self.handle_data(),
            "RSET" => {
                self.reset_transaction();
                if self.state != SmtpState::Greeting {
                    self.state = SmtpState::Ready;
                }
                SmtpReply::ok()
            }
            "NOOP" => SmtpReply::ok(),
            "QUIT" => SmtpReply::new(221, format!("{} closing connection", self.hostname)),
            _ => SmtpReply::unrecognized(),
        }
    }

    fn handle_helo(&mut self, verb: &str, arg: Option<&str>) -> SmtpReply {
        let Some(client) = arg.filter(|a| !a.is_empty()) else {
            return SmtpReply::syntax("HELO/EHLO requires a domain argument");
        };
        self.client = Some(client.to_string());
        self.reset_transaction();
        self.state = SmtpState::Ready;

        let text = if verb == "EHLO" {
            format!("{} greets {}", self.hostname, client)
        } else {
            format!("{} Hello {}", self.hostname, client)
        };
        SmtpReply::new(250, text)
    }

    fn handle_mail(&mut self, arg: Option<&str>) -> SmtpReply {
        if self.state == SmtpState::Greeting {
            return SmtpReply::bad_sequence();
        }
        let Some(from) = arg.and_then(|a| parse_path_arg(a, "FROM")) else {
            return SmtpReply::syntax("Syntax: MAIL FROM:<address>");
        };
        self.reset_transaction();
        self.tx.from = Some(from.to_string());
        self.state = SmtpState::Mail;
        SmtpReply::ok()
    }

    fn handle_rcpt(&mut self, arg: Option<&str>) -> SmtpReply {
        if !matches!(self.state, SmtpState::Mail | SmtpState::Rcpt) {
            return SmtpReply::bad_sequence();
        }
        let Some(to) = arg.and_then(|a| parse_path_arg(a, "TO")) else {
            return SmtpReply::syntax("Syntax: RCPT TO:<address>");
        };
        if let Err(e) = parse_address(to) {
            debug!(to = %to, error = %e, "recipient rejected");
            return SmtpReply::rejected_recipient();
        }
        self.tx.to = Some(to.to_string());
        self.state = SmtpState::Rcpt;
        SmtpReply::ok()
    }

    fn handle_data(&mut self) -> SmtpReply {
        if self.state != SmtpState::Rcpt {
            return SmtpReply::bad_sequence();
        }
        self.tx.data.clear();
        self.tx.data_bytes = 0;
        self.tx.overflowed = false;
        self.state = SmtpState::Data;
        SmtpReply::start_data()
    }
}
