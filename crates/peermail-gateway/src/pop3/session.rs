//! POP3 session (RFC 1939 subset).
//!
//! Message numbers are 1-based positions in the listing snapshot taken when
//! the session enters TRANSACTION; they stay stable for the whole session.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::mailbox::{Mailbox, MessageInfo};

const CRLF: &str = "\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop3State {
    Authorization,
    Transaction,
    Update,
}

pub struct Pop3Session {
    mailbox: Arc<dyn Mailbox>,
    state: Pop3State,
    user: Option<String>,
    snapshot: Vec<MessageInfo>,
    deleted: BTreeSet<usize>,
}

fn ok(text: impl AsRef<str>) -> String {
    format!("+OK {}{CRLF}", text.as_ref())
}

fn err(text: impl AsRef<str>) -> String {
    format!("-ERR {}{CRLF}", text.as_ref())
}

/// Multi-line body: dot-stuffed, CRLF line endings, `.` terminator.
fn multiline(first: String, body: impl IntoIterator<Item = String>) -> String {
    let mut out = first;
    for line in body {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(&line);
        out.push_str(CRLF);
    }
    out.push('.');
    out.push_str(CRLF);
    out
}

fn content_lines(raw: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(raw);
    let text = text.strip_suffix("\r\n").or_else(|| text.strip_suffix('\n')).unwrap_or(text.as_ref());
    text.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect()
}

impl Pop3Session {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            mailbox,
            state: Pop3State::Authorization,
            user: None,
            snapshot: Vec::new(),
            deleted: BTreeSet::new(),
        }
    }

    pub fn greeting(&self) -> String {
        ok("peermail POP3 ready")
    }

    pub fn state(&self) -> Pop3State {
        self.state
    }

    /// True iff `line` is a QUIT command; the driver closes after the reply.
    pub fn is_quit(line: &str) -> bool {
        line.split_whitespace()
            .next()
            .is_some_and(|verb| verb.eq_ignore_ascii_case("QUIT"))
    }

    /// Process one request line and return the full reply text (CRLF
    /// terminated, possibly multi-line). Blank lines get an empty reply.
    pub async fn process_line(&mut self, line: &str) -> String {
        let line = line.trim();
        if line.is_empty() {
            return String::new();
        }
        let mut parts = line.split_whitespace();
        let verb = parts.next().unwrap_or_default().to_ascii_uppercase();
        let args: Vec<&str> = parts.collect();
        debug!(verb = %verb, state = ?self.state, "pop3 command");

        match verb.as_str() {
            "CAPA" => multiline(
                ok("Capability list follows"),
                ["USER", "UIDL", "TOP"].map(String::from),
            ),
            "NOOP" if self.state == Pop3State::Transaction => ok(""),
            "QUIT" => self.quit().await,
            "USER" => self.user_cmd(&args),
            "PASS" => self.pass_cmd().await,
            _ if self.state != Pop3State::Transaction => {
                err("command not valid in this state")
            }
            "STAT" => {
                let (n, size) = self.live().fold((0, 0), |(n, s), (_, m)| (n + 1, s + m.size));
                ok(format!("{n} {size}"))
            }
            "LIST" => self.list_cmd(&args, |m| m.size.to_string()),
            "UIDL" => self.list_cmd(&args, |m| m.id.clone()),
            "RETR" => self.retr_cmd(&args, None).await,
            "TOP" => match args.get(1).and_then(|k| k.parse::<usize>().ok()) {
                Some(k) => self.retr_cmd(&args, Some(k)).await,
                None => err("usage: TOP msg lines"),
            },
            "DELE" => match self.resolve(&args) {
                Ok(n) => {
                    self.deleted.insert(n);
                    ok(format!("message {} deleted", n + 1))
                }
                Err(reply) => reply,
            },
            "RSET" => {
                self.deleted.clear();
                let n = self.snapshot.len();
                ok(format!("maildrop has {n} messages"))
            }
            _ => err("unknown command"),
        }
    }

    fn live(&self) -> impl Iterator<Item = (usize, &MessageInfo)> {
        self.snapshot
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.deleted.contains(i))
    }

    /// 1-based message number argument -> snapshot index.
    fn resolve(&self, args: &[&str]) -> Result<usize, String> {
        let n: usize = args
            .first()
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| err("message number required"))?;
        if n == 0 || n > self.snapshot.len() {
            return Err(err("no such message"));
        }
        let idx = n - 1;
        if self.deleted.contains(&idx) {
            return Err(err(format!("message {n} already deleted")));
        }
        Ok(idx)
    }

    fn user_cmd(&mut self, args: &[&str]) -> String {
        if self.state != Pop3State::Authorization {
            return err("command not valid in this state");
        }
        match args.first() {
            Some(user) => {
                self.user = Some((*user).to_string());
                ok("send PASS")
            }
            None => err("usage: USER name"),
        }
    }

    async fn pass_cmd(&mut self) -> String {
        if self.state != Pop3State::Authorization {
            return err("command not valid in this state");
        }
        if self.user.is_none() {
            return err("USER first");
        }
        match self.mailbox.list_messages().await {
            Ok(list) => {
                self.snapshot = list;
                self.deleted.clear();
                self.state = Pop3State::Transaction;
                info!(user = ?self.user, messages = self.snapshot.len(), "pop3 maildrop opened");
                ok(format!("maildrop has {} messages", self.snapshot.len()))
            }
            Err(e) => {
                warn!(error = %e, "pop3 listing failed");
                err("maildrop unavailable")
            }
        }
    }

    fn list_cmd(&self, args: &[&str], field: impl Fn(&MessageInfo) -> String) -> String {
        if args.is_empty() {
            let count = self.live().count();
            return multiline(
                ok(format!("{count} messages")),
                self.live().map(|(i, m)| format!("{} {}", i + 1, field(m))),
            );
        }
        match self.resolve(args) {
            Ok(idx) => ok(format!("{} {}", idx + 1, field(&self.snapshot[idx]))),
            Err(reply) => reply,
        }
    }

    async fn retr_cmd(&self, args: &[&str], top: Option<usize>) -> String {
        let idx = match self.resolve(args) {
            Ok(idx) => idx,
            Err(reply) => return reply,
        };
        let info = &self.snapshot[idx];
        let raw = match self.mailbox.message_content(&info.id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return err("no such message"),
            Err(e) => {
                warn!(id = %info.id, error = %e, "pop3 fetch failed");
                return err("message unavailable");
            }
        };

        let lines = content_lines(&raw);
        let body: Vec<String> = match top {
            None => lines,
            Some(k) => {
                // headers, the blank separator, then k body lines
                let split = lines.iter().position(|l| l.is_empty()).unwrap_or(lines.len());
                let end = (split + 1 + k).min(lines.len());
                lines.into_iter().take(end).collect()
            }
        };
        let first = match top {
            None => ok(format!("{} octets", raw.len())),
            Some(_) => ok("top of message follows"),
        };
        multiline(first, body)
    }

    async fn quit(&mut self) -> String {
        if self.state != Pop3State::Transaction {
            return ok("bye");
        }
        self.state = Pop3State::Update;

        let mut failed = 0;
        for idx in std::mem::take(&mut self.deleted) {
            let id = &self.snapshot[idx].id;
            match self.mailbox.delete_message(id).await {
                Ok(_) => debug!(id = %id, "pop3 message deleted"),
                Err(e) => {
                    warn!(id = %id, error = %e, "pop3 delete failed");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return err(format!("{failed} messages not removed"));
        }
        ok("peermail POP3 signing off")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mailbox::InMemoryMailbox;

    async fn opened() -> (Pop3Session, Arc<InMemoryMailbox>) {
        let mb = Arc::new(InMemoryMailbox::new());
        mb.store_message("m1", b"Subject: one\r\n\r\nfirst\r\n.dot\r\n".to_vec()).await.unwrap();
        mb.store_message("m2", b"Subject: two\r\n\r\nl1\r\nl2\r\nl3".to_vec()).await.unwrap();
        let mut s = Pop3Session::new(mb.clone());
        assert!(s.process_line("USER me").await.starts_with("+OK"));
        assert!(s.process_line("PASS x").await.starts_with("+OK"));
        (s, mb)
    }

    #[tokio::test]
    async fn transaction_commands_need_login() {
        let mb = Arc::new(InMemoryMailbox::new());
        let mut s = Pop3Session::new(mb);
        assert!(s.greeting().starts_with("+OK"));
        assert!(s.process_line("STAT").await.starts_with("-ERR"));
        assert!(s.process_line("PASS x").await.starts_with("-ERR"));
        assert_eq!(s.state(), Pop3State::Authorization);
    }

    #[tokio::test]
    async fn stat_list_uidl() {
        let (mut s, _) = opened().await;
        let stat = s.process_line("STAT").await;
        assert!(stat.starts_with("+OK 2 "));

        let list = s.process_line("LIST").await;
        assert!(list.ends_with("\r\n.\r\n"));
        assert!(list.contains("\r\n1 "));
        assert!(list.contains("\r\n2 "));

        assert_eq!(s.process_line("UIDL 2").await, "+OK 2 m2\r\n");
        assert!(s.process_line("LIST 3").await.starts_with("-ERR"));
    }

    #[tokio::test]
    async fn retr_dot_stuffs_and_top_limits_body() {
        let (mut s, _) = opened().await;
        let retr = s.process_line("RETR 1").await;
        assert!(retr.contains("\r\n..dot\r\n"));
        assert!(retr.ends_with("\r\n.\r\n"));

        let top = s.process_line("TOP 2 1").await;
        assert!(top.contains("l1\r\n"));
        assert!(!top.contains("l2"));
    }

    #[tokio::test]
    async fn deletes_are_deferred_until_quit() {
        let (mut s, mb) = opened().await;
        assert!(s.process_line("DELE 1").await.starts_with("+OK"));
        assert!(s.process_line("DELE 1").await.starts_with("-ERR"));
        assert!(s.process_line("RETR 1").await.starts_with("-ERR"));
        assert!(s.process_line("STAT").await.starts_with("+OK 1 "));
        assert_eq!(mb.len(), 2);

        assert!(s.process_line("RSET").await.starts_with("+OK"));
        assert!(s.process_line("STAT").await.starts_with("+OK 2 "));

        s.process_line("DELE 2").await;
        assert!(Pop3Session::is_quit("quit"));
        assert!(s.process_line("QUIT").await.starts_with("+OK"));
        assert_eq!(s.state(), Pop3State::Update);
        assert_eq!(mb.len(), 1);
        assert!(mb.message_content("m1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_and_blank_lines() {
        let (mut s, _) = opened().await;
        assert!(s.process_line("XYZZY").await.starts_with("-ERR"));
        assert_eq!(s.process_line("   ").await, "");
    }

    #[tokio::test]
    async fn quit_with_trailing_arguments_still_closes() {
        let (mut s, mb) = opened().await;
        assert!(Pop3Session::is_quit("QUIT now"));
        assert!(Pop3Session::is_quit("  quit\r"));
        assert!(!Pop3Session::is_quit("QUITE"));
        assert!(!Pop3Session::is_quit(""));

        s.process_line("DELE 1").await;
        assert!(s.process_line("QUIT now").await.starts_with("+OK"));
        assert_eq!(s.state(), Pop3State::Update);
        assert_eq!(mb.len(), 1);
    }
}
