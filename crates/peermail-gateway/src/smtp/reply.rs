use std::borrow::Cow;
use std::fmt;

/// One single-line SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub text: Cow<'static, str>,
}

impl SmtpReply {
    pub fn new(code: u16, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    pub fn queued() -> Self {
        Self::new(250, "OK queued")
    }

    pub fn start_data() -> Self {
        Self::new(354, "Start mail input; end with <CRLF>.<CRLF>")
    }

    pub fn unrecognized() -> Self {
        Self::new(500, "Syntax error, command unrecognized")
    }

    pub fn syntax(detail: &'static str) -> Self {
        Self::new(501, detail)
    }

    pub fn bad_sequence() -> Self {
        Self::new(503, "Bad sequence of commands")
    }

    pub fn rejected_recipient() -> Self {
        Self::new(550, "Mailbox unavailable: expected user@<64-hex room id>")
    }

    pub fn too_large() -> Self {
        Self::new(552, "Requested mail action aborted: exceeded storage allocation")
    }

    /// 221: the connection layer closes after writing this.
    pub fn is_closing(&self) -> bool {
        self.code == 221
    }

    /// Wire form including CRLF.
    pub fn to_line(&self) -> String {
        format!("{self}\r\n")
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}
