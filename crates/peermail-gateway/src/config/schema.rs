use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use peermail_core::address::RoomId;
use peermail_core::error::{PeerMailError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub smtp: SmtpSection,

    #[serde(default)]
    pub pop3: Pop3Section,

    #[serde(default)]
    pub peers: PeerSection,

    #[serde(default)]
    pub gate: GateSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PeerMailError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.smtp.validate()?;
        self.pop3.validate()?;
        self.peers.validate()?;

        Ok(())
    }
}

fn check_listen(field: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|_| PeerMailError::Config(format!("{field} must be a valid SocketAddr: {value}")))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpSection {
    #[serde(default = "default_smtp_listen")]
    pub listen: String,

    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for SmtpSection {
    fn default() -> Self {
        Self {
            listen: default_smtp_listen(),
            hostname: default_hostname(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl SmtpSection {
    pub fn validate(&self) -> Result<()> {
        check_listen("smtp.listen", &self.listen)?;
        if self.hostname.trim().is_empty() {
            return Err(PeerMailError::Config("smtp.hostname must not be empty".into()));
        }
        if self.max_message_bytes == 0 {
            return Err(PeerMailError::Config("smtp.max_message_bytes must be > 0".into()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        check_listen("smtp.listen", &self.listen)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pop3Section {
    #[serde(default = "default_pop3_listen")]
    pub listen: String,
}

impl Default for Pop3Section {
    fn default() -> Self {
        Self {
            listen: default_pop3_listen(),
        }
    }
}

impl Pop3Section {
    pub fn validate(&self) -> Result<()> {
        check_listen("pop3.listen", &self.listen).map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        check_listen("pop3.listen", &self.listen)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerSection {
    /// Direct-TCP substrate listener; `None` disables inbound peers.
    #[serde(default)]
    pub listen: Option<String>,

    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    #[serde(default)]
    pub dial: Vec<DialTarget>,
}

impl Default for PeerSection {
    fn default() -> Self {
        Self {
            listen: None,
            ack_timeout_ms: default_ack_timeout_ms(),
            dial: Vec::new(),
        }
    }
}

impl PeerSection {
    pub fn validate(&self) -> Result<()> {
        if let Some(listen) = &self.listen {
            check_listen("peers.listen", listen)?;
        }
        if !(1000..=600000).contains(&self.ack_timeout_ms) {
            return Err(PeerMailError::Config(
                "peers.ack_timeout_ms must be between 1000 and 600000".into(),
            ));
        }
        for d in &self.dial {
            RoomId::parse(&d.room).map_err(|_| {
                PeerMailError::Config(format!("peers.dial room is not a 64-hex id: {}", d.room))
            })?;
            if d.addr.trim().is_empty() {
                return Err(PeerMailError::Config("peers.dial addr must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DialTarget {
    pub room: String,
    pub addr: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateSection {
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    #[serde(default = "default_whitelist_path")]
    pub whitelist_path: PathBuf,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            whitelist_path: default_whitelist_path(),
        }
    }
}

fn default_smtp_listen() -> String {
    "127.0.0.1:2525".into()
}
fn default_hostname() -> String {
    "peermail.local".into()
}
fn default_max_message_bytes() -> usize {
    crate::smtp::DEFAULT_MAX_MESSAGE_BYTES
}
fn default_pop3_listen() -> String {
    "127.0.0.1:1110".into()
}
fn default_ack_timeout_ms() -> u64 {
    30000
}
fn default_rules_path() -> PathBuf {
    PathBuf::from("data/gate-rules.json")
}
fn default_whitelist_path() -> PathBuf {
    PathBuf::from("data/whitelist.json")
}
