//! Sender allow-list (unordered).
//!
//! Entry forms:
//! - `alice@example.com`: exact address, case-insensitive
//! - `@example.com` or `*@example.com`: any sender at exactly that domain
//! - `*.example.com`: that domain or any subdomain

use std::sync::Mutex;

use tracing::warn;

use peermail_core::error::{PeerMailError, Result};

use super::matcher::{domain_matches, domain_of};
use super::store::Repository;

fn entry_matches(entry: &str, sender: &str) -> bool {
    let entry = entry.trim();
    let sender = sender.trim();

    if let Some(domain) = entry.strip_prefix("*@").or_else(|| entry.strip_prefix('@')) {
        return domain_matches(domain, domain_of(sender));
    }
    if entry.starts_with("*.") {
        return domain_matches(entry, domain_of(sender));
    }
    entry.eq_ignore_ascii_case(sender)
}

pub struct Whitelist {
    store: Box<dyn Repository<String>>,
    write_lock: Mutex<()>,
}

impl Whitelist {
    pub fn new(store: Box<dyn Repository<String>>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.store.load()
    }

    /// Add an entry; returns `false` if an equal entry (case-insensitive) exists.
    pub fn add(&self, entry: &str) -> Result<bool> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(PeerMailError::BadRequest("whitelist entry must not be empty".into()));
        }
        let _g = self
            .write_lock
            .lock()
            .map_err(|_| PeerMailError::Internal("whitelist lock poisoned".into()))?;
        let mut entries = self.store.load()?;
        if entries.iter().any(|e| e.eq_ignore_ascii_case(entry)) {
            return Ok(false);
        }
        entries.push(entry.to_string());
        self.store.save(&entries)?;
        Ok(true)
    }

    pub fn remove(&self, entry: &str) -> Result<bool> {
        let _g = self
            .write_lock
            .lock()
            .map_err(|_| PeerMailError::Internal("whitelist lock poisoned".into()))?;
        let mut entries = self.store.load()?;
        let before = entries.len();
        entries.retain(|e| !e.eq_ignore_ascii_case(entry.trim()));
        if entries.len() == before {
            return Ok(false);
        }
        self.store.save(&entries)?;
        Ok(true)
    }

    /// Load failures are logged and read as "not allowed".
    pub fn is_allowed(&self, sender: &str) -> bool {
        match self.store.load() {
            Ok(entries) => entries.iter().any(|e| entry_matches(e, sender)),
            Err(e) => {
                warn!(error = %e, "whitelist load failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_forms() {
        assert!(entry_matches("Alice@Example.com", "alice@example.com"));
        assert!(entry_matches("@example.com", "bob@EXAMPLE.com"));
        assert!(entry_matches("*@example.com", "bob@example.com"));
        assert!(!entry_matches("@example.com", "bob@mail.example.com"));
        assert!(entry_matches("*.example.com", "bob@mail.example.com"));
        assert!(entry_matches("*.example.com", "bob@example.com"));
        assert!(!entry_matches("*.example.com", "bob@badexample.com"));
    }
}
