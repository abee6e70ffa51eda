//! Mailbox collaborator seam.
//!
//! Durable storage lives behind this trait. The in-memory implementation
//! backs tests and single-process runs where losing mail on restart is fine.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use peermail_core::error::Result;

/// Listing entry. `size` is in octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub id: String,
    pub size: usize,
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Available messages, oldest first.
    async fn list_messages(&self) -> Result<Vec<MessageInfo>>;
    async fn message_content(&self, id: &str) -> Result<Option<Vec<u8>>>;
    /// Returns false if `id` was not present.
    async fn delete_message(&self, id: &str) -> Result<bool>;
    async fn store_message(&self, id: &str, raw: Vec<u8>) -> Result<()>;
}

struct Stored {
    seq: u64,
    raw: Vec<u8>,
}

#[derive(Default)]
pub struct InMemoryMailbox {
    messages: DashMap<String, Stored>,
    seq: AtomicU64,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[async_trait]
impl Mailbox for InMemoryMailbox {
    async fn list_messages(&self) -> Result<Vec<MessageInfo>> {
        let mut out: Vec<(u64, MessageInfo)> = self
            .messages
            .iter()
            .map(|m| {
                (
                    m.value().seq,
                    MessageInfo {
                        id: m.key().clone(),
                        size: m.value().raw.len(),
                    },
                )
            })
            .collect();
        out.sort_by_key(|(seq, _)| *seq);
        Ok(out.into_iter().map(|(_, info)| info).collect())
    }

    async fn message_content(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.messages.get(id).map(|m| m.value().raw.clone()))
    }

    async fn delete_message(&self, id: &str) -> Result<bool> {
        Ok(self.messages.remove(id).is_some())
    }

    async fn store_message(&self, id: &str, raw: Vec<u8>) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.messages.insert(id.to_string(), Stored { seq, raw });
        Ok(())
    }
}
