//! Persistence seam for gate rules and the whitelist.

use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use peermail_core::error::{PeerMailError, Result};

/// Whole-collection repository: the stored order is the collection order.
pub trait Repository<T>: Send + Sync {
    fn load(&self) -> Result<Vec<T>>;
    fn save(&self, items: &[T]) -> Result<()>;
}

/// JSON array on disk. A missing file reads as empty; saves go through a
/// temp file in the same directory followed by a rename.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Repository<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Vec<T>> {
        let s = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PeerMailError::Storage(format!(
                    "read {} failed: {e}",
                    self.path.display()
                )))
            }
        };
        if s.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&s).map_err(|e| {
            PeerMailError::Storage(format!("parse {} failed: {e}", self.path.display()))
        })
    }

    fn save(&self, items: &[T]) -> Result<()> {
        let body = serde_json::to_string_pretty(items)
            .map_err(|e| PeerMailError::Storage(format!("encode failed: {e}")))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                PeerMailError::Storage(format!("create {} failed: {e}", dir.display()))
            })?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body).map_err(|e| {
            PeerMailError::Storage(format!("write {} failed: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            PeerMailError::Storage(format!("replace {} failed: {e}", self.path.display()))
        })
    }
}

/// In-memory repository (tests, ephemeral deployments).
pub struct MemoryStore<T> {
    items: Mutex<Vec<T>>,
}

impl<T: Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }
}

impl<T: Clone> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Repository<T> for MemoryStore<T>
where
    T: Clone + Send,
{
    fn load(&self) -> Result<Vec<T>> {
        self.items
            .lock()
            .map(|g| g.clone())
            .map_err(|_| PeerMailError::Internal("memory store poisoned".into()))
    }

    fn save(&self, items: &[T]) -> Result<()> {
        let mut g = self
            .items
            .lock()
            .map_err(|_| PeerMailError::Internal("memory store poisoned".into()))?;
        *g = items.to_vec();
        Ok(())
    }
}
