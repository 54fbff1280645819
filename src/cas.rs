//! Content-addressable storage collaborator.
//!
//! Content is addressed by its encoded SHA2-256 multihash, the same form the
//! batch files use to reference each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::multihash;

#[async_trait]
pub trait Cas: Send + Sync {
    /// Stores `content` and returns its content hash.
    async fn write(&self, content: Vec<u8>) -> Result<String>;

    /// Fetches content by hash, refusing anything larger than `max_size` bytes.
    async fn read(&self, content_hash: &str, max_size: usize) -> Result<Vec<u8>>;
}

pub fn content_hash(content: &[u8]) -> Result<String> {
    multihash::hash_then_encode(content, multihash::SHA2_256)
}

/// In-process CAS with switches for simulating an unreliable network.
#[derive(Default)]
pub struct MemoryCas {
    files: DashMap<String, Vec<u8>>,
    withheld: DashSet<String>,
    delays: DashMap<String, Duration>,
    offline: AtomicBool,
}

impl MemoryCas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    /// Makes reads of `content_hash` report not-found until [`release`](Self::release).
    pub fn withhold(&self, content_hash: &str) {
        self.withheld.insert(content_hash.to_string());
    }

    pub fn release(&self, content_hash: &str) {
        self.withheld.remove(content_hash);
    }

    /// Delays every read of `content_hash`.
    pub fn set_delay(&self, content_hash: &str, delay: Duration) {
        self.delays.insert(content_hash.to_string(), delay);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl Cas for MemoryCas {
    async fn write(&self, content: Vec<u8>) -> Result<String> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SidetreeError::new(ErrorCode::CasUnavailable, "cas is offline"));
        }
        let hash = content_hash(&content)?;
        self.files.insert(hash.clone(), content);
        Ok(hash)
    }

    async fn read(&self, content_hash: &str, max_size: usize) -> Result<Vec<u8>> {
        let delay = self.delays.get(content_hash).map(|d| *d.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(SidetreeError::new(ErrorCode::CasUnavailable, "cas is offline"));
        }
        if self.withheld.contains(content_hash) {
            return Err(SidetreeError::new(ErrorCode::CasFileNotFound, content_hash.to_string()));
        }
        let file = self
            .files
            .get(content_hash)
            .ok_or_else(|| SidetreeError::new(ErrorCode::CasFileNotFound, content_hash.to_string()))?;
        if file.len() > max_size {
            return Err(SidetreeError::new(
                ErrorCode::CasFileTooLarge,
                format!("{} is {} bytes, limit is {}", content_hash, file.len(), max_size),
            ));
        }
        Ok(file.value().clone())
    }
}
