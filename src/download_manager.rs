//! Bounded-concurrency CAS fetches with a per-fetch timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::cas::Cas;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::deadline;

pub struct DownloadManager {
    cas: Arc<dyn Cas>,
    permits: Semaphore,
    timeout: Duration,
}

impl DownloadManager {
    pub fn new(cas: Arc<dyn Cas>, max_concurrent_downloads: usize, timeout: Duration) -> Self {
        Self { cas, permits: Semaphore::new(max_concurrent_downloads.max(1)), timeout }
    }

    pub async fn download(&self, content_hash: &str, max_size: usize) -> Result<Vec<u8>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SidetreeError::new(ErrorCode::CasUnavailable, e.to_string()))?;
        debug!(content_hash, max_size, "downloading");
        deadline::within(self.timeout, ErrorCode::CasTimeout, self.cas.read(content_hash, max_size)).await
    }
}
