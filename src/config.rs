//! Node configuration and per-version protocol parameters.
//!
//! Both are plain values handed to constructors; nothing reads them from
//! global state. Protocol parameters are looked up per ledger time through the
//! [`VersionManager`](crate::version_manager::VersionManager).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::util::multihash;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Method segment of DIDs served by this node, e.g. `sidetree` in `did:sidetree:<suffix>`.
    pub did_method_name: String,
    pub batching_interval_in_seconds: u64,
    pub observing_interval_in_seconds: u64,
    pub max_concurrent_downloads: usize,
    pub cas_fetch_timeout_in_seconds: u64,
    pub ledger_timeout_in_seconds: u64,
    pub unresolvable_retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            did_method_name: "sidetree".to_string(),
            batching_interval_in_seconds: 10,
            observing_interval_in_seconds: 10,
            max_concurrent_downloads: 20,
            cas_fetch_timeout_in_seconds: 10,
            ledger_timeout_in_seconds: 30,
            unresolvable_retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_json::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.did_method_name.is_empty() || self.did_method_name.contains(':') {
            bail!("did_method_name '{}' is not a valid method name", self.did_method_name);
        }
        if self.max_concurrent_downloads == 0 {
            bail!("max_concurrent_downloads must be at least 1");
        }
        if self.batching_interval_in_seconds == 0 || self.observing_interval_in_seconds == 0 {
            bail!("batching and observing intervals must be non-zero");
        }
        Ok(())
    }

    pub fn cas_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.cas_fetch_timeout_in_seconds)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_in_seconds)
    }
}

/// Backoff for transactions whose files could not be fetched.
///
/// The n-th retry is scheduled `base_delay * 2^n` after the first failed
/// fetch. After `max_retry_attempts` retries the transaction is marked
/// permanently unresolvable and no longer retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub base_delay_in_seconds: u64,
    pub max_retry_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base_delay_in_seconds: 60, max_retry_attempts: 10 }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> chrono::Duration {
        let factor = 1i64.checked_shl(attempt.min(32)).unwrap_or(i64::MAX);
        let secs = (self.base_delay_in_seconds as i64).saturating_mul(factor);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolParameters {
    pub hash_algorithm_in_multihash_code: u64,
    pub max_anchor_file_size_in_bytes: usize,
    pub max_map_file_size_in_bytes: usize,
    pub max_chunk_file_size_in_bytes: usize,
    pub max_number_of_operations_per_transaction_time: usize,
    pub max_number_of_transactions_per_transaction_time: usize,
    pub max_operations_per_batch: usize,
    pub max_delta_size_in_bytes: usize,
    pub max_patches_per_delta: usize,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            hash_algorithm_in_multihash_code: multihash::SHA2_256,
            max_anchor_file_size_in_bytes: 1_000_000,
            max_map_file_size_in_bytes: 1_000_000,
            max_chunk_file_size_in_bytes: 20_000_000,
            max_number_of_operations_per_transaction_time: 600_000,
            max_number_of_transactions_per_transaction_time: 300,
            max_operations_per_batch: 10_000,
            max_delta_size_in_bytes: 1_000,
            max_patches_per_delta: 100,
        }
    }
}

/// One row of the version table: from `start_time` on, `version` applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolVersionConfig {
    pub start_time: u64,
    pub version: String,
    #[serde(default)]
    pub parameters: ProtocolParameters,
}

impl ProtocolVersionConfig {
    pub fn list_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Self>> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).with_context(|| format!("reading versions {}", path.display()))?;
        let versions: Vec<Self> =
            serde_json::from_str(&data).with_context(|| format!("parsing versions {}", path.display()))?;
        if versions.is_empty() {
            bail!("{} lists no protocol versions", path.display());
        }
        Ok(versions)
    }
}
