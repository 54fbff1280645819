//! Maps a ledger time to the protocol implementation active at that time.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::batch_writer::{BatchWriter, DefaultBatchWriter};
use crate::cas::Cas;
use crate::config::{ProtocolParameters, ProtocolVersionConfig};
use crate::download_manager::DownloadManager;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::ledger::Ledger;
use crate::operation::{Operation, ParseMode};
use crate::operation_processor::{DefaultOperationProcessor, OperationProcessor};
use crate::queue::OperationQueue;
use crate::transaction_processor::{DefaultTransactionProcessor, TransactionProcessor};

/// Implementation names a version table entry may refer to.
pub const KNOWN_VERSIONS: &[&str] = &["1.0"];

/// Shared collaborators every protocol version is built from.
#[derive(Clone)]
pub struct VersionContext {
    pub queue: Arc<OperationQueue>,
    pub cas: Arc<dyn Cas>,
    pub ledger: Arc<dyn Ledger>,
    pub downloads: Arc<DownloadManager>,
    pub ledger_timeout: Duration,
    pub cas_timeout: Duration,
}

/// Everything time-sensitive, built once per protocol version.
pub struct ProtocolComponents {
    pub version: String,
    pub start_time: u64,
    pub parameters: ProtocolParameters,
    pub operation_processor: Arc<dyn OperationProcessor>,
    pub batch_writer: Arc<dyn BatchWriter>,
    pub transaction_processor: Arc<dyn TransactionProcessor>,
}

impl std::fmt::Debug for ProtocolComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolComponents")
            .field("version", &self.version)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

impl ProtocolComponents {
    pub fn parse_operation(&self, buffer: &[u8], mode: ParseMode) -> Result<Operation> {
        self.operation_processor.parse_operation(buffer, mode)
    }
}

pub struct VersionManager {
    /// Sorted by `start_time`, ascending, no duplicates.
    entries: Vec<Arc<ProtocolComponents>>,
}

impl VersionManager {
    pub fn new(configs: &[ProtocolVersionConfig], context: &VersionContext) -> Result<Self> {
        if configs.is_empty() {
            return Err(SidetreeError::new(ErrorCode::VersionTableEmpty, "no protocol versions configured"));
        }
        let mut configs = configs.to_vec();
        configs.sort_by_key(|c| c.start_time);
        if let Some(pair) = configs.windows(2).find(|w| w[0].start_time == w[1].start_time) {
            return Err(SidetreeError::new(
                ErrorCode::ConfigInvalid,
                format!("versions {} and {} share start time {}", pair[0].version, pair[1].version, pair[0].start_time),
            ));
        }

        let entries = configs
            .into_iter()
            .map(|config| build_components(config, context).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        for entry in &entries {
            info!(version = %entry.version, start_time = entry.start_time, "protocol version loaded");
        }
        Ok(Self { entries })
    }

    /// Components whose `start_time` is the greatest one not after `time`.
    pub fn components_for(&self, time: u64) -> Result<Arc<ProtocolComponents>> {
        let index = self.entries.partition_point(|e| e.start_time <= time);
        if index == 0 {
            return Err(SidetreeError::new(
                ErrorCode::VersionNotFoundForTime,
                format!("no protocol version covers ledger time {}", time),
            ));
        }
        Ok(self.entries[index - 1].clone())
    }

    pub fn versions(&self) -> impl Iterator<Item = &ProtocolComponents> {
        self.entries.iter().map(|e| e.as_ref())
    }
}

fn build_components(config: ProtocolVersionConfig, context: &VersionContext) -> Result<ProtocolComponents> {
    match config.version.as_str() {
        "1.0" => {
            let parameters = config.parameters;
            Ok(ProtocolComponents {
                operation_processor: Arc::new(DefaultOperationProcessor::new(parameters.clone())),
                batch_writer: Arc::new(DefaultBatchWriter::new(
                    context.queue.clone(),
                    context.cas.clone(),
                    context.ledger.clone(),
                    parameters.clone(),
                    context.ledger_timeout,
                    context.cas_timeout,
                )),
                transaction_processor: Arc::new(DefaultTransactionProcessor::new(
                    context.downloads.clone(),
                    parameters.clone(),
                )),
                version: config.version,
                start_time: config.start_time,
                parameters,
            })
        }
        other => Err(SidetreeError::new(
            ErrorCode::VersionUnknownImplementation,
            format!("'{}' is not one of {:?}", other, KNOWN_VERSIONS),
        )),
    }
}
