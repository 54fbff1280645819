//! Fetches and validates the files behind one transaction and rebuilds its operations.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::batch::anchor_file::{self, AnchorFile};
use crate::batch::map_file::{self, MapFile};
use crate::batch::{chunk_file, SignedOperationReference};
use crate::config::ProtocolParameters;
use crate::download_manager::DownloadManager;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::models::{AnchoredOperation, OperationType, Transaction};
use crate::operation::{Operation, ParseMode};
use crate::util::multihash;

#[async_trait]
pub trait TransactionProcessor: Send + Sync {
    /// Operations anchored by `transaction`, in operation-index order.
    ///
    /// Retryable errors mean the files could not be fetched right now; any
    /// other error means the transaction is invalid and anchors nothing.
    async fn fetch_operations(&self, transaction: &Transaction) -> Result<Vec<AnchoredOperation>>;
}

pub struct DefaultTransactionProcessor {
    downloads: Arc<DownloadManager>,
    parameters: ProtocolParameters,
}

impl DefaultTransactionProcessor {
    pub fn new(downloads: Arc<DownloadManager>, parameters: ProtocolParameters) -> Self {
        Self { downloads, parameters }
    }

    fn rebuild(
        &self,
        transaction: &Transaction,
        anchor: &AnchorFile,
        map: &MapFile,
        deltas: Vec<String>,
    ) -> Result<Vec<AnchoredOperation>> {
        let ops = &anchor.operations;
        let with_delta = ops.create.len() + ops.recover.len() + map.update_operations().len();
        if deltas.len() != with_delta {
            return Err(SidetreeError::new(
                ErrorCode::ChunkFileDeltaCountMismatch,
                format!("chunk file has {} deltas, expected {}", deltas.len(), with_delta),
            ));
        }
        let mut deltas = deltas.into_iter();
        let mut requests: Vec<(OperationType, serde_json::Value)> = Vec::with_capacity(with_delta + ops.deactivate.len());

        for create in &ops.create {
            requests.push((
                OperationType::Create,
                json!({"type": "create", "suffix_data": create.suffix_data, "delta": deltas.next()}),
            ));
        }
        for recover in &ops.recover {
            requests.push((OperationType::Recover, signed_request("recover", recover, deltas.next())));
        }
        for deactivate in &ops.deactivate {
            requests.push((OperationType::Deactivate, signed_request("deactivate", deactivate, None)));
        }
        for update in map.update_operations() {
            requests.push((OperationType::Update, signed_request("update", update, deltas.next())));
        }

        requests
            .into_iter()
            .enumerate()
            .map(|(index, (operation_type, request))| {
                let buffer = serde_json::to_vec(&request)
                    .map_err(|e| SidetreeError::new(ErrorCode::OperationRequestNotJson, e.to_string()))?;
                let operation = Operation::parse(&buffer, &self.parameters, ParseMode::Anchored)?;
                Ok(AnchoredOperation {
                    operation_type,
                    did_suffix: operation.did_suffix().to_string(),
                    operation_buffer: buffer,
                    transaction_number: transaction.transaction_number,
                    transaction_time: transaction.transaction_time,
                    operation_index: index,
                })
            })
            .collect()
    }
}

fn signed_request(kind: &str, reference: &SignedOperationReference, delta: Option<String>) -> serde_json::Value {
    let mut request = json!({
        "type": kind,
        "did_suffix": reference.did_suffix,
        "signed_data": reference.signed_data,
    });
    if let Some(delta) = delta {
        request["delta"] = json!(delta);
    }
    request
}

#[async_trait]
impl TransactionProcessor for DefaultTransactionProcessor {
    async fn fetch_operations(&self, transaction: &Transaction) -> Result<Vec<AnchoredOperation>> {
        let params = &self.parameters;

        // 1. Anchor string and declared count.
        let anchor_string = transaction.parsed_anchor_string()?;
        if anchor_string.operation_count > params.max_operations_per_batch {
            return Err(SidetreeError::new(
                ErrorCode::AnchorStringOperationCountExceedsLimit,
                format!("{} operations, limit is {}", anchor_string.operation_count, params.max_operations_per_batch),
            ));
        }
        multihash::validate_encoded_hash(&anchor_string.anchor_file_hash, params.hash_algorithm_in_multihash_code)
            .map_err(|e| SidetreeError::new(ErrorCode::AnchorStringInvalidFormat, e.to_string()))?;

        // 2. Anchor file.
        let bytes = self.downloads.download(&anchor_string.anchor_file_hash, params.max_anchor_file_size_in_bytes).await?;
        let anchor = anchor_file::parse(&bytes, params)?;

        // 3. Map file.
        let bytes = self.downloads.download(&anchor.map_file_hash, params.max_map_file_size_in_bytes).await?;
        let map = map_file::parse(&bytes, params)?;

        let total = anchor.operation_count() + map.update_operations().len();
        if total != anchor_string.operation_count {
            return Err(SidetreeError::new(
                ErrorCode::AnchorFileOperationCountMismatch,
                format!("files hold {} operations, anchor string declares {}", total, anchor_string.operation_count),
            ));
        }
        let mut seen: HashSet<&str> = anchor.did_suffixes().into_iter().collect();
        if let Some(dup) = map.update_operations().iter().find(|u| !seen.insert(u.did_suffix.as_str())) {
            return Err(SidetreeError::new(
                ErrorCode::MapFileMultipleOperationsForTheSameDid,
                format!("{} also has an operation in the anchor file", dup.did_suffix),
            ));
        }

        // 4. Chunk file.
        let chunk_hash = map
            .chunk_file_hash()
            .ok_or_else(|| SidetreeError::new(ErrorCode::MapFileChunksPropertyInvalid, "map file names no chunk"))?;
        let bytes = self.downloads.download(chunk_hash, params.max_chunk_file_size_in_bytes).await?;
        let chunk = chunk_file::parse(&bytes, params)?;

        let operations = self.rebuild(transaction, &anchor, &map, chunk.deltas)?;
        debug!(
            transaction_number = transaction.transaction_number,
            operations = operations.len(),
            "transaction files validated"
        );
        Ok(operations)
    }
}
