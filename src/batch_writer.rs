//! Turns queued operations into chunk, map and anchor files plus one ledger write.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::batch::anchor_file::{self, AnchorFileOperations};
use crate::batch::anchor_string::AnchorString;
use crate::batch::{chunk_file, map_file, CreateReference, SignedOperationReference};
use crate::cas::{self, Cas};
use crate::config::ProtocolParameters;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::ledger::Ledger;
use crate::operation::{Operation, ParseMode};
use crate::queue::{OperationQueue, QueuedOperation};
use crate::util::deadline;

#[async_trait]
pub trait BatchWriter: Send + Sync {
    /// Writes one batch; returns the number of operations anchored.
    async fn write(&self) -> Result<usize>;
}

/// Compressed files of one batch, ready for upload.
struct BatchFiles {
    chunk: Vec<u8>,
    updates: Vec<SignedOperationReference>,
    anchor_operations: AnchorFileOperations,
}

pub struct DefaultBatchWriter {
    queue: Arc<OperationQueue>,
    cas: Arc<dyn Cas>,
    ledger: Arc<dyn Ledger>,
    parameters: ProtocolParameters,
    ledger_timeout: Duration,
    cas_timeout: Duration,
}

impl DefaultBatchWriter {
    pub fn new(
        queue: Arc<OperationQueue>,
        cas: Arc<dyn Cas>,
        ledger: Arc<dyn Ledger>,
        parameters: ProtocolParameters,
        ledger_timeout: Duration,
        cas_timeout: Duration,
    ) -> Self {
        Self { queue, cas, ledger, parameters, ledger_timeout, cas_timeout }
    }

    /// Builds the files for `operations`. Deltas go into the chunk in create,
    /// recover, update order.
    fn build_files(&self, operations: &[Operation]) -> Result<BatchFiles> {
        let mut anchor_operations = AnchorFileOperations::default();
        let mut create_deltas = Vec::new();
        let mut recover_deltas = Vec::new();
        let mut update_deltas = Vec::new();
        let mut updates = Vec::new();

        for operation in operations {
            match operation {
                Operation::Create(op) => {
                    anchor_operations.create.push(CreateReference { suffix_data: op.encoded_suffix_data.clone() });
                    create_deltas.extend(op.encoded_delta.clone());
                }
                Operation::Recover(op) => {
                    anchor_operations.recover.push(SignedOperationReference {
                        did_suffix: op.did_suffix.clone(),
                        signed_data: op.signed_data_jws.to_compact(),
                    });
                    recover_deltas.extend(op.encoded_delta.clone());
                }
                Operation::Deactivate(op) => {
                    anchor_operations.deactivate.push(SignedOperationReference {
                        did_suffix: op.did_suffix.clone(),
                        signed_data: op.signed_data_jws.to_compact(),
                    });
                }
                Operation::Update(op) => {
                    updates.push(SignedOperationReference {
                        did_suffix: op.did_suffix.clone(),
                        signed_data: op.signed_data_jws.to_compact(),
                    });
                    update_deltas.extend(op.encoded_delta.clone());
                }
            }
        }

        let deltas: Vec<String> = create_deltas.into_iter().chain(recover_deltas).chain(update_deltas).collect();
        let chunk = chunk_file::build(deltas)?;
        Ok(BatchFiles { chunk, updates, anchor_operations })
    }

    /// Largest prefix of `operations` whose files fit the size limits, with its files.
    fn fit(&self, operations: &[Operation]) -> Result<(usize, BatchFiles)> {
        let mut take = operations.len();
        loop {
            let files = self.build_files(&operations[..take])?;
            // Measured with a placeholder hash of the same length as the real ones.
            let placeholder = cas::content_hash(b"")?;
            let map = map_file::build(&placeholder, files.updates.clone())?;
            let anchor = anchor_file::build(&placeholder, files.anchor_operations.clone())?;
            let fits = files.chunk.len() <= self.parameters.max_chunk_file_size_in_bytes
                && map.len() <= self.parameters.max_map_file_size_in_bytes
                && anchor.len() <= self.parameters.max_anchor_file_size_in_bytes;
            if fits {
                return Ok((take, files));
            }
            if take == 1 {
                return Err(SidetreeError::new(
                    ErrorCode::BatchOperationTooLargeForFile,
                    format!("operation for {} does not fit in a batch", operations[0].did_suffix()),
                ));
            }
            take /= 2;
        }
    }

    async fn upload(&self, content: Vec<u8>) -> Result<String> {
        deadline::within(self.cas_timeout, ErrorCode::CasTimeout, self.cas.write(content)).await
    }

    async fn upload_and_anchor(&self, files: BatchFiles, operation_count: usize) -> Result<AnchorString> {
        // 1. Chunk and map first; the anchor file references both by hash.
        let chunk_hash = self.upload(files.chunk).await?;
        let map = map_file::build(&chunk_hash, files.updates)?;
        let map_hash = self.upload(map).await?;
        let anchor = anchor_file::build(&map_hash, files.anchor_operations)?;
        let anchor_hash = self.upload(anchor).await?;

        // 2. Anchor the batch on the ledger.
        let anchor_string = AnchorString::new(operation_count, anchor_hash);
        let transaction = deadline::within(
            self.ledger_timeout,
            ErrorCode::LedgerTimeout,
            self.ledger.write(anchor_string.to_string()),
        )
        .await?;
        info!(
            anchor_string = %anchor_string,
            transaction_number = transaction.transaction_number,
            "anchored batch"
        );
        Ok(anchor_string)
    }
}

#[async_trait]
impl BatchWriter for DefaultBatchWriter {
    async fn write(&self) -> Result<usize> {
        let drained = self.queue.drain(self.parameters.max_operations_per_batch).await;
        if drained.is_empty() {
            return Ok(0);
        }

        // 1. Re-parse under this version's parameters; anything no longer valid is dropped.
        let mut queued: Vec<QueuedOperation> = Vec::with_capacity(drained.len());
        let mut operations = Vec::with_capacity(drained.len());
        let mut dropped = Vec::new();
        for entry in drained {
            match Operation::parse(&entry.operation_buffer, &self.parameters, ParseMode::Request) {
                Ok(operation) => {
                    operations.push(operation);
                    queued.push(entry);
                }
                Err(e) => {
                    warn!(did_suffix = %entry.did_suffix, error = %e, "dropping queued operation");
                    dropped.push(entry);
                }
            }
        }
        self.queue.commit(&dropped).await;
        if operations.is_empty() {
            return Ok(0);
        }

        // 2. Shrink the batch until every file is within its limit.
        let (take, files) = match self.fit(&operations) {
            Ok(fitted) => fitted,
            Err(e) => {
                warn!(did_suffix = %queued[0].did_suffix, error = %e, "dropping oversized operation");
                let rest = queued.split_off(1);
                self.queue.commit(&queued).await;
                self.queue.restore(rest).await;
                return Err(e);
            }
        };

        // 3. Upload and anchor; on failure nothing is lost.
        match self.upload_and_anchor(files, take).await {
            Ok(_) => {
                let deferred = queued.split_off(take);
                if !deferred.is_empty() {
                    info!(deferred = deferred.len(), "batch limit reached, deferring operations");
                }
                self.queue.commit(&queued).await;
                self.queue.restore(deferred).await;
                Ok(take)
            }
            Err(e) => {
                warn!(operations = queued.len(), error = %e, "batch not anchored, requeueing");
                self.queue.restore(queued).await;
                Err(e)
            }
        }
    }
}
