//! Pending-operation queue between request handling and batch writing.
//!
//! At most one operation per DID may be pending or in flight: the order of two
//! un-anchored operations for one DID cannot be established, so the second is
//! refused until the first has been anchored.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{ErrorCode, Result, SidetreeError};
use crate::models::OperationType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedOperation {
    pub did_suffix: String,
    pub operation_type: OperationType,
    pub operation_buffer: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedOperation>,
    /// DIDs that are pending, or drained and not yet committed.
    reserved: HashSet<String>,
}

#[derive(Default)]
pub struct OperationQueue {
    state: Mutex<QueueState>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(
        &self,
        did_suffix: &str,
        operation_type: OperationType,
        operation_buffer: Vec<u8>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.reserved.insert(did_suffix.to_string()) {
            return Err(SidetreeError::new(
                ErrorCode::QueueDuplicatePendingOperation,
                format!("an operation for {} is already pending", did_suffix),
            ));
        }
        state.pending.push_back(QueuedOperation {
            did_suffix: did_suffix.to_string(),
            operation_type,
            operation_buffer,
            enqueued_at: Utc::now(),
        });
        Ok(())
    }

    /// Takes up to `max` oldest operations. They stay reserved against new
    /// enqueues for the same DID until [`commit`](Self::commit) or [`restore`](Self::restore).
    pub async fn drain(&self, max: usize) -> Vec<QueuedOperation> {
        let mut state = self.state.lock().await;
        let count = max.min(state.pending.len());
        state.pending.drain(..count).collect()
    }

    /// Releases operations that were anchored (or deliberately dropped).
    pub async fn commit(&self, operations: &[QueuedOperation]) {
        let mut state = self.state.lock().await;
        for op in operations {
            state.reserved.remove(&op.did_suffix);
        }
    }

    /// Puts drained operations back at the front, preserving their order.
    pub async fn restore(&self, operations: Vec<QueuedOperation>) {
        let mut state = self.state.lock().await;
        for op in operations.into_iter().rev() {
            state.reserved.insert(op.did_suffix.clone());
            state.pending.push_front(op);
        }
    }

    pub async fn contains(&self, did_suffix: &str) -> bool {
        self.state.lock().await.reserved.contains(did_suffix)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn queue_with(suffixes: &[&str]) -> OperationQueue {
        let queue = OperationQueue::new();
        for suffix in suffixes {
            queue.enqueue(suffix, OperationType::Update, suffix.as_bytes().to_vec()).await.unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn second_operation_for_same_did_is_rejected() {
        let queue = queue_with(&["a"]).await;
        let err = queue.enqueue("a", OperationType::Recover, vec![]).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::QueueDuplicatePendingOperation);
    }

    #[tokio::test]
    async fn in_flight_operations_block_until_committed() {
        let queue = queue_with(&["a", "b", "c"]).await;
        let drained = queue.drain(2).await;
        assert_eq!(drained.iter().map(|o| o.did_suffix.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(queue.len().await, 1);
        assert!(queue.enqueue("a", OperationType::Update, vec![]).await.is_err());

        queue.commit(&drained).await;
        assert!(queue.enqueue("a", OperationType::Update, vec![]).await.is_ok());
    }

    #[tokio::test]
    async fn restore_returns_operations_to_the_front() {
        let queue = queue_with(&["a", "b", "c"]).await;
        let drained = queue.drain(2).await;
        queue.restore(drained).await;
        let order: Vec<String> = queue.drain(10).await.into_iter().map(|o| o.did_suffix).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn restored_operations_stay_reserved() {
        let queue = queue_with(&["a", "b"]).await;
        let drained = queue.drain(1).await;
        assert!(queue.contains("a").await);
        queue.restore(drained).await;
        assert!(queue.contains("a").await);
        assert!(queue.enqueue("a", OperationType::Deactivate, vec![]).await.is_err());

        let all = queue.drain(10).await;
        queue.commit(&all).await;
        assert!(!queue.contains("a").await && !queue.contains("b").await);
    }
}
