//! Durable-store collaborators and their in-memory implementations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::RetryPolicy;
use crate::error::Result;
use crate::models::{AnchoredOperation, Transaction};

#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Stores operations; one already stored at the same ordering key is replaced.
    async fn insert_or_replace(&self, operations: Vec<AnchoredOperation>) -> Result<()>;

    /// Every operation for `did_suffix`, ascending by `(transaction_number, operation_index)`.
    async fn get(&self, did_suffix: &str) -> Result<Vec<AnchoredOperation>>;

    /// Removes operations from transactions after `transaction_number`; `None` removes all.
    async fn delete_after(&self, transaction_number: Option<u64>) -> Result<()>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn add_processed(&self, transaction: Transaction) -> Result<()>;
    async fn last_processed(&self) -> Result<Option<Transaction>>;

    /// Processed transactions newest first, thinning out exponentially with age.
    /// Used to find the last point shared with the ledger after a fork.
    async fn exponentially_spaced(&self) -> Result<Vec<Transaction>>;

    async fn remove_after(&self, transaction_number: Option<u64>) -> Result<()>;
}

/// A transaction whose files could not be fetched, with its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvableTransaction {
    pub transaction: Transaction,
    pub first_fetch_time: DateTime<Utc>,
    pub retry_attempts: u32,
    pub next_retry_time: DateTime<Utc>,
    /// Set once `retry_attempts` reaches the policy ceiling; never retried again.
    pub permanent: bool,
}

#[async_trait]
pub trait UnresolvableTransactionStore: Send + Sync {
    /// Records one more failed fetch of `transaction` and schedules the next retry.
    async fn record_fetch_attempt(
        &self,
        transaction: &Transaction,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<UnresolvableTransaction>;

    async fn remove(&self, transaction_number: u64) -> Result<()>;
    async fn get(&self, transaction_number: u64) -> Result<Option<UnresolvableTransaction>>;

    /// Non-permanent entries whose next retry time has passed, ascending by transaction number.
    async fn due_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>>;

    async fn remove_after(&self, transaction_number: Option<u64>) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryOperationStore {
    operations: DashMap<String, Vec<AnchoredOperation>>,
}

impl MemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperationStore for MemoryOperationStore {
    async fn insert_or_replace(&self, operations: Vec<AnchoredOperation>) -> Result<()> {
        for operation in operations {
            let mut entry = self.operations.entry(operation.did_suffix.clone()).or_default();
            let key = operation.ordering_key();
            match entry.binary_search_by_key(&key, AnchoredOperation::ordering_key) {
                Ok(i) => entry[i] = operation,
                Err(i) => entry.insert(i, operation),
            }
        }
        Ok(())
    }

    async fn get(&self, did_suffix: &str) -> Result<Vec<AnchoredOperation>> {
        Ok(self.operations.get(did_suffix).map(|ops| ops.clone()).unwrap_or_default())
    }

    async fn delete_after(&self, transaction_number: Option<u64>) -> Result<()> {
        match transaction_number {
            None => self.operations.clear(),
            Some(n) => {
                self.operations.iter_mut().for_each(|mut ops| ops.retain(|op| op.transaction_number <= n));
                self.operations.retain(|_, ops| !ops.is_empty());
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTransactionStore {
    processed: Mutex<BTreeMap<u64, Transaction>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.processed.lock().await.len()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn add_processed(&self, transaction: Transaction) -> Result<()> {
        self.processed.lock().await.insert(transaction.transaction_number, transaction);
        Ok(())
    }

    async fn last_processed(&self) -> Result<Option<Transaction>> {
        Ok(self.processed.lock().await.values().next_back().cloned())
    }

    async fn exponentially_spaced(&self) -> Result<Vec<Transaction>> {
        let processed = self.processed.lock().await;
        let newest_first: Vec<&Transaction> = processed.values().rev().collect();
        let mut picked = Vec::new();
        let mut index = 0usize;
        let mut step = 1usize;
        while index < newest_first.len() {
            picked.push(newest_first[index].clone());
            index += step;
            step *= 2;
        }
        Ok(picked)
    }

    async fn remove_after(&self, transaction_number: Option<u64>) -> Result<()> {
        let mut processed = self.processed.lock().await;
        match transaction_number {
            None => processed.clear(),
            Some(n) => processed.retain(|number, _| *number <= n),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUnresolvableTransactionStore {
    entries: DashMap<u64, UnresolvableTransaction>,
}

impl MemoryUnresolvableTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UnresolvableTransactionStore for MemoryUnresolvableTransactionStore {
    async fn record_fetch_attempt(
        &self,
        transaction: &Transaction,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<UnresolvableTransaction> {
        let mut entry = self
            .entries
            .entry(transaction.transaction_number)
            .and_modify(|e| e.retry_attempts += 1)
            .or_insert_with(|| UnresolvableTransaction {
                transaction: transaction.clone(),
                first_fetch_time: now,
                retry_attempts: 0,
                next_retry_time: now,
                permanent: false,
            });
        entry.next_retry_time = entry.first_fetch_time + policy.delay_for_attempt(entry.retry_attempts);
        entry.permanent = entry.retry_attempts >= policy.max_retry_attempts;
        Ok(entry.clone())
    }

    async fn remove(&self, transaction_number: u64) -> Result<()> {
        self.entries.remove(&transaction_number);
        Ok(())
    }

    async fn get(&self, transaction_number: u64) -> Result<Option<UnresolvableTransaction>> {
        Ok(self.entries.get(&transaction_number).map(|e| e.clone()))
    }

    async fn due_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let mut due: Vec<Transaction> = self
            .entries
            .iter()
            .filter(|e| !e.permanent && e.next_retry_time <= now)
            .map(|e| e.transaction.clone())
            .collect();
        due.sort_by_key(|t| t.transaction_number);
        Ok(due)
    }

    async fn remove_after(&self, transaction_number: Option<u64>) -> Result<()> {
        match transaction_number {
            None => self.entries.clear(),
            Some(n) => self.entries.retain(|number, _| *number <= n),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationType;

    fn transaction(number: u64) -> Transaction {
        Transaction {
            transaction_number: number,
            transaction_time: number,
            transaction_time_hash: format!("h{}", number),
            anchor_string: "1.a".to_string(),
        }
    }

    fn operation(number: u64, index: usize) -> AnchoredOperation {
        AnchoredOperation {
            operation_type: OperationType::Update,
            did_suffix: "did".to_string(),
            operation_buffer: format!("{}-{}", number, index).into_bytes(),
            transaction_number: number,
            transaction_time: number,
            operation_index: index,
        }
    }

    #[tokio::test]
    async fn operations_come_back_sorted_and_deduplicated() {
        let store = MemoryOperationStore::new();
        store.insert_or_replace(vec![operation(7, 0), operation(5, 1), operation(5, 0)]).await.unwrap();
        store.insert_or_replace(vec![operation(5, 1)]).await.unwrap();
        let keys: Vec<_> = store.get("did").await.unwrap().iter().map(|o| o.ordering_key()).collect();
        assert_eq!(keys, vec![(5, 0), (5, 1), (7, 0)]);

        store.delete_after(Some(5)).await.unwrap();
        assert_eq!(store.get("did").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn spaced_transactions_thin_out() {
        let store = MemoryTransactionStore::new();
        for n in 1..=10 {
            store.add_processed(transaction(n)).await.unwrap();
        }
        let numbers: Vec<u64> = store.exponentially_spaced().await.unwrap().iter().map(|t| t.transaction_number).collect();
        assert_eq!(numbers, vec![10, 9, 7, 3]);
        assert_eq!(store.last_processed().await.unwrap().unwrap().transaction_number, 10);
    }

    #[tokio::test]
    async fn fetch_attempts_back_off_then_become_permanent() {
        let store = MemoryUnresolvableTransactionStore::new();
        let policy = RetryPolicy { base_delay_in_seconds: 10, max_retry_attempts: 2 };
        let now = Utc::now();

        let first = store.record_fetch_attempt(&transaction(3), &policy, now).await.unwrap();
        assert_eq!(first.next_retry_time, now + chrono::Duration::seconds(10));
        assert!(store.due_for_retry(now).await.unwrap().is_empty());
        assert_eq!(store.due_for_retry(now + chrono::Duration::seconds(10)).await.unwrap().len(), 1);

        let second = store.record_fetch_attempt(&transaction(3), &policy, now).await.unwrap();
        assert_eq!(second.next_retry_time, now + chrono::Duration::seconds(20));
        assert!(!second.permanent);

        let third = store.record_fetch_attempt(&transaction(3), &policy, now).await.unwrap();
        assert!(third.permanent);
        assert!(store.due_for_retry(now + chrono::Duration::days(1)).await.unwrap().is_empty());
    }
}
