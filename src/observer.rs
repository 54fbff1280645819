//! Ledger ingestion: reads new transactions, fetches their files, stores their operations.
//!
//! Files for several transactions are fetched concurrently, but results are
//! applied strictly in transaction-number order. A transaction whose files
//! cannot be fetched is quarantined in the unresolvable-transaction store and
//! retried with backoff; it never holds up later transactions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::RetryPolicy;
use crate::error::{ErrorCode, ErrorKind, Result};
use crate::ledger::Ledger;
use crate::models::{AnchoredOperation, Transaction};
use crate::scheduler::PeriodicJob;
use crate::store::{OperationStore, TransactionStore, UnresolvableTransactionStore};
use crate::transaction_selector;
use crate::util::deadline;
use crate::version_manager::VersionManager;

pub struct Observer {
    versions: Arc<VersionManager>,
    ledger: Arc<dyn Ledger>,
    operation_store: Arc<dyn OperationStore>,
    transaction_store: Arc<dyn TransactionStore>,
    unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
    retry_policy: RetryPolicy,
    max_concurrent_downloads: usize,
    ledger_timeout: Duration,
    tick_lock: Mutex<()>,
}

impl Observer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        versions: Arc<VersionManager>,
        ledger: Arc<dyn Ledger>,
        operation_store: Arc<dyn OperationStore>,
        transaction_store: Arc<dyn TransactionStore>,
        unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
        retry_policy: RetryPolicy,
        max_concurrent_downloads: usize,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            versions,
            ledger,
            operation_store,
            transaction_store,
            unresolvable_store,
            retry_policy,
            max_concurrent_downloads: max_concurrent_downloads.max(1),
            ledger_timeout,
            tick_lock: Mutex::new(()),
        }
    }

    /// One full observing pass: due retries first, then every new transaction.
    pub async fn process_transactions(&self) -> Result<()> {
        let _guard = self.tick_lock.lock().await;

        // 1. Retry quarantined transactions that are due.
        let due = self.unresolvable_store.due_for_retry(Utc::now()).await?;
        if !due.is_empty() {
            debug!(count = due.len(), "retrying unresolvable transactions");
            self.process_batch(due, true).await?;
        }

        // 2. Page through new transactions.
        loop {
            let since = self
                .transaction_store
                .last_processed()
                .await?
                .map(|t| (t.transaction_number, t.transaction_time_hash));

            let read = match self.with_ledger_timeout(self.ledger.read(since)).await {
                Ok(read) => read,
                Err(e) if e.code == ErrorCode::LedgerInvalidTransactionNumberOrTimeHash => {
                    warn!(error = %e, "ledger history changed, reverting");
                    self.revert_to_last_valid_transaction().await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !read.transactions.is_empty() {
                let selected = self.select(&read.transactions)?;
                let (chosen, skipped): (Vec<_>, Vec<_>) =
                    read.transactions.into_iter().partition(|t| selected.contains(&t.transaction_number));
                for transaction in &skipped {
                    info!(transaction_number = transaction.transaction_number, "over per-time limit, not processed");
                }
                self.process_batch(chosen, false).await?;
                for transaction in skipped {
                    self.transaction_store.add_processed(transaction).await?;
                }
            }

            if !read.more_transactions {
                return Ok(());
            }
        }
    }

    /// Transaction numbers admitted by the per-transaction-time caps.
    fn select(&self, transactions: &[Transaction]) -> Result<Vec<u64>> {
        let mut selected = Vec::with_capacity(transactions.len());
        let mut start = 0;
        while start < transactions.len() {
            let time = transactions[start].transaction_time;
            let end = start + transactions[start..].iter().take_while(|t| t.transaction_time == time).count();
            let components = self.versions.components_for(time)?;
            selected.extend(transaction_selector::select(&transactions[start..end], &components.parameters));
            start = end;
        }
        Ok(selected)
    }

    /// Fetches all of `transactions` with bounded concurrency and applies the
    /// outcomes in the given order.
    async fn process_batch(&self, transactions: Vec<Transaction>, retrying: bool) -> Result<()> {
        let mut fetches = stream::iter(transactions)
            .map(|transaction| async move {
                let outcome = self.fetch(&transaction).await;
                (transaction, outcome)
            })
            .buffered(self.max_concurrent_downloads);

        while let Some((transaction, outcome)) = fetches.next().await {
            self.apply_outcome(transaction, outcome, retrying).await?;
        }
        Ok(())
    }

    async fn fetch(&self, transaction: &Transaction) -> Result<Vec<AnchoredOperation>> {
        let components = self.versions.components_for(transaction.transaction_time)?;
        components.transaction_processor.fetch_operations(transaction).await
    }

    async fn apply_outcome(
        &self,
        transaction: Transaction,
        outcome: Result<Vec<AnchoredOperation>>,
        retrying: bool,
    ) -> Result<()> {
        let number = transaction.transaction_number;
        match outcome {
            Ok(operations) => {
                debug!(transaction_number = number, operations = operations.len(), "storing operations");
                self.operation_store.insert_or_replace(operations).await?;
                if retrying {
                    info!(transaction_number = number, "unresolvable transaction resolved");
                    self.unresolvable_store.remove(number).await?;
                }
            }
            Err(e) if e.is_retryable() => {
                let entry = self.unresolvable_store.record_fetch_attempt(&transaction, &self.retry_policy, Utc::now()).await?;
                if entry.permanent {
                    error!(
                        transaction_number = number,
                        attempts = entry.retry_attempts,
                        error = %e,
                        "transaction permanently unresolvable"
                    );
                } else {
                    warn!(
                        transaction_number = number,
                        next_retry = %entry.next_retry_time,
                        error = %e,
                        "transaction unresolvable, will retry"
                    );
                }
            }
            Err(e) if e.kind() == ErrorKind::Configuration => return Err(e),
            Err(e) => {
                warn!(transaction_number = number, error = %e, "invalid transaction, anchors no operations");
                if retrying {
                    self.unresolvable_store.remove(number).await?;
                }
            }
        }
        if !retrying {
            self.transaction_store.add_processed(transaction).await?;
        }
        Ok(())
    }

    /// Drops everything after the newest transaction still on the ledger's history.
    async fn revert_to_last_valid_transaction(&self) -> Result<()> {
        let candidates = self.transaction_store.exponentially_spaced().await?;
        let valid = self.with_ledger_timeout(self.ledger.first_valid_transaction(&candidates)).await?;
        let keep = valid.map(|t| t.transaction_number);
        info!(last_valid_transaction = ?keep, "reverting stores");

        self.operation_store.delete_after(keep).await?;
        self.unresolvable_store.remove_after(keep).await?;
        self.transaction_store.remove_after(keep).await?;
        Ok(())
    }

    async fn with_ledger_timeout<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        deadline::within(self.ledger_timeout, ErrorCode::LedgerTimeout, call).await
    }
}

#[async_trait]
impl PeriodicJob for Observer {
    fn name(&self) -> &'static str {
        "observer"
    }

    async fn tick(&self) -> Result<()> {
        self.process_transactions().await
    }
}
