//! Ledger collaborator: carries anchor strings and orders them.
//!
//! [`MemoryLedger`] is a single-process stand-in used by tests and the local
//! node. It models blocks as transaction times with a hash per time so that
//! forks can be simulated by rewriting history.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{ErrorCode, Result, SidetreeError};
use crate::models::Transaction;
use crate::util::multihash;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerReadResult {
    pub more_transactions: bool,
    pub transactions: Vec<Transaction>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submits an anchor string; returns the transaction that now carries it.
    async fn write(&self, anchor_string: String) -> Result<Transaction>;

    /// Transactions after `since`, ascending. Fails with
    /// `LedgerInvalidTransactionNumberOrTimeHash` when `since` is no longer on
    /// the ledger's history. A page never splits one transaction time.
    async fn read(&self, since: Option<(u64, String)>) -> Result<LedgerReadResult>;

    /// Current ledger time, used to pick the protocol version for new work.
    async fn approximate_time(&self) -> Result<u64>;

    /// First of `candidates` that is still part of the ledger's history.
    async fn first_valid_transaction(&self, candidates: &[Transaction]) -> Result<Option<Transaction>>;
}

struct LedgerState {
    available: bool,
    time: u64,
    fork_epoch: u64,
    next_transaction_number: u64,
    transactions: Vec<Transaction>,
    time_hashes: BTreeMap<u64, String>,
}

impl LedgerState {
    fn time_hash(&mut self, time: u64) -> String {
        let epoch = self.fork_epoch;
        self.time_hashes
            .entry(time)
            .or_insert_with(|| {
                let seed = format!("{}:{}", epoch, time);
                multihash::hash_then_encode(seed.as_bytes(), multihash::SHA2_256).unwrap_or(seed)
            })
            .clone()
    }

    fn is_current(&self, transaction_number: u64, time_hash: &str) -> bool {
        self.transactions
            .iter()
            .any(|t| t.transaction_number == transaction_number && t.transaction_time_hash == time_hash)
    }
}

pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    page_size: usize,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MemoryLedger {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                available: true,
                time: 0,
                fork_epoch: 0,
                next_transaction_number: 1,
                transactions: Vec::new(),
                time_hashes: BTreeMap::new(),
            }),
            page_size: page_size.max(1),
        }
    }

    pub async fn set_time(&self, time: u64) {
        self.state.lock().await.time = time;
    }

    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.available = available;
    }

    /// Drops every transaction at or after `from_time` and gives those times new hashes.
    pub async fn fork(&self, from_time: u64) {
        let mut state = self.state.lock().await;
        state.fork_epoch += 1;
        state.transactions.retain(|t| t.transaction_time < from_time);
        state.time_hashes.retain(|time, _| *time < from_time);
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().await.transactions.clone()
    }

    fn check_available(state: &LedgerState) -> Result<()> {
        if state.available {
            Ok(())
        } else {
            Err(SidetreeError::new(ErrorCode::LedgerUnavailable, "ledger is offline"))
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn write(&self, anchor_string: String) -> Result<Transaction> {
        let mut state = self.state.lock().await;
        Self::check_available(&state)?;
        let time = state.time;
        let transaction = Transaction {
            transaction_number: state.next_transaction_number,
            transaction_time: time,
            transaction_time_hash: state.time_hash(time),
            anchor_string,
        };
        state.next_transaction_number += 1;
        state.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn read(&self, since: Option<(u64, String)>) -> Result<LedgerReadResult> {
        let state = self.state.lock().await;
        Self::check_available(&state)?;

        let after = match since {
            Some((number, hash)) => {
                if !state.is_current(number, &hash) {
                    return Err(SidetreeError::new(
                        ErrorCode::LedgerInvalidTransactionNumberOrTimeHash,
                        format!("transaction {} is not on the current history", number),
                    ));
                }
                Some(number)
            }
            None => None,
        };

        let pending: Vec<&Transaction> = state
            .transactions
            .iter()
            .filter(|t| after.map_or(true, |n| t.transaction_number > n))
            .collect();

        let mut end = pending.len().min(self.page_size);
        // Extend the page to the end of its last transaction time.
        while end > 0 && end < pending.len() && pending[end].transaction_time == pending[end - 1].transaction_time {
            end += 1;
        }

        Ok(LedgerReadResult {
            more_transactions: end < pending.len(),
            transactions: pending[..end].iter().map(|t| (*t).clone()).collect(),
        })
    }

    async fn approximate_time(&self) -> Result<u64> {
        let state = self.state.lock().await;
        Self::check_available(&state)?;
        Ok(state.time)
    }

    async fn first_valid_transaction(&self, candidates: &[Transaction]) -> Result<Option<Transaction>> {
        let state = self.state.lock().await;
        Self::check_available(&state)?;
        Ok(candidates
            .iter()
            .find(|c| state.is_current(c.transaction_number, &c.transaction_time_hash))
            .cloned())
    }
}
