//! Caps how much of one transaction time gets processed.

use crate::config::ProtocolParameters;
use crate::models::Transaction;

/// Returns the transaction numbers to process out of `transactions`, which
/// must all share one transaction time and be sorted by transaction number.
///
/// Transactions are admitted in order until either the transaction cap or the
/// cumulative operation cap for the time would be exceeded; a transaction with
/// a malformed anchor string counts as zero operations.
pub fn select(transactions: &[Transaction], params: &ProtocolParameters) -> Vec<u64> {
    let mut selected = Vec::new();
    let mut operations = 0usize;
    for transaction in transactions {
        if selected.len() >= params.max_number_of_transactions_per_transaction_time {
            break;
        }
        let count = transaction.number_of_operations();
        if operations + count > params.max_number_of_operations_per_transaction_time {
            break;
        }
        operations += count;
        selected.push(transaction.transaction_number);
    }
    selected
}
