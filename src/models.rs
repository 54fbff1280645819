//! Records that flow between the scheduler, observer, stores and resolver.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::anchor_string::AnchorString;
use crate::error::{ErrorCode, Result, SidetreeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Recover,
    Deactivate,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Recover => "recover",
            OperationType::Deactivate => "deactivate",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = SidetreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            "recover" => Ok(OperationType::Recover),
            "deactivate" => Ok(OperationType::Deactivate),
            other => Err(SidetreeError::new(
                ErrorCode::OperationMissingOrUnknownType,
                format!("unknown operation type '{}'", other),
            )),
        }
    }
}

/// A ledger transaction carrying one anchor string. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_number: u64,
    pub transaction_time: u64,
    /// Hash of the ledger block at `transaction_time`; lets the ledger detect forks.
    pub transaction_time_hash: String,
    pub anchor_string: String,
}

impl Transaction {
    pub fn parsed_anchor_string(&self) -> Result<AnchorString> {
        AnchorString::parse(&self.anchor_string)
    }

    /// Operation count declared by the anchor string, or 0 if it is malformed.
    pub fn number_of_operations(&self) -> usize {
        self.parsed_anchor_string().map(|a| a.operation_count).unwrap_or(0)
    }
}

/// An operation plus the ledger position that totally orders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredOperation {
    pub operation_type: OperationType,
    pub did_suffix: String,
    /// JSON operation request rebuilt from the batch files.
    pub operation_buffer: Vec<u8>,
    pub transaction_number: u64,
    pub transaction_time: u64,
    pub operation_index: usize,
}

impl AnchoredOperation {
    pub fn ordering_key(&self) -> (u64, usize) {
        (self.transaction_number, self.operation_index)
    }
}

/// State of a DID after replaying a prefix of its history.
///
/// A `None` commitment means the chain is closed: no further operation of
/// that kind can be accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidState {
    pub document: Value,
    pub next_recovery_commitment: Option<String>,
    pub next_update_commitment: Option<String>,
    pub last_operation_transaction_number: u64,
}

impl DidState {
    pub fn is_deactivated(&self) -> bool {
        self.next_recovery_commitment.is_none()
    }
}
