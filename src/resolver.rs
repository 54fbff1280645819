//! Rebuilds a DID's current state by replaying its anchored operations.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ErrorKind, Result};
use crate::models::DidState;
use crate::store::OperationStore;
use crate::version_manager::VersionManager;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No operation for the suffix has been observed.
    NotFound,
    /// Operations exist but none of them forms a valid history.
    NoValidHistory,
    Deactivated(DidState),
    Resolved(DidState),
}

pub struct Resolver {
    versions: Arc<VersionManager>,
    operation_store: Arc<dyn OperationStore>,
}

impl Resolver {
    pub fn new(versions: Arc<VersionManager>, operation_store: Arc<dyn OperationStore>) -> Self {
        Self { versions, operation_store }
    }

    /// Replays every stored operation in ledger order. An operation that does
    /// not apply is skipped and the state stays as of the last one that did.
    pub async fn resolve(&self, did_suffix: &str) -> Result<Resolution> {
        let operations = self.operation_store.get(did_suffix).await?;
        if operations.is_empty() {
            return Ok(Resolution::NotFound);
        }

        let mut state: Option<DidState> = None;
        for operation in &operations {
            let components = self.versions.components_for(operation.transaction_time)?;
            match components.operation_processor.apply(operation, state.as_ref()) {
                Ok(next) => state = Some(next),
                Err(e) if e.kind() == ErrorKind::Configuration => return Err(e),
                Err(e) => debug!(
                    did_suffix,
                    transaction_number = operation.transaction_number,
                    operation_index = operation.operation_index,
                    operation_type = %operation.operation_type,
                    error = %e,
                    "operation skipped"
                ),
            }
        }

        Ok(match state {
            None => Resolution::NoValidHistory,
            Some(state) if state.is_deactivated() => Resolution::Deactivated(state),
            Some(state) => Resolution::Resolved(state),
        })
    }
}
