//! Applies one anchored operation to a DID state.
//!
//! Failure of any check is reported as an error and the caller keeps the
//! previous state; the operation is then simply not part of the history.

use tracing::debug;

use crate::config::ProtocolParameters;
use crate::document;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::models::{AnchoredOperation, DidState};
use crate::operation::{
    ensure_commitment_advances, reveal_commitment, CreateOperation, DeactivateOperation, Operation, ParseMode,
    RecoverOperation, UpdateOperation,
};
use crate::util::jwk::PublicKeyJwk;
use crate::util::jws::Jws;

pub trait OperationProcessor: Send + Sync {
    fn parse_operation(&self, buffer: &[u8], mode: ParseMode) -> Result<Operation>;

    /// State after `operation`, or an error if the operation does not apply to `state`.
    fn apply(&self, operation: &AnchoredOperation, state: Option<&DidState>) -> Result<DidState>;
}

pub struct DefaultOperationProcessor {
    parameters: ProtocolParameters,
}

impl DefaultOperationProcessor {
    pub fn new(parameters: ProtocolParameters) -> Self {
        Self { parameters }
    }

    fn apply_create(&self, op: CreateOperation, transaction_number: u64) -> DidState {
        let empty = document::empty_document();
        let (document, next_update_commitment) = match op.delta {
            Some(delta) => {
                let document = document::apply_patches(&empty, &delta.patches).unwrap_or_else(|e| {
                    debug!(did_suffix = %op.did_suffix, error = %e, "create patches not applied");
                    empty.clone()
                });
                (document, Some(delta.update_commitment))
            }
            None => (empty, None),
        };
        DidState {
            document,
            next_recovery_commitment: Some(op.suffix_data.recovery_commitment),
            next_update_commitment,
            last_operation_transaction_number: transaction_number,
        }
    }

    fn apply_update(&self, op: UpdateOperation, state: &DidState, transaction_number: u64) -> Result<DidState> {
        self.check_reveal(&op.signed_data.update_key, &op.signed_data_jws, state.next_update_commitment.as_deref())?;
        let delta = op.delta.ok_or_else(|| {
            SidetreeError::new(ErrorCode::OperationDeltaMissing, "update delta is missing or does not match its hash")
        })?;
        ensure_commitment_advances(&op.signed_data.update_key, &delta.update_commitment, &self.parameters)?;
        let document = document::apply_patches(&state.document, &delta.patches).unwrap_or_else(|e| {
            debug!(did_suffix = %op.did_suffix, error = %e, "update patches not applied");
            state.document.clone()
        });
        Ok(DidState {
            document,
            next_recovery_commitment: state.next_recovery_commitment.clone(),
            next_update_commitment: Some(delta.update_commitment),
            last_operation_transaction_number: transaction_number,
        })
    }

    fn apply_recover(&self, op: RecoverOperation, state: &DidState, transaction_number: u64) -> Result<DidState> {
        self.check_reveal(
            &op.signed_data.recovery_key,
            &op.signed_data_jws,
            state.next_recovery_commitment.as_deref(),
        )?;
        ensure_commitment_advances(
            &op.signed_data.recovery_key,
            &op.signed_data.recovery_commitment,
            &self.parameters,
        )?;
        let empty = document::empty_document();
        let (document, next_update_commitment) = match op.delta {
            Some(delta) => {
                let document = document::apply_patches(&empty, &delta.patches).unwrap_or(empty);
                (document, Some(delta.update_commitment))
            }
            None => (empty, None),
        };
        Ok(DidState {
            document,
            next_recovery_commitment: Some(op.signed_data.recovery_commitment),
            next_update_commitment,
            last_operation_transaction_number: transaction_number,
        })
    }

    fn apply_deactivate(
        &self,
        op: DeactivateOperation,
        state: &DidState,
        transaction_number: u64,
    ) -> Result<DidState> {
        self.check_reveal(
            &op.signed_data.recovery_key,
            &op.signed_data_jws,
            state.next_recovery_commitment.as_deref(),
        )?;
        Ok(DidState {
            document: state.document.clone(),
            next_recovery_commitment: None,
            next_update_commitment: None,
            last_operation_transaction_number: transaction_number,
        })
    }

    /// The revealed key must hash to the expected commitment and must have signed the operation.
    fn check_reveal(&self, key: &PublicKeyJwk, jws: &Jws, expected: Option<&str>) -> Result<()> {
        let expected = expected
            .ok_or_else(|| SidetreeError::new(ErrorCode::CommitmentMismatch, "no commitment is open for this chain"))?;
        let revealed = reveal_commitment(key, &self.parameters)?;
        if revealed != expected {
            return Err(SidetreeError::new(
                ErrorCode::CommitmentMismatch,
                format!("reveal hashes to {}, expected {}", revealed, expected),
            ));
        }
        if !jws.verify(key) {
            return Err(SidetreeError::from(ErrorCode::JwsSignatureInvalid));
        }
        Ok(())
    }
}

impl OperationProcessor for DefaultOperationProcessor {
    fn parse_operation(&self, buffer: &[u8], mode: ParseMode) -> Result<Operation> {
        Operation::parse(buffer, &self.parameters, mode)
    }

    fn apply(&self, anchored: &AnchoredOperation, state: Option<&DidState>) -> Result<DidState> {
        let operation = self.parse_operation(&anchored.operation_buffer, ParseMode::Anchored)?;
        let transaction_number = anchored.transaction_number;

        match (operation, state) {
            (Operation::Create(op), None) => Ok(self.apply_create(op, transaction_number)),
            (Operation::Create(_), Some(_)) => Err(SidetreeError::new(
                ErrorCode::DidAlreadyCreated,
                format!("{} already exists", anchored.did_suffix),
            )),
            (_, None) => Err(SidetreeError::new(
                ErrorCode::DidNotCreated,
                format!("{} has no create operation yet", anchored.did_suffix),
            )),
            (_, Some(state)) if state.is_deactivated() => Err(SidetreeError::new(
                ErrorCode::DidDeactivated,
                format!("{} is deactivated", anchored.did_suffix),
            )),
            (Operation::Update(op), Some(state)) => self.apply_update(op, state, transaction_number),
            (Operation::Recover(op), Some(state)) => self.apply_recover(op, state, transaction_number),
            (Operation::Deactivate(op), Some(state)) => self.apply_deactivate(op, state, transaction_number),
        }
    }
}
