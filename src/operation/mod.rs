//! Operation requests: parsing raw bytes into typed, bounds-checked records.
//!
//! Two parse modes exist. [`ParseMode::Request`] is used for client
//! submissions and demands a present, valid delta. [`ParseMode::Anchored`] is
//! used for operations rebuilt from batch files: a missing or bad delta is kept
//! as `delta: None` and handled during replay instead of dropping the
//! operation, because its signed data still moves the commitment chain.

pub mod builder;
pub mod create;
pub mod deactivate;
pub mod delta;
pub mod recover;
pub mod update;

use serde_json::{Map, Value};

use crate::config::ProtocolParameters;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::models::OperationType;
use crate::util::jwk::PublicKeyJwk;
use crate::util::jws::Jws;
use crate::util::multihash;

pub use create::CreateOperation;
pub use deactivate::DeactivateOperation;
pub use delta::{Delta, SuffixData};
pub use recover::RecoverOperation;
pub use update::UpdateOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Request,
    Anchored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(CreateOperation),
    Update(UpdateOperation),
    Recover(RecoverOperation),
    Deactivate(DeactivateOperation),
}

impl Operation {
    pub fn parse(buffer: &[u8], params: &ProtocolParameters, mode: ParseMode) -> Result<Self> {
        let obj = parse_object(buffer)?;
        let operation_type: OperationType = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SidetreeError::new(ErrorCode::OperationMissingOrUnknownType, "missing type"))?
            .parse()?;

        let operation = match operation_type {
            OperationType::Create => Operation::Create(CreateOperation::from_object(&obj, buffer, params, mode)?),
            OperationType::Update => Operation::Update(UpdateOperation::from_object(&obj, buffer, params, mode)?),
            OperationType::Recover => Operation::Recover(RecoverOperation::from_object(&obj, buffer, params, mode)?),
            OperationType::Deactivate => {
                Operation::Deactivate(DeactivateOperation::from_object(&obj, buffer, params)?)
            }
        };
        Ok(operation)
    }

    pub fn operation_type(&self) -> OperationType {
        match self {
            Operation::Create(_) => OperationType::Create,
            Operation::Update(_) => OperationType::Update,
            Operation::Recover(_) => OperationType::Recover,
            Operation::Deactivate(_) => OperationType::Deactivate,
        }
    }

    pub fn did_suffix(&self) -> &str {
        match self {
            Operation::Create(op) => &op.did_suffix,
            Operation::Update(op) => &op.did_suffix,
            Operation::Recover(op) => &op.did_suffix,
            Operation::Deactivate(op) => &op.did_suffix,
        }
    }

    pub fn operation_buffer(&self) -> &[u8] {
        match self {
            Operation::Create(op) => &op.operation_buffer,
            Operation::Update(op) => &op.operation_buffer,
            Operation::Recover(op) => &op.operation_buffer,
            Operation::Deactivate(op) => &op.operation_buffer,
        }
    }

    /// Encoded delta destined for the chunk file; deactivations carry none.
    pub fn encoded_delta(&self) -> Option<&str> {
        match self {
            Operation::Create(op) => op.encoded_delta.as_deref(),
            Operation::Update(op) => op.encoded_delta.as_deref(),
            Operation::Recover(op) => op.encoded_delta.as_deref(),
            Operation::Deactivate(_) => None,
        }
    }
}

/// Commitment a revealed key satisfies: `hash(canonicalize(jwk))`.
pub fn reveal_commitment(key: &PublicKeyJwk, params: &ProtocolParameters) -> Result<String> {
    multihash::canonicalize_then_hash_then_encode(key, params.hash_algorithm_in_multihash_code)
}

/// Rejects a next commitment that hashes from the key being revealed, since the
/// chain would not advance and the same operation could be applied again.
pub fn ensure_commitment_advances(
    revealed: &PublicKeyJwk,
    next_commitment: &str,
    params: &ProtocolParameters,
) -> Result<()> {
    if reveal_commitment(revealed, params)? == next_commitment {
        return Err(SidetreeError::new(
            ErrorCode::CommitmentMismatch,
            "next commitment is derived from the revealed key",
        ));
    }
    Ok(())
}

pub(crate) fn parse_object(buffer: &[u8]) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(buffer)
        .map_err(|e| SidetreeError::new(ErrorCode::OperationRequestNotJson, e.to_string()))?;
    match value {
        Value::Object(obj) => Ok(obj),
        _ => Err(SidetreeError::new(ErrorCode::OperationRequestNotJson, "operation is not a JSON object")),
    }
}

pub(crate) fn allow_only(obj: &Map<String, Value>, allowed: &[&str]) -> Result<()> {
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unexpected) => Err(SidetreeError::new(
            ErrorCode::OperationUnexpectedProperty,
            format!("unexpected property '{}'", unexpected),
        )),
        None => Ok(()),
    }
}

pub(crate) fn required_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    obj.get(field).and_then(Value::as_str).ok_or_else(|| {
        SidetreeError::new(ErrorCode::OperationMissingProperty, format!("'{}' is missing or not a string", field))
    })
}

pub(crate) fn optional_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<Option<&'a str>> {
    match obj.get(field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(SidetreeError::new(
            ErrorCode::OperationMissingProperty,
            format!("'{}' is not a string", field),
        )),
    }
}

pub(crate) fn validated_did_suffix(obj: &Map<String, Value>, params: &ProtocolParameters) -> Result<String> {
    let suffix = required_str(obj, "did_suffix")?;
    multihash::validate_encoded_hash(suffix, params.hash_algorithm_in_multihash_code)
        .map_err(|e| SidetreeError::new(ErrorCode::OperationDidSuffixInvalid, e.to_string()))?;
    Ok(suffix.to_string())
}

pub(crate) fn signed_data(obj: &Map<String, Value>) -> Result<Jws> {
    let compact = obj
        .get("signed_data")
        .ok_or_else(|| SidetreeError::new(ErrorCode::OperationMissingProperty, "'signed_data' is missing"))?
        .as_str()
        .ok_or_else(|| SidetreeError::from(ErrorCode::JwsCompactJwsNotString))?;
    Jws::parse(compact)
}

#[cfg(test)]
mod tests {
    use super::builder::*;
    use super::*;
    use crate::util::encoder;
    use k256::ecdsa::SigningKey;
    use serde_json::json;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    fn params() -> ProtocolParameters {
        ProtocolParameters::default()
    }

    #[test]
    fn parses_create_request_and_derives_suffix() {
        let request = create_request(
            &public_jwk(&key(1)),
            &public_jwk(&key(2)),
            vec![add_public_key_patch("signing", &public_jwk(&key(3)))],
            &params(),
        )
        .unwrap();
        let op = Operation::parse(&request.buffer, &params(), ParseMode::Request).unwrap();
        assert_eq!(op.operation_type(), OperationType::Create);
        assert_eq!(op.did_suffix(), request.did_suffix);
        let Operation::Create(create) = op else { panic!("expected create") };
        assert_eq!(create.delta.unwrap().update_commitment, reveal_commitment(&public_jwk(&key(2)), &params()).unwrap());
    }

    #[test]
    fn rejects_unknown_top_level_property() {
        let request = create_request(&public_jwk(&key(1)), &public_jwk(&key(2)), vec![], &params()).unwrap();
        let mut value: Value = serde_json::from_slice(&request.buffer).unwrap();
        value["extra"] = json!(1);
        let err = Operation::parse(&serde_json::to_vec(&value).unwrap(), &params(), ParseMode::Request).unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationUnexpectedProperty);
    }

    #[test]
    fn create_delta_must_match_committed_hash() {
        let a = create_request(&public_jwk(&key(1)), &public_jwk(&key(2)), vec![], &params()).unwrap();
        let b = create_request(&public_jwk(&key(1)), &public_jwk(&key(9)), vec![], &params()).unwrap();
        let mut value: Value = serde_json::from_slice(&a.buffer).unwrap();
        let other: Value = serde_json::from_slice(&b.buffer).unwrap();
        value["delta"] = other["delta"].clone();
        let buffer = serde_json::to_vec(&value).unwrap();

        let err = Operation::parse(&buffer, &params(), ParseMode::Request).unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationDeltaHashMismatch);

        // Anchored parsing keeps the operation but drops the delta.
        let Operation::Create(create) = Operation::parse(&buffer, &params(), ParseMode::Anchored).unwrap() else {
            panic!("expected create")
        };
        assert!(create.delta.is_none());
        assert_eq!(create.did_suffix, a.did_suffix);
    }

    #[test]
    fn parses_update_recover_and_deactivate() {
        let suffix = create_request(&public_jwk(&key(1)), &public_jwk(&key(2)), vec![], &params()).unwrap().did_suffix;

        let update = update_request(&suffix, &key(2), &public_jwk(&key(4)), vec![], &params()).unwrap();
        let Operation::Update(op) = Operation::parse(&update, &params(), ParseMode::Request).unwrap() else {
            panic!("expected update")
        };
        assert_eq!(op.signed_data.update_key, public_jwk(&key(2)));
        assert!(op.signed_data_jws.verify(&op.signed_data.update_key));

        let recover =
            recover_request(&suffix, &key(1), &public_jwk(&key(5)), &public_jwk(&key(6)), vec![], &params()).unwrap();
        let op = Operation::parse(&recover, &params(), ParseMode::Request).unwrap();
        assert_eq!(op.operation_type(), OperationType::Recover);

        let deactivate = deactivate_request(&suffix, &key(1)).unwrap();
        let op = Operation::parse(&deactivate, &params(), ParseMode::Request).unwrap();
        assert_eq!(op.did_suffix(), suffix);
        assert!(op.encoded_delta().is_none());
    }

    #[test]
    fn request_must_commit_to_a_new_key() {
        let suffix = create_request(&public_jwk(&key(1)), &public_jwk(&key(2)), vec![], &params()).unwrap().did_suffix;

        let update = update_request(&suffix, &key(2), &public_jwk(&key(2)), vec![], &params()).unwrap();
        assert_eq!(
            Operation::parse(&update, &params(), ParseMode::Request).unwrap_err().code,
            ErrorCode::CommitmentMismatch
        );
        // Anchored copies still parse; replay rejects them.
        assert!(Operation::parse(&update, &params(), ParseMode::Anchored).is_ok());

        let recover =
            recover_request(&suffix, &key(1), &public_jwk(&key(1)), &public_jwk(&key(6)), vec![], &params()).unwrap();
        assert_eq!(
            Operation::parse(&recover, &params(), ParseMode::Request).unwrap_err().code,
            ErrorCode::CommitmentMismatch
        );
    }

    #[test]
    fn deactivate_signed_suffix_must_match() {
        let suffix = create_request(&public_jwk(&key(1)), &public_jwk(&key(2)), vec![], &params()).unwrap().did_suffix;
        let other = create_request(&public_jwk(&key(7)), &public_jwk(&key(2)), vec![], &params()).unwrap().did_suffix;
        let mut value: Value = serde_json::from_slice(&deactivate_request(&suffix, &key(1)).unwrap()).unwrap();
        value["did_suffix"] = json!(other);
        let err = Operation::parse(&serde_json::to_vec(&value).unwrap(), &params(), ParseMode::Request).unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationSignedDataDidSuffixMismatch);
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert_eq!(
            Operation::parse(b"not json", &params(), ParseMode::Request).unwrap_err().code,
            ErrorCode::OperationRequestNotJson
        );
        assert_eq!(
            Operation::parse(br#"{"type": "mint"}"#, &params(), ParseMode::Request).unwrap_err().code,
            ErrorCode::OperationMissingOrUnknownType
        );
        let bad_suffix = json!({"type": "deactivate", "did_suffix": encoder::encode("x"), "signed_data": "a.b.c"});
        assert_eq!(
            Operation::parse(&serde_json::to_vec(&bad_suffix).unwrap(), &params(), ParseMode::Request)
                .unwrap_err()
                .code,
            ErrorCode::OperationDidSuffixInvalid
        );
    }
}
