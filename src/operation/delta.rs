//! Delta and suffix-data payloads shared by the operation types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProtocolParameters;
use crate::document;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::{encoder, multihash};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Delta {
    pub patches: Vec<Value>,
    pub update_commitment: String,
}

impl Delta {
    /// Decodes and validates an encoded delta against the size, patch-count
    /// and patch-shape bounds of `params`.
    pub fn parse(encoded: &str, params: &ProtocolParameters) -> Result<Self> {
        let bytes = encoder::decode(encoded)?;
        if bytes.len() > params.max_delta_size_in_bytes {
            return Err(SidetreeError::new(
                ErrorCode::OperationDeltaExceedsMaxSize,
                format!("delta is {} bytes, limit is {}", bytes.len(), params.max_delta_size_in_bytes),
            ));
        }

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| SidetreeError::new(ErrorCode::DeltaMissingOrInvalid, e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| SidetreeError::new(ErrorCode::DeltaMissingOrInvalid, "delta is not an object"))?;
        if let Some(unexpected) = obj.keys().find(|k| *k != "patches" && *k != "update_commitment") {
            return Err(SidetreeError::new(
                ErrorCode::DeltaUnexpectedProperty,
                format!("unexpected delta property '{}'", unexpected),
            ));
        }
        let delta: Delta = serde_json::from_value(value)
            .map_err(|e| SidetreeError::new(ErrorCode::DeltaMissingOrInvalid, e.to_string()))?;

        if delta.patches.len() > params.max_patches_per_delta {
            return Err(SidetreeError::new(
                ErrorCode::DeltaTooManyPatches,
                format!("{} patches, limit is {}", delta.patches.len(), params.max_patches_per_delta),
            ));
        }
        for patch in &delta.patches {
            document::validate_patch(patch)?;
        }
        multihash::validate_encoded_hash(&delta.update_commitment, params.hash_algorithm_in_multihash_code)?;
        Ok(delta)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuffixData {
    pub delta_hash: String,
    pub recovery_commitment: String,
}

impl SuffixData {
    pub fn parse(encoded: &str, params: &ProtocolParameters) -> Result<Self> {
        let bytes = encoder::decode(encoded)?;
        let suffix_data: SuffixData = serde_json::from_slice(&bytes)
            .map_err(|e| SidetreeError::new(ErrorCode::OperationSuffixDataInvalid, e.to_string()))?;
        let algorithm = params.hash_algorithm_in_multihash_code;
        multihash::validate_encoded_hash(&suffix_data.delta_hash, algorithm)?;
        multihash::validate_encoded_hash(&suffix_data.recovery_commitment, algorithm)?;
        Ok(suffix_data)
    }
}

/// Decodes `encoded`, checks it hashes to `expected_hash`, then validates it.
pub(crate) fn checked_delta(
    encoded: Option<&str>,
    expected_hash: &str,
    params: &ProtocolParameters,
) -> Result<Delta> {
    let encoded = encoded.ok_or_else(|| SidetreeError::from(ErrorCode::OperationDeltaMissing))?;
    let bytes = encoder::decode(encoded)?;
    if !multihash::is_valid_hash(&bytes, expected_hash) {
        return Err(SidetreeError::new(
            ErrorCode::OperationDeltaHashMismatch,
            "delta does not hash to the committed delta_hash",
        ));
    }
    Delta::parse(encoded, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn commitment() -> String {
        multihash::hash_then_encode(b"k", multihash::SHA2_256).unwrap()
    }

    #[test]
    fn rejects_oversized_delta() {
        let params = ProtocolParameters { max_delta_size_in_bytes: 64, ..Default::default() };
        let big = json!({"patches": [{"action": "replace", "document": {}}], "update_commitment": commitment(), });
        let encoded = encoder::encode(serde_json::to_vec(&big).unwrap());
        assert_eq!(Delta::parse(&encoded, &params).unwrap_err().code, ErrorCode::OperationDeltaExceedsMaxSize);
    }

    #[test]
    fn rejects_unknown_delta_property() {
        let delta = json!({"patches": [], "update_commitment": commitment(), "extra": true});
        let encoded = encoder::encode(serde_json::to_vec(&delta).unwrap());
        assert_eq!(
            Delta::parse(&encoded, &ProtocolParameters::default()).unwrap_err().code,
            ErrorCode::DeltaUnexpectedProperty
        );
    }

    #[test]
    fn rejects_too_many_patches() {
        let params = ProtocolParameters { max_patches_per_delta: 1, ..Default::default() };
        let patch = json!({"action": "remove-public-keys", "public_keys": ["a"]});
        let delta = json!({"patches": [patch.clone(), patch], "update_commitment": commitment()});
        let encoded = encoder::encode(serde_json::to_vec(&delta).unwrap());
        assert_eq!(Delta::parse(&encoded, &params).unwrap_err().code, ErrorCode::DeltaTooManyPatches);
    }
}
