//! Anchor file: `{map_file_hash, operations?: {create, recover, deactivate}}`.
//!
//! The anchor file is the only file the anchor string points at directly, so
//! it carries every operation that can touch the recovery chain. Updates live
//! in the map file.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    decode_file, encode_file, reject_unknown, signed_references, CreateReference, SignedOperationReference,
};
use crate::config::ProtocolParameters;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::operation::create::compute_did_suffix;
use crate::util::multihash;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnchorFileOperations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub create: Vec<CreateReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recover: Vec<SignedOperationReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deactivate: Vec<SignedOperationReference>,
}

impl AnchorFileOperations {
    fn is_empty(&self) -> bool {
        self.create.is_empty() && self.recover.is_empty() && self.deactivate.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorFile {
    pub map_file_hash: String,
    #[serde(default, skip_serializing_if = "AnchorFileOperations::is_empty")]
    pub operations: AnchorFileOperations,
    /// Suffixes derived from `operations.create`, same order.
    #[serde(skip)]
    pub create_did_suffixes: Vec<String>,
}

impl AnchorFile {
    /// DID suffixes in operation-index order: creates, recovers, deactivates.
    pub fn did_suffixes(&self) -> Vec<&str> {
        self.create_did_suffixes
            .iter()
            .map(String::as_str)
            .chain(self.operations.recover.iter().map(|r| r.did_suffix.as_str()))
            .chain(self.operations.deactivate.iter().map(|r| r.did_suffix.as_str()))
            .collect()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.create.len() + self.operations.recover.len() + self.operations.deactivate.len()
    }
}

pub fn build(map_file_hash: &str, operations: AnchorFileOperations) -> Result<Vec<u8>> {
    let model = AnchorFile { map_file_hash: map_file_hash.to_string(), operations, create_did_suffixes: Vec::new() };
    encode_file(&model, ErrorCode::AnchorFileNotJson)
}

pub fn parse(compressed: &[u8], params: &ProtocolParameters) -> Result<AnchorFile> {
    let obj = decode_file(
        compressed,
        params.max_anchor_file_size_in_bytes,
        ErrorCode::AnchorFileExceededMaxSize,
        ErrorCode::AnchorFileNotJson,
    )?;
    reject_unknown(&obj, &["map_file_hash", "operations"], ErrorCode::AnchorFileUnexpectedProperty)?;

    let map_file_hash = obj
        .get("map_file_hash")
        .ok_or_else(|| SidetreeError::new(ErrorCode::AnchorFileMapFileHashMissing, "missing map_file_hash"))?
        .as_str()
        .ok_or_else(|| SidetreeError::new(ErrorCode::AnchorFileMapFileHashInvalid, "map_file_hash is not a string"))?;
    multihash::validate_encoded_hash(map_file_hash, params.hash_algorithm_in_multihash_code)
        .map_err(|e| SidetreeError::new(ErrorCode::AnchorFileMapFileHashInvalid, e.to_string()))?;

    let operations = match obj.get("operations") {
        None => AnchorFileOperations::default(),
        Some(ops) => parse_operations(ops)?,
    };

    let create_did_suffixes = operations
        .create
        .iter()
        .map(|c| compute_did_suffix(&c.suffix_data, params))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| SidetreeError::new(ErrorCode::AnchorFileOperationEntryInvalid, e.to_string()))?;

    let anchor_file = AnchorFile { map_file_hash: map_file_hash.to_string(), operations, create_did_suffixes };

    let mut seen = HashSet::new();
    for suffix in anchor_file.did_suffixes() {
        if !seen.insert(suffix) {
            return Err(SidetreeError::new(
                ErrorCode::AnchorFileMultipleOperationsForTheSameDid,
                format!("more than one operation for {}", suffix),
            ));
        }
    }
    Ok(anchor_file)
}

fn parse_operations(ops: &Value) -> Result<AnchorFileOperations> {
    let obj = ops.as_object().ok_or_else(|| {
        SidetreeError::new(ErrorCode::AnchorFileOperationsPropertyInvalid, "'operations' is not an object")
    })?;
    reject_unknown(obj, &["create", "recover", "deactivate"], ErrorCode::AnchorFileUnexpectedProperty)?;

    let mut operations = AnchorFileOperations::default();
    if let Some(list) = obj.get("create") {
        let items = list.as_array().ok_or_else(|| {
            SidetreeError::new(ErrorCode::AnchorFileOperationEntryInvalid, "create list is not an array")
        })?;
        for item in items {
            let entry = item.as_object().ok_or_else(|| {
                SidetreeError::new(ErrorCode::AnchorFileOperationEntryInvalid, "create entry is not an object")
            })?;
            reject_unknown(entry, &["suffix_data"], ErrorCode::AnchorFileOperationEntryInvalid)?;
            let suffix_data = entry.get("suffix_data").and_then(Value::as_str).ok_or_else(|| {
                SidetreeError::new(ErrorCode::AnchorFileOperationEntryInvalid, "create entry has no suffix_data")
            })?;
            operations.create.push(CreateReference { suffix_data: suffix_data.to_string() });
        }
    }
    if let Some(list) = obj.get("recover") {
        operations.recover = signed_references(list, ErrorCode::AnchorFileOperationEntryInvalid)?;
    }
    if let Some(list) = obj.get("deactivate") {
        operations.deactivate = signed_references(list, ErrorCode::AnchorFileOperationEntryInvalid)?;
    }
    Ok(operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{compressor, encoder};
    use serde_json::json;

    fn hash(data: &str) -> String {
        multihash::hash_then_encode(data.as_bytes(), multihash::SHA2_256).unwrap()
    }

    fn signed(suffix: &str) -> SignedOperationReference {
        SignedOperationReference { did_suffix: suffix.to_string(), signed_data: "a.b.c".to_string() }
    }

    fn compress(value: Value) -> Vec<u8> {
        compressor::compress(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    #[test]
    fn lists_suffixes_in_operation_index_order() {
        let suffix_data = encoder::encode("{}");
        let operations = AnchorFileOperations {
            create: vec![CreateReference { suffix_data: suffix_data.clone() }],
            recover: vec![signed(&hash("r"))],
            deactivate: vec![signed(&hash("d"))],
        };
        let parsed = parse(&build(&hash("map"), operations).unwrap(), &ProtocolParameters::default()).unwrap();
        let created = compute_did_suffix(&suffix_data, &ProtocolParameters::default()).unwrap();
        assert_eq!(parsed.did_suffixes(), vec![created.as_str(), hash("r").as_str(), hash("d").as_str()]);
        assert_eq!(parsed.operation_count(), 3);
        assert_eq!(parsed.map_file_hash, hash("map"));
    }

    #[test]
    fn rejects_same_did_in_recover_and_deactivate() {
        let operations = AnchorFileOperations {
            recover: vec![signed(&hash("x"))],
            deactivate: vec![signed(&hash("x"))],
            ..Default::default()
        };
        let err = parse(&build(&hash("map"), operations).unwrap(), &ProtocolParameters::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::AnchorFileMultipleOperationsForTheSameDid);
    }

    #[test]
    fn rejects_schema_violations() {
        let params = ProtocolParameters::default();
        assert_eq!(
            parse(&compress(json!({"operations": {}})), &params).unwrap_err().code,
            ErrorCode::AnchorFileMapFileHashMissing
        );
        assert_eq!(
            parse(&compress(json!({"map_file_hash": 42})), &params).unwrap_err().code,
            ErrorCode::AnchorFileMapFileHashInvalid
        );
        assert_eq!(
            parse(&compress(json!({"map_file_hash": hash("m"), "writer_lock_id": "x"})), &params).unwrap_err().code,
            ErrorCode::AnchorFileUnexpectedProperty
        );
        assert_eq!(
            parse(&compress(json!({"map_file_hash": hash("m"), "operations": []})), &params).unwrap_err().code,
            ErrorCode::AnchorFileOperationsPropertyInvalid
        );
        assert_eq!(
            parse(&compress(json!({"map_file_hash": hash("m"), "operations": {"update": []}})), &params)
                .unwrap_err()
                .code,
            ErrorCode::AnchorFileUnexpectedProperty
        );
        assert_eq!(
            parse(&compress(json!({"map_file_hash": hash("m"), "operations": {"create": [{"delta": "x"}]}})), &params)
                .unwrap_err()
                .code,
            ErrorCode::AnchorFileOperationEntryInvalid
        );
        assert_eq!(parse(&compress(json!([1])), &params).unwrap_err().code, ErrorCode::AnchorFileNotJson);
    }
}
