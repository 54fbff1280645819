//! The three CAS files describing one batch, and the anchor string that
//! points at them from the ledger.
//!
//! Encoding is JSON, then zstd. Parsing checks the compressed size against
//! the file's limit before decompressing, bounds decompression, then applies
//! a strict schema: every unknown property and wrong element type has its own
//! [`ErrorCode`].

pub mod anchor_file;
pub mod anchor_string;
pub mod chunk_file;
pub mod map_file;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::compressor;

/// Index entry for an operation that references its DID by suffix and
/// authorises itself with signed data (update, recover, deactivate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperationReference {
    pub did_suffix: String,
    pub signed_data: String,
}

/// Index entry for a create: the encoded suffix data from which the DID suffix is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReference {
    pub suffix_data: String,
}

pub(crate) fn encode_file<T: Serialize>(model: &T, not_json: ErrorCode) -> Result<Vec<u8>> {
    let raw = serde_json::to_vec(model).map_err(|e| SidetreeError::new(not_json, e.to_string()))?;
    compressor::compress(&raw)
}

/// Size check, bounded decompression, and JSON-object parse of a file.
pub(crate) fn decode_file(
    compressed: &[u8],
    max_size: usize,
    too_large: ErrorCode,
    not_json: ErrorCode,
) -> Result<Map<String, Value>> {
    if compressed.len() > max_size {
        return Err(SidetreeError::new(
            too_large,
            format!("file is {} bytes, limit is {}", compressed.len(), max_size),
        ));
    }
    let max_decompressed = max_size.saturating_mul(compressor::ESTIMATED_DECOMPRESSION_MULTIPLIER);
    let raw = compressor::decompress(compressed, max_decompressed)?;
    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(_) => Err(SidetreeError::new(not_json, "file is not a JSON object")),
        Err(e) => Err(SidetreeError::new(not_json, e.to_string())),
    }
}

pub(crate) fn reject_unknown(obj: &Map<String, Value>, allowed: &[&str], code: ErrorCode) -> Result<()> {
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unexpected) => Err(SidetreeError::new(code, format!("unexpected property '{}'", unexpected))),
        None => Ok(()),
    }
}

/// Parses an array of `{did_suffix, signed_data}` entries.
pub(crate) fn signed_references(value: &Value, invalid: ErrorCode) -> Result<Vec<SignedOperationReference>> {
    let items = value
        .as_array()
        .ok_or_else(|| SidetreeError::new(invalid, "operation list is not an array"))?;
    items
        .iter()
        .map(|item| {
            let obj = item
                .as_object()
                .ok_or_else(|| SidetreeError::new(invalid, "operation entry is not an object"))?;
            reject_unknown(obj, &["did_suffix", "signed_data"], invalid)?;
            serde_json::from_value(item.clone()).map_err(|e| SidetreeError::new(invalid, e.to_string()))
        })
        .collect()
}
