//! Chunk file: `{deltas: [encoded delta, ...]}`.
//!
//! Deltas are ordered create, recover, update, matching the order in which
//! the anchor and map files list those operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode_file, encode_file, reject_unknown};
use crate::config::ProtocolParameters;
use crate::error::{ErrorCode, Result, SidetreeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFile {
    pub deltas: Vec<String>,
}

pub fn build(deltas: Vec<String>) -> Result<Vec<u8>> {
    encode_file(&ChunkFile { deltas }, ErrorCode::ChunkFileNotJson)
}

pub fn parse(compressed: &[u8], params: &ProtocolParameters) -> Result<ChunkFile> {
    let obj = decode_file(
        compressed,
        params.max_chunk_file_size_in_bytes,
        ErrorCode::ChunkFileExceededMaxSize,
        ErrorCode::ChunkFileNotJson,
    )?;
    reject_unknown(&obj, &["deltas"], ErrorCode::ChunkFileUnexpectedProperty)?;
    let deltas = obj
        .get("deltas")
        .ok_or_else(|| SidetreeError::new(ErrorCode::ChunkFileDeltasPropertyNotArray, "missing 'deltas'"))?;
    let deltas = validate_deltas_property(deltas, params)?;
    Ok(ChunkFile { deltas })
}

fn validate_deltas_property(deltas: &Value, params: &ProtocolParameters) -> Result<Vec<String>> {
    let items = deltas
        .as_array()
        .ok_or_else(|| SidetreeError::new(ErrorCode::ChunkFileDeltasPropertyNotArray, "'deltas' is not an array"))?;

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let delta = item.as_str().ok_or_else(|| {
            SidetreeError::new(ErrorCode::ChunkFileDeltasNotArrayOfStrings, format!("{} is not a string", item))
        })?;
        let size = decoded_len(delta);
        if size > params.max_delta_size_in_bytes {
            return Err(SidetreeError::new(
                ErrorCode::ChunkFileDeltaSizeExceedsLimit,
                format!("delta is {} bytes, limit is {}", size, params.max_delta_size_in_bytes),
            ));
        }
        out.push(delta.to_string());
    }
    Ok(out)
}

// Byte length of an unpadded base64url string once decoded.
fn decoded_len(encoded: &str) -> usize {
    encoded.len() * 3 / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{compressor, encoder};
    use serde_json::json;

    fn compressed(value: Value) -> Vec<u8> {
        compressor::compress(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    #[test]
    fn builds_and_parses_deltas_in_order() {
        let deltas = vec![encoder::encode("a"), encoder::encode("b")];
        let parsed = parse(&build(deltas.clone()).unwrap(), &ProtocolParameters::default()).unwrap();
        assert_eq!(parsed.deltas, deltas);
    }

    #[test]
    fn rejects_unknown_property() {
        let file = compressed(json!({"deltas": [], "unexpectedProperty": "any value"}));
        assert_eq!(
            parse(&file, &ProtocolParameters::default()).unwrap_err().code,
            ErrorCode::ChunkFileUnexpectedProperty
        );
    }

    #[test]
    fn rejects_wrong_delta_shapes() {
        let params = ProtocolParameters::default();
        assert_eq!(
            validate_deltas_property(&json!("Incorrect type."), &params).unwrap_err().code,
            ErrorCode::ChunkFileDeltasPropertyNotArray
        );
        assert_eq!(
            validate_deltas_property(&json!([1, 2, 3]), &params).unwrap_err().code,
            ErrorCode::ChunkFileDeltasNotArrayOfStrings
        );
        let oversized = encoder::encode(vec![7u8; 2000]);
        assert_eq!(
            validate_deltas_property(&json!([oversized]), &params).unwrap_err().code,
            ErrorCode::ChunkFileDeltaSizeExceedsLimit
        );
    }

    #[test]
    fn size_limit_is_checked_before_decompression() {
        let params = ProtocolParameters { max_chunk_file_size_in_bytes: 16, ..Default::default() };
        // Not valid zstd: only the size check can have produced this error.
        let garbage = vec![0xffu8; 17];
        assert_eq!(parse(&garbage, &params).unwrap_err().code, ErrorCode::ChunkFileExceededMaxSize);
        assert_eq!(parse(&garbage[..16], &params).unwrap_err().code, ErrorCode::CompressorDecompressionFailure);
    }
}
