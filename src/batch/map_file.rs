//! Map file: `{chunks: [{chunk_file_hash}], operations?: {update: [...]}}`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{decode_file, encode_file, reject_unknown, signed_references, SignedOperationReference};
use crate::config::ProtocolParameters;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::multihash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReference {
    pub chunk_file_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapFileOperations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<SignedOperationReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapFile {
    pub chunks: Vec<ChunkReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<MapFileOperations>,
}

impl MapFile {
    /// Hash of the single chunk file; `None` for a map built without one.
    pub fn chunk_file_hash(&self) -> Option<&str> {
        self.chunks.first().map(|c| c.chunk_file_hash.as_str())
    }

    pub fn update_operations(&self) -> &[SignedOperationReference] {
        self.operations.as_ref().map(|o| o.update.as_slice()).unwrap_or(&[])
    }
}

pub fn build(chunk_file_hash: &str, updates: Vec<SignedOperationReference>) -> Result<Vec<u8>> {
    let operations = (!updates.is_empty()).then(|| MapFileOperations { update: updates });
    let model = MapFile { chunks: vec![ChunkReference { chunk_file_hash: chunk_file_hash.to_string() }], operations };
    encode_file(&model, ErrorCode::MapFileNotJson)
}

pub fn parse(compressed: &[u8], params: &ProtocolParameters) -> Result<MapFile> {
    let obj = decode_file(
        compressed,
        params.max_map_file_size_in_bytes,
        ErrorCode::MapFileExceededMaxSize,
        ErrorCode::MapFileNotJson,
    )?;
    reject_unknown(&obj, &["chunks", "operations"], ErrorCode::MapFileUnexpectedProperty)?;

    let chunks = obj
        .get("chunks")
        .and_then(|c| c.as_array())
        .filter(|c| c.len() == 1)
        .ok_or_else(|| SidetreeError::new(ErrorCode::MapFileChunksPropertyInvalid, "expected exactly one chunk"))?;
    let chunk = chunks[0]
        .as_object()
        .ok_or_else(|| SidetreeError::new(ErrorCode::MapFileChunksPropertyInvalid, "chunk entry is not an object"))?;
    reject_unknown(chunk, &["chunk_file_hash"], ErrorCode::MapFileChunksPropertyInvalid)?;
    let chunk_file_hash = chunk
        .get("chunk_file_hash")
        .and_then(|h| h.as_str())
        .ok_or_else(|| SidetreeError::new(ErrorCode::MapFileChunkFileHashInvalid, "missing chunk_file_hash"))?;
    multihash::validate_encoded_hash(chunk_file_hash, params.hash_algorithm_in_multihash_code)
        .map_err(|e| SidetreeError::new(ErrorCode::MapFileChunkFileHashInvalid, e.to_string()))?;

    let operations = match obj.get("operations") {
        None => None,
        Some(ops) => {
            let ops_obj = ops.as_object().ok_or_else(|| {
                SidetreeError::new(ErrorCode::MapFileOperationsPropertyInvalid, "'operations' is not an object")
            })?;
            reject_unknown(ops_obj, &["update"], ErrorCode::MapFileUnexpectedProperty)?;
            let update = match ops_obj.get("update") {
                Some(list) => signed_references(list, ErrorCode::MapFileOperationEntryInvalid)?,
                None => Vec::new(),
            };
            Some(MapFileOperations { update })
        }
    };

    let map_file = MapFile {
        chunks: vec![ChunkReference { chunk_file_hash: chunk_file_hash.to_string() }],
        operations,
    };

    let mut seen = HashSet::new();
    for op in map_file.update_operations() {
        if !seen.insert(op.did_suffix.as_str()) {
            return Err(SidetreeError::new(
                ErrorCode::MapFileMultipleOperationsForTheSameDid,
                format!("more than one operation for {}", op.did_suffix),
            ));
        }
    }
    Ok(map_file)
}
