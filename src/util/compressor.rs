//! zstd compression for anchored batch files.

use std::io::Read;

use crate::error::{ErrorCode, Result, SidetreeError};

/// Ratio between a file's compressed size limit and the decompressed bytes we
/// are willing to produce from it.
pub const ESTIMATED_DECOMPRESSION_MULTIPLIER: usize = 3;

const COMPRESSION_LEVEL: i32 = 3;

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::stream::encode_all(data, COMPRESSION_LEVEL)
        .map_err(|e| SidetreeError::new(ErrorCode::CompressorDecompressionFailure, e.to_string()))
}

/// Decompresses, refusing to produce more than `max_allowed_size` bytes.
pub fn decompress(compressed: &[u8], max_allowed_size: usize) -> Result<Vec<u8>> {
    let decoder = zstd::stream::read::Decoder::new(compressed)
        .map_err(|e| SidetreeError::new(ErrorCode::CompressorDecompressionFailure, e.to_string()))?;
    let mut decompressed = Vec::new();
    let mut limited = decoder.take(max_allowed_size as u64 + 1);
    limited
        .read_to_end(&mut decompressed)
        .map_err(|e| SidetreeError::new(ErrorCode::CompressorDecompressionFailure, e.to_string()))?;

    if decompressed.len() > max_allowed_size {
        return Err(SidetreeError::new(
            ErrorCode::CompressorMaxAllowedDecompressDataSizeExceeded,
            format!("decompressed data exceeds {} bytes", max_allowed_size),
        ));
    }
    Ok(decompressed)
}
