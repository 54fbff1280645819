//! Base64url (no padding) encoding used for every string-encoded field.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::error::{ErrorCode, Result, SidetreeError};

pub fn encode(content: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(content)
}

pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    if !is_base64url(encoded) {
        return Err(SidetreeError::new(
            ErrorCode::EncodedStringIncorrectEncoding,
            format!("'{}' is not base64url", truncate(encoded)),
        ));
    }
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| SidetreeError::new(ErrorCode::EncodedStringIncorrectEncoding, e.to_string()))
}

pub fn decode_as_string(encoded: &str) -> Result<String> {
    let bytes = decode(encoded)?;
    String::from_utf8(bytes)
        .map_err(|e| SidetreeError::new(ErrorCode::EncodedStringIncorrectEncoding, e.to_string()))
}

pub fn is_base64url(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(32) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
