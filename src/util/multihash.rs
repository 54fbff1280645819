//! Multihash framing: `<algorithm code><digest length><digest>`.
//!
//! Only SHA2-256 (code 18) is implemented; other codes are rejected so a
//! protocol version cannot silently run with a hash it does not understand.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::{canonical, encoder};

pub const SHA2_256: u64 = 18;

pub fn hash(content: &[u8], algorithm: u64) -> Result<Vec<u8>> {
    match algorithm {
        SHA2_256 => {
            let digest = Sha256::digest(content);
            let mut out = Vec::with_capacity(2 + digest.len());
            out.push(SHA2_256 as u8);
            out.push(digest.len() as u8);
            out.extend_from_slice(&digest);
            Ok(out)
        }
        other => Err(SidetreeError::new(
            ErrorCode::MultihashUnsupportedHashAlgorithm,
            format!("hash algorithm {} is not supported", other),
        )),
    }
}

pub fn hash_then_encode(content: &[u8], algorithm: u64) -> Result<String> {
    Ok(encoder::encode(hash(content, algorithm)?))
}

/// Commitment function: canonical JSON, then multihash, then base64url.
pub fn canonicalize_then_hash_then_encode<T: Serialize + ?Sized>(
    value: &T,
    algorithm: u64,
) -> Result<String> {
    let canonical = canonical::canonicalize(value)?;
    hash_then_encode(&canonical, algorithm)
}

/// Splits a multihash into `(algorithm, digest)`.
pub fn decode(multihash: &[u8]) -> Result<(u64, &[u8])> {
    let (code, len, rest) = match multihash {
        [code, len, rest @ ..] if *code < 0x80 && *len < 0x80 => (*code as u64, *len as usize, rest),
        _ => return Err(ErrorCode::MultihashStringNotAMultihash.into()),
    };
    if rest.len() != len {
        return Err(SidetreeError::new(
            ErrorCode::MultihashStringNotAMultihash,
            format!("declared digest length {} but found {}", len, rest.len()),
        ));
    }
    Ok((code, rest))
}

/// Checks an encoded multihash string is well formed and uses `algorithm`.
pub fn validate_encoded_hash(encoded: &str, algorithm: u64) -> Result<()> {
    let bytes = encoder::decode(encoded)?;
    let (code, _) = decode(&bytes)?;
    if code != algorithm {
        return Err(SidetreeError::new(
            ErrorCode::MultihashNotSupported,
            format!("expected hash algorithm {} but found {}", algorithm, code),
        ));
    }
    Ok(())
}

/// True if `content` hashes to the encoded multihash, using the algorithm it declares.
pub fn is_valid_hash(content: &[u8], encoded_multihash: &str) -> bool {
    let Ok(bytes) = encoder::decode(encoded_multihash) else { return false };
    let Ok((code, _)) = decode(&bytes) else { return false };
    match hash(content, code) {
        Ok(expected) => expected == bytes,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_multihash_has_prefix() {
        let mh = hash(b"abc", SHA2_256).unwrap();
        assert_eq!(&mh[..2], &[0x12, 0x20]);
        assert_eq!(mh.len(), 34);
        assert!(hash(b"abc", 22).is_err());
    }

    #[test]
    fn commitment_ignores_key_order() {
        let a = json!({"kty": "EC", "crv": "secp256k1", "x": "1", "y": "2"});
        let b = json!({"y": "2", "x": "1", "crv": "secp256k1", "kty": "EC"});
        assert_eq!(
            canonicalize_then_hash_then_encode(&a, SHA2_256).unwrap(),
            canonicalize_then_hash_then_encode(&b, SHA2_256).unwrap()
        );
    }

    #[test]
    fn validates_encoded_hashes() {
        let encoded = hash_then_encode(b"data", SHA2_256).unwrap();
        assert!(is_valid_hash(b"data", &encoded));
        assert!(!is_valid_hash(b"other", &encoded));
        assert!(validate_encoded_hash(&encoded, SHA2_256).is_ok());
        assert_eq!(
            validate_encoded_hash(&encoder::encode(b"xyz"), SHA2_256).unwrap_err().code,
            ErrorCode::MultihashStringNotAMultihash
        );
    }
}
