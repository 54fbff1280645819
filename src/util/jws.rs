//! Compact JWS (`ES256K`) carrying the signed data of update, recover and
//! deactivate operations.
use dashmap::DashMap;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::encoder;
use crate::util::jwk::PublicKeyJwk;

// Parsed verifying keys, keyed by raw x||y, so repeated replays of the same
// history skip EC point decoding.
static KEY_CACHE: OnceLock<DashMap<[u8; 64], VerifyingKey>> = OnceLock::new();
const KEY_CACHE_LIMIT: usize = 100_000;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProtectedHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

impl Jws {
    pub fn parse(compact: &str) -> Result<Self> {
        let parts: Vec<&str> = compact.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| !encoder::is_base64url(p)) {
            return Err(SidetreeError::new(ErrorCode::JwsCompactJwsInvalid, "expected three base64url segments"));
        }

        let header_bytes = encoder::decode(parts[0])?;
        let header: ProtectedHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| SidetreeError::new(ErrorCode::JwsCompactJwsInvalid, e.to_string()))?;
        if header.alg != "ES256K" {
            return Err(SidetreeError::new(
                ErrorCode::JwsUnsupportedAlgorithm,
                format!("algorithm {} is not supported", header.alg),
            ));
        }

        Ok(Self {
            protected: parts[0].to_string(),
            payload: parts[1].to_string(),
            signature: parts[2].to_string(),
        })
    }

    pub fn sign<T: Serialize>(payload: &T, key: &SigningKey) -> Result<Self> {
        let header = ProtectedHeader { alg: "ES256K".to_string(), kid: None };
        let protected = encoder::encode(to_json(&header)?);
        let payload = encoder::encode(to_json(payload)?);
        let signing_input = format!("{}.{}", protected, payload);
        let signature: Signature = key.sign(signing_input.as_bytes());
        Ok(Self { protected, payload, signature: encoder::encode(signature.to_bytes()) })
    }

    pub fn to_compact(&self) -> String {
        format!("{}.{}.{}", self.protected, self.payload, self.signature)
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = encoder::decode(&self.payload)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SidetreeError::new(ErrorCode::OperationSignedDataPayloadInvalid, e.to_string()))
    }

    pub fn verify(&self, jwk: &PublicKeyJwk) -> bool {
        let Ok(key) = cached_verifying_key(jwk) else { return false };
        let Ok(sig_bytes) = encoder::decode(&self.signature) else { return false };
        let Ok(signature) = Signature::from_slice(&sig_bytes) else { return false };
        let signing_input = format!("{}.{}", self.protected, self.payload);
        key.verify(signing_input.as_bytes(), &signature).is_ok()
    }
}

fn cached_verifying_key(jwk: &PublicKeyJwk) -> Result<VerifyingKey> {
    let (x, y) = jwk.coordinates()?;
    let mut raw = [0u8; 64];
    raw[..32].copy_from_slice(&x);
    raw[32..].copy_from_slice(&y);

    let cache = KEY_CACHE.get_or_init(|| DashMap::with_capacity(1024));
    if let Some(key) = cache.get(&raw) {
        return Ok(key.value().clone());
    }
    let key = jwk.to_verifying_key()?;
    if cache.len() > KEY_CACHE_LIMIT {
        cache.clear();
    }
    cache.insert(raw, key.clone());
    Ok(key)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| SidetreeError::new(ErrorCode::JwsCompactJwsInvalid, e.to_string()))
}
