//! Builds signed operation requests from caller-supplied keys.
//!
//! Commitments are derived from the *next* public keys; reveals are signed
//! with the *current* private key.

use k256::ecdsa::SigningKey;
use serde_json::{json, Value};

use super::delta::{Delta, SuffixData};
use super::create::compute_did_suffix;
use super::deactivate::DeactivateSignedData;
use super::recover::RecoverSignedData;
use super::reveal_commitment;
use super::update::UpdateSignedData;
use crate::config::ProtocolParameters;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::jwk::PublicKeyJwk;
use crate::util::jws::Jws;
use crate::util::{encoder, multihash};

/// A create request and the DID suffix it will produce.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub did_suffix: String,
    pub buffer: Vec<u8>,
}

pub fn public_jwk(key: &SigningKey) -> PublicKeyJwk {
    PublicKeyJwk::from_verifying_key(key.verifying_key())
}

/// Patch adding one secp256k1 verification key to the document.
pub fn add_public_key_patch(id: &str, key: &PublicKeyJwk) -> Value {
    json!({
        "action": "add-public-keys",
        "public_keys": [{
            "id": id,
            "type": "EcdsaSecp256k1VerificationKey2019",
            "jwk": key,
            "purpose": ["general", "auth"],
        }],
    })
}

pub fn create_request(
    recovery_public: &PublicKeyJwk,
    update_public: &PublicKeyJwk,
    patches: Vec<Value>,
    params: &ProtocolParameters,
) -> Result<CreateRequest> {
    let (encoded_delta, delta_hash) = encode_delta(patches, update_public, params)?;
    let suffix_data = SuffixData { delta_hash, recovery_commitment: reveal_commitment(recovery_public, params)? };
    let encoded_suffix_data = encoder::encode(to_json(&suffix_data)?);
    let did_suffix = compute_did_suffix(&encoded_suffix_data, params)?;
    let request = json!({
        "type": "create",
        "suffix_data": encoded_suffix_data,
        "delta": encoded_delta,
    });
    Ok(CreateRequest { did_suffix, buffer: to_json(&request)? })
}

pub fn update_request(
    did_suffix: &str,
    update_key: &SigningKey,
    next_update_public: &PublicKeyJwk,
    patches: Vec<Value>,
    params: &ProtocolParameters,
) -> Result<Vec<u8>> {
    let (encoded_delta, delta_hash) = encode_delta(patches, next_update_public, params)?;
    let signed = UpdateSignedData { update_key: public_jwk(update_key), delta_hash };
    let jws = Jws::sign(&signed, update_key)?;
    to_json(&json!({
        "type": "update",
        "did_suffix": did_suffix,
        "signed_data": jws.to_compact(),
        "delta": encoded_delta,
    }))
}

pub fn recover_request(
    did_suffix: &str,
    recovery_key: &SigningKey,
    next_recovery_public: &PublicKeyJwk,
    next_update_public: &PublicKeyJwk,
    patches: Vec<Value>,
    params: &ProtocolParameters,
) -> Result<Vec<u8>> {
    let (encoded_delta, delta_hash) = encode_delta(patches, next_update_public, params)?;
    let signed = RecoverSignedData {
        recovery_key: public_jwk(recovery_key),
        recovery_commitment: reveal_commitment(next_recovery_public, params)?,
        delta_hash,
    };
    let jws = Jws::sign(&signed, recovery_key)?;
    to_json(&json!({
        "type": "recover",
        "did_suffix": did_suffix,
        "signed_data": jws.to_compact(),
        "delta": encoded_delta,
    }))
}

pub fn deactivate_request(did_suffix: &str, recovery_key: &SigningKey) -> Result<Vec<u8>> {
    let signed = DeactivateSignedData { did_suffix: did_suffix.to_string(), recovery_key: public_jwk(recovery_key) };
    let jws = Jws::sign(&signed, recovery_key)?;
    to_json(&json!({
        "type": "deactivate",
        "did_suffix": did_suffix,
        "signed_data": jws.to_compact(),
    }))
}

fn encode_delta(
    patches: Vec<Value>,
    next_update_public: &PublicKeyJwk,
    params: &ProtocolParameters,
) -> Result<(String, String)> {
    let delta = Delta { patches, update_commitment: reveal_commitment(next_update_public, params)? };
    let bytes = to_json(&delta)?;
    let delta_hash = multihash::hash_then_encode(&bytes, params.hash_algorithm_in_multihash_code)?;
    Ok((encoder::encode(bytes), delta_hash))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| SidetreeError::new(ErrorCode::OperationRequestNotJson, e.to_string()))
}
