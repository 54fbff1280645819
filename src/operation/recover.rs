use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::delta::{checked_delta, Delta};
use super::{allow_only, ensure_commitment_advances, optional_str, signed_data, validated_did_suffix, ParseMode};
use crate::config::ProtocolParameters;
use crate::error::Result;
use crate::util::jwk::PublicKeyJwk;
use crate::util::jws::Jws;
use crate::util::multihash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecoverSignedData {
    /// Reveal value for the recovery chain.
    pub recovery_key: PublicKeyJwk,
    /// Next recovery commitment.
    pub recovery_commitment: String,
    pub delta_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoverOperation {
    pub did_suffix: String,
    pub signed_data_jws: Jws,
    pub signed_data: RecoverSignedData,
    pub encoded_delta: Option<String>,
    pub delta: Option<Delta>,
    pub operation_buffer: Vec<u8>,
}

impl RecoverOperation {
    pub(crate) fn from_object(
        obj: &Map<String, Value>,
        buffer: &[u8],
        params: &ProtocolParameters,
        mode: ParseMode,
    ) -> Result<Self> {
        allow_only(obj, &["type", "did_suffix", "signed_data", "delta"])?;
        let did_suffix = validated_did_suffix(obj, params)?;
        let signed_data_jws = signed_data(obj)?;
        let signed_data: RecoverSignedData = signed_data_jws.decode_payload()?;
        let algorithm = params.hash_algorithm_in_multihash_code;
        multihash::validate_encoded_hash(&signed_data.delta_hash, algorithm)?;
        multihash::validate_encoded_hash(&signed_data.recovery_commitment, algorithm)?;
        if mode == ParseMode::Request {
            ensure_commitment_advances(&signed_data.recovery_key, &signed_data.recovery_commitment, params)?;
        }

        let encoded_delta = optional_str(obj, "delta")?;
        let delta = match mode {
            ParseMode::Request => Some(checked_delta(encoded_delta, &signed_data.delta_hash, params)?),
            ParseMode::Anchored => checked_delta(encoded_delta, &signed_data.delta_hash, params).ok(),
        };

        Ok(Self {
            did_suffix,
            signed_data_jws,
            signed_data,
            encoded_delta: encoded_delta.map(str::to_string),
            delta,
            operation_buffer: buffer.to_vec(),
        })
    }
}
