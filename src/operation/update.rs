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
pub struct UpdateSignedData {
    /// Reveal value for the update chain.
    pub update_key: PublicKeyJwk,
    pub delta_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub did_suffix: String,
    pub signed_data_jws: Jws,
    pub signed_data: UpdateSignedData,
    pub encoded_delta: Option<String>,
    pub delta: Option<Delta>,
    pub operation_buffer: Vec<u8>,
}

impl UpdateOperation {
    pub(crate) fn from_object(
        obj: &Map<String, Value>,
        buffer: &[u8],
        params: &ProtocolParameters,
        mode: ParseMode,
    ) -> Result<Self> {
        allow_only(obj, &["type", "did_suffix", "signed_data", "delta"])?;
        let did_suffix = validated_did_suffix(obj, params)?;
        let signed_data_jws = signed_data(obj)?;
        let signed_data: UpdateSignedData = signed_data_jws.decode_payload()?;
        multihash::validate_encoded_hash(&signed_data.delta_hash, params.hash_algorithm_in_multihash_code)?;

        let encoded_delta = optional_str(obj, "delta")?;
        let delta = match mode {
            ParseMode::Request => Some(checked_delta(encoded_delta, &signed_data.delta_hash, params)?),
            ParseMode::Anchored => checked_delta(encoded_delta, &signed_data.delta_hash, params).ok(),
        };
        if let (ParseMode::Request, Some(delta)) = (mode, &delta) {
            ensure_commitment_advances(&signed_data.update_key, &delta.update_commitment, params)?;
        }

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
