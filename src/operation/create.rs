use serde_json::{Map, Value};

use super::delta::{checked_delta, Delta, SuffixData};
use super::{allow_only, optional_str, required_str, ParseMode};
use crate::config::ProtocolParameters;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::{encoder, multihash};

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    /// Encoded multihash of the decoded suffix data.
    pub did_suffix: String,
    pub encoded_suffix_data: String,
    pub suffix_data: SuffixData,
    pub encoded_delta: Option<String>,
    /// `None` when the delta is missing or does not match `suffix_data.delta_hash`.
    pub delta: Option<Delta>,
    pub operation_buffer: Vec<u8>,
}

impl CreateOperation {
    pub(crate) fn from_object(
        obj: &Map<String, Value>,
        buffer: &[u8],
        params: &ProtocolParameters,
        mode: ParseMode,
    ) -> Result<Self> {
        allow_only(obj, &["type", "suffix_data", "delta"])?;

        let encoded_suffix_data = required_str(obj, "suffix_data")?;
        let suffix_data = SuffixData::parse(encoded_suffix_data, params)?;
        let did_suffix = compute_did_suffix(encoded_suffix_data, params)?;

        let encoded_delta = optional_str(obj, "delta")?;
        let delta = match mode {
            ParseMode::Request => Some(checked_delta(encoded_delta, &suffix_data.delta_hash, params)?),
            ParseMode::Anchored => checked_delta(encoded_delta, &suffix_data.delta_hash, params).ok(),
        };

        Ok(Self {
            did_suffix,
            encoded_suffix_data: encoded_suffix_data.to_string(),
            suffix_data,
            encoded_delta: encoded_delta.map(str::to_string),
            delta,
            operation_buffer: buffer.to_vec(),
        })
    }
}

pub fn compute_did_suffix(encoded_suffix_data: &str, params: &ProtocolParameters) -> Result<String> {
    let bytes = encoder::decode(encoded_suffix_data)
        .map_err(|e| SidetreeError::new(ErrorCode::OperationSuffixDataInvalid, e.to_string()))?;
    multihash::hash_then_encode(&bytes, params.hash_algorithm_in_multihash_code)
}
