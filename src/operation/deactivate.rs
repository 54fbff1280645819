use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{allow_only, signed_data, validated_did_suffix};
use crate::config::ProtocolParameters;
use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::jwk::PublicKeyJwk;
use crate::util::jws::Jws;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeactivateSignedData {
    /// Signed copy of the target suffix, so the signature cannot be replayed against another DID.
    pub did_suffix: String,
    pub recovery_key: PublicKeyJwk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeactivateOperation {
    pub did_suffix: String,
    pub signed_data_jws: Jws,
    pub signed_data: DeactivateSignedData,
    pub operation_buffer: Vec<u8>,
}

impl DeactivateOperation {
    pub(crate) fn from_object(obj: &Map<String, Value>, buffer: &[u8], params: &ProtocolParameters) -> Result<Self> {
        allow_only(obj, &["type", "did_suffix", "signed_data"])?;
        let did_suffix = validated_did_suffix(obj, params)?;
        let signed_data_jws = signed_data(obj)?;
        let signed_data: DeactivateSignedData = signed_data_jws.decode_payload()?;
        if signed_data.did_suffix != did_suffix {
            return Err(SidetreeError::new(
                ErrorCode::OperationSignedDataDidSuffixMismatch,
                format!("signed suffix {} does not match {}", signed_data.did_suffix, did_suffix),
            ));
        }
        Ok(Self { did_suffix, signed_data_jws, signed_data, operation_buffer: buffer.to_vec() })
    }
}
