//! secp256k1 public keys in JWK form.

use k256::ecdsa::VerifyingKey;
use k256::{EncodedPoint, FieldBytes};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::encoder;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublicKeyJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
}

impl PublicKeyJwk {
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        // Uncompressed points always carry both coordinates.
        let x = point.x().map(|x| encoder::encode(x)).unwrap_or_default();
        let y = point.y().map(|y| encoder::encode(y)).unwrap_or_default();
        Self { kty: "EC".to_string(), crv: "secp256k1".to_string(), x, y }
    }

    /// Raw `x || y` coordinates, validated for curve and length.
    pub fn coordinates(&self) -> Result<([u8; 32], [u8; 32])> {
        if self.kty != "EC" || self.crv != "secp256k1" {
            return Err(SidetreeError::new(
                ErrorCode::JwkEs256kInvalid,
                format!("unsupported key type {}/{}", self.kty, self.crv),
            ));
        }
        let x = encoder::decode(&self.x)?;
        let y = encoder::decode(&self.y)?;
        if x.len() != 32 || y.len() != 32 {
            return Err(SidetreeError::new(ErrorCode::JwkEs256kInvalid, "coordinates must be 32 bytes"));
        }
        let mut xa = [0u8; 32];
        let mut ya = [0u8; 32];
        xa.copy_from_slice(&x);
        ya.copy_from_slice(&y);
        Ok((xa, ya))
    }

    pub fn to_verifying_key(&self) -> Result<VerifyingKey> {
        let (x, y) = self.coordinates()?;
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x),
            FieldBytes::from_slice(&y),
            false,
        );
        VerifyingKey::from_encoded_point(&point)
            .map_err(|_| SidetreeError::new(ErrorCode::JwkEs256kInvalid, "point is not on secp256k1"))
    }
}
