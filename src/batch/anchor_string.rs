//! `<operation count>.<anchor file hash>`, the only payload written to the ledger.

use std::fmt;

use crate::error::{ErrorCode, Result, SidetreeError};
use crate::util::encoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorString {
    pub operation_count: usize,
    pub anchor_file_hash: String,
}

impl AnchorString {
    pub fn new(operation_count: usize, anchor_file_hash: impl Into<String>) -> Self {
        Self { operation_count, anchor_file_hash: anchor_file_hash.into() }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (count, hash) = s.split_once('.').ok_or_else(|| {
            SidetreeError::new(ErrorCode::AnchorStringInvalidFormat, format!("'{}' has no separator", s))
        })?;
        if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SidetreeError::new(
                ErrorCode::AnchorStringOperationCountInvalid,
                format!("'{}' is not an operation count", count),
            ));
        }
        let operation_count: usize = count.parse().map_err(|_| {
            SidetreeError::new(ErrorCode::AnchorStringOperationCountInvalid, format!("'{}' is out of range", count))
        })?;
        if operation_count == 0 {
            return Err(SidetreeError::new(ErrorCode::AnchorStringOperationCountInvalid, "operation count is zero"));
        }
        if hash.is_empty() || !encoder::is_base64url(hash) {
            return Err(SidetreeError::new(
                ErrorCode::AnchorStringInvalidFormat,
                format!("'{}' is not an encoded hash", hash),
            ));
        }
        Ok(Self { operation_count, anchor_file_hash: hash.to_string() })
    }
}

impl fmt::Display for AnchorString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.operation_count, self.anchor_file_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_count_and_hash() {
        let parsed = AnchorString::parse("12.EiDabc_-").unwrap();
        assert_eq!(parsed, AnchorString::new(12, "EiDabc_-"));
        assert_eq!(parsed.to_string(), "12.EiDabc_-");
    }

    #[test]
    fn rejects_malformed_strings() {
        assert_eq!(AnchorString::parse("EiDabc").unwrap_err().code, ErrorCode::AnchorStringInvalidFormat);
        assert_eq!(AnchorString::parse("0.EiD").unwrap_err().code, ErrorCode::AnchorStringOperationCountInvalid);
        assert_eq!(AnchorString::parse("+3.EiD").unwrap_err().code, ErrorCode::AnchorStringOperationCountInvalid);
        assert_eq!(AnchorString::parse("3.").unwrap_err().code, ErrorCode::AnchorStringInvalidFormat);
        assert_eq!(AnchorString::parse("3.a.b").unwrap_err().code, ErrorCode::AnchorStringInvalidFormat);
    }
}
