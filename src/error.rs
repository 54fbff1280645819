//! Error taxonomy shared by every component.
//!
//! Each distinct failure has its own [`ErrorCode`] so callers can tell
//! "malformed" from "over limit" from "wrong type". Codes group into the five
//! [`ErrorKind`]s that decide propagation: parse and validation failures reject
//! a single operation or file, transient fetch failures go through the
//! unresolvable-transaction retry path, configuration failures block startup.

use std::fmt;
use thiserror::Error;

/// Propagation class of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Validation,
    ReplayConflict,
    TransientFetch,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Encoding primitives
    EncodedStringIncorrectEncoding,
    MultihashUnsupportedHashAlgorithm,
    MultihashNotSupported,
    MultihashStringNotAMultihash,
    CompressorMaxAllowedDecompressDataSizeExceeded,
    CompressorDecompressionFailure,
    JwkEs256kInvalid,
    JwsCompactJwsNotString,
    JwsCompactJwsInvalid,
    JwsUnsupportedAlgorithm,
    JwsSignatureInvalid,

    // Operation model
    OperationRequestNotJson,
    OperationMissingOrUnknownType,
    OperationUnexpectedProperty,
    OperationMissingProperty,
    OperationDidSuffixInvalid,
    OperationSuffixDataInvalid,
    OperationDeltaMissing,
    OperationDeltaExceedsMaxSize,
    OperationDeltaHashMismatch,
    OperationSignedDataPayloadInvalid,
    OperationSignedDataDidSuffixMismatch,
    DeltaMissingOrInvalid,
    DeltaUnexpectedProperty,
    DeltaTooManyPatches,
    PatchMissingOrUnknownAction,
    PatchUnexpectedProperty,
    PatchPropertyInvalid,
    PatchIdInvalid,
    PatchApplicationFailed,

    // Batch files
    AnchorStringInvalidFormat,
    AnchorStringOperationCountInvalid,
    AnchorStringOperationCountExceedsLimit,
    AnchorFileExceededMaxSize,
    AnchorFileNotJson,
    AnchorFileUnexpectedProperty,
    AnchorFileMapFileHashMissing,
    AnchorFileMapFileHashInvalid,
    AnchorFileOperationsPropertyInvalid,
    AnchorFileOperationEntryInvalid,
    AnchorFileMultipleOperationsForTheSameDid,
    AnchorFileOperationCountMismatch,
    MapFileExceededMaxSize,
    MapFileNotJson,
    MapFileUnexpectedProperty,
    MapFileChunksPropertyInvalid,
    MapFileChunkFileHashInvalid,
    MapFileOperationsPropertyInvalid,
    MapFileOperationEntryInvalid,
    MapFileMultipleOperationsForTheSameDid,
    ChunkFileExceededMaxSize,
    ChunkFileNotJson,
    ChunkFileUnexpectedProperty,
    ChunkFileDeltasPropertyNotArray,
    ChunkFileDeltasNotArrayOfStrings,
    ChunkFileDeltaSizeExceedsLimit,
    ChunkFileDeltaCountMismatch,
    BatchEmpty,
    BatchOperationTooLargeForFile,

    // Replay
    CommitmentMismatch,
    DidAlreadyCreated,
    DidNotCreated,
    DidDeactivated,

    // Queue
    QueueDuplicatePendingOperation,

    // Collaborators
    CasFileNotFound,
    CasFileTooLarge,
    CasUnavailable,
    CasTimeout,
    LedgerUnavailable,
    LedgerTimeout,
    LedgerInvalidTransactionNumberOrTimeHash,
    StoreFailure,

    // Configuration
    VersionNotFoundForTime,
    VersionUnknownImplementation,
    VersionTableEmpty,
    ConfigInvalid,
}

impl ErrorCode {
    pub fn kind(&self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            EncodedStringIncorrectEncoding
            | MultihashStringNotAMultihash
            | CompressorDecompressionFailure
            | JwkEs256kInvalid
            | JwsCompactJwsNotString
            | JwsCompactJwsInvalid
            | OperationRequestNotJson
            | OperationMissingOrUnknownType
            | OperationMissingProperty
            | OperationSuffixDataInvalid
            | OperationSignedDataPayloadInvalid
            | DeltaMissingOrInvalid
            | PatchMissingOrUnknownAction
            | AnchorStringInvalidFormat
            | AnchorFileNotJson
            | AnchorFileMapFileHashMissing
            | AnchorFileOperationsPropertyInvalid
            | AnchorFileOperationEntryInvalid
            | MapFileNotJson
            | MapFileChunksPropertyInvalid
            | MapFileOperationsPropertyInvalid
            | MapFileOperationEntryInvalid
            | ChunkFileNotJson
            | ChunkFileDeltasPropertyNotArray
            | ChunkFileDeltasNotArrayOfStrings => ErrorKind::Parse,

            CommitmentMismatch | DidAlreadyCreated | DidNotCreated | DidDeactivated => {
                ErrorKind::ReplayConflict
            }

            CasFileNotFound | CasUnavailable | CasTimeout | LedgerUnavailable | LedgerTimeout
            | StoreFailure => ErrorKind::TransientFetch,

            VersionNotFoundForTime | VersionUnknownImplementation | VersionTableEmpty
            | ConfigInvalid => ErrorKind::Configuration,

            _ => ErrorKind::Validation,
        }
    }

    /// Stable snake_case identifier used in responses and logs.
    pub fn as_str(&self) -> String {
        let name = format!("{:?}", self);
        let mut out = String::with_capacity(name.len() + 8);
        for (i, c) in name.chars().enumerate() {
            if c.is_ascii_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}{}", .message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
pub struct SidetreeError {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl SidetreeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: Some(message.into()) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// True when the failure may clear up on its own and the work should be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientFetch
    }
}

impl From<ErrorCode> for SidetreeError {
    fn from(code: ErrorCode) -> Self {
        Self { code, message: None }
    }
}

pub type Result<T, E = SidetreeError> = std::result::Result<T, E>;
