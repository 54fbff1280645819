//! Entry points for client operation and resolution requests.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::document;
use crate::error::{ErrorCode, SidetreeError};
use crate::ledger::Ledger;
use crate::models::{AnchoredOperation, OperationType};
use crate::operation::ParseMode;
use crate::queue::OperationQueue;
use crate::resolver::{Resolution, Resolver};
use crate::util::{deadline, encoder};
use crate::version_manager::VersionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Succeeded,
    BadRequest,
    NotFound,
    Deactivated,
    ServerError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    fn new(status: ResponseStatus, body: Option<Value>) -> Self {
        Self { status, body }
    }

    fn error(status: ResponseStatus, error: &SidetreeError) -> Self {
        Self::new(status, Some(json!({ "code": error.code.as_str(), "message": error.message })))
    }
}

pub struct RequestHandler {
    versions: Arc<VersionManager>,
    ledger: Arc<dyn Ledger>,
    queue: Arc<OperationQueue>,
    resolver: Arc<Resolver>,
    did_method_name: String,
    ledger_timeout: Duration,
}

impl RequestHandler {
    pub fn new(
        versions: Arc<VersionManager>,
        ledger: Arc<dyn Ledger>,
        queue: Arc<OperationQueue>,
        resolver: Arc<Resolver>,
        did_method_name: String,
        ledger_timeout: Duration,
    ) -> Self {
        Self { versions, ledger, queue, resolver, did_method_name, ledger_timeout }
    }

    /// Validates and queues an operation. A create answers with the document
    /// the DID will have once anchored.
    pub async fn handle_operation_request(&self, request: &[u8]) -> Response {
        // 1. Pick the protocol version for the current ledger time.
        let time =
            deadline::within(self.ledger_timeout, ErrorCode::LedgerTimeout, self.ledger.approximate_time()).await;
        let components = match time.and_then(|t| self.versions.components_for(t)) {
            Ok(components) => components,
            Err(e) => {
                warn!(error = %e, "cannot select protocol version");
                return Response::error(ResponseStatus::ServerError, &e);
            }
        };

        // 2. Parse strictly.
        let operation = match components.parse_operation(request, ParseMode::Request) {
            Ok(operation) => operation,
            Err(e) => return Response::error(ResponseStatus::BadRequest, &e),
        };
        let did_suffix = operation.did_suffix().to_string();
        let operation_type = operation.operation_type();

        // 3. Queue, one pending operation per DID.
        if let Err(e) = self.queue.enqueue(&did_suffix, operation_type, request.to_vec()).await {
            return Response::error(ResponseStatus::BadRequest, &e);
        }
        info!(did_suffix = %did_suffix, operation_type = %operation_type, "operation queued");

        if operation_type != OperationType::Create {
            return Response::new(ResponseStatus::Succeeded, None);
        }

        // 4. Preview the created document.
        let preview = AnchoredOperation {
            operation_type,
            did_suffix: did_suffix.clone(),
            operation_buffer: request.to_vec(),
            transaction_number: 0,
            transaction_time: components.start_time,
            operation_index: 0,
        };
        match components.operation_processor.apply(&preview, None) {
            Ok(state) => Response::new(ResponseStatus::Succeeded, Some(document::to_external(&self.did(&did_suffix), &state))),
            Err(e) => Response::error(ResponseStatus::ServerError, &e),
        }
    }

    /// Resolves `did:<method>:<suffix>`.
    pub async fn handle_resolve_request(&self, did: &str) -> Response {
        let did_suffix = match self.parse_did(did) {
            Ok(suffix) => suffix,
            Err(e) => return Response::error(ResponseStatus::BadRequest, &e),
        };

        match self.resolver.resolve(did_suffix).await {
            Ok(Resolution::Resolved(state)) => {
                Response::new(ResponseStatus::Succeeded, Some(document::to_external(did, &state)))
            }
            Ok(Resolution::Deactivated(state)) => {
                Response::new(ResponseStatus::Deactivated, Some(document::to_external(did, &state)))
            }
            Ok(Resolution::NotFound) => Response::new(ResponseStatus::NotFound, Some(json!({ "code": "did_not_found" }))),
            Ok(Resolution::NoValidHistory) => {
                Response::new(ResponseStatus::NotFound, Some(json!({ "code": "did_has_no_valid_history" })))
            }
            Err(e) => {
                warn!(did, error = %e, "resolution failed");
                Response::error(ResponseStatus::ServerError, &e)
            }
        }
    }

    fn did(&self, did_suffix: &str) -> String {
        format!("did:{}:{}", self.did_method_name, did_suffix)
    }

    fn parse_did<'a>(&self, did: &'a str) -> Result<&'a str, SidetreeError> {
        let suffix = did
            .strip_prefix("did:")
            .and_then(|rest| rest.strip_prefix(self.did_method_name.as_str()))
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| {
                SidetreeError::new(
                    ErrorCode::OperationDidSuffixInvalid,
                    format!("'{}' is not a did:{} identifier", did, self.did_method_name),
                )
            })?;
        if suffix.is_empty() || !encoder::is_base64url(suffix) {
            return Err(SidetreeError::new(ErrorCode::OperationDidSuffixInvalid, format!("'{}' is not a suffix", suffix)));
        }
        Ok(suffix)
    }
}
