//! Upper bound on the time any ledger or CAS call may take.

use std::future::Future;
use std::time::Duration;

use crate::error::{ErrorCode, Result, SidetreeError};

/// Awaits `call`, failing with `code` once `limit` has passed.
pub async fn within<T>(limit: Duration, code: ErrorCode, call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SidetreeError::new(code, format!("no answer within {:?}", limit))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_call_fails_with_given_code() {
        let err = within(Duration::from_millis(10), ErrorCode::LedgerTimeout, futures::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LedgerTimeout);
        assert!(err.is_retryable());

        let value = within(Duration::from_secs(1), ErrorCode::CasTimeout, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
