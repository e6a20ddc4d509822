//! Core error helpers
//!
//! Re-exports sqlagent-error and maps provider failures onto it.

pub use sqlagent_error::{Error, ErrorKind, ErrorStatus, Result};

use crate::provider::ProviderError;

/// Convert a provider failure into the unified error, keeping its category.
pub fn provider_failed(err: ProviderError) -> Error {
    let message = err.to_string();
    let mapped = match err {
        ProviderError::Network(_) => Error::network_failed(message),
        ProviderError::RateLimited { retry_after } => {
            let err = Error::new(ErrorKind::RateLimited, message);
            match retry_after {
                Some(secs) => err.with_context("retry_after", secs.to_string()),
                None => err,
            }
        }
        ProviderError::AuthenticationFailed => {
            Error::new(ErrorKind::ProviderUnavailable, message).persist()
        }
        ProviderError::Api { status, .. } => {
            let err = Error::inference_failed(message).with_context("status", status.to_string());
            if status >= 500 {
                err
            } else {
                err.with_status(ErrorStatus::Permanent)
            }
        }
        ProviderError::Parse(_) => Error::new(ErrorKind::SerializationFailed, message),
        ProviderError::InvalidRequest(_) => Error::invalid_argument(message),
        ProviderError::Other(_) => Error::inference_failed(message),
    };
    mapped.with_operation("provider::complete")
}

/// Wrap a rusqlite failure for the statement that caused it.
pub fn sqlite_failed(query: &str, err: rusqlite::Error) -> Error {
    Error::query_failed(query, err.to_string()).set_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        let err = provider_failed(ProviderError::RateLimited { retry_after: Some(3) });
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.is_retryable());
        assert_eq!(err.operation(), "provider::complete");

        let err = provider_failed(ProviderError::Api { status: 400, message: "bad tool".into() });
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert!(!err.is_retryable());

        let err = provider_failed(ProviderError::AuthenticationFailed);
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }
}
