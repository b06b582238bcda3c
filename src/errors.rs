//! Error types for dynomodel.
//!
//! Compilation and construction failures are returned synchronously, before any
//! request reaches the backend. Transport failures only surface through the
//! result of an executed operation.
//!
//! SDK errors are mapped with typed `SdkError` variant matching, no string
//! parsing of debug output.

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the mapper.
///
/// `Clone` so a failed readiness outcome can be replayed to every caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Missing required argument, bad operand arity, or a value the field type rejects.
    #[error("validation error: {0}")]
    Validation(String),

    /// A field spec could not be resolved, or the key layout is invalid.
    #[error("schema error: {0}")]
    Schema(String),

    /// A field referenced by an expression does not exist in the schema.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// An operator keyword is not supported.
    #[error("operator \"{0}\" is not supported")]
    UnsupportedOperator(String),

    /// The cursor cannot satisfy the request in its current state.
    #[error("{0}")]
    State(String),

    /// The backend failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The caller abandoned the wait, or the registry was shut down.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// True when the backend reported a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Transport(t) if t.is_not_found())
    }
}

/// Opaque backend failure.
///
/// The only distinction the mapper relies on is "not found" versus everything else.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

// ========== TYPED ERROR MAPPING ==========

/// Map non-service `SdkError` variants (dispatch failures, timeouts, etc.).
///
/// Returns `None` for `ServiceError`.
fn map_outer_sdk_error<E, R>(err: &SdkError<E, R>) -> Option<TransportError>
where
    E: std::fmt::Debug,
    R: std::fmt::Debug,
{
    match err {
        SdkError::DispatchFailure(dispatch) => {
            if dispatch.is_timeout() {
                Some(TransportError::Connection(
                    "connection timed out to DynamoDB".to_string(),
                ))
            } else if dispatch.is_io() {
                Some(TransportError::Connection(
                    "connection failed to DynamoDB (I/O error)".to_string(),
                ))
            } else {
                Some(TransportError::Connection(
                    "connection failed to DynamoDB".to_string(),
                ))
            }
        }
        SdkError::TimeoutError(_) => Some(TransportError::Connection(
            "connection timed out to DynamoDB".to_string(),
        )),
        SdkError::ConstructionFailure(err) => Some(TransportError::Other(format!(
            "failed to build request: {:?}",
            err
        ))),
        SdkError::ResponseError(err) => Some(TransportError::Other(format!(
            "invalid response from DynamoDB: {:?}",
            err
        ))),
        SdkError::ServiceError(_) => None,
        _ => Some(TransportError::Other(format!(
            "unknown error from DynamoDB: {:?}",
            err
        ))),
    }
}

/// Map a DynamoDB service error code + message.
fn map_dynamodb_code(
    code: Option<&str>,
    message: Option<&str>,
    display: &str,
    table: Option<&str>,
) -> TransportError {
    match code {
        Some("ResourceNotFoundException") => {
            let msg = match table {
                Some(t) => format!("table '{}' not found", t),
                None => message.unwrap_or(display).to_string(),
            };
            TransportError::NotFound(msg)
        }
        Some(code) => TransportError::Service {
            code: code.to_string(),
            message: message.unwrap_or(display).to_string(),
        },
        None => TransportError::Other(message.unwrap_or(display).to_string()),
    }
}

/// Map DynamoDB SDK errors using typed `SdkError` variants.
///
/// For `ServiceError`, uses `ProvideErrorMetadata` to get the error code and message.
pub fn map_sdk_error<E, R>(err: SdkError<E, R>, table: Option<&str>) -> TransportError
where
    E: ProvideErrorMetadata + std::fmt::Debug + std::fmt::Display,
    R: std::fmt::Debug,
{
    if let Some(mapped) = map_outer_sdk_error(&err) {
        return mapped;
    }

    if let Some(service_err) = err.as_service_error() {
        let meta = ProvideErrorMetadata::meta(service_err);
        let display = service_err.to_string();
        return map_dynamodb_code(meta.code(), meta.message(), &display, table);
    }

    TransportError::Other(format!("unexpected DynamoDB error: {:?}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_resource_not_found_to_not_found() {
        let err = map_dynamodb_code(
            Some("ResourceNotFoundException"),
            Some("Requested resource not found"),
            "ResourceNotFoundException",
            Some("users"),
        );
        assert_eq!(err, TransportError::NotFound("table 'users' not found".into()));
        assert!(Error::from(err).is_not_found());
    }

    #[test]
    fn test_should_keep_code_for_other_service_errors() {
        let err = map_dynamodb_code(
            Some("ValidationException"),
            None,
            "One or more parameter values were invalid",
            None,
        );
        assert_eq!(
            err,
            TransportError::Service {
                code: "ValidationException".into(),
                message: "One or more parameter values were invalid".into(),
            }
        );
        assert!(!err.is_not_found());
    }
}
