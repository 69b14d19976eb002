//! Error types for the fan-out pipeline and its collaborators

use serde::Serialize;
use thiserror::Error;

/// Why an upgrade request was refused by the connection gate.
///
/// Only the HTTP status derived from [`AdmissionError::status_code`] is ever
/// shown to the connecting client.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// The request carries no session proof, or the proof does not verify.
    #[error("no valid session credential")]
    NoCredential,

    /// The credential names a principal that no longer exists.
    #[error("credential resolves to no known principal")]
    UnknownPrincipal,

    /// The principal lacks the `orders.read` capability.
    #[error("principal lacks the read-stream capability")]
    InsufficientCapability,
}

impl AdmissionError {
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionError::NoCredential | AdmissionError::UnknownPrincipal => 401,
            AdmissionError::InsufficientCapability => 403,
        }
    }
}

/// Per-subscriber send failure, always recovered inside the broadcaster.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The transport is gone; the subscriber must be pruned.
    #[error("subscriber transport closed")]
    Closed,

    /// The outbound buffer is full; the frame is dropped for this subscriber.
    #[error("subscriber outbound buffer full")]
    Full,
}

/// The change notification channel lost its consumer or producer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("change notification channel dropped: {0}")]
pub struct SourceGapError(pub String);

/// Failures while a client session is connecting or connected.
///
/// Every variant is recovered by the session's backoff loop.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The network connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The server refused the upgrade with this HTTP status.
    #[error("upgrade rejected with status {0}")]
    Rejected(u16),

    /// The transport broke while connected.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors from the order and user stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from credential issue and verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("token error: {0}")]
    Token(String),

    #[error("hash error: {0}")]
    Hash(String),

    #[error("invalid secret: {0}")]
    InvalidSecret(String),
}

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures while assembling or running the server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_status_codes() {
        assert_eq!(AdmissionError::NoCredential.status_code(), 401);
        assert_eq!(AdmissionError::UnknownPrincipal.status_code(), 401);
        assert_eq!(AdmissionError::InsufficientCapability.status_code(), 403);
    }

    #[test]
    fn test_validation_message_counts_fields() {
        let err = StoreError::Validation(vec![
            FieldError::new("amount", "must be a number"),
            FieldError::new("customerEmail", "must be an email address"),
        ]);
        assert_eq!(err.to_string(), "validation failed on 2 field(s)");
    }
}
