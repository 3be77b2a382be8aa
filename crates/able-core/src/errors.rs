//! Error taxonomy shared by every role
//!
//! Every error is delivered to the continuation of the attempt it belongs to.
//! Nothing here is ever escalated past an attempt boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::ManagerState;

// ----------------------------------------------------------------------------
// Transport Error
// ----------------------------------------------------------------------------

/// Error payload passed through verbatim from a transport callback
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct TransportError {
    /// Transport-specific error code, when the transport reports one
    pub code: Option<i64>,
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors reported to operation continuations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbleError {
    /// Reported synchronously; the operation was never attempted
    #[error("Bluetooth not available (state: {0})")]
    BluetoothNotAvailable(ManagerState),

    #[error("Connection failed: {}", describe(.0))]
    ConnectionFailed(Option<TransportError>),

    /// Local attempt deadline elapsed; a corrective disconnect was issued
    #[error("Connection timeout reached")]
    ConnectionTimeoutReached,

    #[error("Timeout reached")]
    TimeoutReached,

    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Failed to add service: {0}")]
    AddServiceFailed(TransportError),

    #[error("Failed to start advertising: {0}")]
    StartAdvertisingFailed(TransportError),

    #[error("Attribute not found: {uuid}")]
    AttributeNotFound { uuid: Uuid },

    #[error("Known peripheral store error: {reason}")]
    Store { reason: String },

    #[error("No async runtime available to schedule timers")]
    RuntimeUnavailable,

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

fn describe(error: &Option<TransportError>) -> String {
    match error {
        Some(error) => error.to_string(),
        None => "no underlying error".to_string(),
    }
}

impl AbleError {
    pub fn store(reason: impl Into<String>) -> Self {
        AbleError::Store {
            reason: reason.into(),
        }
    }

    /// Whether the error was produced by a local deadline rather than the transport
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AbleError::TimeoutReached | AbleError::ConnectionTimeoutReached
        )
    }
}

impl From<TransportError> for AbleError {
    fn from(err: TransportError) -> Self {
        AbleError::Transport(err)
    }
}

impl From<std::io::Error> for AbleError {
    fn from(err: std::io::Error) -> Self {
        AbleError::store(err.to_string())
    }
}

impl From<serde_json::Error> for AbleError {
    fn from(err: serde_json::Error) -> Self {
        AbleError::store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AbleError>;
