use std::time::Duration;

use thiserror::Error;

/// Failures talking to the remote robot service.
#[derive(Debug, Error)]
pub enum RobotError {
    #[error("{0} must be provided")]
    MissingInput(&'static str),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {0:?} connecting to robot")]
    DialTimeout(Duration),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("remote error ({code}): {message}")]
    Remote { code: String, message: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("robot session closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failures of a single relay operation. All of them map to a 500 response.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid pin state: {0:?}")]
    InvalidPinState(String),
    #[error("pin {pin} call timed out after {timeout:?}")]
    Timeout { pin: String, timeout: Duration },
    #[error(transparent)]
    Robot(#[from] RobotError),
}
