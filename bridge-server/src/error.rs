//! Bridge-level error type
//!
//! Errors here always terminate at a boundary - a WebSocket error reply or
//! a job status patch - never the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The on-disk config file could not be written
    #[error("config write error: {0}")]
    ConfigWrite(String),

    /// A transport failed to deliver the payload
    #[error(transparent)]
    Print(#[from] bridge_printer::PrintError),

    /// Caller-supplied input was unusable
    #[error("{0}")]
    Invalid(String),
}

impl BridgeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        BridgeError::Invalid(message.into())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
