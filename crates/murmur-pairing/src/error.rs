//! Engine error types
//!
//! Almost every operation in this engine is best-effort: lifecycle-triggered
//! work swallows failures internally after logging, and the next natural
//! cycle retries. The error type below exists for the few synchronous,
//! caller-invoked operations where the immediate caller is prepared to log
//! a transport failure itself.

use murmur_core::TransportError;

/// Failure of a caller-invoked pairing operation.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    /// The underlying server call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result alias for caller-invoked pairing operations.
pub type PairingResult<T> = Result<T, PairingError>;
