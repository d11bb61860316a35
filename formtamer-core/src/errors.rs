//! errors.rs - Custom error types for the formtamer-core library.
//!
//! Errors never cross into the host page. Stages absorb `Unsupported` host
//! capabilities locally; the remaining variants surface only through the
//! policy-store and embedding APIs.
//!
//! License: MIT OR APACHE 2.0

use thiserror::Error;

/// All error types of the `formtamer-core` library.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FormTamerError {
    /// The host document or storage lacks a capability the engine wanted to use.
    #[error("Host capability '{0}' is not available in this environment")]
    Unsupported(&'static str),

    #[error("Node {0} is not attached to the document")]
    Detached(crate::host::NodeId),

    #[error("Policy store failure: {0}")]
    PolicyStore(String),

    #[error("Failed to compile postcode matcher for '{0}': {1}")]
    MatcherCompilationError(String, regex::Error),

    #[error("Failed to (de)serialize the policy record: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("An unexpected I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("A critical system error occurred: {0}")]
    AnyhowWrapper(#[from] anyhow::Error),
}

/// Result type returned by [`crate::host::Document`] capabilities.
pub type HostResult<T> = std::result::Result<T, FormTamerError>;
