//! Error types for the WhatsApp channel.

use thiserror::Error;

/// Channel error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid account configuration (e.g. template sync without
    /// a WABA id). Surfaced to the operator before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport failure or non-success response from the provider
    #[error("provider error: {0}")]
    Provider(String),

    /// Payload parsing error (top-level only; per-item failures are skipped)
    #[error("parse error: {0}")]
    Parse(String),

    /// Store error
    #[error(transparent)]
    Store(#[from] courier_store::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
