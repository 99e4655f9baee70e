//! Error taxonomy for the linear-hashing store.
//!
//! A flat, `thiserror`-derived error enum narrowed to the failure modes
//! this store actually produces: I/O from the segment/address layer, codec
//! errors on malformed bucket records, configuration errors, and close
//! errors.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// A bucket's packed record failed to decode (length mismatch, truncated
    /// entry). The controller recovers from this instead of propagating it
    /// to callers of `get`/`put`/`delete` — see DESIGN.md.
    #[error("codec error: {message}")]
    Codec { message: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Raised when both the data array and address array fail to close;
    /// carries both messages so neither failure is silently dropped.
    #[error("close failed: {first}{}", second.as_ref().map(|s| format!("; also: {s}")).unwrap_or_default())]
    Close { first: String, second: Option<String> },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    pub fn codec(message: impl Into<String>) -> Self {
        StoreError::Codec { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal { message: message.into() }
    }

    /// Whether this error reflects on-disk corruption rather than a
    /// transient or programmer error.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Codec { .. })
    }
}
