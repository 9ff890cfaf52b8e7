//! Error type shared by all indexes.

use thiserror::Error;

/// Errors returned by index operations.
///
/// A missing key is not an error: lookups return `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The key is already present in an index that rejects duplicates.
    #[error("duplicate key")]
    DuplicateKey,
    /// An extendible-hash insert could not separate the keys of a full bucket
    /// without growing the directory past its configured limit.
    #[error("directory exhausted: more than {slots} keys share the low {max_global_depth} hash bits")]
    DirectoryExhausted {
        /// The configured maximum global depth.
        max_global_depth: u32,
        /// Bucket capacity.
        slots: usize,
    },
    /// Rejected construction parameters.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        IndexError::InvalidConfig(msg.into())
    }
}
