use std::path::PathBuf;

use thiserror::Error;

/// Invalid module identity data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("module {field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("module {field} contains reserved character '{ch}'")]
    ReservedCharacter { field: &'static str, ch: char },

    #[error("invalid capability token '{0}'")]
    InvalidCapability(String),

    #[error("invalid firmware version '{0}': expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error(
        "value capacity of {capacity} bytes cannot hold the {required}-byte descriptor record without capabilities"
    )]
    CapacityTooSmall { required: usize, capacity: usize },
}

/// The full descriptor record did not fit the transport value buffer.
///
/// Not fatal: the encoder drops trailing capabilities and reports what it dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "descriptor encoding of {encoded_len} bytes exceeds capacity of {capacity}; dropped {} capability token(s)",
    .dropped.len()
)]
pub struct EncodingOverflow {
    /// Length of the untruncated record.
    pub encoded_len: usize,
    pub capacity: usize,
    /// Dropped tokens, in declared order.
    pub dropped: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("invalid limit {name}: {reason}")]
    InvalidLimit { name: &'static str, reason: String },

    #[error("invalid firmware image name {0:?}")]
    InvalidNeed(String),

    #[error("characteristic declares {declared} bytes but channel enforces {enforced}")]
    CapacityMismatch { declared: usize, enforced: usize },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer link i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = DescriptorError> = std::result::Result<T, E>;
