//! Error types for value parsing in lifelog-types.

use thiserror::Error;

/// Errors that can occur when parsing settings values received from the
/// configuration UI or read back from storage.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The signing algorithm name is not one of the supported SHA variants.
    #[error("Unknown signing algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The key format is not `TEXT`, `HEX` or `B64`.
    #[error("Unknown key format: {0}")]
    UnknownKeyFormat(String),

    /// The signature output format is not `HEX` or `B64`.
    #[error("Unknown output format: {0}")]
    UnknownOutputFormat(String),
}
