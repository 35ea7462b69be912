//! Error types for the protocol layer.
//!
//! Each crate in accel defines its own error enum. A `ProtocolError`
//! always means a value failed to parse, encode or decode; it never
//! describes session lifecycle problems.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a backup record failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A backup record was malformed or truncated.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A hardware address string did not parse.
    #[error("invalid hardware address {0:?}")]
    InvalidHwAddr(String),

    /// A session identifier string did not parse.
    #[error("invalid session id {0:?}")]
    InvalidSessionId(String),
}
