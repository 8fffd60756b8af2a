//! Error types for the protocol layer.
//!
//! Each pvpguard crate defines its own error enum. A `ProtocolError` always
//! means the problem is in (de)serialization or in a malformed value, never
//! in locking, persistence I/O, or delivery.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: a truncated record file, a missing required field,
    /// or a hand-edited document with the wrong types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A value parsed fine but is not one we accept, e.g. an unknown
    /// status name.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}
