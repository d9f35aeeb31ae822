//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes themselves were wrong: the
//! connection that produced them is dropped, nobody else is affected.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, wrong
    /// types, or a truncated payload.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded fine but violates protocol rules, e.g. a
    /// session whose first frame is not `Hello`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
