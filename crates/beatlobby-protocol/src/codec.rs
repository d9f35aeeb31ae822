//! Payload encoding for lobby commands.
//!
//! The lobby encodes every outbound command exactly once and hands the
//! same bytes to every sink (player queues and the observer channel), so
//! encoding produces a cheaply clonable [`Bytes`] rather than a `Vec<u8>`.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Turns protocol messages into frame payloads and back.
///
/// `Send + Sync + 'static` because the codec lives in shared server state
/// and is used from the tick task and every per-session reader task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the payload is not a valid
    /// message of type `T`.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Outbound commands are textual by contract: the observer channel
/// forwards them verbatim as WebSocket text frames.
///
/// ## Example
///
/// ```rust
/// use beatlobby_protocol::{Codec, JsonCodec, ServerCommand};
///
/// let codec = JsonCodec;
/// let bytes = codec
///     .encode(&ServerCommand::SetLobbyCountdown { seconds: 42 })
///     .unwrap();
/// assert_eq!(&bytes[..], br#"{"type":"SetLobbyCountdown","seconds":42}"#);
///
/// let decoded: ServerCommand = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, ServerCommand::SetLobbyCountdown { seconds: 42 });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, ProtocolError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
