//! Codec trait and implementations for serializing reports and records.
//!
//! A codec converts between Rust values and raw bytes. Neither the consent
//! store nor the report dispatcher cares HOW data is serialized, only that
//! something implements [`Codec`].

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust values to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because codecs live inside long-lived stores and
/// background tasks that Tokio may run on any thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Player records are small and read by humans during moderation disputes,
/// so `pretty` output is available for files on disk; reports sent over the
/// wire use the compact form.
///
/// ## Example
///
/// ```rust
/// use pvpguard_protocol::{Codec, JsonCodec, PlayerStatus};
///
/// let codec = JsonCodec::compact();
/// let bytes = codec.encode(&PlayerStatus::Recording).unwrap();
/// assert_eq!(bytes, b"\"recording\"");
///
/// let decoded: PlayerStatus = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, PlayerStatus::Recording);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

#[cfg(feature = "json")]
impl JsonCodec {
    /// Single-line JSON.
    pub const fn compact() -> Self {
        Self { pretty: false }
    }

    /// Indented JSON, for files people may open by hand.
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }
}

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        if self.pretty {
            serde_json::to_vec_pretty(value).map_err(ProtocolError::Encode)
        } else {
            serde_json::to_vec(value).map_err(ProtocolError::Encode)
        }
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{PlayerId, PlayerStatus};

    #[test]
    fn test_pretty_output_is_multiline() {
        #[derive(serde::Serialize)]
        struct Doc {
            id: PlayerId,
            status: PlayerStatus,
        }
        let bytes = JsonCodec::pretty()
            .encode(&Doc { id: PlayerId(1), status: PlayerStatus::None })
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains('\n'));
        assert!(text.contains("\"status\": \"none\""));
    }

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<PlayerStatus, _> = JsonCodec::compact().decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_wrong_shape_returns_decode_error() {
        let result: Result<PlayerId, _> = JsonCodec::compact().decode(b"\"abc\"");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
