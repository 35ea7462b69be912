//! Codec trait and implementations for persisting session backups.
//!
//! Sessions survive a daemon restart by being written out as backup
//! records and read back on startup. The session layer doesn't care HOW
//! those records are serialized; it only needs something implementing
//! [`Codec`].
//!
//! Currently we provide [`JsonCodec`], which keeps backup files readable
//! with ordinary tools when a restore goes wrong.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the concentrator keeps one codec for
/// its whole lifetime and may use it from any runtime thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// truncated, or describe a different record shape.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use accel_protocol::{Codec, Counters, JsonCodec};
///
/// let codec = JsonCodec;
/// let counters = Counters { rx_bytes: 1500, tx_bytes: 300, rx_packets: 3, tx_packets: 2 };
///
/// let bytes = codec.encode(&counters).unwrap();
/// let decoded: Counters = codec.decode(&bytes).unwrap();
/// assert_eq!(counters, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{HwAddr, TerminateCause};

    #[test]
    fn test_json_decode_truncated_returns_decode_error() {
        let bytes = JsonCodec.encode(&HwAddr([1, 2, 3, 4, 5, 6])).unwrap();
        let result: Result<HwAddr, _> = JsonCodec.decode(&bytes[..bytes.len() - 2]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_cause_is_stored_by_name() {
        let bytes = JsonCodec.encode(&TerminateCause::IdleTimeout).unwrap();
        assert_eq!(bytes, b"\"IdleTimeout\"");
    }
}
