//! Frame encoding and decoding.
//!
//! The session never looks at raw bytes itself; it goes through a [`Codec`].
//! [`JsonCodec`] is the default and accepts JSON in both text and binary
//! messages.
//!
//! The encoding hint tells a codec which wire format a message used. Bots
//! that put protobuf frames in binary messages and JSON in text messages
//! need a codec that branches on it; under [`JsonCodec`] their binary
//! frames fail to decode and are counted as decode errors.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::{Encoding, Frame};

// ============================================================================
// Codec
// ============================================================================

/// Converts between wire payloads and [`Frame`]s.
pub trait Codec: Send + Sync + 'static {
    /// Decodes one inbound payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the bytes are not a valid frame.
    fn decode(&self, encoding: Encoding, bytes: &[u8]) -> Result<Frame>;

    /// Encodes one outbound frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be represented in `encoding`.
    fn encode(&self, frame: &Frame, encoding: Encoding) -> Result<Vec<u8>>;
}

// ============================================================================
// JsonCodec
// ============================================================================

/// JSON codec.
///
/// Binary messages are treated as UTF-8 JSON bytes; the encoding hint is
/// ignored on decode and encode. This is not compatible with peers that
/// send protobuf in binary messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, encoding: Encoding, bytes: &[u8]) -> Result<Frame> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::decode(format!("invalid {encoding:?} frame: {e}")))
    }

    fn encode(&self, frame: &Frame, _encoding: Encoding) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(frame)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
