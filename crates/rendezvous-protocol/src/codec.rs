//! Codec for encoding and decoding Rendezvous envelopes.
//!
//! Envelopes travel as JSON text. Decoding is split in two steps, JSON into
//! [`RawEnvelope`] and then into the typed [`Envelope`], so callers can tell
//! a broken frame from an unknown kind or a missing field.

use thiserror::Error;

use crate::envelope::{Envelope, RawEnvelope};
use crate::kind::MessageKind;

/// Default maximum encoded envelope size (64 KiB).
pub const MAX_ENVELOPE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope exceeds the size limit.
    #[error("Envelope size {size} exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Not valid JSON, or not the envelope shape.
    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The `type` field names no known kind.
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    /// A field required by the kind is absent.
    #[error("Missing field '{field}' in {kind} message")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },

    /// A field has the wrong shape.
    #[error("Invalid field '{field}' in {kind} message: {reason}")]
    InvalidField {
        kind: MessageKind,
        field: &'static str,
        reason: String,
    },
}

/// Encode an envelope to JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    let raw = RawEnvelope::from(envelope.clone());
    Ok(serde_json::to_string(&raw)?)
}

/// Decode an envelope from JSON bytes using the default size limit.
///
/// # Errors
///
/// Returns an error if the data is too large, not JSON, or not a valid envelope.
pub fn decode(data: &[u8]) -> Result<Envelope, ProtocolError> {
    decode_with_limit(data, MAX_ENVELOPE_SIZE)
}

/// Decode an envelope from JSON bytes, rejecting anything over `max_size`.
///
/// # Errors
///
/// Returns an error if the data is too large, not JSON, or not a valid envelope.
pub fn decode_with_limit(data: &[u8], max_size: usize) -> Result<Envelope, ProtocolError> {
    if data.len() > max_size {
        return Err(ProtocolError::TooLarge {
            size: data.len(),
            max: max_size,
        });
    }

    let raw: RawEnvelope = serde_json::from_slice(data)?;
    Envelope::try_from(raw)
}

/// Codec holding a per-connection size limit.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    max_size: usize,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(MAX_ENVELOPE_SIZE)
    }
}

impl EnvelopeCodec {
    /// Create a codec with the given size limit.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Get the size limit.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Encode an envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self, envelope: &Envelope) -> Result<String, ProtocolError> {
        encode(envelope)
    }

    /// Decode an envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        decode_with_limit(data, self.max_size)
    }
}
