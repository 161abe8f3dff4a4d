//! Error types for wire and pickle decoding.

use thiserror::Error;

/// Result alias used throughout the codec layer.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding binary structures.
///
/// Decoding is strict: every variant aborts the whole decode, there is no
/// partial result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Nothing to decode
    #[error("empty input")]
    EmptyInput,

    /// Input ended before a fixed-size field could be read
    #[error("buffer too short: need {needed} bytes, have {available}")]
    BufferTooShort {
        /// Bytes required by the field being read
        needed: usize,
        /// Bytes left in the input
        available: usize,
    },

    /// Destination buffer is smaller than the predicted encoded length
    #[error("value too short: need {needed} bytes, have {available}")]
    ValueTooShort {
        /// Bytes required to hold the encoding
        needed: usize,
        /// Bytes available in the destination
        available: usize,
    },

    /// Fixed-layout message has the wrong total length
    #[error("invalid message length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Length mandated by the layout
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Leading version byte does not match the layout being decoded
    #[error("unsupported version: expected {expected}, got {actual}")]
    UnsupportedVersion {
        /// Version this decoder understands
        expected: u8,
        /// Version found on the wire
        actual: u8,
    },

    /// Mandatory field absent from a tagged message body
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Varint ran past the end of the input or beyond 64 bits
    #[error("malformed varint")]
    MalformedVarint,

    /// Varint value does not fit the field it encodes
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field being decoded
        field: &'static str,
        /// Decoded value
        value: u64,
    },

    /// Tagged field uses a wire type this format never emits
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),

    /// Text is not valid base64
    #[error("invalid base64: {0}")]
    InvalidBase64(String),
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidBase64(err.to_string())
    }
}
