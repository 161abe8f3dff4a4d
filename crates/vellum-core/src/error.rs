//! Error types for session and account operations.
//!
//! Lower layers report precise causes ([`ProtocolError`] for framing,
//! [`CryptoError`] for primitives). At this layer they collapse into the
//! small set of kinds callers actually branch on, see [`ErrorKind`].
//!
//! Operation context is attached with [`OlmError::context`], which wraps the
//! error without changing its kind.

use thiserror::Error;
use vellum_crypto::CryptoError;
use vellum_proto::ProtocolError;

/// Result alias for session and account operations
pub type Result<T> = std::result::Result<T, OlmError>;

/// What went wrong, independent of where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input was empty
    EmptyInput,
    /// Pickle key missing, or the account holds no signing key
    NoKeyProvided,
    /// MAC check failed on a pickle or message
    BadMac,
    /// Ed25519 signature did not verify
    BadSignature,
    /// Missing or invalid required field
    MalformedMessage,
    /// Message version byte is not the one this session speaks
    WrongProtocolVersion,
    /// Pickle carries a version this build cannot read
    BadPickleVersion,
    /// Requested index precedes the earliest known key
    RatchetNotAvailable,
    /// Destination buffer smaller than the predicted length
    ValueTooShort,
}

impl ErrorKind {
    /// Returns true if the input failed authentication.
    ///
    /// The data is forged or keyed differently; it must not be retried or
    /// partially trusted.
    pub fn is_integrity_failure(self) -> bool {
        matches!(self, Self::BadMac | Self::BadSignature)
    }
}

/// Errors from session and account operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OlmError {
    /// Input was empty
    #[error("empty input")]
    EmptyInput,

    /// No pickle key or no signing key
    #[error("no key provided")]
    NoKeyProvided,

    /// Authentication code mismatch
    #[error("bad message authentication code")]
    BadMac,

    /// Signature did not verify
    #[error("bad signature")]
    BadSignature,

    /// Structurally invalid message or pickle
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Unsupported message version
    #[error("wrong protocol version: expected {expected}, got {actual}")]
    WrongProtocolVersion {
        /// Version this session speaks
        expected: u8,
        /// Version on the wire
        actual: u8,
    },

    /// Unsupported pickle version
    #[error("bad pickle version: {0}")]
    BadPickleVersion(u32),

    /// Index is before the session's first known index
    #[error("ratchet not available for index {requested}, first known index is {first_known}")]
    RatchetNotAvailable {
        /// Message index that was asked for
        requested: u32,
        /// Earliest index the session can decrypt
        first_known: u32,
    },

    /// Destination buffer too small
    #[error("value too short: need {needed} bytes, have {available}")]
    ValueTooShort {
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Error annotated with the operation that produced it
    #[error("{operation}: {source}")]
    Context {
        /// Failing operation
        operation: &'static str,
        /// Underlying error
        #[source]
        source: Box<OlmError>,
    },
}

impl OlmError {
    /// Kind of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::NoKeyProvided => ErrorKind::NoKeyProvided,
            Self::BadMac => ErrorKind::BadMac,
            Self::BadSignature => ErrorKind::BadSignature,
            Self::MalformedMessage(_) => ErrorKind::MalformedMessage,
            Self::WrongProtocolVersion { .. } => ErrorKind::WrongProtocolVersion,
            Self::BadPickleVersion(_) => ErrorKind::BadPickleVersion,
            Self::RatchetNotAvailable { .. } => ErrorKind::RatchetNotAvailable,
            Self::ValueTooShort { .. } => ErrorKind::ValueTooShort,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Wrap with the name of the failing operation.
    #[must_use]
    pub fn context(self, operation: &'static str) -> Self {
        Self::Context { operation, source: Box::new(self) }
    }
}

impl From<ProtocolError> for OlmError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::EmptyInput => Self::EmptyInput,
            ProtocolError::ValueTooShort { needed, available } => Self::ValueTooShort { needed, available },
            ProtocolError::UnsupportedVersion { expected, actual } => {
                Self::WrongProtocolVersion { expected, actual }
            },
            ProtocolError::BufferTooShort { .. }
            | ProtocolError::InvalidLength { .. }
            | ProtocolError::MissingField(_)
            | ProtocolError::MalformedVarint
            | ProtocolError::OutOfRange { .. }
            | ProtocolError::UnsupportedWireType(_)
            | ProtocolError::InvalidBase64(_) => Self::MalformedMessage(err.to_string()),
        }
    }
}

impl From<CryptoError> for OlmError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::BadMac => Self::BadMac,
            CryptoError::BadSignature => Self::BadSignature,
            CryptoError::RatchetBehind { current, requested } => {
                Self::RatchetNotAvailable { requested, first_known: current }
            },
            CryptoError::Protocol(inner) => inner.into(),
            CryptoError::InvalidCiphertextLength(_)
            | CryptoError::InvalidPadding
            | CryptoError::InvalidKeyLength { .. } => Self::MalformedMessage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for OlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_preserves_kind() {
        let err = OlmError::BadMac.context("unpickle").context("from_pickle");
        assert_eq!(err.kind(), ErrorKind::BadMac);
        assert_eq!(err.to_string(), "from_pickle: unpickle: bad message authentication code");
    }

    #[test]
    fn integrity_failures() {
        assert!(ErrorKind::BadMac.is_integrity_failure());
        assert!(ErrorKind::BadSignature.is_integrity_failure());
        assert!(!ErrorKind::RatchetNotAvailable.is_integrity_failure());
        assert!(!ErrorKind::MalformedMessage.is_integrity_failure());
    }

    #[test]
    fn protocol_errors_map_to_kinds() {
        assert_eq!(OlmError::from(ProtocolError::EmptyInput).kind(), ErrorKind::EmptyInput);
        assert_eq!(
            OlmError::from(ProtocolError::UnsupportedVersion { expected: 3, actual: 4 }).kind(),
            ErrorKind::WrongProtocolVersion
        );
        assert_eq!(OlmError::from(ProtocolError::MissingField("ciphertext")).kind(), ErrorKind::MalformedMessage);
        assert_eq!(
            OlmError::from(ProtocolError::ValueTooShort { needed: 8, available: 4 }).kind(),
            ErrorKind::ValueTooShort
        );
    }

    #[test]
    fn crypto_errors_map_to_kinds() {
        assert_eq!(OlmError::from(CryptoError::BadMac).kind(), ErrorKind::BadMac);
        assert_eq!(OlmError::from(CryptoError::BadSignature).kind(), ErrorKind::BadSignature);
        assert_eq!(OlmError::from(CryptoError::InvalidPadding).kind(), ErrorKind::MalformedMessage);
        assert_eq!(
            OlmError::from(CryptoError::Protocol(ProtocolError::EmptyInput)).kind(),
            ErrorKind::EmptyInput
        );
    }
}
