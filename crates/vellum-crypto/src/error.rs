//! Error types for cryptographic operations

use thiserror::Error;
use vellum_proto::ProtocolError;

/// Errors from cipher, key and ratchet operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Authentication tag did not match (tampering or wrong key)
    #[error("bad message authentication code")]
    BadMac,

    /// Ed25519 signature did not verify
    #[error("bad signature")]
    BadSignature,

    /// Ciphertext is empty or not a whole number of cipher blocks
    #[error("invalid ciphertext length: {0}")]
    InvalidCiphertextLength(usize),

    /// Decrypted plaintext carried invalid padding
    #[error("invalid padding")]
    InvalidPadding,

    /// Key material had the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// Ratchet cannot move backwards to the requested index
    #[error("ratchet at index {current} cannot go back to {requested}")]
    RatchetBehind {
        /// Current ratchet index
        current: u32,
        /// Requested index
        requested: u32,
    },

    /// Underlying encoding error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl CryptoError {
    /// Returns true if this error means the input failed authentication.
    ///
    /// Integrity failures must never be retried with relaxed checks; the
    /// data is either forged or keyed differently.
    pub fn is_integrity_failure(&self) -> bool {
        match self {
            Self::BadMac | Self::BadSignature => true,

            Self::InvalidCiphertextLength(_)
            | Self::InvalidPadding
            | Self::InvalidKeyLength { .. }
            | Self::RatchetBehind { .. }
            | Self::Protocol(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_are_integrity_failures() {
        assert!(CryptoError::BadMac.is_integrity_failure());
        assert!(CryptoError::BadSignature.is_integrity_failure());
    }

    #[test]
    fn structural_errors_are_not_integrity_failures() {
        assert!(!CryptoError::InvalidPadding.is_integrity_failure());
        assert!(!CryptoError::RatchetBehind { current: 5, requested: 2 }.is_integrity_failure());
        assert!(!CryptoError::Protocol(ProtocolError::EmptyInput).is_integrity_failure());
    }

    #[test]
    fn error_display() {
        let err = CryptoError::RatchetBehind { current: 10, requested: 3 };
        assert_eq!(err.to_string(), "ratchet at index 10 cannot go back to 3");
    }
}
