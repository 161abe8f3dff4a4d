//! Session-sharing and session-export messages with zero-copy parsing.
//!
//! Both are fixed-layout records (big-endian counter) that bootstrap an
//! inbound group session:
//!
//! ```text
//! sharing: version(0x02) | counter(4) | ratchet(128) | ed25519 key(32) | signature(64)
//! export:  version(0x01) | counter(4) | ratchet(128) | ed25519 key(32)
//! ```
//!
//! # Security
//!
//! The `#[repr(C, packed)]` layouts with zerocopy traits let these records be
//! cast straight from untrusted bytes; every byte pattern is a valid value.
//! Parsing checks length and version only. The sharing signature is verified
//! by the crypto layer against [`SessionSharingMessage::signing_data`] before
//! any field is trusted.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
use zeroize::Zeroize;

use super::{PUBLIC_KEY_LENGTH, RATCHET_LENGTH, SIGNATURE_LENGTH};
use crate::errors::{ProtocolError, Result};

/// Signed snapshot of a sender's ratchet, used to start an inbound session.
#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SessionSharingMessage {
    version: u8,
    counter: [u8; 4],
    ratchet: [u8; RATCHET_LENGTH],
    public_key: [u8; PUBLIC_KEY_LENGTH],
    signature: [u8; SIGNATURE_LENGTH],
}

impl SessionSharingMessage {
    /// Size of the encoded message (229 bytes)
    pub const SIZE: usize = 1 + 4 + RATCHET_LENGTH + PUBLIC_KEY_LENGTH + SIGNATURE_LENGTH;

    /// Layout version
    pub const VERSION: u8 = 0x02;

    /// Build an unsigned message; call [`Self::set_signature`] before sending.
    pub fn new(counter: u32, ratchet: &[u8; RATCHET_LENGTH], public_key: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self {
            version: Self::VERSION,
            counter: counter.to_be_bytes(),
            ratchet: *ratchet,
            public_key,
            signature: [0u8; SIGNATURE_LENGTH],
        }
    }

    /// Parse a message from raw bytes (zero-copy).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidLength` unless exactly [`Self::SIZE`] bytes
    /// - `ProtocolError::UnsupportedVersion` if the version byte is not 0x02
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let message = Self::ref_from_bytes(bytes).map_err(|_| ProtocolError::InvalidLength {
            expected: Self::SIZE,
            actual: bytes.len(),
        })?;

        if message.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                expected: Self::VERSION,
                actual: message.version,
            });
        }

        Ok(message)
    }

    /// Encoded message bytes.
    pub fn as_bytes(&self) -> &[u8] {
        IntoBytes::as_bytes(self)
    }

    /// Ratchet index the snapshot was taken at.
    pub fn counter(&self) -> u32 {
        u32::from_be_bytes(self.counter)
    }

    /// The four concatenated ratchet parts.
    pub fn ratchet(&self) -> &[u8; RATCHET_LENGTH] {
        &self.ratchet
    }

    /// Sender's Ed25519 signing key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.public_key
    }

    /// Ed25519 signature over [`Self::signing_data`].
    pub fn signature(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.signature
    }

    /// Bytes covered by the signature (everything before it).
    pub fn signing_data(&self) -> &[u8] {
        &self.as_bytes()[..Self::SIZE - SIGNATURE_LENGTH]
    }

    /// Attach the signature computed over [`Self::signing_data`].
    pub fn set_signature(&mut self, signature: [u8; SIGNATURE_LENGTH]) {
        self.signature = signature;
    }
}

impl Drop for SessionSharingMessage {
    fn drop(&mut self) {
        self.ratchet.zeroize();
    }
}

impl std::fmt::Debug for SessionSharingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSharingMessage")
            .field("version", &self.version)
            .field("counter", &self.counter())
            .finish_non_exhaustive()
    }
}

/// Unsigned ratchet snapshot for backup or transfer between devices.
#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SessionExportMessage {
    version: u8,
    counter: [u8; 4],
    ratchet: [u8; RATCHET_LENGTH],
    public_key: [u8; PUBLIC_KEY_LENGTH],
}

impl SessionExportMessage {
    /// Size of the encoded message (165 bytes)
    pub const SIZE: usize = 1 + 4 + RATCHET_LENGTH + PUBLIC_KEY_LENGTH;

    /// Layout version
    pub const VERSION: u8 = 0x01;

    /// Build an export of the given ratchet state.
    pub fn new(counter: u32, ratchet: &[u8; RATCHET_LENGTH], public_key: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { version: Self::VERSION, counter: counter.to_be_bytes(), ratchet: *ratchet, public_key }
    }

    /// Parse a message from raw bytes (zero-copy).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidLength` unless exactly [`Self::SIZE`] bytes
    /// - `ProtocolError::UnsupportedVersion` if the version byte is not 0x01
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let message = Self::ref_from_bytes(bytes).map_err(|_| ProtocolError::InvalidLength {
            expected: Self::SIZE,
            actual: bytes.len(),
        })?;

        if message.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                expected: Self::VERSION,
                actual: message.version,
            });
        }

        Ok(message)
    }

    /// Encoded message bytes.
    pub fn as_bytes(&self) -> &[u8] {
        IntoBytes::as_bytes(self)
    }

    /// Ratchet index the snapshot was taken at.
    pub fn counter(&self) -> u32 {
        u32::from_be_bytes(self.counter)
    }

    /// The four concatenated ratchet parts.
    pub fn ratchet(&self) -> &[u8; RATCHET_LENGTH] {
        &self.ratchet
    }

    /// Sender's Ed25519 signing key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.public_key
    }
}

impl Drop for SessionExportMessage {
    fn drop(&mut self) {
        self.ratchet.zeroize();
    }
}

impl std::fmt::Debug for SessionExportMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionExportMessage")
            .field("version", &self.version)
            .field("counter", &self.counter())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ratchet_bytes() -> [u8; RATCHET_LENGTH] {
        let mut ratchet = [0u8; RATCHET_LENGTH];
        for (i, byte) in ratchet.iter_mut().enumerate() {
            *byte = i as u8;
        }
        ratchet
    }

    #[test]
    fn layout_sizes() {
        assert_eq!(std::mem::size_of::<SessionSharingMessage>(), SessionSharingMessage::SIZE);
        assert_eq!(SessionSharingMessage::SIZE, 229);
        assert_eq!(std::mem::size_of::<SessionExportMessage>(), SessionExportMessage::SIZE);
        assert_eq!(SessionExportMessage::SIZE, 165);
    }

    #[test]
    fn sharing_field_offsets() {
        let mut message = SessionSharingMessage::new(0x0102_0304, &ratchet_bytes(), [0xAA; 32]);
        message.set_signature([0xBB; 64]);
        let bytes = message.as_bytes();

        assert_eq!(bytes[0], 0x02);
        assert_eq!(&bytes[1..5], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[5..133], &ratchet_bytes());
        assert_eq!(&bytes[133..165], &[0xAA; 32]);
        assert_eq!(&bytes[165..229], &[0xBB; 64]);
        assert_eq!(message.signing_data(), &bytes[..165]);
    }

    #[test]
    fn sharing_rejects_wrong_length() {
        let result = SessionSharingMessage::from_bytes(&[0x02; 228]);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidLength { expected: 229, actual: 228 })
        ));
    }

    #[test]
    fn sharing_rejects_wrong_version() {
        let mut bytes = [0u8; SessionSharingMessage::SIZE];
        bytes[0] = 0x01;
        let result = SessionSharingMessage::from_bytes(&bytes);
        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedVersion { expected: 0x02, actual: 0x01 })
        ));
    }

    #[test]
    fn export_rejects_sharing_bytes() {
        let message = SessionSharingMessage::new(5, &ratchet_bytes(), [0x11; 32]);
        let result = SessionExportMessage::from_bytes(message.as_bytes());
        assert!(matches!(result, Err(ProtocolError::InvalidLength { expected: 165, .. })));
    }

    proptest! {
        #[test]
        fn export_round_trip(counter in any::<u32>(), key in any::<[u8; 32]>()) {
            let message = SessionExportMessage::new(counter, &ratchet_bytes(), key);
            let parsed = SessionExportMessage::from_bytes(message.as_bytes()).unwrap();

            prop_assert_eq!(parsed.counter(), counter);
            prop_assert_eq!(parsed.ratchet(), &ratchet_bytes());
            prop_assert_eq!(parsed.public_key(), &key);
        }
    }
}
