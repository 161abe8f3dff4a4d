//! Megolm hierarchical hash ratchet
//!
//! The state is four 32-byte parts `R(0)..R(3)` and a 32-bit counter. Part
//! `j` is re-keyed every `2^(8 * (3 - j))` indices:
//!
//! ```text
//! R(0): every 2^24    R(1): every 2^16    R(2): every 2^8    R(3): every index
//! ```
//!
//! Re-keying part `i` from part `h` is `R(i) = HMAC-SHA256(key = R(h), [i])`.
//! When the counter crosses the boundary of part `h`, parts `3..=h` are all
//! re-derived from the old `R(h)`, which is then overwritten. Nothing can
//! recover the previous value of a part once it has moved on.
//!
//! # Security
//!
//! - One-way: the ratchet moves forward only. [`Ratchet::advance_to`]
//!   rejects targets circularly behind the counter.
//! - Overwrite in place: superseded part bytes are replaced inside the same
//!   buffer and temporaries are zeroized.
//! - Zeroize on drop.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use vellum_proto::{
    GroupMessage, Pickle, PickleReader, PickleWriter, RATCHET_LENGTH, SessionExportMessage,
    SessionSharingMessage, Unpickle,
    errors::Result as ProtocolResult,
    pickle::U32_LEN,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    cipher::{CipherKeys, MEGOLM_KDF_INFO},
    error::CryptoError,
    keys::{Ed25519KeyPair, Ed25519PublicKey},
};

type HmacSha256 = Hmac<Sha256>;

/// Number of hash chain parts
pub const RATCHET_PARTS: usize = 4;

/// Bytes per part
pub const RATCHET_PART_LENGTH: usize = RATCHET_LENGTH / RATCHET_PARTS;

/// Half the counter space. Indices whose distance from a reference is below
/// this are "at or ahead" of it.
const CIRCULAR_HALF: u32 = 1 << 31;

/// Returns true if `index` is circularly at or ahead of `reference`.
///
/// Indices are compared by the sign of their 32-bit difference, so an index
/// just past the wrap (`0x0000_0001`) is ahead of one just before it
/// (`0xFFFF_FFFF`).
pub fn is_at_or_ahead(index: u32, reference: u32) -> bool {
    index.wrapping_sub(reference) < CIRCULAR_HALF
}

/// Megolm ratchet state.
///
/// `Clone` produces an independent deep copy. Advancing a clone never
/// affects the original.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Ratchet {
    data: [u8; RATCHET_LENGTH],
    counter: u32,
}

impl Ratchet {
    /// Ratchet at `counter` with the given part bytes.
    pub fn new(counter: u32, data: [u8; RATCHET_LENGTH]) -> Self {
        Self { data, counter }
    }

    /// Ratchet from an untyped buffer.
    ///
    /// # Errors
    ///
    /// `InvalidKeyLength` unless `data` is exactly 128 bytes.
    pub fn from_slice(counter: u32, data: &[u8]) -> Result<Self, CryptoError> {
        let data: [u8; RATCHET_LENGTH] = data
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength { expected: RATCHET_LENGTH, actual: data.len() })?;
        Ok(Self::new(counter, data))
    }

    /// Fresh random ratchet at index 0.
    pub fn generate(rng: &mut dyn rand_core::CryptoRngCore) -> Self {
        let mut data = [0u8; RATCHET_LENGTH];
        rng.fill_bytes(&mut data);
        Self::new(0, data)
    }

    /// Message index the ratchet is positioned at.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Raw part bytes `R(0) | R(1) | R(2) | R(3)`.
    pub fn as_bytes(&self) -> &[u8; RATCHET_LENGTH] {
        &self.data
    }

    /// Move forward by exactly one index.
    ///
    /// The counter wraps at `u32::MAX`.
    pub fn advance(&mut self) {
        self.counter = self.counter.wrapping_add(1);

        // Coarsest part whose boundary the new counter sits on
        let mut mask: u32 = 0x00FF_FFFF;
        let mut h = 0;
        while h < RATCHET_PARTS {
            if self.counter & mask == 0 {
                break;
            }
            h += 1;
            mask >>= 8;
        }

        // R(h) is rehashed last so it stays the source for the finer parts
        for i in (h..RATCHET_PARTS).rev() {
            self.rehash(h, i);
        }
    }

    /// Move forward to `target`, skipping intermediate indices.
    ///
    /// Cost is bounded by 255 hashes per part rather than by the distance.
    /// Advancing to the current counter is a no-op.
    ///
    /// # Errors
    ///
    /// `RatchetBehind` if `target` is circularly behind the counter.
    pub fn advance_to(&mut self, target: u32) -> Result<(), CryptoError> {
        if !is_at_or_ahead(target, self.counter) {
            return Err(CryptoError::RatchetBehind { current: self.counter, requested: target });
        }

        for j in 0..RATCHET_PARTS {
            let shift = (RATCHET_PARTS - j - 1) * 8;
            let mask = u32::MAX << shift;

            let mut steps = ((target >> shift).wrapping_sub(self.counter >> shift)) & 0xff;
            if steps == 0 {
                // Same position in this part but a full cycle away
                if target < self.counter {
                    steps = 0x100;
                } else {
                    continue;
                }
            }

            // All but the last step only move R(j) along its own chain
            while steps > 1 {
                self.rehash(j, j);
                steps -= 1;
            }

            for k in (j..RATCHET_PARTS).rev() {
                self.rehash(j, k);
            }

            self.counter = target & mask;
        }

        Ok(())
    }

    /// Encryption, MAC and IV keys for the current index.
    ///
    /// Derived from the full 128-byte state.
    pub fn message_keys(&self) -> CipherKeys {
        CipherKeys::derive(&self.data, MEGOLM_KDF_INFO)
    }

    /// Encrypt `plaintext` as a signed group message at the current index,
    /// then advance by one.
    ///
    /// Returns the raw wire bytes:
    /// `version | body | mac[..8] | signature`.
    pub fn encrypt_group_message(&mut self, plaintext: &[u8], signing_key: &Ed25519KeyPair) -> Vec<u8> {
        let keys = self.message_keys();
        let ciphertext = keys.encrypt(plaintext);

        let mut raw = GroupMessage::encode_body(self.counter, &ciphertext);
        let mac = keys.mac(&raw);
        raw.extend_from_slice(&mac[..vellum_proto::MAC_LENGTH]);

        let signature = signing_key.sign(&raw);
        raw.extend_from_slice(&signature);

        self.advance();
        raw
    }

    /// Authenticate and decrypt a group message at the current index.
    ///
    /// `raw` is the exact wire buffer `message` was decoded from. The caller
    /// has positioned the ratchet at `message.message_index` and verified
    /// the signature.
    ///
    /// # Errors
    ///
    /// - `BadMac`: the truncated MAC does not match
    /// - `InvalidCiphertextLength` / `InvalidPadding`: authenticated but
    ///   malformed ciphertext
    pub fn decrypt_group_message(&self, raw: &[u8], message: &GroupMessage) -> Result<Vec<u8>, CryptoError> {
        let keys = self.message_keys();
        if !keys.verify(GroupMessage::mac_input(raw), &message.mac) {
            return Err(CryptoError::BadMac);
        }
        keys.decrypt(&message.ciphertext)
    }

    /// Signed session-sharing message for the current position.
    pub fn session_sharing_message(&self, signing_key: &Ed25519KeyPair) -> SessionSharingMessage {
        let public = signing_key.public_key();
        let mut message = SessionSharingMessage::new(self.counter, &self.data, *public.as_bytes());
        let signature = signing_key.sign(message.signing_data());
        message.set_signature(signature);
        message
    }

    /// Unsigned session-export message for the current position.
    pub fn session_export_message(&self, signing_key: Ed25519PublicKey) -> SessionExportMessage {
        SessionExportMessage::new(self.counter, &self.data, *signing_key.as_bytes())
    }

    fn rehash(&mut self, from: usize, to: usize) {
        let source = &self.data[from * RATCHET_PART_LENGTH..(from + 1) * RATCHET_PART_LENGTH];
        let Ok(mut mac) = HmacSha256::new_from_slice(source) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(&[to as u8]);

        let mut output = [0u8; RATCHET_PART_LENGTH];
        output.copy_from_slice(&mac.finalize().into_bytes());
        self.data[to * RATCHET_PART_LENGTH..(to + 1) * RATCHET_PART_LENGTH].copy_from_slice(&output);
        output.zeroize();
    }
}

impl std::fmt::Debug for Ratchet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ratchet").field("counter", &self.counter).finish_non_exhaustive()
    }
}

impl Pickle for Ratchet {
    fn pickle_len(&self) -> usize {
        RATCHET_LENGTH + U32_LEN
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> ProtocolResult<()> {
        writer.write_bytes(&self.data)?;
        writer.write_u32(self.counter)
    }
}

impl Unpickle for Ratchet {
    fn unpickle(reader: &mut PickleReader<'_>) -> ProtocolResult<Self> {
        let data = reader.read_array()?;
        let counter = reader.read_u32()?;
        Ok(Self { data, counter })
    }
}

#[cfg(test)]
mod tests {
    use vellum_proto::pickle::encode;

    use super::*;

    fn test_data() -> [u8; RATCHET_LENGTH] {
        let mut data = [0u8; RATCHET_LENGTH];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = i as u8;
        }
        data
    }

    fn part(ratchet: &Ratchet, j: usize) -> &[u8] {
        &ratchet.as_bytes()[j * RATCHET_PART_LENGTH..(j + 1) * RATCHET_PART_LENGTH]
    }

    fn hmac(key: &[u8], label: u8) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(key).unwrap();
        mac.update(&[label]);
        mac.finalize().into_bytes().to_vec()
    }

    #[test]
    fn from_slice_requires_exact_length() {
        assert!(Ratchet::from_slice(0, &[0u8; 128]).is_ok());
        assert_eq!(
            Ratchet::from_slice(0, &[0u8; 127]),
            Err(CryptoError::InvalidKeyLength { expected: 128, actual: 127 })
        );
    }

    #[test]
    fn single_step_rehashes_only_finest_part() {
        let before = Ratchet::new(0, test_data());
        let mut after = before.clone();
        after.advance();

        assert_eq!(after.counter(), 1);
        for j in 0..3 {
            assert_eq!(part(&after, j), part(&before, j));
        }
        assert_eq!(part(&after, 3), hmac(part(&before, 3), 3).as_slice());
    }

    #[test]
    fn crossing_256_rekeys_from_part_two() {
        let mut ratchet = Ratchet::new(0xFF, test_data());
        let before = ratchet.clone();
        ratchet.advance();

        assert_eq!(ratchet.counter(), 0x100);
        assert_eq!(part(&ratchet, 0), part(&before, 0));
        assert_eq!(part(&ratchet, 1), part(&before, 1));
        assert_eq!(part(&ratchet, 2), hmac(part(&before, 2), 2).as_slice());
        assert_eq!(part(&ratchet, 3), hmac(part(&before, 2), 3).as_slice());
    }

    #[test]
    fn crossing_2_24_rekeys_everything_from_part_zero() {
        let mut ratchet = Ratchet::new(0x00FF_FFFF, test_data());
        let before = ratchet.clone();
        ratchet.advance();

        assert_eq!(ratchet.counter(), 0x0100_0000);
        for j in 0..RATCHET_PARTS {
            assert_eq!(part(&ratchet, j), hmac(part(&before, 0), j as u8).as_slice());
        }
    }

    #[test]
    fn advance_to_matches_sequential_advance() {
        for (start, target) in [(0, 5), (0, 255), (0, 256), (3, 700), (0xFE, 0x1_0203), (0xFFFF_FF00, 0xFFFF_FFFF)] {
            let mut stepped = Ratchet::new(start, test_data());
            for _ in start..target {
                stepped.advance();
            }

            let mut jumped = Ratchet::new(start, test_data());
            jumped.advance_to(target).unwrap();

            assert_eq!(jumped, stepped, "{start:#x} -> {target:#x}");
        }
    }

    #[test]
    fn advance_to_across_wrap() {
        let mut stepped = Ratchet::new(0xFFFF_FFFE, test_data());
        for _ in 0..4 {
            stepped.advance();
        }
        assert_eq!(stepped.counter(), 2);

        let mut jumped = Ratchet::new(0xFFFF_FFFE, test_data());
        jumped.advance_to(2).unwrap();

        assert_eq!(jumped, stepped);
    }

    #[test]
    fn advance_to_current_is_noop() {
        let mut ratchet = Ratchet::new(42, test_data());
        ratchet.advance_to(42).unwrap();
        assert_eq!(ratchet, Ratchet::new(42, test_data()));
    }

    #[test]
    fn advance_to_rejects_backwards() {
        let mut ratchet = Ratchet::new(10, test_data());
        assert_eq!(ratchet.advance_to(3), Err(CryptoError::RatchetBehind { current: 10, requested: 3 }));
        assert_eq!(ratchet.counter(), 10);
    }

    #[test]
    fn circular_comparison() {
        assert!(is_at_or_ahead(5, 5));
        assert!(is_at_or_ahead(6, 5));
        assert!(!is_at_or_ahead(4, 5));
        assert!(is_at_or_ahead(1, u32::MAX));
        assert!(!is_at_or_ahead(u32::MAX, 1));
        assert!(is_at_or_ahead(0x7FFF_FFFF, 0));
        assert!(!is_at_or_ahead(0x8000_0000, 0));
    }

    #[test]
    fn group_message_roundtrip() {
        let signing_key = Ed25519KeyPair::from_seed(&[1u8; 32]);
        let mut sender = Ratchet::new(0, test_data());
        let receiver = sender.clone();

        let raw = sender.encrypt_group_message(b"hello group", &signing_key);
        assert_eq!(sender.counter(), 1);

        let message = GroupMessage::decode(&raw).unwrap();
        assert_eq!(message.message_index, 0);
        signing_key.public_key().verify(GroupMessage::signing_data(&raw), &message.signature).unwrap();

        assert_eq!(receiver.decrypt_group_message(&raw, &message).unwrap(), b"hello group");
    }

    #[test]
    fn wrong_index_is_bad_mac() {
        let signing_key = Ed25519KeyPair::from_seed(&[1u8; 32]);
        let mut sender = Ratchet::new(0, test_data());
        let mut receiver = sender.clone();

        let raw = sender.encrypt_group_message(b"hello", &signing_key);
        let message = GroupMessage::decode(&raw).unwrap();

        receiver.advance();
        assert_eq!(receiver.decrypt_group_message(&raw, &message), Err(CryptoError::BadMac));
    }

    #[test]
    fn sharing_message_is_signed_over_prefix() {
        let signing_key = Ed25519KeyPair::from_seed(&[2u8; 32]);
        let ratchet = Ratchet::new(7, test_data());

        let message = ratchet.session_sharing_message(&signing_key);
        assert_eq!(message.counter(), 7);
        assert_eq!(message.ratchet(), &test_data());
        signing_key.public_key().verify(message.signing_data(), message.signature()).unwrap();
    }

    #[test]
    fn export_message_carries_state() {
        let key = Ed25519KeyPair::from_seed(&[3u8; 32]).public_key();
        let message = Ratchet::new(9, test_data()).session_export_message(key);

        assert_eq!(message.counter(), 9);
        assert_eq!(message.ratchet(), &test_data());
        assert_eq!(message.public_key(), key.as_bytes());
    }

    #[test]
    fn pickle_layout_is_data_then_big_endian_counter() {
        let bytes = encode(&Ratchet::new(0x0102_0304, test_data())).unwrap();

        assert_eq!(bytes.len(), 132);
        assert_eq!(&bytes[..128], &test_data());
        assert_eq!(&bytes[128..], &[1, 2, 3, 4]);

        let restored = Ratchet::unpickle(&mut PickleReader::new(&bytes)).unwrap();
        assert_eq!(restored, Ratchet::new(0x0102_0304, test_data()));
    }

    #[test]
    fn message_keys_depend_on_whole_state() {
        let base = Ratchet::new(0, test_data());
        let mut data = test_data();
        data[0] ^= 1;
        let changed = Ratchet::new(0, data);

        assert_ne!(base.message_keys().encrypt(b"x"), changed.message_keys().encrypt(b"x"));
    }
}
