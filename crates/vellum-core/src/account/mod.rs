//! Olm account: long-term identity keys plus published prekeys.
//!
//! The account is reached through the object-safe [`OlmAccount`] trait so
//! that callers holding a [`factory::AccountFactory`] never name the
//! concrete type.
//!
//! libolm pickle layout (version 4):
//!
//! ```text
//! version(u32) | ed25519 key pair(96) | curve25519 key pair(64)
//!   | otk_count(u32) | otk_count × (id(u32) | published(u8) | key pair(64))
//!   | fallback_count(u8) | fallback_count × one-time key
//!   | next_one_time_key_id(u32)
//! ```
//!
//! Versions 2 (no fallback keys) and 3 (two fixed fallback slots) are read
//! for compatibility; only version 4 is written.

pub mod factory;
mod keys;

use std::collections::BTreeMap;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use vellum_crypto::{Curve25519KeyPair, Curve25519PublicKey, Ed25519KeyPair, Ed25519PublicKey};
use vellum_proto::{
    Pickle, PickleReader, PickleWriter, Unpickle, encode_base64, errors::Result as ProtocolResult,
    pickle::U32_LEN,
};

use self::keys::{FallbackKeys, OneTimeKey};
use crate::{
    error::{OlmError, Result},
    pickle::{libolm_base64, open, open_json, seal, seal_json},
};

/// Upper bound on stored one-time keys; the oldest are dropped first.
pub const MAX_ONE_TIME_KEYS: usize = 100;

/// JSON pickle version
const JSON_PICKLE_VERSION: u8 = 1;

/// Supported libolm account layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PickleVersion {
    V2,
    V3,
    V4,
}

impl PickleVersion {
    const CURRENT: Self = Self::V4;

    fn as_u32(self) -> u32 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
            Self::V4 => 4,
        }
    }
}

impl TryFrom<u32> for PickleVersion {
    type Error = OlmError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            // Version 1 pickles carry a known-broken signing key and are refused
            other => Err(OlmError::BadPickleVersion(other)),
        }
    }
}

/// Public identity keys of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdentityKeys {
    /// Signing identity
    #[serde(serialize_with = "serialize_ed25519")]
    pub ed25519: Ed25519PublicKey,
    /// Diffie-Hellman identity
    #[serde(serialize_with = "serialize_curve25519")]
    pub curve25519: Curve25519PublicKey,
}

fn serialize_ed25519<S: serde::Serializer>(key: &Ed25519PublicKey, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&key.to_base64())
}

fn serialize_curve25519<S: serde::Serializer>(
    key: &Curve25519PublicKey,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&key.to_base64())
}

/// Operations a generic caller needs from an account.
///
/// Object safe: factories hand out `Box<dyn OlmAccount>`.
pub trait OlmAccount: std::fmt::Debug {
    /// Public identity keys.
    fn identity_keys(&self) -> IdentityKeys;

    /// Identity keys as `{"curve25519": ..., "ed25519": ...}`.
    fn identity_keys_json(&self) -> Result<String>;

    /// Base64 Ed25519 signature over `message`.
    ///
    /// # Errors
    ///
    /// - `EmptyInput` for an empty message
    /// - `NoKeyProvided` for a blank account
    fn sign(&self, message: &[u8]) -> Result<String>;

    /// Unpublished one-time keys by key id.
    fn one_time_keys(&self) -> BTreeMap<String, Curve25519PublicKey>;

    /// Generate `count` new one-time keys, evicting the oldest beyond
    /// [`MAX_ONE_TIME_KEYS`].
    fn generate_one_time_keys(&mut self, count: usize, rng: &mut dyn CryptoRngCore);

    /// Remove the one-time key with this public key. Returns false if no
    /// such key is stored.
    fn remove_one_time_key(&mut self, public_key: &Curve25519PublicKey) -> bool;

    /// Mark every one-time key and the current fallback key as published.
    fn mark_keys_as_published(&mut self);

    /// Maximum number of one-time keys kept.
    fn max_number_of_one_time_keys(&self) -> usize;

    /// Rotate in a new fallback key; the previous one is kept until
    /// [`OlmAccount::forget_old_fallback_key`].
    fn generate_fallback_key(&mut self, rng: &mut dyn CryptoRngCore);

    /// Current fallback key by key id, if it is unpublished.
    fn fallback_key(&self) -> BTreeMap<String, Curve25519PublicKey>;

    /// Discard the previous fallback key.
    fn forget_old_fallback_key(&mut self);

    /// Encrypt the libolm encoding of the account under `key`.
    fn pickle(&self, key: &[u8]) -> Result<String>;

    /// Replace the account state with a binary pickle. Unchanged on error.
    fn unpickle(&mut self, pickled: &[u8], key: &[u8]) -> Result<()>;

    /// Encrypt a JSON encoding of the account under `key`.
    fn pickle_json(&self, key: &[u8]) -> Result<String>;

    /// Replace the account state with a JSON pickle. Unchanged on error.
    fn unpickle_json(&mut self, pickled: &[u8], key: &[u8]) -> Result<()>;
}

/// Concrete Olm account.
///
/// `Default` is the blank account: all-zero keys, meant only as a target
/// for unpickling.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Account {
    #[serde(with = "libolm_base64")]
    signing_key: Ed25519KeyPair,
    #[serde(with = "libolm_base64")]
    identity_key: Curve25519KeyPair,
    one_time_keys: Vec<OneTimeKey>,
    fallback_keys: FallbackKeys,
    next_one_time_key_id: u32,
}

impl Account {
    /// Account with freshly generated identity keys and no prekeys.
    pub fn new(rng: &mut dyn CryptoRngCore) -> Self {
        let signing_key = Ed25519KeyPair::generate(rng);
        let identity_key = Curve25519KeyPair::generate(rng);
        tracing::debug!(ed25519 = %signing_key.public_key().to_base64(), "created account");

        Self { signing_key, identity_key, ..Self::default() }
    }

    /// Restore an account from a binary pickle.
    ///
    /// # Errors
    ///
    /// `EmptyInput` for an empty blob, then the errors of
    /// [`OlmAccount::unpickle`].
    pub fn from_pickle(pickled: &[u8], key: &[u8]) -> Result<Self> {
        if pickled.is_empty() {
            return Err(OlmError::EmptyInput.context("from_pickle"));
        }
        let plaintext = open(pickled, key).map_err(|err| err.context("from_pickle"))?;
        Self::decode_libolm(&plaintext).map_err(|err| err.context("from_pickle"))
    }

    fn decode_libolm(plaintext: &[u8]) -> Result<Self> {
        let mut reader = PickleReader::new(plaintext);
        let version = PickleVersion::try_from(reader.read_u32()?)?;

        let signing_key = Ed25519KeyPair::unpickle(&mut reader)?;
        let identity_key = Curve25519KeyPair::unpickle(&mut reader)?;

        let count = reader.read_u32()?;
        let mut one_time_keys = Vec::new();
        for _ in 0..count {
            one_time_keys.push(OneTimeKey::unpickle(&mut reader)?);
        }

        let fallback_keys = match version {
            PickleVersion::V2 => FallbackKeys::Empty,
            PickleVersion::V3 => FallbackKeys::unpickle_v3(&mut reader)?,
            PickleVersion::V4 => FallbackKeys::unpickle(&mut reader)?,
        };
        let next_one_time_key_id = reader.read_u32()?;

        Ok(Self { signing_key, identity_key, one_time_keys, fallback_keys, next_one_time_key_id })
    }

    fn next_key(&mut self, rng: &mut dyn CryptoRngCore) -> OneTimeKey {
        let key = OneTimeKey::new(self.next_one_time_key_id, Curve25519KeyPair::generate(rng));
        self.next_one_time_key_id = self.next_one_time_key_id.wrapping_add(1);
        key
    }
}

impl OlmAccount for Account {
    fn identity_keys(&self) -> IdentityKeys {
        IdentityKeys { ed25519: self.signing_key.public_key(), curve25519: self.identity_key.public_key() }
    }

    fn identity_keys_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.identity_keys())?)
    }

    fn sign(&self, message: &[u8]) -> Result<String> {
        if message.is_empty() {
            return Err(OlmError::EmptyInput.context("sign"));
        }
        if self.signing_key.is_blank() {
            return Err(OlmError::NoKeyProvided.context("sign"));
        }
        Ok(encode_base64(self.signing_key.sign(message)))
    }

    fn one_time_keys(&self) -> BTreeMap<String, Curve25519PublicKey> {
        self.one_time_keys
            .iter()
            .filter(|key| !key.published)
            .map(|key| (key.key_id(), key.public_key()))
            .collect()
    }

    fn generate_one_time_keys(&mut self, count: usize, rng: &mut dyn CryptoRngCore) {
        for _ in 0..count {
            let key = self.next_key(rng);
            self.one_time_keys.push(key);
        }

        let excess = self.one_time_keys.len().saturating_sub(MAX_ONE_TIME_KEYS);
        if excess > 0 {
            self.one_time_keys.drain(..excess);
            tracing::debug!(evicted = excess, "dropped oldest one-time keys");
        }
    }

    fn remove_one_time_key(&mut self, public_key: &Curve25519PublicKey) -> bool {
        let before = self.one_time_keys.len();
        self.one_time_keys.retain(|key| key.public_key() != *public_key);
        self.one_time_keys.len() != before
    }

    fn mark_keys_as_published(&mut self) {
        for key in &mut self.one_time_keys {
            key.published = true;
        }
        if let Some(current) = self.fallback_keys.current_mut() {
            current.published = true;
        }
    }

    fn max_number_of_one_time_keys(&self) -> usize {
        MAX_ONE_TIME_KEYS
    }

    fn generate_fallback_key(&mut self, rng: &mut dyn CryptoRngCore) {
        let key = self.next_key(rng);
        self.fallback_keys.rotate(key);
    }

    fn fallback_key(&self) -> BTreeMap<String, Curve25519PublicKey> {
        self.fallback_keys
            .current()
            .filter(|key| !key.published)
            .map(|key| (key.key_id(), key.public_key()))
            .into_iter()
            .collect()
    }

    fn forget_old_fallback_key(&mut self) {
        self.fallback_keys.forget_previous();
    }

    fn pickle(&self, key: &[u8]) -> Result<String> {
        seal(self, key).map_err(|err| err.context("pickle"))
    }

    fn unpickle(&mut self, pickled: &[u8], key: &[u8]) -> Result<()> {
        let plaintext = open(pickled, key).map_err(|err| err.context("unpickle"))?;
        *self = Self::decode_libolm(&plaintext).map_err(|err| err.context("unpickle"))?;
        Ok(())
    }

    fn pickle_json(&self, key: &[u8]) -> Result<String> {
        seal_json(self, JSON_PICKLE_VERSION, key).map_err(|err| err.context("pickle_json"))
    }

    fn unpickle_json(&mut self, pickled: &[u8], key: &[u8]) -> Result<()> {
        *self = open_json(pickled, key, JSON_PICKLE_VERSION).map_err(|err| err.context("unpickle_json"))?;
        Ok(())
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("ed25519", &self.signing_key.public_key().to_base64())
            .field("curve25519", &self.identity_key.public_key().to_base64())
            .field("one_time_keys", &self.one_time_keys.len())
            .finish_non_exhaustive()
    }
}

impl Pickle for Account {
    fn pickle_len(&self) -> usize {
        U32_LEN
            + self.signing_key.pickle_len()
            + self.identity_key.pickle_len()
            + U32_LEN
            + self.one_time_keys.iter().map(Pickle::pickle_len).sum::<usize>()
            + self.fallback_keys.pickle_len()
            + U32_LEN
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> ProtocolResult<()> {
        writer.write_u32(PickleVersion::CURRENT.as_u32())?;
        self.signing_key.pickle(writer)?;
        self.identity_key.pickle(writer)?;

        writer.write_u32(self.one_time_keys.len() as u32)?;
        for key in &self.one_time_keys {
            key.pickle(writer)?;
        }

        self.fallback_keys.pickle(writer)?;
        writer.write_u32(self.next_one_time_key_id)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use vellum_proto::pickle::encode;

    use super::*;
    use crate::error::ErrorKind;

    fn account(seed: u64) -> (Account, ChaCha20Rng) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        (Account::new(&mut rng), rng)
    }

    #[test]
    fn sign_verifies_with_identity_key() {
        let (account, _) = account(1);
        let signature = vellum_proto::decode_base64(account.sign(b"payload").unwrap()).unwrap();

        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&signature);
        account.identity_keys().ed25519.verify(b"payload", &bytes).unwrap();
    }

    #[test]
    fn blank_account_cannot_sign() {
        let blank = Account::default();
        assert_eq!(blank.sign(b"payload").unwrap_err().kind(), ErrorKind::NoKeyProvided);
        assert_eq!(blank.sign(b"").unwrap_err().kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn one_time_keys_are_capped_oldest_first() {
        let (mut account, mut rng) = account(2);
        account.generate_one_time_keys(60, &mut rng);
        account.generate_one_time_keys(60, &mut rng);

        let keys = account.one_time_keys();
        assert_eq!(keys.len(), MAX_ONE_TIME_KEYS);
        assert!(!keys.contains_key(&encode_base64(19u32.to_be_bytes())));
        assert!(keys.contains_key(&encode_base64(20u32.to_be_bytes())));
        assert!(keys.contains_key(&encode_base64(119u32.to_be_bytes())));
    }

    #[test]
    fn published_keys_are_hidden() {
        let (mut account, mut rng) = account(3);
        account.generate_one_time_keys(5, &mut rng);
        account.generate_fallback_key(&mut rng);
        assert_eq!(account.fallback_key().len(), 1);

        account.mark_keys_as_published();
        assert!(account.one_time_keys().is_empty());
        assert!(account.fallback_key().is_empty());
    }

    #[test]
    fn remove_one_time_key_by_public_key() {
        let (mut account, mut rng) = account(4);
        account.generate_one_time_keys(2, &mut rng);
        let target = *account.one_time_keys().values().next().unwrap();

        assert!(account.remove_one_time_key(&target));
        assert!(!account.remove_one_time_key(&target));
        assert_eq!(account.one_time_keys().len(), 1);
    }

    #[test]
    fn fallback_rotation_and_forget() {
        let (mut account, mut rng) = account(5);
        account.generate_fallback_key(&mut rng);
        account.generate_fallback_key(&mut rng);
        assert!(matches!(account.fallback_keys, FallbackKeys::Rotated { .. }));

        account.forget_old_fallback_key();
        assert!(matches!(account.fallback_keys, FallbackKeys::Current(_)));
    }

    #[test]
    fn pickle_layout_v4() {
        let (mut account, mut rng) = account(6);
        account.generate_one_time_keys(2, &mut rng);
        account.generate_fallback_key(&mut rng);
        let bytes = encode(&account).unwrap();

        assert_eq!(&bytes[..4], &[0, 0, 0, 4]);
        assert_eq!(bytes.len(), 4 + 96 + 64 + 4 + 2 * 69 + 1 + 69 + 4);
        assert_eq!(&bytes[bytes.len() - 4..], &[0, 0, 0, 3]);
    }

    #[test]
    fn version_two_has_no_fallback_keys() {
        let (mut account, mut rng) = account(7);
        account.generate_one_time_keys(1, &mut rng);
        let v4 = encode(&account).unwrap();

        // v4 with zero fallback keys differs from v2 only by the count byte
        let count_offset = 4 + 96 + 64 + 4 + 69;
        let mut v2 = v4[..count_offset].to_vec();
        v2.extend_from_slice(&v4[count_offset + 1..]);
        v2[3] = 2;

        let restored = Account::decode_libolm(&v2).unwrap();
        assert_eq!(restored.identity_keys(), account.identity_keys());
        assert_eq!(restored.one_time_keys(), account.one_time_keys());
        assert!(restored.fallback_key().is_empty());
    }

    #[test]
    fn version_one_is_refused() {
        let (account, _) = account(8);
        let mut bytes = encode(&account).unwrap();
        bytes[3] = 1;
        assert_eq!(Account::decode_libolm(&bytes).unwrap_err(), OlmError::BadPickleVersion(1));
    }

    #[test]
    fn identity_keys_json_shape() {
        let (account, _) = account(9);
        let json: serde_json::Value = serde_json::from_str(&account.identity_keys_json().unwrap()).unwrap();

        assert_eq!(json["ed25519"], account.identity_keys().ed25519.to_base64());
        assert_eq!(json["curve25519"], account.identity_keys().curve25519.to_base64());
    }
}
