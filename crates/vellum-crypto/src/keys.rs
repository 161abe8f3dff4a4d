//! Ed25519 and Curve25519 key types with libolm pickle layouts
//!
//! Keys are held as raw bytes so that any pickled value, including the
//! all-zero keys of a blank account, round-trips byte for byte. Conversion
//! into `ed25519-dalek` / `x25519-dalek` types happens at the point of use.
//!
//! Pickle layouts:
//!
//! - Ed25519 public key: 32 bytes
//! - Ed25519 key pair: public(32) | private(64), private = SHA-512(seed)
//!   with the scalar half clamped. The seed itself is never stored.
//! - Curve25519 key pair: public(32) | private(32)

use ed25519_dalek::{
    Signature, Verifier, VerifyingKey,
    hazmat::{ExpandedSecretKey, raw_sign},
};
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha512};
use vellum_proto::{
    PUBLIC_KEY_LENGTH, Pickle, PickleReader, PickleWriter, SIGNATURE_LENGTH, Unpickle,
    encode_base64, errors::Result,
};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Length of an expanded Ed25519 private key: clamped scalar then hash prefix
pub const ED25519_PRIVATE_KEY_LENGTH: usize = 64;

/// Length of a Curve25519 key (public or private)
pub const CURVE25519_KEY_LENGTH: usize = 32;

/// Ed25519 public key identifying a signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ed25519PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl Ed25519PublicKey {
    /// Wrap raw key bytes. Point validity is checked on verification.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Unpadded base64 of the raw key bytes.
    pub fn to_base64(&self) -> String {
        encode_base64(self.0)
    }

    /// Verify an Ed25519 signature over `message`.
    ///
    /// # Errors
    ///
    /// `BadSignature` if the signature does not verify or the key bytes are
    /// not a valid curve point.
    pub fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_LENGTH]) -> std::result::Result<(), CryptoError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::BadSignature)?;
        key.verify(message, &Signature::from_bytes(signature)).map_err(|_| CryptoError::BadSignature)
    }
}

impl Pickle for Ed25519PublicKey {
    fn pickle_len(&self) -> usize {
        PUBLIC_KEY_LENGTH
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()> {
        writer.write_bytes(&self.0)
    }
}

impl Unpickle for Ed25519PublicKey {
    fn unpickle(reader: &mut PickleReader<'_>) -> Result<Self> {
        reader.read_array().map(Self)
    }
}

/// Ed25519 signing key pair.
///
/// A default (all-zero) key pair is "blank": it exists only to be overwritten
/// by unpickling and must not be used to sign.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Ed25519KeyPair {
    #[zeroize(skip)]
    public: Ed25519PublicKey,
    private: [u8; ED25519_PRIVATE_KEY_LENGTH],
}

impl Ed25519KeyPair {
    /// Generate a fresh key pair.
    pub fn generate(rng: &mut dyn CryptoRngCore) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        let pair = Self::from_seed(&seed);
        seed.zeroize();
        pair
    }

    /// Deterministic key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut hash = Sha512::digest(seed);
        let mut private = [0u8; ED25519_PRIVATE_KEY_LENGTH];
        private.copy_from_slice(&hash);
        hash.as_mut_slice().zeroize();

        private[0] &= 248;
        private[31] &= 63;
        private[31] |= 64;

        let expanded = ExpandedSecretKey::from_bytes(&private);
        let public = Ed25519PublicKey(VerifyingKey::from(&expanded).to_bytes());
        Self { public, private }
    }

    /// Public half.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.public
    }

    /// True for the all-zero placeholder of a blank account.
    pub fn is_blank(&self) -> bool {
        self.private.iter().all(|&b| b == 0)
    }

    /// Sign `message` with the expanded secret.
    ///
    /// The public key used in the signature's challenge is derived from the
    /// secret scalar, not taken from the stored public half.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        let expanded = ExpandedSecretKey::from_bytes(&self.private);
        let verifying_key = VerifyingKey::from(&expanded);
        raw_sign::<Sha512>(&expanded, message, &verifying_key).to_bytes()
    }
}

impl Default for Ed25519KeyPair {
    fn default() -> Self {
        Self { public: Ed25519PublicKey::default(), private: [0u8; ED25519_PRIVATE_KEY_LENGTH] }
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519KeyPair").field("public", &self.public.to_base64()).finish_non_exhaustive()
    }
}

impl Pickle for Ed25519KeyPair {
    fn pickle_len(&self) -> usize {
        self.public.pickle_len() + ED25519_PRIVATE_KEY_LENGTH
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()> {
        self.public.pickle(writer)?;
        writer.write_bytes(&self.private)
    }
}

impl Unpickle for Ed25519KeyPair {
    fn unpickle(reader: &mut PickleReader<'_>) -> Result<Self> {
        let public = Ed25519PublicKey::unpickle(reader)?;
        let private = reader.read_array()?;
        Ok(Self { public, private })
    }
}

/// Curve25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Curve25519PublicKey([u8; CURVE25519_KEY_LENGTH]);

impl Curve25519PublicKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; CURVE25519_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; CURVE25519_KEY_LENGTH] {
        &self.0
    }

    /// Unpadded base64 of the raw key bytes.
    pub fn to_base64(&self) -> String {
        encode_base64(self.0)
    }
}

/// Curve25519 Diffie-Hellman key pair.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Curve25519KeyPair {
    #[zeroize(skip)]
    public: Curve25519PublicKey,
    private: [u8; CURVE25519_KEY_LENGTH],
}

impl Curve25519KeyPair {
    /// Generate a fresh key pair.
    pub fn generate(rng: &mut dyn CryptoRngCore) -> Self {
        let mut private = [0u8; CURVE25519_KEY_LENGTH];
        rng.fill_bytes(&mut private);

        let secret = StaticSecret::from(private);
        let public = Curve25519PublicKey(X25519PublicKey::from(&secret).to_bytes());

        Self { public, private }
    }

    /// Public half.
    pub fn public_key(&self) -> Curve25519PublicKey {
        self.public
    }
}

impl std::fmt::Debug for Curve25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Curve25519KeyPair").field("public", &self.public.to_base64()).finish_non_exhaustive()
    }
}

impl Pickle for Curve25519KeyPair {
    fn pickle_len(&self) -> usize {
        2 * CURVE25519_KEY_LENGTH
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()> {
        writer.write_bytes(&self.public.0)?;
        writer.write_bytes(&self.private)
    }
}

impl Unpickle for Curve25519KeyPair {
    fn unpickle(reader: &mut PickleReader<'_>) -> Result<Self> {
        let public = Curve25519PublicKey(reader.read_array()?);
        let private = reader.read_array()?;
        Ok(Self { public, private })
    }
}
