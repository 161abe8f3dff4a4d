//! AES-256-CBC + HMAC-SHA-256 envelope keyed through HKDF
//!
//! One input key is stretched into three independent values with
//! HKDF-SHA-256 (empty salt, caller-chosen label):
//!
//! ```text
//! HKDF(key, info = label) → aes_key(32) | mac_key(32) | iv(16)
//! ```
//!
//! Different labels give unrelated keys, so the same secret can protect
//! pickles and group messages without key reuse across purposes.
//!
//! Decryption does NOT authenticate. Callers verify the tag with
//! [`AesSha256::verify`] before trusting any decrypted byte.

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Full HMAC-SHA-256 tag size in bytes
pub const MAC_SIZE: usize = 32;

/// HKDF label for persisted state
pub const PICKLE_KDF_INFO: &[u8] = b"Pickle";

/// HKDF label for Megolm group messages
pub const MEGOLM_KDF_INFO: &[u8] = b"MEGOLM_KEYS";

const AES_KEY_SIZE: usize = 32;
const MAC_KEY_SIZE: usize = 32;
const KDF_OUTPUT_SIZE: usize = AES_KEY_SIZE + MAC_KEY_SIZE + AES_BLOCK_SIZE;

/// Encryption key, authentication key and IV derived from one secret.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CipherKeys {
    aes_key: [u8; AES_KEY_SIZE],
    mac_key: [u8; MAC_KEY_SIZE],
    iv: [u8; AES_BLOCK_SIZE],
}

impl CipherKeys {
    /// Expand `key` under the given label.
    pub fn derive(key: &[u8], info: &[u8]) -> Self {
        let hkdf = Hkdf::<Sha256>::new(None, key);

        let mut okm = [0u8; KDF_OUTPUT_SIZE];
        let Ok(()) = hkdf.expand(info, &mut okm) else {
            unreachable!("80 bytes is a valid HKDF-SHA256 output length");
        };

        let mut keys =
            Self { aes_key: [0u8; AES_KEY_SIZE], mac_key: [0u8; MAC_KEY_SIZE], iv: [0u8; AES_BLOCK_SIZE] };
        keys.aes_key.copy_from_slice(&okm[..AES_KEY_SIZE]);
        keys.mac_key.copy_from_slice(&okm[AES_KEY_SIZE..AES_KEY_SIZE + MAC_KEY_SIZE]);
        keys.iv.copy_from_slice(&okm[AES_KEY_SIZE + MAC_KEY_SIZE..]);
        okm.zeroize();

        keys
    }

    /// PKCS#7-pad and encrypt.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes256CbcEnc::new(&self.aes_key.into(), &self.iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Decrypt and strip PKCS#7 padding.
    ///
    /// # Errors
    ///
    /// - `InvalidCiphertextLength`: empty or not block-aligned
    /// - `InvalidPadding`: padding bytes are inconsistent
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
            return Err(CryptoError::InvalidCiphertextLength(ciphertext.len()));
        }

        Aes256CbcDec::new(&self.aes_key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::InvalidPadding)
    }

    /// Full-length HMAC-SHA-256 tag over `data`.
    pub fn mac(&self, data: &[u8]) -> [u8; MAC_SIZE] {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.mac_key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(data);

        let mut tag = [0u8; MAC_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        tag
    }

    /// Constant-time check of a possibly truncated tag.
    ///
    /// The tag is compared against the same-length prefix of the full MAC.
    /// Empty or over-long tags never verify.
    pub fn verify(&self, data: &[u8], tag: &[u8]) -> bool {
        if tag.is_empty() || tag.len() > MAC_SIZE {
            return false;
        }
        let expected = self.mac(data);
        expected[..tag.len()].ct_eq(tag).into()
    }
}

/// Stateless AES-SHA2 cipher bound to one HKDF label.
///
/// Every call re-derives the keys from the caller's secret.
#[derive(Debug, Clone, Copy)]
pub struct AesSha256 {
    kdf_info: &'static [u8],
}

impl AesSha256 {
    /// Cipher whose keys are derived under `kdf_info`.
    pub const fn new(kdf_info: &'static [u8]) -> Self {
        Self { kdf_info }
    }

    /// Derive the key set for `key`.
    pub fn keys(&self, key: &[u8]) -> CipherKeys {
        CipherKeys::derive(key, self.kdf_info)
    }

    /// Encrypt `plaintext` under keys derived from `key`.
    pub fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Vec<u8> {
        self.keys(key).encrypt(plaintext)
    }

    /// Decrypt `ciphertext` under keys derived from `key`.
    ///
    /// Output is unauthenticated; verify the tag first.
    pub fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.keys(key).decrypt(ciphertext)
    }

    /// Full HMAC-SHA-256 tag over `data`.
    pub fn mac(&self, key: &[u8], data: &[u8]) -> [u8; MAC_SIZE] {
        self.keys(key).mac(data)
    }

    /// Constant-time verification of a possibly truncated tag.
    pub fn verify(&self, key: &[u8], data: &[u8], tag: &[u8]) -> bool {
        self.keys(key).verify(data, tag)
    }
}
