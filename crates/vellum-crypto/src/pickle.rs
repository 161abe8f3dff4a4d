//! Encrypted envelope for persisted state ("pickles")
//!
//! ```text
//! pickle = base64( AES-CBC(plaintext) | HMAC(ciphertext)[..8] )
//! ```
//!
//! Keys come from [`AesSha256`] under the `"Pickle"` label. The MAC check is
//! the only integrity gate for stored secrets, so [`unpickle`] fails closed
//! before any decryption happens.

use vellum_proto::{decode_base64, encode_base64};
use zeroize::Zeroizing;

use crate::{
    cipher::{AES_BLOCK_SIZE, AesSha256, PICKLE_KDF_INFO},
    error::CryptoError,
};

/// Bytes of HMAC kept at the end of a pickle
pub const PICKLE_MAC_LENGTH: usize = 8;

const PICKLE_CIPHER: AesSha256 = AesSha256::new(PICKLE_KDF_INFO);

/// Encrypt and authenticate `plaintext`, returning unpadded base64.
pub fn pickle(key: &[u8], plaintext: &[u8]) -> String {
    let keys = PICKLE_CIPHER.keys(key);

    let mut envelope = keys.encrypt(plaintext);
    let mac = keys.mac(&envelope);
    envelope.extend_from_slice(&mac[..PICKLE_MAC_LENGTH]);

    encode_base64(&envelope)
}

/// Decode, authenticate and decrypt a pickle.
///
/// The ciphertext handed to AES is the decoded buffer truncated to a whole
/// number of blocks. For well-formed pickles that drops exactly the 8-byte
/// MAC; the truncation rule itself is part of the legacy format.
///
/// # Errors
///
/// - `Protocol(InvalidBase64)`: not base64
/// - `InvalidCiphertextLength`: shorter than the MAC, or nothing to decrypt
/// - `BadMac`: wrong key or tampered blob
/// - `InvalidPadding`: authenticated but undecryptable (wrong format)
pub fn unpickle(key: &[u8], pickled: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let decoded = Zeroizing::new(decode_base64(pickled)?);
    if decoded.len() < PICKLE_MAC_LENGTH {
        return Err(CryptoError::InvalidCiphertextLength(decoded.len()));
    }

    let keys = PICKLE_CIPHER.keys(key);
    let (ciphertext, tag) = decoded.split_at(decoded.len() - PICKLE_MAC_LENGTH);
    if !keys.verify(ciphertext, tag) {
        return Err(CryptoError::BadMac);
    }

    let block_aligned = decoded.len() / AES_BLOCK_SIZE * AES_BLOCK_SIZE;
    keys.decrypt(&decoded[..block_aligned]).map(Zeroizing::new)
}
