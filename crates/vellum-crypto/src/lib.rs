//! Vellum Cryptographic Primitives
//!
//! Building blocks for Olm/Megolm sessions. Everything here is synchronous
//! and deterministic given its inputs; randomness is supplied by the caller
//! as a [`rand_core::CryptoRngCore`].
//!
//! # Key Lifecycle
//!
//! ```text
//! Random 128 bytes ──► Megolm Ratchet (index n)
//!                          │
//!                          ▼
//!          HKDF("MEGOLM_KEYS") → aes | mac | iv
//!                          │
//!                          ▼
//!        AES-256-CBC + HMAC-SHA-256 → group message
//! ```
//!
//! Persisted state takes a separate path through the same envelope:
//!
//! ```text
//! pickle key ──► HKDF("Pickle") → AES-256-CBC(state) | HMAC[..8] → base64
//! ```
//!
//! # Security
//!
//! Forward Secrecy:
//! - The ratchet only moves forward; superseded parts are overwritten
//! - Decrypting an older index works on a clone, never on live state
//!
//! Authenticity:
//! - Group messages carry a truncated MAC and an Ed25519 signature
//! - Pickles carry a truncated MAC checked before any decryption
//! - Tag comparison is constant-time
//!
//! Hygiene:
//! - Ratchet bytes, private keys and derived keys are zeroized on drop

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod error;
pub mod keys;
pub mod megolm;
pub mod pickle;

pub use cipher::{AesSha256, CipherKeys, MEGOLM_KDF_INFO, PICKLE_KDF_INFO};
pub use error::CryptoError;
pub use keys::{Curve25519KeyPair, Curve25519PublicKey, Ed25519KeyPair, Ed25519PublicKey};
pub use megolm::{Ratchet, is_at_or_ahead};
pub use pickle::{pickle, unpickle};
