//! Binary codecs for Olm/Megolm state.
//!
//! Two families of fixed, legacy-compatible layouts live here:
//!
//! - Pickles: the plaintext encoding of persisted accounts and sessions,
//!   written with a predicted length and read back field by field.
//! - Wire messages: session-sharing, session-export and group messages.
//!
//! Everything in this crate is pure data shaping. Nothing here encrypts,
//! verifies or trusts; the crypto layer decides whether decoded bytes are
//! authentic.
//!
//! # Security
//!
//! Decoders are strict. A missing mandatory field, a wrong version byte or a
//! truncated buffer fails the whole decode with a typed [`ProtocolError`].
//! There is no best-effort partial parse.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod encoding;
pub mod errors;
pub mod message;
pub mod pickle;
pub mod varint;

pub use encoding::{decode_base64, encode_base64};
pub use errors::{ProtocolError, Result};
pub use message::{
    GroupMessage, MAC_LENGTH, PUBLIC_KEY_LENGTH, RATCHET_LENGTH, SIGNATURE_LENGTH,
    SessionExportMessage, SessionSharingMessage,
};
pub use pickle::{Pickle, PickleReader, PickleWriter, Unpickle};
