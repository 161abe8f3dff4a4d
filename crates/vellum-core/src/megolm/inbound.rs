//! Receiving half of a Megolm group session.
//!
//! The session keeps two ratchets:
//!
//! - `initial`: snapshot taken at construction, never advanced. Its counter
//!   is the earliest index the session can ever decrypt.
//! - `live`: advanced in place as newer messages arrive.
//!
//! Older indices (between `initial` and `live`) are served from a clone of
//! `initial` so that decrypting history never rewinds or touches stored
//! state.
//!
//! # Invariants
//!
//! - `initial.counter() <= live.counter()` (circularly)
//! - The signing key is fixed at construction

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use vellum_crypto::{Ed25519PublicKey, Ratchet, is_at_or_ahead};
use vellum_proto::{
    GroupMessage, Pickle, PickleReader, PickleWriter, SessionExportMessage, SessionSharingMessage,
    Unpickle, decode_base64, encode_base64,
    errors::Result as ProtocolResult,
    pickle::{BOOL_LEN, U32_LEN},
};

use crate::{
    error::{OlmError, Result},
    pickle::{libolm_base64, open, open_json, seal, seal_json},
};

/// JSON pickle version
const JSON_PICKLE_VERSION: u8 = 1;

/// Supported libolm pickle layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PickleVersion {
    /// No verified flag; every session was verified at import time
    V1,
    /// Trailing verified flag
    V2,
}

impl PickleVersion {
    const CURRENT: Self = Self::V2;

    fn as_u32(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }
}

impl TryFrom<u32> for PickleVersion {
    type Error = OlmError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(OlmError::BadPickleVersion(other)),
        }
    }
}

/// Inbound Megolm session.
///
/// Plain value: mutating calls take `&mut self` and callers serialize access.
///
/// The JSON pickle reuses the field names other Megolm libraries use
/// (`initial_ratchet`, `ratchet`, `signing_key`, `signing_key_verified`),
/// but not their value shapes: each ratchet and the signing key is a string
/// holding unpadded base64 of its libolm binary encoding (128 ratchet bytes
/// then the big-endian counter). JSON pickles are therefore only readable
/// by this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MegolmInboundSession {
    #[serde(rename = "initial_ratchet", with = "libolm_base64")]
    initial: Ratchet,
    #[serde(rename = "ratchet", with = "libolm_base64")]
    live: Ratchet,
    #[serde(with = "libolm_base64")]
    signing_key: Ed25519PublicKey,
    #[serde(rename = "signing_key_verified")]
    verified: bool,
}

impl MegolmInboundSession {
    fn from_ratchet(ratchet: Ratchet, signing_key: Ed25519PublicKey, verified: bool) -> Self {
        Self { initial: ratchet.clone(), live: ratchet, signing_key, verified }
    }

    /// Session from a base64 session-sharing message.
    ///
    /// The embedded signature is checked against the embedded key; the
    /// session starts out verified.
    ///
    /// # Errors
    ///
    /// - `EmptyInput`
    /// - `MalformedMessage`: not base64, or wrong length
    /// - `WrongProtocolVersion`: version byte is not 0x02
    /// - `BadSignature`
    pub fn from_session_share(input: &[u8]) -> Result<Self> {
        Self::import_share(input).map_err(|err| err.context("from_session_share"))
    }

    fn import_share(input: &[u8]) -> Result<Self> {
        if input.is_empty() {
            return Err(OlmError::EmptyInput);
        }
        let raw = zeroize::Zeroizing::new(decode_base64(input)?);
        let message = SessionSharingMessage::from_bytes(&raw)?;

        let signing_key = Ed25519PublicKey::from_bytes(*message.public_key());
        if let Err(err) = signing_key.verify(message.signing_data(), message.signature()) {
            tracing::warn!(session_id = %signing_key.to_base64(), "session share signature rejected");
            return Err(err.into());
        }

        tracing::debug!(
            session_id = %signing_key.to_base64(),
            first_known_index = message.counter(),
            "imported signed session share"
        );
        Ok(Self::from_ratchet(Ratchet::new(message.counter(), *message.ratchet()), signing_key, true))
    }

    /// Session from a base64 session-export message.
    ///
    /// Exports are unsigned, so the session starts unverified until a
    /// message decrypts successfully.
    ///
    /// # Errors
    ///
    /// - `EmptyInput`
    /// - `MalformedMessage`: not base64, or wrong length
    /// - `WrongProtocolVersion`: version byte is not 0x01
    pub fn from_export(input: &[u8]) -> Result<Self> {
        Self::import_export(input).map_err(|err| err.context("from_export"))
    }

    fn import_export(input: &[u8]) -> Result<Self> {
        if input.is_empty() {
            return Err(OlmError::EmptyInput);
        }
        let raw = zeroize::Zeroizing::new(decode_base64(input)?);
        let message = SessionExportMessage::from_bytes(&raw)?;

        let signing_key = Ed25519PublicKey::from_bytes(*message.public_key());
        tracing::debug!(
            session_id = %signing_key.to_base64(),
            first_known_index = message.counter(),
            "imported unverified session export"
        );
        Ok(Self::from_ratchet(Ratchet::new(message.counter(), *message.ratchet()), signing_key, false))
    }

    /// Restore a session from a binary pickle.
    ///
    /// # Errors
    ///
    /// - `EmptyInput`: empty blob (checked first)
    /// - `NoKeyProvided`: empty key
    /// - `BadMac`: wrong key or tampered blob
    /// - `BadPickleVersion`: unknown layout version
    pub fn from_pickle(pickled: &[u8], key: &[u8]) -> Result<Self> {
        if pickled.is_empty() {
            return Err(OlmError::EmptyInput.context("from_pickle"));
        }
        let plaintext = open(pickled, key).map_err(|err| err.context("from_pickle"))?;
        Self::decode_libolm(&plaintext).map_err(|err| err.context("from_pickle"))
    }

    /// Replace this session's state with the contents of a binary pickle.
    ///
    /// On error the session is left unchanged.
    pub fn unpickle(&mut self, pickled: &[u8], key: &[u8]) -> Result<()> {
        let plaintext = open(pickled, key).map_err(|err| err.context("unpickle"))?;
        *self = Self::decode_libolm(&plaintext).map_err(|err| err.context("unpickle"))?;
        Ok(())
    }

    /// Encrypt the libolm encoding of this session under `key`.
    ///
    /// # Errors
    ///
    /// `NoKeyProvided` for an empty key.
    pub fn pickle(&self, key: &[u8]) -> Result<String> {
        seal(self, key).map_err(|err| err.context("pickle"))
    }

    /// Encrypt a JSON encoding of this session under `key`.
    pub fn pickle_json(&self, key: &[u8]) -> Result<String> {
        seal_json(self, JSON_PICKLE_VERSION, key).map_err(|err| err.context("pickle_json"))
    }

    /// Restore a session from a JSON pickle.
    ///
    /// # Errors
    ///
    /// `BadPickleVersion` if the leading version byte is not 1, plus the
    /// envelope errors of [`MegolmInboundSession::from_pickle`].
    pub fn unpickle_json(pickled: &[u8], key: &[u8]) -> Result<Self> {
        open_json(pickled, key, JSON_PICKLE_VERSION).map_err(|err| err.context("unpickle_json"))
    }

    fn decode_libolm(plaintext: &[u8]) -> Result<Self> {
        let mut reader = PickleReader::new(plaintext);
        let version = PickleVersion::try_from(reader.read_u32()?)?;

        let initial = Ratchet::unpickle(&mut reader)?;
        let live = Ratchet::unpickle(&mut reader)?;
        let signing_key = Ed25519PublicKey::unpickle(&mut reader)?;
        let verified = match version {
            PickleVersion::V1 => true,
            PickleVersion::V2 => reader.read_bool()?,
        };

        Ok(Self { initial, live, signing_key, verified })
    }

    /// Ratchet positioned at `index`.
    ///
    /// - At or ahead of `live`: `live` is advanced in place and borrowed.
    ///   This is the only path that changes session state, and it cannot
    ///   be undone.
    /// - Behind `initial`: `RatchetNotAvailable`.
    /// - Otherwise: an owned clone of `initial` advanced to `index`.
    ///
    /// All comparisons are circular with a 2^31 threshold.
    pub fn get_ratchet(&mut self, index: u32) -> Result<Cow<'_, Ratchet>> {
        if is_at_or_ahead(index, self.live.counter()) {
            tracing::debug!(index, live_index = self.live.counter(), "advancing live ratchet");
            self.live.advance_to(index)?;
            return Ok(Cow::Borrowed(&self.live));
        }

        if !is_at_or_ahead(index, self.initial.counter()) {
            tracing::debug!(index, first_known_index = self.initial.counter(), "index precedes session");
            return Err(OlmError::RatchetNotAvailable { requested: index, first_known: self.initial.counter() });
        }

        tracing::debug!(index, live_index = self.live.counter(), "replaying from initial ratchet");
        let mut ratchet = self.initial.clone();
        ratchet.advance_to(index)?;
        Ok(Cow::Owned(ratchet))
    }

    /// Decrypt a base64 group message, returning the plaintext and its
    /// message index.
    ///
    /// A successful decrypt marks the session verified: only the holder of
    /// the signing key could have produced a message that passes both the
    /// signature and the MAC.
    ///
    /// # Errors
    ///
    /// - `EmptyInput`
    /// - `WrongProtocolVersion`: version byte is not 0x03
    /// - `MalformedMessage`: not base64, missing index or ciphertext
    /// - `BadSignature`: signature over the message does not verify
    /// - `RatchetNotAvailable`: index precedes the first known index
    /// - `BadMac`
    pub fn decrypt(&mut self, input: &[u8]) -> Result<(Vec<u8>, u32)> {
        self.decrypt_inner(input).map_err(|err| err.context("decrypt"))
    }

    fn decrypt_inner(&mut self, input: &[u8]) -> Result<(Vec<u8>, u32)> {
        if input.is_empty() {
            return Err(OlmError::EmptyInput);
        }
        let raw = decode_base64(input)?;
        let message = GroupMessage::decode(&raw)?;
        let index = message.message_index;

        if let Err(err) = self.signing_key.verify(GroupMessage::signing_data(&raw), &message.signature) {
            tracing::warn!(session_id = %self.id(), index, "group message signature rejected");
            return Err(err.into());
        }

        let plaintext = {
            let ratchet = self.get_ratchet(index)?;
            ratchet.decrypt_group_message(&raw, &message)
        };
        let plaintext = plaintext.map_err(|err| {
            let err = OlmError::from(err);
            if err.kind().is_integrity_failure() {
                tracing::warn!(index, "group message failed authentication");
            }
            err
        })?;

        self.verified = true;
        Ok((plaintext, index))
    }

    /// Base64 session-export message positioned at `index`.
    ///
    /// Uses the same ratchet selection as decryption, so exporting at or
    /// beyond the live index advances the live ratchet.
    ///
    /// # Errors
    ///
    /// `RatchetNotAvailable` if `index` precedes the first known index.
    pub fn export(&mut self, index: u32) -> Result<String> {
        let signing_key = self.signing_key;
        let ratchet = self.get_ratchet(index).map_err(|err| err.context("export"))?;
        let message = ratchet.session_export_message(signing_key);
        Ok(encode_base64(message.as_bytes()))
    }

    /// Session identifier: unpadded base64 of the signing key.
    pub fn id(&self) -> String {
        self.signing_key.to_base64()
    }

    /// Sender's Ed25519 signing key.
    pub fn signing_key(&self) -> Ed25519PublicKey {
        self.signing_key
    }

    /// Earliest message index this session can decrypt.
    pub fn first_known_index(&self) -> u32 {
        self.initial.counter()
    }

    /// Index the live ratchet is positioned at.
    pub fn live_index(&self) -> u32 {
        self.live.counter()
    }

    /// True once the signing key is known to be authentic.
    pub fn is_verified(&self) -> bool {
        self.verified
    }
}

impl std::fmt::Debug for MegolmInboundSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MegolmInboundSession")
            .field("id", &self.id())
            .field("first_known_index", &self.initial.counter())
            .field("live_index", &self.live.counter())
            .field("verified", &self.verified)
            .finish()
    }
}

impl Pickle for MegolmInboundSession {
    fn pickle_len(&self) -> usize {
        U32_LEN + self.initial.pickle_len() + self.live.pickle_len() + self.signing_key.pickle_len() + BOOL_LEN
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> ProtocolResult<()> {
        writer.write_u32(PickleVersion::CURRENT.as_u32())?;
        self.initial.pickle(writer)?;
        self.live.pickle(writer)?;
        self.signing_key.pickle(writer)?;
        writer.write_bool(self.verified)
    }
}
