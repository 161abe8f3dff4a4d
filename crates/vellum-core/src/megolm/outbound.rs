//! Sending half of a Megolm group session.

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use vellum_crypto::{Ed25519KeyPair, Ratchet};
use vellum_proto::{
    Pickle, PickleReader, PickleWriter, Unpickle, encode_base64, errors::Result as ProtocolResult,
    pickle::U32_LEN,
};

use crate::{
    error::{OlmError, Result},
    pickle::{libolm_base64, open, open_json, seal, seal_json},
};

/// libolm pickle version
const PICKLE_VERSION: u32 = 1;

/// JSON pickle version
const JSON_PICKLE_VERSION: u8 = 1;

/// Outbound Megolm session: a ratchet plus the key that signs every message.
#[derive(Clone, Serialize, Deserialize)]
pub struct MegolmOutboundSession {
    #[serde(with = "libolm_base64")]
    ratchet: Ratchet,
    #[serde(with = "libolm_base64")]
    signing_key: Ed25519KeyPair,
}

impl MegolmOutboundSession {
    /// Fresh session at index 0 with a random ratchet and signing key.
    pub fn new(rng: &mut dyn CryptoRngCore) -> Self {
        let ratchet = Ratchet::generate(rng);
        let signing_key = Ed25519KeyPair::generate(rng);
        tracing::debug!(session_id = %signing_key.public_key().to_base64(), "created outbound session");
        Self { ratchet, signing_key }
    }

    /// Encrypt `plaintext` into a base64 group message and advance by one.
    ///
    /// # Errors
    ///
    /// `EmptyInput` for an empty plaintext.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<String> {
        if plaintext.is_empty() {
            return Err(OlmError::EmptyInput.context("encrypt"));
        }
        let raw = self.ratchet.encrypt_group_message(plaintext, &self.signing_key);
        Ok(encode_base64(raw))
    }

    /// Base64 signed session-sharing message for the current index.
    ///
    /// Recipients importing it can decrypt from [`Self::message_index`] on.
    pub fn session_key(&self) -> String {
        let message = self.ratchet.session_sharing_message(&self.signing_key);
        encode_base64(message.as_bytes())
    }

    /// Index the next message will be encrypted at.
    pub fn message_index(&self) -> u32 {
        self.ratchet.counter()
    }

    /// Session identifier: unpadded base64 of the public signing key.
    pub fn id(&self) -> String {
        self.signing_key.public_key().to_base64()
    }

    /// Encrypt the libolm encoding of this session under `key`.
    pub fn pickle(&self, key: &[u8]) -> Result<String> {
        seal(self, key).map_err(|err| err.context("pickle"))
    }

    /// Restore a session from a binary pickle.
    pub fn from_pickle(pickled: &[u8], key: &[u8]) -> Result<Self> {
        Self::open_libolm(pickled, key).map_err(|err| err.context("from_pickle"))
    }

    fn open_libolm(pickled: &[u8], key: &[u8]) -> Result<Self> {
        let plaintext = open(pickled, key)?;
        let mut reader = PickleReader::new(&plaintext);
        match reader.read_u32()? {
            PICKLE_VERSION => Ok(Self::unpickle(&mut reader)?),
            other => Err(OlmError::BadPickleVersion(other)),
        }
    }

    /// Encrypt a JSON encoding of this session under `key`.
    pub fn pickle_json(&self, key: &[u8]) -> Result<String> {
        seal_json(self, JSON_PICKLE_VERSION, key).map_err(|err| err.context("pickle_json"))
    }

    /// Restore a session from a JSON pickle.
    pub fn unpickle_json(pickled: &[u8], key: &[u8]) -> Result<Self> {
        open_json(pickled, key, JSON_PICKLE_VERSION).map_err(|err| err.context("unpickle_json"))
    }
}

impl std::fmt::Debug for MegolmOutboundSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MegolmOutboundSession")
            .field("id", &self.id())
            .field("message_index", &self.message_index())
            .finish()
    }
}

impl Pickle for MegolmOutboundSession {
    fn pickle_len(&self) -> usize {
        U32_LEN + self.ratchet.pickle_len() + self.signing_key.pickle_len()
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> ProtocolResult<()> {
        writer.write_u32(PICKLE_VERSION)?;
        self.ratchet.pickle(writer)?;
        self.signing_key.pickle(writer)
    }
}

/// Body after the version word.
impl Unpickle for MegolmOutboundSession {
    fn unpickle(reader: &mut PickleReader<'_>) -> ProtocolResult<Self> {
        let ratchet = Ratchet::unpickle(reader)?;
        let signing_key = Ed25519KeyPair::unpickle(reader)?;
        Ok(Self { ratchet, signing_key })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use vellum_proto::pickle::encode;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn encrypt_advances_index() {
        let mut session = MegolmOutboundSession::new(&mut ChaCha20Rng::seed_from_u64(1));
        assert_eq!(session.message_index(), 0);

        session.encrypt(b"one").unwrap();
        session.encrypt(b"two").unwrap();
        assert_eq!(session.message_index(), 2);
    }

    #[test]
    fn empty_plaintext_is_rejected() {
        let mut session = MegolmOutboundSession::new(&mut ChaCha20Rng::seed_from_u64(1));
        assert_eq!(session.encrypt(b"").unwrap_err().kind(), ErrorKind::EmptyInput);
        assert_eq!(session.message_index(), 0);
    }

    #[test]
    fn pickle_layout_v1() {
        let session = MegolmOutboundSession::new(&mut ChaCha20Rng::seed_from_u64(2));
        let bytes = encode(&session).unwrap();

        assert_eq!(bytes.len(), 4 + 132 + 96);
        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
    }

    #[test]
    fn pickle_roundtrip_keeps_identity_and_index() {
        let mut session = MegolmOutboundSession::new(&mut ChaCha20Rng::seed_from_u64(3));
        session.encrypt(b"advance").unwrap();

        let restored = MegolmOutboundSession::from_pickle(session.pickle(b"key").unwrap().as_bytes(), b"key").unwrap();
        assert_eq!(restored.id(), session.id());
        assert_eq!(restored.message_index(), 1);
        assert_eq!(restored.session_key(), session.session_key());
    }

    #[test]
    fn json_roundtrip() {
        let session = MegolmOutboundSession::new(&mut ChaCha20Rng::seed_from_u64(4));
        let blob = session.pickle_json(b"key").unwrap();

        let restored = MegolmOutboundSession::unpickle_json(blob.as_bytes(), b"key").unwrap();
        assert_eq!(restored.session_key(), session.session_key());
    }
}
