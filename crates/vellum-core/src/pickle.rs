//! Binary and JSON pickling on top of the encrypted envelope.
//!
//! Binary pickles are the libolm layouts produced by each entity's
//! [`Pickle`] impl. JSON pickles are `version_byte | JSON`, where the
//! version numbering is independent from the binary one. Both are sealed
//! with [`vellum_crypto::pickle`].

use serde::{Serialize, de::DeserializeOwned};
use vellum_proto::{Pickle, pickle::encode};
use zeroize::Zeroizing;

use crate::error::{OlmError, Result};

/// Seal the libolm encoding of `value`.
pub(crate) fn seal<T: Pickle>(value: &T, key: &[u8]) -> Result<String> {
    if key.is_empty() {
        return Err(OlmError::NoKeyProvided);
    }
    let plaintext = Zeroizing::new(encode(value)?);
    Ok(vellum_crypto::pickle(key, &plaintext))
}

/// Authenticate and decrypt a pickle, returning the plaintext encoding.
pub(crate) fn open(pickled: &[u8], key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if key.is_empty() {
        return Err(OlmError::NoKeyProvided);
    }
    if pickled.is_empty() {
        return Err(OlmError::EmptyInput);
    }
    vellum_crypto::unpickle(key, pickled).map_err(|err| {
        let err = OlmError::from(err);
        if err.kind().is_integrity_failure() {
            tracing::warn!(error = %err, "pickle failed authentication");
        }
        err
    })
}

/// Seal `version | JSON(value)`.
pub(crate) fn seal_json<T: Serialize>(value: &T, version: u8, key: &[u8]) -> Result<String> {
    if key.is_empty() {
        return Err(OlmError::NoKeyProvided);
    }
    let mut plaintext = Zeroizing::new(vec![version]);
    serde_json::to_writer(&mut *plaintext, value)?;
    Ok(vellum_crypto::pickle(key, &plaintext))
}

/// Open a JSON pickle, rejecting any version byte other than `version`.
pub(crate) fn open_json<T: DeserializeOwned>(pickled: &[u8], key: &[u8], version: u8) -> Result<T> {
    let plaintext = open(pickled, key)?;
    match plaintext.split_first() {
        Some((&found, json)) if found == version => Ok(serde_json::from_slice(json)?),
        Some((&found, _)) => Err(OlmError::BadPickleVersion(u32::from(found))),
        None => Err(OlmError::MalformedMessage("empty pickle".to_string())),
    }
}

/// Serde adaptor storing a value as base64 of its libolm encoding.
///
/// Used for key material and ratchets inside JSON pickles so that both
/// pickle flavours share one byte layout per type.
pub(crate) mod libolm_base64 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::Error as _};
    use vellum_proto::{Pickle, PickleReader, Unpickle, decode_base64, encode_base64, pickle::encode};
    use zeroize::Zeroizing;

    pub(crate) fn serialize<T: Pickle, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = Zeroizing::new(encode(value).map_err(S::Error::custom)?);
        let text = Zeroizing::new(encode_base64(&*bytes));
        serializer.serialize_str(&text)
    }

    pub(crate) fn deserialize<'de, T: Unpickle, D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error> {
        let text = Zeroizing::new(String::deserialize(deserializer)?);
        let bytes = Zeroizing::new(decode_base64(text.as_bytes()).map_err(D::Error::custom)?);

        let mut reader = PickleReader::new(&bytes);
        let value = T::unpickle(&mut reader).map_err(D::Error::custom)?;
        if reader.remaining() != 0 {
            return Err(D::Error::custom(format!("{} trailing bytes", reader.remaining())));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use vellum_crypto::Ratchet;

    use super::*;
    use crate::error::ErrorKind;

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "libolm_base64")]
        ratchet: Ratchet,
        label: String,
    }

    #[test]
    fn binary_requires_key() {
        assert_eq!(seal(&7u32, b""), Err(OlmError::NoKeyProvided));
        assert_eq!(open(b"AAAA", b"").map(|p| p.to_vec()), Err(OlmError::NoKeyProvided));
    }

    #[test]
    fn open_checks_key_before_blob() {
        assert_eq!(open(b"", b"").map(|p| p.to_vec()), Err(OlmError::NoKeyProvided));
        assert_eq!(open(b"", b"key").map(|p| p.to_vec()), Err(OlmError::EmptyInput));
    }

    #[test]
    fn binary_roundtrip() {
        let blob = seal(&0x0102_0304u32, b"key").unwrap();
        assert_eq!(open(blob.as_bytes(), b"key").unwrap().as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn json_roundtrip_with_libolm_fields() {
        let holder = Holder { ratchet: Ratchet::new(9, [3u8; 128]), label: "x".to_string() };
        let blob = seal_json(&holder, 1, b"key").unwrap();

        let restored: Holder = open_json(blob.as_bytes(), b"key", 1).unwrap();
        assert_eq!(restored.ratchet, holder.ratchet);
        assert_eq!(restored.label, "x");
    }

    #[test]
    fn json_version_mismatch() {
        let blob = seal_json(&"value", 2, b"key").unwrap();
        let result: Result<String> = open_json(blob.as_bytes(), b"key", 1);
        assert_eq!(result, Err(OlmError::BadPickleVersion(2)));
    }

    #[test]
    fn json_wrong_key_is_bad_mac() {
        let blob = seal_json(&"value", 1, b"key").unwrap();
        let result: Result<String> = open_json(blob.as_bytes(), b"other", 1);
        assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::BadMac));
    }
}
