//! Megolm group message framing.
//!
//! Layout on the wire:
//!
//! ```text
//! version(0x03) | body | mac(8) | signature(64)
//! ```
//!
//! The body is a sequence of protobuf-style tagged fields:
//!
//! - `0x08`: message index (varint)
//! - `0x12`: ciphertext (varint length + bytes)
//!
//! The MAC covers `version | body`; the signature covers `version | body |
//! mac`, i.e. everything except the signature itself.

use super::{MAC_LENGTH, SIGNATURE_LENGTH};
use crate::{
    errors::{ProtocolError, Result},
    varint::{read_varint, varint_len, write_varint},
};

/// Tag of the message index field (field 1, wire type varint)
const MESSAGE_INDEX_TAG: u64 = 0x08;

/// Tag of the ciphertext field (field 2, wire type length-delimited)
const CIPHERTEXT_TAG: u64 = 0x12;

const WIRE_TYPE_VARINT: u8 = 0;
const WIRE_TYPE_LENGTH_DELIMITED: u8 = 2;

/// Decoded group message.
///
/// Only produced by [`GroupMessage::decode`], which guarantees both mandatory
/// fields were present on the wire. Structural validity says nothing about
/// authenticity: the MAC and signature must still be checked against the raw
/// bytes using [`GroupMessage::mac_input`] and [`GroupMessage::signing_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    /// Ratchet index the message was encrypted at
    pub message_index: u32,
    /// AES-CBC ciphertext
    pub ciphertext: Vec<u8>,
    /// Truncated HMAC over [`GroupMessage::mac_input`]
    pub mac: [u8; MAC_LENGTH],
    /// Ed25519 signature over [`GroupMessage::signing_data`]
    pub signature: [u8; SIGNATURE_LENGTH],
}

/// Body fields as found on the wire; presence is explicit per field.
#[derive(Debug, Default)]
struct RawBody {
    message_index: Option<u32>,
    ciphertext: Option<Vec<u8>>,
}

impl GroupMessage {
    /// Protocol version this codec speaks
    pub const VERSION: u8 = 0x03;

    /// Bytes after the body: MAC then signature
    pub const TRAILER_LENGTH: usize = MAC_LENGTH + SIGNATURE_LENGTH;

    /// Smallest possible well-formed message (version and trailer, empty body)
    pub const MIN_LENGTH: usize = 1 + Self::TRAILER_LENGTH;

    /// Encode `version | body` with room reserved for the trailer.
    ///
    /// The caller appends the MAC over the returned bytes, then the signature
    /// over everything written so far.
    pub fn encode_body(message_index: u32, ciphertext: &[u8]) -> Vec<u8> {
        let capacity = 1
            + varint_len(MESSAGE_INDEX_TAG)
            + varint_len(u64::from(message_index))
            + varint_len(CIPHERTEXT_TAG)
            + varint_len(ciphertext.len() as u64)
            + ciphertext.len()
            + Self::TRAILER_LENGTH;

        let mut out = Vec::with_capacity(capacity);
        out.push(Self::VERSION);
        write_varint(&mut out, MESSAGE_INDEX_TAG);
        write_varint(&mut out, u64::from(message_index));
        write_varint(&mut out, CIPHERTEXT_TAG);
        write_varint(&mut out, ciphertext.len() as u64);
        out.extend_from_slice(ciphertext);
        out
    }

    /// Decode a complete message.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::EmptyInput` for zero bytes
    /// - `ProtocolError::UnsupportedVersion` if the first byte is not 0x03,
    ///   regardless of what follows
    /// - `ProtocolError::BufferTooShort` if there is no room for the trailer
    /// - `ProtocolError::MissingField` if the index or ciphertext is absent
    /// - varint and wire-type errors for a malformed body
    pub fn decode(input: &[u8]) -> Result<Self> {
        let Some(&version) = input.first() else {
            return Err(ProtocolError::EmptyInput);
        };

        if version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion { expected: Self::VERSION, actual: version });
        }

        if input.len() < Self::MIN_LENGTH {
            return Err(ProtocolError::BufferTooShort {
                needed: Self::MIN_LENGTH,
                available: input.len(),
            });
        }

        let body_end = input.len() - Self::TRAILER_LENGTH;
        let body = parse_body(&input[1..body_end])?;

        let message_index = body.message_index.ok_or(ProtocolError::MissingField("message_index"))?;
        let ciphertext = body.ciphertext.ok_or(ProtocolError::MissingField("ciphertext"))?;

        let mut mac = [0u8; MAC_LENGTH];
        mac.copy_from_slice(&input[body_end..body_end + MAC_LENGTH]);

        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature.copy_from_slice(&input[body_end + MAC_LENGTH..]);

        Ok(Self { message_index, ciphertext, mac, signature })
    }

    /// Bytes authenticated by the MAC: the raw message minus the trailer.
    ///
    /// `raw` must be the buffer this message was decoded from.
    pub fn mac_input(raw: &[u8]) -> &[u8] {
        &raw[..raw.len().saturating_sub(Self::TRAILER_LENGTH)]
    }

    /// Bytes covered by the signature: the raw message minus the signature.
    ///
    /// `raw` must be the buffer this message was decoded from.
    pub fn signing_data(raw: &[u8]) -> &[u8] {
        &raw[..raw.len().saturating_sub(SIGNATURE_LENGTH)]
    }
}

fn parse_body(mut body: &[u8]) -> Result<RawBody> {
    let mut fields = RawBody::default();

    while !body.is_empty() {
        let (tag, tag_len) = read_varint(body)?;
        body = &body[tag_len..];

        match (tag & 0x07) as u8 {
            WIRE_TYPE_VARINT => {
                let (value, value_len) = read_varint(body)?;
                body = &body[value_len..];

                if tag == MESSAGE_INDEX_TAG {
                    let index = u32::try_from(value)
                        .map_err(|_| ProtocolError::OutOfRange { field: "message_index", value })?;
                    fields.message_index = Some(index);
                }
            },
            WIRE_TYPE_LENGTH_DELIMITED => {
                let (len, len_len) = read_varint(body)?;
                body = &body[len_len..];

                let available = body.len();
                let len = usize::try_from(len)
                    .ok()
                    .filter(|&len| len <= available)
                    .ok_or(ProtocolError::BufferTooShort { needed: len as usize, available })?;

                if tag == CIPHERTEXT_TAG {
                    fields.ciphertext = Some(body[..len].to_vec());
                }
                body = &body[len..];
            },
            other => return Err(ProtocolError::UnsupportedWireType(other)),
        }
    }

    Ok(fields)
}
