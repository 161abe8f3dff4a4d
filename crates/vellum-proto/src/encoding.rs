//! Base64 as used by every Olm textual encoding.
//!
//! Output is unpadded standard alphabet. Input is accepted with or without
//! trailing `=` so blobs produced by padding-happy tooling still load.

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

use crate::errors::Result;

const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as unpadded standard base64.
pub fn encode_base64(input: impl AsRef<[u8]>) -> String {
    ENGINE.encode(input)
}

/// Decode standard base64, padded or not.
pub fn decode_base64(input: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    Ok(ENGINE.decode(input)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;

    #[test]
    fn encodes_without_padding() {
        assert_eq!(encode_base64(b"a"), "YQ");
        assert_eq!(encode_base64(b"ab"), "YWI");
        assert_eq!(encode_base64(b"abc"), "YWJj");
    }

    #[test]
    fn decodes_padded_and_unpadded() {
        assert_eq!(decode_base64("YQ").unwrap(), b"a");
        assert_eq!(decode_base64("YQ==").unwrap(), b"a");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode_base64("!!!"), Err(ProtocolError::InvalidBase64(_))));
    }
}
