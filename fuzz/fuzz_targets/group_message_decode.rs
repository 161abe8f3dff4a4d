//! Fuzz target for GroupMessage::decode
//!
//! Arbitrary bytes must decode or fail with an error, never panic. Any
//! message that decodes must survive re-encoding with the same trailer.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vellum_proto::GroupMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = GroupMessage::decode(data) else {
        return;
    };

    assert_eq!(GroupMessage::mac_input(data).len() + GroupMessage::TRAILER_LENGTH, data.len());

    let mut reencoded = GroupMessage::encode_body(message.message_index, &message.ciphertext);
    reencoded.extend_from_slice(&message.mac);
    reencoded.extend_from_slice(&message.signature);

    let Ok(again) = GroupMessage::decode(&reencoded) else {
        panic!("re-encoded message failed to decode");
    };
    assert_eq!(again, message);
});
