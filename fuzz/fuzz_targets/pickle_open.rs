//! Fuzz target for pickle loading
//!
//! Arbitrary blobs and keys go through every unpickle entry
//! point. Corrupt or forged input must be rejected with an error, and a
//! failed in-place unpickle must leave the session untouched.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vellum_core::{AccountFactory, LibOlmAccountFactory, MegolmInboundSession, MegolmOutboundSession};
use vellum_crypto::{Ed25519PublicKey, Ratchet};
use vellum_proto::encode_base64;

#[derive(Debug, Arbitrary)]
struct PickleInput {
    key: Vec<u8>,
    blob: Vec<u8>,
}

fuzz_target!(|input: PickleInput| {
    let PickleInput { key, blob } = input;

    let _ = MegolmInboundSession::from_pickle(&blob, &key);
    let _ = MegolmInboundSession::unpickle_json(&blob, &key);
    let _ = MegolmOutboundSession::from_pickle(&blob, &key);
    let _ = MegolmOutboundSession::unpickle_json(&blob, &key);

    let factory = LibOlmAccountFactory;
    let _ = factory.account_from_pickle(&blob, &key);
    let mut account = factory.blank_account();
    let _ = account.unpickle_json(&blob, &key);

    let export = Ratchet::new(0, [0; 128]).session_export_message(Ed25519PublicKey::from_bytes([0; 32]));
    let Ok(mut session) = MegolmInboundSession::from_export(encode_base64(export.as_bytes()).as_bytes()) else {
        return;
    };
    let before = session.clone();
    if session.unpickle(&blob, &key).is_err() {
        assert_eq!(session, before);
    }
});
