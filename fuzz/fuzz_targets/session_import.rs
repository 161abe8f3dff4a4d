//! Fuzz target for inbound session import
//!
//! Feeds arbitrary bytes to both import paths, raw and base64-wrapped.
//!
//! # Invariants
//!
//! - Import never panics
//! - Imported shares are verified, imported exports are not
//! - Live and first known index start equal

#![no_main]

use libfuzzer_sys::fuzz_target;
use vellum_core::MegolmInboundSession;
use vellum_proto::encode_base64;

fn check(input: &[u8]) {
    if let Ok(session) = MegolmInboundSession::from_session_share(input) {
        assert!(session.is_verified());
        assert_eq!(session.first_known_index(), session.live_index());
    }

    if let Ok(session) = MegolmInboundSession::from_export(input) {
        assert!(!session.is_verified());
        assert_eq!(session.first_known_index(), session.live_index());
    }
}

fuzz_target!(|data: &[u8]| {
    check(data);
    check(encode_base64(data).as_bytes());
});
