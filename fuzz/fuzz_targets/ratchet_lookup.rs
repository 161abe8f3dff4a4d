//! Fuzz target for inbound ratchet lookup
//!
//! Random sequences of lookups and exports against one inbound session.
//!
//! # Invariants
//!
//! - The live index never moves backwards
//! - Lookups return a ratchet at exactly the requested index
//! - Indices before the first known index are always unavailable
//! - advance_to matches stepping one message at a time

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vellum_core::{ErrorKind, MegolmInboundSession};
use vellum_crypto::{Ed25519KeyPair, Ratchet, is_at_or_ahead};
use vellum_proto::encode_base64;

#[derive(Debug, Arbitrary)]
struct Scenario {
    start: u32,
    data: [u8; 32],
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    /// Look up `start + offset`, offset kept below 2^30
    Lookup { offset: u32 },
    /// Look up `start - back`
    Behind { back: u16 },
    /// Export at `live + offset`
    Export { offset: u16 },
    /// Compare a short jump with single steps
    Step { count: u8 },
}

fuzz_target!(|scenario: Scenario| {
    let mut data = [0u8; 128];
    for chunk in data.chunks_mut(32) {
        chunk.copy_from_slice(&scenario.data);
    }
    let signing_key = Ed25519KeyPair::from_seed(&scenario.data);
    let share = Ratchet::new(scenario.start, data).session_sharing_message(&signing_key);
    let Ok(mut session) = MegolmInboundSession::from_session_share(encode_base64(share.as_bytes()).as_bytes())
    else {
        panic!("freshly signed share rejected");
    };

    for operation in scenario.operations.into_iter().take(32) {
        let live_before = session.live_index();

        match operation {
            Operation::Lookup { offset } => {
                let target = scenario.start.wrapping_add(offset % (1 << 30));
                let Ok(ratchet) = session.get_ratchet(target) else {
                    panic!("index after first known was unavailable");
                };
                assert_eq!(ratchet.counter(), target);
            },
            Operation::Behind { back } => {
                if back == 0 {
                    continue;
                }
                let target = scenario.start.wrapping_sub(u32::from(back));
                let Err(err) = session.get_ratchet(target) else {
                    panic!("index before first known was available");
                };
                assert_eq!(err.kind(), ErrorKind::RatchetNotAvailable);
            },
            Operation::Export { offset } => {
                let target = session.live_index().wrapping_add(u32::from(offset));
                let _ = session.export(target);
            },
            Operation::Step { count } => {
                let mut jumped = Ratchet::new(scenario.start, data);
                let mut stepped = jumped.clone();
                let target = scenario.start.wrapping_add(u32::from(count));
                let Ok(()) = jumped.advance_to(target) else {
                    panic!("forward jump rejected");
                };
                for _ in 0..count {
                    stepped.advance();
                }
                assert_eq!(jumped, stepped);
            },
        }

        assert!(is_at_or_ahead(session.live_index(), live_before));
    }
});
