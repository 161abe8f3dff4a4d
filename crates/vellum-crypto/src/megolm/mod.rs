//! Megolm group ratchet

mod ratchet;

pub use ratchet::{RATCHET_PART_LENGTH, RATCHET_PARTS, Ratchet, is_at_or_ahead};
