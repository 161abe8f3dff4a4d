//! Wire messages exchanged around a Megolm group session.
//!
//! - [`SessionSharingMessage`]: signed ratchet snapshot that starts a session
//! - [`SessionExportMessage`]: unsigned snapshot for backup and transfer
//! - [`GroupMessage`]: one encrypted, MACed and signed group event

pub mod group;
pub mod session;

pub use group::GroupMessage;
pub use session::{SessionExportMessage, SessionSharingMessage};

/// Length of the concatenated Megolm ratchet parts (4 x 32 bytes)
pub const RATCHET_LENGTH: usize = 128;

/// Length of an Ed25519 public key
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of an Ed25519 signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of the truncated HMAC carried by group messages
pub const MAC_LENGTH: usize = 8;
