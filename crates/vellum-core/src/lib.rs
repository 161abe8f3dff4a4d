//! Vellum Core
//!
//! Olm accounts and Megolm group sessions with persisted state that is
//! byte-compatible with libolm pickles.
//!
//! # Components
//!
//! - [`MegolmInboundSession`]: receives group messages, with dual-ratchet
//!   lookup for out-of-order indices
//! - [`MegolmOutboundSession`]: encrypts group messages and produces the
//!   session key shared with recipients
//! - [`Account`] / [`OlmAccount`]: identity keys, one-time and fallback keys
//! - [`AccountFactory`]: explicit construction seam for generic callers
//! - [`OlmError`] / [`ErrorKind`]: error taxonomy shared by all of the above
//!
//! # Persistence
//!
//! Every entity pickles two ways, both sealed with the same AES-CBC +
//! HMAC envelope under the caller's key:
//!
//! - binary: the libolm layout, versioned per entity
//! - JSON: `version_byte | JSON`, with its own version numbering
//!
//! # Concurrency
//!
//! Sessions and accounts are plain values. Mutation goes through
//! `&mut self`; callers that share a session across threads wrap it in
//! their own lock.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod account;
pub mod error;
pub mod megolm;
mod pickle;

pub use account::{
    Account, IdentityKeys, MAX_ONE_TIME_KEYS, OlmAccount,
    factory::{AccountFactory, LibOlmAccountFactory},
};
pub use error::{ErrorKind, OlmError, Result};
pub use megolm::{MegolmInboundSession, MegolmOutboundSession};
