//! Megolm group sessions.
//!
//! ```text
//! MegolmOutboundSession ── session_key() ──► MegolmInboundSession
//!          │                                        ▲
//!          └──────── encrypt() → group message ─────┘ decrypt()
//! ```

mod inbound;
mod outbound;

pub use inbound::MegolmInboundSession;
pub use outbound::MegolmOutboundSession;
