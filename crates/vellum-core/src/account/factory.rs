//! Construction seam for accounts.
//!
//! Generic code holds an `&dyn AccountFactory` and receives
//! `Box<dyn OlmAccount>` values. The factory is passed in explicitly;
//! nothing is registered globally.

use rand_core::CryptoRngCore;

use super::{Account, OlmAccount};
use crate::error::Result;

/// Exactly three ways to obtain an account.
pub trait AccountFactory {
    /// Account with fresh identity keys.
    fn new_account(&self, rng: &mut dyn CryptoRngCore) -> Box<dyn OlmAccount>;

    /// Placeholder account, meant to be filled by [`OlmAccount::unpickle`].
    fn blank_account(&self) -> Box<dyn OlmAccount>;

    /// Account restored from a binary pickle.
    fn account_from_pickle(&self, pickled: &[u8], key: &[u8]) -> Result<Box<dyn OlmAccount>>;
}

/// Factory producing libolm-compatible [`Account`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibOlmAccountFactory;

impl AccountFactory for LibOlmAccountFactory {
    fn new_account(&self, rng: &mut dyn CryptoRngCore) -> Box<dyn OlmAccount> {
        Box::new(Account::new(rng))
    }

    fn blank_account(&self) -> Box<dyn OlmAccount> {
        Box::new(Account::default())
    }

    fn account_from_pickle(&self, pickled: &[u8], key: &[u8]) -> Result<Box<dyn OlmAccount>> {
        Ok(Box::new(Account::from_pickle(pickled, key)?))
    }
}
