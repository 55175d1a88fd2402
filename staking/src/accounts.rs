//! Account ledger collaborator.
//!
//! Balances are owned by the host's bank module; staking only debits on
//! bond and credits on payout.

use {
    crate::error::{StakingError, StakingResult},
    solana_pubkey::Pubkey,
    std::collections::HashMap,
};

pub trait AccountLedger {
    fn balance(&self, account: &Pubkey) -> u64;

    /// Fails with `InsufficientBalance` without touching the balance.
    fn debit(&mut self, account: &Pubkey, amount: u64) -> StakingResult<()>;

    fn credit(&mut self, account: &Pubkey, amount: u64) -> StakingResult<()>;
}

/// In-memory account ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemAccounts {
    balances: HashMap<Pubkey, u64>,
}

impl MemAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: impl IntoIterator<Item = (Pubkey, u64)>) -> Self {
        Self {
            balances: balances.into_iter().collect(),
        }
    }

    /// Sum of every balance.
    pub fn total(&self) -> u128 {
        self.balances.values().map(|&balance| u128::from(balance)).sum()
    }
}

impl AccountLedger for MemAccounts {
    fn balance(&self, account: &Pubkey) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn debit(&mut self, account: &Pubkey, amount: u64) -> StakingResult<()> {
        let available = self.balance(account);
        let remaining = available
            .checked_sub(amount)
            .ok_or(StakingError::InsufficientBalance {
                account: *account,
                required: amount,
                available,
            })?;
        self.balances.insert(*account, remaining);
        Ok(())
    }

    fn credit(&mut self, account: &Pubkey, amount: u64) -> StakingResult<()> {
        let balance = self.balances.entry(*account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow)?;
        Ok(())
    }
}
