//! Notifications from the delegation ledger to whoever tracks validator
//! bonded totals.
//!
//! The ledger only knows this trait, never the registry type.  Hooks get the
//! store so they can read the pre-commit state the ledger has not yet
//! overwritten.

use {
    crate::{error::StakingResult, store::KvStore},
    solana_pubkey::Pubkey,
};

pub trait DelegationHooks {
    /// Called after a new delegation record has been persisted.
    fn after_delegation_created(
        &mut self,
        store: &mut dyn KvStore,
        validator: &Pubkey,
        delegator: &Pubkey,
    ) -> StakingResult<()>;

    /// Called before an existing delegation is overwritten with
    /// `new_amount`.  The stored record still holds the old amount.
    fn before_delegation_modified(
        &mut self,
        store: &mut dyn KvStore,
        validator: &Pubkey,
        delegator: &Pubkey,
        new_amount: u64,
    ) -> StakingResult<()>;
}
