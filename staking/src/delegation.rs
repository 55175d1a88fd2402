//! Delegation ledger.
//!
//! Tracks bonded delegations and the two height-indexed exit queues
//! (unbondings and redelegations).  Each delegation is stored under
//! delegator+validator with a validator+delegator marker; each queue entry is
//! stored under the three orderings of [`QueueKeys`].  Every write path
//! updates all views before returning, and the host's block-level rollback
//! covers a failure between them.
//!
//! Validator bonded totals are not touched here.  The ledger reports changes
//! through [`DelegationHooks`] and nothing else.

use {
    crate::{
        accounts::AccountLedger,
        error::{StakingError, StakingResult},
        hooks::DelegationHooks,
        keys::{self, QueueEntryId, QueueKeys, REDELEGATION_KEYS, UNBONDING_KEYS},
        registry::RegistryHooks,
        store::{decode, get_object, set_object, KvStore, INDEX_MARKER},
        types::{Delegation, RedelegationInfo, UnbondingDelegation},
    },
    borsh::{BorshDeserialize, BorshSerialize},
    log::*,
    solana_pubkey::Pubkey,
};

/// A record living in one of the height-indexed exit queues.
pub trait QueueEntry: Copy + BorshSerialize + BorshDeserialize {
    const KEYS: QueueKeys;

    fn delegator(&self) -> &Pubkey;
    /// The validator the entry is slashable at.
    fn validator(&self) -> &Pubkey;
    /// Height at which the stake left the validator.
    fn start_height(&self) -> u64;
    fn complete_height(&self) -> u64;
    fn amount(&self) -> u64;
    fn set_amount(&mut self, amount: u64);

    /// Destination validator, for entries that move stake elsewhere.
    fn target(&self) -> Option<&Pubkey> {
        None
    }

    fn id(&self) -> QueueEntryId {
        QueueEntryId {
            complete_height: self.complete_height(),
            delegator: *self.delegator(),
            validator: *self.validator(),
            target: self.target().copied(),
        }
    }
}

impl QueueEntry for UnbondingDelegation {
    const KEYS: QueueKeys = UNBONDING_KEYS;

    fn delegator(&self) -> &Pubkey {
        &self.delegator
    }
    fn validator(&self) -> &Pubkey {
        &self.validator
    }
    fn start_height(&self) -> u64 {
        self.height
    }
    fn complete_height(&self) -> u64 {
        self.complete_height
    }
    fn amount(&self) -> u64 {
        self.amount
    }
    fn set_amount(&mut self, amount: u64) {
        self.amount = amount;
    }
}

impl QueueEntry for RedelegationInfo {
    const KEYS: QueueKeys = REDELEGATION_KEYS;

    fn delegator(&self) -> &Pubkey {
        &self.delegator
    }
    fn validator(&self) -> &Pubkey {
        &self.from_validator
    }
    fn target(&self) -> Option<&Pubkey> {
        Some(&self.to_validator)
    }
    fn start_height(&self) -> u64 {
        self.height
    }
    fn complete_height(&self) -> u64 {
        self.complete_height
    }
    fn amount(&self) -> u64 {
        self.amount
    }
    fn set_amount(&mut self, amount: u64) {
        self.amount = amount;
    }
}

pub struct DelegationLedger<'a, H: DelegationHooks = RegistryHooks> {
    store: &'a mut dyn KvStore,
    hooks: H,
}

impl<'a> DelegationLedger<'a> {
    /// Ledger wired to the validator registry.
    pub fn new(store: &'a mut dyn KvStore) -> Self {
        Self::with_hooks(store, RegistryHooks)
    }
}

impl<'a, H: DelegationHooks> DelegationLedger<'a, H> {
    pub fn with_hooks(store: &'a mut dyn KvStore, hooks: H) -> Self {
        Self { store, hooks }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    // -----------------------------------------------------------------------
    // Delegations
    // -----------------------------------------------------------------------

    pub fn get_delegation(
        &self,
        delegator: &Pubkey,
        validator: &Pubkey,
    ) -> StakingResult<Option<Delegation>> {
        get_object(&*self.store, &keys::delegation_key(delegator, validator))
    }

    /// Write both views of a delegation.  Does not notify hooks.
    pub fn set_delegation(&mut self, delegation: &Delegation) -> StakingResult<()> {
        if delegation.amount == 0 {
            return Err(StakingError::invariant(format!(
                "zero-amount delegation {}->{}",
                delegation.delegator, delegation.validator
            )));
        }
        set_object(
            self.store,
            keys::delegation_key(&delegation.delegator, &delegation.validator),
            delegation,
        )?;
        self.store.set(
            keys::delegation_by_validator_key(&delegation.validator, &delegation.delegator),
            INDEX_MARKER.to_vec(),
        );
        Ok(())
    }

    /// Delete both views of a delegation.  Does not notify hooks.
    pub fn remove_delegation(&mut self, delegator: &Pubkey, validator: &Pubkey) {
        self.store.delete(&keys::delegation_key(delegator, validator));
        self.store
            .delete(&keys::delegation_by_validator_key(validator, delegator));
    }

    /// Bond `info.amount` from `info.delegator` to `info.validator`.
    ///
    /// Stake arriving from a matured redelegation is already detached from
    /// the delegator's account and is not debited again.
    pub fn delegate(
        &mut self,
        accounts: &mut dyn AccountLedger,
        info: &Delegation,
        from_redelegation: bool,
    ) -> StakingResult<()> {
        if !from_redelegation {
            accounts.debit(&info.delegator, info.amount)?;
        }
        if info.amount == 0 {
            return Ok(());
        }

        match self.get_delegation(&info.delegator, &info.validator)? {
            None => {
                self.set_delegation(info)?;
                self.hooks
                    .after_delegation_created(self.store, &info.validator, &info.delegator)?;
                debug!(
                    "delegation created: {} -> {} amount {}",
                    info.delegator, info.validator, info.amount
                );
            }
            Some(existing) => {
                let amount = existing
                    .amount
                    .checked_add(info.amount)
                    .ok_or(StakingError::ArithmeticOverflow)?;
                // Listeners read the stored (old) amount, so notify first.
                self.hooks.before_delegation_modified(
                    self.store,
                    &info.validator,
                    &info.delegator,
                    amount,
                )?;
                self.set_delegation(&Delegation {
                    amount,
                    is_compound: info.is_compound,
                    ..existing
                })?;
                debug!(
                    "delegation modified: {} -> {} amount {}",
                    info.delegator, info.validator, amount
                );
            }
        }
        Ok(())
    }

    /// Move `amount` of `delegation` into the unbonding queue, completing at
    /// `height + unbond_frozen_height`.
    ///
    /// `amount <= delegation.amount` is the caller's precondition; breaking
    /// it is an invariant violation.
    pub fn unbond_tokens(
        &mut self,
        delegation: &Delegation,
        amount: u64,
        height: u64,
        unbond_frozen_height: u64,
    ) -> StakingResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.reduce_delegation(delegation, amount)?;

        let complete_height = height
            .checked_add(unbond_frozen_height)
            .ok_or(StakingError::ArithmeticOverflow)?;
        let unbonding = self.add_queue_entry(UnbondingDelegation {
            delegator: delegation.delegator,
            validator: delegation.validator,
            amount,
            height,
            complete_height,
        })?;
        debug!(
            "unbonded {amount} of {} -> {}, {} pending until {complete_height}",
            delegation.delegator, delegation.validator, unbonding.amount
        );
        Ok(())
    }

    /// Source side of a redelegation: reduce the delegation at
    /// `info.from_validator` and queue `info`.  The destination is bonded
    /// when the entry matures.
    pub fn redelegate(
        &mut self,
        delegation: &Delegation,
        info: &RedelegationInfo,
    ) -> StakingResult<()> {
        if info.delegator != delegation.delegator || info.from_validator != delegation.validator {
            return Err(StakingError::invariant(format!(
                "redelegation {}->{} does not match delegation {}->{}",
                info.delegator, info.from_validator, delegation.delegator, delegation.validator
            )));
        }
        if info.amount == 0 {
            return Ok(());
        }
        self.reduce_delegation(delegation, info.amount)?;
        self.add_queue_entry(*info)?;
        debug!(
            "redelegated {} of {} from {} to {}, completes at {}",
            info.amount,
            info.delegator,
            info.from_validator,
            info.to_validator,
            info.complete_height
        );
        Ok(())
    }

    /// Take `amount` from a bonded delegation, notifying hooks first and
    /// deleting the record when nothing is left.
    pub(crate) fn reduce_delegation(
        &mut self,
        delegation: &Delegation,
        amount: u64,
    ) -> StakingResult<()> {
        let remaining = delegation.amount.checked_sub(amount).ok_or_else(|| {
            StakingError::invariant(format!(
                "cannot take {amount} from delegation {}->{} holding {}",
                delegation.delegator, delegation.validator, delegation.amount
            ))
        })?;
        self.hooks.before_delegation_modified(
            self.store,
            &delegation.validator,
            &delegation.delegator,
            remaining,
        )?;
        if remaining == 0 {
            self.remove_delegation(&delegation.delegator, &delegation.validator);
        } else {
            self.set_delegation(&Delegation {
                amount: remaining,
                ..*delegation
            })?;
        }
        Ok(())
    }

    /// Delegations held by `validator`, ascending by delegator.
    pub fn delegations_by_validator(&self, validator: &Pubkey) -> StakingResult<Vec<Delegation>> {
        let mut delegations = Vec::new();
        for (key, _) in self
            .store
            .iter_prefix(&keys::validator_delegations_prefix(validator))
        {
            let (validator, delegator) = keys::parse_delegation_by_validator_key(&key)?;
            let delegation = self
                .get_delegation(&delegator, &validator)?
                .ok_or_else(|| {
                    StakingError::invariant(format!(
                        "dangling delegation index {delegator}->{validator}"
                    ))
                })?;
            delegations.push(delegation);
        }
        Ok(delegations)
    }

    /// Delegations of `delegator`, ascending by validator.
    pub fn delegations_by_delegator(&self, delegator: &Pubkey) -> StakingResult<Vec<Delegation>> {
        self.store
            .iter_prefix(&keys::delegator_delegations_prefix(delegator))
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Every delegation, ascending by delegator then validator.
    pub fn iterate_delegations(&self) -> StakingResult<Vec<Delegation>> {
        self.store
            .iter_prefix(&[keys::DELEGATION_PREFIX])
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Exit queues
    // -----------------------------------------------------------------------

    pub fn get_queue_entry<E: QueueEntry>(&self, id: &QueueEntryId) -> StakingResult<Option<E>> {
        get_object(&*self.store, &E::KEYS.by_height(id)?)
    }

    /// Write all three views of `entry`.
    pub fn set_queue_entry<E: QueueEntry>(&mut self, entry: &E) -> StakingResult<()> {
        let id = entry.id();
        set_object(self.store, E::KEYS.by_height(&id)?, entry)?;
        self.store.set(E::KEYS.by_delegator(&id)?, INDEX_MARKER.to_vec());
        self.store.set(E::KEYS.by_validator(&id)?, INDEX_MARKER.to_vec());
        Ok(())
    }

    /// Add `entry`, merging its amount into an existing entry with the same
    /// id.  The existing entry keeps its other fields.  Returns the stored
    /// entry.
    pub fn add_queue_entry<E: QueueEntry>(&mut self, entry: E) -> StakingResult<E> {
        let stored = match self.get_queue_entry::<E>(&entry.id())? {
            Some(mut existing) => {
                let merged = existing
                    .amount()
                    .checked_add(entry.amount())
                    .ok_or(StakingError::ArithmeticOverflow)?;
                existing.set_amount(merged);
                existing
            }
            None => entry,
        };
        self.set_queue_entry(&stored)?;
        Ok(stored)
    }

    /// Delete all three views.
    pub fn remove_queue_entry<E: QueueEntry>(&mut self, id: &QueueEntryId) -> StakingResult<()> {
        self.store.delete(&E::KEYS.by_height(id)?);
        self.store.delete(&E::KEYS.by_delegator(id)?);
        self.store.delete(&E::KEYS.by_validator(id)?);
        Ok(())
    }

    /// Whole queue, ascending by completion height.
    pub fn iterate_queue<E: QueueEntry>(&self) -> StakingResult<Vec<E>> {
        self.store
            .iter_prefix(&E::KEYS.queue_prefix())
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Entries of `delegator`, ascending by completion height.
    pub fn queue_by_delegator<E: QueueEntry>(&self, delegator: &Pubkey) -> StakingResult<Vec<E>> {
        let mut entries = Vec::new();
        for (key, _) in self.store.iter_prefix(&E::KEYS.delegator_prefix(delegator)) {
            let id = E::KEYS.parse_by_delegator(&key)?;
            entries.extend(self.get_queue_entry::<E>(&id)?);
        }
        Ok(entries)
    }

    /// Entries slashable at `validator`, ascending by completion height.
    pub fn queue_by_validator<E: QueueEntry>(&self, validator: &Pubkey) -> StakingResult<Vec<E>> {
        let mut entries = Vec::new();
        for (key, _) in self.store.iter_prefix(&E::KEYS.validator_prefix(validator)) {
            let id = E::KEYS.parse_by_validator(&key)?;
            entries.extend(self.get_queue_entry::<E>(&id)?);
        }
        Ok(entries)
    }

    /// Entries with `complete_height <= height`, removed from the queue.
    fn take_matured<E: QueueEntry>(&mut self, height: u64) -> StakingResult<Vec<E>> {
        let mut matured = Vec::new();
        for (key, value) in self.store.iter_prefix(&E::KEYS.queue_prefix()) {
            if E::KEYS.parse_by_height(&key)?.complete_height > height {
                break;
            }
            matured.push(decode::<E>(&value)?);
        }
        for entry in &matured {
            self.remove_queue_entry::<E>(&entry.id())?;
        }
        Ok(matured)
    }

    pub fn unbondings_by_delegator(
        &self,
        delegator: &Pubkey,
    ) -> StakingResult<Vec<UnbondingDelegation>> {
        self.queue_by_delegator(delegator)
    }

    pub fn unbondings_by_validator(
        &self,
        validator: &Pubkey,
    ) -> StakingResult<Vec<UnbondingDelegation>> {
        self.queue_by_validator(validator)
    }

    pub fn redelegations_by_delegator(
        &self,
        delegator: &Pubkey,
    ) -> StakingResult<Vec<RedelegationInfo>> {
        self.queue_by_delegator(delegator)
    }

    pub fn redelegations_by_from_validator(
        &self,
        validator: &Pubkey,
    ) -> StakingResult<Vec<RedelegationInfo>> {
        self.queue_by_validator(validator)
    }

    /// Pay out every unbonding due at or before `height`.
    pub fn complete_unbondings(
        &mut self,
        accounts: &mut dyn AccountLedger,
        height: u64,
    ) -> StakingResult<Vec<UnbondingDelegation>> {
        let matured = self.take_matured::<UnbondingDelegation>(height)?;
        for unbonding in &matured {
            accounts.credit(&unbonding.delegator, unbonding.amount)?;
            debug!(
                "unbonding of {} from {} completed: {} returned",
                unbonding.delegator, unbonding.validator, unbonding.amount
            );
        }
        Ok(matured)
    }

    /// Remove and return every redelegation due at or before `height`.
    /// The caller bonds each one to its destination.
    pub fn take_matured_redelegations(
        &mut self,
        height: u64,
    ) -> StakingResult<Vec<RedelegationInfo>> {
        self.take_matured(height)
    }
}
