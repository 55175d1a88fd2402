//! Store-backed validator registry.
//!
//! Besides the record itself every validator has exactly one index entry:
//! active validators sit in the by-power index, inactive ones in the
//! by-inactive-time index.  All writes go through [`ValidatorRegistry::save`]
//! so the two never disagree with the record.

use {
    crate::{
        error::{StakingError, StakingResult},
        hooks::DelegationHooks,
        keys,
        store::{decode, get_object, set_object, KvStore, INDEX_MARKER},
        types::{Delegation, InactiveReason, Validator, ValidatorStatus},
    },
    log::*,
    solana_pubkey::Pubkey,
};

pub struct ValidatorRegistry<'a> {
    store: &'a mut dyn KvStore,
}

impl<'a> ValidatorRegistry<'a> {
    pub fn new(store: &'a mut dyn KvStore) -> Self {
        Self { store }
    }

    pub fn get_validator(&self, address: &Pubkey) -> StakingResult<Option<Validator>> {
        get_object(&*self.store, &keys::validator_key(address))
    }

    pub fn require_validator(&self, address: &Pubkey) -> StakingResult<Validator> {
        self.get_validator(address)?
            .ok_or(StakingError::ValidatorNotFound(*address))
    }

    pub fn create_validator(&mut self, validator: &Validator) -> StakingResult<()> {
        if self.get_validator(&validator.address)?.is_some() {
            return Err(StakingError::DuplicateAddress(validator.address));
        }
        debug!("creating validator {}", validator.address);
        self.save(None, validator)
    }

    pub fn set_validator_active(&mut self, address: &Pubkey, height: u64) -> StakingResult<()> {
        let old = self.require_validator(address)?;
        let new = Validator {
            status: ValidatorStatus::Active,
            inactive_reason: None,
            inactive_since: 0,
            inactive_height: 0,
            bond_height: height,
            ..old
        };
        self.save(Some(&old), &new)
    }

    pub fn set_validator_inactive(
        &mut self,
        address: &Pubkey,
        height: u64,
        time: i64,
        reason: InactiveReason,
    ) -> StakingResult<()> {
        let old = self.require_validator(address)?;
        let new = Validator {
            status: ValidatorStatus::Inactive,
            inactive_reason: Some(reason),
            inactive_since: time,
            inactive_height: height,
            ..old
        };
        self.save(Some(&old), &new)
    }

    pub fn add_bond_tokens(&mut self, address: &Pubkey, amount: u64) -> StakingResult<()> {
        let old = self.require_validator(address)?;
        let bond_tokens = old
            .bond_tokens
            .checked_add(amount)
            .ok_or(StakingError::ArithmeticOverflow)?;
        self.save(Some(&old), &Validator { bond_tokens, ..old })
    }

    pub fn sub_bond_tokens(&mut self, address: &Pubkey, amount: u64) -> StakingResult<()> {
        let old = self.require_validator(address)?;
        let bond_tokens = old.bond_tokens.checked_sub(amount).ok_or_else(|| {
            StakingError::invariant(format!(
                "validator {address} bonded total {} below {amount}",
                old.bond_tokens
            ))
        })?;
        self.save(Some(&old), &Validator { bond_tokens, ..old })
    }

    /// Delete the record and its index entry.
    pub fn remove_validator(&mut self, address: &Pubkey) -> StakingResult<()> {
        let validator = self.require_validator(address)?;
        self.delete_index(&validator);
        self.store.delete(&keys::validator_key(address));
        Ok(())
    }

    /// Active validators as `(power, address)`, power descending then
    /// address ascending.
    pub fn validators_by_power(&self) -> StakingResult<Vec<(u64, Pubkey)>> {
        self.store
            .iter_prefix(&keys::validator_by_power_prefix())
            .iter()
            .map(|(key, _)| keys::parse_validator_by_power_key(key))
            .collect()
    }

    /// Inactive validators whose `inactive_since` is at or before `cutoff`,
    /// oldest first.
    pub fn inactive_since_at_or_before(&self, cutoff: i64) -> StakingResult<Vec<Pubkey>> {
        let Ok(cutoff) = u64::try_from(cutoff) else {
            return Ok(Vec::new());
        };
        let mut expired = Vec::new();
        for (key, _) in self.store.iter_prefix(&keys::inactive_validator_prefix()) {
            let (since, address) = keys::parse_inactive_validator_key(&key)?;
            if since > cutoff {
                break;
            }
            expired.push(address);
        }
        Ok(expired)
    }

    /// Every validator record, ascending by address.
    pub fn iterate_validators(&self) -> StakingResult<Vec<Validator>> {
        self.store
            .iter_prefix(&[keys::VALIDATOR_PREFIX])
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    fn save(&mut self, old: Option<&Validator>, new: &Validator) -> StakingResult<()> {
        if let Some(old) = old {
            self.delete_index(old);
        }
        let index_key = match new.status {
            ValidatorStatus::Active => keys::validator_by_power_key(new.power(), &new.address),
            ValidatorStatus::Inactive => {
                keys::inactive_validator_key(new.inactive_since, &new.address)
            }
        };
        self.store.set(index_key, INDEX_MARKER.to_vec());
        set_object(self.store, keys::validator_key(&new.address), new)
    }

    fn delete_index(&mut self, validator: &Validator) {
        let index_key = match validator.status {
            ValidatorStatus::Active => {
                keys::validator_by_power_key(validator.power(), &validator.address)
            }
            ValidatorStatus::Inactive => {
                keys::inactive_validator_key(validator.inactive_since, &validator.address)
            }
        };
        self.store.delete(&index_key);
    }
}

/// Keeps each validator's bonded total equal to the sum of its delegations.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryHooks;

impl DelegationHooks for RegistryHooks {
    fn after_delegation_created(
        &mut self,
        store: &mut dyn KvStore,
        validator: &Pubkey,
        delegator: &Pubkey,
    ) -> StakingResult<()> {
        let delegation: Delegation =
            get_object(&*store, &keys::delegation_key(delegator, validator))?.ok_or_else(|| {
                StakingError::invariant(format!(
                    "created delegation {delegator}->{validator} missing"
                ))
            })?;
        ValidatorRegistry::new(store).add_bond_tokens(validator, delegation.amount)
    }

    fn before_delegation_modified(
        &mut self,
        store: &mut dyn KvStore,
        validator: &Pubkey,
        delegator: &Pubkey,
        new_amount: u64,
    ) -> StakingResult<()> {
        let old_amount =
            get_object::<Delegation>(&*store, &keys::delegation_key(delegator, validator))?
                .map_or(0, |delegation| delegation.amount);
        let mut registry = ValidatorRegistry::new(store);
        if new_amount >= old_amount {
            registry.add_bond_tokens(validator, new_amount.saturating_sub(old_amount))
        } else {
            registry.sub_bond_tokens(validator, old_amount.saturating_sub(new_amount))
        }
    }
}
