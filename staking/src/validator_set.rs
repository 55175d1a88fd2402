//! End-of-block validator set selection.
//!
//! Ranks active validators by power, keeps the first `max_validator_count`,
//! deactivates the rest and diffs the result against the set committed at the
//! previous block.  The previous set lives under a single snapshot key that
//! only this module reads or writes.

use {
    crate::{
        config::StakingParams,
        error::StakingResult,
        keys::LAST_VALIDATOR_SET_KEY,
        registry::ValidatorRegistry,
        store::{get_object, set_object, KvStore},
        types::{BlockContext, InactiveReason, ValidatorUpdate},
    },
    log::*,
    solana_pubkey::Pubkey,
    std::collections::{BTreeMap, BTreeSet},
};

pub struct ValidatorSetSelector<'a> {
    store: &'a mut dyn KvStore,
    params: &'a StakingParams,
}

impl<'a> ValidatorSetSelector<'a> {
    pub fn new(store: &'a mut dyn KvStore, params: &'a StakingParams) -> Self {
        Self { store, params }
    }

    /// Set committed by the previous call to [`Self::select`], in rank order.
    pub fn last_validator_set(&self) -> StakingResult<Vec<ValidatorUpdate>> {
        Ok(get_object(&*self.store, LAST_VALIDATOR_SET_KEY)?.unwrap_or_default())
    }

    /// Select this block's set and return the updates for consensus.
    ///
    /// Updates list new or re-powered members in rank order, followed by
    /// zero-power removals in the previous set's order.  Active validators
    /// without power are neither selected nor evicted.
    pub fn select(&mut self, ctx: &BlockContext) -> StakingResult<Vec<ValidatorUpdate>> {
        let last_set = self.last_validator_set()?;
        let last_power: BTreeMap<Pubkey, u64> = last_set
            .iter()
            .map(|member| (member.address, member.power))
            .collect();
        let cap = usize::try_from(self.params.max_validator_count).unwrap_or(usize::MAX);

        let mut registry = ValidatorRegistry::new(self.store);
        let mut new_set = Vec::new();
        let mut updates = Vec::new();
        for (power, address) in registry.validators_by_power()? {
            if power == 0 {
                continue;
            }
            if new_set.len() >= cap {
                info!(
                    "validator {address} (power {power}) deactivated at height {}: \
                     exceeds max validator count {}",
                    ctx.height, self.params.max_validator_count
                );
                registry.set_validator_inactive(
                    &address,
                    ctx.height,
                    ctx.time,
                    InactiveReason::MaxValidatorCount,
                )?;
                continue;
            }
            let member = ValidatorUpdate { address, power };
            if last_power.get(&address) != Some(&power) {
                updates.push(member);
            }
            new_set.push(member);
        }

        let selected: BTreeSet<Pubkey> = new_set.iter().map(|member| member.address).collect();
        updates.extend(
            last_set
                .iter()
                .filter(|member| !selected.contains(&member.address))
                .map(|member| ValidatorUpdate {
                    address: member.address,
                    power: 0,
                }),
        );

        set_object(self.store, LAST_VALIDATOR_SET_KEY.to_vec(), &new_set)?;
        info!(
            "height {}: {} validators selected, {} updates",
            ctx.height,
            new_set.len(),
            updates.len()
        );
        Ok(updates)
    }
}
