//! Slashing engine.
//!
//! A penalty is a fraction (bps) of what was bonded at the infraction
//! height: the validator's current bond plus the exit-queue entries that left
//! it at or after that height.  Queued stake pays first, then the current
//! delegations.  Every per-entry penalty is `floor(fraction * amount)`, so
//! rounding always favours the delegator and each position loses the same
//! fraction.

use {
    crate::{
        config::BPS_DENOMINATOR,
        delegation::{DelegationLedger, QueueEntry},
        error::{StakingError, StakingResult},
        registry::ValidatorRegistry,
        store::KvStore,
        types::{RedelegationInfo, UnbondingDelegation},
    },
    log::*,
    solana_pubkey::Pubkey,
};

/// `floor(amount * bps / 10_000)`.
pub fn mul_bps(amount: u64, bps: u64) -> StakingResult<u64> {
    let product = u128::from(amount)
        .checked_mul(u128::from(bps))
        .ok_or(StakingError::ArithmeticOverflow)?;
    let quotient = product
        .checked_div(u128::from(BPS_DENOMINATOR))
        .ok_or(StakingError::ArithmeticOverflow)?;
    u64::try_from(quotient).map_err(|_| StakingError::ArithmeticOverflow)
}

/// Amounts removed by [`SlashingEngine::slash_validator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlashOutcome {
    /// Stake held at the infraction height.
    pub slashable_stake: u64,
    /// Budget: `floor(fraction * slashable_stake)`.
    pub max_slash: u64,
    pub from_unbondings: u64,
    pub from_redelegations: u64,
    pub from_bonded: u64,
    /// Budget left after every source was charged.
    pub remaining: u64,
}

impl SlashOutcome {
    pub fn total_slashed(&self) -> u64 {
        self.from_unbondings
            .saturating_add(self.from_redelegations)
            .saturating_add(self.from_bonded)
    }
}

pub struct SlashingEngine<'a> {
    store: &'a mut dyn KvStore,
}

impl<'a> SlashingEngine<'a> {
    pub fn new(store: &'a mut dyn KvStore) -> Self {
        Self { store }
    }

    /// Slash unbondings of `validator` that started at or after
    /// `infraction_height`.  Returns the unused part of `max_slash`.
    pub fn slash_unbondings(
        &mut self,
        validator: &Pubkey,
        infraction_height: u64,
        fraction_bps: u64,
        max_slash: u64,
    ) -> StakingResult<u64> {
        self.slash_queue::<UnbondingDelegation>(
            validator,
            infraction_height,
            fraction_bps,
            max_slash,
        )
    }

    /// Slash redelegations out of `validator` that started at or after
    /// `infraction_height`.  Returns the unused part of `max_slash`.
    pub fn slash_redelegations(
        &mut self,
        validator: &Pubkey,
        infraction_height: u64,
        fraction_bps: u64,
        max_slash: u64,
    ) -> StakingResult<u64> {
        self.slash_queue::<RedelegationInfo>(validator, infraction_height, fraction_bps, max_slash)
    }

    fn slash_queue<E: QueueEntry>(
        &mut self,
        validator: &Pubkey,
        infraction_height: u64,
        fraction_bps: u64,
        mut max_slash: u64,
    ) -> StakingResult<u64> {
        if max_slash == 0 || fraction_bps == 0 {
            return Ok(max_slash);
        }
        let mut ledger = DelegationLedger::new(self.store);
        for mut entry in ledger.queue_by_validator::<E>(validator)? {
            // Entries created before the infraction were not bonded then.
            if entry.start_height() < infraction_height {
                continue;
            }
            if max_slash == 0 {
                break;
            }
            let penalty = mul_bps(entry.amount(), fraction_bps)?.min(max_slash);
            if penalty == entry.amount() {
                ledger.remove_queue_entry::<E>(&entry.id())?;
            } else {
                entry.set_amount(entry.amount().saturating_sub(penalty));
                ledger.set_queue_entry(&entry)?;
            }
            max_slash = max_slash.saturating_sub(penalty);
        }
        Ok(max_slash)
    }

    /// Bonded tokens of `validator` plus the queued stake that left it at
    /// or after `infraction_height`.
    pub fn stake_at_infraction(
        &mut self,
        validator: &Pubkey,
        infraction_height: u64,
    ) -> StakingResult<u64> {
        let bonded = ValidatorRegistry::new(self.store)
            .require_validator(validator)?
            .bond_tokens;
        let ledger = DelegationLedger::new(self.store);
        let unbonding =
            queued_since::<UnbondingDelegation>(&ledger, validator, infraction_height)?;
        let redelegating =
            queued_since::<RedelegationInfo>(&ledger, validator, infraction_height)?;
        bonded
            .checked_add(unbonding)
            .and_then(|stake| stake.checked_add(redelegating))
            .ok_or(StakingError::ArithmeticOverflow)
    }

    /// Slash the stake a validator held at `infraction_height`.
    ///
    /// The budget is `floor(fraction * stake_at_infraction)`.  Exit queues
    /// pay first, then the validator's delegations in delegator order, each
    /// at most `floor(fraction * amount)`.
    pub fn slash_validator(
        &mut self,
        validator: &Pubkey,
        infraction_height: u64,
        fraction_bps: u64,
    ) -> StakingResult<SlashOutcome> {
        let slashable_stake = self.stake_at_infraction(validator, infraction_height)?;
        let max_slash = mul_bps(slashable_stake, fraction_bps)?;

        let after_unbondings =
            self.slash_unbondings(validator, infraction_height, fraction_bps, max_slash)?;
        let after_redelegations = self.slash_redelegations(
            validator,
            infraction_height,
            fraction_bps,
            after_unbondings,
        )?;

        let mut remaining = after_redelegations;
        let mut ledger = DelegationLedger::new(self.store);
        for delegation in ledger.delegations_by_validator(validator)? {
            if remaining == 0 {
                break;
            }
            let penalty = mul_bps(delegation.amount, fraction_bps)?.min(remaining);
            if penalty == 0 {
                continue;
            }
            ledger.reduce_delegation(&delegation, penalty)?;
            remaining = remaining.saturating_sub(penalty);
        }

        let outcome = SlashOutcome {
            slashable_stake,
            max_slash,
            from_unbondings: max_slash.saturating_sub(after_unbondings),
            from_redelegations: after_unbondings.saturating_sub(after_redelegations),
            from_bonded: after_redelegations.saturating_sub(remaining),
            remaining,
        };
        info!(
            "slashed validator {validator} at infraction height {infraction_height}: \
             unbondings {} redelegations {} bonded {} (budget {max_slash})",
            outcome.from_unbondings, outcome.from_redelegations, outcome.from_bonded
        );
        Ok(outcome)
    }
}

/// Sum of the `E` entries slashable at `validator` that started at or after
/// `infraction_height`.
fn queued_since<E: QueueEntry>(
    ledger: &DelegationLedger<'_>,
    validator: &Pubkey,
    infraction_height: u64,
) -> StakingResult<u64> {
    ledger
        .queue_by_validator::<E>(validator)?
        .iter()
        .filter(|entry| entry.start_height() >= infraction_height)
        .try_fold(0u64, |total, entry| {
            total
                .checked_add(entry.amount())
                .ok_or(StakingError::ArithmeticOverflow)
        })
}
