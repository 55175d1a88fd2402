//! Per-block drivers called by the consensus host.
//!
//! `begin_block` records last-commit participation and handles double-sign
//! evidence.  `end_block` closes long-inactive validators, settles matured
//! exit queues and selects the next validator set.  Both operate on a
//! store the host commits only if the whole block succeeds.

use {
    crate::{
        accounts::AccountLedger,
        config::StakingParams,
        delegation::DelegationLedger,
        error::{StakingError, StakingResult},
        liveness::LivenessTracker,
        registry::ValidatorRegistry,
        slashing::{SlashOutcome, SlashingEngine},
        store::KvStore,
        types::{BlockContext, Delegation, InactiveReason, Misbehavior, ValidatorUpdate, VoteSignal},
        validator_set::ValidatorSetSelector,
    },
    log::*,
    solana_pubkey::Pubkey,
    std::collections::BTreeSet,
};

/// Input of [`StakingEngine::begin_block`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeginBlockRequest {
    /// Participation of each validator in the previous block's commit.
    pub last_commit_votes: Vec<VoteSignal>,
    pub byzantine_validators: Vec<Misbehavior>,
}

#[derive(Debug, Clone)]
pub struct StakingEngine {
    params: StakingParams,
}

impl StakingEngine {
    pub fn new(params: StakingParams) -> StakingResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &StakingParams {
        &self.params
    }

    /// Apply a `(key, value)` parameter change.  Rejected changes leave the
    /// current parameters in place.
    pub fn apply_param_change(&mut self, key: &str, value: &str) -> StakingResult<()> {
        self.params.apply_key_value(key, value)?;
        info!("staking parameter {key} set to {value}");
        Ok(())
    }

    pub fn begin_block(
        &self,
        store: &mut dyn KvStore,
        ctx: &BlockContext,
        request: &BeginBlockRequest,
    ) -> StakingResult<()> {
        let mut seen = BTreeSet::new();
        for vote in &request.last_commit_votes {
            if !seen.insert(vote.address) {
                return Err(StakingError::DuplicateAddress(vote.address));
            }
        }

        for vote in &request.last_commit_votes {
            let deactivated = LivenessTracker::new(store, &self.params)
                .handle_validator_vote(ctx, &vote.address, vote.signed)?;
            if deactivated && self.params.slash_fraction_downtime_bps > 0 {
                SlashingEngine::new(store).slash_validator(
                    &vote.address,
                    ctx.height,
                    self.params.slash_fraction_downtime_bps,
                )?;
            }
        }

        for evidence in &request.byzantine_validators {
            self.handle_double_sign(store, ctx, evidence)?;
        }
        Ok(())
    }

    /// Slash and deactivate a validator caught double signing.  Returns
    /// `None` when the evidence is ignored.
    pub fn handle_double_sign(
        &self,
        store: &mut dyn KvStore,
        ctx: &BlockContext,
        evidence: &Misbehavior,
    ) -> StakingResult<Option<SlashOutcome>> {
        let age = ctx.time.saturating_sub(evidence.time);
        let max_age = i64::try_from(self.params.max_evidence_age_secs).unwrap_or(i64::MAX);
        if age > max_age {
            warn!(
                "ignoring double-sign evidence for {} at height {}: {age}s old",
                evidence.address, evidence.height
            );
            return Ok(None);
        }
        let Some(validator) = ValidatorRegistry::new(store).get_validator(&evidence.address)?
        else {
            warn!(
                "ignoring double-sign evidence for unknown validator {}",
                evidence.address
            );
            return Ok(None);
        };

        let outcome = SlashingEngine::new(store).slash_validator(
            &evidence.address,
            evidence.height,
            self.params.slash_fraction_double_sign_bps,
        )?;
        if validator.is_active() {
            ValidatorRegistry::new(store).set_validator_inactive(
                &evidence.address,
                ctx.height,
                ctx.time,
                InactiveReason::DoubleSign,
            )?;
        }
        Ok(Some(outcome))
    }

    pub fn end_block(
        &self,
        store: &mut dyn KvStore,
        accounts: &mut dyn AccountLedger,
        ctx: &BlockContext,
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        self.close_expired_validators(store, accounts, ctx)?;
        DelegationLedger::new(store).complete_unbondings(accounts, ctx.height)?;
        self.complete_redelegations(store, accounts, ctx)?;
        ValidatorSetSelector::new(store, &self.params).select(ctx)
    }

    /// Close every validator inactive for longer than
    /// `validator_survival_secs`.  Each delegation is returned to its
    /// delegator.  Returns the closed addresses.
    pub fn close_expired_validators(
        &self,
        store: &mut dyn KvStore,
        accounts: &mut dyn AccountLedger,
        ctx: &BlockContext,
    ) -> StakingResult<Vec<Pubkey>> {
        let survival = i64::try_from(self.params.validator_survival_secs).unwrap_or(i64::MAX);
        let cutoff = ctx.time.saturating_sub(survival);
        let expired = ValidatorRegistry::new(store).inactive_since_at_or_before(cutoff)?;

        for address in &expired {
            let mut ledger = DelegationLedger::new(store);
            let mut returned = 0u64;
            for delegation in ledger.delegations_by_validator(address)? {
                ledger.reduce_delegation(&delegation, delegation.amount)?;
                accounts.credit(&delegation.delegator, delegation.amount)?;
                returned = returned.saturating_add(delegation.amount);
            }
            LivenessTracker::new(store, &self.params).reset_validator_vote_info(address);
            ValidatorRegistry::new(store).remove_validator(address)?;
            info!(
                "closed validator {address} at height {}: {returned} returned to delegators",
                ctx.height
            );
        }
        Ok(expired)
    }

    /// Bond every matured redelegation to its destination.  Stake whose
    /// destination no longer exists goes back to the delegator.
    pub fn complete_redelegations(
        &self,
        store: &mut dyn KvStore,
        accounts: &mut dyn AccountLedger,
        ctx: &BlockContext,
    ) -> StakingResult<()> {
        let matured = DelegationLedger::new(store).take_matured_redelegations(ctx.height)?;
        for info in matured {
            if ValidatorRegistry::new(store)
                .get_validator(&info.to_validator)?
                .is_none()
            {
                warn!(
                    "redelegation target {} gone, returning {} to {}",
                    info.to_validator, info.amount, info.delegator
                );
                accounts.credit(&info.delegator, info.amount)?;
                continue;
            }
            let delegation = Delegation {
                delegator: info.delegator,
                validator: info.to_validator,
                amount: info.amount,
                is_compound: info.is_compound,
            };
            DelegationLedger::new(store).delegate(accounts, &delegation, true)?;
        }
        Ok(())
    }

    /// Return an inactive validator to the active set with a fresh voting
    /// window.
    pub fn reactivate_validator(
        &self,
        store: &mut dyn KvStore,
        ctx: &BlockContext,
        address: &Pubkey,
    ) -> StakingResult<()> {
        ValidatorRegistry::new(store).set_validator_active(address, ctx.height)?;
        LivenessTracker::new(store, &self.params).reset_validator_vote_info(address);
        info!("validator {address} reactivated at height {}", ctx.height);
        Ok(())
    }
}
