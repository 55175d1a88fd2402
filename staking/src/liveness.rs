//! Liveness tracker.
//!
//! Each active validator has a circular window of `voting_window_len`
//! signing bits plus a running count of the missed ones.  A bit that was
//! never written reads as "signed", so validators that always sign store
//! nothing but their summary record.

use {
    crate::{
        config::StakingParams,
        error::{StakingError, StakingResult},
        keys,
        registry::ValidatorRegistry,
        store::{decode, get_object, set_object, KvStore},
        types::{BlockContext, InactiveReason, ValidatorVoteInfo},
    },
    log::*,
    solana_pubkey::Pubkey,
};

pub struct LivenessTracker<'a> {
    store: &'a mut dyn KvStore,
    params: &'a StakingParams,
}

impl<'a> LivenessTracker<'a> {
    pub fn new(store: &'a mut dyn KvStore, params: &'a StakingParams) -> Self {
        Self { store, params }
    }

    pub fn get_vote_info(&self, validator: &Pubkey) -> StakingResult<Option<ValidatorVoteInfo>> {
        get_object(&*self.store, &keys::vote_info_key(validator))
    }

    pub fn set_vote_info(
        &mut self,
        validator: &Pubkey,
        info: &ValidatorVoteInfo,
    ) -> StakingResult<()> {
        set_object(self.store, keys::vote_info_key(validator), info)
    }

    /// Whether `validator` signed at window slot `index`.  Unwritten slots
    /// read as signed.
    pub fn get_window_bit(&self, validator: &Pubkey, index: u64) -> StakingResult<bool> {
        Ok(get_object(&*self.store, &keys::window_bit_key(validator, index))?.unwrap_or(true))
    }

    /// Signed slots are stored as absent.
    pub fn set_window_bit(
        &mut self,
        validator: &Pubkey,
        index: u64,
        signed: bool,
    ) -> StakingResult<()> {
        let key = keys::window_bit_key(validator, index);
        if signed {
            self.store.delete(&key);
            Ok(())
        } else {
            set_object(self.store, key, &false)
        }
    }

    /// Record whether `validator` signed the previous block.
    ///
    /// Missing or inactive validators are skipped.  Returns `true` when this
    /// update pushed the validator over the missed-block threshold and it
    /// was deactivated.
    pub fn handle_validator_vote(
        &mut self,
        ctx: &BlockContext,
        validator: &Pubkey,
        signed: bool,
    ) -> StakingResult<bool> {
        match ValidatorRegistry::new(self.store).get_validator(validator)? {
            None => {
                debug!("vote info for {validator} skipped: validator not found");
                return Ok(false);
            }
            Some(record) if !record.is_active() => {
                debug!("vote info for {validator} skipped: validator inactive");
                return Ok(false);
            }
            Some(_) => {}
        }

        let window_len = self.params.voting_window_len;
        let mut info = self
            .get_vote_info(validator)?
            .unwrap_or_else(|| ValidatorVoteInfo::new(ctx.height));
        let index = info
            .index_offset
            .checked_rem(window_len)
            .ok_or_else(|| StakingError::InvalidParams {
                reason: "voting window length is zero".to_string(),
            })?;
        info.index_offset = info
            .index_offset
            .checked_add(1)
            .ok_or(StakingError::ArithmeticOverflow)?;

        let previously_signed = self.get_window_bit(validator, index)?;
        match (previously_signed, signed) {
            (true, false) => {
                self.set_window_bit(validator, index, false)?;
                info.missed_blocks_counter = info
                    .missed_blocks_counter
                    .checked_add(1)
                    .ok_or(StakingError::ArithmeticOverflow)?;
            }
            (false, true) => {
                self.set_window_bit(validator, index, true)?;
                info.missed_blocks_counter =
                    info.missed_blocks_counter.checked_sub(1).ok_or_else(|| {
                        StakingError::invariant(format!(
                            "missed-block counter of {validator} below zero"
                        ))
                    })?;
            }
            _ => {}
        }
        if !signed {
            debug!(
                "validator {validator} missed block {}, counter {}",
                ctx.height, info.missed_blocks_counter
            );
        }

        // No grace period: a validator can be deactivated before it has
        // served a full window.  The window is kept; only reactivation
        // resets it.
        let deactivated = info.missed_blocks_counter > self.params.max_missed_blocks();
        if deactivated {
            info!(
                "validator {validator} deactivated at height {}: missed {} of {window_len} blocks",
                ctx.height, info.missed_blocks_counter
            );
            ValidatorRegistry::new(self.store).set_validator_inactive(
                validator,
                ctx.height,
                ctx.time,
                InactiveReason::MissedVotes,
            )?;
        }

        self.set_vote_info(validator, &info)?;
        Ok(deactivated)
    }

    /// Erase the summary record and every window bit of `validator`.
    pub fn reset_validator_vote_info(&mut self, validator: &Pubkey) {
        self.store.delete(&keys::vote_info_key(validator));
        self.clear_window(validator);
    }

    /// Erase every window bit of `validator`.
    pub fn clear_window(&mut self, validator: &Pubkey) {
        for (key, _) in self.store.iter_prefix(&keys::window_bits_prefix(validator)) {
            self.store.delete(&key);
        }
    }

    /// Every summary record, ascending by validator address.
    pub fn iterate_vote_infos(&self) -> StakingResult<Vec<(Pubkey, ValidatorVoteInfo)>> {
        self.store
            .iter_prefix(&keys::vote_info_prefix())
            .iter()
            .map(|(key, value)| -> StakingResult<(Pubkey, ValidatorVoteInfo)> {
                Ok((keys::parse_vote_info_key(key)?, decode(value)?))
            })
            .collect()
    }

    /// Stored (missed) window bits of `validator` as `(index, signed)`.
    pub fn iterate_window_bits(&self, validator: &Pubkey) -> StakingResult<Vec<(u64, bool)>> {
        self.store
            .iter_prefix(&keys::window_bits_prefix(validator))
            .iter()
            .map(|(key, value)| -> StakingResult<(u64, bool)> {
                Ok((keys::parse_window_bit_key(key)?.1, decode(value)?))
            })
            .collect()
    }
}
