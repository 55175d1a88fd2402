//! Staking parameters.
//!
//! Read-only to the state machine.  Updates arrive as `(key, value)` string
//! pairs from the parameter-change boundary and are validated there, so an
//! inconsistent set never reaches the ledger.

use {
    crate::error::{StakingError, StakingResult},
    borsh::{BorshDeserialize, BorshSerialize},
    serde::{Deserialize, Serialize},
};

/// Denominator of every fraction expressed in basis points.
pub const BPS_DENOMINATOR: u64 = 10_000;

pub const KEY_MAX_VALIDATOR_CNT: &str = "max_validator_cnt";
pub const KEY_VOTING_STATUS_LEN: &str = "voting_status_len";
pub const KEY_VOTING_STATUS_LEAST: &str = "voting_status_least";
pub const KEY_SURVIVAL_SECS: &str = "survival_secs";
pub const KEY_UNBOND_FROZEN_HEIGHT: &str = "unbond_frozen_height";
pub const KEY_REDELEGATION_ACTIVE_HEIGHT: &str = "redelegation_active_height";
pub const KEY_MAX_EVIDENCE_AGE: &str = "max_evidence_age";
pub const KEY_SLASH_FRACTION_DOUBLE_SIGN: &str = "slash_fraction_double_sign";
pub const KEY_SLASH_FRACTION_DOWNTIME: &str = "slash_fraction_downtime";

/// Staking parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StakingParams {
    /// Size cap of the active validator set.
    pub max_validator_count: u64,

    /// Length of the circular voting window, in blocks.
    pub voting_window_len: u64,

    /// Blocks a validator must sign within the window.
    /// Missing more than `voting_window_len - min_voting_count` deactivates it.
    pub min_voting_count: u64,

    /// Seconds an inactive validator survives before it is closed and its
    /// stake returned.
    pub validator_survival_secs: u64,

    /// Blocks between unbonding and payout.
    pub unbond_frozen_height: u64,

    /// Blocks before redelegated stake is bonded to its destination.
    pub redelegation_active_height: u64,

    /// Evidence older than this (seconds) is ignored.
    pub max_evidence_age_secs: u64,

    /// Share of bonded stake burned on double sign, in bps.
    pub slash_fraction_double_sign_bps: u64,

    /// Share of bonded stake burned for downtime, in bps.
    pub slash_fraction_downtime_bps: u64,
}

impl Default for StakingParams {
    /// Genesis defaults, assuming 5 second blocks.
    fn default() -> Self {
        Self {
            max_validator_count: 21,
            voting_window_len: 10_000,
            min_voting_count: 7_000,
            validator_survival_secs: 8 * 60 * 60, // 8 h
            unbond_frozen_height: 259_200,        // 15 days
            redelegation_active_height: 17_280,   // 1 day
            max_evidence_age_secs: 1_814_400,     // 21 days
            slash_fraction_double_sign_bps: 2_000, // 0.2
            slash_fraction_downtime_bps: 1,        // 0.0001
        }
    }
}

impl StakingParams {
    /// Missed blocks tolerated inside one window.
    #[inline]
    pub fn max_missed_blocks(&self) -> u64 {
        self.voting_window_len.saturating_sub(self.min_voting_count)
    }

    /// Validate the whole set.
    pub fn validate(&self) -> StakingResult<()> {
        let positive = [
            (KEY_MAX_VALIDATOR_CNT, self.max_validator_count),
            (KEY_VOTING_STATUS_LEN, self.voting_window_len),
            (KEY_VOTING_STATUS_LEAST, self.min_voting_count),
            (KEY_SURVIVAL_SECS, self.validator_survival_secs),
            (KEY_UNBOND_FROZEN_HEIGHT, self.unbond_frozen_height),
            (KEY_REDELEGATION_ACTIVE_HEIGHT, self.redelegation_active_height),
            (KEY_MAX_EVIDENCE_AGE, self.max_evidence_age_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(invalid(format!("{key} must be > 0")));
            }
        }
        if self.min_voting_count > self.voting_window_len {
            return Err(invalid(format!(
                "{KEY_VOTING_STATUS_LEAST} ({}) exceeds {KEY_VOTING_STATUS_LEN} ({})",
                self.min_voting_count, self.voting_window_len
            )));
        }
        let fractions = [
            (KEY_SLASH_FRACTION_DOUBLE_SIGN, self.slash_fraction_double_sign_bps),
            (KEY_SLASH_FRACTION_DOWNTIME, self.slash_fraction_downtime_bps),
        ];
        for (key, bps) in fractions {
            if bps > BPS_DENOMINATOR {
                return Err(invalid(format!("{key} must be <= {BPS_DENOMINATOR} bps")));
            }
        }
        Ok(())
    }

    /// Validate a single `(key, value)` update and return the parsed value.
    ///
    /// Integer parameters must be positive; fractions are basis points in
    /// `0..=10_000`.
    pub fn validate_key_value(key: &str, value: &str) -> StakingResult<u64> {
        match key {
            KEY_MAX_VALIDATOR_CNT
            | KEY_VOTING_STATUS_LEN
            | KEY_VOTING_STATUS_LEAST
            | KEY_SURVIVAL_SECS
            | KEY_UNBOND_FROZEN_HEIGHT
            | KEY_REDELEGATION_ACTIVE_HEIGHT
            | KEY_MAX_EVIDENCE_AGE => match value.parse::<u64>() {
                Ok(parsed) if parsed > 0 => Ok(parsed),
                _ => Err(invalid(format!("{key} invalid: {value:?}"))),
            },
            KEY_SLASH_FRACTION_DOUBLE_SIGN | KEY_SLASH_FRACTION_DOWNTIME => {
                match value.parse::<u64>() {
                    Ok(bps) if bps <= BPS_DENOMINATOR => Ok(bps),
                    _ => Err(invalid(format!("{key} invalid: {value:?}"))),
                }
            }
            _ => Err(StakingError::UnknownParam {
                key: key.to_string(),
            }),
        }
    }

    /// Apply a validated update.  The set is left untouched unless the
    /// updated set as a whole is valid.
    pub fn apply_key_value(&mut self, key: &str, value: &str) -> StakingResult<()> {
        let parsed = Self::validate_key_value(key, value)?;
        let mut updated = self.clone();
        let field = match key {
            KEY_MAX_VALIDATOR_CNT => &mut updated.max_validator_count,
            KEY_VOTING_STATUS_LEN => &mut updated.voting_window_len,
            KEY_VOTING_STATUS_LEAST => &mut updated.min_voting_count,
            KEY_SURVIVAL_SECS => &mut updated.validator_survival_secs,
            KEY_UNBOND_FROZEN_HEIGHT => &mut updated.unbond_frozen_height,
            KEY_REDELEGATION_ACTIVE_HEIGHT => &mut updated.redelegation_active_height,
            KEY_MAX_EVIDENCE_AGE => &mut updated.max_evidence_age_secs,
            KEY_SLASH_FRACTION_DOUBLE_SIGN => &mut updated.slash_fraction_double_sign_bps,
            KEY_SLASH_FRACTION_DOWNTIME => &mut updated.slash_fraction_downtime_bps,
            _ => {
                return Err(StakingError::UnknownParam {
                    key: key.to_string(),
                })
            }
        };
        *field = parsed;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

fn invalid(reason: String) -> StakingError {
    StakingError::InvalidParams { reason }
}
