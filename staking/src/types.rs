//! Records persisted by the staking subsystem and the values exchanged with
//! the consensus driver.

use {
    borsh::{BorshDeserialize, BorshSerialize},
    serde::{Deserialize, Serialize},
    solana_pubkey::Pubkey,
    std::fmt,
};

/// Bonded stake of one delegator with one validator.
///
/// At most one record exists per `(delegator, validator)`; a record whose
/// amount reaches zero is deleted rather than stored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Delegation {
    pub delegator: Pubkey,
    pub validator: Pubkey,
    pub amount: u64,
    /// Rewards are re-bonded instead of paid out.
    pub is_compound: bool,
}

/// Stake that left a validator and is held until `complete_height`.
///
/// Entries for the same pair and completion height accumulate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct UnbondingDelegation {
    pub delegator: Pubkey,
    pub validator: Pubkey,
    pub amount: u64,
    /// Height at which the stake left the validator.
    pub height: u64,
    pub complete_height: u64,
}

/// Stake moving from `from_validator` to `to_validator`.
///
/// Slashable at the source until `complete_height`, when it is bonded to
/// the destination.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct RedelegationInfo {
    pub delegator: Pubkey,
    pub from_validator: Pubkey,
    pub to_validator: Pubkey,
    pub amount: u64,
    pub height: u64,
    pub complete_height: u64,
    pub is_compound: bool,
}

/// Summary of a validator's voting window.  The per-block bits are stored
/// separately under the window-bit keys.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct ValidatorVoteInfo {
    pub start_height: u64,
    /// Total number of updates; the window slot is `index_offset % window_len`.
    pub index_offset: u64,
    pub missed_blocks_counter: u64,
}

impl ValidatorVoteInfo {
    pub fn new(start_height: u64) -> Self {
        Self {
            start_height,
            index_offset: 0,
            missed_blocks_counter: 0,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum ValidatorStatus {
    Active,
    Inactive,
}

/// Why a validator left the active set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum InactiveReason {
    /// Missed more blocks than the voting window tolerates.
    MissedVotes,
    /// Ranked beyond `max_validator_count`.
    MaxValidatorCount,
    /// Double-sign evidence was accepted.
    DoubleSign,
    /// The owner revoked the validator.
    OwnerRequest,
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::MissedVotes => "missed-vote threshold",
            Self::MaxValidatorCount => "exceeds max validator count",
            Self::DoubleSign => "double sign",
            Self::OwnerRequest => "owner request",
        };
        f.write_str(reason)
    }
}

/// Validator registry record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Validator {
    pub address: Pubkey,
    pub owner: Pubkey,
    pub status: ValidatorStatus,
    pub inactive_reason: Option<InactiveReason>,
    /// Unix seconds of the last transition to `Inactive`.
    pub inactive_since: i64,
    pub inactive_height: u64,
    /// Sum of all delegation amounts held by this validator.
    pub bond_tokens: u64,
    pub bond_height: u64,
}

impl Validator {
    pub fn new(address: Pubkey, owner: Pubkey, bond_height: u64) -> Self {
        Self {
            address,
            owner,
            status: ValidatorStatus::Active,
            inactive_reason: None,
            inactive_since: 0,
            inactive_height: 0,
            bond_tokens: 0,
            bond_height,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ValidatorStatus::Active
    }

    /// Consensus weight.  Equal to the bonded token total.
    pub fn power(&self) -> u64 {
        self.bond_tokens
    }
}

/// One entry of the validator-update list handed to consensus.
/// `power == 0` removes the validator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct ValidatorUpdate {
    pub address: Pubkey,
    pub power: u64,
}

/// Participation of one validator in the previous block's commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSignal {
    pub address: Pubkey,
    pub signed: bool,
}

/// Double-sign evidence reported by consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misbehavior {
    pub address: Pubkey,
    /// Infraction height.
    pub height: u64,
    /// Unix seconds of the infraction.
    pub time: i64,
}

/// Height and time of the block being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: u64,
    pub time: i64,
}

impl BlockContext {
    pub fn new(height: u64, time: i64) -> Self {
        Self { height, time }
    }
}
