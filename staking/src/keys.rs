//! Byte-key layout of every staking entity.
//!
//! All keys are `prefix byte ++ fixed-width fields`.  Heights are big-endian
//! `u64` so that ascending byte order equals ascending numeric order, and
//! addresses are the raw 32 pubkey bytes.  Nothing outside this module
//! concatenates key bytes.
//!
//! | prefix | layout                                   | value              |
//! |--------|------------------------------------------|--------------------|
//! | `0x11` | delegator ++ validator                   | `Delegation`       |
//! | `0x12` | validator ++ delegator                   | marker             |
//! | `0x21` | height ++ delegator ++ validator         | `UnbondingDelegation` |
//! | `0x22` | delegator ++ height ++ validator         | marker             |
//! | `0x23` | validator ++ height ++ delegator         | marker             |
//! | `0x31` | height ++ delegator ++ from ++ to        | `RedelegationInfo` |
//! | `0x32` | delegator ++ height ++ from ++ to        | marker             |
//! | `0x33` | from ++ height ++ delegator ++ to        | marker             |
//! | `0x41` | validator                                | `ValidatorVoteInfo`|
//! | `0x42` | validator ++ window index                | `bool`             |
//! | `0x51` | validator                                | `Validator`        |
//! | `0x52` | (u64::MAX - power) ++ validator          | marker             |
//! | `0x53` | inactive-since seconds ++ validator      | marker             |
//! | `0x61` | (single key)                             | last validator set |

use {
    crate::error::{StakingError, StakingResult},
    solana_pubkey::Pubkey,
};

const ADDR_LEN: usize = 32;
const U64_LEN: usize = 8;

pub const DELEGATION_PREFIX: u8 = 0x11;
pub const DELEGATION_BY_VALIDATOR_PREFIX: u8 = 0x12;

pub const VOTE_INFO_PREFIX: u8 = 0x41;
pub const VOTE_WINDOW_PREFIX: u8 = 0x42;

pub const VALIDATOR_PREFIX: u8 = 0x51;
pub const VALIDATOR_BY_POWER_PREFIX: u8 = 0x52;
pub const INACTIVE_VALIDATOR_PREFIX: u8 = 0x53;

pub const LAST_VALIDATOR_SET_KEY: &[u8] = &[0x61];

fn key_with(prefix: u8, capacity: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(capacity.saturating_add(1));
    key.push(prefix);
    key
}

fn read_pubkey(key: &[u8], offset: usize) -> StakingResult<Pubkey> {
    key.get(offset..offset.saturating_add(ADDR_LEN))
        .and_then(|bytes| <[u8; ADDR_LEN]>::try_from(bytes).ok())
        .map(Pubkey::new_from_array)
        .ok_or_else(|| StakingError::Codec(format!("malformed key {key:?}")))
}

fn read_u64(key: &[u8], offset: usize) -> StakingResult<u64> {
    key.get(offset..offset.saturating_add(U64_LEN))
        .and_then(|bytes| <[u8; U64_LEN]>::try_from(bytes).ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| StakingError::Codec(format!("malformed key {key:?}")))
}

fn check_len(key: &[u8], expected: usize) -> StakingResult<()> {
    if key.len() != expected {
        return Err(StakingError::Codec(format!(
            "key length {} != {expected}",
            key.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Delegations
// ---------------------------------------------------------------------------

pub fn delegation_key(delegator: &Pubkey, validator: &Pubkey) -> Vec<u8> {
    let mut key = key_with(DELEGATION_PREFIX, ADDR_LEN * 2);
    key.extend_from_slice(delegator.as_ref());
    key.extend_from_slice(validator.as_ref());
    key
}

pub fn delegator_delegations_prefix(delegator: &Pubkey) -> Vec<u8> {
    let mut key = key_with(DELEGATION_PREFIX, ADDR_LEN);
    key.extend_from_slice(delegator.as_ref());
    key
}

pub fn delegation_by_validator_key(validator: &Pubkey, delegator: &Pubkey) -> Vec<u8> {
    let mut key = key_with(DELEGATION_BY_VALIDATOR_PREFIX, ADDR_LEN * 2);
    key.extend_from_slice(validator.as_ref());
    key.extend_from_slice(delegator.as_ref());
    key
}

pub fn validator_delegations_prefix(validator: &Pubkey) -> Vec<u8> {
    let mut key = key_with(DELEGATION_BY_VALIDATOR_PREFIX, ADDR_LEN);
    key.extend_from_slice(validator.as_ref());
    key
}

/// Returns `(validator, delegator)`.
pub fn parse_delegation_by_validator_key(key: &[u8]) -> StakingResult<(Pubkey, Pubkey)> {
    check_len(key, 1 + ADDR_LEN * 2)?;
    Ok((read_pubkey(key, 1)?, read_pubkey(key, 1 + ADDR_LEN)?))
}

// ---------------------------------------------------------------------------
// Height-indexed queues
// ---------------------------------------------------------------------------

/// Identity of one queue entry.  Entries with the same id merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntryId {
    pub complete_height: u64,
    pub delegator: Pubkey,
    /// The validator the entry is slashable at.
    pub validator: Pubkey,
    /// Destination validator, for queues keyed on one.
    pub target: Option<Pubkey>,
}

/// The three orderings of one height-indexed queue.
///
/// The value lives under the by-height key; the by-delegator and
/// by-validator keys are markers pointing back at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueKeys {
    by_height: u8,
    by_delegator: u8,
    by_validator: u8,
    with_target: bool,
}

pub const UNBONDING_KEYS: QueueKeys = QueueKeys {
    by_height: 0x21,
    by_delegator: 0x22,
    by_validator: 0x23,
    with_target: false,
};

/// Redelegations are indexed on their source validator and end with the
/// destination.
pub const REDELEGATION_KEYS: QueueKeys = QueueKeys {
    by_height: 0x31,
    by_delegator: 0x32,
    by_validator: 0x33,
    with_target: true,
};

const QUEUE_KEY_LEN: usize = 1 + U64_LEN + ADDR_LEN * 2;

impl QueueKeys {
    fn key_len(&self) -> usize {
        if self.with_target {
            QUEUE_KEY_LEN + ADDR_LEN
        } else {
            QUEUE_KEY_LEN
        }
    }

    pub fn by_height(&self, id: &QueueEntryId) -> StakingResult<Vec<u8>> {
        let mut key = key_with(self.by_height, self.key_len());
        key.extend_from_slice(&id.complete_height.to_be_bytes());
        key.extend_from_slice(id.delegator.as_ref());
        key.extend_from_slice(id.validator.as_ref());
        self.push_target(key, id)
    }

    pub fn by_delegator(&self, id: &QueueEntryId) -> StakingResult<Vec<u8>> {
        let mut key = self.delegator_prefix(&id.delegator);
        key.extend_from_slice(&id.complete_height.to_be_bytes());
        key.extend_from_slice(id.validator.as_ref());
        self.push_target(key, id)
    }

    pub fn by_validator(&self, id: &QueueEntryId) -> StakingResult<Vec<u8>> {
        let mut key = self.validator_prefix(&id.validator);
        key.extend_from_slice(&id.complete_height.to_be_bytes());
        key.extend_from_slice(id.delegator.as_ref());
        self.push_target(key, id)
    }

    fn push_target(&self, mut key: Vec<u8>, id: &QueueEntryId) -> StakingResult<Vec<u8>> {
        match (self.with_target, id.target) {
            (true, Some(target)) => key.extend_from_slice(target.as_ref()),
            (false, None) => {}
            _ => {
                return Err(StakingError::Codec(format!(
                    "queue {:#04x} does not match entry target {:?}",
                    self.by_height, id.target
                )))
            }
        }
        Ok(key)
    }

    /// Prefix of the whole queue, ascending by completion height.
    pub fn queue_prefix(&self) -> Vec<u8> {
        vec![self.by_height]
    }

    pub fn delegator_prefix(&self, delegator: &Pubkey) -> Vec<u8> {
        let mut key = key_with(self.by_delegator, self.key_len());
        key.extend_from_slice(delegator.as_ref());
        key
    }

    pub fn validator_prefix(&self, validator: &Pubkey) -> Vec<u8> {
        let mut key = key_with(self.by_validator, self.key_len());
        key.extend_from_slice(validator.as_ref());
        key
    }

    pub fn parse_by_height(&self, key: &[u8]) -> StakingResult<QueueEntryId> {
        self.check(key, self.by_height)?;
        Ok(QueueEntryId {
            complete_height: read_u64(key, 1)?,
            delegator: read_pubkey(key, 1 + U64_LEN)?,
            validator: read_pubkey(key, 1 + U64_LEN + ADDR_LEN)?,
            target: self.read_target(key)?,
        })
    }

    pub fn parse_by_delegator(&self, key: &[u8]) -> StakingResult<QueueEntryId> {
        self.check(key, self.by_delegator)?;
        Ok(QueueEntryId {
            delegator: read_pubkey(key, 1)?,
            complete_height: read_u64(key, 1 + ADDR_LEN)?,
            validator: read_pubkey(key, 1 + ADDR_LEN + U64_LEN)?,
            target: self.read_target(key)?,
        })
    }

    pub fn parse_by_validator(&self, key: &[u8]) -> StakingResult<QueueEntryId> {
        self.check(key, self.by_validator)?;
        Ok(QueueEntryId {
            validator: read_pubkey(key, 1)?,
            complete_height: read_u64(key, 1 + ADDR_LEN)?,
            delegator: read_pubkey(key, 1 + ADDR_LEN + U64_LEN)?,
            target: self.read_target(key)?,
        })
    }

    fn read_target(&self, key: &[u8]) -> StakingResult<Option<Pubkey>> {
        if self.with_target {
            read_pubkey(key, QUEUE_KEY_LEN).map(Some)
        } else {
            Ok(None)
        }
    }

    fn check(&self, key: &[u8], prefix: u8) -> StakingResult<()> {
        check_len(key, self.key_len())?;
        if key.first() != Some(&prefix) {
            return Err(StakingError::Codec(format!(
                "expected queue prefix {prefix:#04x}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

pub fn vote_info_key(validator: &Pubkey) -> Vec<u8> {
    let mut key = key_with(VOTE_INFO_PREFIX, ADDR_LEN);
    key.extend_from_slice(validator.as_ref());
    key
}

pub fn vote_info_prefix() -> Vec<u8> {
    vec![VOTE_INFO_PREFIX]
}

pub fn parse_vote_info_key(key: &[u8]) -> StakingResult<Pubkey> {
    check_len(key, 1 + ADDR_LEN)?;
    read_pubkey(key, 1)
}

pub fn window_bit_key(validator: &Pubkey, index: u64) -> Vec<u8> {
    let mut key = window_bits_prefix(validator);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

pub fn window_bits_prefix(validator: &Pubkey) -> Vec<u8> {
    let mut key = key_with(VOTE_WINDOW_PREFIX, ADDR_LEN + U64_LEN);
    key.extend_from_slice(validator.as_ref());
    key
}

/// Returns `(validator, index)`.
pub fn parse_window_bit_key(key: &[u8]) -> StakingResult<(Pubkey, u64)> {
    check_len(key, 1 + ADDR_LEN + U64_LEN)?;
    Ok((read_pubkey(key, 1)?, read_u64(key, 1 + ADDR_LEN)?))
}

// ---------------------------------------------------------------------------
// Validator registry
// ---------------------------------------------------------------------------

pub fn validator_key(validator: &Pubkey) -> Vec<u8> {
    let mut key = key_with(VALIDATOR_PREFIX, ADDR_LEN);
    key.extend_from_slice(validator.as_ref());
    key
}

/// Power is stored inverted so a forward scan yields power descending and,
/// within equal power, address ascending.
pub fn validator_by_power_key(power: u64, validator: &Pubkey) -> Vec<u8> {
    let mut key = key_with(VALIDATOR_BY_POWER_PREFIX, U64_LEN + ADDR_LEN);
    key.extend_from_slice(&(!power).to_be_bytes());
    key.extend_from_slice(validator.as_ref());
    key
}

pub fn validator_by_power_prefix() -> Vec<u8> {
    vec![VALIDATOR_BY_POWER_PREFIX]
}

/// Returns `(power, validator)`.
pub fn parse_validator_by_power_key(key: &[u8]) -> StakingResult<(u64, Pubkey)> {
    check_len(key, 1 + U64_LEN + ADDR_LEN)?;
    let inverted = read_u64(key, 1)?;
    Ok((!inverted, read_pubkey(key, 1 + U64_LEN)?))
}

/// Inactive-since times before the unix epoch sort as zero.
pub fn inactive_validator_key(inactive_since: i64, validator: &Pubkey) -> Vec<u8> {
    let secs = u64::try_from(inactive_since).unwrap_or(0);
    let mut key = key_with(INACTIVE_VALIDATOR_PREFIX, U64_LEN + ADDR_LEN);
    key.extend_from_slice(&secs.to_be_bytes());
    key.extend_from_slice(validator.as_ref());
    key
}

pub fn inactive_validator_prefix() -> Vec<u8> {
    vec![INACTIVE_VALIDATOR_PREFIX]
}

/// Returns `(inactive_since_secs, validator)`.
pub fn parse_inactive_validator_key(key: &[u8]) -> StakingResult<(u64, Pubkey)> {
    check_len(key, 1 + U64_LEN + ADDR_LEN)?;
    Ok((read_u64(key, 1)?, read_pubkey(key, 1 + U64_LEN)?))
}
