use {solana_pubkey::Pubkey, thiserror::Error};

/// Errors produced by the staking subsystem.
///
/// Validation failures (`InsufficientBalance`, `DuplicateAddress`,
/// `InvalidParams`, `UnknownParam`) reject a transaction before it mutates
/// anything.  `InvariantViolation`, `ArithmeticOverflow` and `Codec` are
/// fatal: the host must discard the whole block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    /// The account cannot cover a debit.
    #[error("Insufficient balance: account {account} holds {available} but {required} is required")]
    InsufficientBalance {
        account: Pubkey,
        required: u64,
        available: u64,
    },

    /// The same address appears twice where it must be unique.
    #[error("Duplicate address: {0}")]
    DuplicateAddress(Pubkey),

    /// The caller required a validator that does not exist.
    #[error("Validator {0} not found")]
    ValidatorNotFound(Pubkey),

    /// The caller required a delegation that does not exist.
    #[error("No delegation from {delegator} to {validator}")]
    DelegationNotFound { delegator: Pubkey, validator: Pubkey },

    /// A parameter set failed validation.
    #[error("Invalid staking parameters: {reason}")]
    InvalidParams { reason: String },

    /// A parameter update named a key outside the staking parameter space.
    #[error("Unknown staking parameter: {key}")]
    UnknownParam { key: String },

    /// An internal contract was broken (e.g. an amount would go negative).
    #[error("Staking invariant violated: {reason}")]
    InvariantViolation { reason: String },

    /// Checked arithmetic overflowed.
    #[error("Staking arithmetic overflow")]
    ArithmeticOverflow,

    /// A stored value could not be encoded or decoded.
    #[error("Staking store codec error: {0}")]
    Codec(String),
}

impl StakingError {
    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            reason: reason.into(),
        }
    }
}

pub type StakingResult<T> = Result<T, StakingError>;
