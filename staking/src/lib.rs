//! # TRv1 Staking
//!
//! Proof-of-stake bookkeeping and validator lifecycle for the TRv1 chain.
//!
//! The crate is driven once per block by the consensus host:
//!
//! - **begin block**: last-commit participation feeds the [`liveness`]
//!   tracker, which deactivates validators that miss too many blocks, and
//!   double-sign evidence is [`slashing`]-ed.
//! - **transactions**: the [`delegation`] ledger bonds, unbonds and
//!   redelegates stake.  Validator bonded totals follow through
//!   [`hooks::DelegationHooks`].
//! - **end block**: validators inactive for too long are closed, matured
//!   exit queues are settled and the [`validator_set`] selector returns the
//!   updates for consensus.
//!
//! All state lives in a host-provided ordered [`store::KvStore`].  Run each
//! block against a [`store::CacheStore`] and commit it only on success.
//!
//! ## Quick start
//!
//! ```rust
//! use {
//!     solana_pubkey::Pubkey,
//!     trv1_staking::{
//!         AccountLedger, BeginBlockRequest, BlockContext, CacheStore, Delegation,
//!         DelegationLedger, MemAccounts, MemStore, StakingEngine, StakingParams, Validator,
//!         ValidatorRegistry,
//!     },
//! };
//!
//! let validator = Pubkey::new_from_array([1; 32]);
//! let delegator = Pubkey::new_from_array([2; 32]);
//! let engine = StakingEngine::new(StakingParams::default()).unwrap();
//! let mut state = MemStore::new();
//! let mut accounts = MemAccounts::with_balances([(delegator, 1_000)]);
//!
//! let mut block = CacheStore::new(&mut state);
//! let ctx = BlockContext::new(1, 1_700_000_000);
//! engine.begin_block(&mut block, &ctx, &BeginBlockRequest::default()).unwrap();
//! ValidatorRegistry::new(&mut block)
//!     .create_validator(&Validator::new(validator, delegator, ctx.height))
//!     .unwrap();
//! let bond = Delegation { delegator, validator, amount: 600, is_compound: false };
//! DelegationLedger::new(&mut block).delegate(&mut accounts, &bond, false).unwrap();
//! let updates = engine.end_block(&mut block, &mut accounts, &ctx).unwrap();
//! block.commit();
//!
//! assert_eq!(updates[0].power, 600);
//! assert_eq!(accounts.balance(&delegator), 400);
//! ```

pub mod accounts;
pub mod config;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod keys;
pub mod liveness;
pub mod registry;
pub mod slashing;
pub mod store;
pub mod types;
pub mod validator_set;


// Re-exports for convenience.
pub use {
    accounts::{AccountLedger, MemAccounts},
    config::{StakingParams, BPS_DENOMINATOR},
    delegation::{DelegationLedger, QueueEntry},
    engine::{BeginBlockRequest, StakingEngine},
    error::{StakingError, StakingResult},
    hooks::DelegationHooks,
    keys::QueueEntryId,
    liveness::LivenessTracker,
    registry::{RegistryHooks, ValidatorRegistry},
    slashing::{SlashOutcome, SlashingEngine},
    store::{CacheStore, KvStore, MemStore},
    types::{
        BlockContext, Delegation, InactiveReason, Misbehavior, RedelegationInfo,
        UnbondingDelegation, Validator, ValidatorStatus, ValidatorUpdate, ValidatorVoteInfo,
        VoteSignal,
    },
    validator_set::ValidatorSetSelector,
};
