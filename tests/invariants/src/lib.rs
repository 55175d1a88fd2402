//! TRv1 Property-Based Invariant Tests
//!
//! Uses proptest to verify critical staking invariants across:
//! - Delegation ledger bookkeeping and supply conservation
//! - Slash budgets and infraction-height filtering
//! - Liveness window accounting
//! - Validator set selection

pub mod ledger_invariants;
pub mod liveness_invariants;
pub mod selection_invariants;
pub mod slashing_invariants;
