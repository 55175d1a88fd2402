//! TRv1 Staking Integration Tests
//!
//! Block-level integration test suite for the TRv1 staking engine.
//!
//! # Subsystems Tested
//!
//! 1. **Delegation**: bonding, unbonding and redelegation queues, whole-block
//!    rollback, supply conservation
//! 2. **Slashing**: double-sign evidence, exit-queue slashing by infraction
//!    height, stale evidence, downtime penalties
//! 3. **Liveness**: missed-block window, deactivation, reactivation, closing
//!    after the survival period
//! 4. **Validator Set**: `max_validator_count` cap, update ordering, tie
//!    breaking, re-entry after eviction

pub mod harness;
