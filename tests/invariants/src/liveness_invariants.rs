//! Property-based tests for the liveness window.
//!
//! Properties tested:
//! 1. The missed-block counter equals the number of missed slots stored.
//! 2. The counter never exceeds the window length.
//! 3. A validator is deactivated exactly when the counter passes the
//!    tolerance, and never if it always signs.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        solana_pubkey::Pubkey,
        trv1_staking::{
            BlockContext, InactiveReason, LivenessTracker, MemStore, StakingParams, Validator,
            ValidatorRegistry,
        },
    };

    fn validator() -> Pubkey {
        Pubkey::new_from_array([7; 32])
    }

    fn window_params() -> impl Strategy<Value = StakingParams> {
        (1..=16u64)
            .prop_flat_map(|len| (Just(len), 0..=len))
            .prop_map(|(voting_window_len, min_voting_count)| StakingParams {
                voting_window_len,
                min_voting_count,
                ..Default::default()
            })
    }

    fn store_with_validator() -> MemStore {
        let mut store = MemStore::new();
        ValidatorRegistry::new(&mut store)
            .create_validator(&Validator::new(validator(), validator(), 0))
            .unwrap();
        store
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 1. Counter bookkeeping
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn counter_matches_window(
            params in window_params(),
            votes in prop::collection::vec(prop::bool::weighted(0.8), 1..80),
        ) {
            let mut store = store_with_validator();
            let mut tracker = LivenessTracker::new(&mut store, &params);

            for (i, &signed) in votes.iter().enumerate() {
                let height = i as u64 + 1;
                let ctx = BlockContext::new(height, height as i64);
                let deactivated = tracker
                    .handle_validator_vote(&ctx, &validator(), signed)
                    .unwrap();

                let info = tracker.get_vote_info(&validator()).unwrap().unwrap();
                let missed = tracker
                    .iterate_window_bits(&validator())
                    .unwrap()
                    .iter()
                    .filter(|(_, signed)| !signed)
                    .count() as u64;

                // ── INVARIANT: counter == stored misses <= window ──
                prop_assert_eq!(info.missed_blocks_counter, missed);
                prop_assert!(info.missed_blocks_counter <= params.voting_window_len);

                // ── INVARIANT: deactivation exactly at the threshold ──
                prop_assert_eq!(
                    deactivated,
                    info.missed_blocks_counter > params.max_missed_blocks()
                );
                if deactivated {
                    break;
                }
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 2. Always-signing validators are never deactivated
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn always_signing_never_deactivated(
            params in window_params(),
            blocks in 1..200u64,
        ) {
            let mut store = store_with_validator();
            let mut tracker = LivenessTracker::new(&mut store, &params);
            for height in 1..=blocks {
                let deactivated = tracker
                    .handle_validator_vote(&BlockContext::new(height, 0), &validator(), true)
                    .unwrap();
                prop_assert!(!deactivated);
            }
            prop_assert!(tracker.iterate_window_bits(&validator()).unwrap().is_empty());

            let record = ValidatorRegistry::new(&mut store)
                .require_validator(&validator())
                .unwrap();
            prop_assert!(record.is_active());
            prop_assert_ne!(record.inactive_reason, Some(InactiveReason::MissedVotes));
        }
    }
}
