//! Property-based tests for validator set selection.
//!
//! Properties tested:
//! 1. The selected set never exceeds `max_validator_count`.
//! 2. The set is ordered by power descending, then address ascending.
//! 3. Every validator ranked past the cap is deactivated.
//! 4. Selecting twice without state changes emits no updates.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        solana_pubkey::Pubkey,
        trv1_staking::{
            BlockContext, InactiveReason, MemStore, StakingParams, Validator, ValidatorRegistry,
            ValidatorSetSelector,
        },
    };

    fn address(index: usize) -> Pubkey {
        Pubkey::new_from_array([index as u8 + 1; 32])
    }

    fn populate(powers: &[u64]) -> MemStore {
        let mut store = MemStore::new();
        let mut registry = ValidatorRegistry::new(&mut store);
        for (i, &power) in powers.iter().enumerate() {
            registry
                .create_validator(&Validator {
                    bond_tokens: power,
                    ..Validator::new(address(i), address(i), 0)
                })
                .unwrap();
        }
        store
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 1. Cap, ordering and eviction
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn selection_is_capped_ordered_and_idempotent(
            powers in prop::collection::vec(0..=50u64, 0..30),
            max_validator_count in 1..=10u64,
        ) {
            let params = StakingParams {
                max_validator_count,
                ..Default::default()
            };
            let mut store = populate(&powers);

            let mut selector = ValidatorSetSelector::new(&mut store, &params);
            let updates = selector.select(&BlockContext::new(1, 10)).unwrap();
            let set = selector.last_validator_set().unwrap();

            // ── INVARIANT: |set| <= cap, no zero-power members ──
            prop_assert!(set.len() as u64 <= max_validator_count);
            prop_assert!(set.iter().all(|member| member.power > 0));
            // First selection announces every member.
            prop_assert_eq!(&updates, &set);

            // ── INVARIANT: power descending, address ascending on ties ──
            for pair in set.windows(2) {
                prop_assert!(
                    (pair[0].power, std::cmp::Reverse(pair[0].address))
                        > (pair[1].power, std::cmp::Reverse(pair[1].address))
                );
            }

            // ── INVARIANT: nothing changed, nothing to report ──
            prop_assert!(selector.select(&BlockContext::new(2, 20)).unwrap().is_empty());
            prop_assert_eq!(selector.last_validator_set().unwrap(), set.clone());

            // ── INVARIANT: powered validators outside the set were evicted ──
            let registry = ValidatorRegistry::new(&mut store);
            for (i, &power) in powers.iter().enumerate() {
                let record = registry.require_validator(&address(i)).unwrap();
                let selected = set.iter().any(|member| member.address == address(i));
                if selected || power == 0 {
                    prop_assert!(record.is_active());
                } else {
                    prop_assert!(!record.is_active());
                    prop_assert_eq!(
                        record.inactive_reason,
                        Some(InactiveReason::MaxValidatorCount)
                    );
                    prop_assert_eq!(record.inactive_height, 1);
                }
            }
        }
    }
}
