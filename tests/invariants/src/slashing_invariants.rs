//! Property-based tests for slashing.
//!
//! Properties tested:
//! 1. The budget is `floor(fraction * stake at the infraction height)` and is
//!    never exceeded.
//! 2. Every slashable position loses exactly `floor(fraction * amount)`,
//!    whatever its order.
//! 3. Exit-queue entries created before the infraction are never touched.
//! 4. Bonded totals still match delegations after a slash.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        solana_pubkey::Pubkey,
        std::collections::HashMap,
        trv1_staking::{
            slashing::mul_bps, Delegation, DelegationLedger, MemAccounts, MemStore,
            RedelegationInfo, SlashingEngine, UnbondingDelegation, Validator, ValidatorRegistry,
            BPS_DENOMINATOR,
        },
    };

    const UNBOND_DELAY: u64 = 100;

    fn offender() -> Pubkey {
        Pubkey::new_from_array([200; 32])
    }

    fn destination() -> Pubkey {
        Pubkey::new_from_array([201; 32])
    }

    fn delegator(index: usize) -> Pubkey {
        Pubkey::new_from_array([index as u8 + 1; 32])
    }

    /// Per delegator: bonded amount, share unbonded (%), share redelegated
    /// (%), height of the exit.
    fn positions() -> impl Strategy<Value = Vec<(u64, u64, u64, u64)>> {
        prop::collection::vec(
            (1..=1_000_000_000u64, 0..=50u64, 0..=50u64, 1..=20u64),
            1..8,
        )
    }

    fn build(positions: &[(u64, u64, u64, u64)]) -> MemStore {
        let mut store = MemStore::new();
        let mut registry = ValidatorRegistry::new(&mut store);
        registry
            .create_validator(&Validator::new(offender(), offender(), 0))
            .unwrap();
        registry
            .create_validator(&Validator::new(destination(), destination(), 0))
            .unwrap();

        let mut accounts = MemAccounts::with_balances(
            positions
                .iter()
                .enumerate()
                .map(|(i, &(amount, ..))| (delegator(i), amount)),
        );
        let mut ledger = DelegationLedger::new(&mut store);
        for (i, &(amount, unbond_pct, redelegate_pct, height)) in positions.iter().enumerate() {
            let bond = Delegation {
                delegator: delegator(i),
                validator: offender(),
                amount,
                is_compound: false,
            };
            ledger.delegate(&mut accounts, &bond, false).unwrap();

            let current = ledger.get_delegation(&delegator(i), &offender()).unwrap().unwrap();
            ledger
                .unbond_tokens(&current, amount * unbond_pct / 100, height, UNBOND_DELAY)
                .unwrap();
            if let Some(current) = ledger.get_delegation(&delegator(i), &offender()).unwrap() {
                let info = RedelegationInfo {
                    delegator: delegator(i),
                    from_validator: offender(),
                    to_validator: destination(),
                    amount: amount * redelegate_pct / 100,
                    height,
                    complete_height: height + UNBOND_DELAY,
                    is_compound: false,
                };
                ledger.redelegate(&current, &info).unwrap();
            }
        }
        store
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 1. Budget and per-entry bounds
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn slash_respects_budget_and_infraction_height(
            positions in positions(),
            infraction_height in 1..=20u64,
            fraction_bps in 0..=BPS_DENOMINATOR,
        ) {
            let mut store = build(&positions);
            let bonded_before = ValidatorRegistry::new(&mut store)
                .require_validator(&offender())
                .unwrap()
                .bond_tokens;
            let ledger = DelegationLedger::new(&mut store);
            let delegations_before: HashMap<Pubkey, u64> = ledger
                .delegations_by_validator(&offender())
                .unwrap()
                .into_iter()
                .map(|d| (d.delegator, d.amount))
                .collect();
            let unbondings_before: Vec<UnbondingDelegation> =
                ledger.unbondings_by_validator(&offender()).unwrap();
            let redelegations_before: Vec<RedelegationInfo> =
                ledger.redelegations_by_from_validator(&offender()).unwrap();

            let queued_since_infraction: u64 = unbondings_before
                .iter()
                .filter(|u| u.height >= infraction_height)
                .map(|u| u.amount)
                .chain(
                    redelegations_before
                        .iter()
                        .filter(|r| r.height >= infraction_height)
                        .map(|r| r.amount),
                )
                .sum();

            let outcome = SlashingEngine::new(&mut store)
                .slash_validator(&offender(), infraction_height, fraction_bps)
                .unwrap();

            // ── INVARIANT: budget covers the stake held at the infraction ──
            let stake = bonded_before + queued_since_infraction;
            prop_assert_eq!(outcome.slashable_stake, stake);
            prop_assert_eq!(outcome.max_slash, mul_bps(stake, fraction_bps).unwrap());
            prop_assert_eq!(outcome.total_slashed() + outcome.remaining, outcome.max_slash);

            let ledger = DelegationLedger::new(&mut store);
            let unbondings_after: HashMap<Pubkey, u64> = ledger
                .unbondings_by_validator(&offender())
                .unwrap()
                .into_iter()
                .map(|u| (u.delegator, u.amount))
                .collect();
            for before in &unbondings_before {
                let after = unbondings_after.get(&before.delegator).copied().unwrap_or(0);
                // ── INVARIANT: entries that left before the infraction are untouched ──
                if before.height < infraction_height {
                    prop_assert_eq!(after, before.amount);
                } else {
                    // ── INVARIANT: each slashable entry loses floor(fraction * amount) ──
                    let penalty = mul_bps(before.amount, fraction_bps).unwrap();
                    prop_assert_eq!(before.amount - after, penalty);
                }
            }

            let redelegations_after: HashMap<Pubkey, u64> = ledger
                .redelegations_by_from_validator(&offender())
                .unwrap()
                .into_iter()
                .map(|r| (r.delegator, r.amount))
                .collect();
            for before in &redelegations_before {
                let after = redelegations_after.get(&before.delegator).copied().unwrap_or(0);
                if before.height < infraction_height {
                    prop_assert_eq!(after, before.amount);
                } else {
                    let penalty = mul_bps(before.amount, fraction_bps).unwrap();
                    prop_assert_eq!(before.amount - after, penalty);
                }
            }

            let delegations_after: HashMap<Pubkey, u64> = ledger
                .delegations_by_validator(&offender())
                .unwrap()
                .into_iter()
                .map(|d| (d.delegator, d.amount))
                .collect();
            for (delegator, &before) in &delegations_before {
                let after = delegations_after.get(delegator).copied().unwrap_or(0);
                // ── INVARIANT: bonded delegators are slashed proportionally ──
                prop_assert_eq!(before - after, mul_bps(before, fraction_bps).unwrap());
            }

            // ── INVARIANT: bonded total follows the delegations ──
            let bonded_after = ValidatorRegistry::new(&mut store)
                .require_validator(&offender())
                .unwrap()
                .bond_tokens;
            prop_assert_eq!(bonded_after, delegations_after.values().sum::<u64>());
            prop_assert_eq!(bonded_before - bonded_after, outcome.from_bonded);
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 2. Zero fraction is a no-op
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn zero_fraction_changes_nothing(
            positions in positions(),
            infraction_height in 1..=20u64,
        ) {
            let mut store = build(&positions);
            let before = store.clone();

            let outcome = SlashingEngine::new(&mut store)
                .slash_validator(&offender(), infraction_height, 0)
                .unwrap();

            prop_assert_eq!(outcome.total_slashed(), 0);
            prop_assert_eq!(store, before);
        }
    }
}
