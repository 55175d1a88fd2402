//! Property-based tests for delegation ledger bookkeeping.
//!
//! Properties tested:
//! 1. A validator's bonded total equals the sum of its delegations.
//! 2. Balances plus bonded plus queued stake is conserved without slashing.
//! 3. Failed debits leave state untouched.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        solana_pubkey::Pubkey,
        trv1_staking::{
            AccountLedger, BlockContext, Delegation, DelegationLedger, MemAccounts, MemStore,
            RedelegationInfo, StakingEngine, StakingError, StakingParams, UnbondingDelegation,
            Validator, ValidatorRegistry,
        },
    };

    const VALIDATORS: u8 = 3;
    const DELEGATORS: u8 = 4;
    const INITIAL_BALANCE: u64 = 5_000;

    fn validator(index: u8) -> Pubkey {
        Pubkey::new_from_array([100 + index; 32])
    }

    fn delegator(index: u8) -> Pubkey {
        Pubkey::new_from_array([1 + index; 32])
    }

    fn params() -> StakingParams {
        StakingParams {
            unbond_frozen_height: 3,
            redelegation_active_height: 2,
            ..Default::default()
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Delegate { from: u8, to: u8, amount: u64 },
        Unbond { from: u8, at: u8, amount: u64 },
        Redelegate { from: u8, src: u8, dst: u8, amount: u64 },
        EndBlock,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..DELEGATORS, 0..VALIDATORS, 1..2_000u64)
                .prop_map(|(from, to, amount)| Op::Delegate { from, to, amount }),
            (0..DELEGATORS, 0..VALIDATORS, 1..2_000u64)
                .prop_map(|(from, at, amount)| Op::Unbond { from, at, amount }),
            (0..DELEGATORS, 0..VALIDATORS, 0..VALIDATORS, 1..2_000u64).prop_map(
                |(from, src, dst, amount)| Op::Redelegate {
                    from,
                    src,
                    dst,
                    amount
                }
            ),
            Just(Op::EndBlock),
        ]
    }

    fn setup() -> (MemStore, MemAccounts) {
        let mut store = MemStore::new();
        for index in 0..VALIDATORS {
            ValidatorRegistry::new(&mut store)
                .create_validator(&Validator::new(validator(index), validator(index), 0))
                .unwrap();
        }
        let accounts = MemAccounts::with_balances(
            (0..DELEGATORS).map(|index| (delegator(index), INITIAL_BALANCE)),
        );
        (store, accounts)
    }

    fn total_supply(store: &mut MemStore, accounts: &MemAccounts) -> u128 {
        let ledger = DelegationLedger::new(store);
        let bonded: u128 = ledger
            .iterate_delegations()
            .unwrap()
            .iter()
            .map(|d| d.amount as u128)
            .sum();
        let unbonding: u128 = ledger
            .iterate_queue::<UnbondingDelegation>()
            .unwrap()
            .iter()
            .map(|e| e.amount as u128)
            .sum();
        let redelegating: u128 = ledger
            .iterate_queue::<RedelegationInfo>()
            .unwrap()
            .iter()
            .map(|e| e.amount as u128)
            .sum();
        accounts.total() + bonded + unbonding + redelegating
    }

    fn apply(
        engine: &StakingEngine,
        store: &mut MemStore,
        accounts: &mut MemAccounts,
        height: u64,
        op: &Op,
    ) {
        let params = engine.params();
        match *op {
            Op::Delegate { from, to, amount } => {
                let info = Delegation {
                    delegator: delegator(from),
                    validator: validator(to),
                    amount,
                    is_compound: false,
                };
                let before = store.clone();
                match DelegationLedger::new(store).delegate(accounts, &info, false) {
                    Ok(()) => {}
                    Err(StakingError::InsufficientBalance { .. }) => assert_eq!(*store, before),
                    Err(err) => panic!("unexpected delegate failure: {err}"),
                }
            }
            Op::Unbond { from, at, amount } => {
                let mut ledger = DelegationLedger::new(store);
                let current = ledger
                    .get_delegation(&delegator(from), &validator(at))
                    .unwrap();
                if let Some(current) = current {
                    let amount = amount.min(current.amount);
                    ledger
                        .unbond_tokens(&current, amount, height, params.unbond_frozen_height)
                        .unwrap();
                }
            }
            Op::Redelegate {
                from,
                src,
                dst,
                amount,
            } => {
                let mut ledger = DelegationLedger::new(store);
                let current = ledger
                    .get_delegation(&delegator(from), &validator(src))
                    .unwrap();
                if let Some(current) = current {
                    let info = RedelegationInfo {
                        delegator: current.delegator,
                        from_validator: current.validator,
                        to_validator: validator(dst),
                        amount: amount.min(current.amount),
                        height,
                        complete_height: height + params.redelegation_active_height,
                        is_compound: current.is_compound,
                    };
                    ledger.redelegate(&current, &info).unwrap();
                }
            }
            Op::EndBlock => {
                engine
                    .end_block(store, accounts, &BlockContext::new(height, height as i64 * 5))
                    .unwrap();
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 1. Bonded totals and supply across random operation sequences
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn bonded_totals_and_supply_hold(ops in prop::collection::vec(op(), 1..60)) {
            let engine = StakingEngine::new(params()).unwrap();
            let (mut store, mut accounts) = setup();
            let supply = total_supply(&mut store, &accounts);

            for (i, op) in ops.iter().enumerate() {
                let height = i as u64 + 1;
                apply(&engine, &mut store, &mut accounts, height, op);

                // ── INVARIANT: bond_tokens == sum of delegations ──
                for index in 0..VALIDATORS {
                    let address = validator(index);
                    let bonded = ValidatorRegistry::new(&mut store)
                        .require_validator(&address)
                        .unwrap()
                        .bond_tokens;
                    let sum: u64 = DelegationLedger::new(&mut store)
                        .delegations_by_validator(&address)
                        .unwrap()
                        .iter()
                        .map(|d| d.amount)
                        .sum();
                    prop_assert_eq!(bonded, sum, "validator {} drifted after {:?}", index, op);
                }

                // ── INVARIANT: no stake created or destroyed ──
                prop_assert_eq!(total_supply(&mut store, &accounts), supply);
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 2. Every queued entry is eventually settled
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn queues_drain_after_maturity(ops in prop::collection::vec(op(), 1..40)) {
            let engine = StakingEngine::new(params()).unwrap();
            let (mut store, mut accounts) = setup();
            let mut height = 0;
            for op in &ops {
                height += 1;
                apply(&engine, &mut store, &mut accounts, height, op);
            }

            let params = engine.params();
            let horizon =
                height + params.unbond_frozen_height.max(params.redelegation_active_height);
            let ctx = BlockContext::new(horizon, horizon as i64 * 5);
            engine.end_block(&mut store, &mut accounts, &ctx).unwrap();

            let ledger = DelegationLedger::new(&mut store);
            // ── INVARIANT: nothing pending past its completion height ──
            prop_assert!(ledger.iterate_queue::<UnbondingDelegation>().unwrap().is_empty());
            prop_assert!(ledger.iterate_queue::<RedelegationInfo>().unwrap().is_empty());
            let paid_out: u64 = (0..DELEGATORS).map(|i| accounts.balance(&delegator(i))).sum();
            let bonded: u64 = ledger.iterate_delegations().unwrap().iter().map(|d| d.amount).sum();
            prop_assert_eq!(paid_out + bonded, INITIAL_BALANCE * DELEGATORS as u64);
        }
    }
}
