//! TRv1 Staking Test Harness
//!
//! Provides a lightweight block-driven environment for integration-testing
//! the staking engine:
//!
//! - Validators with a funded owner and a self-bond
//! - A simulated chain clock (height and unix time)
//! - Whole-block execution against a [`CacheStore`], committed only when
//!   every step of the block succeeds
//!
//! The harness does NOT model consensus; callers decide who signed each
//! block and which evidence arrives.

use {
    solana_pubkey::Pubkey,
    std::sync::atomic::{AtomicU64, Ordering},
    trv1_staking::{
        AccountLedger, BeginBlockRequest, BlockContext, CacheStore, Delegation, DelegationLedger,
        KvStore, LivenessTracker, MemAccounts, MemStore, Misbehavior, RedelegationInfo,
        StakingEngine, StakingError, StakingParams, StakingResult, UnbondingDelegation, Validator,
        ValidatorRegistry, ValidatorSetSelector, ValidatorUpdate, ValidatorVoteInfo, VoteSignal,
    },
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default self-bond of a test validator.
pub const DEFAULT_SELF_BOND: u64 = 1_000_000;

/// Default number of validators to create in a test cluster.
pub const DEFAULT_VALIDATOR_COUNT: usize = 4;

/// Seconds between simulated blocks.
pub const BLOCK_INTERVAL_SECS: i64 = 5;

/// Unix time of the genesis block (~Nov 2023).
pub const GENESIS_UNIX_TIMESTAMP: i64 = 1_700_000_000;

/// Parameters sized for tests: short windows and queues, 5 second blocks.
pub fn test_params() -> StakingParams {
    StakingParams {
        max_validator_count: 21,
        voting_window_len: 10,
        min_voting_count: 7,
        validator_survival_secs: 60,
        unbond_frozen_height: 5,
        redelegation_active_height: 3,
        max_evidence_age_secs: 600,
        slash_fraction_double_sign_bps: 2_000,
        slash_fraction_downtime_bps: 0,
    }
}

/// Route engine logs to the test output.  Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// Fresh address.  Later calls return greater addresses.
pub fn unique_pubkey() -> Pubkey {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&NEXT.fetch_add(1, Ordering::Relaxed).to_be_bytes());
    Pubkey::new_from_array(bytes)
}

// ─── Test validator ──────────────────────────────────────────────────────────

/// A registered validator and the account that bonded its initial stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestValidator {
    pub address: Pubkey,
    pub owner: Pubkey,
    pub self_bond: u64,
}

impl TestValidator {
    pub fn new(self_bond: u64) -> Self {
        Self {
            address: unique_pubkey(),
            owner: unique_pubkey(),
            self_bond,
        }
    }
}

// ─── Test harness ────────────────────────────────────────────────────────────

/// Staking state plus a simulated chain.
///
/// Every `run_block*` call advances the clock by one block, runs
/// `begin_block`, the supplied transactions and `end_block`, then commits.
/// A failing block leaves the committed state and the balances untouched.
pub struct StakingTestHarness {
    pub engine: StakingEngine,
    /// Committed state.
    pub state: MemStore,
    pub accounts: MemAccounts,
    pub validators: Vec<TestValidator>,
    pub current_height: u64,
    pub current_unix_timestamp: i64,
    /// Validator updates returned by the last committed block.
    pub last_updates: Vec<ValidatorUpdate>,
}

impl Default for StakingTestHarness {
    fn default() -> Self {
        Self::with_stakes(test_params(), &[DEFAULT_SELF_BOND; DEFAULT_VALIDATOR_COUNT])
    }
}

impl StakingTestHarness {
    /// Empty chain at height 0.
    pub fn new(params: StakingParams) -> Self {
        init_logging();
        let engine = match StakingEngine::new(params) {
            Ok(engine) => engine,
            Err(err) => panic!("invalid test params: {err}"),
        };
        Self {
            engine,
            state: MemStore::new(),
            accounts: MemAccounts::new(),
            validators: Vec::new(),
            current_height: 0,
            current_unix_timestamp: GENESIS_UNIX_TIMESTAMP,
            last_updates: Vec::new(),
        }
    }

    /// Chain whose genesis block (height 1) registers one validator per
    /// stake and selects the first set.
    pub fn with_stakes(params: StakingParams, stakes: &[u64]) -> Self {
        let mut harness = Self::new(params);
        let validators: Vec<TestValidator> =
            stakes.iter().map(|&stake| TestValidator::new(stake)).collect();
        for validator in &validators {
            harness.fund(&validator.owner, validator.self_bond);
        }
        let genesis = harness.run_block(BeginBlockRequest::default(), |store, accounts, ctx| {
            for validator in &validators {
                register(store, accounts, ctx, validator)?;
            }
            Ok(())
        });
        if let Err(err) = genesis {
            panic!("genesis block failed: {err}");
        }
        harness.validators = validators;
        harness
    }

    pub fn ctx(&self) -> BlockContext {
        BlockContext::new(self.current_height, self.current_unix_timestamp)
    }

    /// Advance the clock by one block without executing it.
    pub fn advance_block(&mut self) {
        self.current_height = self.current_height.saturating_add(1);
        self.current_unix_timestamp = self
            .current_unix_timestamp
            .saturating_add(BLOCK_INTERVAL_SECS);
    }

    /// Advance the clock by `secs` without producing blocks.
    pub fn advance_time(&mut self, secs: i64) {
        self.current_unix_timestamp = self.current_unix_timestamp.saturating_add(secs);
    }

    pub fn fund(&mut self, account: &Pubkey, amount: u64) {
        if let Err(err) = self.accounts.credit(account, amount) {
            panic!("funding {account} failed: {err}");
        }
    }

    // ─── Block execution ─────────────────────────────────────────────────

    /// Execute one block.  `txs` runs between `begin_block` and
    /// `end_block` against the block's pending state.
    pub fn run_block<F>(
        &mut self,
        request: BeginBlockRequest,
        txs: F,
    ) -> StakingResult<Vec<ValidatorUpdate>>
    where
        F: FnOnce(&mut dyn KvStore, &mut MemAccounts, &BlockContext) -> StakingResult<()>,
    {
        self.advance_block();
        let ctx = self.ctx();
        let accounts_before = self.accounts.clone();

        let mut block = CacheStore::new(&mut self.state);
        let result = execute_block(
            &self.engine,
            &mut block,
            &mut self.accounts,
            &ctx,
            &request,
            txs,
        );
        match result {
            Ok(updates) => {
                block.commit();
                self.last_updates.clone_from(&updates);
                Ok(updates)
            }
            Err(err) => {
                block.discard();
                self.accounts = accounts_before;
                Err(err)
            }
        }
    }

    /// Execute a block in which every member of the current set signed.
    pub fn next_block(&mut self) -> StakingResult<Vec<ValidatorUpdate>> {
        let request = self.all_signed_request();
        self.run_block(request, |_, _, _| Ok(()))
    }

    /// Execute `n` blocks in which every member of the current set signed.
    pub fn advance_blocks(&mut self, n: u64) -> StakingResult<()> {
        for _ in 0..n {
            self.next_block()?;
        }
        Ok(())
    }

    /// Execute a block in which `missing` did not sign and everyone else
    /// in the current set did.
    pub fn next_block_missing(
        &mut self,
        missing: &[Pubkey],
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        let mut request = self.all_signed_request();
        for vote in &mut request.last_commit_votes {
            if missing.contains(&vote.address) {
                vote.signed = false;
            }
        }
        self.run_block(request, |_, _, _| Ok(()))
    }

    /// Execute a block carrying double-sign evidence against `address` for
    /// an infraction at `height`, observed `age_secs` ago.
    pub fn report_double_sign(
        &mut self,
        address: Pubkey,
        height: u64,
        age_secs: i64,
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        let mut request = self.all_signed_request();
        let time = self
            .current_unix_timestamp
            .saturating_add(BLOCK_INTERVAL_SECS)
            .saturating_sub(age_secs);
        request.byzantine_validators.push(Misbehavior {
            address,
            height,
            time,
        });
        self.run_block(request, |_, _, _| Ok(()))
    }

    /// Last-commit votes with every member of the current set signing.
    pub fn all_signed_request(&mut self) -> BeginBlockRequest {
        BeginBlockRequest {
            last_commit_votes: self
                .current_set()
                .into_iter()
                .map(|member| VoteSignal {
                    address: member.address,
                    signed: true,
                })
                .collect(),
            byzantine_validators: Vec::new(),
        }
    }

    // ─── Transactions ────────────────────────────────────────────────────

    /// Register a new validator with a funded owner and `self_bond` bonded.
    pub fn add_validator(&mut self, self_bond: u64) -> StakingResult<TestValidator> {
        let validator = TestValidator::new(self_bond);
        self.fund(&validator.owner, self_bond);
        let request = self.all_signed_request();
        self.run_block(request, |store, accounts, ctx| {
            register(store, accounts, ctx, &validator)
        })?;
        self.validators.push(validator);
        Ok(validator)
    }

    pub fn delegate(
        &mut self,
        delegator: Pubkey,
        validator: Pubkey,
        amount: u64,
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        let request = self.all_signed_request();
        self.run_block(request, |store, accounts, _| {
            let delegation = Delegation {
                delegator,
                validator,
                amount,
                is_compound: false,
            };
            DelegationLedger::new(store).delegate(accounts, &delegation, false)
        })
    }

    pub fn unbond(
        &mut self,
        delegator: Pubkey,
        validator: Pubkey,
        amount: u64,
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        let unbond_frozen_height = self.engine.params().unbond_frozen_height;
        let request = self.all_signed_request();
        self.run_block(request, |store, _, ctx| {
            let mut ledger = DelegationLedger::new(store);
            let current = ledger
                .get_delegation(&delegator, &validator)?
                .ok_or(StakingError::DelegationNotFound {
                    delegator,
                    validator,
                })?;
            ledger.unbond_tokens(&current, amount, ctx.height, unbond_frozen_height)
        })
    }

    pub fn redelegate(
        &mut self,
        delegator: Pubkey,
        from_validator: Pubkey,
        to_validator: Pubkey,
        amount: u64,
    ) -> StakingResult<Vec<ValidatorUpdate>> {
        let active_height = self.engine.params().redelegation_active_height;
        let request = self.all_signed_request();
        self.run_block(request, |store, _, ctx| {
            let mut ledger = DelegationLedger::new(store);
            let current = ledger
                .get_delegation(&delegator, &from_validator)?
                .ok_or(StakingError::DelegationNotFound {
                    delegator,
                    validator: from_validator,
                })?;
            let info = RedelegationInfo {
                delegator,
                from_validator,
                to_validator,
                amount,
                height: ctx.height,
                complete_height: ctx.height.saturating_add(active_height),
                is_compound: current.is_compound,
            };
            ledger.redelegate(&current, &info)
        })
    }

    /// Reactivate `address` in its own block.
    pub fn reactivate(&mut self, address: Pubkey) -> StakingResult<Vec<ValidatorUpdate>> {
        let engine = self.engine.clone();
        let request = self.all_signed_request();
        self.run_block(request, |store, _, ctx| {
            engine.reactivate_validator(store, ctx, &address)
        })
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn balance(&self, account: &Pubkey) -> u64 {
        self.accounts.balance(account)
    }

    pub fn validator(&mut self, address: &Pubkey) -> Option<Validator> {
        ValidatorRegistry::new(&mut self.state)
            .get_validator(address)
            .ok()
            .flatten()
    }

    pub fn is_active(&mut self, address: &Pubkey) -> bool {
        self.validator(address)
            .map(|validator| validator.is_active())
            .unwrap_or(false)
    }

    pub fn delegation(&mut self, delegator: &Pubkey, validator: &Pubkey) -> Option<Delegation> {
        DelegationLedger::new(&mut self.state)
            .get_delegation(delegator, validator)
            .ok()
            .flatten()
    }

    /// Sum of the delegations held by `validator`.
    pub fn delegation_sum(&mut self, validator: &Pubkey) -> u64 {
        DelegationLedger::new(&mut self.state)
            .delegations_by_validator(validator)
            .unwrap_or_default()
            .iter()
            .fold(0u64, |sum, delegation| sum.saturating_add(delegation.amount))
    }

    pub fn vote_info(&mut self, address: &Pubkey) -> Option<ValidatorVoteInfo> {
        let params = self.engine.params().clone();
        LivenessTracker::new(&mut self.state, &params)
            .get_vote_info(address)
            .ok()
            .flatten()
    }

    /// Set committed by the last block, in rank order.
    pub fn current_set(&mut self) -> Vec<ValidatorUpdate> {
        let params = self.engine.params().clone();
        ValidatorSetSelector::new(&mut self.state, &params)
            .last_validator_set()
            .unwrap_or_default()
    }

    /// Balances plus every bonded and queued amount.
    pub fn total_supply(&mut self) -> u128 {
        let ledger = DelegationLedger::new(&mut self.state);
        let bonded: u128 = ledger
            .iterate_delegations()
            .unwrap_or_default()
            .iter()
            .map(|delegation| u128::from(delegation.amount))
            .sum();
        let unbonding: u128 = ledger
            .iterate_queue::<UnbondingDelegation>()
            .unwrap_or_default()
            .iter()
            .map(|entry| u128::from(entry.amount))
            .sum();
        let redelegating: u128 = ledger
            .iterate_queue::<RedelegationInfo>()
            .unwrap_or_default()
            .iter()
            .map(|entry| u128::from(entry.amount))
            .sum();
        self.accounts
            .total()
            .saturating_add(bonded)
            .saturating_add(unbonding)
            .saturating_add(redelegating)
    }
}

fn execute_block<F>(
    engine: &StakingEngine,
    store: &mut dyn KvStore,
    accounts: &mut MemAccounts,
    ctx: &BlockContext,
    request: &BeginBlockRequest,
    txs: F,
) -> StakingResult<Vec<ValidatorUpdate>>
where
    F: FnOnce(&mut dyn KvStore, &mut MemAccounts, &BlockContext) -> StakingResult<()>,
{
    engine.begin_block(store, ctx, request)?;
    txs(store, accounts, ctx)?;
    engine.end_block(store, accounts, ctx)
}

fn register(
    store: &mut dyn KvStore,
    accounts: &mut MemAccounts,
    ctx: &BlockContext,
    validator: &TestValidator,
) -> StakingResult<()> {
    ValidatorRegistry::new(store).create_validator(&Validator::new(
        validator.address,
        validator.owner,
        ctx.height,
    ))?;
    let bond = Delegation {
        delegator: validator.owner,
        validator: validator.address,
        amount: validator.self_bond,
        is_compound: false,
    };
    DelegationLedger::new(store).delegate(accounts, &bond, false)
}
