//! Protocol State Machine - Core orchestration engine.
//!
//! The state machine owns the [`LedgerState`] and a price oracle and is the
//! only entry point that commits changes. Every call runs atomically:
//!
//! 1. The oracle price is read once.
//! 2. The state is checkpointed.
//! 3. The engine updates internal accounting and queues its interactions.
//! 4. Interactions are settled against the token and collateral ledgers.
//!
//! Any error in steps 3 or 4 restores the checkpoint, so a failed call
//! leaves no trace.

use tracing::{debug, warn};

use crate::core::accrual::{self, DripRecord, ParUpdate};
use crate::core::collateral::CollateralAmount;
use crate::core::config::ProtocolConfig;
use crate::core::interactions::Interactions;
use crate::error::{Error, Result};
use crate::liquidation::engine::{self, LiquidationMode, LiquidationRecord};
use crate::liquidation::recovery::RecoveryModeStatus;
use crate::liquidation::stability_pool::DepositChange;
use crate::monitoring::health::{self, HealthReport};
use crate::oracle::PriceOracle;
use crate::protocol::events::{
    ParUpdatedEvent, PositionUpdate, ProtocolEvent, StabilityDepositEvent,
};
use crate::protocol::operations::{CallContext, OperationResult, ProtocolOperation};
use crate::protocol::positions::{self, OpenTroveRequest};
use crate::protocol::state::LedgerState;
use crate::redemption::engine::{self as redemption, RedemptionHints, RedemptionRecord, RedemptionRequest};
use crate::utils::crypto::{AccountId, Hash, TroveId};
use crate::utils::validation::{validate_balance, validate_price};

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol state machine - orchestrates all operations
pub struct ProtocolStateMachine<O: PriceOracle> {
    /// Committed ledger state
    state: LedgerState,
    /// Collateral price source
    oracle: O,
    /// Calls rolled back so far
    rolled_back: u64,
}

impl<O: PriceOracle> ProtocolStateMachine<O> {
    /// Create a state machine over an empty ledger
    pub fn new(config: ProtocolConfig, oracle: O, genesis: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_state(LedgerState::new(config, genesis), oracle))
    }

    /// Resume from an existing ledger
    pub fn from_state(state: LedgerState, oracle: O) -> Self {
        Self {
            state,
            oracle,
            rolled_back: 0,
        }
    }

    /// Committed state
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Consume the machine, returning its state
    pub fn into_state(self) -> LedgerState {
        self.state
    }

    /// Price oracle
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Mutable price oracle
    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Protocol configuration
    pub fn config(&self) -> &ProtocolConfig {
        &self.state.config
    }

    /// Number of calls rolled back
    pub fn rolled_back(&self) -> u64 {
        self.rolled_back
    }

    fn price(&self) -> Result<u128> {
        let price = self.oracle.current_price()?;
        validate_price(price)?;
        Ok(price)
    }

    /// Run `f` against the state, settle its interactions and commit, or
    /// restore the checkpoint on any error.
    ///
    /// The event log stays out of the checkpoint; rollback truncates it to
    /// its length at entry.
    fn atomically<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut LedgerState, &mut Interactions) -> Result<T>,
    ) -> Result<T> {
        let events = std::mem::take(&mut self.state.events);
        let mut checkpoint = self.state.clone();
        self.state.events = events;
        let committed_events = self.state.events.len();
        let mut fx = Interactions::new();

        let outcome = f(&mut self.state, &mut fx).and_then(|value| {
            let settled = fx.settle(&mut self.state.debt_token, &mut self.state.collateral)?;
            debug!(operation, settled, "Call committed");
            Ok(value)
        });

        if let Err(e) = &outcome {
            warn!(operation, error = %e, code = e.code(), "Call rolled back");
            checkpoint.events = std::mem::take(&mut self.state.events);
            checkpoint.events.truncate(committed_events);
            self.state = checkpoint;
            self.rolled_back += 1;
        }
        outcome
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute a protocol operation
    pub fn execute(&mut self, ctx: CallContext, op: ProtocolOperation) -> Result<OperationResult> {
        debug!(operation = op.operation_type(), caller = %ctx.caller.short(), timestamp = ctx.timestamp, "Executing");
        match op {
            ProtocolOperation::Drip => self.drip(ctx).map(OperationResult::Drip),
            ProtocolOperation::UpdatePar { market_price } => self
                .update_par(ctx, market_price)
                .map(OperationResult::ParUpdated),
            ProtocolOperation::Liquidate(mode) => {
                self.liquidate(ctx, mode).map(OperationResult::Liquidated)
            }
            ProtocolOperation::Redeem(request) => {
                self.redeem(ctx, request).map(OperationResult::Redeemed)
            }
            ProtocolOperation::ProvideToStabilityPool { amount } => self
                .provide_to_stability_pool(ctx, amount)
                .map(OperationResult::StabilityDeposit),
            ProtocolOperation::WithdrawFromStabilityPool { amount } => self
                .withdraw_from_stability_pool(ctx, amount)
                .map(OperationResult::StabilityDeposit),
            ProtocolOperation::OpenTrove(request) => {
                self.open_trove(ctx, request).map(OperationResult::Position)
            }
            ProtocolOperation::CloseTrove(id) => {
                self.close_trove(ctx, id).map(OperationResult::Position)
            }
            ProtocolOperation::ClaimSurplus => {
                self.claim_surplus(ctx).map(OperationResult::SurplusClaimed)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCRUAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Accrue interest up to the call time
    pub fn drip(&mut self, ctx: CallContext) -> Result<Option<DripRecord>> {
        self.atomically("drip", |state, fx| state.accrue(ctx.timestamp, fx))
    }

    /// Move par towards `market_price`; accrues at the old par first
    pub fn update_par(&mut self, ctx: CallContext, market_price: u128) -> Result<ParUpdate> {
        self.atomically("update_par", |state, fx| {
            state.accrue(ctx.timestamp, fx)?;
            let update = accrual::update_par(
                &mut state.rates,
                &state.config.rates,
                market_price,
                ctx.timestamp,
            )?;
            state.events.push(ProtocolEvent::ParUpdated(ParUpdatedEvent {
                timestamp: ctx.timestamp,
                update,
            }));
            Ok(update)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION & REDEMPTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate positions; gas compensation goes to the caller
    pub fn liquidate(&mut self, ctx: CallContext, mode: LiquidationMode) -> Result<LiquidationRecord> {
        let price = self.price()?;
        self.atomically("liquidate", |state, fx| {
            engine::liquidate(state, mode, ctx.caller, price, ctx.timestamp, fx)
        })
    }

    /// Redeem the caller's debt tokens for collateral
    pub fn redeem(&mut self, ctx: CallContext, request: RedemptionRequest) -> Result<RedemptionRecord> {
        let price = self.price()?;
        self.atomically("redeem", |state, fx| {
            redemption::redeem(state, ctx.caller, request, price, ctx.timestamp, fx)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STABILITY POOL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit the caller's debt tokens into the stability pool
    pub fn provide_to_stability_pool(&mut self, ctx: CallContext, amount: u128) -> Result<DepositChange> {
        self.atomically("provide_to_stability_pool", |state, fx| {
            state.accrue(ctx.timestamp, fx)?;
            validate_balance(amount, state.debt_token.balance_of(&ctx.caller.into()).wad())?;
            let change = state
                .stability_pool
                .provide(ctx.caller, amount, ctx.timestamp, fx)?;
            state
                .events
                .push(ProtocolEvent::StabilityDeposit(StabilityDepositEvent {
                    timestamp: ctx.timestamp,
                    change,
                }));
            Ok(change)
        })
    }

    /// Withdraw from the stability pool; zero only claims gains
    pub fn withdraw_from_stability_pool(&mut self, ctx: CallContext, amount: u128) -> Result<DepositChange> {
        self.atomically("withdraw_from_stability_pool", |state, fx| {
            state.accrue(ctx.timestamp, fx)?;
            let change = state
                .stability_pool
                .withdraw(ctx.caller, amount, ctx.timestamp, fx)?;
            state
                .events
                .push(ProtocolEvent::StabilityWithdrawal(StabilityDepositEvent {
                    timestamp: ctx.timestamp,
                    change,
                }));
            Ok(change)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open a position owned by the caller
    pub fn open_trove(&mut self, ctx: CallContext, request: OpenTroveRequest) -> Result<PositionUpdate> {
        if request.owner != ctx.caller {
            return Err(Error::Unauthorized(format!(
                "{} cannot open a position for {}",
                ctx.caller.short(),
                request.owner.short()
            )));
        }
        let price = self.price()?;
        self.atomically("open_trove", |state, fx| {
            positions::open_trove(state, request, price, ctx.timestamp, fx)
        })
    }

    /// Repay and close one of the caller's positions
    pub fn close_trove(&mut self, ctx: CallContext, trove_id: TroveId) -> Result<PositionUpdate> {
        let price = self.price()?;
        self.atomically("close_trove", |state, fx| {
            positions::close_trove(state, ctx.caller, trove_id, price, ctx.timestamp, fx)
        })
    }

    /// Collect the caller's surplus collateral
    pub fn claim_surplus(&mut self, ctx: CallContext) -> Result<u128> {
        self.atomically("claim_surplus", |state, fx| {
            positions::claim_surplus(state, ctx.caller, ctx.timestamp, fx)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXTERNAL COLLATERAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Credit collateral brought in from outside the ledger
    pub fn deposit_collateral(&mut self, account: AccountId, amount: u128) -> Result<()> {
        self.state
            .collateral
            .fund(account.into(), CollateralAmount::from_wad(amount))
    }

    /// Send an account's free collateral out of the ledger
    pub fn withdraw_collateral(&mut self, account: AccountId, amount: u128) -> Result<()> {
        self.state
            .collateral
            .withdraw(account.into(), CollateralAmount::from_wad(amount))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Total collateralization ratio at the oracle price
    pub fn tcr(&self) -> Result<u128> {
        Ok(self.state.tcr(self.price()?))
    }

    /// Recovery mode metrics at the oracle price
    pub fn recovery_status(&self) -> Result<RecoveryModeStatus> {
        Ok(self.state.recovery_status(self.price()?))
    }

    /// Check if the system is in recovery mode at the oracle price
    pub fn is_recovery_mode(&self) -> Result<bool> {
        Ok(self.state.is_recovery_mode(self.price()?))
    }

    /// Hints for redeeming `amount` at the oracle price
    pub fn redemption_hints(&self, amount: u128, max_iterations: usize) -> Result<RedemptionHints> {
        redemption::redemption_hints(&self.state, amount, self.price()?, max_iterations)
    }

    /// Positions liquidatable at the oracle price
    pub fn liquidatable_troves(&self) -> Result<Vec<TroveId>> {
        engine::liquidatable_troves(&self.state, self.price()?)
    }

    /// Current ICR of a position at the oracle price
    pub fn current_icr(&self, trove_id: &TroveId) -> Result<u128> {
        let pricing = self.state.pricing(self.price()?);
        self.state.troves.current_icr(trove_id, &pricing)
    }

    /// Run the ledger health checks
    pub fn check_health(&self) -> HealthReport {
        health::check_invariants(&self.state)
    }

    /// Debt token balance of an account
    pub fn balance_of(&self, account: &AccountId) -> u128 {
        self.state.debt_token.balance_of(&(*account).into()).wad()
    }

    /// Collateral balance of an account
    pub fn collateral_of(&self, account: &AccountId) -> u128 {
        self.state.collateral.balance_of(&(*account).into()).wad()
    }

    /// Hash of the committed state
    pub fn state_hash(&self) -> Hash {
        self.state.state_hash()
    }
}
