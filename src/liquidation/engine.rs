//! Liquidation orchestrator.
//!
//! Handles the liquidation of undercollateralized positions:
//! - Assessment of each candidate against the current mode
//! - Offset against the stability pool
//! - Redistribution of whatever the pool cannot absorb
//! - Surplus collateral returned to former owners
//!
//! Single, sequence and batch liquidations share one per-position routine.
//! Sequences and batches skip ineligible candidates instead of failing; the
//! whole call only fails when nothing at all was liquidated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::accrual::PricingContext;
use crate::core::interactions::Interactions;
use crate::core::pools::PoolId;
use crate::core::trove::{Cohort, TroveOperation, TroveStatus};
use crate::error::{Error, Result};
use crate::liquidation::recovery;
use crate::liquidation::stability_pool::OffsetOutcome;
use crate::protocol::events::{PositionUpdate, ProtocolEvent};
use crate::protocol::state::LedgerState;
use crate::utils::constants::WAD;
use crate::utils::crypto::{AccountId, TroveId};
use crate::utils::math::{debt_to_collateral, mul_div};

// ═══════════════════════════════════════════════════════════════════════════════
// MODES & ASSESSMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Which positions a liquidation call targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationMode {
    /// One named position; fails if it is not liquidatable
    Single(TroveId),
    /// Up to `n` riskiest positions across both cohorts
    Sequence(usize),
    /// An explicit list, skipping ineligible entries
    Batch(Vec<TroveId>),
}

/// Eligibility of one candidate at the current price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    /// Can be liquidated now
    Liquidatable {
        /// Current ICR
        icr: u128,
        /// Recovery mode liquidation above MCR; seizure capped at the max penalty
        capped: bool,
        /// Recovery mode liquidation at or below 100%; bypasses the stability pool
        redistribute_only: bool,
    },
    /// Nonexistent or already closed
    NotActive,
    /// ICR at or above MCR outside recovery mode
    Healthy {
        /// Current ICR
        icr: u128,
    },
    /// ICR at or above TCR in recovery mode
    Immune {
        /// Current ICR
        icr: u128,
    },
    /// Recovery mode candidate whose debt exceeds stability pool deposits
    InsufficientPool {
        /// Current ICR
        icr: u128,
    },
    /// Redistribution needed but no other position holds stake
    NoRedistributionTarget,
}

impl Assessment {
    /// Check if the candidate can be liquidated
    pub fn is_liquidatable(&self) -> bool {
        matches!(self, Assessment::Liquidatable { .. })
    }

    /// A sequence walking worst-first can stop at this cohort
    fn ends_sequence(&self) -> bool {
        matches!(
            self,
            Assessment::Healthy { .. } | Assessment::Immune { .. } | Assessment::InsufficientPool { .. }
        )
    }
}

/// Decide whether a position can be liquidated right now.
///
/// Reads entire (pending-inclusive) amounts and recomputes TCR from the
/// current pools. Multi-position calls assess every candidate once up front
/// and only liquidate those that were liquidatable then and still are.
pub fn assess(state: &LedgerState, id: &TroveId, pricing: &PricingContext) -> Result<Assessment> {
    let trove = match state.troves.get(id) {
        Some(trove) if trove.is_active() => trove,
        _ => return Ok(Assessment::NotActive),
    };
    let params = &state.config.params;
    let icr = state.troves.current_icr(id, pricing)?;
    let tcr = recovery::calculate_tcr(&state.pools, pricing.price, pricing.par);
    let recovery_mode = recovery::is_recovery_mode(tcr, params);
    let entire = state
        .troves
        .entire_debt_and_coll(id, pricing.accumulated(trove.cohort))?;

    let (capped, redistribute_only) = if icr < params.min_collateral_ratio {
        (false, recovery_mode && icr <= WAD)
    } else if !recovery_mode {
        return Ok(Assessment::Healthy { icr });
    } else if icr >= tcr {
        return Ok(Assessment::Immune { icr });
    } else if !state.stability_pool.can_absorb(entire.debt) {
        return Ok(Assessment::InsufficientPool { icr });
    } else {
        (true, false)
    };

    let absorbable = if redistribute_only {
        0
    } else {
        state.stability_pool.total_deposits()
    };
    if entire.debt > absorbable
        && state
            .troves
            .redistribution_target(trove.cohort, trove.stake)
            .is_none()
    {
        return Ok(Assessment::NoRedistributionTarget);
    }

    Ok(Assessment::Liquidatable {
        icr,
        capped,
        redistribute_only,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome for one liquidated position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidatedTrove {
    /// Position
    pub trove_id: TroveId,
    /// Former owner
    pub owner: AccountId,
    /// Cohort
    pub cohort: Cohort,
    /// ICR at liquidation
    pub icr: u128,
    /// Entire debt closed
    pub debt: u128,
    /// Entire collateral taken from the position
    pub collateral: u128,
    /// Collateral paid to the caller
    pub gas_compensation: u128,
    /// Debt cancelled against stability pool deposits
    pub debt_offset: u128,
    /// Collateral sent to the stability pool
    pub collateral_to_stability_pool: u128,
    /// Debt spread over remaining positions
    pub debt_redistributed: u128,
    /// Collateral spread over remaining positions
    pub collateral_redistributed: u128,
    /// Collateral credited to the owner's surplus claim
    pub surplus: u128,
    /// Cohort that absorbed the redistribution
    pub redistributed_to: Option<Cohort>,
    /// Seizure was capped (recovery mode above MCR)
    pub capped: bool,
}

impl LiquidatedTrove {
    /// Collateral liquidated after gas compensation, before surplus
    pub fn collateral_seized(&self) -> u128 {
        self.collateral_to_stability_pool
            .saturating_add(self.collateral_redistributed)
    }
}

/// Summary of one liquidation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    /// Time of the call
    pub timestamp: u64,
    /// Account that triggered the liquidation
    pub caller: AccountId,
    /// Collateral price used
    pub price: u128,
    /// Par used
    pub par: u128,
    /// Whether the system was in recovery mode when the call started
    pub recovery_mode: bool,
    /// Liquidated positions in order
    pub liquidated: Vec<LiquidatedTrove>,
    /// Candidates passed over
    pub skipped: Vec<TroveId>,
    /// Debt closed
    pub total_debt: u128,
    /// Collateral taken from positions
    pub total_collateral: u128,
    /// Collateral paid to the caller
    pub total_gas_compensation: u128,
    /// Debt absorbed by the stability pool
    pub total_debt_offset: u128,
    /// Collateral sent to the stability pool
    pub total_collateral_to_stability_pool: u128,
    /// Debt redistributed
    pub total_debt_redistributed: u128,
    /// Collateral redistributed
    pub total_collateral_redistributed: u128,
    /// Collateral credited to surplus claims
    pub total_surplus: u128,
}

impl LiquidationRecord {
    fn new(timestamp: u64, caller: AccountId, pricing: &PricingContext, recovery_mode: bool) -> Self {
        Self {
            timestamp,
            caller,
            price: pricing.price,
            par: pricing.par,
            recovery_mode,
            liquidated: Vec::new(),
            skipped: Vec::new(),
            total_debt: 0,
            total_collateral: 0,
            total_gas_compensation: 0,
            total_debt_offset: 0,
            total_collateral_to_stability_pool: 0,
            total_debt_redistributed: 0,
            total_collateral_redistributed: 0,
            total_surplus: 0,
        }
    }

    fn push(&mut self, trove: LiquidatedTrove) {
        self.total_debt = self.total_debt.saturating_add(trove.debt);
        self.total_collateral = self.total_collateral.saturating_add(trove.collateral);
        self.total_gas_compensation = self
            .total_gas_compensation
            .saturating_add(trove.gas_compensation);
        self.total_debt_offset = self.total_debt_offset.saturating_add(trove.debt_offset);
        self.total_collateral_to_stability_pool = self
            .total_collateral_to_stability_pool
            .saturating_add(trove.collateral_to_stability_pool);
        self.total_debt_redistributed = self
            .total_debt_redistributed
            .saturating_add(trove.debt_redistributed);
        self.total_collateral_redistributed = self
            .total_collateral_redistributed
            .saturating_add(trove.collateral_redistributed);
        self.total_surplus = self.total_surplus.saturating_add(trove.surplus);
        self.liquidated.push(trove);
    }

    /// Number of positions liquidated
    pub fn liquidated_count(&self) -> usize {
        self.liquidated.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Run a liquidation call.
///
/// Forces accrual first, then liquidates according to `mode`. Gas
/// compensation is paid to `caller`.
pub fn liquidate(
    state: &mut LedgerState,
    mode: LiquidationMode,
    caller: AccountId,
    price: u128,
    now: u64,
    fx: &mut Interactions,
) -> Result<LiquidationRecord> {
    state.accrue(now, fx)?;
    let pricing = state.pricing(price);
    let mut record = LiquidationRecord::new(now, caller, &pricing, state.is_recovery_mode(price));

    match mode {
        LiquidationMode::Single(id) => {
            state.troves.active(&id)?;
            let at_start = assess(state, &id, &pricing)?;
            let outcome = try_liquidate(state, &id, at_start, &pricing, caller, now, fx, &mut record)?;
            if !outcome.is_liquidatable() {
                debug!(trove = %id.short(), ?outcome, "Position not liquidatable");
                return Err(Error::NothingToLiquidate);
            }
        }
        LiquidationMode::Sequence(max) => {
            liquidate_sequence(state, max, &pricing, caller, now, fx, &mut record)?;
        }
        LiquidationMode::Batch(ids) => {
            if ids.is_empty() {
                return Err(Error::NothingToLiquidate);
            }
            let at_start = ids
                .iter()
                .map(|id| assess(state, id, &pricing))
                .collect::<Result<Vec<_>>>()?;
            for (id, at_start) in ids.into_iter().zip(at_start) {
                let outcome = try_liquidate(state, &id, at_start, &pricing, caller, now, fx, &mut record)?;
                if !outcome.is_liquidatable() {
                    warn!(trove = %id.short(), ?outcome, "Skipping batch candidate");
                    record.skipped.push(id);
                }
            }
        }
    }

    if record.liquidated.is_empty() {
        return Err(Error::NothingToLiquidate);
    }

    for cohort in Cohort::ALL {
        let active_collateral = state.pools.active(cohort).collateral();
        state.troves.update_system_snapshots(cohort, active_collateral);
    }

    let stats = &mut state.stats;
    stats.liquidation_calls += 1;
    stats.troves_liquidated += record.liquidated.len() as u64;
    stats.total_debt_liquidated = stats.total_debt_liquidated.saturating_add(record.total_debt);
    stats.total_collateral_liquidated = stats
        .total_collateral_liquidated
        .saturating_add(record.total_collateral);
    stats.total_gas_compensation = stats
        .total_gas_compensation
        .saturating_add(record.total_gas_compensation);
    stats.total_debt_offset = stats.total_debt_offset.saturating_add(record.total_debt_offset);
    stats.total_debt_redistributed = stats
        .total_debt_redistributed
        .saturating_add(record.total_debt_redistributed);

    info!(
        caller = %caller.short(),
        liquidated = record.liquidated.len(),
        skipped = record.skipped.len(),
        debt = record.total_debt,
        collateral = record.total_collateral,
        debt_offset = record.total_debt_offset,
        recovery_mode = record.recovery_mode,
        "Liquidation completed"
    );
    state.events.push(ProtocolEvent::Liquidation(record.clone()));
    Ok(record)
}

/// Penalty factor for a position liquidated at `icr` outside the capped path.
///
/// Starts at `min_penalty` and takes half of the ICR above it, bounded by
/// `max_penalty`. Stays strictly below ICR once ICR clears the floor, so those
/// positions keep a surplus.
pub fn liquidation_penalty(icr: u128, min_penalty: u128, max_penalty: u128) -> u128 {
    let above_floor = icr.saturating_sub(min_penalty);
    min_penalty.saturating_add(above_floor / 2).min(max_penalty)
}

/// Liquidate `id` if it was liquidatable when the call started and still is.
///
/// Returns the assessment that decided: the call-time one when it already
/// rules the candidate out, the current one otherwise.
#[allow(clippy::too_many_arguments)]
fn try_liquidate(
    state: &mut LedgerState,
    id: &TroveId,
    at_start: Assessment,
    pricing: &PricingContext,
    caller: AccountId,
    now: u64,
    fx: &mut Interactions,
    record: &mut LiquidationRecord,
) -> Result<Assessment> {
    if !at_start.is_liquidatable() {
        return Ok(at_start);
    }
    let current = assess(state, id, pricing)?;
    if let Assessment::Liquidatable {
        icr,
        capped,
        redistribute_only,
    } = current
    {
        let trove = liquidate_trove(state, id, icr, capped, redistribute_only, pricing, caller, now, fx)?;
        record.push(trove);
    }
    Ok(current)
}

/// Assess each cohort from its riskiest end, stopping at the first safe
/// position or after `max` entries
fn snapshot_sequence(
    state: &LedgerState,
    max: usize,
    pricing: &PricingContext,
) -> Result<HashMap<TroveId, Assessment>> {
    let mut snapshot = HashMap::new();
    for cohort in Cohort::ALL {
        let mut cursor = state.troves.last(cohort);
        let mut seen = 0;
        while let Some(id) = cursor {
            if seen == max {
                break;
            }
            let assessment = assess(state, &id, pricing)?;
            snapshot.insert(id, assessment);
            if assessment.ends_sequence() {
                break;
            }
            seen += 1;
            cursor = state.troves.prev(cohort, &id);
        }
    }
    Ok(snapshot)
}

/// Walk both cohorts from their riskiest end, always taking the lower ICR
fn liquidate_sequence(
    state: &mut LedgerState,
    max: usize,
    pricing: &PricingContext,
    caller: AccountId,
    now: u64,
    fx: &mut Interactions,
    record: &mut LiquidationRecord,
) -> Result<()> {
    let snapshot = snapshot_sequence(state, max, pricing)?;
    let mut cursors = [
        state.troves.last(Cohort::Standard),
        state.troves.last(Cohort::Shielded),
    ];

    let mut examined = 0;
    while examined < max {
        let mut pick: Option<(Cohort, TroveId, u128)> = None;
        for cohort in Cohort::ALL {
            if let Some(id) = cursors[cohort.index()] {
                let icr = state.troves.current_icr(&id, pricing)?;
                if pick.map_or(true, |(_, _, best)| icr < best) {
                    pick = Some((cohort, id, icr));
                }
            }
        }
        let (cohort, id, _) = match pick {
            Some(candidate) => candidate,
            None => break,
        };
        examined += 1;

        // Past the call-time stopping point of this cohort
        let Some(&at_start) = snapshot.get(&id) else {
            cursors[cohort.index()] = None;
            continue;
        };

        // Captured before the candidate leaves the list
        let safer = state.troves.prev(cohort, &id);
        let outcome = try_liquidate(state, &id, at_start, pricing, caller, now, fx, record)?;
        if outcome.is_liquidatable() {
            cursors[cohort.index()] = safer;
        } else if outcome.ends_sequence() {
            debug!(%cohort, trove = %id.short(), ?outcome, "Sequence reached a safe position");
            cursors[cohort.index()] = None;
        } else {
            warn!(%cohort, trove = %id.short(), ?outcome, "Skipping sequence candidate");
            record.skipped.push(id);
            cursors[cohort.index()] = safer;
        }
    }
    Ok(())
}

/// Liquidate one position already assessed as liquidatable
#[allow(clippy::too_many_arguments)]
fn liquidate_trove(
    state: &mut LedgerState,
    id: &TroveId,
    icr: u128,
    capped: bool,
    redistribute_only: bool,
    pricing: &PricingContext,
    caller: AccountId,
    now: u64,
    fx: &mut Interactions,
) -> Result<LiquidatedTrove> {
    let cohort = state.troves.active(id)?.cohort;
    let accumulated = pricing.accumulated(cohort);
    state
        .troves
        .apply_pending_rewards(id, &mut state.pools, accumulated, now, fx)?;
    let entire = state.troves.entire_debt_and_coll(id, accumulated)?;
    let (debt, collateral) = (entire.debt, entire.collateral);

    let params = &state.config.params;
    let gas_compensation = collateral / params.gas_compensation_divisor;
    let available = collateral - gas_compensation;
    let seized = if capped {
        let at_max_penalty = mul_div(
            debt_to_collateral(debt, pricing.price, pricing.par)?,
            params.max_liquidation_penalty,
            WAD,
        )?;
        available.min(at_max_penalty)
    } else if icr < params.min_liquidation_penalty {
        available
    } else {
        let penalty = liquidation_penalty(icr, params.min_liquidation_penalty, params.max_liquidation_penalty);
        let at_penalty = mul_div(
            debt_to_collateral(debt, pricing.price, pricing.par)?,
            penalty,
            WAD,
        )?;
        available.min(at_penalty)
    };
    let surplus = available - seized;

    let closed = state.troves.close(id, TroveStatus::ClosedByLiquidation)?;
    let source = PoolId::active_for(cohort);
    {
        let active = state.pools.active_mut(cohort);
        active.release_debt(debt);
        active.decrease_collateral(collateral)?;
    }
    fx.transfer_collateral(source, caller, gas_compensation);

    let outcome = if redistribute_only {
        OffsetOutcome {
            debt_residual: debt,
            collateral_residual: seized,
            ..Default::default()
        }
    } else {
        state
            .stability_pool
            .offset(debt, seized, source, now, fx)?
    };

    let mut redistributed_to = None;
    if outcome.debt_residual > 0 || outcome.collateral_residual > 0 {
        let target = state.troves.redistribution_target(cohort, 0).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "no stake left to absorb redistribution from {}",
                id.short()
            ))
        })?;
        state.troves.redistribute(
            target,
            outcome.collateral_residual,
            outcome.debt_residual,
            pricing.accumulated(target),
        )?;
        state
            .pools
            .default
            .increase_collateral(outcome.collateral_residual)?;
        state.pools.default.increase_debt(outcome.debt_residual)?;
        fx.transfer_collateral(source, PoolId::Default, outcome.collateral_residual);
        redistributed_to = Some(target);
    }

    state.pools.surplus.add_claim(closed.owner, surplus)?;
    fx.transfer_collateral(source, PoolId::Surplus, surplus);

    state.events.push(ProtocolEvent::PositionUpdated(PositionUpdate {
        timestamp: now,
        trove_id: *id,
        owner: closed.owner,
        cohort,
        debt: 0,
        collateral: 0,
        stake: 0,
        operation: TroveOperation::Liquidate,
    }));

    debug!(
        trove = %id.short(),
        %cohort,
        icr,
        debt,
        collateral,
        gas_compensation,
        debt_offset = outcome.debt_offset,
        debt_redistributed = outcome.debt_residual,
        surplus,
        "Position liquidated"
    );

    Ok(LiquidatedTrove {
        trove_id: *id,
        owner: closed.owner,
        cohort,
        icr,
        debt,
        collateral,
        gas_compensation,
        debt_offset: outcome.debt_offset,
        collateral_to_stability_pool: outcome.collateral_offset,
        debt_redistributed: outcome.debt_residual,
        collateral_redistributed: outcome.collateral_residual,
        surplus,
        redistributed_to,
        capped,
    })
}

/// Positions liquidatable right now, riskiest first per cohort
pub fn liquidatable_troves(state: &LedgerState, price: u128) -> Result<Vec<TroveId>> {
    let pricing = state.pricing(price);
    let mut found = Vec::new();
    for cohort in Cohort::ALL {
        let mut cursor = state.troves.last(cohort);
        while let Some(id) = cursor {
            let assessment = assess(state, &id, &pricing)?;
            if assessment.ends_sequence() {
                break;
            }
            if assessment.is_liquidatable() {
                found.push(id);
            }
            cursor = state.troves.prev(cohort, &id);
        }
    }
    Ok(found)
}
