//! Redemption engine.
//!
//! Exchanges debt tokens for collateral at par, drawing from the riskiest
//! eligible positions first. Both cohorts are walked together from their
//! riskiest ends, always taking the lower ICR. Shielded positions only
//! become eligible once their ICR falls below the shielded floor.
//!
//! A position whose whole debt fits in the remaining amount is closed and
//! its leftover collateral becomes a surplus claim. The last position may be
//! partially redeemed, which needs a hint for its new nominal ratio; a stale
//! hint ends the walk early instead of failing the call.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::accrual::PricingContext;
use crate::core::fees::RedemptionFeeState;
use crate::core::interactions::Interactions;
use crate::core::pools::PoolId;
use crate::core::sorted_troves::InsertHint;
use crate::core::trove::{Cohort, TroveOperation, TroveStatus};
use crate::error::{Error, Result};
use crate::protocol::events::{PositionUpdate, ProtocolEvent};
use crate::protocol::state::LedgerState;
use crate::utils::constants::WAD;
use crate::utils::crypto::{AccountId, TroveId};
use crate::utils::math::{
    compute_nominal_cr, debt_to_collateral, mul_div, mul_div_up, safe_add, safe_sub,
};
use crate::utils::validation::{validate_balance, validate_max_fee_percentage, validate_price};

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST & RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters of a redemption call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    /// Debt tokens to redeem
    pub amount: u128,
    /// Riskiest eligible position, if the caller knows it
    pub first_hint: Option<TroveId>,
    /// Expected nominal ratio of the partially redeemed position
    pub partial_nicr_hint: u128,
    /// Reinsertion neighbour on the safer side
    pub upper_hint: Option<TroveId>,
    /// Reinsertion neighbour on the riskier side
    pub lower_hint: Option<TroveId>,
    /// Positions to visit at most; 0 means no limit
    pub max_iterations: usize,
    /// Highest acceptable fee as a WAD fraction of the collateral drawn
    pub max_fee_percentage: u128,
}

impl RedemptionRequest {
    /// Request without hints, accepting any fee
    pub fn new(amount: u128) -> Self {
        Self {
            amount,
            first_hint: None,
            partial_nicr_hint: 0,
            upper_hint: None,
            lower_hint: None,
            max_iterations: 0,
            max_fee_percentage: WAD,
        }
    }

    /// Attach hints computed by [`redemption_hints`]
    pub fn with_hints(mut self, hints: &RedemptionHints) -> Self {
        self.first_hint = hints.first_hint;
        self.partial_nicr_hint = hints.partial_nicr;
        self
    }

    /// Cap the fee
    pub fn with_max_fee(mut self, max_fee_percentage: u128) -> Self {
        self.max_fee_percentage = max_fee_percentage;
        self
    }

    /// Bound the number of positions visited
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// One position touched by a redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemedTrove {
    /// Position id
    pub trove_id: TroveId,
    /// Cohort
    pub cohort: Cohort,
    /// Debt cancelled
    pub debt: u128,
    /// Collateral drawn at par
    pub collateral: u128,
    /// Whether the position was closed
    pub closed: bool,
    /// Collateral credited to the owner's surplus claim on close
    pub surplus: u128,
}

/// Summary of one redemption call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    /// Time of the call
    pub timestamp: u64,
    /// Account redeeming
    pub redeemer: AccountId,
    /// Collateral price used
    pub price: u128,
    /// Par used
    pub par: u128,
    /// Amount requested
    pub attempted: u128,
    /// Debt actually redeemed
    pub redeemed: u128,
    /// Collateral drawn before the fee
    pub collateral_drawn: u128,
    /// Fee kept from the drawn collateral
    pub fee: u128,
    /// Base rate after the redemption
    pub base_rate: u128,
    /// Positions touched, in order
    pub troves: Vec<RedeemedTrove>,
    /// The walk ended on a stale partial hint
    pub stale_hint: bool,
}

impl RedemptionRecord {
    /// Collateral received by the redeemer
    pub fn collateral_sent(&self) -> u128 {
        self.collateral_drawn.saturating_sub(self.fee)
    }

    /// Positions closed by this redemption
    pub fn closed_count(&self) -> usize {
        self.troves.iter().filter(|t| t.closed).count()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WALK
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether a position can be redeemed against at `pricing`
fn is_redeemable(state: &LedgerState, id: &TroveId, pricing: &PricingContext) -> Result<bool> {
    let cohort = match state.troves.get(id) {
        Some(trove) if trove.is_active() => trove.cohort,
        _ => return Ok(false),
    };
    let icr = state.troves.current_icr(id, pricing)?;
    let params = &state.config.params;
    Ok(match cohort {
        Cohort::Standard => icr >= params.min_collateral_ratio,
        Cohort::Shielded => {
            icr >= params.min_collateral_ratio && icr < params.shielded_collateral_ratio
        }
    })
}

/// Riskiest redeemable position of a cohort at or above `from`
fn first_redeemable(
    state: &LedgerState,
    cohort: Cohort,
    from: Option<TroveId>,
    pricing: &PricingContext,
) -> Result<Option<TroveId>> {
    let params = &state.config.params;
    let mut cursor = from;
    while let Some(id) = cursor {
        let icr = state.troves.current_icr(&id, pricing)?;
        if icr >= params.min_collateral_ratio {
            // Ratios only grow towards the head, so a shielded position at
            // or above its floor ends the cohort
            if cohort == Cohort::Shielded && icr >= params.shielded_collateral_ratio {
                return Ok(None);
            }
            return Ok(Some(id));
        }
        cursor = state.troves.prev(cohort, &id);
    }
    Ok(None)
}

/// Starting cursor per cohort, honouring a valid first hint
fn start_cursors(
    state: &LedgerState,
    first_hint: Option<TroveId>,
    pricing: &PricingContext,
) -> Result<[Option<TroveId>; 2]> {
    let mut cursors = [None, None];
    for cohort in Cohort::ALL {
        cursors[cohort.index()] = first_redeemable(state, cohort, state.troves.last(cohort), pricing)?;
    }

    if let Some(hint) = first_hint {
        if is_redeemable(state, &hint, pricing)? {
            let cohort = state.troves.active(&hint)?.cohort;
            let riskier_ok = match state.troves.next(cohort, &hint) {
                None => true,
                Some(riskier) => {
                    state.troves.current_icr(&riskier, pricing)? < state.config.params.min_collateral_ratio
                }
            };
            if riskier_ok {
                cursors[cohort.index()] = Some(hint);
            } else {
                debug!(trove = %hint.short(), "Ignoring invalid first redemption hint");
            }
        }
    }
    Ok(cursors)
}

/// Cursor holding the lower ICR
fn pick(
    state: &LedgerState,
    cursors: &[Option<TroveId>; 2],
    pricing: &PricingContext,
) -> Result<Option<(Cohort, TroveId)>> {
    let mut best: Option<(Cohort, TroveId, u128)> = None;
    for cohort in Cohort::ALL {
        if let Some(id) = cursors[cohort.index()] {
            let icr = state.troves.current_icr(&id, pricing)?;
            if best.map_or(true, |(_, _, lowest)| icr < lowest) {
                best = Some((cohort, id, icr));
            }
        }
    }
    Ok(best.map(|(cohort, id, _)| (cohort, id)))
}

/// Amounts after drawing `debt` from a position with `entire_debt` and `entire_collateral`
struct Draw {
    debt: u128,
    collateral: u128,
    new_debt: u128,
    new_collateral: u128,
    new_normalized_debt: u128,
}

fn draw(
    entire_debt: u128,
    entire_collateral: u128,
    remaining: u128,
    accumulated: u128,
    pricing: &PricingContext,
) -> Result<Draw> {
    let debt = remaining.min(entire_debt);
    let collateral = debt_to_collateral(debt, pricing.price, pricing.par)?;
    let new_debt = entire_debt - debt;
    let new_collateral = safe_sub(entire_collateral, collateral)?;
    let new_normalized_debt = mul_div_up(new_debt, WAD, accumulated)?;
    Ok(Draw {
        debt,
        collateral,
        new_debt,
        new_collateral,
        new_normalized_debt,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// HINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Hints for a redemption, computed against the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionHints {
    /// Riskiest redeemable position
    pub first_hint: Option<TroveId>,
    /// Nominal ratio the partially redeemed position will have, 0 if none
    pub partial_nicr: u128,
    /// Largest amount up to the requested one that can actually be redeemed
    pub truncated_amount: u128,
}

/// Simulate a redemption of `amount` without touching state.
///
/// A partial step that would leave less than the minimum debt is dropped
/// and the amount truncated accordingly.
pub fn redemption_hints(
    state: &LedgerState,
    amount: u128,
    price: u128,
    max_iterations: usize,
) -> Result<RedemptionHints> {
    validate_price(price)?;
    let pricing = state.pricing(price);
    let mut cursors = start_cursors(state, None, &pricing)?;
    let first_hint = pick(state, &cursors, &pricing)?.map(|(_, id)| id);

    let mut remaining = amount;
    let mut partial_nicr = 0;
    let mut iterations = 0;
    while remaining > 0 && (max_iterations == 0 || iterations < max_iterations) {
        let (cohort, id) = match pick(state, &cursors, &pricing)? {
            Some(found) => found,
            None => break,
        };
        iterations += 1;

        let accumulated = pricing.accumulated(cohort);
        let entire = state.troves.entire_debt_and_coll(&id, accumulated)?;
        let step = draw(entire.debt, entire.collateral, remaining, accumulated, &pricing)?;
        if step.new_debt == 0 {
            remaining -= step.debt;
            let safer = state.troves.prev(cohort, &id);
            cursors[cohort.index()] = first_redeemable(state, cohort, safer, &pricing)?;
            continue;
        }
        if step.new_debt >= state.config.params.min_debt {
            partial_nicr = compute_nominal_cr(step.new_collateral, step.new_normalized_debt);
            remaining -= step.debt;
        }
        break;
    }

    Ok(RedemptionHints {
        first_hint,
        partial_nicr,
        truncated_amount: amount - remaining,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Redeem debt tokens held by `redeemer` for collateral.
///
/// Forces accrual first. Fails if nothing could be redeemed, if the fee
/// exceeds the caller's cap, or if the system is below MCR.
pub fn redeem(
    state: &mut LedgerState,
    redeemer: AccountId,
    request: RedemptionRequest,
    price: u128,
    now: u64,
    fx: &mut Interactions,
) -> Result<RedemptionRecord> {
    validate_price(price)?;
    validate_max_fee_percentage(
        request.max_fee_percentage,
        state.config.params.redemption_fee_floor,
    )?;
    if request.amount == 0 {
        return Err(Error::ZeroAmount);
    }

    let drip = state.accrue(now, fx)?;
    let minted_this_call = drip.map_or(0, |record| record.total_interest());

    let tcr = state.tcr(price);
    let mcr = state.config.params.min_collateral_ratio;
    if tcr < mcr {
        return Err(Error::SystemBelowMinimumCollateralization { tcr, mcr });
    }
    validate_balance(
        request.amount,
        state.debt_token.balance_of(&redeemer.into()).wad(),
    )?;
    let supply_before = safe_add(state.debt_token.total_supply().wad(), minted_this_call)?;

    let pricing = state.pricing(price);
    let mut cursors = start_cursors(state, request.first_hint, &pricing)?;
    let mut record = RedemptionRecord {
        timestamp: now,
        redeemer,
        price,
        par: pricing.par,
        attempted: request.amount,
        redeemed: 0,
        collateral_drawn: 0,
        fee: 0,
        base_rate: 0,
        troves: Vec::new(),
        stale_hint: false,
    };
    let mut drawn_by_cohort = [0u128; 2];
    let mut remaining = request.amount;
    let mut iterations = 0;

    while remaining > 0 && (request.max_iterations == 0 || iterations < request.max_iterations) {
        let (cohort, id) = match pick(state, &cursors, &pricing)? {
            Some(found) => found,
            None => break,
        };
        iterations += 1;

        // Captured before the position can leave the list
        let safer = state.troves.prev(cohort, &id);
        let accumulated = pricing.accumulated(cohort);
        state
            .troves
            .apply_pending_rewards(&id, &mut state.pools, accumulated, now, fx)?;
        let entire = state.troves.entire_debt_and_coll(&id, accumulated)?;
        let step = draw(entire.debt, entire.collateral, remaining, accumulated, &pricing)?;

        if step.new_debt == 0 {
            let closed = state.troves.close(&id, TroveStatus::ClosedByRedemption)?;
            let active = state.pools.active_mut(cohort);
            active.release_debt(step.debt);
            active.decrease_collateral(entire.collateral)?;
            state
                .pools
                .surplus
                .add_claim(closed.owner, step.new_collateral)?;
            fx.transfer_collateral(PoolId::active_for(cohort), PoolId::Surplus, step.new_collateral);

            push_position_event(state, now, &id, closed.owner, cohort, 0, 0, 0);
            record.troves.push(RedeemedTrove {
                trove_id: id,
                cohort,
                debt: step.debt,
                collateral: step.collateral,
                closed: true,
                surplus: step.new_collateral,
            });
            debug!(trove = %id.short(), %cohort, debt = step.debt, collateral = step.collateral, surplus = step.new_collateral, "Position fully redeemed");
            cursors[cohort.index()] = first_redeemable(state, cohort, safer, &pricing)?;
        } else {
            let new_nicr = compute_nominal_cr(step.new_collateral, step.new_normalized_debt);
            if new_nicr != request.partial_nicr_hint
                || step.new_debt < state.config.params.min_debt
            {
                warn!(
                    trove = %id.short(),
                    expected = request.partial_nicr_hint,
                    actual = new_nicr,
                    new_debt = step.new_debt,
                    "Stale partial redemption hint, stopping early"
                );
                record.stale_hint = true;
                break;
            }

            let stake = state.troves.resize(
                &id,
                step.new_collateral,
                step.new_normalized_debt,
                now,
                InsertHint::new(request.upper_hint, request.lower_hint),
            )?;
            let active = state.pools.active_mut(cohort);
            active.release_debt(step.debt);
            active.decrease_collateral(step.collateral)?;

            let owner = state.troves.active(&id)?.owner;
            push_position_event(
                state,
                now,
                &id,
                owner,
                cohort,
                step.new_debt,
                step.new_collateral,
                stake,
            );
            record.troves.push(RedeemedTrove {
                trove_id: id,
                cohort,
                debt: step.debt,
                collateral: step.collateral,
                closed: false,
                surplus: 0,
            });
            debug!(trove = %id.short(), %cohort, debt = step.debt, collateral = step.collateral, new_debt = step.new_debt, "Position partially redeemed");
        }

        remaining -= step.debt;
        record.redeemed = safe_add(record.redeemed, step.debt)?;
        record.collateral_drawn = safe_add(record.collateral_drawn, step.collateral)?;
        drawn_by_cohort[cohort.index()] = safe_add(drawn_by_cohort[cohort.index()], step.collateral)?;
    }

    if record.redeemed == 0 {
        return Err(if record.stale_hint {
            Error::StaleHint
        } else {
            Error::NothingToRedeem
        });
    }

    let params = &state.config.params;
    record.base_rate = state.fees.update_base_rate_from_redemption(
        record.collateral_drawn,
        price,
        pricing.par,
        supply_before,
        now,
        params,
    )?;
    record.fee = state
        .fees
        .redemption_fee(record.collateral_drawn, params.redemption_fee_floor)?;
    if record.fee >= record.collateral_drawn {
        return Err(Error::FeeConsumesAllCollateral {
            fee: record.fee,
            drawn: record.collateral_drawn,
        });
    }
    let fee_percentage = mul_div(record.fee, WAD, record.collateral_drawn)?;
    if fee_percentage > request.max_fee_percentage {
        return Err(Error::FeeExceedsMaximum {
            fee_percentage,
            max_fee_percentage: request.max_fee_percentage,
        });
    }
    state.fees.record_redemption(record.redeemed, record.fee);

    fx.burn(redeemer, record.redeemed);
    for cohort in Cohort::ALL {
        fx.transfer_collateral(
            PoolId::active_for(cohort),
            redeemer,
            drawn_by_cohort[cohort.index()],
        );
    }
    fx.transfer_collateral(redeemer, state.config.fee_recipient, record.fee);

    let stats = &mut state.stats;
    stats.redemption_calls += 1;
    stats.troves_redeemed += record.closed_count() as u64;

    info!(
        redeemer = %redeemer.short(),
        attempted = record.attempted,
        redeemed = record.redeemed,
        collateral_drawn = record.collateral_drawn,
        fee = record.fee,
        base_rate = record.base_rate,
        troves = record.troves.len(),
        stale_hint = record.stale_hint,
        "Redemption completed"
    );
    state.events.push(ProtocolEvent::Redemption(record.clone()));
    Ok(record)
}

/// Current fee rate for a redemption at `now`, before its own volume is added
pub fn current_redemption_rate(state: &LedgerState, now: u64) -> Result<u128> {
    let params = &state.config.params;
    let decayed = state
        .fees
        .decayed_base_rate(now, params.minute_decay_factor)?;
    Ok(RedemptionFeeState::redemption_rate(
        decayed,
        params.redemption_fee_floor,
    ))
}

#[allow(clippy::too_many_arguments)]
fn push_position_event(
    state: &mut LedgerState,
    now: u64,
    id: &TroveId,
    owner: AccountId,
    cohort: Cohort,
    debt: u128,
    collateral: u128,
    stake: u128,
) {
    state.events.push(ProtocolEvent::PositionUpdated(PositionUpdate {
        timestamp: now,
        trove_id: *id,
        owner,
        cohort,
        debt,
        collateral,
        stake,
        operation: TroveOperation::Redeem,
    }));
}
