//! Position lifecycle helpers.
//!
//! Minimal owner-facing operations around the core: opening a position,
//! closing it by full repayment and collecting surplus collateral left by a
//! liquidation or redemption.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::interactions::Interactions;
use crate::core::pools::PoolId;
use crate::core::sorted_troves::InsertHint;
use crate::core::trove::{Cohort, TroveOperation, TroveStatus};
use crate::error::{Error, Result};
use crate::liquidation::recovery;
use crate::protocol::events::{PositionUpdate, ProtocolEvent, SurplusClaimedEvent};
use crate::protocol::state::LedgerState;
use crate::utils::constants::WAD;
use crate::utils::crypto::{AccountId, TroveId};
use crate::utils::math::{compute_cr, mul_div, mul_div_up};
use crate::utils::validation::{validate_balance, validate_non_zero, validate_price};

/// Parameters for opening a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTroveRequest {
    /// Owner; must already hold the collateral
    pub owner: AccountId,
    /// Risk cohort
    pub cohort: Cohort,
    /// Collateral to lock
    pub collateral: u128,
    /// Debt tokens to mint
    pub debt: u128,
    /// Insertion hint for the cohort's sorted list
    pub hint: InsertHint,
}

/// Open a position, minting `debt` to the owner.
///
/// Debt is stored normalized at the cohort's current accumulated rate,
/// rounded up so the recorded debt never falls short of what was minted.
pub fn open_trove(
    state: &mut LedgerState,
    request: OpenTroveRequest,
    price: u128,
    now: u64,
    fx: &mut Interactions,
) -> Result<PositionUpdate> {
    validate_price(price)?;
    validate_non_zero(request.collateral)?;
    state.accrue(now, fx)?;

    let params = &state.config.params;
    if request.debt < params.min_debt {
        return Err(Error::DebtBelowMinimum {
            amount: request.debt,
            minimum: params.min_debt,
        });
    }
    validate_balance(
        request.collateral,
        state.collateral.balance_of(&request.owner.into()).wad(),
    )?;

    let cohort = request.cohort;
    let accumulated = state.rates.accumulated(cohort);
    let normalized_debt = mul_div_up(request.debt, WAD, accumulated)?;
    let debt = mul_div(normalized_debt, accumulated, WAD)?;

    let par = state.rates.par();
    let icr = compute_cr(request.collateral, debt, price, par);
    let tcr_before = state.tcr(price);
    let tcr_after =
        recovery::calculate_tcr_after(&state.pools, request.collateral, debt, price, par);
    recovery::validate_open(params, cohort, icr, tcr_before, tcr_after)?;

    let trove_id = state.troves.open(
        request.owner,
        cohort,
        request.collateral,
        normalized_debt,
        now,
        request.hint,
    )?;
    let active = state.pools.active_mut(cohort);
    active.increase_collateral(request.collateral)?;
    active.increase_debt(debt)?;

    fx.transfer_collateral(request.owner, PoolId::active_for(cohort), request.collateral);
    fx.mint(request.owner, debt);

    let stake = state.troves.active(&trove_id)?.stake;
    let update = PositionUpdate {
        timestamp: now,
        trove_id,
        owner: request.owner,
        cohort,
        debt,
        collateral: request.collateral,
        stake,
        operation: TroveOperation::Open,
    };
    state.stats.troves_opened += 1;
    state.events.push(ProtocolEvent::PositionUpdated(update));

    debug!(trove = %trove_id.short(), %cohort, collateral = request.collateral, debt, icr, "Position opened");
    Ok(update)
}

/// Repay a position in full and return its collateral to the owner.
///
/// Not allowed in recovery mode, and the remaining system must stay at or
/// above CCR.
pub fn close_trove(
    state: &mut LedgerState,
    caller: AccountId,
    trove_id: TroveId,
    price: u128,
    now: u64,
    fx: &mut Interactions,
) -> Result<PositionUpdate> {
    validate_price(price)?;
    state.accrue(now, fx)?;

    let (owner, cohort) = {
        let trove = state.troves.active(&trove_id)?;
        (trove.owner, trove.cohort)
    };
    if owner != caller {
        return Err(Error::Unauthorized(format!(
            "{} does not own {}",
            caller.short(),
            trove_id.short()
        )));
    }

    let accumulated = state.rates.accumulated(cohort);
    state
        .troves
        .apply_pending_rewards(&trove_id, &mut state.pools, accumulated, now, fx)?;
    let entire = state.troves.entire_debt_and_coll(&trove_id, accumulated)?;

    let params = &state.config.params;
    let par = state.rates.par();
    let tcr_before = state.tcr(price);
    if recovery::is_recovery_mode(tcr_before, params) {
        return Err(Error::CollateralizationRatioTooLow {
            current: tcr_before,
            minimum: params.critical_collateral_ratio,
        });
    }
    let tcr_after = compute_cr(
        state.pools.system_collateral().saturating_sub(entire.collateral),
        state.pools.system_debt().saturating_sub(entire.debt),
        price,
        par,
    );
    if tcr_after < params.critical_collateral_ratio {
        return Err(Error::CollateralizationRatioTooLow {
            current: tcr_after,
            minimum: params.critical_collateral_ratio,
        });
    }
    validate_balance(
        entire.debt,
        state.debt_token.balance_of(&owner.into()).wad(),
    )?;

    state.troves.close(&trove_id, TroveStatus::ClosedByOwner)?;
    let active = state.pools.active_mut(cohort);
    let released = active.release_debt(entire.debt);
    active.decrease_collateral(entire.collateral)?;

    fx.burn(owner, released);
    fx.transfer_collateral(PoolId::active_for(cohort), owner, entire.collateral);

    let update = PositionUpdate {
        timestamp: now,
        trove_id,
        owner,
        cohort,
        debt: 0,
        collateral: 0,
        stake: 0,
        operation: TroveOperation::Close,
    };
    state.stats.troves_closed += 1;
    state.events.push(ProtocolEvent::PositionUpdated(update));

    debug!(trove = %trove_id.short(), debt = entire.debt, collateral = entire.collateral, "Position closed");
    Ok(update)
}

/// Pay out an owner's surplus claim
pub fn claim_surplus(
    state: &mut LedgerState,
    owner: AccountId,
    now: u64,
    fx: &mut Interactions,
) -> Result<u128> {
    let amount = state.pools.surplus.take_claim(&owner)?;
    fx.transfer_collateral(PoolId::Surplus, owner, amount);

    state.stats.total_surplus_claimed = state.stats.total_surplus_claimed.saturating_add(amount);
    state
        .events
        .push(ProtocolEvent::SurplusClaimed(SurplusClaimedEvent {
            timestamp: now,
            owner,
            amount,
        }));

    debug!(owner = %owner.short(), amount, "Surplus claimed");
    Ok(amount)
}
