//! Interest accrual ("drip") and the par controller.
//!
//! Every position's actual debt is its normalized debt times its cohort's
//! accumulated rate. A drip compounds each cohort's per-second rate over the
//! elapsed time, grows the pools' recorded debt by the difference and mints
//! the same amount of debt token, so supply always tracks debt. Depositors
//! in the stability pool receive their share of that mint; the remainder goes
//! to the treasury.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::RateParams;
use crate::core::interactions::Interactions;
use crate::core::pools::PoolId;
use crate::core::trove::Cohort;
use crate::error::{Error, Result};
use crate::protocol::state::LedgerState;
use crate::utils::constants::WAD;
use crate::utils::math::{dec_mul, dec_pow, mul_div, safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// RATE STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-cohort rate factor and accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortRate {
    /// Per-second growth factor (WAD = no interest)
    pub rate_per_second: u128,
    /// Product of all factors applied so far
    pub accumulated: u128,
}

impl CohortRate {
    fn new(rate_per_second: u128) -> Self {
        Self {
            rate_per_second,
            accumulated: WAD,
        }
    }
}

/// Par and per-cohort rate accumulators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateState {
    par: u128,
    market_price: u128,
    rates: [CohortRate; 2],
    last_accrual: u64,
    last_par_update: u64,
}

impl RateState {
    /// Initial state at `genesis`
    pub fn new(params: &RateParams, genesis: u64) -> Self {
        Self {
            par: params.initial_par,
            market_price: params.initial_par,
            rates: [
                CohortRate::new(params.standard_rate_per_second),
                CohortRate::new(params.shielded_rate_per_second),
            ],
            last_accrual: genesis,
            last_par_update: genesis,
        }
    }

    /// Current par
    pub fn par(&self) -> u128 {
        self.par
    }

    /// Last observed market price of the debt token
    pub fn market_price(&self) -> u128 {
        self.market_price
    }

    /// Timestamp of the last accrual
    pub fn last_accrual(&self) -> u64 {
        self.last_accrual
    }

    /// Timestamp of the last par update
    pub fn last_par_update(&self) -> u64 {
        self.last_par_update
    }

    /// Rate of a cohort
    pub fn cohort(&self, cohort: Cohort) -> &CohortRate {
        &self.rates[cohort.index()]
    }

    /// Accumulated rate of a cohort
    pub fn accumulated(&self, cohort: Cohort) -> u128 {
        self.rates[cohort.index()].accumulated
    }

    /// Change a cohort's per-second rate; callers drip first
    pub fn set_rate(&mut self, cohort: Cohort, rate_per_second: u128) -> Result<()> {
        if rate_per_second < WAD {
            return Err(Error::InvalidParameter {
                name: "rate_per_second".into(),
                reason: "must be at least 1.0".into(),
            });
        }
        self.rates[cohort.index()].rate_per_second = rate_per_second;
        Ok(())
    }

    /// Price context for ratio reads
    pub fn pricing(&self, price: u128) -> PricingContext {
        PricingContext::new(
            price,
            self.par,
            [self.rates[0].accumulated, self.rates[1].accumulated],
        )
    }
}

/// Everything needed to value a position at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingContext {
    /// Collateral price in debt-token units (WAD)
    pub price: u128,
    /// Par (WAD)
    pub par: u128,
    accumulated: [u128; 2],
}

impl PricingContext {
    /// Build from explicit values
    pub fn new(price: u128, par: u128, accumulated: [u128; 2]) -> Self {
        Self {
            price,
            par,
            accumulated,
        }
    }

    /// Accumulated rate of a cohort
    pub fn accumulated(&self, cohort: Cohort) -> u128 {
        self.accumulated[cohort.index()]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIP
// ═══════════════════════════════════════════════════════════════════════════════

/// Interest minted by one drip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DripRecord {
    /// Time of the drip
    pub timestamp: u64,
    /// Seconds since the previous drip
    pub elapsed: u64,
    /// Interest on the standard cohort
    pub standard_interest: u128,
    /// Interest on the shielded cohort
    pub shielded_interest: u128,
    /// Minted to stability pool depositors
    pub to_stability_pool: u128,
    /// Minted to the treasury
    pub to_treasury: u128,
}

impl DripRecord {
    /// Total interest minted
    pub fn total_interest(&self) -> u128 {
        self.standard_interest.saturating_add(self.shielded_interest)
    }
}

/// Accrue interest up to `now`.
///
/// A no-op when no time has passed since the last accrual, so it can be
/// forced at the start of every call. Returns a record only when interest
/// was actually minted.
///
/// Minted interest is split by `interest_share`: that fraction goes to
/// stability pool depositors through the I sum, and the remainder (plus
/// anything the pool cannot take while empty) is minted to the treasury
/// account rather than to the redistribution stake accumulator.
pub fn drip(state: &mut LedgerState, now: u64, fx: &mut Interactions) -> Result<Option<DripRecord>> {
    let last = state.rates.last_accrual;
    if now <= last {
        return Ok(None);
    }
    let elapsed = now - last;

    let mut record = DripRecord {
        timestamp: now,
        elapsed,
        ..Default::default()
    };

    for cohort in Cohort::ALL {
        let rate = state.rates.rates[cohort.index()];
        if rate.rate_per_second == WAD {
            continue;
        }
        let factor = dec_pow(rate.rate_per_second, elapsed)?;
        let accumulated = dec_mul(rate.accumulated, factor)?;
        if accumulated <= rate.accumulated {
            continue;
        }

        let book = state.troves.book(cohort);
        let active_interest = interest_on(book.active_normalized_debt(), rate.accumulated, accumulated)?;
        let pending_interest = interest_on(book.pending_normalized_debt(), rate.accumulated, accumulated)?;

        state.pools.active_mut(cohort).increase_debt(active_interest)?;
        state.pools.default.increase_debt(pending_interest)?;
        state.rates.rates[cohort.index()].accumulated = accumulated;

        let interest = safe_add(active_interest, pending_interest)?;
        match cohort {
            Cohort::Standard => record.standard_interest = interest,
            Cohort::Shielded => record.shielded_interest = interest,
        }
        debug!(%cohort, accumulated, active_interest, pending_interest, "Cohort accrued");
    }
    state.rates.last_accrual = now;

    let total = record.total_interest();
    if total == 0 {
        return Ok(None);
    }

    let share = mul_div(total, state.config.stability_pool.interest_share, WAD)?;
    record.to_stability_pool = state.stability_pool.distribute_interest(share)?;
    record.to_treasury = safe_sub(total, record.to_stability_pool)?;

    fx.mint(PoolId::StabilityPool, record.to_stability_pool);
    fx.mint(state.config.treasury, record.to_treasury);

    info!(
        elapsed,
        standard = record.standard_interest,
        shielded = record.shielded_interest,
        to_stability_pool = record.to_stability_pool,
        "Interest accrued"
    );
    Ok(Some(record))
}

/// `normalized * new - normalized * old`, each side rounded down
fn interest_on(normalized: u128, old_rate: u128, new_rate: u128) -> Result<u128> {
    if normalized == 0 {
        return Ok(0);
    }
    let before = mul_div(normalized, old_rate, WAD)?;
    let after = mul_div(normalized, new_rate, WAD)?;
    safe_sub(after, before)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAR CONTROLLER
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of a par update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParUpdate {
    /// Par before
    pub old_par: u128,
    /// Par after
    pub new_par: u128,
    /// Market price fed to the controller
    pub market_price: u128,
}

/// Move par towards restoring the peg.
///
/// A market price below par raises par and vice versa, proportionally to
/// the relative deviation, never by more than `max_par_change_per_call`.
pub fn update_par(
    rates: &mut RateState,
    params: &RateParams,
    market_price: u128,
    now: u64,
) -> Result<ParUpdate> {
    if market_price == 0 {
        return Err(Error::InvalidPrice("market price is zero".into()));
    }

    let old_par = rates.par;
    let deviation = mul_div(old_par.abs_diff(market_price), WAD, old_par)?;
    let change = mul_div(params.par_controller_gain, deviation, WAD)?
        .min(params.max_par_change_per_call);
    let delta = mul_div(old_par, change, WAD)?;

    let new_par = if market_price < old_par {
        safe_add(old_par, delta)?
    } else {
        safe_sub(old_par, delta)?
    };
    if new_par == 0 {
        return Err(Error::Underflow {
            operation: "par update".into(),
        });
    }

    rates.par = new_par;
    rates.market_price = market_price;
    rates.last_par_update = now;

    info!(old_par, new_par, market_price, "Par updated");
    Ok(ParUpdate {
        old_par,
        new_par,
        market_price,
    })
}
