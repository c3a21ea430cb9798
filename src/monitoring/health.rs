//! Ledger health checks.
//!
//! Verifies the accounting invariants of a committed [`LedgerState`]:
//! token supply against pool debt and position debt, ledger collateral
//! against recorded pool collateral, stability pool backing and the order
//! of both sorted lists.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::core::pools::{Holder, PoolId};
use crate::core::trove::Cohort;
use crate::error::{Error, Result};
use crate::protocol::state::LedgerState;
use crate::utils::constants::WAD;
use crate::utils::math::abs_diff;

// ═══════════════════════════════════════════════════════════════════════════════
// HEALTH STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Every invariant holds
    Healthy,
    /// At least one invariant is violated
    Critical,
}

impl HealthStatus {
    /// Get display string
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Critical => "CRITICAL",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Invariants checked against the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvariantCheck {
    /// Token balances sum to total supply
    TokenBalances,
    /// Total supply equals debt recorded in the active, shielded and default pools
    SupplyMatchesPoolDebt,
    /// Total supply equals the entire debt of all open positions
    SupplyMatchesPositionDebt,
    /// Ledger pool balances equal recorded pool collateral
    PoolCollateralBacked,
    /// Collateral held equals collateral funded minus withdrawn
    CollateralConserved,
    /// Stability pool tokens cover deposits and undistributed interest
    StabilityPoolBacked,
    /// Sorted lists hold exactly the open positions in non-increasing NICR order
    SortedListOrdered,
}

impl InvariantCheck {
    /// Get all checks
    pub fn all() -> &'static [InvariantCheck] {
        &[
            InvariantCheck::TokenBalances,
            InvariantCheck::SupplyMatchesPoolDebt,
            InvariantCheck::SupplyMatchesPositionDebt,
            InvariantCheck::PoolCollateralBacked,
            InvariantCheck::CollateralConserved,
            InvariantCheck::StabilityPoolBacked,
            InvariantCheck::SortedListOrdered,
        ]
    }

    /// Get description
    pub fn description(&self) -> &'static str {
        match self {
            InvariantCheck::TokenBalances => "Debt token balances sum to supply",
            InvariantCheck::SupplyMatchesPoolDebt => "Supply equals recorded pool debt",
            InvariantCheck::SupplyMatchesPositionDebt => "Supply equals entire position debt",
            InvariantCheck::PoolCollateralBacked => "Pool collateral is held on the ledger",
            InvariantCheck::CollateralConserved => "Collateral is conserved",
            InvariantCheck::StabilityPoolBacked => "Stability pool holds its deposits",
            InvariantCheck::SortedListOrdered => "Sorted lists are ordered and complete",
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check performed
    pub check: InvariantCheck,
    /// Whether it held
    pub passed: bool,
    /// Explanation when it did not
    pub detail: Option<String>,
}

impl CheckResult {
    fn pass(check: InvariantCheck) -> Self {
        Self {
            check,
            passed: true,
            detail: None,
        }
    }

    fn fail(check: InvariantCheck, detail: String) -> Self {
        Self {
            check,
            passed: false,
            detail: Some(detail),
        }
    }

    fn within(check: InvariantCheck, left: u128, right: u128, tolerance: u128) -> Self {
        let diff = abs_diff(left, right);
        if diff <= tolerance {
            Self::pass(check)
        } else {
            Self::fail(
                check,
                format!("{} vs {} differ by {} (tolerance {})", left, right, diff, tolerance),
            )
        }
    }
}

/// Result of a full health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// Individual results
    pub checks: Vec<CheckResult>,
    /// Rounding tolerance applied to debt comparisons
    pub tolerance: u128,
}

impl HealthReport {
    /// Check if all invariants held
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Failed checks
    pub fn violations(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKING
// ═══════════════════════════════════════════════════════════════════════════════

/// Rounding tolerance for debt comparisons.
///
/// Each position can be off by a few wei from normalized-unit rounding, and
/// redistribution leaves an error carry below `total_stakes / WAD`.
pub fn debt_tolerance(state: &LedgerState) -> u128 {
    let positions = u128::from(state.stats.troves_opened).saturating_add(1);
    let stakes: u128 = Cohort::ALL
        .iter()
        .map(|c| state.troves.book(*c).total_stakes() / WAD)
        .sum();
    positions.saturating_mul(4).saturating_add(stakes).saturating_add(1)
}

/// Check every ledger invariant
pub fn check_invariants(state: &LedgerState) -> HealthReport {
    let tolerance = debt_tolerance(state);
    let supply = state.debt_token.total_supply().wad();
    let mut checks = Vec::with_capacity(InvariantCheck::all().len());

    checks.push(if state.debt_token.verify_supply_invariant() {
        CheckResult::pass(InvariantCheck::TokenBalances)
    } else {
        CheckResult::fail(
            InvariantCheck::TokenBalances,
            "balances do not sum to supply".into(),
        )
    });

    checks.push(CheckResult::within(
        InvariantCheck::SupplyMatchesPoolDebt,
        supply,
        state.pools.system_debt(),
        tolerance,
    ));

    checks.push(match position_debt(state) {
        Ok(debt) => CheckResult::within(
            InvariantCheck::SupplyMatchesPositionDebt,
            supply,
            debt,
            tolerance,
        ),
        Err(e) => CheckResult::fail(InvariantCheck::SupplyMatchesPositionDebt, e.to_string()),
    });

    checks.push(pool_collateral(state));

    let held = state.collateral.total_held();
    let net = state.collateral.net_deposited().wad();
    checks.push(CheckResult::within(
        InvariantCheck::CollateralConserved,
        held,
        net,
        0,
    ));

    let sp = &state.stability_pool;
    let sp_tokens = state
        .debt_token
        .balance_of(&Holder::Pool(PoolId::StabilityPool))
        .wad();
    let owed = sp.total_deposits().saturating_add(sp.interest_balance());
    checks.push(CheckResult::within(
        InvariantCheck::StabilityPoolBacked,
        sp_tokens,
        owed,
        sp.depositor_count() as u128 + 1,
    ));

    checks.push(sorted_lists(state));

    let status = if checks.iter().all(|c| c.passed) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Critical
    };
    for failed in checks.iter().filter(|c| !c.passed) {
        warn!(check = ?failed.check, detail = ?failed.detail, "Invariant violated");
    }

    HealthReport {
        status,
        checks,
        tolerance,
    }
}

/// Fail with [`Error::InvariantViolation`] unless every invariant holds
pub fn assert_healthy(state: &LedgerState) -> Result<()> {
    let report = check_invariants(state);
    if report.is_healthy() {
        return Ok(());
    }
    let details: Vec<String> = report
        .violations()
        .iter()
        .map(|c| format!("{:?}: {}", c.check, c.detail.as_deref().unwrap_or("")))
        .collect();
    error!(violations = details.len(), "Ledger unhealthy");
    Err(Error::InvariantViolation(details.join("; ")))
}

fn position_debt(state: &LedgerState) -> Result<u128> {
    let mut total = 0u128;
    for trove in state.troves.iter_active() {
        let accumulated = state.rates.accumulated(trove.cohort);
        let entire = state.troves.entire_debt_and_coll(&trove.id, accumulated)?;
        total = total.saturating_add(entire.debt);
    }
    Ok(total)
}

fn pool_collateral(state: &LedgerState) -> CheckResult {
    let check = InvariantCheck::PoolCollateralBacked;
    let mut recorded: Vec<(PoolId, u128)> = [
        PoolId::Active,
        PoolId::ShieldedActive,
        PoolId::Default,
        PoolId::Surplus,
    ]
    .iter()
    .filter_map(|pool| state.pools.collateral_of(*pool).map(|c| (*pool, c)))
    .collect();
    recorded.push((PoolId::StabilityPool, state.stability_pool.collateral()));

    for (pool, amount) in recorded {
        let held = state.collateral.pool_balance(pool).wad();
        if held != amount {
            return CheckResult::fail(
                check,
                format!("{} records {} but holds {}", pool, amount, held),
            );
        }
    }
    CheckResult::pass(check)
}

fn sorted_lists(state: &LedgerState) -> CheckResult {
    let check = InvariantCheck::SortedListOrdered;
    for cohort in Cohort::ALL {
        let ids = state.troves.book(cohort).sorted().to_vec();
        let active = state
            .troves
            .iter_active()
            .filter(|t| t.cohort == cohort)
            .count();
        if ids.len() != active {
            return CheckResult::fail(
                check,
                format!("{} list has {} entries for {} open positions", cohort, ids.len(), active),
            );
        }

        let mut previous = u128::MAX;
        for id in &ids {
            let nicr = match state.troves.nominal_icr(id) {
                Ok(nicr) => nicr,
                Err(e) => return CheckResult::fail(check, e.to_string()),
            };
            if nicr > previous {
                return CheckResult::fail(
                    check,
                    format!("{} list out of order at {}", cohort, id.short()),
                );
            }
            previous = nicr;
        }
    }
    CheckResult::pass(check)
}
