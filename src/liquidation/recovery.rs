//! Recovery mode.
//!
//! Recovery mode is active while the Total Collateralization Ratio (TCR)
//! is below the Critical Collateralization Ratio (CCR). In this mode:
//!
//! 1. **Liquidation widened**: positions with MCR <= ICR < TCR can be
//!    liquidated if the stability pool absorbs their whole debt, with the
//!    seized collateral capped at the maximum penalty
//! 2. **Opening restricted**: new positions need ICR >= CCR
//!
//! TCR counts the active, shielded and default pools, so pending
//! redistribution is included.

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::core::pools::Pools;
use crate::core::trove::Cohort;
use crate::error::{Error, Result};
use crate::utils::math::compute_cr;

// ═══════════════════════════════════════════════════════════════════════════════
// RECOVERY MODE STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Current recovery mode status and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryModeStatus {
    /// Whether recovery mode is active
    pub is_active: bool,
    /// Current TCR (WAD)
    pub tcr: u128,
    /// TCR needed to exit recovery mode (WAD)
    pub exit_threshold: u128,
    /// Collateral in active, shielded and default pools
    pub total_collateral: u128,
    /// Debt in active, shielded and default pools
    pub total_debt: u128,
    /// Price used
    pub price: u128,
    /// Par used
    pub par: u128,
}

impl RecoveryModeStatus {
    /// Distance to the exit threshold; positive when above it
    pub fn distance_to_exit(&self) -> i128 {
        let tcr = i128::try_from(self.tcr).unwrap_or(i128::MAX);
        let exit = i128::try_from(self.exit_threshold).unwrap_or(i128::MAX);
        tcr.saturating_sub(exit)
    }
}

/// Total collateralization ratio of the system
pub fn calculate_tcr(pools: &Pools, price: u128, par: u128) -> u128 {
    compute_cr(pools.system_collateral(), pools.system_debt(), price, par)
}

/// TCR after adding collateral and debt
pub fn calculate_tcr_after(
    pools: &Pools,
    collateral_added: u128,
    debt_added: u128,
    price: u128,
    par: u128,
) -> u128 {
    compute_cr(
        pools.system_collateral().saturating_add(collateral_added),
        pools.system_debt().saturating_add(debt_added),
        price,
        par,
    )
}

/// Check if a TCR means recovery mode
pub fn is_recovery_mode(tcr: u128, params: &ProtocolParams) -> bool {
    tcr < params.critical_collateral_ratio
}

/// Snapshot of the recovery mode metrics
pub fn status(pools: &Pools, params: &ProtocolParams, price: u128, par: u128) -> RecoveryModeStatus {
    let tcr = calculate_tcr(pools, price, par);
    RecoveryModeStatus {
        is_active: is_recovery_mode(tcr, params),
        tcr,
        exit_threshold: params.critical_collateral_ratio,
        total_collateral: pools.system_collateral(),
        total_debt: pools.system_debt(),
        price,
        par,
    }
}

/// Minimum ICR a cohort must keep outside recovery mode
pub fn cohort_floor(cohort: Cohort, params: &ProtocolParams) -> u128 {
    match cohort {
        Cohort::Standard => params.min_collateral_ratio,
        Cohort::Shielded => params.shielded_collateral_ratio,
    }
}

/// Validate a new position's ratio against the current mode.
///
/// In recovery mode ICR must reach CCR. Otherwise ICR must reach the
/// cohort floor and the position must not push TCR below CCR.
pub fn validate_open(
    params: &ProtocolParams,
    cohort: Cohort,
    icr: u128,
    tcr_before: u128,
    tcr_after: u128,
) -> Result<()> {
    if is_recovery_mode(tcr_before, params) {
        let minimum = params.critical_collateral_ratio.max(cohort_floor(cohort, params));
        if icr < minimum {
            return Err(Error::CollateralizationRatioTooLow {
                current: icr,
                minimum,
            });
        }
        return Ok(());
    }

    let floor = cohort_floor(cohort, params);
    if icr < floor {
        return Err(Error::CollateralizationRatioTooLow {
            current: icr,
            minimum: floor,
        });
    }
    if tcr_after < params.critical_collateral_ratio {
        return Err(Error::CollateralizationRatioTooLow {
            current: tcr_after,
            minimum: params.critical_collateral_ratio,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::WAD;
    use crate::utils::math::units;

    fn pools(collateral: u128, debt: u128) -> Pools {
        let mut pools = Pools::new();
        pools.active.increase_collateral(collateral).unwrap();
        pools.active.increase_debt(debt).unwrap();
        pools
    }

    #[test]
    fn test_tcr_includes_default_pool() {
        let mut p = pools(units(2), units(100));
        p.default.increase_collateral(units(1)).unwrap();
        p.default.increase_debt(units(50)).unwrap();
        // 3 * 100 / 150 = 200%
        assert_eq!(calculate_tcr(&p, units(100), WAD), 2 * WAD);
    }

    #[test]
    fn test_recovery_mode_threshold() {
        let params = ProtocolParams::default();
        let p = pools(units(2), units(100));

        let normal = status(&p, &params, units(100), WAD);
        assert!(!normal.is_active);
        assert!(normal.distance_to_exit() > 0);

        let stressed = status(&p, &params, units(70), WAD);
        assert!(stressed.is_active);
        assert_eq!(stressed.tcr, 1_400_000_000_000_000_000);
    }

    #[test]
    fn test_par_raises_debt_value() {
        let p = pools(units(2), units(100));
        // Par 2.0 halves the ratio
        assert_eq!(calculate_tcr(&p, units(100), 2 * WAD), WAD);
    }

    #[test]
    fn test_validate_open() {
        let params = ProtocolParams::default();
        let healthy = 2 * WAD;

        assert!(validate_open(&params, Cohort::Standard, 1_200_000_000_000_000_000, healthy, healthy).is_ok());
        assert!(validate_open(&params, Cohort::Shielded, 1_200_000_000_000_000_000, healthy, healthy).is_err());

        // Would drag the system into recovery
        assert!(validate_open(&params, Cohort::Standard, 1_200_000_000_000_000_000, healthy, WAD).is_err());

        // Recovery mode needs CCR
        let stressed = 1_400_000_000_000_000_000;
        assert!(validate_open(&params, Cohort::Standard, 1_450_000_000_000_000_000, stressed, stressed).is_err());
        assert!(validate_open(&params, Cohort::Standard, 1_600_000_000_000_000_000, stressed, stressed).is_ok());
    }
}
