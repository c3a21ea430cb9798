//! Redistribution ledger.
//!
//! Liquidated debt and collateral the stability pool cannot absorb are spread
//! over the remaining positions of a cohort in proportion to stake. Instead of
//! touching every position, two global per-unit-staked accumulators grow and
//! each position keeps a snapshot; its pending reward is
//! `stake * (accumulator - snapshot)`.
//!
//! Division remainders are carried into the next redistribution so truncation
//! never leaks value systematically.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::core::trove::RewardSnapshot;
use crate::error::{Error, Result};
use crate::utils::constants::WAD;
use crate::utils::math::{mul_div, narrow, safe_add};

/// Per-cohort redistribution accumulators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsLedger {
    /// Collateral reward per unit staked (L_Coll)
    l_collateral: u128,
    /// Normalized debt reward per unit staked (L_Debt)
    l_debt: u128,
    last_collateral_error: u128,
    last_debt_error: u128,
    /// Redistributed collateral not yet applied to positions
    pending_collateral: u128,
    /// Redistributed normalized debt not yet applied to positions
    pending_debt: u128,
}

impl RewardsLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Current collateral accumulator
    pub fn l_collateral(&self) -> u128 {
        self.l_collateral
    }

    /// Current debt accumulator
    pub fn l_debt(&self) -> u128 {
        self.l_debt
    }

    /// Collateral awaiting application
    pub fn pending_collateral(&self) -> u128 {
        self.pending_collateral
    }

    /// Normalized debt awaiting application
    pub fn pending_debt(&self) -> u128 {
        self.pending_debt
    }

    /// Snapshot of the current accumulators
    pub fn snapshot(&self) -> RewardSnapshot {
        RewardSnapshot {
            collateral: self.l_collateral,
            debt: self.l_debt,
        }
    }

    /// Spread `collateral` and `normalized_debt` over `total_stakes`
    pub fn redistribute(
        &mut self,
        collateral: u128,
        normalized_debt: u128,
        total_stakes: u128,
    ) -> Result<()> {
        if normalized_debt == 0 && collateral == 0 {
            return Ok(());
        }
        if total_stakes == 0 {
            return Err(Error::InvalidParameter {
                name: "total_stakes".into(),
                reason: "cannot redistribute over zero stake".into(),
            });
        }

        let stakes = U256::from(total_stakes);

        let coll_numerator =
            U256::from(collateral) * U256::from(WAD) + U256::from(self.last_collateral_error);
        let coll_per_unit = coll_numerator / stakes;
        self.last_collateral_error = narrow(coll_numerator - coll_per_unit * stakes, "redistribute")?;

        let debt_numerator =
            U256::from(normalized_debt) * U256::from(WAD) + U256::from(self.last_debt_error);
        let debt_per_unit = debt_numerator / stakes;
        self.last_debt_error = narrow(debt_numerator - debt_per_unit * stakes, "redistribute")?;

        self.l_collateral = safe_add(self.l_collateral, narrow(coll_per_unit, "L_Coll")?)?;
        self.l_debt = safe_add(self.l_debt, narrow(debt_per_unit, "L_Debt")?)?;
        self.pending_collateral = safe_add(self.pending_collateral, collateral)?;
        self.pending_debt = safe_add(self.pending_debt, normalized_debt)?;
        Ok(())
    }

    /// Pending collateral reward for a stake and snapshot
    pub fn pending_collateral_reward(&self, stake: u128, snapshot: &RewardSnapshot) -> Result<u128> {
        let delta = self.l_collateral.saturating_sub(snapshot.collateral);
        if delta == 0 || stake == 0 {
            return Ok(0);
        }
        mul_div(stake, delta, WAD)
    }

    /// Pending normalized debt reward for a stake and snapshot
    pub fn pending_debt_reward(&self, stake: u128, snapshot: &RewardSnapshot) -> Result<u128> {
        let delta = self.l_debt.saturating_sub(snapshot.debt);
        if delta == 0 || stake == 0 {
            return Ok(0);
        }
        mul_div(stake, delta, WAD)
    }

    /// Whether a snapshot lags the accumulators
    pub fn has_pending(&self, snapshot: &RewardSnapshot) -> bool {
        snapshot.collateral < self.l_collateral || snapshot.debt < self.l_debt
    }

    /// Record that rewards were folded into a position
    pub fn settle(&mut self, collateral: u128, normalized_debt: u128) {
        self.pending_collateral = self.pending_collateral.saturating_sub(collateral);
        self.pending_debt = self.pending_debt.saturating_sub(normalized_debt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redistribute_exact() {
        let mut ledger = RewardsLedger::new();
        ledger.redistribute(WAD, 100 * WAD, 2 * WAD).unwrap();

        assert_eq!(ledger.l_collateral(), WAD / 2);
        assert_eq!(ledger.l_debt(), 50 * WAD);

        let snap = RewardSnapshot::default();
        assert_eq!(ledger.pending_collateral_reward(2 * WAD, &snap).unwrap(), WAD);
        assert_eq!(ledger.pending_debt_reward(2 * WAD, &snap).unwrap(), 100 * WAD);
    }

    #[test]
    fn test_error_carry() {
        let mut ledger = RewardsLedger::new();
        // 1 wei over 3 wei of stake: per-unit = 1e18/3, remainder 1
        ledger.redistribute(1, 0, 3).unwrap();
        assert_eq!(ledger.l_collateral(), WAD / 3);
        assert_eq!(ledger.last_collateral_error, 1);

        ledger.redistribute(2, 0, 3).unwrap();
        // (2e18 + 1) / 3 = 666..667
        assert_eq!(ledger.l_collateral(), WAD / 3 + (2 * WAD + 1) / 3);
        assert_eq!(ledger.last_collateral_error, 0);
    }

    #[test]
    fn test_zero_stake_rejected() {
        let mut ledger = RewardsLedger::new();
        assert!(ledger.redistribute(1, 1, 0).is_err());
        assert!(ledger.redistribute(0, 0, 0).is_ok());
    }

    #[test]
    fn test_snapshot_clears_pending() {
        let mut ledger = RewardsLedger::new();
        ledger.redistribute(WAD, WAD, WAD).unwrap();
        let snap = ledger.snapshot();
        assert!(!ledger.has_pending(&snap));
        assert!(ledger.has_pending(&RewardSnapshot::default()));
        assert_eq!(ledger.pending_collateral_reward(WAD, &snap).unwrap(), 0);
    }

    #[test]
    fn test_settle_tracks_pending_totals() {
        let mut ledger = RewardsLedger::new();
        ledger.redistribute(3 * WAD, 6 * WAD, WAD).unwrap();
        ledger.settle(WAD, 2 * WAD);
        assert_eq!(ledger.pending_collateral(), 2 * WAD);
        assert_eq!(ledger.pending_debt(), 4 * WAD);
        ledger.settle(10 * WAD, 10 * WAD);
        assert_eq!(ledger.pending_collateral(), 0);
    }
}
