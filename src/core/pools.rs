//! Ledger pools.
//!
//! Passive balance holders for collateral and debt. The Active and
//! Shielded-Active pools hold the recorded amounts of open positions, the
//! Default pool holds redistributed amounts not yet applied to positions, and
//! the Surplus pool holds collateral owed back to former owners. No business
//! logic beyond increments and non-negative decrements lives here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::core::trove::Cohort;
use crate::error::{Error, Result};
use crate::utils::crypto::AccountId;
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// HOLDERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every balance-holding pool in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PoolId {
    /// Standard cohort active positions
    Active,
    /// Shielded cohort active positions
    ShieldedActive,
    /// Redistributed amounts pending application
    Default,
    /// Collateral claimable by former owners
    Surplus,
    /// Stability pool deposits and collateral gains
    StabilityPool,
}

impl PoolId {
    /// Active pool backing a cohort
    pub fn active_for(cohort: Cohort) -> Self {
        match cohort {
            Cohort::Standard => PoolId::Active,
            Cohort::Shielded => PoolId::ShieldedActive,
        }
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolId::Active => "active",
            PoolId::ShieldedActive => "shielded-active",
            PoolId::Default => "default",
            PoolId::Surplus => "surplus",
            PoolId::StabilityPool => "stability-pool",
        };
        write!(f, "{}", name)
    }
}

/// A balance holder on the token and collateral ledgers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Holder {
    /// An external account
    Account(AccountId),
    /// One of the protocol pools
    Pool(PoolId),
}

impl From<AccountId> for Holder {
    fn from(account: AccountId) -> Self {
        Holder::Account(account)
    }
}

impl From<PoolId> for Holder {
    fn from(pool: PoolId) -> Self {
        Holder::Pool(pool)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCE POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// A (collateral, debt) balance pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePool {
    id: PoolId,
    collateral: u128,
    debt: u128,
}

impl BalancePool {
    /// Create an empty pool
    pub fn new(id: PoolId) -> Self {
        Self {
            id,
            collateral: 0,
            debt: 0,
        }
    }

    /// Pool identifier
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Recorded collateral
    pub fn collateral(&self) -> u128 {
        self.collateral
    }

    /// Recorded debt
    pub fn debt(&self) -> u128 {
        self.debt
    }

    /// Add collateral
    pub fn increase_collateral(&mut self, amount: u128) -> Result<()> {
        self.collateral = safe_add(self.collateral, amount)?;
        Ok(())
    }

    /// Remove collateral; fails if the pool holds less
    pub fn decrease_collateral(&mut self, amount: u128) -> Result<()> {
        let available = self.collateral;
        self.collateral = safe_sub(available, amount).map_err(|_| Error::InsufficientBalance {
            required: amount,
            available,
        })?;
        Ok(())
    }

    /// Add debt
    pub fn increase_debt(&mut self, amount: u128) -> Result<()> {
        self.debt = safe_add(self.debt, amount)?;
        Ok(())
    }

    /// Remove debt; fails if the pool holds less
    pub fn decrease_debt(&mut self, amount: u128) -> Result<()> {
        let available = self.debt;
        self.debt = safe_sub(available, amount).map_err(|_| Error::InsufficientBalance {
            required: amount,
            available,
        })?;
        Ok(())
    }

    /// Remove up to `amount` of debt and return what was removed.
    ///
    /// Position debt is derived from normalized units and can exceed the pool
    /// aggregate by rounding dust; the pool never goes negative.
    pub fn release_debt(&mut self, amount: u128) -> u128 {
        let released = amount.min(self.debt);
        self.debt -= released;
        released
    }

    /// Remove up to `amount` of collateral and return what was removed
    pub fn release_collateral(&mut self, amount: u128) -> u128 {
        let released = amount.min(self.collateral);
        self.collateral -= released;
        released
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SURPLUS POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral owed to former owners after liquidation or redemption
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusPool {
    collateral: u128,
    claims: HashMap<AccountId, u128>,
}

impl SurplusPool {
    /// Total collateral held
    pub fn collateral(&self) -> u128 {
        self.collateral
    }

    /// Claimable collateral for an owner
    pub fn claimable(&self, owner: &AccountId) -> u128 {
        self.claims.get(owner).copied().unwrap_or(0)
    }

    /// Credit an owner's claim
    pub fn add_claim(&mut self, owner: AccountId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let current = self.claimable(&owner);
        self.claims.insert(owner, safe_add(current, amount)?);
        self.collateral = safe_add(self.collateral, amount)?;
        Ok(())
    }

    /// Remove and return an owner's whole claim
    pub fn take_claim(&mut self, owner: &AccountId) -> Result<u128> {
        let amount = self.claims.remove(owner).ok_or_else(|| Error::InvalidParameter {
            name: "owner".into(),
            reason: format!("no surplus collateral for {}", owner.short()),
        })?;
        self.collateral = safe_sub(self.collateral, amount)?;
        Ok(amount)
    }

    /// Number of owners with a pending claim
    pub fn claimant_count(&self) -> usize {
        self.claims.len()
    }

    /// Claims ordered by owner
    pub fn claims(&self) -> Vec<(AccountId, u128)> {
        let mut claims: Vec<_> = self.claims.iter().map(|(k, v)| (*k, *v)).collect();
        claims.sort_unstable();
        claims
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POOLS
// ═══════════════════════════════════════════════════════════════════════════════

/// All ledger pools except the stability pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pools {
    /// Standard cohort active pool
    pub active: BalancePool,
    /// Shielded cohort active pool
    pub shielded_active: BalancePool,
    /// Pending redistribution pool
    pub default: BalancePool,
    /// Surplus claims
    pub surplus: SurplusPool,
}

impl Default for Pools {
    fn default() -> Self {
        Self::new()
    }
}

impl Pools {
    /// Create empty pools
    pub fn new() -> Self {
        Self {
            active: BalancePool::new(PoolId::Active),
            shielded_active: BalancePool::new(PoolId::ShieldedActive),
            default: BalancePool::new(PoolId::Default),
            surplus: SurplusPool::default(),
        }
    }

    /// Active pool for a cohort
    pub fn active(&self, cohort: Cohort) -> &BalancePool {
        match cohort {
            Cohort::Standard => &self.active,
            Cohort::Shielded => &self.shielded_active,
        }
    }

    /// Mutable active pool for a cohort
    pub fn active_mut(&mut self, cohort: Cohort) -> &mut BalancePool {
        match cohort {
            Cohort::Standard => &mut self.active,
            Cohort::Shielded => &mut self.shielded_active,
        }
    }

    /// Collateral backing positions (active, shielded and default pools)
    pub fn system_collateral(&self) -> u128 {
        self.active.collateral + self.shielded_active.collateral + self.default.collateral
    }

    /// Debt owed by positions (active, shielded and default pools)
    pub fn system_debt(&self) -> u128 {
        self.active.debt + self.shielded_active.debt + self.default.debt
    }

    /// Recorded collateral of a pool, if it is held here
    pub fn collateral_of(&self, pool: PoolId) -> Option<u128> {
        match pool {
            PoolId::Active => Some(self.active.collateral),
            PoolId::ShieldedActive => Some(self.shielded_active.collateral),
            PoolId::Default => Some(self.default.collateral),
            PoolId::Surplus => Some(self.surplus.collateral),
            PoolId::StabilityPool => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_pool_non_negative() {
        let mut pool = BalancePool::new(PoolId::Active);
        pool.increase_collateral(10).unwrap();
        pool.increase_debt(5).unwrap();

        assert!(pool.decrease_collateral(11).is_err());
        assert_eq!(pool.collateral(), 10);
        assert!(pool.decrease_debt(6).is_err());

        pool.decrease_collateral(10).unwrap();
        assert_eq!(pool.collateral(), 0);
    }

    #[test]
    fn test_release_debt_saturates() {
        let mut pool = BalancePool::new(PoolId::Default);
        pool.increase_debt(5).unwrap();
        assert_eq!(pool.release_debt(7), 5);
        assert_eq!(pool.debt(), 0);
    }

    #[test]
    fn test_surplus_claims() {
        let owner = AccountId::from_label("owner");
        let mut surplus = SurplusPool::default();
        surplus.add_claim(owner, 3).unwrap();
        surplus.add_claim(owner, 4).unwrap();
        surplus.add_claim(owner, 0).unwrap();

        assert_eq!(surplus.claimable(&owner), 7);
        assert_eq!(surplus.collateral(), 7);
        assert_eq!(surplus.take_claim(&owner).unwrap(), 7);
        assert_eq!(surplus.collateral(), 0);
        assert!(surplus.take_claim(&owner).is_err());
    }

    #[test]
    fn test_pools_by_cohort() {
        let mut pools = Pools::new();
        pools.active_mut(Cohort::Shielded).increase_collateral(9).unwrap();
        pools.default.increase_debt(2).unwrap();

        assert_eq!(pools.active(Cohort::Shielded).collateral(), 9);
        assert_eq!(pools.active(Cohort::Standard).collateral(), 0);
        assert_eq!(pools.system_collateral(), 9);
        assert_eq!(pools.system_debt(), 2);
        assert_eq!(PoolId::active_for(Cohort::Shielded), PoolId::ShieldedActive);
    }
}
