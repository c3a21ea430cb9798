//! Collateral token ledger.
//!
//! Collateral is an external token; this ledger tracks holder balances so
//! every pool movement settles as a transfer, and keeps the total ever
//! deposited into and withdrawn from the system for conservation checks.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::pools::{Holder, PoolId};
use crate::error::{Error, Result};
use crate::utils::constants::WAD;
use crate::utils::crypto::Hash;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed collateral amount (18 decimals)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct CollateralAmount(u128);

impl CollateralAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from a raw 18-decimal value
    pub const fn from_wad(wad: u128) -> Self {
        Self(wad)
    }

    /// Create from whole units
    pub const fn from_units(units: u64) -> Self {
        Self(units as u128 * WAD)
    }

    /// Get the raw 18-decimal value
    pub fn wad(&self) -> u128 {
        self.0
    }

    /// Decimal representation, if it fits in 96 bits
    pub fn to_decimal(&self) -> Option<Decimal> {
        i128::try_from(self.0)
            .ok()
            .and_then(|v| Decimal::try_from_i128_with_scale(v, 18).ok())
            .map(|d| d.normalize())
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for CollateralAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_decimal() {
            Some(d) => write!(f, "{}", d),
            None => write!(f, "{}e-18", self.0),
        }
    }
}

impl From<u128> for CollateralAmount {
    fn from(wad: u128) -> Self {
        Self(wad)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Balances of the collateral token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateralLedger {
    balances: HashMap<Holder, CollateralAmount>,
    total_funded: CollateralAmount,
    total_withdrawn: CollateralAmount,
}

impl CollateralLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of a holder
    pub fn balance_of(&self, holder: &Holder) -> CollateralAmount {
        self.balances
            .get(holder)
            .copied()
            .unwrap_or(CollateralAmount::ZERO)
    }

    /// Bring collateral into the ledger from outside
    pub fn fund(&mut self, to: Holder, amount: CollateralAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        let balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(Error::Overflow {
                operation: "collateral fund".into(),
            })?;
        self.total_funded = self
            .total_funded
            .checked_add(amount)
            .ok_or(Error::Overflow {
                operation: "collateral total funded".into(),
            })?;
        self.balances.insert(to, balance);
        Ok(())
    }

    /// Take collateral out of the ledger
    pub fn withdraw(&mut self, from: Holder, amount: CollateralAmount) -> Result<()> {
        let balance = self.balance_of(&from);
        let remaining = balance.checked_sub(amount).ok_or(Error::InsufficientBalance {
            required: amount.wad(),
            available: balance.wad(),
        })?;
        self.set_balance(from, remaining);
        self.total_withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or(Error::Overflow {
                operation: "collateral total withdrawn".into(),
            })?;
        Ok(())
    }

    /// Move collateral between holders
    pub fn transfer(&mut self, from: Holder, to: Holder, amount: CollateralAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        if from == to {
            return Ok(());
        }

        let from_balance = self.balance_of(&from);
        let remaining = from_balance
            .checked_sub(amount)
            .ok_or(Error::InsufficientBalance {
                required: amount.wad(),
                available: from_balance.wad(),
            })?;
        let to_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(Error::Overflow {
                operation: "collateral transfer".into(),
            })?;

        self.set_balance(from, remaining);
        self.balances.insert(to, to_balance);
        Ok(())
    }

    fn set_balance(&mut self, holder: Holder, balance: CollateralAmount) {
        if balance.is_zero() {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, balance);
        }
    }

    /// Net collateral inside the ledger (funded minus withdrawn)
    pub fn net_deposited(&self) -> CollateralAmount {
        self.total_funded.saturating_sub(self.total_withdrawn)
    }

    /// Collateral held by all protocol pools
    pub fn held_by_pools(&self) -> u128 {
        self.balances
            .iter()
            .filter(|(holder, _)| matches!(holder, Holder::Pool(_)))
            .map(|(_, amount)| amount.wad())
            .sum()
    }

    /// Collateral held by every holder
    pub fn total_held(&self) -> u128 {
        self.balances.values().map(|amount| amount.wad()).sum()
    }

    /// Balance of a specific pool
    pub fn pool_balance(&self, pool: PoolId) -> CollateralAmount {
        self.balance_of(&Holder::Pool(pool))
    }

    /// State hash over totals and sorted balances
    pub fn state_hash(&self) -> Hash {
        let mut sorted: Vec<_> = self.balances.iter().collect();
        sorted.sort_by_key(|(holder, _)| **holder);

        let mut data = Vec::new();
        data.extend_from_slice(&self.total_funded.wad().to_be_bytes());
        data.extend_from_slice(&self.total_withdrawn.wad().to_be_bytes());
        for (holder, balance) in sorted {
            data.extend_from_slice(&bincode::serialize(holder).unwrap_or_default());
            data.extend_from_slice(&balance.wad().to_be_bytes());
        }
        Hash::sha256(&data)
    }
}
