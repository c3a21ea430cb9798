//! Position ("trove") entity.
//!
//! A trove records collateral and *normalized* debt: actual debt is the
//! normalized amount multiplied by its cohort's accumulated rate, so interest
//! accrues to every position at once without touching them individually.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::utils::constants::WAD;
use crate::utils::crypto::{AccountId, Hash, TroveId};
use crate::utils::math::mul_div;

// ═══════════════════════════════════════════════════════════════════════════════
// COHORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Risk class of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cohort {
    /// Ordinary positions
    Standard,
    /// Higher floor, exempt from redemption while above it
    Shielded,
}

impl Cohort {
    /// Both cohorts, standard first
    pub const ALL: [Cohort; 2] = [Cohort::Standard, Cohort::Shielded];

    /// The opposite cohort
    pub fn other(self) -> Self {
        match self {
            Cohort::Standard => Cohort::Shielded,
            Cohort::Shielded => Cohort::Standard,
        }
    }

    /// Stable index for per-cohort arrays
    pub fn index(self) -> usize {
        match self {
            Cohort::Standard => 0,
            Cohort::Shielded => 1,
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cohort::Standard => write!(f, "standard"),
            Cohort::Shielded => write!(f, "shielded"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TroveStatus {
    /// Never opened
    NonExistent,
    /// Open
    Active,
    /// Repaid and closed by its owner
    ClosedByOwner,
    /// Closed by liquidation
    ClosedByLiquidation,
    /// Fully redeemed
    ClosedByRedemption,
}

impl TroveStatus {
    /// Check if the position is open
    pub fn is_active(&self) -> bool {
        matches!(self, TroveStatus::Active)
    }
}

/// Reason code attached to position update records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TroveOperation {
    /// Opened by its owner
    Open,
    /// Repaid and closed by its owner
    Close,
    /// Pending redistribution folded in
    ApplyRewards,
    /// Liquidated
    Liquidate,
    /// Partially or fully redeemed against
    Redeem,
}

/// Redistribution accumulator values at the last reward application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    /// Collateral reward per unit staked
    pub collateral: u128,
    /// Normalized debt reward per unit staked
    pub debt: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE
// ═══════════════════════════════════════════════════════════════════════════════

/// A collateralized debt position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trove {
    /// Unique identifier
    pub id: TroveId,
    /// Owner
    pub owner: AccountId,
    /// Risk cohort
    pub cohort: Cohort,
    /// Recorded collateral
    pub collateral: u128,
    /// Recorded debt in normalized units
    pub normalized_debt: u128,
    /// Redistribution stake
    pub stake: u128,
    /// Lifecycle status
    pub status: TroveStatus,
    /// Position in the owner array
    pub array_index: usize,
    /// Accumulators at the last reward application
    pub snapshot: RewardSnapshot,
    /// Timestamp of opening
    pub opened_at: u64,
    /// Timestamp of the last change
    pub last_updated: u64,
}

impl Trove {
    /// Check if open
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Actual recorded debt at an accumulated rate
    pub fn actual_debt(&self, accumulated_rate: u128) -> Result<u128> {
        mul_div(self.normalized_debt, accumulated_rate, WAD)
    }

    /// Hash of the serialized position
    pub fn hash(&self) -> Hash {
        Hash::sha256(&bincode::serialize(self).unwrap_or_default())
    }
}
