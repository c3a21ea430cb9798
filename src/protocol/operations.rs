//! Protocol operations.
//!
//! Operations represent discrete actions executed atomically by the
//! [`ProtocolStateMachine`](crate::protocol::state_machine::ProtocolStateMachine).
//! Each variant carries only its own arguments; who calls and when comes
//! from the [`CallContext`].

use serde::{Deserialize, Serialize};

use crate::core::accrual::{DripRecord, ParUpdate};
use crate::liquidation::engine::{LiquidationMode, LiquidationRecord};
use crate::liquidation::stability_pool::DepositChange;
use crate::protocol::events::PositionUpdate;
use crate::protocol::positions::OpenTroveRequest;
use crate::redemption::engine::{RedemptionRecord, RedemptionRequest};
use crate::utils::crypto::{AccountId, TroveId};

// ═══════════════════════════════════════════════════════════════════════════════
// CALL CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller and time of one top-level call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Account making the call
    pub caller: AccountId,
    /// Time of the call in seconds
    pub timestamp: u64,
}

impl CallContext {
    /// Create a new context
    pub fn new(caller: AccountId, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// All top-level protocol operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolOperation {
    /// Accrue interest up to the call time
    Drip,
    /// Move par towards the market price
    UpdatePar {
        /// Observed market price of the debt token (WAD)
        market_price: u128,
    },
    /// Liquidate positions
    Liquidate(LiquidationMode),
    /// Redeem the caller's debt tokens
    Redeem(RedemptionRequest),
    /// Deposit into the stability pool
    ProvideToStabilityPool {
        /// Debt tokens to deposit
        amount: u128,
    },
    /// Withdraw from the stability pool; zero only claims gains
    WithdrawFromStabilityPool {
        /// Debt tokens to withdraw
        amount: u128,
    },
    /// Open a position owned by the caller
    OpenTrove(OpenTroveRequest),
    /// Repay and close one of the caller's positions
    CloseTrove(TroveId),
    /// Collect the caller's surplus collateral
    ClaimSurplus,
}

impl ProtocolOperation {
    /// Get the operation type name
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Drip => "Drip",
            Self::UpdatePar { .. } => "UpdatePar",
            Self::Liquidate(_) => "Liquidate",
            Self::Redeem(_) => "Redeem",
            Self::ProvideToStabilityPool { .. } => "ProvideToStabilityPool",
            Self::WithdrawFromStabilityPool { .. } => "WithdrawFromStabilityPool",
            Self::OpenTrove(_) => "OpenTrove",
            Self::CloseTrove(_) => "CloseTrove",
            Self::ClaimSurplus => "ClaimSurplus",
        }
    }

    /// Whether the operation reads the oracle price
    pub fn needs_price(&self) -> bool {
        matches!(
            self,
            Self::Liquidate(_) | Self::Redeem(_) | Self::OpenTrove(_) | Self::CloseTrove(_)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of an executed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    /// Interest minted, if any
    Drip(Option<DripRecord>),
    /// New par
    ParUpdated(ParUpdate),
    /// Liquidation summary
    Liquidated(LiquidationRecord),
    /// Redemption summary
    Redeemed(RedemptionRecord),
    /// Stability deposit after the change
    StabilityDeposit(DepositChange),
    /// Position state after the change
    Position(PositionUpdate),
    /// Surplus collateral paid out
    SurplusClaimed(u128),
}
