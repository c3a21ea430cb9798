//! Liquidation module.
//!
//! This module handles liquidations and the stability pool:
//! - Liquidation engine for undercollateralized positions
//! - Stability pool absorbing liquidated debt
//! - Recovery mode rules for system-wide undercollateralization

pub mod engine;
pub mod recovery;
pub mod stability_pool;

pub use engine::{
    assess, liquidatable_troves, liquidate, Assessment, LiquidatedTrove, LiquidationMode,
    LiquidationRecord,
};
pub use recovery::RecoveryModeStatus;
pub use stability_pool::{
    DepositChange, DepositorGains, OffsetOutcome, StabilityPool, StabilityPoolStats,
};
