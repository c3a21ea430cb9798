//! Core modules of the engine.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - Debt token and collateral ledgers
//! - Pools and queued interactions
//! - Positions, the sorted index and redistribution rewards
//! - Redemption fees and interest accrual

pub mod accrual;
pub mod collateral;
pub mod config;
pub mod fees;
pub mod interactions;
pub mod pools;
pub mod registry;
pub mod rewards;
pub mod sorted_troves;
pub mod token;
pub mod trove;

pub use accrual::{drip, update_par, CohortRate, DripRecord, ParUpdate, PricingContext, RateState};
pub use collateral::{CollateralAmount, CollateralLedger};
pub use config::{ProtocolConfig, ProtocolParams, RateParams, StabilityPoolParams};
pub use fees::RedemptionFeeState;
pub use interactions::{Interaction, Interactions};
pub use pools::{BalancePool, Holder, PoolId, Pools, SurplusPool};
pub use registry::{CohortBook, EntireDebtAndColl, TroveRegistry};
pub use rewards::RewardsLedger;
pub use sorted_troves::{InsertHint, SortedTroves};
pub use token::{DebtToken, TokenAmount};
pub use trove::{Cohort, RewardSnapshot, Trove, TroveOperation, TroveStatus};
