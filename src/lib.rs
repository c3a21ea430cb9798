//! # cdp-engine
//!
//! Accounting and risk core of a collateralized-debt-position stablecoin
//! whose debt token targets a floating par value.
//!
//! ## Architecture
//!
//! - **Core**: configuration, token and collateral ledgers, pools, positions,
//!   the sorted index, redistribution rewards, fees and interest accrual
//! - **Liquidation**: liquidation engine, stability pool and recovery mode
//! - **Redemption**: debt-for-collateral redemption at par
//! - **Oracle**: the price source read once per call
//! - **Protocol**: ledger state, events and the atomic state machine
//! - **Monitoring**: invariant checks and tracing setup
//!
//! Positions belong to one of two cohorts. The standard cohort uses the
//! usual liquidation ratio; the shielded cohort must open above a higher
//! floor and is only redeemable once it falls below it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cdp_engine::prelude::*;
//!
//! let feed = PriceFeed::new(200 * WAD)?;
//! let mut sm = ProtocolStateMachine::new(ProtocolConfig::default(), feed, 0)?;
//!
//! sm.deposit_collateral(alice, units(2))?;
//! let position = sm.open_trove(
//!     CallContext::new(alice, 0),
//!     OpenTroveRequest { owner: alice, cohort: Cohort::Standard, collateral: units(2), debt: units(100), hint: InsertHint::none() },
//! )?;
//!
//! let record = sm.liquidate(CallContext::new(keeper, 60), LiquidationMode::Sequence(10))?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod liquidation;
pub mod monitoring;
pub mod oracle;
pub mod protocol;
pub mod redemption;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        accrual::{DripRecord, ParUpdate},
        config::{ProtocolConfig, ProtocolParams, RateParams, StabilityPoolParams},
        sorted_troves::InsertHint,
        trove::{Cohort, Trove, TroveStatus},
    };
    pub use crate::error::{Error, Result};
    pub use crate::liquidation::{
        engine::{LiquidationMode, LiquidationRecord},
        recovery::RecoveryModeStatus,
        stability_pool::{DepositChange, StabilityPool},
    };
    pub use crate::monitoring::{check_invariants, init_tracing, HealthReport};
    pub use crate::oracle::{PriceFeed, PriceOracle};
    pub use crate::protocol::{
        CallContext, LedgerState, OpenTroveRequest, OperationResult, ProtocolEvent,
        ProtocolOperation, ProtocolStateMachine,
    };
    pub use crate::redemption::{RedemptionHints, RedemptionRecord, RedemptionRequest};
    pub use crate::utils::{
        constants::WAD,
        crypto::{AccountId, Hash, TroveId},
        math::units,
    };
}

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "cdp-engine";
