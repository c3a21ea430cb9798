//! Redemption of debt tokens for collateral at par.

pub mod engine;

pub use engine::{
    current_redemption_rate, redeem, redemption_hints, RedeemedTrove, RedemptionHints,
    RedemptionRecord, RedemptionRequest,
};
