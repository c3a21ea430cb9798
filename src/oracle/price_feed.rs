//! Price feed implementation.
//!
//! The engine reads one collateral price per call through [`PriceOracle`].
//! [`PriceFeed`] is the in-process implementation: the latest validated
//! price and the time it was recorded.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::validation::validate_price;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of the collateral price in debt-token units (WAD)
pub trait PriceOracle {
    /// Price to use for the current call
    fn current_price(&self) -> Result<u128>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// A single price data point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// Price (WAD)
    pub price: u128,
    /// Time the price was recorded
    pub timestamp: u64,
}

impl PriceData {
    /// Create a new price data point
    pub fn new(price: u128, timestamp: u64) -> Self {
        Self { price, timestamp }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE FEED
// ═══════════════════════════════════════════════════════════════════════════════

/// Price feed holding the latest collateral price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeed {
    current: PriceData,
}

impl PriceFeed {
    /// Feed starting at `price`
    pub fn new(price: u128) -> Result<Self> {
        validate_price(price)?;
        Ok(Self {
            current: PriceData::new(price, 0),
        })
    }

    /// Record a new price
    pub fn update(&mut self, price: u128, timestamp: u64) -> Result<()> {
        validate_price(price)?;
        if timestamp < self.current.timestamp {
            return Err(Error::InvalidParameter {
                name: "timestamp".into(),
                reason: "price timestamp is older than current".into(),
            });
        }
        self.current = PriceData::new(price, timestamp);
        Ok(())
    }

    /// Alias for [`update`](Self::update) keeping the current timestamp
    pub fn set_price(&mut self, price: u128) -> Result<()> {
        let timestamp = self.current.timestamp;
        self.update(price, timestamp)
    }

    /// Latest data point
    pub fn current(&self) -> PriceData {
        self.current
    }
}

impl PriceOracle for PriceFeed {
    fn current_price(&self) -> Result<u128> {
        validate_price(self.current.price)?;
        Ok(self.current.price)
    }
}
