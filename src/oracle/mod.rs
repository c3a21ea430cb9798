//! Oracle module for price feeds.
//!
//! The engine never fetches prices itself. The coordinator reads one price
//! per call from a [`PriceOracle`] and threads it through every engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cdp_engine::oracle::{PriceFeed, PriceOracle};
//!
//! let mut feed = PriceFeed::new(200 * WAD)?;
//! feed.update(180 * WAD, now)?;
//! let price = feed.current_price()?;
//! ```

pub mod price_feed;

pub use price_feed::{PriceData, PriceFeed, PriceOracle};
