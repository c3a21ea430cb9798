//! Shared utilities.
//!
//! - Identifiers and hashing
//! - Fixed-point arithmetic
//! - Validation helpers
//! - Constants

pub mod constants;
pub mod crypto;
pub mod math;
pub mod validation;

pub use constants::*;
pub use crypto::*;
pub use math::*;
pub use validation::*;
