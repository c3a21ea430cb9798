//! Input validation utilities.
//!
//! Checks applied at entry points before any state is touched.

use crate::error::{Error, Result};
use crate::utils::constants::WAD;

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an amount is non-zero
pub fn validate_non_zero(amount: u128) -> Result<()> {
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    Ok(())
}

/// Validate that a holder has at least `required`
pub fn validate_balance(required: u128, available: u128) -> Result<()> {
    if available < required {
        return Err(Error::InsufficientBalance {
            required,
            available,
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE & RATIO VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate an oracle price. Oracle input is untrusted.
pub fn validate_price(price: u128) -> Result<()> {
    if price == 0 {
        return Err(Error::InvalidPrice("price must be positive".into()));
    }
    Ok(())
}

/// Validate a caller's redemption fee cap: `floor <= max_fee <= 100%`
pub fn validate_max_fee_percentage(max_fee: u128, floor: u128) -> Result<()> {
    if max_fee < floor || max_fee > WAD {
        return Err(Error::InvalidParameter {
            name: "max_fee_percentage".into(),
            reason: format!("must be between {} and {}", floor, WAD),
        });
    }
    Ok(())
}

/// Validate that a WAD fraction lies in `[0, 1]`
pub fn validate_fraction(value: u128, name: &str) -> Result<()> {
    if value > WAD {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{} exceeds 1.0", value),
        });
    }
    Ok(())
}
