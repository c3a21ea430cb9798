//! Fixed-point arithmetic and mathematical utilities.
//!
//! All values are 18-decimal fixed point (`WAD`) stored in `u128`. Products of
//! two WAD values do not fit in 128 bits, so every multiply-then-divide goes
//! through a 256-bit intermediate and is narrowed back with an overflow check.

use primitive_types::U256;

use crate::error::{Error, Result};
use crate::utils::constants::{HALF_WAD, MAX_DEC_POW_EXPONENT, NICR_PRECISION, WAD};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe division with zero check
pub fn safe_div(a: u128, b: u128) -> Result<u128> {
    if b == 0 {
        return Err(division_by_zero());
    }
    Ok(a / b)
}

fn division_by_zero() -> Error {
    Error::InvalidParameter {
        name: "divisor".into(),
        reason: "division by zero".into(),
    }
}

/// Narrow a 256-bit value back into `u128`
pub fn narrow(value: U256, operation: &str) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(Error::Overflow {
            operation: operation.to_string(),
        });
    }
    Ok(value.low_u128())
}

/// Computes `(a * b) / c`, rounding down, with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(division_by_zero());
    }
    let result = U256::from(a) * U256::from(b) / U256::from(c);
    narrow(result, "mul_div")
}

/// Computes `(a * b) / c`, rounding up
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(division_by_zero());
    }
    let numerator = U256::from(a) * U256::from(b);
    let divisor = U256::from(c);
    let result = (numerator + divisor - U256::one()) / divisor;
    narrow(result, "mul_div_up")
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECIMAL POWERS
// ═══════════════════════════════════════════════════════════════════════════════

/// WAD multiplication rounding half up: `(x * y + WAD/2) / WAD`
pub fn dec_mul(x: u128, y: u128) -> Result<u128> {
    let product = U256::from(x) * U256::from(y) + U256::from(HALF_WAD);
    narrow(product / U256::from(WAD), "dec_mul")
}

/// `base ^ exponent` for a WAD base, by exponentiation by squaring.
///
/// The exponent is capped at [`MAX_DEC_POW_EXPONENT`]; bases below one decay
/// to zero long before the cap, and bases above one would overflow anyway.
pub fn dec_pow(base: u128, exponent: u64) -> Result<u128> {
    let mut n = exponent.min(MAX_DEC_POW_EXPONENT);
    if n == 0 {
        return Ok(WAD);
    }

    let mut y = WAD;
    let mut x = base;
    while n > 1 {
        if n % 2 == 0 {
            x = dec_mul(x, x)?;
            n /= 2;
        } else {
            y = dec_mul(x, y)?;
            x = dec_mul(x, x)?;
            n = (n - 1) / 2;
        }
    }
    dec_mul(x, y)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral ratio with par-adjusted debt.
///
/// `coll * price / (debt * par)`, all WAD. Returns `u128::MAX` for zero debt.
pub fn compute_cr(coll: u128, debt: u128, price: u128, par: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    let debt_value = U256::from(debt) * U256::from(par) / U256::from(WAD);
    if debt_value.is_zero() {
        return u128::MAX;
    }
    let cr = U256::from(coll) * U256::from(price) / debt_value;
    if cr > U256::from(u128::MAX) {
        u128::MAX
    } else {
        cr.low_u128()
    }
}

/// Nominal collateral ratio: `coll * 1e20 / debt`, price independent.
pub fn compute_nominal_cr(coll: u128, debt: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    let nicr = U256::from(coll) * U256::from(NICR_PRECISION) / U256::from(debt);
    if nicr > U256::from(u128::MAX) {
        u128::MAX
    } else {
        nicr.low_u128()
    }
}

/// Value of a collateral amount in debt tokens at the given price and par
pub fn collateral_to_debt(coll: u128, price: u128, par: u128) -> Result<u128> {
    mul_div(coll, price, par)
}

/// Collateral needed to cover a debt amount at the given price and par
pub fn debt_to_collateral(debt: u128, price: u128, par: u128) -> Result<u128> {
    mul_div(debt, par, price)
}

/// Whole token units to WAD
pub const fn units(n: u64) -> u128 {
    n as u128 * WAD
}

/// Absolute difference between two values
pub fn abs_diff(a: u128, b: u128) -> u128 {
    a.max(b) - a.min(b)
}
