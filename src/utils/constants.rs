//! Protocol constants and magic numbers.
//!
//! All amounts, prices and ratios are 18-decimal fixed point ("WAD") unless
//! stated otherwise. Constants here seed `ProtocolConfig::default()`.

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// One unit in 18-decimal fixed point
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Half a unit, used for round-half-up multiplication
pub const HALF_WAD: u128 = WAD / 2;

/// Precision of the nominal collateral ratio (NICR), 1e20
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum Collateralization Ratio (MCR) - 110%
/// Below this ratio a position can be liquidated
pub const MIN_COLLATERAL_RATIO: u128 = 1_100_000_000_000_000_000;

/// Critical Collateralization Ratio (CCR) - 150%
/// When system TCR falls below this, Recovery Mode activates
pub const CRITICAL_COLLATERAL_RATIO: u128 = 1_500_000_000_000_000_000;

/// Shielded cohort floor - 150%
/// Shielded positions must open above it and are exempt from redemption while above it
pub const SHIELDED_COLLATERAL_RATIO: u128 = 1_500_000_000_000_000_000;

/// Minimum debt of an active position (50 tokens)
pub const MIN_DEBT: u128 = 50 * WAD;

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Gas compensation divisor: liquidators receive 1/200 (0.5%) of collateral
pub const GAS_COMPENSATION_DIVISOR: u128 = 200;

/// Below this ICR the whole collateral is seized with no surplus (105%)
pub const MIN_LIQUIDATION_PENALTY: u128 = 1_050_000_000_000_000_000;

/// Maximum liquidation penalty factor (110%)
pub const MAX_LIQUIDATION_PENALTY: u128 = 1_100_000_000_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Redemption fee floor - 0.5%
pub const REDEMPTION_FEE_FLOOR: u128 = 5_000_000_000_000_000;

/// Divisor applied to the redeemed fraction when raising the base rate
pub const REDEMPTION_BETA: u128 = 2;

/// Per-minute base rate decay factor (12 hour half-life)
pub const MINUTE_DECAY_FACTOR: u128 = 999_037_758_833_783_000;

/// Seconds per minute, the base rate decay granularity
pub const SECONDS_PER_MINUTE: u64 = 60;

/// Exponent cap for `dec_pow` (1000 years in minutes)
pub const MAX_DEC_POW_EXPONENT: u64 = 525_600_000;

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Scale factor applied when P would drop below it (1e9)
pub const SP_SCALE_FACTOR: u128 = 1_000_000_000;

/// Compounded deposits smaller than initial / this are treated as zero
pub const SP_DUST_DIVISOR: u128 = 1_000_000_000;

/// Minimum total deposits left after a withdrawal (1 token)
pub const MIN_STABILITY_POOL_BALANCE: u128 = WAD;

/// Share of accrued interest routed to depositors (100%)
pub const SP_INTEREST_SHARE: u128 = WAD;

// ═══════════════════════════════════════════════════════════════════════════════
// RATES & PAR
// ═══════════════════════════════════════════════════════════════════════════════

/// Initial par value (1.0)
pub const INITIAL_PAR: u128 = WAD;

/// Proportional gain of the par controller (0.5)
pub const PAR_CONTROLLER_GAIN: u128 = 500_000_000_000_000_000;

/// Maximum par change per update call (1%)
pub const MAX_PAR_CHANGE_PER_CALL: u128 = 10_000_000_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of hashes and identifiers in bytes
pub const HASH_LENGTH: usize = 32;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CDP_ENGINE_";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collateral_ratios_ordering() {
        assert!(MIN_COLLATERAL_RATIO < CRITICAL_COLLATERAL_RATIO);
        assert!(MIN_COLLATERAL_RATIO < SHIELDED_COLLATERAL_RATIO);
    }

    #[test]
    fn test_penalty_bounds() {
        assert!(WAD <= MIN_LIQUIDATION_PENALTY);
        assert!(MIN_LIQUIDATION_PENALTY <= MAX_LIQUIDATION_PENALTY);
        assert!(MAX_LIQUIDATION_PENALTY <= MIN_COLLATERAL_RATIO);
    }

    #[test]
    fn test_decay_factor_below_one() {
        assert!(MINUTE_DECAY_FACTOR < WAD);
        assert!(REDEMPTION_FEE_FLOOR < WAD);
    }
}
