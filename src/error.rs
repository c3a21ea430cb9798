//! Error types for the CDP engine.
//!
//! Every entry point returns either a success record or exactly one of these
//! variants. Batch operations never surface a per-element failure; they skip
//! and report instead.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the CDP engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Position Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Position does not exist or is no longer active
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Collateralization ratio below the required bound
    #[error("Collateralization ratio {current} below minimum {minimum} (18-decimal)")]
    CollateralizationRatioTooLow {
        /// Current ratio (WAD)
        current: u128,
        /// Required ratio (WAD)
        minimum: u128,
    },

    /// Debt amount below protocol minimum
    #[error("Debt amount {amount} below minimum {minimum}")]
    DebtBelowMinimum {
        /// Requested debt amount
        amount: u128,
        /// Protocol minimum debt
        minimum: u128,
    },

    /// Caller does not own the position
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// No candidate was eligible for liquidation
    #[error("Nothing to liquidate")]
    NothingToLiquidate,

    // ═══════════════════════════════════════════════════════════════════
    // Stability Pool Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Withdrawal would leave the pool below its floor
    #[error("Stability pool would fall below minimum: remaining {remaining}, minimum {minimum}")]
    BelowMinimumPoolBalance {
        /// Total deposits left after the withdrawal
        remaining: u128,
        /// Configured floor
        minimum: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Redemption Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Redemption fee above the caller's cap
    #[error("Redemption fee {fee_percentage} exceeds maximum {max_fee_percentage} (18-decimal)")]
    FeeExceedsMaximum {
        /// Effective fee as a fraction of the draw (WAD)
        fee_percentage: u128,
        /// Caller-supplied cap (WAD)
        max_fee_percentage: u128,
    },

    /// The whole collateral draw would be eaten by the fee
    #[error("Fee {fee} would consume all drawn collateral {drawn}")]
    FeeConsumesAllCollateral {
        /// Computed fee
        fee: u128,
        /// Collateral drawn
        drawn: u128,
    },

    /// A partial-redemption hint no longer matches the list order
    #[error("Stale hint: nothing could be redeemed with the supplied hints")]
    StaleHint,

    /// No position is eligible for redemption
    #[error("Nothing to redeem")]
    NothingToRedeem,

    /// System TCR is below MCR
    #[error("System collateralization {tcr} below minimum {mcr} (18-decimal)")]
    SystemBelowMinimumCollateralization {
        /// Total collateralization ratio (WAD)
        tcr: u128,
        /// Minimum collateralization ratio (WAD)
        mcr: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Balance Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Account or pool lacks the requested balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required amount
        required: u128,
        /// Available amount
        available: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid parameter provided
    #[error("Invalid parameter: {name} - {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Zero amount not allowed
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Oracle returned an unusable price
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Arithmetic overflow
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Arithmetic underflow
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Protocol Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the caller can resolve this by resubmitting with fresh inputs
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::StaleHint
                | Error::NothingToLiquidate
                | Error::NothingToRedeem
                | Error::FeeExceedsMaximum { .. }
                | Error::InsufficientBalance { .. }
                | Error::BelowMinimumPoolBalance { .. }
                | Error::CollateralizationRatioTooLow { .. }
                | Error::DebtBelowMinimum { .. }
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_)
                | Error::Internal(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Position errors: 1xxx
            Error::InvalidPosition(_) => 1001,
            Error::CollateralizationRatioTooLow { .. } => 1002,
            Error::DebtBelowMinimum { .. } => 1003,
            Error::Unauthorized(_) => 1004,

            // Liquidation errors: 2xxx
            Error::NothingToLiquidate => 2001,

            // Stability pool errors: 3xxx
            Error::BelowMinimumPoolBalance { .. } => 3001,

            // Redemption errors: 4xxx
            Error::FeeExceedsMaximum { .. } => 4001,
            Error::FeeConsumesAllCollateral { .. } => 4002,
            Error::StaleHint => 4003,
            Error::NothingToRedeem => 4004,
            Error::SystemBelowMinimumCollateralization { .. } => 4005,

            // Validation errors: 5xxx
            Error::InsufficientBalance { .. } => 5001,
            Error::InvalidParameter { .. } => 5002,
            Error::ZeroAmount => 5003,
            Error::InvalidPrice(_) => 5004,
            Error::Overflow { .. } => 5005,
            Error::Underflow { .. } => 5006,

            // Protocol errors: 6xxx
            Error::InvariantViolation(_) => 6001,
            Error::Config(_) => 6002,

            // Serialization errors: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // Internal errors: 9xxx
            Error::Internal(_) => 9001,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        let errors = vec![
            Error::InvalidPosition("x".into()),
            Error::NothingToLiquidate,
            Error::BelowMinimumPoolBalance { remaining: 0, minimum: 1 },
            Error::FeeExceedsMaximum { fee_percentage: 2, max_fee_percentage: 1 },
            Error::FeeConsumesAllCollateral { fee: 1, drawn: 1 },
            Error::InsufficientBalance { required: 2, available: 1 },
            Error::ZeroAmount,
            Error::StaleHint,
            Error::SystemBelowMinimumCollateralization { tcr: 1, mcr: 2 },
            Error::NothingToRedeem,
            Error::Overflow { operation: "mul".into() },
            Error::Underflow { operation: "sub".into() },
            Error::Internal("x".into()),
        ];

        let mut codes: Vec<u32> = errors.iter().map(|e| e.code()).collect();
        let len = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), len, "Error codes must be unique");
    }

    #[test]
    fn test_error_display() {
        let err = Error::InsufficientBalance {
            required: 100,
            available: 50,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: required 100, available 50"
        );
        assert_eq!(Error::NothingToLiquidate.to_string(), "Nothing to liquidate");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::StaleHint.is_recoverable());
        assert!(!Error::Internal("x".into()).is_recoverable());
    }

    #[test]
    fn test_is_critical() {
        assert!(Error::InvariantViolation("supply".into()).is_critical());
        assert!(!Error::ZeroAmount.is_critical());
    }
}
