//! Protocol configuration and parameters.
//!
//! Parameters are divided into:
//! - Risk: collateral ratios, liquidation penalties, redemption fee curve
//! - Stability pool: minimum balance, scale threshold, incentive issuance
//! - Rates: per-cohort interest and the par controller
//!
//! Configuration is plain data. It can be loaded from a JSON file and
//! overridden through `CDP_ENGINE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::crypto::AccountId;
use crate::utils::validation::validate_fraction;

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Risk parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Minimum collateralization ratio (MCR)
    /// Below this, positions can be liquidated
    pub min_collateral_ratio: u128,

    /// Critical collateralization ratio (CCR)
    /// When system TCR falls below this, recovery mode activates
    pub critical_collateral_ratio: u128,

    /// Floor of the shielded cohort; shielded positions are redeemable below it
    pub shielded_collateral_ratio: u128,

    /// Minimum debt per position
    pub min_debt: u128,

    /// Gas compensation is collateral / this
    pub gas_compensation_divisor: u128,

    /// Liquidation penalty floor; below it all collateral is seized
    pub min_liquidation_penalty: u128,

    /// Liquidation penalty ceiling
    pub max_liquidation_penalty: u128,

    /// Redemption fee floor
    pub redemption_fee_floor: u128,

    /// Divisor of the redeemed fraction added to the base rate
    pub redemption_beta: u128,

    /// Per-minute base rate decay
    pub minute_decay_factor: u128,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_collateral_ratio: MIN_COLLATERAL_RATIO,
            critical_collateral_ratio: CRITICAL_COLLATERAL_RATIO,
            shielded_collateral_ratio: SHIELDED_COLLATERAL_RATIO,
            min_debt: MIN_DEBT,
            gas_compensation_divisor: GAS_COMPENSATION_DIVISOR,
            min_liquidation_penalty: MIN_LIQUIDATION_PENALTY,
            max_liquidation_penalty: MAX_LIQUIDATION_PENALTY,
            redemption_fee_floor: REDEMPTION_FEE_FLOOR,
            redemption_beta: REDEMPTION_BETA,
            minute_decay_factor: MINUTE_DECAY_FACTOR,
        }
    }
}

impl ProtocolParams {
    /// Create with custom MCR (for testing)
    pub fn with_mcr(mut self, mcr: u128) -> Self {
        self.min_collateral_ratio = mcr;
        self
    }

    /// Create with custom minimum debt (for testing)
    pub fn with_min_debt(mut self, min_debt: u128) -> Self {
        self.min_debt = min_debt;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        if self.min_collateral_ratio <= WAD {
            return Err(invalid("min_collateral_ratio", "must exceed 100%"));
        }
        if self.min_collateral_ratio >= self.critical_collateral_ratio {
            return Err(invalid("critical_collateral_ratio", "must exceed MCR"));
        }
        if self.shielded_collateral_ratio < self.min_collateral_ratio {
            return Err(invalid("shielded_collateral_ratio", "must be at least MCR"));
        }
        if self.gas_compensation_divisor == 0 {
            return Err(invalid("gas_compensation_divisor", "must be non-zero"));
        }
        if self.min_liquidation_penalty < WAD
            || self.min_liquidation_penalty > self.max_liquidation_penalty
        {
            return Err(invalid(
                "min_liquidation_penalty",
                "must be between 100% and the maximum penalty",
            ));
        }
        if self.redemption_fee_floor >= WAD {
            return Err(invalid("redemption_fee_floor", "must be below 100%"));
        }
        if self.redemption_beta == 0 {
            return Err(invalid("redemption_beta", "must be non-zero"));
        }
        if self.minute_decay_factor == 0 || self.minute_decay_factor > WAD {
            return Err(invalid("minute_decay_factor", "must be in (0, 1]"));
        }
        Ok(())
    }
}

/// Stability pool parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityPoolParams {
    /// Total deposits a withdrawal must leave behind
    pub min_pool_balance: u128,

    /// P is rescaled when it would drop below this
    pub scale_factor: u128,

    /// Compounded deposits below initial / this read as zero
    pub dust_divisor: u128,

    /// Incentive tokens issued per second
    pub incentive_issuance_per_second: u128,

    /// Share of accrued interest paid to depositors
    pub interest_share: u128,
}

impl Default for StabilityPoolParams {
    fn default() -> Self {
        Self {
            min_pool_balance: MIN_STABILITY_POOL_BALANCE,
            scale_factor: SP_SCALE_FACTOR,
            dust_divisor: SP_DUST_DIVISOR,
            incentive_issuance_per_second: 0,
            interest_share: SP_INTEREST_SHARE,
        }
    }
}

impl StabilityPoolParams {
    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        if self.scale_factor < 2 || self.scale_factor >= WAD {
            return Err(invalid("scale_factor", "must be in [2, 1e18)"));
        }
        if self.dust_divisor == 0 {
            return Err(invalid("dust_divisor", "must be non-zero"));
        }
        validate_fraction(self.interest_share, "interest_share")?;
        Ok(())
    }
}

/// Interest and par parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateParams {
    /// Par at genesis
    pub initial_par: u128,

    /// Per-second rate factor of the standard cohort (WAD = no interest)
    pub standard_rate_per_second: u128,

    /// Per-second rate factor of the shielded cohort
    pub shielded_rate_per_second: u128,

    /// Proportional gain of the par controller
    pub par_controller_gain: u128,

    /// Largest relative par move a single update may make
    pub max_par_change_per_call: u128,
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            initial_par: INITIAL_PAR,
            standard_rate_per_second: WAD,
            shielded_rate_per_second: WAD,
            par_controller_gain: PAR_CONTROLLER_GAIN,
            max_par_change_per_call: MAX_PAR_CHANGE_PER_CALL,
        }
    }
}

impl RateParams {
    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        if self.initial_par == 0 {
            return Err(invalid("initial_par", "must be non-zero"));
        }
        if self.standard_rate_per_second < WAD || self.shielded_rate_per_second < WAD {
            return Err(invalid("rate_per_second", "must be at least 1.0"));
        }
        if self.max_par_change_per_call >= WAD {
            return Err(invalid("max_par_change_per_call", "must be below 100%"));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidParameter {
        name: name.into(),
        reason: reason.into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Risk parameters
    pub params: ProtocolParams,

    /// Stability pool parameters
    pub stability_pool: StabilityPoolParams,

    /// Interest and par parameters
    pub rates: RateParams,

    /// Receives interest not routed to depositors
    pub treasury: AccountId,

    /// Receives redemption fees
    pub fee_recipient: AccountId,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            params: ProtocolParams::default(),
            stability_pool: StabilityPoolParams::default(),
            rates: RateParams::default(),
            treasury: AccountId::from_label("treasury"),
            fee_recipient: AccountId::from_label("fee-recipient"),
        }
    }
}

impl ProtocolConfig {
    /// Create a configuration with custom risk parameters
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Replace the stability pool parameters
    pub fn with_stability_pool(mut self, stability_pool: StabilityPoolParams) -> Self {
        self.stability_pool = stability_pool;
        self
    }

    /// Replace the rate parameters
    pub fn with_rates(mut self, rates: RateParams) -> Self {
        self.rates = rates;
        self
    }

    /// Set the treasury account
    pub fn with_treasury(mut self, treasury: AccountId) -> Self {
        self.treasury = treasury;
        self
    }

    /// Set the fee recipient account
    pub fn with_fee_recipient(mut self, fee_recipient: AccountId) -> Self {
        self.fee_recipient = fee_recipient;
        self
    }

    /// Validate every parameter group
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        self.stability_pool.validate()?;
        self.rates.validate()
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("failed to write {}: {}", path.display(), e)))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `CDP_ENGINE_*` variables that are set
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        override_u128("MCR", &mut self.params.min_collateral_ratio)?;
        override_u128("CCR", &mut self.params.critical_collateral_ratio)?;
        override_u128("SHIELDED_CR", &mut self.params.shielded_collateral_ratio)?;
        override_u128("MIN_DEBT", &mut self.params.min_debt)?;
        override_u128("REDEMPTION_FEE_FLOOR", &mut self.params.redemption_fee_floor)?;
        override_u128("SP_MIN_BALANCE", &mut self.stability_pool.min_pool_balance)?;
        override_u128("SP_SCALE_FACTOR", &mut self.stability_pool.scale_factor)?;
        override_u128(
            "SP_ISSUANCE_PER_SECOND",
            &mut self.stability_pool.incentive_issuance_per_second,
        )?;
        override_u128("SP_INTEREST_SHARE", &mut self.stability_pool.interest_share)?;
        override_u128("STANDARD_RATE", &mut self.rates.standard_rate_per_second)?;
        override_u128("SHIELDED_RATE", &mut self.rates.shielded_rate_per_second)?;
        override_u128("MAX_PAR_CHANGE", &mut self.rates.max_par_change_per_call)?;

        if let Some(value) = env_value("TREASURY") {
            self.treasury = AccountId::from_hex(&value)
                .map_err(|e| Error::Config(format!("{}TREASURY: {}", ENV_PREFIX, e)))?;
        }
        if let Some(value) = env_value("FEE_RECIPIENT") {
            self.fee_recipient = AccountId::from_hex(&value)
                .map_err(|e| Error::Config(format!("{}FEE_RECIPIENT: {}", ENV_PREFIX, e)))?;
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
}

fn override_u128(key: &str, field: &mut u128) -> Result<()> {
    if let Some(value) = env_value(key) {
        *field = value.trim().parse().map_err(|e| {
            Error::Config(format!("{}{}={:?}: {}", ENV_PREFIX, key, value, e))
        })?;
    }
    Ok(())
}
