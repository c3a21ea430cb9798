//! Redemption fee curve.
//!
//! The fee rate is `floor + baseRate`, capped at 100%. Each redemption raises
//! the base rate by half of the redeemed fraction of supply (with the
//! default beta of 2); between redemptions it decays exponentially per
//! elapsed minute.

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::error::{Error, Result};
use crate::utils::constants::{SECONDS_PER_MINUTE, WAD};
use crate::utils::math::{collateral_to_debt, dec_mul, dec_pow, mul_div, safe_add};

/// Base rate and redemption totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionFeeState {
    base_rate: u128,
    last_fee_operation_time: u64,
    total_fees_collected: u128,
    total_debt_redeemed: u128,
}

impl RedemptionFeeState {
    /// Start with a zero base rate at `genesis`
    pub fn new(genesis: u64) -> Self {
        Self {
            last_fee_operation_time: genesis,
            ..Default::default()
        }
    }

    /// Stored (undecayed) base rate
    pub fn base_rate(&self) -> u128 {
        self.base_rate
    }

    /// Timestamp the decay is measured from
    pub fn last_fee_operation_time(&self) -> u64 {
        self.last_fee_operation_time
    }

    /// Collateral collected as fees so far
    pub fn total_fees_collected(&self) -> u128 {
        self.total_fees_collected
    }

    /// Debt redeemed so far
    pub fn total_debt_redeemed(&self) -> u128 {
        self.total_debt_redeemed
    }

    fn minutes_since_last_fee_op(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_fee_operation_time) / SECONDS_PER_MINUTE
    }

    /// Base rate decayed to `now`
    pub fn decayed_base_rate(&self, now: u64, decay_factor: u128) -> Result<u128> {
        let factor = dec_pow(decay_factor, self.minutes_since_last_fee_op(now))?;
        dec_mul(self.base_rate, factor)
    }

    /// Fee rate for a base rate
    pub fn redemption_rate(base_rate: u128, floor: u128) -> u128 {
        floor.saturating_add(base_rate).min(WAD)
    }

    /// Raise the base rate for a redemption drawing `collateral_drawn`.
    ///
    /// `total_supply` is the debt token supply before the redemption burns.
    pub fn update_base_rate_from_redemption(
        &mut self,
        collateral_drawn: u128,
        price: u128,
        par: u128,
        total_supply: u128,
        now: u64,
        params: &ProtocolParams,
    ) -> Result<u128> {
        if total_supply == 0 {
            return Err(Error::InvalidParameter {
                name: "total_supply".into(),
                reason: "cannot redeem against zero supply".into(),
            });
        }

        let decayed = self.decayed_base_rate(now, params.minute_decay_factor)?;
        let redeemed_value = collateral_to_debt(collateral_drawn, price, par)?;
        let redeemed_fraction = mul_div(redeemed_value, WAD, total_supply)?;

        let new_base_rate = safe_add(decayed, redeemed_fraction / params.redemption_beta)?.min(WAD);
        if new_base_rate == 0 {
            return Err(Error::InvariantViolation(
                "base rate is zero after a redemption".into(),
            ));
        }

        self.base_rate = new_base_rate;
        if now.saturating_sub(self.last_fee_operation_time) >= SECONDS_PER_MINUTE {
            self.last_fee_operation_time = now;
        }
        Ok(new_base_rate)
    }

    /// Fee on `collateral_drawn` at the stored base rate
    pub fn redemption_fee(&self, collateral_drawn: u128, floor: u128) -> Result<u128> {
        let rate = Self::redemption_rate(self.base_rate, floor);
        let fee = mul_div(rate, collateral_drawn, WAD)?;
        if fee >= collateral_drawn {
            return Err(Error::FeeConsumesAllCollateral {
                fee,
                drawn: collateral_drawn,
            });
        }
        Ok(fee)
    }

    /// Book a completed redemption
    pub fn record_redemption(&mut self, debt_redeemed: u128, fee: u128) {
        self.total_debt_redeemed = self.total_debt_redeemed.saturating_add(debt_redeemed);
        self.total_fees_collected = self.total_fees_collected.saturating_add(fee);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::REDEMPTION_FEE_FLOOR;
    use crate::utils::math::units;

    #[test]
    fn test_base_rate_from_redemption() {
        let params = ProtocolParams::default();
        let mut fees = RedemptionFeeState::new(0);

        // 0.75 collateral at 200 = 150 of a 300 supply: fraction 0.5, base 0.25
        let base = fees
            .update_base_rate_from_redemption(
                units(3) / 4,
                units(200),
                WAD,
                units(300),
                0,
                &params,
            )
            .unwrap();
        assert_eq!(base, WAD / 4);

        let fee = fees
            .redemption_fee(units(3) / 4, REDEMPTION_FEE_FLOOR)
            .unwrap();
        assert_eq!(fee, 191_250_000_000_000_000);
    }

    #[test]
    fn test_base_rate_decays() {
        let params = ProtocolParams::default();
        let mut fees = RedemptionFeeState::new(0);
        fees.update_base_rate_from_redemption(units(1), WAD, WAD, units(10), 0, &params)
            .unwrap();
        let base = fees.base_rate();

        // Less than a minute: no decay
        assert_eq!(fees.decayed_base_rate(59, params.minute_decay_factor).unwrap(), base);

        // Half-life is 12 hours
        let decayed = fees
            .decayed_base_rate(12 * 3600, params.minute_decay_factor)
            .unwrap();
        let half = base / 2;
        assert!(decayed.abs_diff(half) < half / 1000);
    }

    #[test]
    fn test_last_fee_time_needs_a_minute() {
        let params = ProtocolParams::default();
        let mut fees = RedemptionFeeState::new(100);
        fees.update_base_rate_from_redemption(units(1), WAD, WAD, units(10), 130, &params)
            .unwrap();
        assert_eq!(fees.last_fee_operation_time(), 100);
        fees.update_base_rate_from_redemption(units(1), WAD, WAD, units(10), 160, &params)
            .unwrap();
        assert_eq!(fees.last_fee_operation_time(), 160);
    }

    #[test]
    fn test_rate_capped() {
        assert_eq!(RedemptionFeeState::redemption_rate(WAD, REDEMPTION_FEE_FLOOR), WAD);
        let params = ProtocolParams::default();
        let mut fees = RedemptionFeeState::new(0);
        fees.update_base_rate_from_redemption(units(10), WAD, WAD, units(1), 0, &params)
            .unwrap();
        assert_eq!(fees.base_rate(), WAD);
        assert!(matches!(
            fees.redemption_fee(units(1), REDEMPTION_FEE_FLOOR),
            Err(Error::FeeConsumesAllCollateral { .. })
        ));
    }

    #[test]
    fn test_zero_supply_rejected() {
        let params = ProtocolParams::default();
        let mut fees = RedemptionFeeState::new(0);
        assert!(fees
            .update_base_rate_from_redemption(1, WAD, WAD, 0, 0, &params)
            .is_err());
    }
}
