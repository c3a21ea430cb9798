//! Stability Pool implementation.
//!
//! Depositors lock debt tokens that are burned to absorb liquidated debt. In
//! return they receive the liquidated collateral, a share of accrued interest
//! and incentive issuance, all pro rata to their compounded deposit.
//!
//! Per-depositor accounting is O(1) via a product/sum scheme:
//!
//! - `P` is the running product of `(1 - loss per unit deposited)`. A deposit
//!   made at `P_snap` is worth `initial * P / P_snap` now.
//! - `S`, `G` and `I` record cumulative collateral, incentive and interest
//!   gains per unit deposited, multiplied by the `P` in force at the time.
//! - When `P` would drop below the scale factor it is multiplied by that
//!   factor and `scale` is bumped; sums are kept per `(epoch, scale)`.
//! - An offset that empties the pool bumps `epoch` and resets `P` to one;
//!   deposits from earlier epochs read as zero.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::core::config::StabilityPoolParams;
use crate::core::interactions::Interactions;
use crate::core::pools::PoolId;
use crate::error::{Error, Result};
use crate::utils::constants::WAD;
use crate::utils::crypto::{AccountId, Hash};
use crate::utils::math::{mul_div, narrow, safe_add, safe_sub};
use crate::utils::validation::validate_non_zero;

// ═══════════════════════════════════════════════════════════════════════════════
// DEPOSITOR SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of pool sums when a depositor last changed their deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSnapshot {
    /// Product factor
    pub p: u128,
    /// Collateral sum
    pub s: U256,
    /// Incentive sum
    pub g: U256,
    /// Interest sum
    pub i: U256,
    /// Scale
    pub scale: u64,
    /// Epoch
    pub epoch: u64,
}

/// A single deposit in the stability pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Value at the last change
    pub initial_value: u128,
    /// Sums at the last change
    pub snapshot: DepositSnapshot,
    /// Time of the last change
    pub updated_at: u64,
}

/// Gains crystallized for a depositor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositorGains {
    /// Collateral from absorbed liquidations
    pub collateral: u128,
    /// Debt tokens from accrued interest
    pub interest: u128,
    /// Incentive tokens
    pub incentive: u128,
}

/// Result of a provide or withdraw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositChange {
    /// Depositor
    pub depositor: AccountId,
    /// Compounded deposit before the change
    pub previous: u128,
    /// Deposit after the change
    pub current: u128,
    /// Deposit lost to offsets since the last change
    pub loss: u128,
    /// Gains paid out with the change
    pub gains: DepositorGains,
}

/// How much of a liquidation the pool absorbed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetOutcome {
    /// Debt cancelled against deposits
    pub debt_offset: u128,
    /// Collateral sent to the pool
    pub collateral_offset: u128,
    /// Debt left for redistribution
    pub debt_residual: u128,
    /// Collateral left for redistribution
    pub collateral_residual: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Stability pool state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityPool {
    params: StabilityPoolParams,

    /// Debt tokens deposited
    total_deposits: u128,
    /// Collateral gains not yet paid out
    collateral: u128,
    /// Interest received and not yet paid out
    interest_balance: u128,

    p: u128,
    current_scale: u64,
    current_epoch: u64,
    epoch_scale_sum: HashMap<(u64, u64), U256>,
    epoch_scale_g: HashMap<(u64, u64), U256>,
    epoch_scale_i: HashMap<(u64, u64), U256>,

    last_collateral_error: u128,
    last_debt_loss_error: u128,
    last_g_error: u128,
    last_interest_error: u128,

    deposits: HashMap<AccountId, Deposit>,
    incentive_balances: HashMap<AccountId, u128>,
    last_issuance_time: u64,

    total_offsets: u64,
    total_debt_offset: u128,
    total_collateral_gained: u128,
    total_interest_received: u128,
    total_incentives_issued: u128,
}

impl StabilityPool {
    /// Create an empty pool
    pub fn new(params: StabilityPoolParams, genesis: u64) -> Self {
        Self {
            params,
            total_deposits: 0,
            collateral: 0,
            interest_balance: 0,
            p: WAD,
            current_scale: 0,
            current_epoch: 0,
            epoch_scale_sum: HashMap::new(),
            epoch_scale_g: HashMap::new(),
            epoch_scale_i: HashMap::new(),
            last_collateral_error: 0,
            last_debt_loss_error: 0,
            last_g_error: 0,
            last_interest_error: 0,
            deposits: HashMap::new(),
            incentive_balances: HashMap::new(),
            last_issuance_time: genesis,
            total_offsets: 0,
            total_debt_offset: 0,
            total_collateral_gained: 0,
            total_interest_received: 0,
            total_incentives_issued: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSITS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add `amount` to a depositor's deposit, paying out pending gains
    pub fn provide(
        &mut self,
        depositor: AccountId,
        amount: u128,
        now: u64,
        fx: &mut Interactions,
    ) -> Result<DepositChange> {
        validate_non_zero(amount)?;
        self.trigger_issuance(now)?;

        let initial = self.initial_deposit(&depositor);
        let gains = self.depositor_gains(&depositor)?;
        let compounded = self.compounded_deposit(&depositor);
        let current = safe_add(compounded, amount)?;

        self.pay_gains(depositor, &gains, fx)?;
        self.total_deposits = safe_add(self.total_deposits, amount)?;
        self.update_deposit(depositor, current, now);
        fx.transfer_debt(depositor, PoolId::StabilityPool, amount);

        debug!(depositor = %depositor.short(), amount, compounded, current, "Stability deposit provided");
        Ok(DepositChange {
            depositor,
            previous: compounded,
            current,
            loss: initial.saturating_sub(compounded),
            gains,
        })
    }

    /// Withdraw up to `amount`, paying out pending gains.
    ///
    /// A zero amount only claims gains. Withdrawals that would leave total
    /// deposits below the pool minimum are rejected.
    pub fn withdraw(
        &mut self,
        depositor: AccountId,
        amount: u128,
        now: u64,
        fx: &mut Interactions,
    ) -> Result<DepositChange> {
        let initial = self.initial_deposit(&depositor);
        if initial == 0 {
            return Err(Error::InvalidParameter {
                name: "depositor".into(),
                reason: format!("{} has no deposit", depositor.short()),
            });
        }
        self.trigger_issuance(now)?;

        let gains = self.depositor_gains(&depositor)?;
        let compounded = self.compounded_deposit(&depositor);
        let to_withdraw = amount.min(compounded);

        if to_withdraw > 0 {
            let remaining = self.total_deposits.saturating_sub(to_withdraw);
            if remaining < self.params.min_pool_balance {
                return Err(Error::BelowMinimumPoolBalance {
                    remaining,
                    minimum: self.params.min_pool_balance,
                });
            }
        }

        let current = compounded - to_withdraw;
        self.pay_gains(depositor, &gains, fx)?;
        self.total_deposits = self.total_deposits.saturating_sub(to_withdraw);
        self.update_deposit(depositor, current, now);
        fx.transfer_debt(PoolId::StabilityPool, depositor, to_withdraw);

        debug!(depositor = %depositor.short(), to_withdraw, compounded, current, "Stability deposit withdrawn");
        Ok(DepositChange {
            depositor,
            previous: compounded,
            current,
            loss: initial.saturating_sub(compounded),
            gains,
        })
    }

    fn update_deposit(&mut self, depositor: AccountId, value: u128, now: u64) {
        if value == 0 {
            self.deposits.remove(&depositor);
            return;
        }
        let key = (self.current_epoch, self.current_scale);
        let snapshot = DepositSnapshot {
            p: self.p,
            s: self.epoch_scale_sum.get(&key).copied().unwrap_or_default(),
            g: self.epoch_scale_g.get(&key).copied().unwrap_or_default(),
            i: self.epoch_scale_i.get(&key).copied().unwrap_or_default(),
            scale: self.current_scale,
            epoch: self.current_epoch,
        };
        self.deposits.insert(
            depositor,
            Deposit {
                initial_value: value,
                snapshot,
                updated_at: now,
            },
        );
    }

    fn pay_gains(
        &mut self,
        depositor: AccountId,
        gains: &DepositorGains,
        fx: &mut Interactions,
    ) -> Result<()> {
        let collateral = gains.collateral.min(self.collateral);
        self.collateral -= collateral;
        fx.transfer_collateral(PoolId::StabilityPool, depositor, collateral);

        let interest = gains.interest.min(self.interest_balance);
        self.interest_balance -= interest;
        fx.transfer_debt(PoolId::StabilityPool, depositor, interest);

        if gains.incentive > 0 {
            let balance = self.incentive_balances.entry(depositor).or_insert(0);
            *balance = safe_add(*balance, gains.incentive)?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OFFSET
    // ═══════════════════════════════════════════════════════════════════════════

    /// Absorb as much of a liquidation as deposits allow.
    ///
    /// Burns the offset debt from the pool's tokens and queues the matching
    /// collateral transfer from `source`. Whatever exceeds total deposits is
    /// returned as residual for redistribution.
    pub fn offset(
        &mut self,
        debt: u128,
        collateral: u128,
        source: PoolId,
        now: u64,
        fx: &mut Interactions,
    ) -> Result<OffsetOutcome> {
        self.trigger_issuance(now)?;

        let total = self.total_deposits;
        if total == 0 || debt == 0 {
            return Ok(OffsetOutcome {
                debt_offset: 0,
                collateral_offset: 0,
                debt_residual: debt,
                collateral_residual: collateral,
            });
        }

        let debt_offset = debt.min(total);
        let collateral_offset = if debt_offset == debt {
            collateral
        } else {
            mul_div(collateral, debt_offset, debt)?
        };

        let (collateral_gain_per_unit, debt_loss_per_unit) =
            self.compute_rewards_per_unit_staked(collateral_offset, debt_offset, total)?;
        self.update_reward_sum_and_product(collateral_gain_per_unit, debt_loss_per_unit)?;

        self.total_deposits = total - debt_offset;
        self.collateral = safe_add(self.collateral, collateral_offset)?;
        self.total_offsets += 1;
        self.total_debt_offset = safe_add(self.total_debt_offset, debt_offset)?;
        self.total_collateral_gained = safe_add(self.total_collateral_gained, collateral_offset)?;

        fx.burn(PoolId::StabilityPool, debt_offset);
        fx.transfer_collateral(source, PoolId::StabilityPool, collateral_offset);

        debug!(
            debt_offset,
            collateral_offset,
            p = self.p,
            scale = self.current_scale,
            epoch = self.current_epoch,
            "Stability pool offset"
        );
        Ok(OffsetOutcome {
            debt_offset,
            collateral_offset,
            debt_residual: debt - debt_offset,
            collateral_residual: collateral - collateral_offset,
        })
    }

    fn compute_rewards_per_unit_staked(
        &mut self,
        collateral: u128,
        debt: u128,
        total: u128,
    ) -> Result<(u128, u128)> {
        let total_u = U256::from(total);

        let collateral_numerator =
            U256::from(collateral) * U256::from(WAD) + U256::from(self.last_collateral_error);
        let collateral_gain = collateral_numerator / total_u;
        self.last_collateral_error =
            narrow(collateral_numerator - collateral_gain * total_u, "collateral error")?;

        let debt_loss = if debt == total {
            self.last_debt_loss_error = 0;
            WAD
        } else {
            // Rounds the loss up so deposits are never overstated
            let numerator = U256::from(debt) * U256::from(WAD) - U256::from(self.last_debt_loss_error);
            let loss = numerator / total_u + U256::one();
            self.last_debt_loss_error = narrow(loss * total_u - numerator, "debt loss error")?;
            narrow(loss, "debt loss")?
        };

        Ok((narrow(collateral_gain, "collateral gain")?, debt_loss.min(WAD)))
    }

    fn update_reward_sum_and_product(
        &mut self,
        collateral_gain_per_unit: u128,
        debt_loss_per_unit: u128,
    ) -> Result<()> {
        let current_p = self.p;
        let new_product_factor = WAD - debt_loss_per_unit;

        let key = (self.current_epoch, self.current_scale);
        let marginal = U256::from(collateral_gain_per_unit) * U256::from(current_p);
        let sum = self.epoch_scale_sum.entry(key).or_default();
        *sum = sum.checked_add(marginal).ok_or(Error::Overflow {
            operation: "stability pool S".into(),
        })?;

        let new_p = if new_product_factor == 0 {
            self.current_epoch += 1;
            self.current_scale = 0;
            WAD
        } else {
            let scaled = mul_div(current_p, new_product_factor, WAD)?;
            if scaled < self.params.scale_factor {
                self.current_scale += 1;
                narrow(
                    U256::from(current_p) * U256::from(new_product_factor)
                        * U256::from(self.params.scale_factor)
                        / U256::from(WAD),
                    "P rescale",
                )?
            } else {
                scaled
            }
        };

        if new_p == 0 {
            return Err(Error::InvariantViolation("stability pool P reached zero".into()));
        }
        self.p = new_p;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTEREST & INCENTIVES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Credit `amount` of minted interest to depositors.
    ///
    /// Returns the amount taken; zero when the pool has no deposits.
    pub fn distribute_interest(&mut self, amount: u128) -> Result<u128> {
        if amount == 0 || self.total_deposits == 0 {
            return Ok(0);
        }
        let (per_unit, error) = per_unit_staked(amount, self.last_interest_error, self.total_deposits)?;
        self.last_interest_error = error;
        self.add_to_sum(SumKind::Interest, per_unit)?;
        self.interest_balance = safe_add(self.interest_balance, amount)?;
        self.total_interest_received = safe_add(self.total_interest_received, amount)?;
        Ok(amount)
    }

    /// Issue incentives for the time since the last issuance
    pub fn trigger_issuance(&mut self, now: u64) -> Result<u128> {
        if now <= self.last_issuance_time {
            return Ok(0);
        }
        let elapsed = u128::from(now - self.last_issuance_time);
        self.last_issuance_time = now;

        let issuance = self
            .params
            .incentive_issuance_per_second
            .checked_mul(elapsed)
            .ok_or(Error::Overflow {
                operation: "incentive issuance".into(),
            })?;
        // Issuance while the pool is empty is forfeited
        if issuance == 0 || self.total_deposits == 0 {
            return Ok(0);
        }

        let (per_unit, error) = per_unit_staked(issuance, self.last_g_error, self.total_deposits)?;
        self.last_g_error = error;
        self.add_to_sum(SumKind::Incentive, per_unit)?;
        self.total_incentives_issued = safe_add(self.total_incentives_issued, issuance)?;
        Ok(issuance)
    }

    fn add_to_sum(&mut self, kind: SumKind, per_unit: u128) -> Result<()> {
        let key = (self.current_epoch, self.current_scale);
        let marginal = U256::from(per_unit) * U256::from(self.p);
        let map = match kind {
            SumKind::Incentive => &mut self.epoch_scale_g,
            SumKind::Interest => &mut self.epoch_scale_i,
        };
        let sum = map.entry(key).or_default();
        *sum = sum.checked_add(marginal).ok_or(Error::Overflow {
            operation: "stability pool sum".into(),
        })?;
        Ok(())
    }

    /// Incentive tokens credited to a depositor
    pub fn claimable_incentives(&self, depositor: &AccountId) -> u128 {
        self.incentive_balances.get(depositor).copied().unwrap_or(0)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSITOR READS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit record
    pub fn deposit(&self, depositor: &AccountId) -> Option<&Deposit> {
        self.deposits.get(depositor)
    }

    /// Value recorded at the depositor's last change
    pub fn initial_deposit(&self, depositor: &AccountId) -> u128 {
        self.deposits
            .get(depositor)
            .map(|d| d.initial_value)
            .unwrap_or(0)
    }

    /// Current value of a deposit after absorbed losses
    pub fn compounded_deposit(&self, depositor: &AccountId) -> u128 {
        let deposit = match self.deposits.get(depositor) {
            Some(d) => d,
            None => return 0,
        };
        let snapshot = &deposit.snapshot;
        if snapshot.epoch < self.current_epoch || snapshot.p == 0 {
            return 0;
        }

        let initial = U256::from(deposit.initial_value);
        let compounded = match self.current_scale.saturating_sub(snapshot.scale) {
            0 => initial * U256::from(self.p) / U256::from(snapshot.p),
            1 => {
                initial * U256::from(self.p)
                    / U256::from(snapshot.p)
                    / U256::from(self.params.scale_factor)
            }
            _ => U256::zero(),
        };

        // Below dust the remainder is rounding noise
        if compounded < initial / U256::from(self.params.dust_divisor) {
            return 0;
        }
        let compounded = compounded.min(initial);
        compounded.low_u128()
    }

    /// Collateral gain since the depositor's last change
    pub fn collateral_gain(&self, depositor: &AccountId) -> Result<u128> {
        match self.deposits.get(depositor) {
            Some(d) => self.gain_from_snapshots(d, &self.epoch_scale_sum, d.snapshot.s),
            None => Ok(0),
        }
    }

    /// Interest gain since the depositor's last change
    pub fn interest_gain(&self, depositor: &AccountId) -> Result<u128> {
        match self.deposits.get(depositor) {
            Some(d) => self.gain_from_snapshots(d, &self.epoch_scale_i, d.snapshot.i),
            None => Ok(0),
        }
    }

    /// Incentive gain since the depositor's last change
    pub fn incentive_gain(&self, depositor: &AccountId) -> Result<u128> {
        match self.deposits.get(depositor) {
            Some(d) => self.gain_from_snapshots(d, &self.epoch_scale_g, d.snapshot.g),
            None => Ok(0),
        }
    }

    /// All pending gains of a depositor
    pub fn depositor_gains(&self, depositor: &AccountId) -> Result<DepositorGains> {
        Ok(DepositorGains {
            collateral: self.collateral_gain(depositor)?,
            interest: self.interest_gain(depositor)?,
            incentive: self.incentive_gain(depositor)?,
        })
    }

    /// `initial * (sum[e][s] - snap + sum[e][s+1] / scale_factor) / P_snap`
    fn gain_from_snapshots(
        &self,
        deposit: &Deposit,
        sums: &HashMap<(u64, u64), U256>,
        snapshot_sum: U256,
    ) -> Result<u128> {
        let snapshot = &deposit.snapshot;
        if deposit.initial_value == 0 || snapshot.p == 0 {
            return Ok(0);
        }
        let first = sums
            .get(&(snapshot.epoch, snapshot.scale))
            .copied()
            .unwrap_or_default()
            .saturating_sub(snapshot_sum);
        let second = sums
            .get(&(snapshot.epoch, snapshot.scale + 1))
            .copied()
            .unwrap_or_default()
            / U256::from(self.params.scale_factor);

        let portion = first.checked_add(second).ok_or(Error::Overflow {
            operation: "depositor gain".into(),
        })?;
        let gain = U256::from(deposit.initial_value)
            .checked_mul(portion)
            .ok_or(Error::Overflow {
                operation: "depositor gain".into(),
            })?
            / U256::from(snapshot.p)
            / U256::from(WAD);
        narrow(gain, "depositor gain")
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Debt tokens deposited
    pub fn total_deposits(&self) -> u128 {
        self.total_deposits
    }

    /// Collateral held for depositors
    pub fn collateral(&self) -> u128 {
        self.collateral
    }

    /// Interest held for depositors
    pub fn interest_balance(&self) -> u128 {
        self.interest_balance
    }

    /// Current product factor
    pub fn p(&self) -> u128 {
        self.p
    }

    /// Current scale
    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    /// Current epoch
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    /// Collateral sum at an epoch and scale
    pub fn epoch_scale_sum(&self, epoch: u64, scale: u64) -> U256 {
        self.epoch_scale_sum
            .get(&(epoch, scale))
            .copied()
            .unwrap_or_default()
    }

    /// Incentive sum at an epoch and scale
    pub fn epoch_scale_g(&self, epoch: u64, scale: u64) -> U256 {
        self.epoch_scale_g
            .get(&(epoch, scale))
            .copied()
            .unwrap_or_default()
    }

    /// Number of depositors
    pub fn depositor_count(&self) -> usize {
        self.deposits.len()
    }

    /// Check if the pool can absorb `debt` entirely
    pub fn can_absorb(&self, debt: u128) -> bool {
        self.total_deposits >= debt
    }

    /// Pool parameters
    pub fn params(&self) -> &StabilityPoolParams {
        &self.params
    }

    /// Get pool statistics
    pub fn statistics(&self) -> StabilityPoolStats {
        StabilityPoolStats {
            total_deposits: self.total_deposits,
            collateral: self.collateral,
            interest_balance: self.interest_balance,
            depositor_count: self.deposits.len() as u64,
            total_offsets: self.total_offsets,
            total_debt_offset: self.total_debt_offset,
            total_collateral_gained: self.total_collateral_gained,
            total_interest_received: self.total_interest_received,
            total_incentives_issued: self.total_incentives_issued,
            p: self.p,
            current_epoch: self.current_epoch,
            current_scale: self.current_scale,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Compute state hash over the global accumulators
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.total_deposits.to_be_bytes());
        data.extend_from_slice(&self.collateral.to_be_bytes());
        data.extend_from_slice(&self.interest_balance.to_be_bytes());
        data.extend_from_slice(&self.p.to_be_bytes());
        data.extend_from_slice(&self.current_epoch.to_be_bytes());
        data.extend_from_slice(&self.current_scale.to_be_bytes());
        let mut sum = [0u8; 32];
        self.epoch_scale_sum(self.current_epoch, self.current_scale)
            .to_big_endian(&mut sum);
        data.extend_from_slice(&sum);

        let mut depositors: Vec<_> = self.deposits.iter().collect();
        depositors.sort_by_key(|(account, _)| **account);
        for (account, deposit) in depositors {
            data.extend_from_slice(account.as_bytes());
            data.extend_from_slice(&bincode::serialize(deposit).unwrap_or_default());
        }
        Hash::sha256(&data)
    }
}

enum SumKind {
    Incentive,
    Interest,
}

/// `(amount * WAD + error) / total`, returning the new remainder too
fn per_unit_staked(amount: u128, error: u128, total: u128) -> Result<(u128, u128)> {
    let numerator = U256::from(amount) * U256::from(WAD) + U256::from(error);
    let total = U256::from(total);
    let per_unit = numerator / total;
    let remainder = numerator - per_unit * total;
    Ok((narrow(per_unit, "per unit staked")?, narrow(remainder, "per unit error")?))
}

/// Stability pool statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityPoolStats {
    pub total_deposits: u128,
    pub collateral: u128,
    pub interest_balance: u128,
    pub depositor_count: u64,
    pub total_offsets: u64,
    pub total_debt_offset: u128,
    pub total_collateral_gained: u128,
    pub total_interest_received: u128,
    pub total_incentives_issued: u128,
    pub p: u128,
    pub current_epoch: u64,
    pub current_scale: u64,
}

impl StabilityPoolStats {
    /// Fraction of deposits lost per offset so far, as P's distance from one
    pub fn depletion(&self) -> Result<u128> {
        safe_sub(WAD, self.p.min(WAD))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::units;

    fn alice() -> AccountId {
        AccountId::from_label("alice")
    }

    fn bob() -> AccountId {
        AccountId::from_label("bob")
    }

    fn pool() -> StabilityPool {
        StabilityPool::new(StabilityPoolParams::default(), 0)
    }

    #[test]
    fn test_provide() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        let change = sp.provide(alice(), units(1000), 1, &mut fx).unwrap();

        assert_eq!(change.current, units(1000));
        assert_eq!(sp.total_deposits(), units(1000));
        assert_eq!(sp.depositor_count(), 1);
        assert_eq!(fx.len(), 1);
        assert!(matches!(
            sp.provide(alice(), 0, 1, &mut fx),
            Err(Error::ZeroAmount)
        ));
    }

    #[test]
    fn test_withdraw() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        sp.provide(alice(), units(1000), 1, &mut fx).unwrap();

        let change = sp.withdraw(alice(), units(500), 2, &mut fx).unwrap();
        assert_eq!(change.current, units(500));
        assert_eq!(sp.total_deposits(), units(500));
        assert_eq!(sp.compounded_deposit(&alice()), units(500));
    }

    #[test]
    fn test_withdraw_respects_minimum() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        sp.provide(alice(), units(10), 1, &mut fx).unwrap();

        let result = sp.withdraw(alice(), units(10), 2, &mut fx);
        assert!(matches!(result, Err(Error::BelowMinimumPoolBalance { .. })));

        // Leaving exactly the minimum is fine
        sp.withdraw(alice(), units(9), 2, &mut fx).unwrap();
        assert_eq!(sp.total_deposits(), units(1));
    }

    #[test]
    fn test_withdraw_without_deposit() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        assert!(sp.withdraw(bob(), units(1), 1, &mut fx).is_err());
    }

    #[test]
    fn test_partial_offset() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        sp.provide(alice(), units(1000), 1, &mut fx).unwrap();

        let outcome = sp
            .offset(units(100), units(1), PoolId::Active, 2, &mut fx)
            .unwrap();
        assert_eq!(outcome.debt_offset, units(100));
        assert_eq!(outcome.debt_residual, 0);
        assert_eq!(sp.total_deposits(), units(900));

        let compounded = sp.compounded_deposit(&alice());
        assert!(compounded <= units(900));
        assert!(units(900) - compounded < 1_000_000);

        let gain = sp.collateral_gain(&alice()).unwrap();
        assert!(gain <= units(1));
        assert!(units(1) - gain < 1_000);
    }

    #[test]
    fn test_offset_beyond_deposits_leaves_residual() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        sp.provide(alice(), units(100), 1, &mut fx).unwrap();

        let outcome = sp
            .offset(units(200), units(2), PoolId::Active, 2, &mut fx)
            .unwrap();
        assert_eq!(outcome.debt_offset, units(100));
        assert_eq!(outcome.collateral_offset, units(1));
        assert_eq!(outcome.debt_residual, units(100));
        assert_eq!(outcome.collateral_residual, units(1));
    }

    #[test]
    fn test_offset_on_empty_pool() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        let outcome = sp
            .offset(units(10), units(1), PoolId::Active, 2, &mut fx)
            .unwrap();
        assert_eq!(outcome.debt_residual, units(10));
        assert!(fx.is_empty());
    }

    #[test]
    fn test_full_depletion_starts_new_epoch() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        sp.provide(alice(), units(1000), 1, &mut fx).unwrap();

        sp.offset(units(1000), units(5), PoolId::Active, 2, &mut fx)
            .unwrap();
        assert_eq!(sp.current_epoch(), 1);
        assert_eq!(sp.current_scale(), 0);
        assert_eq!(sp.p(), WAD);
        assert_eq!(sp.total_deposits(), 0);
        assert_eq!(sp.compounded_deposit(&alice()), 0);
        assert_eq!(sp.collateral_gain(&alice()).unwrap(), units(5));

        // A fresh deposit in the new epoch is unaffected
        sp.provide(bob(), units(10), 3, &mut fx).unwrap();
        assert_eq!(sp.compounded_deposit(&bob()), units(10));
        assert_eq!(sp.collateral_gain(&bob()).unwrap(), 0);
    }

    #[test]
    fn test_scale_change() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        sp.provide(alice(), units(1000), 1, &mut fx).unwrap();

        // Leave a tiny fraction so P * factor drops below 1e9
        let debt = units(1000) - 1_000_000_000;
        sp.offset(debt, units(1), PoolId::Active, 2, &mut fx).unwrap();
        assert_eq!(sp.current_scale(), 1);
        assert_eq!(sp.current_epoch(), 0);
        assert!(sp.p() >= sp.params().scale_factor);

        // Gain is still fully attributed across the scale boundary
        let gain = sp.collateral_gain(&alice()).unwrap();
        assert!(units(1) - gain < 1_000);
    }

    #[test]
    fn test_gains_split_between_depositors() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        sp.provide(alice(), units(1000), 1, &mut fx).unwrap();
        sp.provide(bob(), units(1000), 1, &mut fx).unwrap();

        sp.offset(units(200), units(2), PoolId::Active, 2, &mut fx)
            .unwrap();
        let a = sp.collateral_gain(&alice()).unwrap();
        let b = sp.collateral_gain(&bob()).unwrap();
        assert_eq!(a, b);
        assert!(units(1) - a < 1_000);
    }

    #[test]
    fn test_provide_pays_out_gains() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        sp.provide(alice(), units(1000), 1, &mut fx).unwrap();
        sp.offset(units(100), units(1), PoolId::Active, 2, &mut fx)
            .unwrap();

        let change = sp.withdraw(alice(), 0, 3, &mut fx).unwrap();
        assert!(change.gains.collateral > 0);
        assert!(change.loss > 0);
        assert_eq!(sp.collateral_gain(&alice()).unwrap(), 0);
        assert_eq!(sp.collateral(), units(1) - change.gains.collateral);
    }

    #[test]
    fn test_interest_distribution() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        assert_eq!(sp.distribute_interest(units(5)).unwrap(), 0);

        sp.provide(alice(), units(300), 1, &mut fx).unwrap();
        sp.provide(bob(), units(100), 1, &mut fx).unwrap();
        assert_eq!(sp.distribute_interest(units(4)).unwrap(), units(4));

        assert_eq!(sp.interest_gain(&alice()).unwrap(), units(3));
        assert_eq!(sp.interest_gain(&bob()).unwrap(), units(1));
    }

    #[test]
    fn test_incentive_issuance() {
        let params = StabilityPoolParams {
            incentive_issuance_per_second: 10,
            ..Default::default()
        };
        let mut sp = StabilityPool::new(params, 0);
        let mut fx = Interactions::new();

        // Nobody deposited: forfeited
        sp.provide(alice(), units(1), 100, &mut fx).unwrap();
        assert_eq!(sp.statistics().total_incentives_issued, 0);

        assert_eq!(sp.trigger_issuance(200).unwrap(), 1_000);
        assert_eq!(sp.incentive_gain(&alice()).unwrap(), 1_000);
        assert_eq!(sp.trigger_issuance(200).unwrap(), 0);

        sp.provide(alice(), units(1), 200, &mut fx).unwrap();
        assert_eq!(sp.claimable_incentives(&alice()), 1_000);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut sp = pool();
        let mut fx = Interactions::new();
        sp.provide(alice(), units(1000), 1, &mut fx).unwrap();
        sp.offset(units(10), units(1), PoolId::Active, 2, &mut fx)
            .unwrap();

        let restored = StabilityPool::from_bytes(&sp.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.state_hash(), sp.state_hash());
        assert_eq!(restored.compounded_deposit(&alice()), sp.compounded_deposit(&alice()));
    }
}
