//! Ledger state.
//!
//! Everything the engine mutates lives in one explicitly threaded value:
//! positions, pools, the stability pool, rate and fee state and the two
//! token ledgers. Engines take `&mut LedgerState`; the coordinator owns the
//! only instance and checkpoints it around each call.

use serde::{Deserialize, Serialize};

use crate::core::accrual::{drip, DripRecord, PricingContext, RateState};
use crate::core::collateral::CollateralLedger;
use crate::core::config::ProtocolConfig;
use crate::core::fees::RedemptionFeeState;
use crate::core::interactions::Interactions;
use crate::core::pools::Pools;
use crate::core::registry::TroveRegistry;
use crate::core::token::DebtToken;
use crate::error::{Error, Result};
use crate::liquidation::recovery::{self, RecoveryModeStatus};
use crate::liquidation::stability_pool::StabilityPool;
use crate::protocol::events::{EventLog, ProtocolEvent};
use crate::utils::crypto::Hash;

// ═══════════════════════════════════════════════════════════════════════════════
// STATISTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Running totals across the ledger's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    /// Positions opened
    pub troves_opened: u64,
    /// Positions closed by their owners
    pub troves_closed: u64,
    /// Positions liquidated
    pub troves_liquidated: u64,
    /// Positions fully redeemed
    pub troves_redeemed: u64,
    /// Successful liquidation calls
    pub liquidation_calls: u64,
    /// Successful redemption calls
    pub redemption_calls: u64,
    /// Debt closed by liquidation
    pub total_debt_liquidated: u128,
    /// Collateral seized by liquidation, gas compensation included
    pub total_collateral_liquidated: u128,
    /// Collateral paid to liquidators
    pub total_gas_compensation: u128,
    /// Debt absorbed by the stability pool
    pub total_debt_offset: u128,
    /// Debt spread over remaining positions
    pub total_debt_redistributed: u128,
    /// Interest minted by drips
    pub total_interest_minted: u128,
    /// Surplus collateral paid out to former owners
    pub total_surplus_claimed: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    /// Configuration in force
    pub config: ProtocolConfig,
    /// Positions and per-cohort indices
    pub troves: TroveRegistry,
    /// Active, shielded, default and surplus pools
    pub pools: Pools,
    /// Stability pool
    pub stability_pool: StabilityPool,
    /// Par and cohort rates
    pub rates: RateState,
    /// Redemption base rate
    pub fees: RedemptionFeeState,
    /// Debt token balances
    pub debt_token: DebtToken,
    /// Collateral balances
    pub collateral: CollateralLedger,
    /// Committed events
    pub events: EventLog,
    /// Running totals
    pub stats: ProtocolStats,
    genesis: u64,
}

impl LedgerState {
    /// Empty ledger starting at `genesis`
    pub fn new(config: ProtocolConfig, genesis: u64) -> Self {
        Self {
            troves: TroveRegistry::new(),
            pools: Pools::new(),
            stability_pool: StabilityPool::new(config.stability_pool.clone(), genesis),
            rates: RateState::new(&config.rates, genesis),
            fees: RedemptionFeeState::new(genesis),
            debt_token: DebtToken::new(),
            collateral: CollateralLedger::new(),
            events: EventLog::new(),
            stats: ProtocolStats::default(),
            config,
            genesis,
        }
    }

    /// Timestamp the ledger was created at
    pub fn genesis(&self) -> u64 {
        self.genesis
    }

    /// Price context at the current par and accumulators
    pub fn pricing(&self, price: u128) -> PricingContext {
        self.rates.pricing(price)
    }

    /// Force interest accrual up to `now`, logging the drip if it minted
    pub fn accrue(&mut self, now: u64, fx: &mut Interactions) -> Result<Option<DripRecord>> {
        let record = drip(self, now, fx)?;
        if let Some(record) = record {
            self.stats.total_interest_minted = self
                .stats
                .total_interest_minted
                .saturating_add(record.total_interest());
            self.events.push(ProtocolEvent::Drip(record));
        }
        Ok(record)
    }

    /// Total collateralization ratio at `price`
    pub fn tcr(&self, price: u128) -> u128 {
        recovery::calculate_tcr(&self.pools, price, self.rates.par())
    }

    /// Recovery mode metrics at `price`
    pub fn recovery_status(&self, price: u128) -> RecoveryModeStatus {
        recovery::status(&self.pools, &self.config.params, price, self.rates.par())
    }

    /// Check if the system is in recovery mode at `price`
    pub fn is_recovery_mode(&self, price: u128) -> bool {
        recovery::is_recovery_mode(self.tcr(price), &self.config.params)
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

    /// Hash of the accounting state.
    ///
    /// Map-backed components contribute their own sorted hashes so equal
    /// states hash equally regardless of insertion history.
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(self.troves.state_hash().as_bytes());
        data.extend_from_slice(self.stability_pool.state_hash().as_bytes());
        data.extend_from_slice(self.debt_token.state_hash().as_bytes());
        data.extend_from_slice(self.collateral.state_hash().as_bytes());

        for pool in [&self.pools.active, &self.pools.shielded_active, &self.pools.default] {
            data.extend_from_slice(&pool.collateral().to_be_bytes());
            data.extend_from_slice(&pool.debt().to_be_bytes());
        }
        data.extend_from_slice(&bincode::serialize(&self.pools.surplus.claims()).unwrap_or_default());
        data.extend_from_slice(&bincode::serialize(&self.rates).unwrap_or_default());
        data.extend_from_slice(&bincode::serialize(&self.fees).unwrap_or_default());
        Hash::sha256(&data)
    }
}
