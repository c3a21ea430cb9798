//! Protocol events.
//!
//! Every state transition that commits appends one or more events to the
//! ledger's log. Events carry full records so clients can rebuild positions
//! and pool balances without re-reading state.

use serde::{Deserialize, Serialize};

use crate::core::accrual::{DripRecord, ParUpdate};
use crate::core::trove::{Cohort, TroveOperation};
use crate::liquidation::engine::LiquidationRecord;
use crate::liquidation::stability_pool::DepositChange;
use crate::redemption::engine::RedemptionRecord;
use crate::utils::crypto::{merkle_root, AccountId, Hash, TroveId};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Position Events
    /// A position was opened, resized, closed or had rewards applied
    PositionUpdated(PositionUpdate),

    // Liquidation Events
    /// A liquidation call completed
    Liquidation(LiquidationRecord),

    // Redemption Events
    /// Debt tokens were redeemed for collateral
    Redemption(RedemptionRecord),

    // Stability Pool Events
    /// Deposit to the stability pool
    StabilityDeposit(StabilityDepositEvent),
    /// Withdrawal or gain claim from the stability pool
    StabilityWithdrawal(StabilityDepositEvent),

    // Accrual Events
    /// Interest was minted
    Drip(DripRecord),
    /// Par moved
    ParUpdated(ParUpdatedEvent),

    // Surplus Events
    /// A closed position's owner collected their surplus
    SurplusClaimed(SurplusClaimedEvent),
}

impl ProtocolEvent {
    /// Get event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            ProtocolEvent::PositionUpdated(_) => "PositionUpdated",
            ProtocolEvent::Liquidation(_) => "Liquidation",
            ProtocolEvent::Redemption(_) => "Redemption",
            ProtocolEvent::StabilityDeposit(_) => "StabilityDeposit",
            ProtocolEvent::StabilityWithdrawal(_) => "StabilityWithdrawal",
            ProtocolEvent::Drip(_) => "Drip",
            ProtocolEvent::ParUpdated(_) => "ParUpdated",
            ProtocolEvent::SurplusClaimed(_) => "SurplusClaimed",
        }
    }

    /// Get event timestamp
    pub fn timestamp(&self) -> u64 {
        match self {
            ProtocolEvent::PositionUpdated(e) => e.timestamp,
            ProtocolEvent::Liquidation(e) => e.timestamp,
            ProtocolEvent::Redemption(e) => e.timestamp,
            ProtocolEvent::StabilityDeposit(e) => e.timestamp,
            ProtocolEvent::StabilityWithdrawal(e) => e.timestamp,
            ProtocolEvent::Drip(e) => e.timestamp,
            ProtocolEvent::ParUpdated(e) => e.timestamp,
            ProtocolEvent::SurplusClaimed(e) => e.timestamp,
        }
    }

    /// Compute hash of the event
    pub fn hash(&self) -> Hash {
        let bytes = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&bytes)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════════

/// Position state after an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// Time of the operation
    pub timestamp: u64,
    /// Position
    pub trove_id: TroveId,
    /// Owner
    pub owner: AccountId,
    /// Cohort
    pub cohort: Cohort,
    /// Actual debt after the operation
    pub debt: u128,
    /// Collateral after the operation
    pub collateral: u128,
    /// Stake after the operation
    pub stake: u128,
    /// What happened
    pub operation: TroveOperation,
}

/// Stability pool deposit change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityDepositEvent {
    /// Time of the change
    pub timestamp: u64,
    /// Deposit before and after, with gains paid
    pub change: DepositChange,
}

/// Par controller step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParUpdatedEvent {
    /// Time of the update
    pub timestamp: u64,
    /// Old and new par
    pub update: ParUpdate,
}

/// Surplus collateral paid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusClaimedEvent {
    /// Time of the claim
    pub timestamp: u64,
    /// Claimant
    pub owner: AccountId,
    /// Collateral paid
    pub amount: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only event log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Drop events past the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Most recent event
    pub fn last(&self) -> Option<&ProtocolEvent> {
        self.events.last()
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Events at or after `timestamp`
    pub fn since(&self, timestamp: u64) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.timestamp() >= timestamp)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Merge another event log into this one
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Merkle root of all event hashes
    pub fn merkle_root(&self) -> Hash {
        let hashes: Vec<Hash> = self.events.iter().map(|e| e.hash()).collect();
        merkle_root(&hashes)
    }
}
