//! Protocol module - ledger state and orchestration.
//!
//! This module provides the ledger state, the operations and events around
//! it, and the state machine that applies operations atomically.

pub mod events;
pub mod operations;
pub mod positions;
pub mod state;
pub mod state_machine;

pub use events::{
    EventLog, ParUpdatedEvent, PositionUpdate, ProtocolEvent, StabilityDepositEvent,
    SurplusClaimedEvent,
};
pub use operations::{CallContext, OperationResult, ProtocolOperation};
pub use positions::{claim_surplus, close_trove, open_trove, OpenTroveRequest};
pub use state::{LedgerState, ProtocolStats};
pub use state_machine::ProtocolStateMachine;
