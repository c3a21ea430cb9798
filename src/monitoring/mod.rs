//! Monitoring for the ledger.
//!
//! - **Health**: invariant checks over a committed ledger state
//! - **Tracing**: subscriber setup for the engine's `tracing` output

pub mod health;

pub use health::{
    assert_healthy, check_invariants, debt_tolerance, CheckResult, HealthReport, HealthStatus,
    InvariantCheck,
};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::info!("tracing initialized twice");
    }
}
