//! Integration tests for the CDP engine.
//!
//! These tests drive the state machine through complete protocol flows and
//! check the ledger invariants after every step.

use cdp_engine::core::collateral::CollateralAmount;
use cdp_engine::core::config::ProtocolConfig;
use cdp_engine::core::sorted_troves::InsertHint;
use cdp_engine::core::trove::{Cohort, TroveStatus};
use cdp_engine::error::Error;
use cdp_engine::liquidation::engine::LiquidationMode;
use cdp_engine::monitoring::check_invariants;
use cdp_engine::oracle::PriceFeed;
use cdp_engine::protocol::{
    CallContext, LedgerState, OpenTroveRequest, OperationResult, ProtocolOperation,
    ProtocolStateMachine,
};
use cdp_engine::redemption::RedemptionRequest;
use cdp_engine::utils::constants::WAD;
use cdp_engine::utils::crypto::{AccountId, TroveId};
use cdp_engine::utils::math::units;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

type Machine = ProtocolStateMachine<PriceFeed>;

fn account(label: &str) -> AccountId {
    AccountId::from_label(label)
}

fn machine_at(price: u128) -> Machine {
    machine_with(ProtocolConfig::default(), price)
}

fn machine_with(config: ProtocolConfig, price: u128) -> Machine {
    ProtocolStateMachine::new(config, PriceFeed::new(price).unwrap(), 0).unwrap()
}

fn open(sm: &mut Machine, label: &str, cohort: Cohort, collateral: u128, debt: u128) -> TroveId {
    let owner = account(label);
    sm.deposit_collateral(owner, collateral).unwrap();
    sm.open_trove(
        CallContext::new(owner, 0),
        OpenTroveRequest {
            owner,
            cohort,
            collateral,
            debt,
            hint: InsertHint::none(),
        },
    )
    .unwrap()
    .trove_id
}

fn set_price(sm: &mut Machine, price: u128) {
    sm.oracle_mut().set_price(price).unwrap();
}

fn assert_healthy(sm: &Machine) {
    let report = sm.check_health();
    assert!(report.is_healthy(), "violations: {:?}", report.violations());
}

fn entire(sm: &Machine, id: &TroveId, cohort: Cohort) -> (u128, u128) {
    let entire = sm
        .state()
        .troves
        .entire_debt_and_coll(id, sm.state().rates.accumulated(cohort))
        .unwrap();
    (entire.debt, entire.collateral)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_redistribution_with_empty_pool() {
    let mut sm = machine_at(200 * WAD);
    let keeper = account("keeper");

    let a = open(&mut sm, "alice", Cohort::Standard, units(2), units(100));
    let b = open(&mut sm, "bob", Cohort::Standard, units(1) + WAD / 20, units(100));
    assert_healthy(&sm);

    // Halving the price leaves alice at 200% and bob at 105%
    set_price(&mut sm, 100 * WAD);
    assert!(!sm.is_recovery_mode().unwrap());

    let record = sm
        .liquidate(CallContext::new(keeper, 60), LiquidationMode::Single(b))
        .unwrap();
    assert_eq!(record.liquidated_count(), 1);
    assert_eq!(record.total_debt_offset, 0);
    assert_eq!(record.total_debt_redistributed, units(100));

    let gas = (units(1) + WAD / 20) / 200;
    assert_eq!(sm.collateral_of(&keeper), gas);
    assert_eq!(sm.state().troves.status(&b), TroveStatus::ClosedByLiquidation);

    // Alice inherits bob's debt and all of his collateral after gas compensation
    let (debt, collateral) = entire(&sm, &a, Cohort::Standard);
    assert!(debt.abs_diff(units(200)) <= 1);
    assert!(collateral.abs_diff(units(2) + (units(1) + WAD / 20) - gas) <= 1);
    assert_healthy(&sm);
}

#[test]
fn test_stability_pool_full_depletion() {
    let mut sm = machine_at(200 * WAD);
    let whale = account("whale");
    let keeper = account("keeper");

    open(&mut sm, "whale", Cohort::Standard, units(100), units(1000));
    let victim = open(&mut sm, "victim", Cohort::Standard, units(6), units(1000));
    sm.provide_to_stability_pool(CallContext::new(whale, 0), units(1000))
        .unwrap();

    // Victim drops to 102%, under the penalty floor
    set_price(&mut sm, 170 * WAD);
    let record = sm
        .liquidate(CallContext::new(keeper, 60), LiquidationMode::Single(victim))
        .unwrap();
    assert_eq!(record.total_debt_offset, units(1000));
    assert_eq!(record.total_debt_redistributed, 0);
    let seized = record.total_collateral_to_stability_pool;
    assert_eq!(seized, units(6) - units(6) / 200);

    let pool = &sm.state().stability_pool;
    assert_eq!(pool.total_deposits(), 0);
    assert_eq!(pool.current_epoch(), 1);
    assert_eq!(pool.current_scale(), 0);
    assert_eq!(pool.p(), WAD);
    assert_eq!(pool.compounded_deposit(&whale), 0);
    assert_eq!(pool.collateral_gain(&whale).unwrap(), seized);
    assert_healthy(&sm);

    // Claiming pays the whole gain and removes the emptied deposit
    let change = sm
        .withdraw_from_stability_pool(CallContext::new(whale, 120), 0)
        .unwrap();
    assert_eq!(change.previous, 0);
    assert_eq!(change.loss, units(1000));
    assert_eq!(change.gains.collateral, seized);
    assert_eq!(sm.collateral_of(&whale), seized);
    assert!(sm.state().stability_pool.deposit(&whale).is_none());

    // A deposit in the new epoch starts whole
    let carol = account("carol");
    open(&mut sm, "carol", Cohort::Standard, units(10), units(500));
    sm.provide_to_stability_pool(CallContext::new(carol, 180), units(200))
        .unwrap();
    assert_eq!(
        sm.state().stability_pool.compounded_deposit(&carol),
        units(200)
    );
    assert_healthy(&sm);
}

#[test]
fn test_sequence_liquidation_across_cohorts() {
    let mut sm = machine_at(200 * WAD);
    let whale = account("whale");
    let keeper = account("keeper");

    let whale_trove = open(&mut sm, "whale", Cohort::Standard, units(20), units(500));
    let standard = open(&mut sm, "sam", Cohort::Standard, units(1) + WAD / 5, units(100));
    let shielded = open(&mut sm, "shay", Cohort::Shielded, units(1) + WAD / 2, units(100));
    sm.provide_to_stability_pool(CallContext::new(whale, 0), units(500))
        .unwrap();

    // Standard at 86.4%, shielded at 108%, whale at 288%
    set_price(&mut sm, 72 * WAD);
    let liquidatable = sm.liquidatable_troves().unwrap();
    assert_eq!(liquidatable.len(), 2);

    let record = sm
        .liquidate(CallContext::new(keeper, 60), LiquidationMode::Sequence(10))
        .unwrap();
    assert_eq!(record.liquidated_count(), 2);
    assert_eq!(record.liquidated[0].trove_id, standard);
    assert_eq!(record.liquidated[1].trove_id, shielded);
    assert_eq!(record.liquidated[1].cohort, Cohort::Shielded);
    assert_eq!(record.total_debt_offset, units(200));
    assert!(sm.state().troves.active(&whale_trove).is_ok());

    let compounded = sm.state().stability_pool.compounded_deposit(&whale);
    assert!(compounded <= units(300));
    assert!(units(300) - compounded < 1_000_000);
    assert_healthy(&sm);

    // Nothing left below MCR
    let result = sm.liquidate(CallContext::new(keeper, 120), LiquidationMode::Sequence(10));
    assert!(matches!(result, Err(Error::NothingToLiquidate)));
    assert_eq!(sm.rolled_back(), 1);
}

#[test]
fn test_batch_skips_ineligible_positions() {
    let mut sm = machine_at(200 * WAD);
    let keeper = account("keeper");

    let healthy = open(&mut sm, "alice", Cohort::Standard, units(4), units(100));
    let risky = open(&mut sm, "bob", Cohort::Standard, units(1) + WAD / 5, units(100));
    set_price(&mut sm, 90 * WAD);

    let record = sm
        .liquidate(
            CallContext::new(keeper, 60),
            LiquidationMode::Batch(vec![healthy, risky]),
        )
        .unwrap();
    assert_eq!(record.liquidated_count(), 1);
    assert_eq!(record.liquidated[0].trove_id, risky);
    assert_eq!(record.skipped, vec![healthy]);
    assert_healthy(&sm);
}

/// Shielded whale plus two standard positions: a at 112%, b at 104% once the
/// price reaches 100. Redistributing b lands entirely on a.
fn machine_with_fragile_neighbour() -> (Machine, TroveId, TroveId) {
    let mut sm = machine_at(200 * WAD);
    open(&mut sm, "whale", Cohort::Shielded, units(100), units(1000));
    let a = open(&mut sm, "alice", Cohort::Standard, units(1) + 12 * WAD / 100, units(100));
    let b = open(&mut sm, "bob", Cohort::Standard, units(10) + 2 * WAD / 5, units(1000));
    set_price(&mut sm, 100 * WAD);
    assert!(!sm.is_recovery_mode().unwrap());
    (sm, a, b)
}

#[test]
fn test_batch_eligibility_fixed_at_call_time() {
    let (mut sm, a, b) = machine_with_fragile_neighbour();
    let keeper = account("keeper");

    let record = sm
        .liquidate(CallContext::new(keeper, 60), LiquidationMode::Batch(vec![b, a]))
        .unwrap();
    assert_eq!(record.liquidated_count(), 1);
    assert_eq!(record.liquidated[0].trove_id, b);
    assert_eq!(record.skipped, vec![a]);

    // Alice absorbed bob's debt and is now below MCR, but was healthy when the call began
    let (debt, _) = entire(&sm, &a, Cohort::Standard);
    assert!(debt.abs_diff(units(1100)) <= 1);
    assert!(sm.liquidatable_troves().unwrap().contains(&a));
    assert_healthy(&sm);

    // A later call may take her
    let record = sm
        .liquidate(CallContext::new(keeper, 120), LiquidationMode::Single(a))
        .unwrap();
    assert_eq!(record.liquidated[0].trove_id, a);
}

#[test]
fn test_sequence_eligibility_fixed_at_call_time() {
    let (mut sm, a, b) = machine_with_fragile_neighbour();

    let record = sm
        .liquidate(CallContext::new(account("keeper"), 60), LiquidationMode::Sequence(10))
        .unwrap();
    assert_eq!(record.liquidated_count(), 1);
    assert_eq!(record.liquidated[0].trove_id, b);
    assert!(sm.state().troves.active(&a).is_ok());
    assert_healthy(&sm);
}

#[test]
fn test_recovery_mode_capped_liquidation_and_surplus() {
    let mut sm = machine_at(200 * WAD);
    let whale = account("whale");
    let bob = account("bob");
    let keeper = account("keeper");

    open(&mut sm, "whale", Cohort::Standard, units(14), units(1000));
    let trove = open(&mut sm, "bob", Cohort::Standard, units(2) + 2 * WAD / 5, units(200));
    sm.provide_to_stability_pool(CallContext::new(whale, 0), units(500))
        .unwrap();

    // TCR 136.7%, bob at 120%
    set_price(&mut sm, 100 * WAD);
    assert!(sm.is_recovery_mode().unwrap());

    let record = sm
        .liquidate(CallContext::new(keeper, 60), LiquidationMode::Single(trove))
        .unwrap();
    assert!(record.recovery_mode);
    let liquidated = &record.liquidated[0];
    assert!(liquidated.capped);
    assert_eq!(liquidated.debt_offset, units(200));
    // Seizure capped at debt * 1.1 worth of collateral
    assert_eq!(liquidated.collateral_to_stability_pool, units(2) + WAD / 5);
    let expected_surplus = units(2) + 2 * WAD / 5 - (units(2) + 2 * WAD / 5) / 200 - (units(2) + WAD / 5);
    assert_eq!(liquidated.surplus, expected_surplus);
    assert_eq!(sm.state().pools.surplus.claimable(&bob), expected_surplus);
    assert_healthy(&sm);

    let claimed = sm.claim_surplus(CallContext::new(bob, 120)).unwrap();
    assert_eq!(claimed, expected_surplus);
    assert_eq!(sm.collateral_of(&bob), expected_surplus);
    assert_eq!(sm.state().pools.surplus.claimable(&bob), 0);
    assert_healthy(&sm);
}

#[test]
fn test_recovery_mode_blocks_closing() {
    let mut sm = machine_at(200 * WAD);
    let alice = account("alice");

    let trove = open(&mut sm, "alice", Cohort::Standard, units(2), units(200));
    open(&mut sm, "bob", Cohort::Standard, units(2), units(200));
    set_price(&mut sm, 140 * WAD);
    assert!(sm.is_recovery_mode().unwrap());

    let before = sm.state_hash();
    let result = sm.close_trove(CallContext::new(alice, 60), trove);
    assert!(matches!(
        result,
        Err(Error::CollateralizationRatioTooLow { .. })
    ));
    assert_eq!(sm.state_hash(), before);
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_redemption_full_then_partial() {
    let mut sm = machine_at(200 * WAD);
    let alice = account("alice");
    let carol = account("carol");

    let a = open(&mut sm, "alice", Cohort::Standard, units(1), units(125));
    let b = open(&mut sm, "bob", Cohort::Standard, units(1), units(100));
    open(&mut sm, "carol", Cohort::Standard, units(4), units(200));
    let supply_before = sm.state().debt_token.total_supply().wad();

    let hints = sm.redemption_hints(units(150), 0).unwrap();
    assert_eq!(hints.first_hint, Some(a));
    assert_eq!(hints.truncated_amount, units(150));

    let record = sm
        .redeem(
            CallContext::new(carol, 60),
            RedemptionRequest::new(units(150)).with_hints(&hints),
        )
        .unwrap();
    assert_eq!(record.redeemed, units(150));
    assert!(!record.stale_hint);
    assert_eq!(record.closed_count(), 1);
    assert_eq!(record.collateral_drawn, 3 * WAD / 4);
    assert!(record.fee > 0);

    // Redeemer receives drawn collateral less the fee
    assert_eq!(sm.collateral_of(&carol), record.collateral_drawn - record.fee);
    let fee_recipient = sm.config().fee_recipient;
    assert_eq!(sm.collateral_of(&fee_recipient), record.fee);
    assert_eq!(sm.balance_of(&carol), units(50));
    assert_eq!(
        sm.state().debt_token.total_supply().wad(),
        supply_before - units(150)
    );

    assert_eq!(sm.state().troves.status(&a), TroveStatus::ClosedByRedemption);
    let (debt, collateral) = entire(&sm, &b, Cohort::Standard);
    assert_eq!(debt, units(75));
    assert_eq!(collateral, units(1) - units(25) / 200);

    // Alice keeps the collateral above her redeemed debt
    assert_eq!(
        sm.state().pools.surplus.claimable(&alice),
        units(1) - units(125) / 200
    );
    assert!(sm.state().fees.base_rate() > 0);
    assert_healthy(&sm);
}

#[test]
fn test_redemption_fee_cap_rolls_back() {
    let mut sm = machine_at(200 * WAD);
    let carol = account("carol");

    open(&mut sm, "alice", Cohort::Standard, units(1), units(125));
    open(&mut sm, "carol", Cohort::Standard, units(4), units(200));
    let before = sm.state_hash();

    let result = sm.redeem(
        CallContext::new(carol, 60),
        RedemptionRequest::new(units(125)).with_max_fee(WAD / 200),
    );
    assert!(matches!(result, Err(Error::FeeExceedsMaximum { .. })));
    assert_eq!(sm.state_hash(), before);
    assert_eq!(sm.rolled_back(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCRUAL TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_interest_flows_to_depositors() {
    let mut config = ProtocolConfig::default();
    config.rates.standard_rate_per_second = WAD + 100_000_000_000;
    let mut sm = machine_with(config, 200 * WAD);
    let alice = account("alice");

    open(&mut sm, "alice", Cohort::Standard, units(2), units(100));
    sm.provide_to_stability_pool(CallContext::new(alice, 0), units(50))
        .unwrap();

    let drip = sm.drip(CallContext::new(alice, 1000)).unwrap().unwrap();
    assert!(drip.standard_interest > 0);
    assert_eq!(drip.to_stability_pool, drip.total_interest());
    assert_eq!(drip.to_treasury, 0);
    assert_healthy(&sm);

    // A second drip in the same second is a no-op
    let hash = sm.state_hash();
    assert!(sm.drip(CallContext::new(alice, 1000)).unwrap().is_none());
    assert_eq!(sm.state_hash(), hash);

    let balance = sm.balance_of(&alice);
    let change = sm
        .withdraw_from_stability_pool(CallContext::new(alice, 1000), 0)
        .unwrap();
    assert!(change.gains.interest > 0);
    assert!(change.gains.interest <= drip.to_stability_pool);
    assert_eq!(sm.balance_of(&alice), balance + change.gains.interest);
    assert_healthy(&sm);
}

#[test]
fn test_par_update_moves_icr() {
    let mut sm = machine_at(200 * WAD);
    let keeper = account("keeper");
    let trove = open(&mut sm, "alice", Cohort::Standard, units(2), units(100));
    let before = sm.current_icr(&trove).unwrap();

    // Market below par raises par and lowers every ICR
    let update = sm
        .update_par(CallContext::new(keeper, 60), 98 * WAD / 100)
        .unwrap();
    assert!(update.new_par > update.old_par);
    assert_eq!(sm.state().rates.par(), update.new_par);
    assert!(sm.current_icr(&trove).unwrap() < before);
    assert_eq!(
        sm.state().events.last().map(|e| e.event_type()),
        Some("ParUpdated")
    );
    assert_healthy(&sm);
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIFECYCLE TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_open_close_lifecycle() {
    let mut sm = machine_at(200 * WAD);
    let alice = account("alice");
    let bob = account("bob");

    let trove = open(&mut sm, "alice", Cohort::Standard, units(2), units(100));
    open(&mut sm, "bob", Cohort::Standard, units(2), units(100));

    assert_eq!(sm.balance_of(&alice), units(100));
    let closed = sm.close_trove(CallContext::new(alice, 60), trove).unwrap();
    assert_eq!(closed.debt, 0);
    assert_eq!(sm.balance_of(&alice), 0);
    assert_eq!(sm.collateral_of(&alice), units(2));
    assert_eq!(sm.state().troves.status(&trove), TroveStatus::ClosedByOwner);

    // Only the owner may close
    let result = sm.close_trove(CallContext::new(bob, 60), trove);
    assert!(result.is_err());

    sm.withdraw_collateral(alice, units(2)).unwrap();
    assert_eq!(
        sm.state().collateral.net_deposited(),
        CollateralAmount::from_units(2)
    );
    assert_healthy(&sm);
}

#[test]
fn test_execute_dispatches_operations() {
    let mut sm = machine_at(200 * WAD);
    let alice = account("alice");
    sm.deposit_collateral(alice, units(3)).unwrap();

    let opened = sm
        .execute(
            CallContext::new(alice, 0),
            ProtocolOperation::OpenTrove(OpenTroveRequest {
                owner: alice,
                cohort: Cohort::Shielded,
                collateral: units(3),
                debt: units(200),
                hint: InsertHint::none(),
            }),
        )
        .unwrap();
    let trove = match opened {
        OperationResult::Position(update) => update.trove_id,
        other => panic!("unexpected result {:?}", other),
    };
    assert_eq!(sm.state().troves.get(&trove).map(|t| t.cohort), Some(Cohort::Shielded));

    let provided = sm
        .execute(
            CallContext::new(alice, 10),
            ProtocolOperation::ProvideToStabilityPool { amount: units(20) },
        )
        .unwrap();
    assert!(matches!(provided, OperationResult::StabilityDeposit(c) if c.current == units(20)));

    let drip = sm
        .execute(CallContext::new(alice, 20), ProtocolOperation::Drip)
        .unwrap();
    assert!(matches!(drip, OperationResult::Drip(None)));
    assert_healthy(&sm);
}

#[test]
fn test_state_survives_serialization() {
    let mut sm = machine_at(200 * WAD);
    let keeper = account("keeper");
    open(&mut sm, "alice", Cohort::Standard, units(2), units(100));
    open(&mut sm, "bob", Cohort::Standard, units(1) + WAD / 20, units(100));
    set_price(&mut sm, 100 * WAD);
    sm.liquidate(CallContext::new(keeper, 60), LiquidationMode::Sequence(5))
        .unwrap();

    let hash = sm.state_hash();
    let bytes = sm.state().to_bytes().unwrap();
    let restored = LedgerState::from_bytes(&bytes).unwrap();
    assert_eq!(restored.state_hash(), hash);
    assert!(check_invariants(&restored).is_healthy());

    let resumed = ProtocolStateMachine::from_state(restored, PriceFeed::new(100 * WAD).unwrap());
    assert_eq!(resumed.state_hash(), hash);
}

#[test]
fn test_config_file_drives_machine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");

    let mut config = ProtocolConfig::default();
    config.params.min_debt = units(10);
    config.save(&path).unwrap();

    let loaded = ProtocolConfig::load(&path).unwrap();
    assert_eq!(loaded, config);

    let mut sm = machine_with(loaded, 200 * WAD);
    open(&mut sm, "alice", Cohort::Standard, units(1), units(20));
    assert_eq!(sm.config().params.min_debt, units(10));
    assert_healthy(&sm);
}

#[test]
fn test_events_record_call_order() {
    let mut sm = machine_at(200 * WAD);
    let alice = account("alice");
    open(&mut sm, "alice", Cohort::Standard, units(2), units(100));
    sm.provide_to_stability_pool(CallContext::new(alice, 30), units(40))
        .unwrap();

    let types: Vec<_> = sm
        .state()
        .events
        .events()
        .iter()
        .map(|e| e.event_type())
        .collect();
    assert_eq!(types, vec!["PositionUpdated", "StabilityDeposit"]);
    assert_eq!(sm.state().events.since(30).len(), 1);
}
