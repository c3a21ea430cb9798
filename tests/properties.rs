//! Property tests for the accounting invariants.

use proptest::prelude::*;

use cdp_engine::core::config::{ProtocolConfig, StabilityPoolParams};
use cdp_engine::core::interactions::Interactions;
use cdp_engine::core::pools::PoolId;
use cdp_engine::core::rewards::RewardsLedger;
use cdp_engine::core::sorted_troves::InsertHint;
use cdp_engine::core::trove::Cohort;
use cdp_engine::liquidation::engine::LiquidationMode;
use cdp_engine::liquidation::stability_pool::StabilityPool;
use cdp_engine::oracle::PriceFeed;
use cdp_engine::protocol::{CallContext, OpenTroveRequest, ProtocolStateMachine};
use cdp_engine::redemption::RedemptionRequest;
use cdp_engine::utils::constants::WAD;
use cdp_engine::utils::crypto::AccountId;
use cdp_engine::utils::math::units;

fn open(
    sm: &mut ProtocolStateMachine<PriceFeed>,
    owner: AccountId,
    cohort: Cohort,
    collateral: u128,
    debt: u128,
) {
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
    .unwrap();
}

/// One externally triggered call in a random schedule
#[derive(Debug, Clone)]
enum Step {
    Drip,
    Liquidate,
    Redeem(u64),
    Reprice(u128),
}

fn schedule() -> impl Strategy<Value = Vec<(Step, u64)>> {
    let step = prop_oneof![
        Just(Step::Drip),
        Just(Step::Liquidate),
        (10u64..200).prop_map(Step::Redeem),
        (100u128..220).prop_map(Step::Reprice),
    ];
    proptest::collection::vec((step, 1u64..86_400), 1..20)
}

fn entire_debt(sm: &ProtocolStateMachine<PriceFeed>) -> u128 {
    let state = sm.state();
    state
        .troves
        .iter_active()
        .map(|t| {
            state
                .troves
                .entire_debt_and_coll(&t.id, state.rates.accumulated(t.cohort))
                .unwrap()
                .debt
        })
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_reward_accumulators_never_decrease(
        steps in proptest::collection::vec((0u64..1_000_000, 0u64..1_000_000, 1u64..10_000_000), 1..40)
    ) {
        let mut ledger = RewardsLedger::new();
        for (collateral, debt, stakes) in steps {
            let (l_coll, l_debt) = (ledger.l_collateral(), ledger.l_debt());
            ledger
                .redistribute(collateral as u128 * WAD / 1000, debt as u128 * WAD / 1000, stakes as u128 * WAD / 1000)
                .unwrap();
            prop_assert!(ledger.l_collateral() >= l_coll);
            prop_assert!(ledger.l_debt() >= l_debt);
        }
    }

    #[test]
    fn prop_product_never_increases_within_an_epoch(
        deposits in proptest::collection::vec(1u64..1_000_000, 1..6),
        offsets in proptest::collection::vec(1u128..9_999, 1..30),
    ) {
        let mut pool = StabilityPool::new(StabilityPoolParams::default(), 0);
        let mut fx = Interactions::new();
        let depositors: Vec<AccountId> = (0..deposits.len())
            .map(|i| AccountId::from_label(&format!("depositor-{}", i)))
            .collect();
        for (depositor, amount) in depositors.iter().zip(&deposits) {
            pool.provide(*depositor, units(*amount), 0, &mut fx).unwrap();
        }

        for bps in offsets {
            let total = pool.total_deposits();
            if total == 0 {
                break;
            }
            let debt = (total * bps / 10_000).max(1);
            let before = (pool.current_epoch(), pool.current_scale(), pool.p());

            pool.offset(debt, debt / 100, PoolId::Active, 0, &mut fx).unwrap();

            if (pool.current_epoch(), pool.current_scale()) == (before.0, before.1) {
                prop_assert!(pool.p() <= before.2);
            }
            for (depositor, amount) in depositors.iter().zip(&deposits) {
                prop_assert!(pool.compounded_deposit(depositor) <= units(*amount));
            }
        }
    }

    #[test]
    fn prop_liquidations_preserve_supply(
        troves in proptest::collection::vec((100u64..1_000, 120u128..400, any::<bool>()), 1..8),
        deposit_share in 0u128..100,
        new_price in 100u128..190,
    ) {
        let mut sm = ProtocolStateMachine::new(
            ProtocolConfig::default(),
            PriceFeed::new(200 * WAD).unwrap(),
            0,
        )
        .unwrap();

        let whale = AccountId::from_label("whale");
        open(&mut sm, whale, Cohort::Standard, units(1_000), units(1_000));
        if deposit_share > 0 {
            sm.provide_to_stability_pool(CallContext::new(whale, 0), units(1_000) * deposit_share / 100)
                .unwrap();
        }

        for (i, (debt, ratio, shielded)) in troves.iter().enumerate() {
            let owner = AccountId::from_label(&format!("owner-{}", i));
            let cohort = if *shielded && *ratio >= 150 { Cohort::Shielded } else { Cohort::Standard };
            let collateral = units(*debt) * ratio / 100 / 200;
            open(&mut sm, owner, cohort, collateral, units(*debt));
        }
        let supply_before = sm.state().debt_token.total_supply().wad();

        sm.oracle_mut().set_price(new_price * WAD).unwrap();
        let keeper = AccountId::from_label("keeper");
        let outcome = sm.liquidate(CallContext::new(keeper, 60), LiquidationMode::Sequence(troves.len() + 1));

        let state = sm.state();
        let supply = state.debt_token.total_supply().wad();
        match outcome {
            Ok(record) => {
                prop_assert_eq!(supply, supply_before - record.total_debt_offset);
                prop_assert!(state.troves.active(&state.troves.troves_of(&whale)[0]).is_ok());
            }
            Err(_) => prop_assert_eq!(supply, supply_before),
        }
        prop_assert!(state.debt_token.verify_supply_invariant());
        prop_assert_eq!(state.collateral.net_deposited().wad(), state.collateral.total_held());

        let report = sm.check_health();
        prop_assert!(report.is_healthy(), "violations: {:?}", report.violations());

        // Applying pending rewards twice changes nothing the second time
        let mut state = sm.into_state();
        let ids: Vec<_> = state.troves.iter_active().map(|t| (t.id, t.cohort)).collect();
        let mut fx = Interactions::new();
        for (id, cohort) in ids {
            let rate = state.rates.accumulated(cohort);
            state.troves.apply_pending_rewards(&id, &mut state.pools, rate, 60, &mut fx).unwrap();
            let hash = state.state_hash();
            let applied = state.troves.apply_pending_rewards(&id, &mut state.pools, rate, 60, &mut fx).unwrap();
            prop_assert!(!applied);
            prop_assert_eq!(state.state_hash(), hash);
        }
    }

    #[test]
    fn prop_supply_tracks_debt_across_drip_liquidate_redeem(
        standard_rate in 0u128..200_000_000_000,
        shielded_rate in 0u128..200_000_000_000,
        troves in proptest::collection::vec((100u64..600, 130u128..400, any::<bool>()), 1..6),
        steps in schedule(),
    ) {
        let mut config = ProtocolConfig::default();
        config.rates.standard_rate_per_second = WAD + standard_rate;
        config.rates.shielded_rate_per_second = WAD + shielded_rate;
        let mut sm = ProtocolStateMachine::new(config, PriceFeed::new(200 * WAD).unwrap(), 0).unwrap();

        let whale = AccountId::from_label("whale");
        open(&mut sm, whale, Cohort::Standard, units(1_000), units(2_000));
        sm.provide_to_stability_pool(CallContext::new(whale, 0), units(500)).unwrap();
        for (i, (debt, ratio, shielded)) in troves.iter().enumerate() {
            let owner = AccountId::from_label(&format!("owner-{}", i));
            let cohort = if *shielded && *ratio >= 160 { Cohort::Shielded } else { Cohort::Standard };
            open(&mut sm, owner, cohort, units(*debt) * ratio / 100 / 200, units(*debt));
        }

        let mut now = 0;
        for (step, elapsed) in steps {
            now += elapsed;
            let ctx = CallContext::new(whale, now);
            // Individual calls may be rejected; rejected calls roll back
            match step {
                Step::Drip => {
                    let _ = sm.drip(ctx);
                }
                Step::Liquidate => {
                    let _ = sm.liquidate(ctx, LiquidationMode::Sequence(10));
                }
                Step::Redeem(amount) => {
                    let amount = units(amount).min(sm.balance_of(&whale));
                    if let Ok(hints) = sm.redemption_hints(amount, 0) {
                        let _ = sm.redeem(ctx, RedemptionRequest::new(amount).with_hints(&hints));
                    }
                }
                Step::Reprice(price) => sm.oracle_mut().set_price(price * WAD).unwrap(),
            }

            let report = sm.check_health();
            prop_assert!(report.is_healthy(), "violations: {:?}", report.violations());
            let supply = sm.state().debt_token.total_supply().wad();
            let debt = entire_debt(&sm);
            prop_assert!(
                supply.abs_diff(debt) <= report.tolerance,
                "supply {} vs entire debt {} (tolerance {})", supply, debt, report.tolerance
            );
        }
    }
}
