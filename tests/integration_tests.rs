//! Integration tests for the trove engine.
//!
//! These tests drive complete scenarios through the protocol state machine.

use trove_engine::core::config::{ProtocolConfig, ProtocolParams};
use trove_engine::core::sorted_troves::InsertHint;
use trove_engine::core::trove::TroveStatus;
use trove_engine::error::Error;
use trove_engine::liquidation::{LiquidationPath, LiquidationTotals, SystemMode};
use trove_engine::protocol::{OperationResult, ProtocolEvent, ProtocolOperation, ProtocolStateMachine};
use trove_engine::redemption::RedemptionRequest;
use trove_engine::utils::constants::{DECIMAL_PRECISION, SCALE_FACTOR};
use trove_engine::utils::crypto::Address;
use trove_engine::utils::math::{mul_div, units};

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

const WHALE: u64 = 100;
const LIQUIDATOR: u64 = 200;

fn account(n: u64) -> Address {
    Address::from_low_u64(n)
}

fn new_machine() -> ProtocolStateMachine {
    ProtocolStateMachine::with_price_feed(ProtocolConfig::default(), 1_000).unwrap()
}

fn open_trove(machine: &mut ProtocolStateMachine, who: u64, coll: u128, debt: u128) {
    machine
        .execute(
            account(who),
            ProtocolOperation::OpenTrove {
                collateral: coll,
                debt_amount: debt,
                max_fee_percentage: DECIMAL_PRECISION,
                hint: InsertHint::default(),
            },
        )
        .unwrap();
}

fn provide(machine: &mut ProtocolStateMachine, who: u64, amount: u128) {
    machine
        .execute(account(who), ProtocolOperation::ProvideToStabilityPool { amount })
        .unwrap();
}

fn liquidate(machine: &mut ProtocolStateMachine, borrower: u64) -> LiquidationTotals {
    let result = machine
        .execute(
            account(LIQUIDATOR),
            ProtocolOperation::Liquidate {
                borrower: account(borrower),
            },
        )
        .unwrap();
    match result {
        OperationResult::Liquidation(totals) => totals,
        other => panic!("unexpected result {:?}", other),
    }
}

fn assert_conserved(totals: &LiquidationTotals) {
    for v in &totals.troves {
        assert_eq!(
            v.coll_to_send_to_sp + v.coll_to_redistribute + v.coll_gas_compensation + v.coll_surplus,
            v.entire_coll
        );
        assert_eq!(v.debt_to_offset + v.debt_to_redistribute, v.entire_debt);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL SCALE TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_scale_changes_keep_product_positive() {
    let mut machine = new_machine();
    open_trove(&mut machine, WHALE, units(1_000), units(50_000));
    for who in 1..=3 {
        open_trove(&mut machine, who, units(13), units(2_000));
    }

    // Each trove carries 2210 of debt. One wei of loss rounding leaves a
    // product factor of exactly 1e-18 when the pool holds 2211 wei extra.
    provide(&mut machine, WHALE, units(2_210) + 2_211);
    machine.set_price(units(180)).unwrap();

    let totals = liquidate(&mut machine, 1);
    assert_eq!(totals.troves[0].path, LiquidationPath::OffsetPool);
    let stats = machine.stability_pool_stats();
    assert_eq!(stats.p, SCALE_FACTOR);
    assert_eq!(stats.current_scale, 1);
    assert_eq!(stats.current_epoch, 0);

    // Topping up pays out the gain from the first liquidation
    provide(&mut machine, WHALE, units(2_210) - 1);
    let first_gain = units(13) - units(13) / 200;
    let paid = machine.collateral_sent_to(&account(WHALE));
    assert!(paid <= first_gain && first_gain - paid < 1_000_000_000_000);

    liquidate(&mut machine, 2);
    let stats = machine.stability_pool_stats();
    assert_eq!(stats.p, 1);
    assert_eq!(stats.current_scale, 2);

    // P is at its floor: the next near-total offset takes a double step
    provide(&mut machine, WHALE, units(2_210));
    let totals = liquidate(&mut machine, 3);
    assert_conserved(&totals);
    let stats = machine.stability_pool_stats();
    assert_eq!(stats.p, 1);
    assert_eq!(stats.current_scale, 4);
    assert_eq!(stats.current_epoch, 0);

    assert_eq!(machine.compounded_deposit(&account(WHALE)).unwrap(), 0);
    assert!(machine.collateral_gain(&account(WHALE)).unwrap() > units(12));
}

#[test]
fn test_exact_depletion_starts_new_epoch() {
    let mut machine = new_machine();
    open_trove(&mut machine, WHALE, units(1_000), units(50_000));
    open_trove(&mut machine, 1, units(13), units(2_000));

    provide(&mut machine, WHALE, units(2_210));
    machine.set_price(units(180)).unwrap();
    liquidate(&mut machine, 1);

    let stats = machine.stability_pool_stats();
    assert_eq!(stats.current_epoch, 1);
    assert_eq!(stats.current_scale, 0);
    assert_eq!(stats.p, DECIMAL_PRECISION);
    assert_eq!(stats.total_deposits, 0);
    assert_eq!(machine.compounded_deposit(&account(WHALE)).unwrap(), 0);

    // Gains survive the epoch change
    let gain = machine.collateral_gain(&account(WHALE)).unwrap();
    assert!(gain <= units(13) - units(13) / 200);
    assert!(gain > units(12));

    machine
        .execute(account(WHALE), ProtocolOperation::WithdrawFromStabilityPool { amount: 0 })
        .unwrap();
    assert_eq!(machine.collateral_sent_to(&account(WHALE)), gain);
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_recovery_mode_redistribution_below_100_percent() {
    let mut machine = new_machine();
    open_trove(&mut machine, 2, units(20), units(2_000));
    open_trove(&mut machine, 3, units(20), units(2_000));
    open_trove(&mut machine, 1, units(13), units(2_000));

    // Owner 1 at 13 * 150 / 2210 < 100%, TCR at 53 * 150 / 6630 < 150%
    machine.set_price(units(150)).unwrap();
    assert!(machine.is_recovery_mode());

    let totals = liquidate(&mut machine, 1);
    assert_conserved(&totals);
    let values = totals.troves[0];
    assert_eq!(values.path, LiquidationPath::RedistributeOnly);
    assert_eq!(values.debt_to_offset, 0);
    assert_eq!(values.debt_to_redistribute, units(2_210));
    assert_eq!(values.coll_gas_compensation, units(13) / 200);
    assert_eq!(values.coll_to_redistribute, units(13) - units(13) / 200);

    // Equal stakes share the redistribution equally
    for who in [2, 3] {
        let entire = machine.entire_debt_and_coll(&account(who)).unwrap();
        assert_eq!(entire.pending_debt_reward, units(1_105));
        assert_eq!(entire.pending_coll_reward, (units(13) - units(13) / 200) / 2);
        assert_eq!(entire.debt, units(2_210) + units(1_105));
    }

    // Liquidator receives only the flat reserve and the 0.5% share
    assert_eq!(machine.balance_of(&account(LIQUIDATOR)), units(200));
    assert_eq!(machine.collateral_sent_to(&account(LIQUIDATOR)), units(13) / 200);
    assert_eq!(
        machine.trove(&account(1)).map(|t| t.status),
        Some(TroveStatus::ClosedByLiquidation)
    );
}

#[test]
fn test_capped_liquidation_leaves_surplus_to_owner() {
    let mut machine = new_machine();
    open_trove(&mut machine, 1, units(36), units(2_000));
    open_trove(&mut machine, 2, units(27), units(2_000));
    open_trove(&mut machine, 3, units(31), units(2_000));

    machine
        .execute(account(1), ProtocolOperation::Transfer { to: account(3), amount: units(300) })
        .unwrap();
    provide(&mut machine, 3, units(2_300));

    // Owner 2 at 27 * 100 / 2210 is above MCR but below TCR
    machine.set_price(units(100)).unwrap();
    assert!(machine.is_recovery_mode());

    let totals = liquidate(&mut machine, 2);
    assert_conserved(&totals);
    let values = totals.troves[0];
    assert_eq!(values.path, LiquidationPath::CappedOffsetWithSurplus);
    let capped = mul_div(units(2_210), units(11) / 10, units(100)).unwrap();
    assert_eq!(capped, units(2_431) / 100);
    assert_eq!(values.coll_surplus, units(27) - capped);
    assert_eq!(values.coll_gas_compensation, capped / 200);

    // Surplus goes neither to the pool nor to the liquidator
    assert_eq!(machine.surplus_of(&account(2)), units(27) - capped);
    let result = machine.execute(account(2), ProtocolOperation::ClaimCollateral).unwrap();
    assert_eq!(result, OperationResult::CollateralClaimed { amount: units(27) - capped });
    assert_eq!(machine.collateral_sent_to(&account(2)), units(27) - capped);

    let err = machine.execute(account(2), ProtocolOperation::ClaimCollateral).unwrap_err();
    assert!(matches!(err, Error::NoSurplusToClaim(_)));

    let err = machine
        .execute(account(LIQUIDATOR), ProtocolOperation::Liquidate { borrower: account(1) })
        .unwrap_err();
    assert_eq!(err, Error::NothingToLiquidate);
}

#[test]
fn test_liquidate_troves_stops_at_healthy() {
    let mut machine = new_machine();
    open_trove(&mut machine, WHALE, units(1_000), units(50_000));
    for (who, coll) in [(1, units(13)), (2, units(14)), (3, units(50))] {
        open_trove(&mut machine, who, coll, units(2_000));
    }
    provide(&mut machine, WHALE, units(10_000));
    machine.set_price(units(170)).unwrap();

    let result = machine
        .execute(account(LIQUIDATOR), ProtocolOperation::LiquidateTroves { n: 10 })
        .unwrap();
    let OperationResult::Liquidation(totals) = result else {
        panic!("expected liquidation");
    };
    assert_eq!(totals.liquidated(), vec![account(1), account(2)]);
    assert_conserved(&totals);
    assert_eq!(machine.trove(&account(3)).map(|t| t.status), Some(TroveStatus::Active));

    let err = machine
        .execute(account(LIQUIDATOR), ProtocolOperation::LiquidateTroves { n: 10 })
        .unwrap_err();
    assert_eq!(err, Error::NothingToLiquidate);
}

fn liquidate_batch(machine: &mut ProtocolStateMachine, borrowers: Vec<Address>) -> LiquidationTotals {
    let result = machine
        .execute(account(LIQUIDATOR), ProtocolOperation::BatchLiquidateTroves { borrowers })
        .unwrap();
    let OperationResult::Liquidation(totals) = result else {
        panic!("expected liquidation");
    };
    totals
}

/// Owner 1 sits between 100% and MCR, owner 2 between MCR and TCR, owner 3
/// holds the pool deposit. Offsetting owner 1 lifts TCR above CCR.
fn recovery_flip_fixture() -> ProtocolStateMachine {
    let mut machine = new_machine();
    open_trove(&mut machine, 3, units(90), units(5_000));
    open_trove(&mut machine, 2, units(25), units(2_000));
    open_trove(&mut machine, 1, units(23), units(2_000));
    provide(&mut machine, 3, units(4_500));

    // TCR = 138 * 100 / 9645, owner 2 at 25 * 100 / 2210
    machine.set_price(units(100)).unwrap();
    assert!(machine.is_recovery_mode());
    machine
}

fn assert_flip_leaves_owner_2(machine: &ProtocolStateMachine, totals: &LiquidationTotals) {
    assert_eq!(totals.mode, SystemMode::Recovery);
    assert_eq!(totals.liquidated(), vec![account(1)]);
    assert_eq!(totals.troves[0].path, LiquidationPath::OffsetPool);
    assert_eq!(totals.total_debt_to_offset, units(2_210));
    assert_conserved(totals);

    // 115 * 100 / 7435 is back above CCR
    assert!(!machine.is_recovery_mode());
    assert_eq!(machine.tcr().unwrap(), mul_div(units(115), units(100), units(7_435)).unwrap());
    let survivor = machine.trove(&account(2)).unwrap();
    assert_eq!(survivor.status, TroveStatus::Active);
    assert_eq!(survivor.coll, units(25));
    assert_eq!(machine.surplus_of(&account(2)), 0);
    assert_eq!(machine.stability_pool_stats().total_deposits, units(4_500) - units(2_210));
}

#[test]
fn test_liquidate_troves_returns_to_normal_mode_mid_sequence() {
    let mut machine = recovery_flip_fixture();
    let result = machine
        .execute(account(LIQUIDATOR), ProtocolOperation::LiquidateTroves { n: 10 })
        .unwrap();
    let OperationResult::Liquidation(totals) = result else {
        panic!("expected liquidation");
    };
    assert_flip_leaves_owner_2(&machine, &totals);
}

#[test]
fn test_batch_liquidation_returns_to_normal_mode_mid_batch() {
    let mut machine = recovery_flip_fixture();
    let totals = liquidate_batch(&mut machine, vec![account(1), account(2)]);
    assert_flip_leaves_owner_2(&machine, &totals);
}

#[test]
fn test_batch_liquidation_skips_ineligible_entries() {
    let mut machine = new_machine();
    open_trove(&mut machine, WHALE, units(1_000), units(50_000));
    open_trove(&mut machine, 1, units(13), units(2_000));
    open_trove(&mut machine, 2, units(13), units(2_000));
    open_trove(&mut machine, 3, units(30), units(2_000));
    provide(&mut machine, WHALE, units(10_000));
    machine.set_price(units(180)).unwrap();
    liquidate(&mut machine, 1);

    // Closed, unknown, healthy, eligible, then eligible again
    let totals = liquidate_batch(
        &mut machine,
        vec![account(1), account(77), account(3), account(2), account(2)],
    );
    assert_eq!(totals.mode, SystemMode::Normal);
    assert_eq!(totals.len(), 1);
    assert_eq!(totals.liquidated(), vec![account(2)]);
    assert_eq!(totals.troves[0].path, LiquidationPath::OffsetPool);
    assert_conserved(&totals);

    assert_eq!(
        machine.trove(&account(2)).map(|t| t.status),
        Some(TroveStatus::ClosedByLiquidation)
    );
    assert_eq!(machine.trove(&account(3)).map(|t| t.status), Some(TroveStatus::Active));
    assert!(machine.trove(&account(77)).is_none());
}

#[test]
fn test_partial_pool_cover_redistributes_remainder() {
    let mut machine = new_machine();
    open_trove(&mut machine, WHALE, units(1_000), units(50_000));
    open_trove(&mut machine, 2, units(20), units(2_000));
    open_trove(&mut machine, 1, units(13), units(2_000));
    provide(&mut machine, WHALE, units(1_000));
    machine.set_price(units(180)).unwrap();

    let totals = liquidate(&mut machine, 1);
    assert_conserved(&totals);
    assert_eq!(totals.troves[0].path, LiquidationPath::OffsetPool);
    assert_eq!(totals.total_debt_to_offset, units(1_000));
    assert_eq!(totals.total_debt_to_redistribute, units(1_210));

    let coll_to_liquidate = units(13) - units(13) / 200;
    let coll_to_sp = mul_div(coll_to_liquidate, units(1_000), units(2_210)).unwrap();
    assert_eq!(totals.total_coll_to_send_to_sp, coll_to_sp);
    assert_eq!(totals.total_coll_to_redistribute, coll_to_liquidate - coll_to_sp);
    assert_eq!(machine.stability_pool_stats().total_deposits, 0);

    // Remaining stakes are the whale's 1000 and owner 2's 20
    let troves = &machine.state().troves;
    assert_eq!(troves.total_stakes(), units(1_020));
    assert_eq!(
        troves.l_coll(),
        mul_div(coll_to_liquidate - coll_to_sp, DECIMAL_PRECISION, units(1_020)).unwrap()
    );
    assert_eq!(troves.l_debt(), mul_div(units(1_210), DECIMAL_PRECISION, units(1_020)).unwrap());
    assert_eq!(troves.l_debt(), 1_186_274_509_803_921_568);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECONDARY REWARD TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_secondary_reward_reaches_depositor() {
    let mut machine = new_machine();
    open_trove(&mut machine, WHALE, units(1_000), units(50_000));
    provide(&mut machine, WHALE, units(10_000));

    let err = machine
        .execute(account(WHALE), ProtocolOperation::IssueSecondaryReward { amount: units(10) })
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    let issuer = machine.config().secondary_issuer;
    machine
        .execute(issuer, ProtocolOperation::IssueSecondaryReward { amount: units(10) })
        .unwrap();
    assert_eq!(machine.secondary_balance_of(&account(WHALE)), 0);

    let result = machine
        .execute(account(WHALE), ProtocolOperation::WithdrawFromStabilityPool { amount: 0 })
        .unwrap();
    let OperationResult::Deposit(change) = result else {
        panic!("expected deposit change");
    };
    assert_eq!(change.secondary_gain, units(10));
    assert_eq!(machine.secondary_balance_of(&account(WHALE)), units(10));
    assert_eq!(machine.state().secondary_rewards.undistributed(), 0);

    let withdrawals = machine.events().filter_by_type("StabilityWithdraw");
    let Some(ProtocolEvent::StabilityWithdraw(event)) = withdrawals.last() else {
        panic!("expected withdraw event");
    };
    assert_eq!(event.secondary_gain, units(10));

    // Already credited, a second touch pays nothing
    let result = machine
        .execute(account(WHALE), ProtocolOperation::WithdrawFromStabilityPool { amount: 0 })
        .unwrap();
    let OperationResult::Deposit(change) = result else {
        panic!("expected deposit change");
    };
    assert_eq!(change.secondary_gain, 0);
    assert_eq!(machine.secondary_balance_of(&account(WHALE)), units(10));
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION TESTS
// ═══════════════════════════════════════════════════════════════════════════════

fn redemption_fixture() -> ProtocolStateMachine {
    let mut machine = new_machine();
    open_trove(&mut machine, WHALE, units(1_000), units(10_000));
    open_trove(&mut machine, 1, units(13), units(2_000));
    open_trove(&mut machine, 2, units(20), units(2_000));
    open_trove(&mut machine, 3, units(30), units(2_000));
    // Owner 1 drops below MCR, the others stay above
    machine.set_price(units(180)).unwrap();
    machine
}

#[test]
fn test_redemption_skips_troves_below_mcr() {
    let mut machine = redemption_fixture();
    let price = machine.price().unwrap();
    let hints = machine.hints().get_redemption_hints(units(500), price, 0).unwrap();
    assert_eq!(hints.first_hint, Some(account(2)));
    assert_eq!(hints.truncated_amount, units(210));

    let partial_hint = machine.hints().find_insert_hint(hints.partial_nicr, 9).unwrap();
    let request = RedemptionRequest {
        amount: hints.truncated_amount,
        first_hint: hints.first_hint,
        partial_hint,
        partial_nicr: hints.partial_nicr,
        max_iterations: 0,
        max_fee_percentage: DECIMAL_PRECISION,
    };
    let result = machine
        .execute(account(WHALE), ProtocolOperation::RedeemCollateral(request))
        .unwrap();
    let OperationResult::Redemption(outcome) = result else {
        panic!("expected redemption");
    };

    assert_eq!(outcome.actual_amount, units(210));
    assert_eq!(outcome.troves.len(), 1);
    assert_eq!(outcome.troves[0].borrower, account(2));

    let untouched = machine.trove(&account(1)).unwrap();
    assert_eq!(untouched.debt, units(2_210));
    assert_eq!(untouched.coll, units(13));
    assert_eq!(machine.trove(&account(2)).unwrap().debt, units(2_000));

    assert_eq!(machine.collateral_sent_to(&account(WHALE)), outcome.coll_sent);
    assert_eq!(
        machine.collateral_sent_to(&machine.config().fee_recipient),
        outcome.coll_fee
    );
}

#[test]
fn test_partial_redemption_below_floor_is_skipped() {
    let mut machine = redemption_fixture();
    let before = machine.state_hash().unwrap();

    // Redeeming 500 from owner 2 would leave 1510 net debt
    let mut request = RedemptionRequest::new(units(500), DECIMAL_PRECISION);
    let err = machine
        .execute(account(WHALE), ProtocolOperation::RedeemCollateral(request))
        .unwrap_err();
    assert_eq!(err, Error::NothingRedeemed);
    assert_eq!(machine.state_hash().unwrap(), before);

    // Owner 2 is redeemed fully; the 300 left would take owner 3 under the
    // net debt floor, so the partial step is cancelled
    let price = machine.price().unwrap();
    let hints = machine.hints().get_redemption_hints(units(2_220), price, 0).unwrap();
    request.amount = units(2_310);
    request.partial_nicr = hints.partial_nicr;
    let result = machine
        .execute(account(WHALE), ProtocolOperation::RedeemCollateral(request))
        .unwrap();
    let OperationResult::Redemption(outcome) = result else {
        panic!("expected redemption");
    };

    assert_eq!(outcome.actual_amount, units(2_010));
    assert_eq!(machine.trove(&account(2)).unwrap().status, TroveStatus::ClosedByRedemption);
    assert_eq!(machine.trove(&account(3)).unwrap().debt, units(2_210));
    assert!(machine.surplus_of(&account(2)) > 0);
}

#[test]
fn test_redemption_fee_rollback() {
    let mut machine = redemption_fixture();
    let before = machine.state_hash().unwrap();
    let events_before = machine.events().len();

    let price = machine.price().unwrap();
    let hints = machine.hints().get_redemption_hints(units(210), price, 0).unwrap();
    let mut request = RedemptionRequest::new(hints.truncated_amount, units(5) / 1000);
    request.partial_nicr = hints.partial_nicr;

    let err = machine
        .execute(account(WHALE), ProtocolOperation::RedeemCollateral(request))
        .unwrap_err();
    assert!(matches!(err, Error::FeeExceedsTolerance { .. }));
    assert_eq!(machine.state_hash().unwrap(), before);
    assert_eq!(machine.events().len(), events_before);
    assert_eq!(machine.redemption_stats().total_redemptions, 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAKE TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_stake_tracks_collateral_snapshot_ratio() {
    let mut machine = new_machine();
    open_trove(&mut machine, 2, units(20), units(2_000));
    open_trove(&mut machine, 3, units(25), units(2_000));
    open_trove(&mut machine, 1, units(13), units(2_000));
    machine.set_price(units(150)).unwrap();
    liquidate(&mut machine, 1);

    machine.set_price(units(200)).unwrap();
    machine
        .execute(
            account(2),
            ProtocolOperation::AdjustTrove {
                adjustment: trove_engine::core::borrower::TroveAdjustment {
                    coll_deposit: units(1),
                    ..Default::default()
                },
                hint: InsertHint::default(),
            },
        )
        .unwrap();

    let troves = &machine.state().troves;
    let trove = machine.trove(&account(2)).unwrap();
    let expected = mul_div(
        trove.coll,
        troves.total_stakes_snapshot(),
        troves.total_collateral_snapshot(),
    )
    .unwrap();
    assert_eq!(trove.stake, expected);
    assert!(!troves.has_pending_rewards(&account(2)));
    assert!(troves.has_pending_rewards(&account(3)));
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let params = ProtocolParams::default().with_ratios(units(12) / 10, units(16) / 10);
    let mut config = ProtocolConfig::new(params);
    config.initial_price = units(3_000);
    config.save(&path).unwrap();

    let loaded = ProtocolConfig::load(&path).unwrap();
    assert_eq!(loaded, config);

    let machine = ProtocolStateMachine::with_price_feed(loaded, 0).unwrap();
    assert_eq!(machine.price().unwrap(), units(3_000));
}

#[test]
fn test_invalid_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut config = ProtocolConfig::default();
    config.params.ccr = config.params.mcr;
    config.save(&path).unwrap();

    assert!(ProtocolConfig::load(&path).is_err());
    assert!(ProtocolStateMachine::with_price_feed(config, 0).is_err());
}
