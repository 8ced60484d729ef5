//! End-to-end flows through the [`Protocol`] facade.
//!
//! The borrowing fee floor is zero in these tests so that trove debts are
//! round numbers: `debt = amount + reserve`.

use mcusd_common::{
    collateral::CollateralAsset,
    config::ProtocolParams,
    constants::precision::{DECIMAL_PRECISION, ONE_PERCENT},
    errors::McUsdError,
    events::EventType,
    oracle::MockPriceFeed,
    token_ops::{InMemoryLedger, TokenLedger},
    types::{accounts, Address, AssetId, CollateralAmounts, TroveId, TroveStatus},
};

use crate::protocol::Protocol;

const ADMIN: Address = [99u8; 32];
const BTC: AssetId = [1u8; 32];
const ETH: AssetId = [2u8; 32];
const ONE: u128 = 100_000_000;
const ONE_ETH: u128 = 1_000_000_000_000_000_000;

const ALICE: Address = [10u8; 32];
const BOB: Address = [11u8; 32];
const CAROL: Address = [12u8; 32];
const DAVE: Address = [13u8; 32];
const LIQUIDATOR: Address = [20u8; 32];

type TestProtocol = Protocol<MockPriceFeed, InMemoryLedger>;

fn protocol() -> TestProtocol {
    let mut feed = MockPriceFeed::new();
    feed.set_price(BTC, 100_00000000, 0);
    feed.set_price(ETH, 10_00000000, 0);

    let mut ledger = InMemoryLedger::new();
    for who in [ALICE, BOB, CAROL, DAVE] {
        ledger.mint(&BTC, &who, 100 * ONE).unwrap();
        ledger.mint(&ETH, &who, 10 * ONE_ETH).unwrap();
    }

    let params = ProtocolParams {
        borrowing_fee_floor: 0,
        ..ProtocolParams::default()
    };
    let mut protocol = Protocol::new(ADMIN, params, feed, ledger).unwrap();
    protocol
        .add_collateral(ADMIN, CollateralAsset::new(BTC, 8, 100 * ONE_PERCENT))
        .unwrap();
    protocol
        .add_collateral(ADMIN, CollateralAsset::new(ETH, 18, 80 * ONE_PERCENT))
        .unwrap();
    protocol
}

fn btc(amount: u128) -> CollateralAmounts {
    [(BTC, amount)].into_iter().collect()
}

fn open(protocol: &mut TestProtocol, owner: Address, btc_amount: u128, borrow: u128) -> TroveId {
    protocol
        .open_trove(owner, &btc(btc_amount), borrow, DECIMAL_PRECISION, None, None)
        .unwrap()
}

fn set_price(protocol: &mut TestProtocol, asset: AssetId, dollars: u64) {
    let now = protocol.now();
    protocol.feed_mut().set_price(asset, dollars * 100_000_000, now);
}

fn set_btc_price(protocol: &mut TestProtocol, dollars: u64) {
    set_price(protocol, BTC, dollars);
}

fn eth(amount: u128) -> CollateralAmounts {
    [(ETH, amount)].into_iter().collect()
}

fn open_eth(protocol: &mut TestProtocol, owner: Address, eth_amount: u128, borrow: u128) -> TroveId {
    protocol
        .open_trove(owner, &eth(eth_amount), borrow, DECIMAL_PRECISION, None, None)
        .unwrap()
}

fn fund_eth(protocol: &mut TestProtocol, who: Address, amount: u128) {
    protocol.ledger_mut().mint(&ETH, &who, amount).unwrap();
}

/// Walking from the tail must never meet a safer trove before a riskier one
fn assert_index_sorted(protocol: &TestProtocol) {
    let order = protocol.state().index.walk_from_tail();
    let aicrs: Vec<u128> = order
        .iter()
        .map(|id| protocol.get_current_aicr(id).unwrap())
        .collect();
    assert!(
        aicrs.windows(2).all(|pair| pair[0] <= pair[1]),
        "index out of order: {:?}",
        aicrs
    );
}

fn stablecoin(protocol: &TestProtocol, who: &Address) -> u128 {
    protocol.ledger().balance_of(&accounts::STABLECOIN, who)
}

// ============ Scenarios ============

#[test]
fn test_scenario_full_offset_after_price_halves() {
    let mut protocol = protocol();
    let _b = open(&mut protocol, BOB, 10 * ONE, 198 * ONE);
    // 200 collateral value against 100 debt
    let a = open(&mut protocol, ALICE, 2 * ONE, 98 * ONE);
    assert_eq!(protocol.get_current_icr(&a).unwrap(), 2 * DECIMAL_PRECISION);

    protocol.provide_to_sp(BOB, 150 * ONE).unwrap();
    set_btc_price(&mut protocol, 50);

    let plan = protocol.liquidate(LIQUIDATOR, a).unwrap();
    assert_eq!(plan.debt_offset, 100 * ONE);
    assert_eq!(plan.debt_redistributed, 0);
    assert!(plan.coll_redistributed.is_empty());

    // Pool loses exactly the debt
    assert_eq!(protocol.state().stability_pool.total_deposits(), 50 * ONE);
    assert_eq!(stablecoin(&protocol, &accounts::STABILITY_POOL), 50 * ONE);
    let compounded = protocol.get_compounded_deposit(&BOB).unwrap();
    assert!(compounded.abs_diff(50 * ONE) <= 1, "compounded {}", compounded);

    // ...and gains everything seized except gas compensation
    let gains = protocol.get_depositor_gains(&BOB).unwrap();
    let expected = 2 * ONE - 2 * ONE / 200;
    assert!(gains[&BTC].abs_diff(expected) <= 10, "gains {}", gains[&BTC]);

    assert_eq!(protocol.get_trove(&a).unwrap().status, TroveStatus::ClosedByLiquidation);
    assert_eq!(protocol.ledger().balance_of(&BTC, &LIQUIDATOR), 2 * ONE / 200);
    assert_eq!(
        stablecoin(&protocol, &LIQUIDATOR),
        protocol.state().params.liquidation_reserve
    );
    assert_eq!(protocol.events().filter_by_type(EventType::TroveLiquidated).len(), 1);
    protocol.check_invariants().unwrap();

    // Gains are paid out on claim
    let claimed = protocol.claim_sp_gains(BOB).unwrap();
    assert_eq!(claimed, gains);
    assert_eq!(protocol.ledger().balance_of(&BTC, &BOB), 90 * ONE + gains[&BTC]);
    protocol.check_invariants().unwrap();
}

#[test]
fn test_scenario_redemption_closes_riskiest_then_draws_next() {
    let mut protocol = protocol();
    let _e = open(&mut protocol, BOB, 10 * ONE, 198 * ONE);
    let d = open(&mut protocol, DAVE, 2 * ONE, 50 * ONE);
    // 40 net debt, the riskiest trove
    let c = open(&mut protocol, CAROL, ONE, 40 * ONE);
    assert_eq!(protocol.state().index.tail(), Some(c));

    let outcome = protocol
        .redeem(BOB, 50 * ONE, DECIMAL_PRECISION, 0, None)
        .unwrap();
    assert_eq!(outcome.redeemed, 50 * ONE);
    assert_eq!(outcome.troves, vec![c, d]);

    // Carol's trove is gone, its leftover collateral claimable
    assert_eq!(protocol.get_trove(&c).unwrap().status, TroveStatus::ClosedByRedemption);
    assert!(!protocol.state().index.contains(&c));
    assert_eq!(protocol.get_surplus(&CAROL)[&BTC], 6 * ONE / 10);

    // Remaining 10 drawn from Dave
    let dave = protocol.get_trove(&d).unwrap();
    assert_eq!(dave.debt, 52 * ONE - 10 * ONE);
    assert_eq!(dave.collateral_of(&BTC), 2 * ONE - ONE / 10);

    let drawn = outcome.collateral_sent[&BTC] + outcome.collateral_fee[&BTC];
    assert_eq!(drawn, ONE / 2);
    assert_eq!(stablecoin(&protocol, &BOB), 148 * ONE);
    protocol.check_invariants().unwrap();

    let claimed = protocol.claim_collateral(CAROL).unwrap();
    assert_eq!(claimed[&BTC], 6 * ONE / 10);
    assert_eq!(protocol.ledger().balance_of(&BTC, &CAROL), 99 * ONE + 6 * ONE / 10);
    assert_eq!(
        protocol.claim_collateral(CAROL),
        Err(McUsdError::SurplusNotFound { owner: CAROL })
    );
    protocol.check_invariants().unwrap();
}

// ============ Properties ============

/// Bob and Carol hold a 1:2 stake; Alice's trove drops below MCR at $80
fn fairness_setup() -> (TestProtocol, TroveId, TroveId, TroveId) {
    let mut protocol = protocol();
    let b = open(&mut protocol, BOB, 4 * ONE, 98 * ONE);
    let c = open(&mut protocol, CAROL, 8 * ONE, 198 * ONE);
    let a = open(&mut protocol, ALICE, 2 * ONE, 148 * ONE);
    set_btc_price(&mut protocol, 80);
    (protocol, a, b, c)
}

#[test]
fn test_redistribution_is_proportional_to_stake() {
    let (mut protocol, a, b, c) = fairness_setup();
    let plan = protocol.liquidate(LIQUIDATOR, a).unwrap();
    assert_eq!(plan.debt_offset, 0);
    assert_eq!(plan.debt_redistributed, 150 * ONE);

    let pb = protocol.get_pending_rewards(&b).unwrap();
    let pc = protocol.get_pending_rewards(&c).unwrap();
    assert!(pb.debt.abs_diff(50 * ONE) <= 1);
    assert!(pc.debt.abs_diff(2 * pb.debt) <= 2);
    assert!(pc.collateral[&BTC].abs_diff(2 * pb.collateral[&BTC]) <= 2);
    assert!((pb.debt + pc.debt).abs_diff(150 * ONE) <= 2);

    // System totals are unchanged by the move into the default pool
    assert!(protocol.get_entire_system_debt().unwrap().abs_diff(450 * ONE) <= 2);
    protocol.check_invariants().unwrap();

    // Touching a trove absorbs its share
    protocol
        .adjust_trove(
            BOB,
            b,
            &btc(ONE),
            &CollateralAmounts::new(),
            crate::DebtChange::None,
            0,
            (None, None),
        )
        .unwrap();
    assert!(protocol.get_pending_rewards(&b).unwrap().is_empty());
    assert_eq!(protocol.get_trove(&b).unwrap().debt, 100 * ONE + pb.debt);
    protocol.check_invariants().unwrap();
}

#[test]
fn test_liquidation_offsets_before_redistributing() {
    let (mut protocol, a, _, _) = fairness_setup();
    protocol.provide_to_sp(CAROL, 60 * ONE).unwrap();

    let plan = protocol.liquidate(LIQUIDATOR, a).unwrap();
    assert_eq!(plan.debt_offset, 60 * ONE);
    assert_eq!(plan.debt_redistributed, 90 * ONE);
    assert_eq!(protocol.state().stability_pool.total_deposits(), 0);
    assert_eq!(protocol.get_compounded_deposit(&CAROL).unwrap(), 0);
    assert!(!protocol.get_depositor_gains(&CAROL).unwrap().is_empty());
    protocol.check_invariants().unwrap();
}

#[test]
fn test_liquidate_troves_walks_from_tail() {
    let (mut protocol, a, b, _) = fairness_setup();
    let plans = protocol.liquidate_troves(LIQUIDATOR, 10).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].trove_id, a);
    assert_eq!(protocol.get_trove(&b).unwrap().status, TroveStatus::Active);

    assert_eq!(
        protocol.liquidate_troves(LIQUIDATOR, 10).unwrap_err(),
        McUsdError::NothingToLiquidate
    );
    assert_eq!(
        protocol.batch_liquidate(LIQUIDATOR, &[a, b]).unwrap_err(),
        McUsdError::NothingToLiquidate
    );
    protocol.check_invariants().unwrap();
}

#[test]
fn test_stability_pool_round_trip() {
    let mut protocol = protocol();
    open(&mut protocol, BOB, 10 * ONE, 198 * ONE);

    protocol.provide_to_sp(BOB, 50 * ONE).unwrap();
    assert_eq!(stablecoin(&protocol, &BOB), 148 * ONE);
    let change = protocol.withdraw_from_sp(BOB, u128::MAX).unwrap();
    assert_eq!(change.amount, 50 * ONE);
    assert_eq!(stablecoin(&protocol, &BOB), 198 * ONE);
    assert_eq!(protocol.get_compounded_deposit(&BOB).unwrap(), 0);
    protocol.check_invariants().unwrap();
}

#[test]
fn test_sp_withdrawal_blocked_by_undercollateralized_trove() {
    let (mut protocol, _, _, _) = fairness_setup();
    set_btc_price(&mut protocol, 100);
    protocol.provide_to_sp(CAROL, 60 * ONE).unwrap();
    set_btc_price(&mut protocol, 80);

    assert_eq!(
        protocol.withdraw_from_sp(CAROL, 10 * ONE).unwrap_err(),
        McUsdError::WithdrawalBlocked
    );
    // Zero-amount withdrawal only settles gains
    assert_eq!(protocol.withdraw_from_sp(CAROL, 0).unwrap().amount, 0);
}

#[test]
fn test_redemption_fee_decays_over_time() {
    let mut protocol = protocol();
    open(&mut protocol, BOB, 10 * ONE, 198 * ONE);
    open(&mut protocol, DAVE, 4 * ONE, 98 * ONE);

    protocol.redeem(BOB, 30 * ONE, DECIMAL_PRECISION, 0, None).unwrap();
    let floor = protocol.state().params.redemption_fee_floor;
    let base = protocol.state().fees.base_rate;
    assert!(base > 0);
    assert_eq!(protocol.get_redemption_fee_rate().unwrap(), floor + base);

    let mut last = floor + base;
    for _ in 0..24 {
        protocol.advance_time(3_600);
        let rate = protocol.get_redemption_fee_rate().unwrap();
        assert!(rate <= last);
        last = rate;
    }
    // Two half-lives
    let expected = floor + base / 4;
    assert!(last.abs_diff(expected) < ONE_PERCENT / 100, "rate {}", last);
}

#[test]
fn test_multi_collateral_weighting() {
    let mut protocol = protocol();
    let coll: CollateralAmounts = [(BTC, ONE), (ETH, 10 * ONE_ETH)].into_iter().collect();
    let id = protocol
        .open_trove(ALICE, &coll, 98 * ONE, DECIMAL_PRECISION, None, None)
        .unwrap();

    // $200 of collateral, $180 once ETH is weighted at 80%
    assert_eq!(protocol.get_current_icr(&id).unwrap(), 2 * DECIMAL_PRECISION);
    assert_eq!(protocol.get_current_aicr(&id).unwrap(), 18 * DECIMAL_PRECISION / 10);

    // Deprecated assets are withdraw-only
    protocol.set_collateral_active(ADMIN, ETH, false).unwrap();
    let eth: CollateralAmounts = [(ETH, ONE_ETH)].into_iter().collect();
    assert_eq!(
        protocol.open_trove(BOB, &eth, 20 * ONE, DECIMAL_PRECISION, None, None),
        Err(McUsdError::CollateralInactive { asset: ETH })
    );
    protocol
        .adjust_trove(
            ALICE,
            id,
            &CollateralAmounts::new(),
            &eth,
            crate::DebtChange::None,
            0,
            (None, None),
        )
        .unwrap();
    protocol.check_invariants().unwrap();
}

#[test]
fn test_fee_on_transfer_collateral_is_measured() {
    let mut protocol = protocol();
    protocol.ledger_mut().set_transfer_fee(BTC, 100);
    let id = open(&mut protocol, ALICE, 3 * ONE, 98 * ONE);
    assert_eq!(protocol.get_trove(&id).unwrap().collateral_of(&BTC), 3 * ONE * 99 / 100);
    protocol.check_invariants().unwrap();
}

#[test]
fn test_conservation_across_mixed_operations() {
    let mut protocol = protocol();
    let b = open(&mut protocol, BOB, 10 * ONE, 198 * ONE);
    let c = open(&mut protocol, CAROL, 8 * ONE, 198 * ONE);
    let d = open(&mut protocol, DAVE, 4 * ONE, 148 * ONE);
    protocol.check_invariants().unwrap();

    protocol.provide_to_sp(BOB, 100 * ONE).unwrap();
    protocol.check_invariants().unwrap();

    // Dave at ~108% AICR: 100 offset, rest redistributed
    set_btc_price(&mut protocol, 40);
    protocol.liquidate(LIQUIDATOR, d).unwrap();
    protocol.check_invariants().unwrap();

    set_btc_price(&mut protocol, 100);
    protocol.redeem(CAROL, 20 * ONE, DECIMAL_PRECISION, 0, None).unwrap();
    protocol.check_invariants().unwrap();

    // The emptied pool left Bob with gains only
    let change = protocol.withdraw_from_sp(BOB, u128::MAX).unwrap();
    assert_eq!(change.amount, 0);
    assert!(!change.gains.is_empty());
    assert!(protocol.state().stability_pool.deposit(&BOB).is_none());
    protocol.check_invariants().unwrap();

    // Bob repays enough of Carol's debt to close his own trove
    let bob_debt = protocol.get_entire_trove(&b).unwrap().debt;
    let reserve = protocol.state().params.liquidation_reserve;
    let owed = bob_debt - reserve;
    let held = stablecoin(&protocol, &BOB);
    if held < owed {
        protocol
            .ledger_mut()
            .transfer(&accounts::STABLECOIN, &CAROL, &BOB, owed - held)
            .unwrap();
    }
    protocol.close_trove(BOB, b).unwrap();
    protocol.check_invariants().unwrap();

    assert_eq!(protocol.state().troves.active_count(), 1);
    assert_eq!(protocol.state().index.walk_from_tail(), vec![c]);
    let minted = protocol.state().supply.total_minted;
    let burned = protocol.state().supply.total_burned;
    assert_eq!(minted - burned, protocol.get_entire_system_debt().unwrap());
}

#[test]
fn test_large_eighteen_decimal_troves() {
    let mut protocol = protocol();
    set_price(&mut protocol, ETH, 3_000);
    let mut ids = Vec::new();
    for (who, borrow) in [(ALICE, 1_000_000), (BOB, 1_200_000), (CAROL, 1_400_000), (DAVE, 1_600_000)] {
        fund_eth(&mut protocol, who, 1_000 * ONE_ETH);
        // $2.4M weighted against each debt
        ids.push(open_eth(&mut protocol, who, 1_000 * ONE_ETH, borrow * ONE));
    }
    let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);

    let reserve = protocol.state().params.liquidation_reserve;
    assert_eq!(
        protocol.get_entire_system_debt().unwrap(),
        5_200_000 * ONE + 4 * reserve
    );
    assert_eq!(protocol.get_entire_system_coll().unwrap()[&ETH], 4_000 * ONE_ETH);
    assert_eq!(protocol.state().index.walk_from_tail(), vec![d, c, b, a]);
    protocol.check_invariants().unwrap();

    // $100k at $3,000 draws 33.3 ETH from the riskiest trove
    let outcome = protocol
        .redeem(ALICE, 100_000 * ONE, DECIMAL_PRECISION, 0, None)
        .unwrap();
    assert_eq!(outcome.troves, vec![d]);
    let drawn = outcome.collateral_sent[&ETH] + outcome.collateral_fee[&ETH];
    assert!(drawn.abs_diff(33_333_333_333_333_333_333) <= 1, "drawn {}", drawn);
    assert_eq!(
        protocol.get_trove(&d).unwrap().collateral_of(&ETH),
        1_000 * ONE_ETH - drawn
    );
    protocol.check_invariants().unwrap();
}

// ============ Index Order ============

#[test]
fn test_safety_ratio_change_rekeys_index() {
    let mut protocol = protocol();
    fund_eth(&mut protocol, BOB, 10 * ONE_ETH);
    let c = open(&mut protocol, CAROL, 10 * ONE, 198 * ONE);
    // 200 / 154
    let a = open(&mut protocol, ALICE, 2 * ONE, 152 * ONE);
    // 20 ETH weighted at 80%: 160 / 100
    let b = open_eth(&mut protocol, BOB, 20 * ONE_ETH, 98 * ONE);
    assert_eq!(protocol.state().index.tail(), Some(a));

    // At 50% Bob sits at 100%, below MCR
    protocol.set_safety_ratio(ADMIN, ETH, 50 * ONE_PERCENT).unwrap();
    assert_eq!(protocol.get_current_aicr(&b).unwrap(), DECIMAL_PRECISION);
    assert_eq!(protocol.state().index.walk_from_tail(), vec![b, a, c]);
    assert_index_sorted(&protocol);
    assert_eq!(protocol.events().filter_by_type(EventType::SafetyRatioUpdated).len(), 1);

    let plans = protocol.liquidate_troves(LIQUIDATOR, 10).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].trove_id, b);
    assert_eq!(protocol.get_trove(&a).unwrap().status, TroveStatus::Active);
    assert_index_sorted(&protocol);
    protocol.check_invariants().unwrap();
}

#[test]
fn test_safety_ratio_change_rejected_by_non_admin() {
    let mut protocol = protocol();
    let a = open(&mut protocol, ALICE, 2 * ONE, 98 * ONE);
    assert_eq!(
        protocol.set_safety_ratio(BOB, ETH, 50 * ONE_PERCENT),
        Err(McUsdError::AdminOnly)
    );
    assert_eq!(protocol.state().index.walk_from_tail(), vec![a]);
    assert!(protocol.events().filter_by_type(EventType::SafetyRatioUpdated).is_empty());
}

#[test]
fn test_price_move_across_assets_rekeyed_by_update() {
    let mut protocol = protocol();
    fund_eth(&mut protocol, BOB, 10 * ONE_ETH);
    let c = open(&mut protocol, CAROL, 10 * ONE, 198 * ONE);
    let a = open(&mut protocol, ALICE, 2 * ONE, 148 * ONE);
    let b = open_eth(&mut protocol, BOB, 20 * ONE_ETH, 98 * ONE);
    assert_eq!(protocol.state().index.walk_from_tail(), vec![a, b, c]);

    // ETH at $6 leaves Bob at 96%; BTC troves keep their keys
    set_price(&mut protocol, ETH, 6);
    assert_eq!(protocol.update_troves(&[a, b, c]).unwrap(), 1);
    assert_eq!(protocol.state().index.tail(), Some(b));
    assert_index_sorted(&protocol);

    // Nothing left to move, and unknown ids are ignored
    assert_eq!(protocol.update_troves(&[a, b, c, [77u8; 32]]).unwrap(), 0);

    let plans = protocol.liquidate_troves(LIQUIDATOR, 10).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].trove_id, b);
    assert_index_sorted(&protocol);
    protocol.check_invariants().unwrap();
}

#[test]
fn test_redistribution_rekeys_receiving_troves() {
    let mut protocol = protocol();
    fund_eth(&mut protocol, DAVE, 10 * ONE_ETH);
    let c = open(&mut protocol, CAROL, 10 * ONE, 198 * ONE);
    let a = open(&mut protocol, ALICE, 2 * ONE, 148 * ONE);
    // 16 ETH weighted at 80%: 128 / 100
    let d = open_eth(&mut protocol, DAVE, 16 * ONE_ETH, 98 * ONE);
    assert_eq!(protocol.state().index.walk_from_tail(), vec![d, a, c]);

    // ETH at $8 puts Dave at 102%; with no other ETH stake the BTC troves absorb him
    set_price(&mut protocol, ETH, 8);
    let plan = protocol.liquidate(LIQUIDATOR, d).unwrap();
    assert!(plan.debt_redistributed > 0);
    assert_index_sorted(&protocol);

    // Carol drops from 500% to ~383%, so a fresh 400% trove belongs above her
    let carol = protocol.get_current_aicr(&c).unwrap();
    assert!(carol < 4 * DECIMAL_PRECISION, "carol {}", carol);
    let b = open(&mut protocol, BOB, 4 * ONE, 98 * ONE);
    assert_eq!(protocol.state().index.walk_from_tail(), vec![a, c, b]);
    assert_index_sorted(&protocol);
    protocol.check_invariants().unwrap();
}

#[test]
fn test_redemption_iterations_include_skipped_troves() {
    let mut protocol = protocol();
    let c = open(&mut protocol, CAROL, 10 * ONE, 198 * ONE);
    let a = open(&mut protocol, ALICE, 2 * ONE, 148 * ONE);
    let b = open(&mut protocol, BOB, 4 * ONE, 98 * ONE);
    assert_eq!(protocol.state().index.walk_from_tail(), vec![a, b, c]);

    // At $80 Alice is below MCR and must be stepped over
    set_btc_price(&mut protocol, 80);
    assert_eq!(
        protocol
            .redeem(CAROL, 20 * ONE, DECIMAL_PRECISION, 1, None)
            .unwrap_err(),
        McUsdError::NothingToRedeem
    );
    assert_eq!(stablecoin(&protocol, &CAROL), 198 * ONE);

    let outcome = protocol
        .redeem(CAROL, 20 * ONE, DECIMAL_PRECISION, 2, None)
        .unwrap();
    assert_eq!(outcome.troves, vec![b]);
    assert_eq!(outcome.redeemed, 20 * ONE);
    assert_eq!(protocol.get_trove(&a).unwrap().debt, 150 * ONE);
    protocol.check_invariants().unwrap();
}
