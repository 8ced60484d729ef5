//! Liquidation Engine
//!
//! Closes undercollateralized troves. Debt is offset against the Stability
//! Pool first; whatever the pool cannot absorb is redistributed over the
//! remaining troves' stakes.
//!
//! ## Modes
//!
//! - **Normal**: AICR < MCR. Offset first, remainder redistributed.
//! - **Recovery** (TCR < CCR): a trove with AICR < MCR is handled as in
//!   normal mode. A trove with MCR ≤ AICR < TCR is liquidated only when the
//!   pool covers its whole debt.
//!
//! Seized collateral is capped at `debt × liquidation_bonus` in value; the
//! rest is surplus for the owner. The liquidator receives `1/divisor` of each
//! seized asset plus the trove's liquidation reserve.
//!
//! Each liquidation is planned from a read-only view of the state, then
//! committed, so a trove that turns out not to be liquidatable leaves the
//! working state unchanged and a batch can simply move on.

use mcusd_common::{
    config::ProtocolParams,
    constants::precision::DECIMAL_PRECISION,
    errors::{McUsdError, McUsdResult},
    events::McUsdEvent,
    math::{compute_cr, is_recovery_mode, mul_div, safe_add},
    oracle::PriceFeed,
    token_ops::TokenLedger,
    types::{accounts, Address, AssetId, CollateralAmounts, TroveId, TroveStatus},
    BTreeMap, Vec,
};

use crate::context::{PriceCache, SystemState, TxContext};

/// Which rule made a trove liquidatable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationMode {
    /// AICR below MCR
    Normal,
    /// Recovery mode, MCR ≤ AICR < TCR, fully covered by the pool
    RecoveryOffset,
}

/// Computed split of one liquidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationPlan {
    pub trove_id: TroveId,
    pub owner: Address,
    pub mode: LiquidationMode,
    pub recovery_mode: bool,
    pub aicr: u128,
    /// Entire debt, including pending rewards and the reserve
    pub debt: u128,
    pub debt_offset: u128,
    pub debt_redistributed: u128,
    pub coll_gas_compensation: CollateralAmounts,
    pub coll_offset: CollateralAmounts,
    pub coll_redistributed: CollateralAmounts,
    pub coll_surplus: CollateralAmounts,
    pub reserve_compensation: u128,
    /// Stake asset -> weighted value, used when redistributing
    pub weights: BTreeMap<AssetId, u128>,
}

/// Liquidation entry points
pub struct LiquidationEngine;

impl LiquidationEngine {
    /// Liquidate one trove
    pub fn liquidate<F, L>(
        ctx: &mut TxContext<'_, F, L>,
        liquidator: Address,
        trove_id: TroveId,
    ) -> McUsdResult<LiquidationPlan>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let plan = Self::plan(&ctx.state, &mut ctx.prices, &trove_id)?;
        Self::commit(ctx, liquidator, &plan)?;
        Ok(plan)
    }

    /// Liquidate up to `n` troves from the tail, stopping at the first one
    /// that cannot be liquidated. The tail is re-read after every
    /// liquidation because a redistribution can reorder the index.
    pub fn liquidate_troves<F, L>(
        ctx: &mut TxContext<'_, F, L>,
        liquidator: Address,
        n: usize,
    ) -> McUsdResult<Vec<LiquidationPlan>>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let limit = n.min(ctx.state.params.max_liquidation_batch);
        let mut done = Vec::new();

        while done.len() < limit {
            let Some(id) = ctx.state.index.tail() else {
                break;
            };
            match Self::liquidate(ctx, liquidator, id) {
                Ok(plan) => done.push(plan),
                Err(err) if is_skippable(&err) => {
                    log::debug!("batch liquidation stopped: {}", err);
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        if done.is_empty() {
            return Err(McUsdError::NothingToLiquidate);
        }
        Ok(done)
    }

    /// Liquidate an explicit list, skipping troves that are not liquidatable
    pub fn batch_liquidate<F, L>(
        ctx: &mut TxContext<'_, F, L>,
        liquidator: Address,
        ids: &[TroveId],
    ) -> McUsdResult<Vec<LiquidationPlan>>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let mut done = Vec::new();
        for id in ids.iter().take(ctx.state.params.max_liquidation_batch) {
            match Self::liquidate(ctx, liquidator, *id) {
                Ok(plan) => done.push(plan),
                Err(err) if is_skippable(&err) => {
                    log::debug!("skipping trove {:02x?}: {}", &id[..4], err);
                }
                Err(err) => return Err(err),
            }
        }

        if done.is_empty() {
            return Err(McUsdError::NothingToLiquidate);
        }
        Ok(done)
    }

    // ============ Compute ============

    /// Decide whether and how a trove is liquidated, without mutating state
    pub fn plan<F: PriceFeed + ?Sized>(
        state: &SystemState,
        prices: &mut PriceCache<'_, F>,
        trove_id: &TroveId,
    ) -> McUsdResult<LiquidationPlan> {
        let params: &ProtocolParams = &state.params;

        // 1. Trove must be active; look at it with pending rewards applied
        let trove = state.troves.get_active(trove_id)?;
        let entire = state.troves.entire_trove(trove_id)?;
        let value = prices.basket_value(&state.registry, &entire.collateral)?;
        let aicr = compute_cr(value.weighted, entire.debt)?;

        // 2. Pick the rule
        let tcr = state.tcr(prices)?;
        let recovery = is_recovery_mode(tcr, params.ccr);
        let pool = state.stability_pool.total_deposits();
        let mode = if aicr < params.mcr {
            LiquidationMode::Normal
        } else if recovery && aicr < tcr && pool >= entire.debt {
            LiquidationMode::RecoveryOffset
        } else {
            return Err(McUsdError::NotLiquidatable {
                trove_id: *trove_id,
                aicr,
            });
        };

        // 3. Cap seized collateral at debt × bonus
        let cap = mul_div(entire.debt, params.liquidation_bonus, DECIMAL_PRECISION)?;
        let mut seized = CollateralAmounts::new();
        let mut coll_surplus = CollateralAmounts::new();
        for (asset, amount) in entire.collateral.iter().filter(|(_, a)| **a > 0) {
            let taken = if value.value > cap {
                mul_div(*amount, cap, value.value)?
            } else {
                *amount
            };
            seized.insert(*asset, taken);
            if *amount > taken {
                coll_surplus.insert(*asset, *amount - taken);
            }
        }

        // 4. Gas compensation
        let mut coll_gas_compensation = CollateralAmounts::new();
        let mut to_liquidate = CollateralAmounts::new();
        for (asset, amount) in &seized {
            let gas = *amount / params.coll_gas_compensation_divisor;
            if gas > 0 {
                coll_gas_compensation.insert(*asset, gas);
            }
            to_liquidate.insert(*asset, *amount - gas);
        }

        // 5. Offset first, remainder redistributed
        let debt_offset = entire.debt.min(pool);
        let debt_redistributed = entire.debt - debt_offset;
        let mut coll_offset = CollateralAmounts::new();
        let mut coll_redistributed = CollateralAmounts::new();
        for (asset, amount) in &to_liquidate {
            let to_pool = if debt_offset == entire.debt {
                *amount
            } else {
                mul_div(*amount, debt_offset, entire.debt)?
            };
            if to_pool > 0 {
                coll_offset.insert(*asset, to_pool);
            }
            if *amount > to_pool {
                coll_redistributed.insert(*asset, *amount - to_pool);
            }
        }

        // 6. Redistribution needs other stakes to land on
        let weights = if debt_redistributed > 0 || !coll_redistributed.is_empty() {
            let weights = Self::redistribution_weights(state, prices, trove_id, &entire.collateral)?;
            if weights.values().all(|w| *w == 0) {
                return Err(McUsdError::LastTroveCannotRedistribute);
            }
            weights
        } else {
            BTreeMap::new()
        };

        Ok(LiquidationPlan {
            trove_id: *trove_id,
            owner: trove.owner,
            mode,
            recovery_mode: recovery,
            aicr,
            debt: entire.debt,
            debt_offset,
            debt_redistributed,
            coll_gas_compensation,
            coll_offset,
            coll_redistributed,
            coll_surplus,
            reserve_compensation: params.liquidation_reserve.min(entire.debt),
            weights,
        })
    }

    /// Weighted value of each stake pool once the trove has left the system
    fn redistribution_weights<F: PriceFeed + ?Sized>(
        state: &SystemState,
        prices: &mut PriceCache<'_, F>,
        trove_id: &TroveId,
        leaving: &CollateralAmounts,
    ) -> McUsdResult<BTreeMap<AssetId, u128>> {
        let trove = state.troves.get_active(trove_id)?;
        let system = state.troves.entire_system_coll()?;
        let mut weights = BTreeMap::new();

        for asset in state.registry.assets() {
            let own_stake = trove.stakes.get(&asset).copied().unwrap_or(0);
            if state.troves.total_stakes(&asset).saturating_sub(own_stake) == 0 {
                continue;
            }
            let remaining = system
                .get(&asset)
                .copied()
                .unwrap_or(0)
                .saturating_sub(leaving.get(&asset).copied().unwrap_or(0));
            if remaining == 0 {
                continue;
            }
            let price = prices.price(&state.registry, &asset)?;
            let weight = state.registry.weighted_value_of(&asset, remaining, price)?;
            weights.insert(asset, weight);
        }
        Ok(weights)
    }

    // ============ Commit ============

    fn commit<F, L>(ctx: &mut TxContext<'_, F, L>, liquidator: Address, plan: &LiquidationPlan) -> McUsdResult<()>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let now = ctx.now;
        let id = plan.trove_id;

        // 1. Absorb pending rewards, then take the trove out of the system
        ctx.apply_pending(&id)?;
        ctx.state.index.remove(&id)?;
        let closed = ctx.state.troves.close(&id, TroveStatus::ClosedByLiquidation, now)?;
        if closed.debt != plan.debt {
            return Err(McUsdError::InvariantViolation {
                context: "liquidated debt differs from plan",
            });
        }

        // 2. Redistribute what the pool cannot absorb. Shares go by stake
        // asset, so remaining AICRs shift unevenly and the index is re-keyed.
        let redistributed = plan.debt_redistributed > 0 || !plan.coll_redistributed.is_empty();
        ctx.state
            .troves
            .redistribute(plan.debt_redistributed, &plan.coll_redistributed, &plan.weights)?;

        // 3. Offset against the Stability Pool
        if plan.debt_offset > 0 {
            ctx.state
                .stability_pool
                .offset(plan.debt_offset, &plan.coll_offset, now, &mut ctx.events)?;
            ctx.state.supply.total_debt_offset =
                safe_add(ctx.state.supply.total_debt_offset, plan.debt_offset)?;
            ctx.burn_stablecoin(accounts::STABILITY_POOL, plan.debt_offset)?;
        }

        // 4. Surplus for the owner
        ctx.state
            .surplus
            .record(plan.owner, &plan.coll_surplus, now, &mut ctx.events)?;

        ctx.state.troves.update_system_snapshots()?;
        if redistributed {
            let moved = ctx.rescore_all(None)?;
            log::debug!("redistribution re-keyed {} troves", moved);
        }

        // 5. Effects
        ctx.transfer_basket(accounts::ACTIVE_POOL, accounts::STABILITY_POOL, &plan.coll_offset);
        ctx.transfer_basket(accounts::ACTIVE_POOL, accounts::DEFAULT_POOL, &plan.coll_redistributed);
        ctx.transfer_basket(accounts::ACTIVE_POOL, accounts::COLL_SURPLUS_POOL, &plan.coll_surplus);
        ctx.transfer_basket(accounts::ACTIVE_POOL, liquidator, &plan.coll_gas_compensation);
        ctx.transfer(
            accounts::STABLECOIN,
            accounts::GAS_POOL,
            liquidator,
            plan.reserve_compensation,
        );

        log::debug!(
            "liquidated trove {:02x?}: offset {} redistributed {}",
            &id[..4],
            plan.debt_offset,
            plan.debt_redistributed
        );
        ctx.events.emit(McUsdEvent::TroveLiquidated {
            trove_id: id,
            owner: plan.owner,
            liquidator,
            debt_offset: plan.debt_offset,
            debt_redistributed: plan.debt_redistributed,
            coll_offset: plan.coll_offset.clone(),
            coll_redistributed: plan.coll_redistributed.clone(),
            coll_surplus: plan.coll_surplus.clone(),
            coll_gas_compensation: plan.coll_gas_compensation.clone(),
            reserve_compensation: plan.reserve_compensation,
            recovery_mode: plan.recovery_mode,
            timestamp: now,
        });
        Ok(())
    }
}

/// Errors that mean "this trove, not now" rather than a broken call
fn is_skippable(err: &McUsdError) -> bool {
    matches!(
        err,
        McUsdError::NotLiquidatable { .. }
            | McUsdError::LastTroveCannotRedistribute
            | McUsdError::TroveNotFound { .. }
            | McUsdError::TroveNotActive { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::borrower_ops::BorrowerOperations;
    use mcusd_common::{
        collateral::CollateralAsset, constants::precision::ONE_PERCENT, oracle::MockPriceFeed,
        token_ops::InMemoryLedger,
    };

    const BTC: AssetId = [1u8; 32];
    const ONE: u128 = 100_000_000;
    const ALICE: Address = [10u8; 32];
    const BOB: Address = [11u8; 32];
    const LIQUIDATOR: Address = [12u8; 32];

    fn setup(safety_ratio: u128) -> (SystemState, InMemoryLedger) {
        let mut state = SystemState::new([0u8; 32], ProtocolParams::default());
        state
            .registry
            .add_asset(CollateralAsset::new(BTC, 8, safety_ratio))
            .unwrap();
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&BTC, &ALICE, 1_000 * ONE).unwrap();
        ledger.mint(&BTC, &BOB, 1_000 * ONE).unwrap();
        (state, ledger)
    }

    /// BTC priced in whole dollars
    fn feed_at(dollars: u64) -> MockPriceFeed {
        let mut feed = MockPriceFeed::new();
        feed.set_price(BTC, dollars * 100_000_000, 0);
        feed
    }

    /// Open `(owner, btc, debt)` troves at $100/BTC and commit them
    fn with_troves(
        state: SystemState,
        ledger: InMemoryLedger,
        troves: &[(Address, u128, u128)],
    ) -> (SystemState, InMemoryLedger, Vec<TroveId>) {
        let feed = feed_at(100);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        let ids = troves
            .iter()
            .map(|(owner, btc, debt)| {
                let coll: CollateralAmounts = [(BTC, *btc)].into_iter().collect();
                BorrowerOperations::open_trove(&mut ctx, *owner, &coll, *debt, DECIMAL_PRECISION, None, None)
                    .unwrap()
            })
            .collect();
        let (state, ledger, _) = ctx.finish().unwrap();
        (state, ledger, ids)
    }

    #[test]
    fn test_healthy_trove_not_liquidatable() {
        let (state, ledger) = setup(100 * ONE_PERCENT);
        let (state, ledger, ids) =
            with_troves(state, ledger, &[(ALICE, 3 * ONE, 100 * ONE), (BOB, 10 * ONE, 100 * ONE)]);

        let feed = feed_at(100);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        let err = LiquidationEngine::liquidate(&mut ctx, LIQUIDATOR, ids[0]).unwrap_err();
        assert!(matches!(err, McUsdError::NotLiquidatable { .. }));
        assert_eq!(
            LiquidationEngine::liquidate_troves(&mut ctx, LIQUIDATOR, 10).unwrap_err(),
            McUsdError::NothingToLiquidate
        );
    }

    #[test]
    fn test_plan_caps_collateral_and_pays_gas() {
        // 80% risk weight: a trove can sit below MCR while its raw value
        // still exceeds debt × bonus
        let (state, ledger) = setup(80 * ONE_PERCENT);
        let (state, _, ids) =
            with_troves(state, ledger, &[(ALICE, 3 * ONE, 150 * ONE), (BOB, 20 * ONE, 100 * ONE)]);

        // $65: value 195, weighted 156 against ~152.75 debt
        let feed = feed_at(65);
        let mut prices = PriceCache::new(&feed, 0, 3_600);
        let plan = LiquidationEngine::plan(&state, &mut prices, &ids[0]).unwrap();

        assert_eq!(plan.mode, LiquidationMode::Normal);
        assert_eq!(plan.debt_offset, 0);
        assert_eq!(plan.debt_redistributed, plan.debt);
        assert_eq!(plan.reserve_compensation, state.params.liquidation_reserve);

        let cap = plan.debt * 110 / 100;
        let surplus = plan.coll_surplus[&BTC];
        let seized = 3 * ONE - surplus;
        assert!((seized * 65).abs_diff(cap) <= 130);
        assert_eq!(plan.coll_gas_compensation[&BTC], seized / 200);
        assert_eq!(
            plan.coll_redistributed[&BTC] + plan.coll_gas_compensation[&BTC],
            seized
        );
    }

    #[test]
    fn test_last_trove_needs_full_offset() {
        let (state, ledger) = setup(100 * ONE_PERCENT);
        let (state, ledger, ids) = with_troves(state, ledger, &[(ALICE, 3 * ONE, 150 * ONE)]);

        let feed = feed_at(40);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        assert_eq!(
            LiquidationEngine::liquidate(&mut ctx, LIQUIDATOR, ids[0]).unwrap_err(),
            McUsdError::LastTroveCannotRedistribute
        );
        // The failed attempt left the working state untouched
        assert!(ctx.state.troves.get_active(&ids[0]).is_ok());
        assert!(ctx.state.index.contains(&ids[0]));
    }

    #[test]
    fn test_redistribution_lands_on_remaining_trove() {
        let (state, ledger) = setup(100 * ONE_PERCENT);
        let (state, ledger, ids) =
            with_troves(state, ledger, &[(ALICE, 3 * ONE, 150 * ONE), (BOB, 20 * ONE, 100 * ONE)]);

        let feed = feed_at(50);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        let plan = LiquidationEngine::liquidate(&mut ctx, LIQUIDATOR, ids[0]).unwrap();

        assert_eq!(ctx.state.troves.get(&ids[0]).unwrap().status, TroveStatus::ClosedByLiquidation);
        let pending = ctx.state.troves.pending_rewards(&ids[1]).unwrap();
        // Bob is the only stake left, so he owes all of it (minus rounding)
        assert!(plan.debt_redistributed - pending.debt <= 1);
        assert!(plan.coll_redistributed[&BTC] - pending.collateral[&BTC] <= 1);

        let (state, ledger, events) = ctx.finish().unwrap();
        state.check_invariants(&ledger).unwrap();
        assert_eq!(ledger.balance_of(&BTC, &LIQUIDATOR), plan.coll_gas_compensation[&BTC]);
        assert_eq!(
            ledger.balance_of(&accounts::STABLECOIN, &LIQUIDATOR),
            state.params.liquidation_reserve
        );
        assert_eq!(events.filter_by_type(mcusd_common::events::EventType::TroveLiquidated).len(), 1);
    }
}
