//! Redemption Engine
//!
//! Swaps stablecoin for collateral at face value, drawing from the troves
//! with the lowest AICR first. Every redeemed trove gives up each of its
//! collateral assets in proportion to its composition, valued 1:1 at the
//! unweighted oracle price.
//!
//! A trove whose debt drops to the liquidation reserve is closed; its
//! leftover collateral becomes claimable surplus. A partial redemption that
//! would leave a trove below the minimum net debt ends the walk.
//!
//! The fee is taken in collateral at the post-redemption rate, so a large
//! redemption pays for the base-rate increase it causes.

use mcusd_common::{
    config::ProtocolParams,
    constants::precision::DECIMAL_PRECISION,
    errors::{McUsdError, McUsdResult},
    events::McUsdEvent,
    math::{apply_rate, mul_div},
    oracle::PriceFeed,
    token_ops::TokenLedger,
    types::{accounts, Address, CollateralAmounts, TroveId, TroveStatus},
    Vec,
};

use crate::context::{risk_score, TxContext};
use crate::fees::FeeState;
use crate::trove::{add_basket, sub_basket};

/// Result of a redemption call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RedemptionOutcome {
    /// Stablecoin the caller asked to redeem
    pub attempted: u128,
    /// Stablecoin actually redeemed and burned
    pub redeemed: u128,
    /// Fee rate charged (1e18 == 100%)
    pub fee_rate: u128,
    /// Collateral sent to the redeemer, net of fee
    pub collateral_sent: CollateralAmounts,
    /// Collateral routed to the fee recipient
    pub collateral_fee: CollateralAmounts,
    /// Troves touched, in the order they were redeemed
    pub troves: Vec<TroveId>,
}

/// What one trove gave up
struct TroveRedemption {
    debt: u128,
    collateral: CollateralAmounts,
}

pub struct RedemptionEngine;

impl RedemptionEngine {
    /// Redeem up to `amount` stablecoin.
    ///
    /// `max_iterations` caps the troves visited, skipped ones included; zero
    /// means no limit. `first_hint` may name the first trove with AICR ≥ MCR
    /// counting from the tail; an invalid hint falls back to walking from
    /// the tail.
    pub fn redeem<F, L>(
        ctx: &mut TxContext<'_, F, L>,
        redeemer: Address,
        amount: u128,
        max_fee: u128,
        max_iterations: usize,
        first_hint: Option<TroveId>,
    ) -> McUsdResult<RedemptionOutcome>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let params = ctx.state.params.clone();
        let now = ctx.now;

        // 1. Preconditions
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        if max_fee < params.redemption_fee_floor || max_fee > DECIMAL_PRECISION {
            return Err(McUsdError::InvalidMaxFee { max_fee });
        }
        let tcr = ctx.tcr()?;
        if tcr < params.mcr {
            return Err(McUsdError::RedemptionBlocked { tcr });
        }
        let balance = ctx.ledger.balance_of(&accounts::STABLECOIN, &redeemer);
        if balance < amount {
            return Err(McUsdError::InsufficientBalance {
                available: balance,
                requested: amount,
            });
        }
        let total_debt = ctx.state.troves.entire_system_debt()?;

        // 2. Walk from the riskiest trove
        let mut current = match first_hint {
            Some(hint) if Self::is_valid_first_hint(ctx, &hint, &params)? => Some(hint),
            _ => ctx.state.index.tail(),
        };
        let mut remaining = amount;
        let mut drawn = CollateralAmounts::new();
        let mut touched = Vec::new();
        let mut visited = 0usize;

        while let Some(id) = current {
            if remaining == 0 || (max_iterations > 0 && visited >= max_iterations) {
                break;
            }
            visited += 1;
            let up = ctx.state.index.prev(&id);
            if ctx.current_aicr(&id)? < params.mcr {
                log::debug!("redemption skips undercollateralized trove {:02x?}", &id[..4]);
                current = up;
                continue;
            }

            match Self::redeem_from(ctx, &id, remaining, &params)? {
                Some(taken) => {
                    remaining -= taken.debt;
                    add_basket(&mut drawn, &taken.collateral)?;
                    touched.push(id);
                }
                None => break,
            }
            current = up;
        }

        let redeemed = amount - remaining;
        if redeemed == 0 {
            return Err(McUsdError::NothingToRedeem);
        }

        // 3. Fee at the raised base rate
        let base_rate = ctx
            .state
            .fees
            .update_from_redemption(&params, redeemed, total_debt, now)?;
        ctx.events.emit(McUsdEvent::BaseRateUpdated {
            base_rate,
            timestamp: now,
        });
        let fee_rate = FeeState::redemption_rate(&params, base_rate)?;
        if fee_rate > max_fee {
            return Err(McUsdError::MaxFeeExceeded { fee_rate, max_fee });
        }

        let mut collateral_fee = CollateralAmounts::new();
        let mut collateral_sent = CollateralAmounts::new();
        for (asset, amount) in &drawn {
            let fee = apply_rate(*amount, fee_rate)?;
            if fee > 0 {
                collateral_fee.insert(*asset, fee);
            }
            if *amount > fee {
                collateral_sent.insert(*asset, *amount - fee);
            }
        }

        // 4. Effects
        ctx.burn_stablecoin(redeemer, redeemed)?;
        ctx.transfer_basket(accounts::ACTIVE_POOL, accounts::FEE_RECIPIENT, &collateral_fee);
        ctx.transfer_basket(accounts::ACTIVE_POOL, redeemer, &collateral_sent);

        log::debug!(
            "redeemed {} of {} across {} troves at fee rate {}",
            redeemed,
            amount,
            touched.len(),
            fee_rate
        );
        ctx.events.emit(McUsdEvent::Redemption {
            redeemer,
            attempted: amount,
            redeemed,
            fee_rate,
            collateral_sent: collateral_sent.clone(),
            collateral_fee: collateral_fee.clone(),
            timestamp: now,
        });

        Ok(RedemptionOutcome {
            attempted: amount,
            redeemed,
            fee_rate,
            collateral_sent,
            collateral_fee,
            troves: touched,
        })
    }

    /// Redeem from a single trove. `None` means the walk has to stop here.
    fn redeem_from<F, L>(
        ctx: &mut TxContext<'_, F, L>,
        id: &TroveId,
        remaining: u128,
        params: &ProtocolParams,
    ) -> McUsdResult<Option<TroveRedemption>>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let now = ctx.now;
        ctx.apply_pending(id)?;
        let trove = ctx.state.troves.get_active(id)?.clone();

        let net_debt = trove.debt.saturating_sub(params.liquidation_reserve);
        let debt = remaining.min(net_debt);
        if debt == 0 {
            return Ok(None);
        }

        // Pro-rata slice of every asset, worth `debt` at face value
        let value = ctx.basket_value(&trove.collateral)?;
        let mut collateral = CollateralAmounts::new();
        for (asset, amount) in trove.collateral.iter().filter(|(_, a)| **a > 0) {
            let taken = mul_div(*amount, debt, value.value)?;
            if taken > 0 {
                collateral.insert(*asset, taken.min(*amount));
            }
        }

        let status = if debt == net_debt {
            // Down to the reserve: close and set the rest aside
            ctx.state.index.remove(id)?;
            let closed = ctx.state.troves.close(id, TroveStatus::ClosedByRedemption, now)?;
            let mut leftover = closed.collateral.clone();
            sub_basket(&mut leftover, &collateral, "redeemed more than trove collateral")?;
            leftover.retain(|_, a| *a > 0);

            ctx.state
                .surplus
                .record(closed.owner, &leftover, now, &mut ctx.events)?;
            ctx.transfer_basket(accounts::ACTIVE_POOL, accounts::COLL_SURPLUS_POOL, &leftover);
            ctx.burn_stablecoin(accounts::GAS_POOL, closed.debt - net_debt)?;
            TroveStatus::ClosedByRedemption
        } else {
            if net_debt - debt < params.min_net_debt {
                log::debug!(
                    "partial redemption of {:02x?} would leave {} net debt",
                    &id[..4],
                    net_debt - debt
                );
                return Ok(None);
            }
            let troves = &mut ctx.state.troves;
            troves.remove_collateral(id, &collateral, now)?;
            troves.decrease_debt(id, debt, now)?;
            troves.update_stakes(id)?;
            let aicr = ctx.current_aicr(id)?;
            ctx.state.index.reinsert(*id, risk_score(aicr), None, None)?;
            TroveStatus::Active
        };

        ctx.events.emit(McUsdEvent::TroveRedeemed {
            trove_id: *id,
            debt_redeemed: debt,
            collateral_drawn: collateral.clone(),
            status,
            timestamp: now,
        });
        Ok(Some(TroveRedemption { debt, collateral }))
    }

    /// A hint is usable when it is the first trove with AICR ≥ MCR seen from
    /// the tail
    fn is_valid_first_hint<F, L>(
        ctx: &mut TxContext<'_, F, L>,
        hint: &TroveId,
        params: &ProtocolParams,
    ) -> McUsdResult<bool>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        if !ctx.state.index.contains(hint) || ctx.current_aicr(hint)? < params.mcr {
            return Ok(false);
        }
        match ctx.state.index.next(hint) {
            None => Ok(true),
            Some(riskier) => Ok(ctx.current_aicr(&riskier)? < params.mcr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::borrower_ops::BorrowerOperations;
    use crate::context::SystemState;
    use mcusd_common::{
        collateral::CollateralAsset, constants::precision::ONE_PERCENT, events::EventType,
        oracle::MockPriceFeed, token_ops::InMemoryLedger, types::AssetId,
    };

    const BTC: AssetId = [1u8; 32];
    const ONE: u128 = 100_000_000;
    const ALICE: Address = [10u8; 32];
    const BOB: Address = [11u8; 32];
    const CAROL: Address = [12u8; 32];

    /// BTC priced in whole dollars
    fn feed_at(dollars: u64) -> MockPriceFeed {
        let mut feed = MockPriceFeed::new();
        feed.set_price(BTC, dollars * 100_000_000, 0);
        feed
    }

    /// Alice 3 BTC, Bob 10 BTC, Carol 2 BTC, each borrowing 100 at $100
    fn system() -> (SystemState, InMemoryLedger, Vec<TroveId>) {
        let mut state = SystemState::new([0u8; 32], ProtocolParams::default());
        state
            .registry
            .add_asset(CollateralAsset::new(BTC, 8, 100 * ONE_PERCENT))
            .unwrap();
        let mut ledger = InMemoryLedger::new();
        for who in [ALICE, BOB, CAROL] {
            ledger.mint(&BTC, &who, 100 * ONE).unwrap();
        }

        let feed = feed_at(100);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        let ids = [(ALICE, 3), (BOB, 10), (CAROL, 2)]
            .iter()
            .map(|(who, btc)| {
                let coll: CollateralAmounts = [(BTC, *btc * ONE)].into_iter().collect();
                BorrowerOperations::open_trove(&mut ctx, *who, &coll, 100 * ONE, DECIMAL_PRECISION, None, None)
                    .unwrap()
            })
            .collect();
        let (state, ledger, _) = ctx.finish().unwrap();
        (state, ledger, ids)
    }

    #[test]
    fn test_partial_redemption_from_riskiest() {
        let (state, ledger, ids) = system();
        let carol = ids[2];
        let feed = feed_at(100);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        assert_eq!(ctx.state.index.tail(), Some(carol));

        let outcome = RedemptionEngine::redeem(&mut ctx, BOB, 50 * ONE, DECIMAL_PRECISION, 0, None).unwrap();
        assert_eq!(outcome.redeemed, 50 * ONE);
        assert_eq!(outcome.troves, vec![carol]);

        let trove = ctx.state.troves.get(&carol).unwrap();
        assert_eq!(trove.debt, 102_50000000 - 50 * ONE);
        assert_eq!(trove.collateral_of(&BTC), 3 * ONE / 2);

        // Fee rate = floor + 50 / 307.5 / 2
        let expected_base = 50 * DECIMAL_PRECISION / 307_5 * 10 / 2;
        assert!(outcome.fee_rate.abs_diff(ONE_PERCENT / 2 + expected_base) < ONE_PERCENT / 1_000);
        let fee = outcome.collateral_fee[&BTC];
        assert_eq!(fee + outcome.collateral_sent[&BTC], ONE / 2);

        let (state, ledger, events) = ctx.finish().unwrap();
        assert_eq!(ledger.balance_of(&BTC, &BOB), 90 * ONE + ONE / 2 - fee);
        assert_eq!(ledger.balance_of(&BTC, &accounts::FEE_RECIPIENT), fee);
        assert_eq!(ledger.balance_of(&accounts::STABLECOIN, &BOB), 50 * ONE);
        assert_eq!(events.filter_by_type(EventType::TroveRedeemed).len(), 1);
        assert!(state.fees.base_rate > 0);
        state.check_invariants(&ledger).unwrap();
    }

    #[test]
    fn test_max_fee_exceeded() {
        let (state, ledger, _) = system();
        let feed = feed_at(100);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        assert!(matches!(
            RedemptionEngine::redeem(&mut ctx, BOB, 50 * ONE, ONE_PERCENT, 0, None),
            Err(McUsdError::MaxFeeExceeded { .. })
        ));
    }

    #[test]
    fn test_preconditions() {
        let (state, ledger, _) = system();
        let feed = feed_at(100);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        assert_eq!(
            RedemptionEngine::redeem(&mut ctx, BOB, 0, DECIMAL_PRECISION, 0, None),
            Err(McUsdError::ZeroAmount)
        );
        assert_eq!(
            RedemptionEngine::redeem(&mut ctx, BOB, ONE, 0, 0, None),
            Err(McUsdError::InvalidMaxFee { max_fee: 0 })
        );
        assert!(matches!(
            RedemptionEngine::redeem(&mut ctx, BOB, 1_000 * ONE, DECIMAL_PRECISION, 0, None),
            Err(McUsdError::InsufficientBalance { .. })
        ));

        // 15 BTC at $20 against 307.5 debt
        let (state, ledger, _) = system();
        let low = feed_at(20);
        let mut ctx = TxContext::new(state, ledger, &low, 0);
        assert!(matches!(
            RedemptionEngine::redeem(&mut ctx, BOB, ONE, DECIMAL_PRECISION, 0, None),
            Err(McUsdError::RedemptionBlocked { .. })
        ));
    }

    #[test]
    fn test_partial_below_minimum_stops_walk() {
        let (state, ledger, _) = system();
        let feed = feed_at(100);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        // Carol's trove would be left with 5.5 net debt
        assert_eq!(
            RedemptionEngine::redeem(&mut ctx, BOB, 95 * ONE, DECIMAL_PRECISION, 0, None),
            Err(McUsdError::NothingToRedeem)
        );
    }

    #[test]
    fn test_valid_hint_skips_undercollateralized_tail() {
        let (state, ledger, ids) = system();
        // $50: Carol at ~97.6% AICR, Alice at ~146%
        let feed = feed_at(50);
        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        let outcome = RedemptionEngine::redeem(&mut ctx, BOB, 20 * ONE, DECIMAL_PRECISION, 1, Some(ids[0])).unwrap();
        assert_eq!(outcome.troves, vec![ids[0]]);
        assert_eq!(ctx.state.troves.get(&ids[2]).unwrap().debt, 102_50000000);
    }

    #[test]
    fn test_skipped_troves_count_toward_iterations() {
        let (state, ledger, ids) = system();
        // $50: Carol's tail trove is below MCR and gets skipped
        let feed = feed_at(50);
        let mut ctx = TxContext::new(state.clone(), ledger.clone(), &feed, 0);
        assert_eq!(
            RedemptionEngine::redeem(&mut ctx, BOB, 20 * ONE, DECIMAL_PRECISION, 1, None),
            Err(McUsdError::NothingToRedeem)
        );

        let mut ctx = TxContext::new(state, ledger, &feed, 0);
        let outcome = RedemptionEngine::redeem(&mut ctx, BOB, 20 * ONE, DECIMAL_PRECISION, 2, None).unwrap();
        assert_eq!(outcome.troves, vec![ids[0]]);
        assert_eq!(outcome.redeemed, 20 * ONE);
    }
}
