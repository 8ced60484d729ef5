//! Borrower Operations
//!
//! Owner-facing trove lifecycle: open, adjust, close, and claiming collateral
//! surplus left by a liquidation or redemption.
//!
//! ## Collateral Requirements
//!
//! | Mode     | Open                     | Adjust                                         |
//! |----------|--------------------------|------------------------------------------------|
//! | Normal   | AICR ≥ MCR, new TCR ≥ CCR | AICR ≥ MCR, new TCR ≥ CCR                      |
//! | Recovery | AICR ≥ CCR, no fee       | no withdrawal, AICR must not fall, borrow needs AICR ≥ CCR |

use mcusd_common::{
    constants::precision::DECIMAL_PRECISION,
    errors::{AmountErrorReason, McUsdError, McUsdResult, RecoveryModeOp},
    events::McUsdEvent,
    math::{apply_rate, compute_cr, safe_add},
    oracle::PriceFeed,
    token_ops::TokenLedger,
    types::{accounts, derive_trove_id, Address, CollateralAmounts, Trove, TroveId, TroveStatus},
};

use crate::context::{risk_score, TxContext};
use crate::fees::FeeState;

/// Requested change to a trove's debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebtChange {
    #[default]
    None,
    /// Mint this much more stablecoin to the owner
    Borrow(u128),
    /// Burn this much of the owner's stablecoin against the debt
    Repay(u128),
}

/// Owner-facing trove operations
pub struct BorrowerOperations;

impl BorrowerOperations {
    /// Open a trove and mint `debt_amount` to the owner.
    ///
    /// The recorded debt is `debt_amount + fee + reserve`.
    pub fn open_trove<F, L>(
        ctx: &mut TxContext<'_, F, L>,
        owner: Address,
        collateral: &CollateralAmounts,
        debt_amount: u128,
        max_fee: u128,
        hint_prev: Option<TroveId>,
        hint_next: Option<TroveId>,
    ) -> McUsdResult<TroveId>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let params = ctx.state.params.clone();
        let now = ctx.now;

        // 1. Validate request
        if collateral.is_empty() {
            return Err(McUsdError::ZeroAmount);
        }
        let recovery = ctx.is_recovery_mode()?;
        validate_max_fee(max_fee, params.borrowing_fee_floor, recovery)?;

        // 2. Borrowing fee (waived in recovery mode)
        let fee = if recovery {
            0
        } else {
            Self::trigger_borrowing_fee(ctx, debt_amount, max_fee)?
        };

        // 3. Minimum net debt
        let net_debt = safe_add(debt_amount, fee)?;
        if net_debt < params.min_net_debt {
            return Err(McUsdError::BelowMinimumNetDebt {
                amount: net_debt,
                minimum: params.min_net_debt,
            });
        }
        let composite_debt = safe_add(net_debt, params.liquidation_reserve)?;

        // 4. Take collateral in, measuring what arrived
        let received = ctx.pull_collateral(&owner, collateral)?;
        let value = ctx.basket_value(&received)?;
        let aicr = compute_cr(value.weighted, composite_debt)?;

        // 5. Collateral requirements
        if recovery {
            if aicr < params.ccr {
                return Err(McUsdError::Undercollateralized {
                    current_ratio: aicr,
                    required_ratio: params.ccr,
                });
            }
        } else {
            if aicr < params.mcr {
                return Err(McUsdError::Undercollateralized {
                    current_ratio: aicr,
                    required_ratio: params.mcr,
                });
            }
            let current_tcr = ctx.tcr()?;
            let new_tcr = ctx.state.tcr_after(
                &mut ctx.prices,
                &received,
                &CollateralAmounts::new(),
                composite_debt,
                0,
            )?;
            if new_tcr < params.ccr {
                return Err(McUsdError::WouldWorsenTcr { current_tcr, new_tcr });
            }
        }

        // 6. Commit
        let id = derive_trove_id(&owner, ctx.state.nonce);
        ctx.state.nonce += 1;
        let mut trove = Trove::new(id, owner, now);
        trove.collateral = received.clone();
        trove.debt = composite_debt;
        ctx.state.troves.open(trove)?;
        ctx.state.index.insert(id, risk_score(aicr), hint_prev, hint_next)?;

        // 7. Effects
        ctx.mint_stablecoin(owner, debt_amount)?;
        ctx.mint_stablecoin(accounts::GAS_POOL, params.liquidation_reserve)?;
        ctx.mint_stablecoin(accounts::FEE_RECIPIENT, fee)?;

        log::debug!("trove opened {:02x?} debt {}", &id[..4], composite_debt);
        ctx.events.emit(McUsdEvent::TroveOpened {
            trove_id: id,
            owner,
            collateral: received,
            debt: composite_debt,
            fee,
            timestamp: now,
        });
        Ok(id)
    }

    /// Add or withdraw collateral and borrow or repay, in one step
    #[allow(clippy::too_many_arguments)]
    pub fn adjust_trove<F, L>(
        ctx: &mut TxContext<'_, F, L>,
        caller: Address,
        trove_id: TroveId,
        coll_in: &CollateralAmounts,
        coll_out: &CollateralAmounts,
        debt_change: DebtChange,
        max_fee: u128,
        hints: (Option<TroveId>, Option<TroveId>),
    ) -> McUsdResult<()>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let params = ctx.state.params.clone();
        let now = ctx.now;

        // 1. Caller must own an active trove
        let trove = ctx.state.troves.get_active(&trove_id)?;
        if trove.owner != caller {
            return Err(McUsdError::Unauthorized {
                expected: trove.owner,
                actual: caller,
            });
        }
        let no_coll_change = coll_in.values().all(|a| *a == 0) && coll_out.values().all(|a| *a == 0);
        let no_debt_change = matches!(
            debt_change,
            DebtChange::None | DebtChange::Borrow(0) | DebtChange::Repay(0)
        );
        if no_coll_change && no_debt_change {
            return Err(McUsdError::ZeroAmount);
        }

        let recovery = ctx.is_recovery_mode()?;
        if recovery && !coll_out.values().all(|a| *a == 0) {
            return Err(McUsdError::RecoveryModeRestriction {
                operation: RecoveryModeOp::WithdrawCollateral,
            });
        }

        // 2. Bring the trove up to date
        ctx.apply_pending(&trove_id)?;
        let old_aicr = ctx.current_aicr(&trove_id)?;
        let trove = ctx.state.troves.get_active(&trove_id)?;
        let old_debt = trove.debt;
        for (asset, amount) in coll_out {
            let available = trove.collateral_of(asset);
            if available < *amount {
                return Err(McUsdError::InsufficientCollateral {
                    asset: *asset,
                    available,
                    requested: *amount,
                });
            }
        }

        // 3. Debt change
        let (debt_in, debt_out, fee) = match debt_change {
            DebtChange::Borrow(amount) if amount > 0 => {
                validate_max_fee(max_fee, params.borrowing_fee_floor, recovery)?;
                let fee = if recovery {
                    0
                } else {
                    Self::trigger_borrowing_fee(ctx, amount, max_fee)?
                };
                (safe_add(amount, fee)?, 0, fee)
            }
            DebtChange::Repay(amount) if amount > 0 => {
                let net_debt = old_debt.saturating_sub(params.liquidation_reserve);
                if amount > net_debt {
                    return Err(McUsdError::InvalidAmount {
                        amount,
                        reason: AmountErrorReason::TooLarge,
                    });
                }
                let balance = ctx.ledger.balance_of(&accounts::STABLECOIN, &caller);
                if balance < amount {
                    return Err(McUsdError::InsufficientBalance {
                        available: balance,
                        requested: amount,
                    });
                }
                (0, amount, 0)
            }
            _ => (0, 0, 0),
        };
        let new_debt = safe_add(old_debt, debt_in)?
            .checked_sub(debt_out)
            .ok_or(McUsdError::Underflow)?;
        let new_net_debt = new_debt.saturating_sub(params.liquidation_reserve);
        if new_net_debt < params.min_net_debt {
            return Err(McUsdError::BelowMinimumNetDebt {
                amount: new_net_debt,
                minimum: params.min_net_debt,
            });
        }

        // 4. Collateral in
        let received = if coll_in.values().any(|a| *a > 0) {
            let requested: CollateralAmounts = coll_in
                .iter()
                .filter(|(_, a)| **a > 0)
                .map(|(k, v)| (*k, *v))
                .collect();
            ctx.pull_collateral(&caller, &requested)?
        } else {
            CollateralAmounts::new()
        };

        // 5. Resulting ratio
        let mut new_coll = ctx.state.troves.get_active(&trove_id)?.collateral.clone();
        crate::trove::add_basket(&mut new_coll, &received)?;
        crate::trove::sub_basket(&mut new_coll, coll_out, "trove collateral underflow")?;
        let value = ctx.basket_value(&new_coll)?;
        let new_aicr = compute_cr(value.weighted, new_debt)?;

        if recovery {
            if new_aicr < old_aicr {
                return Err(McUsdError::RecoveryModeRestriction {
                    operation: RecoveryModeOp::DecreaseRatio,
                });
            }
            if debt_in > 0 && new_aicr < params.ccr {
                return Err(McUsdError::Undercollateralized {
                    current_ratio: new_aicr,
                    required_ratio: params.ccr,
                });
            }
        } else {
            if new_aicr < params.mcr {
                return Err(McUsdError::Undercollateralized {
                    current_ratio: new_aicr,
                    required_ratio: params.mcr,
                });
            }
            let current_tcr = ctx.tcr()?;
            let new_tcr = ctx
                .state
                .tcr_after(&mut ctx.prices, &received, coll_out, debt_in, debt_out)?;
            if new_tcr < params.ccr {
                return Err(McUsdError::WouldWorsenTcr { current_tcr, new_tcr });
            }
        }

        // 6. Commit
        let troves = &mut ctx.state.troves;
        troves.add_collateral(&trove_id, &received, now)?;
        troves.remove_collateral(&trove_id, coll_out, now)?;
        troves.increase_debt(&trove_id, debt_in, now)?;
        troves.decrease_debt(&trove_id, debt_out, now)?;
        troves.update_stakes(&trove_id)?;
        ctx.state
            .index
            .reinsert(trove_id, risk_score(new_aicr), hints.0, hints.1)?;

        // 7. Effects
        ctx.transfer_basket(accounts::ACTIVE_POOL, caller, coll_out);
        if debt_in > 0 {
            ctx.mint_stablecoin(caller, debt_in - fee)?;
            ctx.mint_stablecoin(accounts::FEE_RECIPIENT, fee)?;
        }
        ctx.burn_stablecoin(caller, debt_out)?;

        ctx.events.emit(McUsdEvent::TroveAdjusted {
            trove_id,
            collateral: new_coll,
            debt: new_debt,
            fee,
            timestamp: now,
        });
        Ok(())
    }

    /// Repay everything and take the collateral back
    pub fn close_trove<F, L>(ctx: &mut TxContext<'_, F, L>, caller: Address, trove_id: TroveId) -> McUsdResult<()>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let params = ctx.state.params.clone();
        let now = ctx.now;

        // 1. Owner of an active trove, not the last one
        let trove = ctx.state.troves.get_active(&trove_id)?;
        if trove.owner != caller {
            return Err(McUsdError::Unauthorized {
                expected: trove.owner,
                actual: caller,
            });
        }
        if ctx.state.troves.active_count() <= 1 {
            return Err(McUsdError::OnlyOneTroveInSystem);
        }
        if ctx.is_recovery_mode()? {
            return Err(McUsdError::RecoveryModeRestriction {
                operation: RecoveryModeOp::CloseTrove,
            });
        }

        // 2. Bring the trove up to date and check the system after removal
        ctx.apply_pending(&trove_id)?;
        let trove = ctx.state.troves.get_active(&trove_id)?.clone();
        let current_tcr = ctx.tcr()?;
        let new_tcr = ctx.state.tcr_after(
            &mut ctx.prices,
            &CollateralAmounts::new(),
            &trove.collateral,
            0,
            trove.debt,
        )?;
        if new_tcr < params.ccr {
            return Err(McUsdError::WouldWorsenTcr { current_tcr, new_tcr });
        }

        let reserve = params.liquidation_reserve.min(trove.debt);
        let repay = trove.debt - reserve;
        let balance = ctx.ledger.balance_of(&accounts::STABLECOIN, &caller);
        if balance < repay {
            return Err(McUsdError::InsufficientBalance {
                available: balance,
                requested: repay,
            });
        }

        // 3. Commit
        ctx.state.index.remove(&trove_id)?;
        let closed = ctx.state.troves.close(&trove_id, TroveStatus::ClosedByOwner, now)?;

        // 4. Effects
        ctx.burn_stablecoin(caller, repay)?;
        ctx.burn_stablecoin(accounts::GAS_POOL, reserve)?;
        ctx.transfer_basket(accounts::ACTIVE_POOL, caller, &closed.collateral);

        ctx.events.emit(McUsdEvent::TroveClosed {
            trove_id,
            owner: caller,
            collateral_returned: closed.collateral,
            debt_repaid: closed.debt,
            timestamp: now,
        });
        Ok(())
    }

    /// Withdraw collateral surplus owed to `owner`
    pub fn claim_collateral<F, L>(ctx: &mut TxContext<'_, F, L>, owner: Address) -> McUsdResult<CollateralAmounts>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let owed = ctx.state.surplus.claim(owner, ctx.now, &mut ctx.events)?;
        ctx.transfer_basket(accounts::COLL_SURPLUS_POOL, owner, &owed);
        Ok(owed)
    }

    /// Decay the base rate and charge the borrowing fee on `amount`
    fn trigger_borrowing_fee<F, L>(ctx: &mut TxContext<'_, F, L>, amount: u128, max_fee: u128) -> McUsdResult<u128>
    where
        F: PriceFeed + ?Sized,
        L: TokenLedger,
    {
        let params = &ctx.state.params;
        let base_rate = ctx.state.fees.decay_from_borrowing(params, ctx.now)?;
        let rate = FeeState::borrowing_rate(params, base_rate)?;
        if rate > max_fee {
            return Err(McUsdError::MaxFeeExceeded {
                fee_rate: rate,
                max_fee,
            });
        }
        apply_rate(amount, rate)
    }
}

/// Max fee must be at most 100%, and at least the floor outside recovery mode
fn validate_max_fee(max_fee: u128, floor: u128, recovery: bool) -> McUsdResult<()> {
    let min = if recovery { 0 } else { floor };
    if max_fee < min || max_fee > DECIMAL_PRECISION {
        return Err(McUsdError::InvalidMaxFee { max_fee });
    }
    Ok(())
}
