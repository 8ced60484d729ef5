//! Protocol Facade
//!
//! [`Protocol`] owns the live [`SystemState`], the token ledger and the price
//! feed, and is the only way callers mutate them. Every mutating entry point
//! runs through [`Protocol::execute`]:
//!
//! 1. Clone state and ledger into a [`TxContext`]
//! 2. Run the operation against the working copies
//! 3. Apply queued token effects
//! 4. Swap the working copies in and keep the emitted events
//!
//! Any error along the way drops the working copies, so the live state is
//! never partially updated.

use mcusd_common::{
    collateral::CollateralAsset,
    config::ProtocolParams,
    errors::{McUsdError, McUsdResult},
    events::{EventLog, McUsdEvent},
    oracle::PriceFeed,
    token_ops::TokenLedger,
    types::{accounts, Address, AssetId, CollateralAmounts, EntireTrove, PendingRewards, Trove, TroveId},
    Vec,
};
use mcusd_stability_pool::DepositChange;

use crate::borrower_ops::{BorrowerOperations, DebtChange};
use crate::context::{risk_score, PriceCache, SystemState, TxContext};
use crate::liquidation::{LiquidationEngine, LiquidationPlan};
use crate::redemption::{RedemptionEngine, RedemptionOutcome};

/// Live protocol instance
pub struct Protocol<F: PriceFeed, L: TokenLedger + Clone> {
    state: SystemState,
    ledger: L,
    feed: F,
    now: u64,
    events: EventLog,
}

impl<F: PriceFeed, L: TokenLedger + Clone> Protocol<F, L> {
    pub fn new(admin: Address, params: ProtocolParams, feed: F, ledger: L) -> McUsdResult<Self> {
        params.validate()?;
        Ok(Self {
            state: SystemState::new(admin, params),
            ledger,
            feed,
            now: 0,
            events: EventLog::new(),
        })
    }

    // ============ Environment ============

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn set_time(&mut self, now: u64) {
        self.now = now;
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.now = self.now.saturating_add(seconds);
    }

    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access, for funding accounts outside the protocol
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Drain the events emitted so far
    pub fn take_events(&mut self) -> EventLog {
        core::mem::take(&mut self.events)
    }

    // ============ Transactions ============

    /// Run `op` atomically against working copies of state and ledger
    pub fn execute<T>(
        &mut self,
        op: impl FnOnce(&mut TxContext<'_, F, L>) -> McUsdResult<T>,
    ) -> McUsdResult<T> {
        let mut ctx = TxContext::new(self.state.clone(), self.ledger.clone(), &self.feed, self.now);
        let result = op(&mut ctx);
        let out = match result {
            Ok(out) => out,
            Err(err) => {
                log::debug!("transaction rolled back: {}", err);
                return Err(err);
            }
        };
        let (state, ledger, events) = ctx.finish()?;
        self.state = state;
        self.ledger = ledger;
        self.events.extend(events);
        Ok(out)
    }

    // ============ Governance ============

    fn only_admin(&self, caller: &Address) -> McUsdResult<()> {
        if *caller != self.state.admin {
            return Err(McUsdError::AdminOnly);
        }
        Ok(())
    }

    /// Onboard a collateral asset
    pub fn add_collateral(&mut self, caller: Address, asset: CollateralAsset) -> McUsdResult<()> {
        self.only_admin(&caller)?;
        let (id, decimals, safety_ratio) = (asset.id, asset.decimals, asset.safety_ratio);
        self.state.registry.add_asset(asset)?;
        self.events.emit(McUsdEvent::CollateralRegistered {
            asset: id,
            decimals,
            safety_ratio,
            timestamp: self.now,
        });
        Ok(())
    }

    /// Change an asset's risk weight and re-key every trove holding it in
    /// the sorted index, in the same call
    pub fn set_safety_ratio(&mut self, caller: Address, asset: AssetId, ratio: u128) -> McUsdResult<()> {
        self.only_admin(&caller)?;
        self.execute(|ctx| {
            let old_ratio = ctx.state.registry.set_safety_ratio(&asset, ratio)?;
            let moved = ctx.rescore_all(Some(&asset))?;
            log::info!("safety ratio updated, {} troves re-keyed", moved);
            ctx.events.emit(McUsdEvent::SafetyRatioUpdated {
                asset,
                old_ratio,
                new_ratio: ratio,
                timestamp: ctx.now,
            });
            Ok(())
        })
    }

    /// Deprecated assets are withdraw-only
    pub fn set_collateral_active(&mut self, caller: Address, asset: AssetId, active: bool) -> McUsdResult<()> {
        self.only_admin(&caller)?;
        self.state.registry.set_active(&asset, active)?;
        self.events.emit(McUsdEvent::CollateralActivationChanged {
            asset,
            active,
            timestamp: self.now,
        });
        Ok(())
    }

    /// Replace protocol parameters. The version is bumped regardless of the
    /// value passed in.
    pub fn set_params(&mut self, caller: Address, mut params: ProtocolParams) -> McUsdResult<()> {
        self.only_admin(&caller)?;
        params.validate()?;
        if params.liquidation_reserve != self.state.params.liquidation_reserve && self.state.troves.active_count() > 0 {
            return Err(McUsdError::InvalidParameter {
                param: "liquidation_reserve",
                reason: "cannot change while troves are open",
            });
        }
        params.version = self.state.params.version + 1;
        let version = params.version;
        self.state.params = params;

        log::info!("protocol params updated to version {}", version);
        self.events.emit(McUsdEvent::ParamsUpdated {
            version,
            timestamp: self.now,
        });
        Ok(())
    }

    // ============ Troves ============

    pub fn open_trove(
        &mut self,
        owner: Address,
        collateral: &CollateralAmounts,
        debt: u128,
        max_fee: u128,
        hint_prev: Option<TroveId>,
        hint_next: Option<TroveId>,
    ) -> McUsdResult<TroveId> {
        self.execute(|ctx| {
            BorrowerOperations::open_trove(ctx, owner, collateral, debt, max_fee, hint_prev, hint_next)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn adjust_trove(
        &mut self,
        caller: Address,
        trove_id: TroveId,
        coll_in: &CollateralAmounts,
        coll_out: &CollateralAmounts,
        debt_change: DebtChange,
        max_fee: u128,
        hints: (Option<TroveId>, Option<TroveId>),
    ) -> McUsdResult<()> {
        self.execute(|ctx| {
            BorrowerOperations::adjust_trove(ctx, caller, trove_id, coll_in, coll_out, debt_change, max_fee, hints)
        })
    }

    pub fn close_trove(&mut self, caller: Address, trove_id: TroveId) -> McUsdResult<()> {
        self.execute(|ctx| BorrowerOperations::close_trove(ctx, caller, trove_id))
    }

    /// Claim collateral surplus from a liquidated or redeemed trove
    pub fn claim_collateral(&mut self, owner: Address) -> McUsdResult<CollateralAmounts> {
        self.execute(|ctx| BorrowerOperations::claim_collateral(ctx, owner))
    }

    // ============ Liquidation / Redemption ============

    pub fn liquidate(&mut self, liquidator: Address, trove_id: TroveId) -> McUsdResult<LiquidationPlan> {
        self.execute(|ctx| LiquidationEngine::liquidate(ctx, liquidator, trove_id))
    }

    pub fn liquidate_troves(&mut self, liquidator: Address, n: usize) -> McUsdResult<Vec<LiquidationPlan>> {
        self.execute(|ctx| LiquidationEngine::liquidate_troves(ctx, liquidator, n))
    }

    pub fn batch_liquidate(&mut self, liquidator: Address, ids: &[TroveId]) -> McUsdResult<Vec<LiquidationPlan>> {
        self.execute(|ctx| LiquidationEngine::batch_liquidate(ctx, liquidator, ids))
    }

    /// Re-key troves whose AICR drifted with prices since their last touch.
    /// Open to anyone; ids that are not indexed are ignored. Returns how
    /// many troves moved.
    pub fn update_troves(&mut self, ids: &[TroveId]) -> McUsdResult<usize> {
        self.execute(|ctx| ctx.rescore(ids))
    }

    pub fn redeem(
        &mut self,
        redeemer: Address,
        amount: u128,
        max_fee: u128,
        max_iterations: usize,
        first_hint: Option<TroveId>,
    ) -> McUsdResult<RedemptionOutcome> {
        self.execute(|ctx| RedemptionEngine::redeem(ctx, redeemer, amount, max_fee, max_iterations, first_hint))
    }

    // ============ Stability Pool ============

    /// Deposit stablecoin; pending gains are paid out first
    pub fn provide_to_sp(&mut self, depositor: Address, amount: u128) -> McUsdResult<DepositChange> {
        self.execute(|ctx| {
            if amount == 0 {
                return Err(McUsdError::ZeroAmount);
            }
            let received = ctx.pull(&accounts::STABLECOIN, &depositor, &accounts::STABILITY_POOL, amount)?;
            let change = ctx
                .state
                .stability_pool
                .provide(depositor, received, ctx.now, &mut ctx.events)?;
            ctx.transfer_basket(accounts::STABILITY_POOL, depositor, &change.gains);
            Ok(change)
        })
    }

    /// Withdraw up to `amount` (`u128::MAX` for everything).
    ///
    /// Blocked while any active trove is below MCR, unless `amount` is zero.
    pub fn withdraw_from_sp(&mut self, depositor: Address, amount: u128) -> McUsdResult<DepositChange> {
        self.execute(|ctx| {
            if amount > 0 && Self::has_undercollateralized_trove(ctx)? {
                return Err(McUsdError::WithdrawalBlocked);
            }
            let change = ctx
                .state
                .stability_pool
                .withdraw(depositor, amount, ctx.now, &mut ctx.events)?;
            ctx.transfer(accounts::STABLECOIN, accounts::STABILITY_POOL, depositor, change.amount);
            ctx.transfer_basket(accounts::STABILITY_POOL, depositor, &change.gains);
            Ok(change)
        })
    }

    pub fn claim_sp_gains(&mut self, depositor: Address) -> McUsdResult<CollateralAmounts> {
        self.execute(|ctx| {
            let gains = ctx
                .state
                .stability_pool
                .claim_gains(depositor, ctx.now, &mut ctx.events)?;
            ctx.transfer_basket(accounts::STABILITY_POOL, depositor, &gains);
            Ok(gains)
        })
    }

    fn has_undercollateralized_trove(ctx: &mut TxContext<'_, F, L>) -> McUsdResult<bool> {
        let mcr = ctx.state.params.mcr;
        let ids: Vec<TroveId> = ctx.state.troves.active_troves().map(|t| t.id).collect();
        for id in ids {
            if ctx.current_aicr(&id)? < mcr {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ============ Queries ============

    fn prices(&self) -> PriceCache<'_, F> {
        PriceCache::new(&self.feed, self.now, self.state.params.max_price_age)
    }

    pub fn get_trove(&self, trove_id: &TroveId) -> McUsdResult<&Trove> {
        self.state.troves.get(trove_id)
    }

    /// Trove position with pending rewards applied
    pub fn get_entire_trove(&self, trove_id: &TroveId) -> McUsdResult<EntireTrove> {
        self.state.troves.entire_trove(trove_id)
    }

    pub fn get_current_icr(&self, trove_id: &TroveId) -> McUsdResult<u128> {
        self.state.current_icr(&mut self.prices(), trove_id)
    }

    pub fn get_current_aicr(&self, trove_id: &TroveId) -> McUsdResult<u128> {
        self.state.current_aicr(&mut self.prices(), trove_id)
    }

    pub fn get_tcr(&self) -> McUsdResult<u128> {
        self.state.tcr(&mut self.prices())
    }

    pub fn is_recovery_mode(&self) -> McUsdResult<bool> {
        self.state.is_recovery_mode(&mut self.prices())
    }

    pub fn get_redemption_fee_rate(&self) -> McUsdResult<u128> {
        self.state
            .fees
            .redemption_rate_with_decay(&self.state.params, self.now)
    }

    pub fn get_borrowing_fee_rate(&self) -> McUsdResult<u128> {
        self.state
            .fees
            .borrowing_rate_with_decay(&self.state.params, self.now)
    }

    pub fn get_entire_system_coll(&self) -> McUsdResult<CollateralAmounts> {
        self.state.troves.entire_system_coll()
    }

    pub fn get_entire_system_debt(&self) -> McUsdResult<u128> {
        self.state.troves.entire_system_debt()
    }

    pub fn get_depositor_gains(&self, depositor: &Address) -> McUsdResult<CollateralAmounts> {
        self.state.stability_pool.depositor_gains(depositor)
    }

    pub fn get_compounded_deposit(&self, depositor: &Address) -> McUsdResult<u128> {
        self.state.stability_pool.compounded_deposit(depositor)
    }

    pub fn get_pending_rewards(&self, trove_id: &TroveId) -> McUsdResult<PendingRewards> {
        self.state.troves.pending_rewards(trove_id)
    }

    pub fn get_surplus(&self, owner: &Address) -> CollateralAmounts {
        self.state.surplus.get(owner)
    }

    /// Neighbours to pass as hints for a trove at `aicr`
    pub fn get_insert_hints(&self, aicr: u128) -> (Option<TroveId>, Option<TroveId>) {
        self.state.index.find_insert_position(risk_score(aicr))
    }

    /// Cross-check internal accounting against the ledger
    pub fn check_invariants(&self) -> McUsdResult<()> {
        self.state.check_invariants(&self.ledger)
    }
}
