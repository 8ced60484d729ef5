//! System State and Transaction Context
//!
//! [`SystemState`] is the single aggregate every engine reads and writes.
//! A [`TxContext`] wraps a working copy of it together with a working copy
//! of the token ledger:
//!
//! 1. **Compute/commit**: engines validate and update the working state.
//!    Inbound transfers (collateral and stablecoin pulled from users) run
//!    immediately so the received amount can be measured.
//! 2. **Effects**: outbound transfers, mints and burns are queued as
//!    [`Effect`]s and only run in [`TxContext::finish`], after all internal
//!    accounting is final.
//!
//! The caller swaps the working copies in only when `finish` succeeds, so a
//! failed call leaves no trace.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use mcusd_common::{
    collateral::{BasketValue, CollateralRegistry, PriceSnapshot},
    config::ProtocolParams,
    errors::{McUsdError, McUsdResult},
    events::{EventLog, McUsdEvent},
    math::{compute_cr, is_recovery_mode, safe_add},
    oracle::PriceFeed,
    token_ops::{pull_measured, Effect, TokenLedger},
    types::{accounts, Address, AssetId, CollateralAmounts, PendingRewards, TroveId},
    Vec,
};
use mcusd_stability_pool::StabilityPoolLedger;

use crate::fees::FeeState;
use crate::sorted_troves::SortedTroveIndex;
use crate::surplus::CollateralSurplus;
use crate::trove::{add_basket, sub_basket, TroveLedger};

// ============ Supply Tracking ============

/// Stablecoin issued and destroyed by the protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SupplyCounters {
    pub total_minted: u128,
    pub total_burned: u128,
    /// Portion of `total_burned` cancelled against the Stability Pool
    pub total_debt_offset: u128,
}

impl SupplyCounters {
    /// Minted minus burned
    pub fn outstanding(&self) -> McUsdResult<u128> {
        self.total_minted
            .checked_sub(self.total_burned)
            .ok_or(McUsdError::InvariantViolation {
                context: "more stablecoin burned than minted",
            })
    }
}

// ============ System State ============

/// Aggregate protocol state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SystemState {
    pub params: ProtocolParams,
    pub registry: CollateralRegistry,
    pub troves: TroveLedger,
    pub index: SortedTroveIndex,
    pub stability_pool: StabilityPoolLedger,
    pub surplus: CollateralSurplus,
    pub fees: FeeState,
    pub supply: SupplyCounters,
    pub admin: Address,
    /// Feeds trove id derivation
    pub nonce: u64,
}

impl SystemState {
    pub fn new(admin: Address, params: ProtocolParams) -> Self {
        Self {
            params,
            registry: CollateralRegistry::new(),
            troves: TroveLedger::new(),
            index: SortedTroveIndex::new(),
            stability_pool: StabilityPoolLedger::new(),
            surplus: CollateralSurplus::new(),
            fees: FeeState::default(),
            supply: SupplyCounters::default(),
            admin,
            nonce: 0,
        }
    }

    /// Value and debt of a trove including pending rewards
    pub fn trove_value<F: PriceFeed + ?Sized>(
        &self,
        prices: &mut PriceCache<'_, F>,
        id: &TroveId,
    ) -> McUsdResult<(BasketValue, u128)> {
        let entire = self.troves.entire_trove(id)?;
        let value = prices.basket_value(&self.registry, &entire.collateral)?;
        Ok((value, entire.debt))
    }

    /// Unweighted collateral ratio including pending rewards
    pub fn current_icr<F: PriceFeed + ?Sized>(
        &self,
        prices: &mut PriceCache<'_, F>,
        id: &TroveId,
    ) -> McUsdResult<u128> {
        let (value, debt) = self.trove_value(prices, id)?;
        compute_cr(value.value, debt)
    }

    /// Safety-ratio-weighted collateral ratio including pending rewards
    pub fn current_aicr<F: PriceFeed + ?Sized>(
        &self,
        prices: &mut PriceCache<'_, F>,
        id: &TroveId,
    ) -> McUsdResult<u128> {
        let (value, debt) = self.trove_value(prices, id)?;
        compute_cr(value.weighted, debt)
    }

    /// Weighted ratio of an arbitrary system-wide basket and debt
    pub fn tcr_with<F: PriceFeed + ?Sized>(
        &self,
        prices: &mut PriceCache<'_, F>,
        coll: &CollateralAmounts,
        debt: u128,
    ) -> McUsdResult<u128> {
        let value = prices.basket_value(&self.registry, coll)?;
        compute_cr(value.weighted, debt)
    }

    /// Total collateral ratio over active and default pools
    pub fn tcr<F: PriceFeed + ?Sized>(&self, prices: &mut PriceCache<'_, F>) -> McUsdResult<u128> {
        let coll = self.troves.entire_system_coll()?;
        let debt = self.troves.entire_system_debt()?;
        self.tcr_with(prices, &coll, debt)
    }

    /// TCR after adding and removing collateral and debt
    pub fn tcr_after<F: PriceFeed + ?Sized>(
        &self,
        prices: &mut PriceCache<'_, F>,
        coll_in: &CollateralAmounts,
        coll_out: &CollateralAmounts,
        debt_in: u128,
        debt_out: u128,
    ) -> McUsdResult<u128> {
        let mut coll = self.troves.entire_system_coll()?;
        add_basket(&mut coll, coll_in)?;
        sub_basket(&mut coll, coll_out, "system collateral underflow")?;
        let debt = safe_add(self.troves.entire_system_debt()?, debt_in)?
            .checked_sub(debt_out)
            .ok_or(McUsdError::InvariantViolation {
                context: "system debt underflow",
            })?;
        self.tcr_with(prices, &coll, debt)
    }

    pub fn is_recovery_mode<F: PriceFeed + ?Sized>(&self, prices: &mut PriceCache<'_, F>) -> McUsdResult<bool> {
        Ok(is_recovery_mode(self.tcr(prices)?, self.params.ccr))
    }

    /// Cross-check internal accounting against itself and the token ledger
    pub fn check_invariants<L: TokenLedger + ?Sized>(&self, ledger: &L) -> McUsdResult<()> {
        let fail = |context: &'static str| Err(McUsdError::InvariantViolation { context });

        // Index holds exactly the active troves, in linked order
        let linked = self.index.walk_from_tail();
        let ordered: Vec<TroveId> = self.index.iter_from_tail().copied().collect();
        if linked != ordered {
            return fail("sorted index links disagree with ordering");
        }
        if linked.len() != self.troves.active_count()
            || linked.iter().any(|id| self.troves.get_active(id).is_err())
        {
            return fail("sorted index does not match active troves");
        }

        // Active pool equals the sum of recorded trove positions
        let mut coll = CollateralAmounts::new();
        let mut debt = 0u128;
        for trove in self.troves.active_troves() {
            add_basket(&mut coll, &trove.collateral)?;
            debt = safe_add(debt, trove.debt)?;
        }
        let active = self.troves.active_pool();
        if coll != active.collateral || debt != active.debt {
            return fail("active pool differs from trove positions");
        }

        // Token accounts mirror internal balances
        for asset in self.registry.assets() {
            let checks: [(&Address, u128); 4] = [
                (&accounts::ACTIVE_POOL, active.collateral_of(&asset)),
                (&accounts::DEFAULT_POOL, self.troves.default_pool().collateral_of(&asset)),
                (&accounts::STABILITY_POOL, self.stability_pool.collateral_balance(&asset)),
                (
                    &accounts::COLL_SURPLUS_POOL,
                    self.surplus.total().get(&asset).copied().unwrap_or(0),
                ),
            ];
            for (account, expected) in checks {
                if ledger.balance_of(&asset, account) != expected {
                    return fail("collateral account balance mismatch");
                }
            }
        }

        let stablecoin = &accounts::STABLECOIN;
        if ledger.balance_of(stablecoin, &accounts::STABILITY_POOL) != self.stability_pool.total_deposits() {
            return fail("stability pool stablecoin mismatch");
        }
        let reserves = self
            .params
            .liquidation_reserve
            .checked_mul(self.troves.active_count() as u128)
            .ok_or(McUsdError::Overflow)?;
        if ledger.balance_of(stablecoin, &accounts::GAS_POOL) != reserves {
            return fail("gas pool does not hold one reserve per trove");
        }

        // Conservation: debt outstanding equals stablecoin outstanding
        let system_debt = self.troves.entire_system_debt()?;
        if self.supply.outstanding()? != system_debt {
            return fail("system debt differs from minted minus burned");
        }
        Ok(())
    }
}

/// Index key for an AICR; keeps scores inside the accepted range
pub fn risk_score(aicr: u128) -> u128 {
    aicr.clamp(1, u128::MAX - 1)
}

// ============ Price Cache ============

/// Validated prices fetched at most once per asset per transaction
pub struct PriceCache<'a, F: PriceFeed + ?Sized> {
    feed: &'a F,
    now: u64,
    max_age: u64,
    prices: PriceSnapshot,
}

impl<'a, F: PriceFeed + ?Sized> PriceCache<'a, F> {
    pub fn new(feed: &'a F, now: u64, max_age: u64) -> Self {
        Self {
            feed,
            now,
            max_age,
            prices: PriceSnapshot::new(),
        }
    }

    pub fn price(&mut self, registry: &CollateralRegistry, asset: &AssetId) -> McUsdResult<u64> {
        if let Some(price) = self.prices.get(asset) {
            return Ok(*price);
        }
        let price = registry.price_of(self.feed, asset, self.now, self.max_age)?;
        self.prices.insert(*asset, price);
        Ok(price)
    }

    /// Resolve prices for every non-zero asset of a basket
    pub fn load(&mut self, registry: &CollateralRegistry, basket: &CollateralAmounts) -> McUsdResult<()> {
        for (asset, amount) in basket {
            if *amount > 0 {
                self.price(registry, asset)?;
            }
        }
        Ok(())
    }

    pub fn basket_value(
        &mut self,
        registry: &CollateralRegistry,
        basket: &CollateralAmounts,
    ) -> McUsdResult<BasketValue> {
        self.load(registry, basket)?;
        registry.basket_value(basket, &self.prices)
    }

    pub fn snapshot(&self) -> &PriceSnapshot {
        &self.prices
    }
}

// ============ Transaction Context ============

/// Working copies of state and ledger for one call
pub struct TxContext<'a, F: PriceFeed + ?Sized, L: TokenLedger> {
    pub state: SystemState,
    pub ledger: L,
    pub prices: PriceCache<'a, F>,
    pub events: EventLog,
    pub now: u64,
    effects: Vec<Effect>,
}

impl<'a, F: PriceFeed + ?Sized, L: TokenLedger> TxContext<'a, F, L> {
    pub fn new(state: SystemState, ledger: L, feed: &'a F, now: u64) -> Self {
        let max_age = state.params.max_price_age;
        Self {
            state,
            ledger,
            prices: PriceCache::new(feed, now, max_age),
            events: EventLog::new(),
            now,
            effects: Vec::new(),
        }
    }

    pub fn tcr(&mut self) -> McUsdResult<u128> {
        self.state.tcr(&mut self.prices)
    }

    pub fn is_recovery_mode(&mut self) -> McUsdResult<bool> {
        self.state.is_recovery_mode(&mut self.prices)
    }

    pub fn current_aicr(&mut self, id: &TroveId) -> McUsdResult<u128> {
        self.state.current_aicr(&mut self.prices, id)
    }

    pub fn basket_value(&mut self, basket: &CollateralAmounts) -> McUsdResult<BasketValue> {
        self.prices.basket_value(&self.state.registry, basket)
    }

    // ============ Index Upkeep ============

    /// Re-key troves at their current AICR, skipping ids that are not in
    /// the index. Returns how many were moved.
    pub fn rescore(&mut self, ids: &[TroveId]) -> McUsdResult<usize> {
        let mut moved = 0;
        for id in ids.iter() {
            if !self.state.index.contains(id) {
                continue;
            }
            let score = risk_score(self.current_aicr(id)?);
            if self.state.index.score(id) != Some(score) {
                self.state.index.reinsert(*id, score, None, None)?;
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Re-key every indexed trove, or with `holding` only those whose
    /// collateral (pending rewards included) contains that asset
    pub fn rescore_all(&mut self, holding: Option<&AssetId>) -> McUsdResult<usize> {
        let mut ids = Vec::new();
        for id in self.state.index.iter_from_tail() {
            let include = match holding {
                Some(asset) => self
                    .state
                    .troves
                    .entire_trove(id)?
                    .collateral
                    .get(asset)
                    .is_some_and(|amount| *amount > 0),
                None => true,
            };
            if include {
                ids.push(*id);
            }
        }
        self.rescore(&ids)
    }

    // ============ Inbound ============

    /// Pull tokens now and return what actually arrived
    pub fn pull(&mut self, token: &AssetId, from: &Address, to: &Address, amount: u128) -> McUsdResult<u128> {
        pull_measured(&mut self.ledger, token, from, to, amount)
    }

    /// Pull a collateral basket into the active pool, measuring each asset
    pub fn pull_collateral(&mut self, from: &Address, requested: &CollateralAmounts) -> McUsdResult<CollateralAmounts> {
        let mut received = CollateralAmounts::new();
        for (asset, amount) in requested {
            if *amount == 0 {
                return Err(McUsdError::ZeroAmount);
            }
            self.state.registry.get_depositable(asset)?;
            let arrived = self.pull(asset, from, &accounts::ACTIVE_POOL, *amount)?;
            if arrived == 0 {
                return Err(McUsdError::TransferFailed {
                    token: *asset,
                    from: *from,
                    to: accounts::ACTIVE_POOL,
                    amount: *amount,
                });
            }
            received.insert(*asset, arrived);
        }
        Ok(received)
    }

    // ============ Outbound (deferred) ============

    pub fn transfer(&mut self, token: AssetId, from: Address, to: Address, amount: u128) {
        if amount > 0 {
            self.effects.push(Effect::Transfer { token, from, to, amount });
        }
    }

    pub fn transfer_basket(&mut self, from: Address, to: Address, basket: &CollateralAmounts) {
        for (asset, amount) in basket {
            self.transfer(*asset, from, to, *amount);
        }
    }

    pub fn mint_stablecoin(&mut self, to: Address, amount: u128) -> McUsdResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.state.supply.total_minted = safe_add(self.state.supply.total_minted, amount)?;
        self.effects.push(Effect::Mint {
            token: accounts::STABLECOIN,
            to,
            amount,
        });
        Ok(())
    }

    pub fn burn_stablecoin(&mut self, from: Address, amount: u128) -> McUsdResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.state.supply.total_burned = safe_add(self.state.supply.total_burned, amount)?;
        self.effects.push(Effect::Burn {
            token: accounts::STABLECOIN,
            from,
            amount,
        });
        Ok(())
    }

    // ============ Shared Steps ============

    /// Absorb a trove's pending rewards and move the collateral to match
    pub fn apply_pending(&mut self, id: &TroveId) -> McUsdResult<PendingRewards> {
        let pending = self.state.troves.apply_pending(id, self.now)?;
        if !pending.is_empty() {
            self.transfer_basket(accounts::DEFAULT_POOL, accounts::ACTIVE_POOL, &pending.collateral);
            self.events.emit(McUsdEvent::PendingRewardsApplied {
                trove_id: *id,
                collateral: pending.collateral.clone(),
                debt: pending.debt,
                timestamp: self.now,
            });
        }
        Ok(pending)
    }

    /// Run queued effects in order and hand back the working copies
    pub fn finish(mut self) -> McUsdResult<(SystemState, L, EventLog)> {
        for effect in &self.effects {
            effect.apply(&mut self.ledger)?;
        }
        Ok((self.state, self.ledger, self.events))
    }
}
