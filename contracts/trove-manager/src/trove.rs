//! Trove Ledger
//!
//! Owns every trove record, the active/default pool totals and the
//! redistribution accumulators.
//!
//! ## Redistribution
//!
//! Stakes are kept per collateral asset. When debt and collateral are
//! redistributed, each asset's stake pool receives a share proportional to
//! the weighted value of that asset still in the system, and the share is
//! spread over the pool as a per-stake increment:
//!
//! - `coll_per_stake[a][b]`: units of asset `b` owed per unit of `a`-stake
//! - `debt_per_stake[a]`: debt owed per unit of `a`-stake
//!
//! A trove's pending rewards are the increments since its snapshot times its
//! stakes ([`compute_pending`]), so redistribution is O(assets²) regardless of
//! the number of troves. Rounding remainders are carried into the next
//! redistribution instead of being lost.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use mcusd_common::{
    constants::precision::DECIMAL_PRECISION,
    errors::{AmountErrorReason, McUsdError, McUsdResult},
    math::{mul_div, mul_div_rem, safe_add},
    types::{AssetId, CollateralAmounts, EntireTrove, PendingRewards, RewardSnapshot, Trove, TroveId, TroveStatus},
    BTreeMap, Vec,
};

// ============ Pools ============

/// Collateral and debt held by one pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolBalances {
    pub collateral: CollateralAmounts,
    pub debt: u128,
}

impl PoolBalances {
    pub fn collateral_of(&self, asset: &AssetId) -> u128 {
        self.collateral.get(asset).copied().unwrap_or(0)
    }

    pub fn add_collateral(&mut self, basket: &CollateralAmounts) -> McUsdResult<()> {
        add_basket(&mut self.collateral, basket)
    }

    pub fn sub_collateral(&mut self, basket: &CollateralAmounts) -> McUsdResult<()> {
        sub_basket(&mut self.collateral, basket, "pool collateral underflow")
    }

    pub fn add_debt(&mut self, amount: u128) -> McUsdResult<()> {
        self.debt = safe_add(self.debt, amount)?;
        Ok(())
    }

    pub fn sub_debt(&mut self, amount: u128) -> McUsdResult<()> {
        self.debt = self.debt.checked_sub(amount).ok_or(McUsdError::InvariantViolation {
            context: "pool debt underflow",
        })?;
        Ok(())
    }
}

/// Add every entry of `delta` into `target`
pub fn add_basket(target: &mut CollateralAmounts, delta: &CollateralAmounts) -> McUsdResult<()> {
    for (asset, amount) in delta.iter().filter(|(_, a)| **a > 0) {
        let held = target.entry(*asset).or_insert(0);
        *held = safe_add(*held, *amount)?;
    }
    Ok(())
}

/// Subtract every entry of `delta` from `target`, dropping emptied assets
pub fn sub_basket(
    target: &mut CollateralAmounts,
    delta: &CollateralAmounts,
    context: &'static str,
) -> McUsdResult<()> {
    for (asset, amount) in delta.iter().filter(|(_, a)| **a > 0) {
        let held = target.get(asset).copied().unwrap_or(0);
        let left = held
            .checked_sub(*amount)
            .ok_or(McUsdError::InvariantViolation { context })?;
        if left == 0 {
            target.remove(asset);
        } else {
            target.insert(*asset, left);
        }
    }
    Ok(())
}

// ============ Redistribution Totals ============

/// Cumulative redistribution per unit of stake, keyed by stake asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RedistributionTotals {
    /// `[stake asset][collateral asset]` -> collateral per unit stake (1e18)
    pub coll_per_stake: BTreeMap<AssetId, BTreeMap<AssetId, u128>>,
    /// `[stake asset]` -> debt per unit stake (1e18)
    pub debt_per_stake: BTreeMap<AssetId, u128>,
    last_coll_error: BTreeMap<(AssetId, AssetId), u128>,
    last_debt_error: BTreeMap<AssetId, u128>,
}

impl RedistributionTotals {
    /// Current counters for one stake asset, as a snapshot value
    pub fn snapshot_for(&self, stake_asset: &AssetId) -> RewardSnapshot {
        RewardSnapshot {
            coll_per_stake: self
                .coll_per_stake
                .get(stake_asset)
                .cloned()
                .unwrap_or_default(),
            debt_per_stake: self.debt_per_stake.get(stake_asset).copied().unwrap_or(0),
        }
    }
}

/// Rewards owed to a position with `stakes` that last synced at `snapshots`.
///
/// Pure function of its inputs: nothing is read from or written to storage.
pub fn compute_pending(
    totals: &RedistributionTotals,
    stakes: &BTreeMap<AssetId, u128>,
    snapshots: &BTreeMap<AssetId, RewardSnapshot>,
) -> McUsdResult<PendingRewards> {
    let mut pending = PendingRewards::default();
    let empty = RewardSnapshot::default();

    for (stake_asset, stake) in stakes.iter().filter(|(_, s)| **s > 0) {
        let snapshot = snapshots.get(stake_asset).unwrap_or(&empty);

        if let Some(per_stake) = totals.coll_per_stake.get(stake_asset) {
            for (asset, total) in per_stake {
                let seen = snapshot.coll_per_stake.get(asset).copied().unwrap_or(0);
                let delta = total.saturating_sub(seen);
                if delta == 0 {
                    continue;
                }
                let owed = mul_div(*stake, delta, DECIMAL_PRECISION)?;
                if owed > 0 {
                    let entry = pending.collateral.entry(*asset).or_insert(0);
                    *entry = safe_add(*entry, owed)?;
                }
            }
        }

        let debt_total = totals.debt_per_stake.get(stake_asset).copied().unwrap_or(0);
        let delta = debt_total.saturating_sub(snapshot.debt_per_stake);
        if delta > 0 {
            let owed = mul_div(*stake, delta, DECIMAL_PRECISION)?;
            pending.debt = safe_add(pending.debt, owed)?;
        }
    }

    Ok(pending)
}

// ============ Trove Ledger ============

/// Every trove plus the pool and stake aggregates derived from them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TroveLedger {
    troves: BTreeMap<TroveId, Trove>,
    active: PoolBalances,
    default: PoolBalances,
    totals: RedistributionTotals,
    total_stakes: BTreeMap<AssetId, u128>,
    total_stakes_snapshot: BTreeMap<AssetId, u128>,
    total_coll_snapshot: BTreeMap<AssetId, u128>,
    active_count: usize,
}

impl TroveLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Lookups ============

    pub fn get(&self, id: &TroveId) -> McUsdResult<&Trove> {
        self.troves
            .get(id)
            .ok_or(McUsdError::TroveNotFound { trove_id: *id })
    }

    /// Look up a trove that must be active
    pub fn get_active(&self, id: &TroveId) -> McUsdResult<&Trove> {
        let trove = self.get(id)?;
        if !trove.is_active() {
            return Err(McUsdError::TroveNotActive { trove_id: *id });
        }
        Ok(trove)
    }

    fn get_active_mut(&mut self, id: &TroveId) -> McUsdResult<&mut Trove> {
        let trove = self
            .troves
            .get_mut(id)
            .ok_or(McUsdError::TroveNotFound { trove_id: *id })?;
        if !trove.is_active() {
            return Err(McUsdError::TroveNotActive { trove_id: *id });
        }
        Ok(trove)
    }

    pub fn contains(&self, id: &TroveId) -> bool {
        self.troves.contains_key(id)
    }

    pub fn troves(&self) -> impl Iterator<Item = &Trove> {
        self.troves.values()
    }

    pub fn active_troves(&self) -> impl Iterator<Item = &Trove> {
        self.troves.values().filter(|t| t.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn active_pool(&self) -> &PoolBalances {
        &self.active
    }

    pub fn default_pool(&self) -> &PoolBalances {
        &self.default
    }

    pub fn totals(&self) -> &RedistributionTotals {
        &self.totals
    }

    pub fn total_stakes(&self, asset: &AssetId) -> u128 {
        self.total_stakes.get(asset).copied().unwrap_or(0)
    }

    /// Collateral across active and default pools
    pub fn entire_system_coll(&self) -> McUsdResult<CollateralAmounts> {
        let mut coll = self.active.collateral.clone();
        add_basket(&mut coll, &self.default.collateral)?;
        Ok(coll)
    }

    /// Debt across active and default pools
    pub fn entire_system_debt(&self) -> McUsdResult<u128> {
        safe_add(self.active.debt, self.default.debt)
    }

    // ============ Pending Rewards ============

    /// Redistribution rewards a trove has not absorbed yet
    pub fn pending_rewards(&self, id: &TroveId) -> McUsdResult<PendingRewards> {
        let trove = self.get_active(id)?;
        compute_pending(&self.totals, &trove.stakes, &trove.snapshots)
    }

    /// Recorded position plus pending rewards
    pub fn entire_trove(&self, id: &TroveId) -> McUsdResult<EntireTrove> {
        let trove = self.get_active(id)?;
        let pending = compute_pending(&self.totals, &trove.stakes, &trove.snapshots)?;
        let mut collateral = trove.collateral.clone();
        add_basket(&mut collateral, &pending.collateral)?;
        Ok(EntireTrove {
            collateral,
            debt: safe_add(trove.debt, pending.debt)?,
            pending,
        })
    }

    /// Move a trove's pending rewards from the default pool into the trove
    /// and the active pool, then refresh its snapshots.
    pub fn apply_pending(&mut self, id: &TroveId, now: u64) -> McUsdResult<PendingRewards> {
        let pending = self.pending_rewards(id)?;

        if !pending.is_empty() {
            self.default.sub_collateral(&pending.collateral)?;
            self.default.sub_debt(pending.debt)?;
            self.active.add_collateral(&pending.collateral)?;
            self.active.add_debt(pending.debt)?;

            let trove = self.get_active_mut(id)?;
            add_basket(&mut trove.collateral, &pending.collateral)?;
            trove.debt = safe_add(trove.debt, pending.debt)?;
            trove.last_updated = now;
        }

        self.snapshot_rewards(id)?;
        Ok(pending)
    }

    fn snapshot_rewards(&mut self, id: &TroveId) -> McUsdResult<()> {
        let stake_assets: Vec<AssetId> = self.get_active(id)?.stakes.keys().copied().collect();
        let snapshots: BTreeMap<AssetId, RewardSnapshot> = stake_assets
            .iter()
            .map(|asset| (*asset, self.totals.snapshot_for(asset)))
            .collect();
        self.get_active_mut(id)?.snapshots = snapshots;
        Ok(())
    }

    // ============ Position Changes ============

    /// Register a freshly opened trove and its stakes
    pub fn open(&mut self, trove: Trove) -> McUsdResult<()> {
        if self.troves.contains_key(&trove.id) {
            return Err(McUsdError::TroveAlreadyExists { trove_id: trove.id });
        }
        self.active.add_collateral(&trove.collateral)?;
        self.active.add_debt(trove.debt)?;
        let id = trove.id;
        self.troves.insert(id, trove);
        self.active_count += 1;
        self.update_stakes(&id)
    }

    pub fn add_collateral(&mut self, id: &TroveId, basket: &CollateralAmounts, now: u64) -> McUsdResult<()> {
        let trove = self.get_active_mut(id)?;
        add_basket(&mut trove.collateral, basket)?;
        trove.last_updated = now;
        self.active.add_collateral(basket)
    }

    pub fn remove_collateral(&mut self, id: &TroveId, basket: &CollateralAmounts, now: u64) -> McUsdResult<()> {
        let trove = self.get_active_mut(id)?;
        for (asset, amount) in basket {
            let available = trove.collateral_of(asset);
            if available < *amount {
                return Err(McUsdError::InsufficientCollateral {
                    asset: *asset,
                    available,
                    requested: *amount,
                });
            }
        }
        sub_basket(&mut trove.collateral, basket, "trove collateral underflow")?;
        trove.last_updated = now;
        self.active.sub_collateral(basket)
    }

    pub fn increase_debt(&mut self, id: &TroveId, amount: u128, now: u64) -> McUsdResult<()> {
        let trove = self.get_active_mut(id)?;
        trove.debt = safe_add(trove.debt, amount)?;
        trove.last_updated = now;
        self.active.add_debt(amount)
    }

    pub fn decrease_debt(&mut self, id: &TroveId, amount: u128, now: u64) -> McUsdResult<()> {
        let trove = self.get_active_mut(id)?;
        trove.debt = trove.debt.checked_sub(amount).ok_or(McUsdError::InvalidAmount {
            amount,
            reason: AmountErrorReason::TooLarge,
        })?;
        trove.last_updated = now;
        self.active.sub_debt(amount)
    }

    /// Close an active trove. Its remaining collateral and debt leave the
    /// active pool; the returned record is the position just before closing.
    pub fn close(&mut self, id: &TroveId, status: TroveStatus, now: u64) -> McUsdResult<Trove> {
        self.remove_stakes(id)?;
        let trove = self.get_active_mut(id)?;
        let before = trove.clone();
        trove.close(status, now);

        self.active.sub_collateral(&before.collateral)?;
        self.active.sub_debt(before.debt)?;
        self.active_count = self
            .active_count
            .checked_sub(1)
            .ok_or(McUsdError::InvariantViolation {
                context: "active trove count underflow",
            })?;
        Ok(before)
    }

    // ============ Stakes ============

    /// Stake for `amount` of an asset given the last liquidation snapshot
    pub fn compute_stake(&self, asset: &AssetId, amount: u128) -> McUsdResult<u128> {
        let stakes_snapshot = self.total_stakes_snapshot.get(asset).copied().unwrap_or(0);
        let coll_snapshot = self.total_coll_snapshot.get(asset).copied().unwrap_or(0);
        if stakes_snapshot == 0 || coll_snapshot == 0 {
            return Ok(amount);
        }
        mul_div(amount, stakes_snapshot, coll_snapshot)
    }

    /// Recompute a trove's stakes from its recorded collateral
    pub fn update_stakes(&mut self, id: &TroveId) -> McUsdResult<()> {
        let trove = self.get_active(id)?;
        let old = trove.stakes.clone();
        let mut new = BTreeMap::new();
        for (asset, amount) in trove.collateral.iter().filter(|(_, a)| **a > 0) {
            let stake = self.compute_stake(asset, *amount)?;
            if stake > 0 {
                new.insert(*asset, stake);
            }
        }

        for (asset, stake) in &old {
            let total = self.total_stakes.entry(*asset).or_insert(0);
            *total = total.checked_sub(*stake).ok_or(McUsdError::InvariantViolation {
                context: "total stakes underflow",
            })?;
        }
        for (asset, stake) in &new {
            let total = self.total_stakes.entry(*asset).or_insert(0);
            *total = safe_add(*total, *stake)?;
        }

        self.get_active_mut(id)?.stakes = new;
        self.snapshot_rewards(id)
    }

    /// Drop a trove's stakes from the totals
    pub fn remove_stakes(&mut self, id: &TroveId) -> McUsdResult<()> {
        let stakes = core::mem::take(&mut self.get_active_mut(id)?.stakes);
        for (asset, stake) in &stakes {
            let total = self.total_stakes.entry(*asset).or_insert(0);
            *total = total.checked_sub(*stake).ok_or(McUsdError::InvariantViolation {
                context: "total stakes underflow",
            })?;
        }
        Ok(())
    }

    /// Record stakes and collateral after a liquidation, so later stakes are
    /// scaled to the collateral already owed to existing troves.
    pub fn update_system_snapshots(&mut self) -> McUsdResult<()> {
        self.total_stakes_snapshot = self.total_stakes.clone();
        self.total_coll_snapshot = self.entire_system_coll()?;
        Ok(())
    }

    // ============ Redistribution ============

    /// Spread `debt` and `coll` over every stake pool in proportion to
    /// `weights` (stake asset -> weighted collateral value).
    ///
    /// Pools with no stakes or zero weight receive nothing. If nothing is
    /// left to absorb the amounts the call fails with
    /// [`McUsdError::LastTroveCannotRedistribute`].
    pub fn redistribute(
        &mut self,
        debt: u128,
        coll: &CollateralAmounts,
        weights: &BTreeMap<AssetId, u128>,
    ) -> McUsdResult<()> {
        if debt == 0 && coll.values().all(|a| *a == 0) {
            return Ok(());
        }

        let pools: Vec<(AssetId, u128, u128)> = weights
            .iter()
            .filter(|(_, w)| **w > 0)
            .filter_map(|(asset, w)| {
                let stakes = self.total_stakes(asset);
                (stakes > 0).then_some((*asset, *w, stakes))
            })
            .collect();
        let total_weight = pools
            .iter()
            .try_fold(0u128, |acc, (_, w, _)| safe_add(acc, *w))?;
        if total_weight == 0 {
            return Err(McUsdError::LastTroveCannotRedistribute);
        }

        for (asset, amount) in coll.iter().filter(|(_, a)| **a > 0) {
            let shares = split_by_weight(*amount, &pools, total_weight)?;
            for ((stake_asset, _, stakes), share) in pools.iter().zip(shares) {
                let key = (*stake_asset, *asset);
                let error = self.totals.last_coll_error.get(&key).copied().unwrap_or(0);
                let (per_stake, remainder) = per_stake_with_error(share, error, *stakes)?;
                self.totals.last_coll_error.insert(key, remainder);
                let entry = self
                    .totals
                    .coll_per_stake
                    .entry(*stake_asset)
                    .or_default()
                    .entry(*asset)
                    .or_insert(0);
                *entry = safe_add(*entry, per_stake)?;
            }
        }

        if debt > 0 {
            let shares = split_by_weight(debt, &pools, total_weight)?;
            for ((stake_asset, _, stakes), share) in pools.iter().zip(shares) {
                let error = self.totals.last_debt_error.get(stake_asset).copied().unwrap_or(0);
                let (per_stake, remainder) = per_stake_with_error(share, error, *stakes)?;
                self.totals.last_debt_error.insert(*stake_asset, remainder);
                let entry = self.totals.debt_per_stake.entry(*stake_asset).or_insert(0);
                *entry = safe_add(*entry, per_stake)?;
            }
        }

        self.default.add_collateral(coll)?;
        self.default.add_debt(debt)?;
        log::debug!(
            "redistributed debt {} over {} stake pools",
            debt,
            pools.len()
        );
        Ok(())
    }
}

/// Split `amount` by weight; the last pool takes the rounding remainder
fn split_by_weight(amount: u128, pools: &[(AssetId, u128, u128)], total_weight: u128) -> McUsdResult<Vec<u128>> {
    let mut shares = Vec::with_capacity(pools.len());
    let mut assigned = 0u128;
    for (i, (_, weight, _)) in pools.iter().enumerate() {
        let share = if i + 1 == pools.len() {
            amount - assigned
        } else {
            mul_div(amount, *weight, total_weight)?
        };
        assigned = safe_add(assigned, share)?;
        shares.push(share);
    }
    Ok(shares)
}

/// `(share × 1e18 + error) / stakes` and the new remainder
fn per_stake_with_error(share: u128, error: u128, stakes: u128) -> McUsdResult<(u128, u128)> {
    mul_div_rem(share, DECIMAL_PRECISION, error, stakes)
}
