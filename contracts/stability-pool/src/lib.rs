//! Stability Pool Ledger
//!
//! First line of defense for the mcUSD system. Depositors pool stablecoin
//! that absorbs liquidated debt and earn the liquidated collateral in return.
//!
//! ## Product/Sum Accounting
//!
//! Every liquidation touches two global values instead of every deposit:
//!
//! - **P** (product): running factor by which all deposits have shrunk.
//!   A deposit's compounded value is `initial × P / P_snapshot`.
//! - **S** (sum, per collateral asset): running collateral gain per unit
//!   deposited, weighted by P at the time of the gain. A deposit's gain is
//!   `initial × (S − S_snapshot) / P_snapshot`.
//!
//! When P would underflow [`SCALE_FACTOR`] it is multiplied by 1e9 and the
//! scale increments; when a liquidation empties the pool the epoch increments
//! and P resets. S is tracked per `(epoch, scale)` so older snapshots remain
//! readable. Sums are stored at 1e27 precision (P × gain-per-unit / 1e9).
//!
//! All divisions round down. Loss per unit is rounded up and rounding errors
//! are fed into the next offset, so dust accumulates in the pool rather than
//! being overpaid.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use mcusd_common::{
    constants::precision::DECIMAL_PRECISION,
    constants::stability_pool::{DUST_DIVISOR, SCALE_FACTOR},
    errors::{McUsdError, McUsdResult},
    events::{EventLog, McUsdEvent},
    math::{mul_div, mul_div_rem, safe_add},
    types::{Address, AssetId, CollateralAmounts},
    BTreeMap,
};

/// Per-asset accumulator values
pub type SumMap = BTreeMap<AssetId, u128>;

// ============ Deposit State ============

/// A depositor's position as of its last touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Deposit {
    /// Deposit value when the snapshots were taken
    pub initial: u128,
    /// P at last touch
    pub p_snapshot: u128,
    /// S per asset at last touch
    pub s_snapshots: SumMap,
    /// Epoch at last touch
    pub epoch: u64,
    /// Scale at last touch
    pub scale: u64,
    /// Timestamp of last touch
    pub last_updated: u64,
}

/// Result of a provide or withdraw
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositChange {
    /// Stablecoin moved in (provide) or out (withdraw)
    pub amount: u128,
    /// Compounded deposit before the change
    pub previous_deposit: u128,
    /// Deposit after the change
    pub new_deposit: u128,
    /// Collateral gains paid out
    pub gains: CollateralAmounts,
}

/// Result of absorbing a liquidation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetResult {
    pub debt_offset: u128,
    pub coll_added: CollateralAmounts,
    /// The offset consumed every deposit and started a new epoch
    pub emptied: bool,
}

// ============ Pool State ============

/// Aggregate pool state plus every open deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StabilityPoolLedger {
    total_deposits: u128,
    p: u128,
    epoch: u64,
    scale: u64,
    epoch_to_scale_to_sum: BTreeMap<(u64, u64), SumMap>,
    collateral: CollateralAmounts,
    last_coll_error: SumMap,
    last_debt_loss_error: u128,
    total_debt_offset: u128,
    deposits: BTreeMap<Address, Deposit>,
}

impl Default for StabilityPoolLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl StabilityPoolLedger {
    /// Empty pool at epoch 0, scale 0, P = 1
    pub fn new() -> Self {
        Self {
            total_deposits: 0,
            p: DECIMAL_PRECISION,
            epoch: 0,
            scale: 0,
            epoch_to_scale_to_sum: BTreeMap::new(),
            collateral: CollateralAmounts::new(),
            last_coll_error: SumMap::new(),
            last_debt_loss_error: 0,
            total_debt_offset: 0,
            deposits: BTreeMap::new(),
        }
    }

    // ============ Depositor Operations ============

    /// Add stablecoin to a deposit, paying out pending gains first
    pub fn provide(
        &mut self,
        depositor: Address,
        amount: u128,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<DepositChange> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }

        let (compounded, gains) = self.settle(&depositor)?;
        let new_deposit = safe_add(compounded, amount)?;
        self.total_deposits = safe_add(self.total_deposits, amount)?;
        self.store_snapshot(depositor, new_deposit, now);

        events.emit(McUsdEvent::StabilityDeposit {
            depositor,
            amount,
            new_deposit,
            timestamp: now,
        });
        emit_gains(events, depositor, &gains, now);

        Ok(DepositChange {
            amount,
            previous_deposit: compounded,
            new_deposit,
            gains,
        })
    }

    /// Withdraw up to `amount` (`u128::MAX` for everything) and pay out gains.
    ///
    /// A zero amount only claims gains.
    pub fn withdraw(
        &mut self,
        depositor: Address,
        amount: u128,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<DepositChange> {
        if !self.deposits.contains_key(&depositor) {
            return Err(McUsdError::DepositNotFound { depositor });
        }

        let (compounded, gains) = self.settle(&depositor)?;
        let withdrawn = amount.min(compounded);
        self.total_deposits = self
            .total_deposits
            .checked_sub(withdrawn)
            .ok_or(McUsdError::InvariantViolation {
                context: "withdrawal exceeds pool deposits",
            })?;
        let new_deposit = compounded - withdrawn;
        self.store_snapshot(depositor, new_deposit, now);

        events.emit(McUsdEvent::StabilityWithdrawal {
            depositor,
            amount: withdrawn,
            new_deposit,
            timestamp: now,
        });
        emit_gains(events, depositor, &gains, now);

        Ok(DepositChange {
            amount: withdrawn,
            previous_deposit: compounded,
            new_deposit,
            gains,
        })
    }

    /// Pay out collateral gains without touching the deposit
    pub fn claim_gains(
        &mut self,
        depositor: Address,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<CollateralAmounts> {
        let deposit = self
            .deposits
            .get(&depositor)
            .ok_or(McUsdError::DepositNotFound { depositor })?;
        if self.gains_of(deposit)?.is_empty() {
            return Err(McUsdError::NoGainsToClaim);
        }

        let (compounded, gains) = self.settle(&depositor)?;
        self.store_snapshot(depositor, compounded, now);
        emit_gains(events, depositor, &gains, now);
        Ok(gains)
    }

    // ============ Liquidation Offset ============

    /// Cancel `debt` against pooled deposits and distribute `coll` as gains.
    ///
    /// `debt` must not exceed [`Self::total_deposits`]; the caller burns the
    /// same amount of stablecoin from the pool account.
    pub fn offset(
        &mut self,
        debt: u128,
        coll: &CollateralAmounts,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<OffsetResult> {
        if debt == 0 {
            return Ok(OffsetResult::default());
        }
        let total = self.total_deposits;
        if debt > total {
            return Err(McUsdError::InsufficientBalance {
                available: total,
                requested: debt,
            });
        }

        let (gain_per_unit, loss_per_unit) = self.compute_rewards_per_unit(debt, coll, total)?;
        self.update_sums(&gain_per_unit)?;
        let emptied = self.update_product(loss_per_unit)?;

        self.total_deposits = total - debt;
        self.total_debt_offset = safe_add(self.total_debt_offset, debt)?;
        let mut coll_added = CollateralAmounts::new();
        for (asset, amount) in coll.iter().filter(|(_, a)| **a > 0) {
            let held = self.collateral.entry(*asset).or_insert(0);
            *held = safe_add(*held, *amount)?;
            coll_added.insert(*asset, *amount);
        }

        events.emit(McUsdEvent::LiquidationOffset {
            debt_offset: debt,
            coll_added: coll_added.clone(),
            epoch: self.epoch,
            scale: self.scale,
            p: self.p,
            timestamp: now,
        });

        Ok(OffsetResult {
            debt_offset: debt,
            coll_added,
            emptied,
        })
    }

    fn compute_rewards_per_unit(
        &mut self,
        debt: u128,
        coll: &CollateralAmounts,
        total: u128,
    ) -> McUsdResult<(SumMap, u128)> {
        let mut gain_per_unit = SumMap::new();
        for (asset, amount) in coll.iter().filter(|(_, a)| **a > 0) {
            let error = self.last_coll_error.get(asset).copied().unwrap_or(0);
            let (per_unit, remainder) = mul_div_rem(*amount, DECIMAL_PRECISION, error, total)?;
            self.last_coll_error.insert(*asset, remainder);
            gain_per_unit.insert(*asset, per_unit);
        }

        let loss_per_unit = if debt == total {
            self.last_debt_loss_error = 0;
            DECIMAL_PRECISION
        } else {
            // debt × 1e18 − error = quotient × total + remainder
            let error = self.last_debt_loss_error;
            let (quotient, remainder) = mul_div_rem(debt, DECIMAL_PRECISION, 0, total)?;
            let (quotient, remainder) = if remainder >= error {
                (quotient, remainder - error)
            } else if quotient > 0 {
                (quotient - 1, remainder + (total - error))
            } else {
                (0, 0)
            };
            // Round up so deposits never appear larger than the pool holds
            let loss = (quotient + 1).min(DECIMAL_PRECISION);
            self.last_debt_loss_error = total - remainder;
            loss
        };

        Ok((gain_per_unit, loss_per_unit))
    }

    fn update_sums(&mut self, gain_per_unit: &SumMap) -> McUsdResult<()> {
        let p = self.p;
        let sums = self
            .epoch_to_scale_to_sum
            .entry((self.epoch, self.scale))
            .or_default();
        for (asset, per_unit) in gain_per_unit {
            let marginal = mul_div(*per_unit, p, SCALE_FACTOR)?;
            let current = sums.entry(*asset).or_insert(0);
            *current = safe_add(*current, marginal)?;
        }
        Ok(())
    }

    fn update_product(&mut self, loss_per_unit: u128) -> McUsdResult<bool> {
        let new_product_factor = DECIMAL_PRECISION - loss_per_unit;

        if new_product_factor == 0 {
            self.epoch += 1;
            self.scale = 0;
            self.p = DECIMAL_PRECISION;
            log::debug!("stability pool emptied, epoch now {}", self.epoch);
            return Ok(true);
        }

        let candidate = mul_div(self.p, new_product_factor, DECIMAL_PRECISION)?;
        let new_p = if candidate < SCALE_FACTOR {
            self.scale += 1;
            log::debug!("stability pool P rescaled, scale now {}", self.scale);
            mul_div(self.p, new_product_factor, DECIMAL_PRECISION / SCALE_FACTOR)?
        } else {
            candidate
        };

        if new_p == 0 {
            return Err(McUsdError::InvariantViolation {
                context: "stability pool product reached zero",
            });
        }
        self.p = new_p;
        Ok(false)
    }

    // ============ Snapshot Math ============

    /// Current value and gains of a deposit; gains leave the pool's balance
    fn settle(&mut self, depositor: &Address) -> McUsdResult<(u128, CollateralAmounts)> {
        let Some(deposit) = self.deposits.get(depositor) else {
            return Ok((0, CollateralAmounts::new()));
        };
        let compounded = self.compounded_of(deposit)?;
        let gains = self.gains_of(deposit)?;

        for (asset, gain) in &gains {
            let held = self.collateral.entry(*asset).or_insert(0);
            *held = held.checked_sub(*gain).ok_or(McUsdError::InvariantViolation {
                context: "stability pool collateral gain exceeds balance",
            })?;
        }
        Ok((compounded, gains))
    }

    fn store_snapshot(&mut self, depositor: Address, new_deposit: u128, now: u64) {
        if new_deposit == 0 {
            self.deposits.remove(&depositor);
            return;
        }
        let s_snapshots = self
            .epoch_to_scale_to_sum
            .get(&(self.epoch, self.scale))
            .cloned()
            .unwrap_or_default();
        self.deposits.insert(
            depositor,
            Deposit {
                initial: new_deposit,
                p_snapshot: self.p,
                s_snapshots,
                epoch: self.epoch,
                scale: self.scale,
                last_updated: now,
            },
        );
    }

    fn compounded_of(&self, deposit: &Deposit) -> McUsdResult<u128> {
        if deposit.initial == 0 || deposit.epoch < self.epoch {
            return Ok(0);
        }
        let initial = deposit.initial;
        let compounded = match self.scale.saturating_sub(deposit.scale) {
            0 => mul_div(initial, self.p, deposit.p_snapshot)?,
            1 => mul_div(initial, self.p, deposit.p_snapshot)? / SCALE_FACTOR,
            _ => 0,
        };
        if compounded < initial / DUST_DIVISOR {
            return Ok(0);
        }
        Ok(compounded.min(initial))
    }

    fn gains_of(&self, deposit: &Deposit) -> McUsdResult<CollateralAmounts> {
        let mut gains = CollateralAmounts::new();
        if deposit.initial == 0 {
            return Ok(gains);
        }
        let empty = SumMap::new();
        let first = self
            .epoch_to_scale_to_sum
            .get(&(deposit.epoch, deposit.scale))
            .unwrap_or(&empty);
        let second = self
            .epoch_to_scale_to_sum
            .get(&(deposit.epoch, deposit.scale + 1))
            .unwrap_or(&empty);

        let mut assets: SumMap = first.clone();
        for asset in second.keys() {
            assets.entry(*asset).or_insert(0);
        }

        for asset in assets.keys() {
            let snapshot = deposit.s_snapshots.get(asset).copied().unwrap_or(0);
            let first_portion = first.get(asset).copied().unwrap_or(0).saturating_sub(snapshot);
            let second_portion = second.get(asset).copied().unwrap_or(0) / SCALE_FACTOR;
            let sum = safe_add(first_portion, second_portion)?;
            let gain = mul_div(deposit.initial, sum, deposit.p_snapshot)? / SCALE_FACTOR;
            if gain > 0 {
                gains.insert(*asset, gain);
            }
        }
        Ok(gains)
    }

    // ============ Queries ============

    /// Current value of a deposit after all liquidations so far
    pub fn compounded_deposit(&self, depositor: &Address) -> McUsdResult<u128> {
        match self.deposits.get(depositor) {
            Some(deposit) => self.compounded_of(deposit),
            None => Ok(0),
        }
    }

    /// Collateral gains a depositor could claim now
    pub fn depositor_gains(&self, depositor: &Address) -> McUsdResult<CollateralAmounts> {
        match self.deposits.get(depositor) {
            Some(deposit) => self.gains_of(deposit),
            None => Ok(CollateralAmounts::new()),
        }
    }

    pub fn deposit(&self, depositor: &Address) -> Option<&Deposit> {
        self.deposits.get(depositor)
    }

    /// Depositors in deterministic order
    pub fn depositors(&self) -> impl Iterator<Item = &Address> {
        self.deposits.keys()
    }

    /// Stablecoin available to absorb liquidations
    pub fn total_deposits(&self) -> u128 {
        self.total_deposits
    }

    /// Cumulative debt cancelled against the pool
    pub fn total_debt_offset(&self) -> u128 {
        self.total_debt_offset
    }

    /// Collateral of one asset held for depositors
    pub fn collateral_balance(&self, asset: &AssetId) -> u128 {
        self.collateral.get(asset).copied().unwrap_or(0)
    }

    pub fn collateral(&self) -> &CollateralAmounts {
        &self.collateral
    }

    pub fn p(&self) -> u128 {
        self.p
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn scale(&self) -> u64 {
        self.scale
    }

    /// S for an asset at an epoch and scale
    pub fn sum_at(&self, epoch: u64, scale: u64, asset: &AssetId) -> u128 {
        self.epoch_to_scale_to_sum
            .get(&(epoch, scale))
            .and_then(|sums| sums.get(asset))
            .copied()
            .unwrap_or(0)
    }
}

fn emit_gains(events: &mut EventLog, depositor: Address, gains: &CollateralAmounts, now: u64) {
    if !gains.is_empty() {
        events.emit(McUsdEvent::CollateralGainClaimed {
            depositor,
            gains: gains.clone(),
            timestamp: now,
        });
    }
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;
    use mcusd_common::events::EventType;

    const ONE_MCUSD: u128 = 100_000_000;
    const ONE_BTC: u128 = 100_000_000;
    const ONE_ETH: u128 = 1_000_000_000_000_000_000;
    const BTC: AssetId = [1u8; 32];
    const ETH: AssetId = [2u8; 32];
    const ALICE: Address = [10u8; 32];
    const BOB: Address = [11u8; 32];

    fn basket(entries: &[(AssetId, u128)]) -> CollateralAmounts {
        entries.iter().copied().collect()
    }

    fn close_to(actual: u128, expected: u128, tolerance: u128) -> bool {
        actual.abs_diff(expected) <= tolerance
    }

    #[test]
    fn test_round_trip_without_liquidations() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        let amount = 1_234 * ONE_MCUSD + 7;

        pool.provide(ALICE, amount, 1, &mut events).unwrap();
        assert_eq!(pool.compounded_deposit(&ALICE).unwrap(), amount);

        let change = pool.withdraw(ALICE, u128::MAX, 2, &mut events).unwrap();
        assert_eq!(change.amount, amount);
        assert!(change.gains.is_empty());
        assert_eq!(pool.total_deposits(), 0);
        assert!(pool.deposit(&ALICE).is_none());
        assert_eq!(events.filter_by_type(EventType::StabilityWithdrawal).len(), 1);
    }

    #[test]
    fn test_zero_provide_rejected() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        assert_eq!(pool.provide(ALICE, 0, 1, &mut events), Err(McUsdError::ZeroAmount));
        assert_eq!(
            pool.withdraw(ALICE, 1, 1, &mut events),
            Err(McUsdError::DepositNotFound { depositor: ALICE })
        );
    }

    #[test]
    fn test_partial_offset_shares_loss_and_gain() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        pool.provide(ALICE, 100 * ONE_MCUSD, 1, &mut events).unwrap();
        pool.provide(BOB, 300 * ONE_MCUSD, 1, &mut events).unwrap();

        let result = pool
            .offset(200 * ONE_MCUSD, &basket(&[(BTC, 2 * ONE_BTC)]), 2, &mut events)
            .unwrap();
        assert!(!result.emptied);
        assert_eq!(pool.total_deposits(), 200 * ONE_MCUSD);
        assert_eq!(pool.total_debt_offset(), 200 * ONE_MCUSD);

        let alice = pool.compounded_deposit(&ALICE).unwrap();
        let bob = pool.compounded_deposit(&BOB).unwrap();
        assert!(close_to(alice, 50 * ONE_MCUSD, 1), "alice {}", alice);
        assert!(close_to(bob, 150 * ONE_MCUSD, 1), "bob {}", bob);
        assert!(alice + bob <= pool.total_deposits());

        assert_eq!(pool.depositor_gains(&ALICE).unwrap()[&BTC], ONE_BTC / 2);
        assert_eq!(pool.depositor_gains(&BOB).unwrap()[&BTC], 3 * ONE_BTC / 2);
    }

    #[test]
    fn test_claim_gains_and_no_double_claim() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        pool.provide(ALICE, 100 * ONE_MCUSD, 1, &mut events).unwrap();
        pool.offset(10 * ONE_MCUSD, &basket(&[(BTC, ONE_BTC), (ETH, 5)]), 2, &mut events)
            .unwrap();

        let gains = pool.claim_gains(ALICE, 3, &mut events).unwrap();
        assert_eq!(gains[&BTC], ONE_BTC);
        assert_eq!(gains[&ETH], 5);
        assert_eq!(pool.collateral_balance(&BTC), 0);
        assert_eq!(pool.claim_gains(ALICE, 4, &mut events), Err(McUsdError::NoGainsToClaim));

        // Deposit itself is unchanged by the claim
        let deposit = pool.compounded_deposit(&ALICE).unwrap();
        assert!(close_to(deposit, 90 * ONE_MCUSD, 1));
    }

    #[test]
    fn test_provide_pays_out_pending_gains() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        pool.provide(ALICE, 100 * ONE_MCUSD, 1, &mut events).unwrap();
        pool.offset(50 * ONE_MCUSD, &basket(&[(BTC, ONE_BTC)]), 2, &mut events).unwrap();

        let change = pool.provide(ALICE, 10 * ONE_MCUSD, 3, &mut events).unwrap();
        assert_eq!(change.gains[&BTC], ONE_BTC);
        assert!(close_to(change.new_deposit, 60 * ONE_MCUSD, 1));
        assert!(pool.depositor_gains(&ALICE).unwrap().is_empty());
    }

    #[test]
    fn test_full_offset_starts_new_epoch() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        pool.provide(ALICE, 100 * ONE_MCUSD, 1, &mut events).unwrap();

        let result = pool
            .offset(100 * ONE_MCUSD, &basket(&[(BTC, ONE_BTC)]), 2, &mut events)
            .unwrap();
        assert!(result.emptied);
        assert_eq!(pool.epoch(), 1);
        assert_eq!(pool.p(), DECIMAL_PRECISION);
        assert_eq!(pool.compounded_deposit(&ALICE).unwrap(), 0);
        assert_eq!(pool.depositor_gains(&ALICE).unwrap()[&BTC], ONE_BTC);

        // New depositors in the new epoch are unaffected by the old one
        pool.provide(BOB, 40 * ONE_MCUSD, 3, &mut events).unwrap();
        assert_eq!(pool.compounded_deposit(&BOB).unwrap(), 40 * ONE_MCUSD);
        assert!(pool.depositor_gains(&BOB).unwrap().is_empty());

        let change = pool.withdraw(ALICE, u128::MAX, 4, &mut events).unwrap();
        assert_eq!(change.amount, 0);
        assert_eq!(change.gains[&BTC], ONE_BTC);
    }

    #[test]
    fn test_offset_exceeding_deposits_rejected() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        pool.provide(ALICE, 10, 1, &mut events).unwrap();
        assert_eq!(
            pool.offset(11, &CollateralAmounts::new(), 2, &mut events),
            Err(McUsdError::InsufficientBalance { available: 10, requested: 11 })
        );
    }

    #[test]
    fn test_scale_change_keeps_precision() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        let big: u128 = 1_000_000_000_000_000; // 1e15

        pool.provide(ALICE, big, 1, &mut events).unwrap();
        pool.offset(big - 10_000_000_000, &basket(&[(BTC, ONE_BTC)]), 2, &mut events)
            .unwrap();
        assert_eq!(pool.scale(), 0);

        pool.provide(BOB, 10_000_000_000, 3, &mut events).unwrap();
        let total = pool.total_deposits();
        pool.offset(total - 200_000, &basket(&[(BTC, 2 * ONE_BTC)]), 4, &mut events)
            .unwrap();
        assert_eq!(pool.scale(), 1);
        assert_eq!(pool.epoch(), 0);

        // Bob kept ~1e-5 of his deposit across the scale change
        let bob = pool.compounded_deposit(&BOB).unwrap();
        assert!(close_to(bob, 100_000, 10), "bob {}", bob);
        // Alice's remainder is below the dust threshold
        assert_eq!(pool.compounded_deposit(&ALICE).unwrap(), 0);

        let bob_gain = pool.depositor_gains(&BOB).unwrap()[&BTC];
        let alice_gain = pool.depositor_gains(&ALICE).unwrap()[&BTC];
        assert!(close_to(bob_gain, ONE_BTC, 10), "bob gain {}", bob_gain);
        assert!(close_to(alice_gain, 2 * ONE_BTC, 10), "alice gain {}", alice_gain);
        assert!(bob_gain + alice_gain <= pool.collateral_balance(&BTC));
    }

    #[test]
    fn test_many_offsets_never_overpay() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        let depositors: Vec<Address> = (0..5u8).map(|i| [100 + i; 32]).collect();
        for (i, d) in depositors.iter().enumerate() {
            pool.provide(*d, (i as u128 + 1) * 333 * ONE_MCUSD + 17, 1, &mut events).unwrap();
        }

        for round in 0..20u128 {
            let debt = pool.total_deposits() / 7 + round;
            pool.offset(debt, &basket(&[(BTC, 12_345 + round), (ETH, 999)]), 2 + round as u64, &mut events)
                .unwrap();
        }

        let mut sum_deposits = 0u128;
        let mut sum_btc = 0u128;
        let mut sum_eth = 0u128;
        for d in &depositors {
            sum_deposits += pool.compounded_deposit(d).unwrap();
            let gains = pool.depositor_gains(d).unwrap();
            sum_btc += gains.get(&BTC).copied().unwrap_or(0);
            sum_eth += gains.get(&ETH).copied().unwrap_or(0);
        }
        assert!(sum_deposits <= pool.total_deposits());
        assert!(sum_btc <= pool.collateral_balance(&BTC));
        assert!(sum_eth <= pool.collateral_balance(&ETH));

        // Everyone can still exit
        for d in &depositors {
            pool.withdraw(*d, u128::MAX, 100, &mut events).unwrap();
        }
    }

    #[test]
    fn test_large_eighteen_decimal_gains() {
        let mut pool = StabilityPoolLedger::new();
        let mut events = EventLog::new();
        pool.provide(ALICE, 1_000_000 * ONE_MCUSD, 1, &mut events).unwrap();
        pool.provide(BOB, 3_000_000 * ONE_MCUSD, 1, &mut events).unwrap();

        // 1000 ETH in wei times 1e18 does not fit in 128 bits
        pool.offset(
            2_000_000 * ONE_MCUSD,
            &basket(&[(ETH, 1_000 * ONE_ETH)]),
            2,
            &mut events,
        )
        .unwrap();

        let alice = pool.depositor_gains(&ALICE).unwrap()[&ETH];
        let bob = pool.depositor_gains(&BOB).unwrap()[&ETH];
        assert!(close_to(alice, 250 * ONE_ETH, 10), "alice {}", alice);
        assert!(close_to(bob, 750 * ONE_ETH, 10), "bob {}", bob);
        assert!(alice + bob <= pool.collateral_balance(&ETH));
        assert!(close_to(pool.compounded_deposit(&BOB).unwrap(), 1_500_000 * ONE_MCUSD, 1));
    }
}
