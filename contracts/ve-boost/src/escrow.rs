//! Vote Escrow
//!
//! Locked stake accrues ve balance linearly over time, up to a multiple of the
//! locked amount. Any unlock, however small, forfeits the whole ve balance and
//! withdraws every allocation.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use mcusd_common::{
    constants::boost::{ACCUMULATION_RATE, MAX_VE_MULTIPLE},
    constants::precision::DECIMAL_PRECISION,
    errors::{McUsdError, McUsdResult},
    events::{EventLog, McUsdEvent},
    math::{mul_div, safe_add, safe_sub},
    types::{Address, RewarderId},
    BTreeMap,
};

/// One owner's escrow position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VeStake {
    pub owner: Address,
    pub locked: u128,
    pub ve_balance: u128,
    /// Last time `ve_balance` was accrued
    pub last_update: u64,
    /// ve committed to each rewarder
    pub allocations: BTreeMap<RewarderId, u128>,
}

impl VeStake {
    pub fn allocated(&self) -> u128 {
        self.allocations.values().fold(0u128, |acc, a| acc.saturating_add(*a))
    }

    /// ve not yet committed to a rewarder
    pub fn available(&self) -> u128 {
        self.ve_balance.saturating_sub(self.allocated())
    }

    /// Largest ve balance the locked amount can reach
    pub fn cap(&self) -> u128 {
        self.locked.saturating_mul(MAX_VE_MULTIPLE)
    }
}

/// What an unlock took away
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockResult {
    pub unlocked: u128,
    pub ve_forfeited: u128,
    /// Allocations that were withdrawn, per rewarder
    pub released: BTreeMap<RewarderId, u128>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VeEscrow {
    stakes: BTreeMap<Address, VeStake>,
    total_locked: u128,
}

impl VeEscrow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: &Address) -> Option<&VeStake> {
        self.stakes.get(owner)
    }

    pub fn total_locked(&self) -> u128 {
        self.total_locked
    }

    /// ve balance as of `now`, without mutating
    pub fn ve_balance_at(&self, owner: &Address, now: u64) -> McUsdResult<u128> {
        match self.stakes.get(owner) {
            Some(stake) => accrued(stake, now),
            None => Ok(0),
        }
    }

    // ============ Lock / Unlock ============

    pub fn lock(&mut self, owner: Address, amount: u128, now: u64, events: &mut EventLog) -> McUsdResult<()> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        // Accrue on the old amount before the new one starts earning
        if self.stakes.contains_key(&owner) {
            self.accrue(&owner, now)?;
        }

        let stake = self.stakes.entry(owner).or_insert_with(|| VeStake {
            owner,
            last_update: now,
            ..VeStake::default()
        });
        stake.locked = safe_add(stake.locked, amount)?;
        let total_locked = stake.locked;
        self.total_locked = safe_add(self.total_locked, amount)?;

        events.emit(McUsdEvent::VeLocked {
            owner,
            amount,
            total_locked,
            timestamp: now,
        });
        Ok(())
    }

    /// Unlock `amount`. The ve balance drops to zero and all allocations are
    /// released, whatever the amount.
    pub fn unlock(&mut self, owner: Address, amount: u128, now: u64, events: &mut EventLog) -> McUsdResult<UnlockResult> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        let stake = self
            .stakes
            .get_mut(&owner)
            .ok_or(McUsdError::NoLockedStake { owner })?;
        if amount > stake.locked {
            return Err(McUsdError::InsufficientBalance {
                available: stake.locked,
                requested: amount,
            });
        }

        let ve_forfeited = accrued(stake, now)?;
        let released = core::mem::take(&mut stake.allocations);
        stake.locked -= amount;
        stake.ve_balance = 0;
        stake.last_update = now;
        if stake.locked == 0 {
            self.stakes.remove(&owner);
        }
        self.total_locked = safe_sub(self.total_locked, amount)?;

        log::debug!("unlock of {} forfeits {} ve", amount, ve_forfeited);
        events.emit(McUsdEvent::VeUnlocked {
            owner,
            amount,
            ve_forfeited,
            timestamp: now,
        });
        Ok(UnlockResult {
            unlocked: amount,
            ve_forfeited,
            released,
        })
    }

    /// Bring the ve balance up to `now`
    pub fn accrue(&mut self, owner: &Address, now: u64) -> McUsdResult<u128> {
        let stake = self
            .stakes
            .get_mut(owner)
            .ok_or(McUsdError::NoLockedStake { owner: *owner })?;
        stake.ve_balance = accrued(stake, now)?;
        stake.last_update = stake.last_update.max(now);
        Ok(stake.ve_balance)
    }

    // ============ Allocation ============

    /// Commit accrued ve to a rewarder. Returns the rewarder's new allocation.
    pub fn allocate(
        &mut self,
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<u128> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        self.accrue(&owner, now)?;
        let stake = self
            .stakes
            .get_mut(&owner)
            .ok_or(McUsdError::NoLockedStake { owner })?;
        let available = stake.available();
        if amount > available {
            return Err(McUsdError::InsufficientVeBalance {
                available,
                requested: amount,
            });
        }
        let slot = stake.allocations.entry(rewarder).or_insert(0);
        *slot = safe_add(*slot, amount)?;
        let allocation = *slot;

        events.emit(McUsdEvent::VeAllocated {
            owner,
            rewarder,
            amount,
            timestamp: now,
        });
        Ok(allocation)
    }

    /// Take ve back from a rewarder. Returns the rewarder's new allocation.
    pub fn deallocate(
        &mut self,
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<u128> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        let stake = self
            .stakes
            .get_mut(&owner)
            .ok_or(McUsdError::NoLockedStake { owner })?;
        let current = stake.allocations.get(&rewarder).copied().unwrap_or(0);
        if amount > current {
            return Err(McUsdError::InsufficientVeBalance {
                available: current,
                requested: amount,
            });
        }
        let remaining = current - amount;
        if remaining == 0 {
            stake.allocations.remove(&rewarder);
        } else {
            stake.allocations.insert(rewarder, remaining);
        }

        events.emit(McUsdEvent::VeDeallocated {
            owner,
            rewarder,
            amount,
            timestamp: now,
        });
        Ok(remaining)
    }
}

/// `ve + locked × rate × dt / 1e18`, capped at `locked × MAX_VE_MULTIPLE`
fn accrued(stake: &VeStake, now: u64) -> McUsdResult<u128> {
    let dt = now.saturating_sub(stake.last_update);
    let cap = stake.cap();
    if dt == 0 || stake.ve_balance >= cap {
        return Ok(stake.ve_balance.min(cap));
    }
    let rate_x_dt = ACCUMULATION_RATE
        .checked_mul(dt as u128)
        .ok_or(McUsdError::Overflow)?;
    let earned = mul_div(stake.locked, rate_x_dt, DECIMAL_PRECISION)?.min(cap);
    Ok(stake.ve_balance.saturating_add(earned).min(cap))
}
