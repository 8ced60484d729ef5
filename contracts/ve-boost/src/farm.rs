//! Boosted Farm
//!
//! Each epoch's reward is split in two partitions:
//!
//! - **Base** (70%): pro rata to staked LP
//! - **Boost** (30%): pro rata to each position's boost factor,
//!   `floor(sqrt(lp × ve_allocated))`
//!
//! Both partitions use a reward-per-unit accumulator, so distribution is O(1)
//! regardless of the number of stakers. A partition with nobody to receive it
//! is carried into the next epoch.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use mcusd_common::{
    constants::boost::BASE_PARTITION,
    constants::precision::DECIMAL_PRECISION,
    errors::{McUsdError, McUsdResult},
    events::{EventLog, McUsdEvent},
    math::{apply_rate, mul_div, safe_add, safe_sub, sqrt_product},
    types::{Address, RewarderId},
    BTreeMap,
};

/// A staker's position in one farm
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FarmPosition {
    pub lp: u128,
    pub ve_allocated: u128,
    pub boost_factor: u128,
    base_debt: u128,
    boost_debt: u128,
    /// Settled but unclaimed reward
    pub pending: u128,
}

/// Share of the boost partition for a position, 1e18 == 100%
pub fn compute_boost_share(lp: u128, ve: u128, sum_of_factors: u128) -> McUsdResult<u128> {
    if sum_of_factors == 0 {
        return Ok(0);
    }
    let factor = boost_factor(lp, ve);
    mul_div(factor, DECIMAL_PRECISION, sum_of_factors)
}

/// `floor(sqrt(lp × ve))`, taken over the 256-bit product
pub fn boost_factor(lp: u128, ve: u128) -> u128 {
    sqrt_product(lp, ve)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BoostedFarm {
    pub id: RewarderId,
    total_lp: u128,
    total_factor: u128,
    /// Base reward per LP unit, 1e18 scaled
    acc_base_per_lp: u128,
    /// Boost reward per boost-factor unit, 1e18 scaled
    acc_boost_per_factor: u128,
    /// Rewards that found no recipient yet
    carry_base: u128,
    carry_boost: u128,
    epoch: u64,
    positions: BTreeMap<Address, FarmPosition>,
}

impl BoostedFarm {
    pub fn new(id: RewarderId) -> Self {
        Self {
            id,
            total_lp: 0,
            total_factor: 0,
            acc_base_per_lp: 0,
            acc_boost_per_factor: 0,
            carry_base: 0,
            carry_boost: 0,
            epoch: 0,
            positions: BTreeMap::new(),
        }
    }

    pub fn position(&self, owner: &Address) -> Option<&FarmPosition> {
        self.positions.get(owner)
    }

    pub fn total_lp(&self) -> u128 {
        self.total_lp
    }

    pub fn total_factor(&self) -> u128 {
        self.total_factor
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ============ Positions ============

    pub fn stake_lp(&mut self, owner: Address, amount: u128, now: u64, events: &mut EventLog) -> McUsdResult<()> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        self.settle(&owner)?;
        let position = self.positions.entry(owner).or_default();
        let lp = safe_add(position.lp, amount)?;
        let ve = position.ve_allocated;
        self.total_lp = safe_add(self.total_lp, amount)?;
        self.resize(&owner, lp, ve)?;

        events.emit(McUsdEvent::LpStaked {
            owner,
            rewarder: self.id,
            amount,
            timestamp: now,
        });
        Ok(())
    }

    pub fn unstake_lp(&mut self, owner: Address, amount: u128, now: u64, events: &mut EventLog) -> McUsdResult<()> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        let staked = self.positions.get(&owner).map(|p| p.lp).unwrap_or(0);
        if amount > staked {
            return Err(McUsdError::InsufficientBalance {
                available: staked,
                requested: amount,
            });
        }
        self.settle(&owner)?;
        let ve = self.positions.get(&owner).map(|p| p.ve_allocated).unwrap_or(0);
        self.total_lp = safe_sub(self.total_lp, amount)?;
        self.resize(&owner, staked - amount, ve)?;

        events.emit(McUsdEvent::LpUnstaked {
            owner,
            rewarder: self.id,
            amount,
            timestamp: now,
        });
        Ok(())
    }

    /// Record a new ve allocation for `owner` and rescale its boost
    pub fn set_allocation(&mut self, owner: Address, ve: u128) -> McUsdResult<()> {
        self.settle(&owner)?;
        let lp = self.positions.get(&owner).map(|p| p.lp).unwrap_or(0);
        self.resize(&owner, lp, ve)
    }

    // ============ Rewards ============

    /// Split `reward` between the base and boost partitions
    pub fn distribute_epoch(&mut self, reward: u128, now: u64, events: &mut EventLog) -> McUsdResult<()> {
        let base = safe_add(apply_rate(reward, BASE_PARTITION)?, self.carry_base)?;
        let boost = safe_add(reward - apply_rate(reward, BASE_PARTITION)?, self.carry_boost)?;

        self.carry_base = 0;
        self.carry_boost = 0;
        let base_reward = if self.total_lp > 0 {
            let per_lp = mul_div(base, DECIMAL_PRECISION, self.total_lp)?;
            self.acc_base_per_lp = safe_add(self.acc_base_per_lp, per_lp)?;
            base
        } else {
            self.carry_base = base;
            0
        };
        let boost_reward = if self.total_factor > 0 {
            let per_factor = mul_div(boost, DECIMAL_PRECISION, self.total_factor)?;
            self.acc_boost_per_factor = safe_add(self.acc_boost_per_factor, per_factor)?;
            boost
        } else {
            self.carry_boost = boost;
            0
        };
        self.epoch += 1;

        if base_reward == 0 && boost_reward == 0 {
            log::warn!("farm epoch {} had no recipients, reward carried", self.epoch);
        }
        events.emit(McUsdEvent::FarmEpochDistributed {
            rewarder: self.id,
            epoch: self.epoch,
            base_reward,
            boost_reward,
            timestamp: now,
        });
        Ok(())
    }

    /// Reward claimable by `owner` right now
    pub fn pending_rewards(&self, owner: &Address) -> McUsdResult<u128> {
        match self.positions.get(owner) {
            Some(position) => safe_add(position.pending, self.unsettled(position)?),
            None => Ok(0),
        }
    }

    pub fn claim(&mut self, owner: Address, now: u64, events: &mut EventLog) -> McUsdResult<u128> {
        self.settle(&owner)?;
        let amount = match self.positions.get_mut(&owner) {
            Some(position) => core::mem::take(&mut position.pending),
            None => 0,
        };
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        self.prune(&owner);

        events.emit(McUsdEvent::FarmRewardClaimed {
            owner,
            rewarder: self.id,
            amount,
            timestamp: now,
        });
        Ok(amount)
    }

    // ============ Internals ============

    fn unsettled(&self, position: &FarmPosition) -> McUsdResult<u128> {
        let base = mul_div(position.lp, self.acc_base_per_lp, DECIMAL_PRECISION)?;
        let boost = mul_div(position.boost_factor, self.acc_boost_per_factor, DECIMAL_PRECISION)?;
        let owed = safe_add(
            base.saturating_sub(position.base_debt),
            boost.saturating_sub(position.boost_debt),
        )?;
        Ok(owed)
    }

    /// Move accrued reward into `pending` and reset the debts
    fn settle(&mut self, owner: &Address) -> McUsdResult<()> {
        let Some(position) = self.positions.get(owner) else {
            return Ok(());
        };
        let owed = self.unsettled(position)?;
        let (acc_base, acc_boost) = (self.acc_base_per_lp, self.acc_boost_per_factor);
        if let Some(position) = self.positions.get_mut(owner) {
            position.pending = safe_add(position.pending, owed)?;
            position.base_debt = mul_div(position.lp, acc_base, DECIMAL_PRECISION)?;
            position.boost_debt = mul_div(position.boost_factor, acc_boost, DECIMAL_PRECISION)?;
        }
        Ok(())
    }

    /// Set lp and ve on a settled position and update the factor total
    fn resize(&mut self, owner: &Address, lp: u128, ve: u128) -> McUsdResult<()> {
        let (acc_base, acc_boost) = (self.acc_base_per_lp, self.acc_boost_per_factor);
        let position = self.positions.entry(*owner).or_default();
        let old_factor = position.boost_factor;
        let new_factor = boost_factor(lp, ve);

        position.lp = lp;
        position.ve_allocated = ve;
        position.boost_factor = new_factor;
        position.base_debt = mul_div(lp, acc_base, DECIMAL_PRECISION)?;
        position.boost_debt = mul_div(new_factor, acc_boost, DECIMAL_PRECISION)?;

        self.total_factor = safe_add(safe_sub(self.total_factor, old_factor)?, new_factor)?;
        self.prune(owner);
        Ok(())
    }

    fn prune(&mut self, owner: &Address) {
        let empty = self
            .positions
            .get(owner)
            .is_some_and(|p| p.lp == 0 && p.ve_allocated == 0 && p.pending == 0);
        if empty {
            self.positions.remove(owner);
        }
    }
}
