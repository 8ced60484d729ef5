//! mcUSD Boost Accounting
//!
//! Vote-escrow boost for auxiliary reward farms. Owners lock stake to accrue a
//! ve balance, then allocate ve to farms where it boosts their share of the
//! boost partition.
//!
//! ```text
//! lock ──► accrue ve ──► allocate to farm ──► boost_factor = sqrt(lp × ve)
//!   │
//!   └── any unlock ──► ve = 0, every allocation released
//! ```
//!
//! This crate only keeps the books; moving the locked and reward tokens is up
//! to the caller.

pub mod escrow;
pub mod farm;

pub use escrow::{UnlockResult, VeEscrow, VeStake};
pub use farm::{boost_factor, compute_boost_share, BoostedFarm, FarmPosition};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use mcusd_common::{
    errors::{McUsdError, McUsdResult},
    events::EventLog,
    types::{Address, RewarderId},
    BTreeMap,
};

/// Escrow plus every registered farm
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BoostAccounting {
    escrow: VeEscrow,
    farms: BTreeMap<RewarderId, BoostedFarm>,
}

impl BoostAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn escrow(&self) -> &VeEscrow {
        &self.escrow
    }

    pub fn farm(&self, rewarder: &RewarderId) -> McUsdResult<&BoostedFarm> {
        self.farms
            .get(rewarder)
            .ok_or(McUsdError::UnknownRewarder { rewarder: *rewarder })
    }

    fn farm_mut(&mut self, rewarder: &RewarderId) -> McUsdResult<&mut BoostedFarm> {
        self.farms
            .get_mut(rewarder)
            .ok_or(McUsdError::UnknownRewarder { rewarder: *rewarder })
    }

    pub fn add_rewarder(&mut self, rewarder: RewarderId) -> McUsdResult<()> {
        if self.farms.contains_key(&rewarder) {
            return Err(McUsdError::RewarderAlreadyExists { rewarder });
        }
        self.farms.insert(rewarder, BoostedFarm::new(rewarder));
        Ok(())
    }

    // ============ Escrow ============

    pub fn lock(&mut self, owner: Address, amount: u128, now: u64, events: &mut EventLog) -> McUsdResult<()> {
        self.escrow.lock(owner, amount, now, events)
    }

    /// Unlock and drop the owner's boost in every farm it was allocated to
    pub fn unlock(&mut self, owner: Address, amount: u128, now: u64, events: &mut EventLog) -> McUsdResult<UnlockResult> {
        let result = self.escrow.unlock(owner, amount, now, events)?;
        for rewarder in result.released.keys() {
            self.farm_mut(rewarder)?.set_allocation(owner, 0)?;
        }
        Ok(result)
    }

    pub fn accrue(&mut self, owner: &Address, now: u64) -> McUsdResult<u128> {
        self.escrow.accrue(owner, now)
    }

    pub fn allocate(
        &mut self,
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<()> {
        self.farm(&rewarder)?;
        let allocation = self.escrow.allocate(owner, rewarder, amount, now, events)?;
        self.farm_mut(&rewarder)?.set_allocation(owner, allocation)
    }

    pub fn deallocate(
        &mut self,
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<()> {
        self.farm(&rewarder)?;
        let allocation = self.escrow.deallocate(owner, rewarder, amount, now, events)?;
        self.farm_mut(&rewarder)?.set_allocation(owner, allocation)
    }

    // ============ Farms ============

    pub fn stake_lp(
        &mut self,
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<()> {
        self.farm_mut(&rewarder)?.stake_lp(owner, amount, now, events)
    }

    pub fn unstake_lp(
        &mut self,
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<()> {
        self.farm_mut(&rewarder)?.unstake_lp(owner, amount, now, events)
    }

    pub fn distribute_epoch(
        &mut self,
        rewarder: RewarderId,
        reward: u128,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<()> {
        self.farm_mut(&rewarder)?.distribute_epoch(reward, now, events)
    }

    pub fn claim(&mut self, owner: Address, rewarder: RewarderId, now: u64, events: &mut EventLog) -> McUsdResult<u128> {
        self.farm_mut(&rewarder)?.claim(owner, now, events)
    }

    pub fn pending_rewards(&self, owner: &Address, rewarder: &RewarderId) -> McUsdResult<u128> {
        self.farm(rewarder)?.pending_rewards(owner)
    }
}
