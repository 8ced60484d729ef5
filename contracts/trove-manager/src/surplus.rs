//! Collateral Surplus
//!
//! Collateral left over after a capped liquidation or a full redemption is
//! owed to the former trove owner and can be claimed once.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use mcusd_common::{
    errors::{McUsdError, McUsdResult},
    events::{EventLog, McUsdEvent},
    types::{Address, CollateralAmounts},
    BTreeMap,
};

use crate::trove::{add_basket, sub_basket};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CollateralSurplus {
    balances: BTreeMap<Address, CollateralAmounts>,
    totals: CollateralAmounts,
}

impl CollateralSurplus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `collateral` to `owner`. Empty baskets are ignored.
    pub fn record(
        &mut self,
        owner: Address,
        collateral: &CollateralAmounts,
        now: u64,
        events: &mut EventLog,
    ) -> McUsdResult<()> {
        if collateral.values().all(|a| *a == 0) {
            return Ok(());
        }
        add_basket(self.balances.entry(owner).or_default(), collateral)?;
        add_basket(&mut self.totals, collateral)?;

        events.emit(McUsdEvent::SurplusRecorded {
            owner,
            collateral: collateral.clone(),
            timestamp: now,
        });
        Ok(())
    }

    /// Remove and return everything owed to `owner`
    pub fn claim(&mut self, owner: Address, now: u64, events: &mut EventLog) -> McUsdResult<CollateralAmounts> {
        let owed = self
            .balances
            .remove(&owner)
            .ok_or(McUsdError::SurplusNotFound { owner })?;
        sub_basket(&mut self.totals, &owed, "surplus totals underflow")?;

        events.emit(McUsdEvent::SurplusClaimed {
            owner,
            collateral: owed.clone(),
            timestamp: now,
        });
        Ok(owed)
    }

    /// Surplus owed to `owner`, empty if none
    pub fn get(&self, owner: &Address) -> CollateralAmounts {
        self.balances.get(owner).cloned().unwrap_or_default()
    }

    /// Surplus owed to everyone, per asset
    pub fn total(&self) -> &CollateralAmounts {
        &self.totals
    }
}
