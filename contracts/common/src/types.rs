//! Core Types for mcUSD Protocol
//!
//! Identifiers, well-known protocol accounts and the trove record shared by
//! every component.

use crate::{BTreeMap, Vec};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Type alias for addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for token / collateral asset identifiers
pub type AssetId = [u8; 32];

/// Type alias for trove identifiers
pub type TroveId = [u8; 32];

/// Type alias for ve-boost rewarder (farm) identifiers
pub type RewarderId = [u8; 32];

/// Collateral basket: asset -> amount in the asset's base units
pub type CollateralAmounts = BTreeMap<AssetId, u128>;

/// Pads a short tag into a 32-byte identifier
pub const fn tagged_id(tag: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < tag.len() && i < 32 {
        out[i] = tag[i];
        i += 1;
    }
    out
}

/// Well-known protocol accounts inside the token ledger
pub mod accounts {
    use super::{tagged_id, Address, AssetId};

    /// The mcUSD stablecoin token id
    pub const STABLECOIN: AssetId = tagged_id(b"mcusd:stablecoin");

    /// Holds collateral and nothing else for active troves
    pub const ACTIVE_POOL: Address = tagged_id(b"mcusd:active-pool");

    /// Holds redistributed collateral not yet absorbed by troves
    pub const DEFAULT_POOL: Address = tagged_id(b"mcusd:default-pool");

    /// Holds stablecoin deposits and collateral gains of the Stability Pool
    pub const STABILITY_POOL: Address = tagged_id(b"mcusd:stability-pool");

    /// Holds the liquidation reserve of every active trove
    pub const GAS_POOL: Address = tagged_id(b"mcusd:gas-pool");

    /// Holds collateral surplus claimable by former trove owners
    pub const COLL_SURPLUS_POOL: Address = tagged_id(b"mcusd:coll-surplus");

    /// Receives borrowing and redemption fees
    pub const FEE_RECIPIENT: Address = tagged_id(b"mcusd:fee-recipient");
}

/// Derives a deterministic trove id from the owner and a protocol nonce
pub fn derive_trove_id(owner: &Address, nonce: u64) -> TroveId {
    let mut hasher = Sha256::new();
    hasher.update(b"mcusd:trove");
    hasher.update(owner);
    hasher.update(nonce.to_le_bytes());
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}

// ============ Trove Types ============

/// Lifecycle of a trove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum TroveStatus {
    #[default]
    NonExistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
    ClosedByRedemption,
}

impl TroveStatus {
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::ClosedByOwner | Self::ClosedByLiquidation | Self::ClosedByRedemption
        )
    }
}

/// Redistribution counters a trove saw at its last touch, per stake asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RewardSnapshot {
    /// Collateral of each asset per unit of this stake
    pub coll_per_stake: BTreeMap<AssetId, u128>,
    /// Debt per unit of this stake
    pub debt_per_stake: u128,
}

/// Individual trove state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Trove {
    /// Unique identifier for this trove
    pub id: TroveId,
    /// Owner's address
    pub owner: Address,
    /// Current status
    pub status: TroveStatus,
    /// Recorded collateral per asset (excludes pending redistribution)
    pub collateral: CollateralAmounts,
    /// Recorded debt including the liquidation reserve (excludes pending)
    pub debt: u128,
    /// Redistribution stake per asset
    pub stakes: BTreeMap<AssetId, u128>,
    /// Redistribution counters at last touch, keyed by stake asset
    pub snapshots: BTreeMap<AssetId, RewardSnapshot>,
    /// Timestamp of creation
    pub created_at: u64,
    /// Timestamp of last mutation
    pub last_updated: u64,
}

impl Trove {
    /// Creates an empty active trove
    pub fn new(id: TroveId, owner: Address, now: u64) -> Self {
        Self {
            id,
            owner,
            status: TroveStatus::Active,
            collateral: BTreeMap::new(),
            debt: 0,
            stakes: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Returns true if trove is active
    pub fn is_active(&self) -> bool {
        self.status == TroveStatus::Active
    }

    /// Recorded amount of one collateral asset
    pub fn collateral_of(&self, asset: &AssetId) -> u128 {
        self.collateral.get(asset).copied().unwrap_or(0)
    }

    /// Debt excluding the liquidation reserve
    pub fn net_debt(&self, liquidation_reserve: u128) -> u128 {
        self.debt.saturating_sub(liquidation_reserve)
    }

    /// Assets with a non-zero recorded amount
    pub fn assets(&self) -> Vec<AssetId> {
        self.collateral
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(asset, _)| *asset)
            .collect()
    }

    /// Closes the trove and zeroes its ledger entry
    pub fn close(&mut self, status: TroveStatus, now: u64) {
        self.status = status;
        self.collateral.clear();
        self.debt = 0;
        self.stakes.clear();
        self.snapshots.clear();
        self.last_updated = now;
    }
}

/// Collateral and debt a trove is owed from redistributions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PendingRewards {
    pub collateral: CollateralAmounts,
    pub debt: u128,
}

impl PendingRewards {
    pub fn is_empty(&self) -> bool {
        self.debt == 0 && self.collateral.values().all(|amount| *amount == 0)
    }
}

/// A trove's collateral and debt with pending rewards applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EntireTrove {
    pub collateral: CollateralAmounts,
    pub debt: u128,
    pub pending: PendingRewards,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trove_ids_are_deterministic_and_distinct() {
        let owner = [7u8; 32];
        assert_eq!(derive_trove_id(&owner, 1), derive_trove_id(&owner, 1));
        assert_ne!(derive_trove_id(&owner, 1), derive_trove_id(&owner, 2));
        assert_ne!(derive_trove_id(&owner, 1), derive_trove_id(&[8u8; 32], 1));
    }

    #[test]
    fn test_protocol_accounts_distinct() {
        let all = [
            accounts::STABLECOIN,
            accounts::ACTIVE_POOL,
            accounts::DEFAULT_POOL,
            accounts::STABILITY_POOL,
            accounts::GAS_POOL,
            accounts::COLL_SURPLUS_POOL,
            accounts::FEE_RECIPIENT,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in all.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_close_zeroes_entry() {
        let mut trove = Trove::new([1u8; 32], [2u8; 32], 10);
        trove.collateral.insert([3u8; 32], 500);
        trove.debt = 1_000;
        trove.stakes.insert([3u8; 32], 500);

        trove.close(TroveStatus::ClosedByLiquidation, 20);

        assert!(!trove.is_active());
        assert!(trove.status.is_closed());
        assert_eq!(trove.debt, 0);
        assert!(trove.collateral.is_empty());
        assert!(trove.stakes.is_empty());
        assert_eq!(trove.last_updated, 20);
    }
}
