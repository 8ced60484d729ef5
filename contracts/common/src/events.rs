//! Protocol Events for mcUSD
//!
//! Events are emitted during execution and indexed off-chain; they are the
//! only integration path for frontends. Each mutating call collects its events
//! in an [`EventLog`] which the transaction layer publishes after commit.

use crate::types::{Address, AssetId, CollateralAmounts, RewarderId, TroveId, TroveStatus};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Trove Events (0x01 - 0x1F)
    TroveOpened = 0x01,
    TroveAdjusted = 0x02,
    TroveClosed = 0x03,
    TroveLiquidated = 0x04,
    TroveRedeemed = 0x05,
    PendingRewardsApplied = 0x06,

    // Stability Pool Events (0x20 - 0x3F)
    StabilityDeposit = 0x20,
    StabilityWithdrawal = 0x21,
    CollateralGainClaimed = 0x22,
    LiquidationOffset = 0x23,

    // Redemption / Fee Events (0x40 - 0x5F)
    Redemption = 0x40,
    BaseRateUpdated = 0x41,

    // Surplus Events (0x60 - 0x6F)
    SurplusRecorded = 0x60,
    SurplusClaimed = 0x61,

    // Protocol Events (0x80 - 0x9F)
    CollateralRegistered = 0x80,
    SafetyRatioUpdated = 0x81,
    CollateralActivationChanged = 0x82,
    ParamsUpdated = 0x83,

    // Boost Events (0xA0 - 0xBF)
    VeLocked = 0xA0,
    VeUnlocked = 0xA1,
    VeAllocated = 0xA2,
    VeDeallocated = 0xA3,
    LpStaked = 0xA4,
    LpUnstaked = 0xA5,
    FarmEpochDistributed = 0xA6,
    FarmRewardClaimed = 0xA7,
}

/// Main event enum containing all possible protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum McUsdEvent {
    // ============ Trove Events ============

    /// Emitted when a new trove is opened
    TroveOpened {
        trove_id: TroveId,
        owner: Address,
        collateral: CollateralAmounts,
        debt: u128,
        fee: u128,
        timestamp: u64,
    },

    /// Emitted after any owner adjustment, with the resulting position
    TroveAdjusted {
        trove_id: TroveId,
        collateral: CollateralAmounts,
        debt: u128,
        fee: u128,
        timestamp: u64,
    },

    /// Emitted when the owner closes a trove
    TroveClosed {
        trove_id: TroveId,
        owner: Address,
        collateral_returned: CollateralAmounts,
        debt_repaid: u128,
        timestamp: u64,
    },

    /// Emitted when a trove is liquidated
    TroveLiquidated {
        trove_id: TroveId,
        owner: Address,
        liquidator: Address,
        debt_offset: u128,
        debt_redistributed: u128,
        coll_offset: CollateralAmounts,
        coll_redistributed: CollateralAmounts,
        coll_surplus: CollateralAmounts,
        coll_gas_compensation: CollateralAmounts,
        reserve_compensation: u128,
        recovery_mode: bool,
        timestamp: u64,
    },

    /// Emitted for each trove touched by a redemption
    TroveRedeemed {
        trove_id: TroveId,
        debt_redeemed: u128,
        collateral_drawn: CollateralAmounts,
        status: TroveStatus,
        timestamp: u64,
    },

    /// Emitted when a trove absorbs pending redistribution rewards
    PendingRewardsApplied {
        trove_id: TroveId,
        collateral: CollateralAmounts,
        debt: u128,
        timestamp: u64,
    },

    // ============ Stability Pool Events ============

    /// Emitted when stablecoin is deposited to the Stability Pool
    StabilityDeposit {
        depositor: Address,
        amount: u128,
        new_deposit: u128,
        timestamp: u64,
    },

    /// Emitted when stablecoin is withdrawn from the Stability Pool
    StabilityWithdrawal {
        depositor: Address,
        amount: u128,
        new_deposit: u128,
        timestamp: u64,
    },

    /// Emitted when a depositor receives collateral gains
    CollateralGainClaimed {
        depositor: Address,
        gains: CollateralAmounts,
        timestamp: u64,
    },

    /// Emitted when liquidated debt is absorbed by the pool
    LiquidationOffset {
        debt_offset: u128,
        coll_added: CollateralAmounts,
        epoch: u64,
        scale: u64,
        p: u128,
        timestamp: u64,
    },

    // ============ Redemption / Fee Events ============

    /// Emitted once per redemption call
    Redemption {
        redeemer: Address,
        attempted: u128,
        redeemed: u128,
        fee_rate: u128,
        collateral_sent: CollateralAmounts,
        collateral_fee: CollateralAmounts,
        timestamp: u64,
    },

    /// Emitted when the base rate changes
    BaseRateUpdated {
        base_rate: u128,
        timestamp: u64,
    },

    // ============ Surplus Events ============

    /// Emitted when collateral is set aside for a former owner
    SurplusRecorded {
        owner: Address,
        collateral: CollateralAmounts,
        timestamp: u64,
    },

    /// Emitted when an owner claims their surplus
    SurplusClaimed {
        owner: Address,
        collateral: CollateralAmounts,
        timestamp: u64,
    },

    // ============ Protocol Events ============

    /// Emitted when a collateral asset is onboarded
    CollateralRegistered {
        asset: AssetId,
        decimals: u8,
        safety_ratio: u128,
        timestamp: u64,
    },

    /// Emitted when governance changes a risk weight
    SafetyRatioUpdated {
        asset: AssetId,
        old_ratio: u128,
        new_ratio: u128,
        timestamp: u64,
    },

    /// Emitted when an asset is activated or deprecated
    CollateralActivationChanged {
        asset: AssetId,
        active: bool,
        timestamp: u64,
    },

    /// Emitted when protocol parameters are replaced
    ParamsUpdated {
        version: u64,
        timestamp: u64,
    },

    // ============ Boost Events ============

    VeLocked {
        owner: Address,
        amount: u128,
        total_locked: u128,
        timestamp: u64,
    },

    /// Any unlock forfeits the whole ve balance
    VeUnlocked {
        owner: Address,
        amount: u128,
        ve_forfeited: u128,
        timestamp: u64,
    },

    VeAllocated {
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        timestamp: u64,
    },

    VeDeallocated {
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        timestamp: u64,
    },

    LpStaked {
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        timestamp: u64,
    },

    LpUnstaked {
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        timestamp: u64,
    },

    FarmEpochDistributed {
        rewarder: RewarderId,
        epoch: u64,
        base_reward: u128,
        boost_reward: u128,
        timestamp: u64,
    },

    FarmRewardClaimed {
        owner: Address,
        rewarder: RewarderId,
        amount: u128,
        timestamp: u64,
    },
}

impl McUsdEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::TroveOpened { .. } => EventType::TroveOpened,
            Self::TroveAdjusted { .. } => EventType::TroveAdjusted,
            Self::TroveClosed { .. } => EventType::TroveClosed,
            Self::TroveLiquidated { .. } => EventType::TroveLiquidated,
            Self::TroveRedeemed { .. } => EventType::TroveRedeemed,
            Self::PendingRewardsApplied { .. } => EventType::PendingRewardsApplied,
            Self::StabilityDeposit { .. } => EventType::StabilityDeposit,
            Self::StabilityWithdrawal { .. } => EventType::StabilityWithdrawal,
            Self::CollateralGainClaimed { .. } => EventType::CollateralGainClaimed,
            Self::LiquidationOffset { .. } => EventType::LiquidationOffset,
            Self::Redemption { .. } => EventType::Redemption,
            Self::BaseRateUpdated { .. } => EventType::BaseRateUpdated,
            Self::SurplusRecorded { .. } => EventType::SurplusRecorded,
            Self::SurplusClaimed { .. } => EventType::SurplusClaimed,
            Self::CollateralRegistered { .. } => EventType::CollateralRegistered,
            Self::SafetyRatioUpdated { .. } => EventType::SafetyRatioUpdated,
            Self::CollateralActivationChanged { .. } => EventType::CollateralActivationChanged,
            Self::ParamsUpdated { .. } => EventType::ParamsUpdated,
            Self::VeLocked { .. } => EventType::VeLocked,
            Self::VeUnlocked { .. } => EventType::VeUnlocked,
            Self::VeAllocated { .. } => EventType::VeAllocated,
            Self::VeDeallocated { .. } => EventType::VeDeallocated,
            Self::LpStaked { .. } => EventType::LpStaked,
            Self::LpUnstaked { .. } => EventType::LpUnstaked,
            Self::FarmEpochDistributed { .. } => EventType::FarmEpochDistributed,
            Self::FarmRewardClaimed { .. } => EventType::FarmRewardClaimed,
        }
    }

    /// Get the time the event occurred
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::TroveOpened { timestamp, .. }
            | Self::TroveAdjusted { timestamp, .. }
            | Self::TroveClosed { timestamp, .. }
            | Self::TroveLiquidated { timestamp, .. }
            | Self::TroveRedeemed { timestamp, .. }
            | Self::PendingRewardsApplied { timestamp, .. }
            | Self::StabilityDeposit { timestamp, .. }
            | Self::StabilityWithdrawal { timestamp, .. }
            | Self::CollateralGainClaimed { timestamp, .. }
            | Self::LiquidationOffset { timestamp, .. }
            | Self::Redemption { timestamp, .. }
            | Self::BaseRateUpdated { timestamp, .. }
            | Self::SurplusRecorded { timestamp, .. }
            | Self::SurplusClaimed { timestamp, .. }
            | Self::CollateralRegistered { timestamp, .. }
            | Self::SafetyRatioUpdated { timestamp, .. }
            | Self::CollateralActivationChanged { timestamp, .. }
            | Self::ParamsUpdated { timestamp, .. }
            | Self::VeLocked { timestamp, .. }
            | Self::VeUnlocked { timestamp, .. }
            | Self::VeAllocated { timestamp, .. }
            | Self::VeDeallocated { timestamp, .. }
            | Self::LpStaked { timestamp, .. }
            | Self::LpUnstaked { timestamp, .. }
            | Self::FarmEpochDistributed { timestamp, .. }
            | Self::FarmRewardClaimed { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting multiple events during execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<McUsdEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: McUsdEvent) {
        log::trace!("event {:?}", event.event_type());
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[McUsdEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<McUsdEvent> {
        self.events
    }

    /// Append every event of another log, preserving order
    pub fn extend(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&McUsdEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
