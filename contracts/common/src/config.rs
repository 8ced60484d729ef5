//! Protocol Parameters
//!
//! Governance-supplied configuration. The live [`ProtocolParams`] sit inside
//! the system state and are read on every call; nothing caches them across
//! transactions. Every replacement bumps `version`.

use crate::constants::{fees, limits, liquidation, oracle, precision, ratios};
use crate::errors::{McUsdError, McUsdResult};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Versioned risk and fee configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProtocolParams {
    /// Monotonic configuration version
    pub version: u64,
    /// Minimum collateral ratio (1e18)
    pub mcr: u128,
    /// Critical collateral ratio, recovery mode threshold (1e18)
    pub ccr: u128,
    /// Seized collateral cap as a multiple of debt (1e18)
    pub liquidation_bonus: u128,
    /// Redemption fee floor (1e18)
    pub redemption_fee_floor: u128,
    /// Borrowing fee floor (1e18)
    pub borrowing_fee_floor: u128,
    /// Borrowing fee cap (1e18)
    pub max_borrowing_fee: u128,
    /// Base rate increase divisor
    pub beta: u128,
    /// Per-minute base rate decay factor (1e18)
    pub minute_decay_factor: u128,
    /// Minimum debt excluding the liquidation reserve
    pub min_net_debt: u128,
    /// Stablecoin held by the gas pool per trove
    pub liquidation_reserve: u128,
    /// Liquidator receives 1/divisor of each collateral asset
    pub coll_gas_compensation_divisor: u128,
    /// Maximum troves per batch liquidation
    pub max_liquidation_batch: usize,
    /// Maximum oracle price age in seconds
    pub max_price_age: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            version: 1,
            mcr: ratios::MCR,
            ccr: ratios::CCR,
            liquidation_bonus: ratios::LIQUIDATION_BONUS,
            redemption_fee_floor: fees::REDEMPTION_FEE_FLOOR,
            borrowing_fee_floor: fees::BORROWING_FEE_FLOOR,
            max_borrowing_fee: fees::MAX_BORROWING_FEE,
            beta: fees::BETA,
            minute_decay_factor: fees::MINUTE_DECAY_FACTOR,
            min_net_debt: limits::MIN_NET_DEBT,
            liquidation_reserve: limits::LIQUIDATION_RESERVE,
            coll_gas_compensation_divisor: liquidation::COLL_GAS_COMPENSATION_DIVISOR,
            max_liquidation_batch: liquidation::MAX_BATCH_SIZE,
            max_price_age: oracle::MAX_PRICE_AGE_SECS,
        }
    }
}

impl ProtocolParams {
    /// Reject internally inconsistent configurations
    pub fn validate(&self) -> McUsdResult<()> {
        let one = precision::DECIMAL_PRECISION;

        if self.mcr <= one {
            return Err(invalid("mcr", "must exceed 100%"));
        }
        if self.ccr < self.mcr {
            return Err(invalid("ccr", "must be at least mcr"));
        }
        if self.liquidation_bonus < one || self.liquidation_bonus > self.mcr {
            return Err(invalid("liquidation_bonus", "must lie in [100%, mcr]"));
        }
        if self.redemption_fee_floor > one {
            return Err(invalid("redemption_fee_floor", "must not exceed 100%"));
        }
        if self.borrowing_fee_floor > self.max_borrowing_fee || self.max_borrowing_fee > one {
            return Err(invalid("max_borrowing_fee", "must lie in [floor, 100%]"));
        }
        if self.beta == 0 {
            return Err(invalid("beta", "must be non-zero"));
        }
        if self.minute_decay_factor == 0 || self.minute_decay_factor >= one {
            return Err(invalid("minute_decay_factor", "must lie in (0, 1)"));
        }
        if self.min_net_debt == 0 {
            return Err(invalid("min_net_debt", "must be non-zero"));
        }
        if self.coll_gas_compensation_divisor == 0 {
            return Err(invalid("coll_gas_compensation_divisor", "must be non-zero"));
        }
        if self.max_liquidation_batch == 0 {
            return Err(invalid("max_liquidation_batch", "must be non-zero"));
        }
        if self.max_price_age == 0 {
            return Err(invalid("max_price_age", "must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(param: &'static str, reason: &'static str) -> McUsdError {
    McUsdError::InvalidParameter { param, reason }
}
