//! Protocol Constants
//!
//! All magic numbers and default configuration values for the mcUSD protocol.
//! Governance-tunable values are only defaults here; the live values are read
//! from [`crate::config::ProtocolParams`] on every call.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (higher minimums, proper gas compensation)
//! - Default (no feature) - Testnet values (lower minimums for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! mcusd-common = { path = "...", features = ["mainnet"] }
//! ```

/// Stablecoin units
pub mod token {
    /// One unit with decimals (1 mcUSD = 100_000_000 base units)
    pub const ONE: u128 = 100_000_000;
}

/// Precision constants
pub mod precision {
    /// Fixed-point precision for ratios, rates and accumulators (1e18 == 1.0)
    pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

    /// Percentage helper: 1% in decimal precision
    pub const ONE_PERCENT: u128 = DECIMAL_PRECISION / 100;
}

/// Collateralization ratios (1e18 fixed point, 1.1e18 == 110%)
pub mod ratios {
    use super::precision::ONE_PERCENT;

    /// Minimum Collateral Ratio - below this a trove can be liquidated
    pub const MCR: u128 = 110 * ONE_PERCENT;

    /// Critical Collateral Ratio - system enters Recovery Mode below this TCR
    pub const CCR: u128 = 150 * ONE_PERCENT;

    /// Collateral handed to offset/redistribution is capped at debt x this factor
    pub const LIQUIDATION_BONUS: u128 = 110 * ONE_PERCENT;

    /// Upper bound for a collateral safety ratio (risk weight)
    pub const MAX_SAFETY_RATIO: u128 = 100 * ONE_PERCENT;
}

/// Fee configuration (1e18 fixed point)
pub mod fees {
    use super::precision::{DECIMAL_PRECISION, ONE_PERCENT};

    /// Redemption fee floor (0.5%)
    pub const REDEMPTION_FEE_FLOOR: u128 = ONE_PERCENT / 2;

    /// Borrowing fee floor (0.5%)
    pub const BORROWING_FEE_FLOOR: u128 = ONE_PERCENT / 2;

    /// Maximum borrowing fee (5%)
    pub const MAX_BORROWING_FEE: u128 = 5 * ONE_PERCENT;

    /// Base rate divisor applied to the redeemed fraction of total debt
    pub const BETA: u128 = 2;

    /// Per-minute base rate decay factor: 0.5^(1/720), a 12 hour half-life
    pub const MINUTE_DECAY_FACTOR: u128 = 999_037_758_833_783_000;

    /// Maximum base rate (100%)
    pub const MAX_BASE_RATE: u128 = DECIMAL_PRECISION;
}

/// Debt limits
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod limits {
    use super::token::ONE;

    /// Minimum net debt (debt excluding the liquidation reserve)
    /// - Mainnet: 1,800 mcUSD (keeps liquidation profitable)
    /// - Testnet: 10 mcUSD
    #[cfg(feature = "mainnet")]
    pub const MIN_NET_DEBT: u128 = 1_800 * ONE;
    #[cfg(not(feature = "mainnet"))]
    pub const MIN_NET_DEBT: u128 = 10 * ONE;

    /// Liquidation reserve minted to the gas pool at open, paid to the liquidator
    /// - Mainnet: 200 mcUSD
    /// - Testnet: 2 mcUSD
    #[cfg(feature = "mainnet")]
    pub const LIQUIDATION_RESERVE: u128 = 200 * ONE;
    #[cfg(not(feature = "mainnet"))]
    pub const LIQUIDATION_RESERVE: u128 = 2 * ONE;
}

/// Liquidation configuration
pub mod liquidation {
    /// Collateral gas compensation divisor (1/200 = 0.5% of each asset)
    pub const COLL_GAS_COMPENSATION_DIVISOR: u128 = 200;

    /// Maximum number of troves processed by one batch liquidation
    pub const MAX_BATCH_SIZE: usize = 50;
}

/// Collateral registry configuration
pub mod collateral {
    /// Maximum number of collateral assets
    pub const MAX_COLLATERAL_TYPES: usize = 16;

    /// Maximum decimals for a collateral asset
    pub const MAX_DECIMALS: u8 = 18;
}

/// Oracle configuration
pub mod oracle {
    /// Maximum price age in seconds before it is considered stale (4 hours)
    pub const MAX_PRICE_AGE_SECS: u64 = 4 * 60 * 60;
}

/// Stability Pool configuration
pub mod stability_pool {
    /// Scale factor applied to P when it would drop below this value (1e9)
    pub const SCALE_FACTOR: u128 = 1_000_000_000;

    /// Compounded deposits below initial / this divisor round down to zero
    pub const DUST_DIVISOR: u128 = 1_000_000_000;
}

/// Time-related constants
pub mod time {
    /// Seconds per minute (base rate decays per whole minute)
    pub const SECONDS_PER_MINUTE: u64 = 60;

    /// Seconds per day
    pub const SECONDS_PER_DAY: u64 = 86_400;

    /// Decay exponent cap: 1000 years of minutes
    pub const MAX_DECAY_MINUTES: u64 = 525_600_000;
}

/// Vote-escrow boost configuration
pub mod boost {
    use super::precision::{DECIMAL_PRECISION, ONE_PERCENT};

    /// ve accrual per locked unit per second (1e18 fixed point): 1 ve per locked unit per day
    pub const ACCUMULATION_RATE: u128 = DECIMAL_PRECISION / 86_400;

    /// ve balance cap as a multiple of the locked amount
    pub const MAX_VE_MULTIPLE: u128 = 100;

    /// Share of each epoch's rewards split by LP stake alone (70%)
    pub const BASE_PARTITION: u128 = 70 * ONE_PERCENT;
}
