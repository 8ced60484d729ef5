//! Oracle Interface
//!
//! The price oracle is an external collaborator. The engine only consumes
//! [`PriceFeed`] and treats every answer as untrusted: zero prices and prices
//! older than the configured maximum age are rejected before use.
//!
//! ## Key Features
//!
//! - **Staleness Detection**: reject prices older than `max_price_age`
//! - **Sanity Checks**: reject zero prices
//! - **MockPriceFeed**: settable in-memory feed for simulation and tests

use crate::errors::{McUsdError, McUsdResult};
use crate::types::AssetId;
use crate::BTreeMap;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// Price answer from an oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceData {
    /// USD per whole asset unit, 8 decimals
    pub price: u64,
    /// Unix time the price was observed
    pub timestamp: u64,
}

/// Source of collateral prices
pub trait PriceFeed {
    /// Latest price for an asset
    fn get_price(&self, asset: &AssetId) -> McUsdResult<PriceData>;
}

impl<T: PriceFeed + ?Sized> PriceFeed for &T {
    fn get_price(&self, asset: &AssetId) -> McUsdResult<PriceData> {
        (**self).get_price(asset)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Check an oracle answer against the staleness window
pub fn validate_price(
    asset: &AssetId,
    data: PriceData,
    now: u64,
    max_age: u64,
) -> McUsdResult<u64> {
    if data.price == 0 {
        return Err(McUsdError::InvalidPrice { asset: *asset });
    }
    if now.saturating_sub(data.timestamp) > max_age {
        log::warn!(
            "stale price for asset {:02x?}: updated {} now {}",
            &asset[..4],
            data.timestamp,
            now
        );
        return Err(McUsdError::OracleStale {
            asset: *asset,
            updated_at: data.timestamp,
            now,
            max_age,
        });
    }
    Ok(data.price)
}

// ============================================================================
// In-memory Feed
// ============================================================================

/// Settable price feed
#[derive(Debug, Clone, Default)]
pub struct MockPriceFeed {
    prices: BTreeMap<AssetId, PriceData>,
}

impl MockPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the price of an asset
    pub fn set_price(&mut self, asset: AssetId, price: u64, timestamp: u64) {
        self.prices.insert(asset, PriceData { price, timestamp });
    }

    /// Drop the price of an asset so lookups fail
    pub fn clear_price(&mut self, asset: &AssetId) {
        self.prices.remove(asset);
    }
}

impl PriceFeed for MockPriceFeed {
    fn get_price(&self, asset: &AssetId) -> McUsdResult<PriceData> {
        self.prices
            .get(asset)
            .copied()
            .ok_or(McUsdError::PriceUnavailable { asset: *asset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BTC: AssetId = [1u8; 32];
    const BTC_PRICE_100K: u64 = 100_000_00000000;

    #[test]
    fn test_mock_feed() {
        let mut feed = MockPriceFeed::new();
        assert_eq!(
            feed.get_price(&BTC),
            Err(McUsdError::PriceUnavailable { asset: BTC })
        );

        feed.set_price(BTC, BTC_PRICE_100K, 1_000);
        let data = feed.get_price(&BTC).unwrap();
        assert_eq!(data.price, BTC_PRICE_100K);

        feed.clear_price(&BTC);
        assert!(feed.get_price(&BTC).is_err());
    }

    #[test]
    fn test_staleness() {
        let data = PriceData { price: BTC_PRICE_100K, timestamp: 1_000 };

        assert_eq!(validate_price(&BTC, data, 1_000 + 3_600, 3_600).unwrap(), BTC_PRICE_100K);
        assert!(matches!(
            validate_price(&BTC, data, 1_000 + 3_601, 3_600),
            Err(McUsdError::OracleStale { .. })
        ));
    }

    #[test]
    fn test_zero_price_rejected() {
        let data = PriceData { price: 0, timestamp: 1_000 };
        assert_eq!(
            validate_price(&BTC, data, 1_000, 3_600),
            Err(McUsdError::InvalidPrice { asset: BTC })
        );
    }
}
