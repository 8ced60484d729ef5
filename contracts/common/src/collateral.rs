//! Collateral Registry
//!
//! Maps every onboarded collateral asset to its decimals, risk weight
//! (safety ratio) and price source. Assets are never deleted; a deprecated
//! asset becomes withdraw-only.
//!
//! ## Valuation
//!
//! - **Value**: `amount × price / 10^decimals`, used by redemptions and ICR
//! - **Weighted value**: value × safety ratio, used by AICR and TCR

use crate::constants::{collateral::{MAX_COLLATERAL_TYPES, MAX_DECIMALS}, ratios::MAX_SAFETY_RATIO};
use crate::errors::{McUsdError, McUsdResult};
use crate::math::{collateral_value, safe_add, weighted};
use crate::oracle::{validate_price, PriceFeed};
use crate::types::{AssetId, CollateralAmounts};
use crate::{BTreeMap, Vec};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// Configuration for one collateral asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CollateralAsset {
    /// Token identifier
    pub id: AssetId,
    /// Decimal precision of the token
    pub decimals: u8,
    /// Risk weight in (0, 1e18]
    pub safety_ratio: u128,
    /// Key queried on the price feed
    pub price_feed: AssetId,
    /// Inactive assets are withdraw-only
    pub active: bool,
}

impl CollateralAsset {
    /// New active asset priced under its own id
    pub fn new(id: AssetId, decimals: u8, safety_ratio: u128) -> Self {
        Self {
            id,
            decimals,
            safety_ratio,
            price_feed: id,
            active: true,
        }
    }
}

/// Prices resolved once per transaction
pub type PriceSnapshot = BTreeMap<AssetId, u64>;

/// Unweighted and weighted value of a collateral basket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasketValue {
    pub value: u128,
    pub weighted: u128,
}

/// Onboarded collateral assets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CollateralRegistry {
    assets: BTreeMap<AssetId, CollateralAsset>,
}

impl CollateralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Onboard a new collateral asset
    pub fn add_asset(&mut self, asset: CollateralAsset) -> McUsdResult<()> {
        if self.assets.contains_key(&asset.id) {
            return Err(McUsdError::CollateralAlreadyRegistered { asset: asset.id });
        }
        if self.assets.len() >= MAX_COLLATERAL_TYPES {
            return Err(McUsdError::TooManyCollateralTypes { max: MAX_COLLATERAL_TYPES });
        }
        if asset.decimals > MAX_DECIMALS {
            return Err(McUsdError::InvalidParameter {
                param: "decimals",
                reason: "too many decimals",
            });
        }
        check_safety_ratio(asset.safety_ratio)?;

        log::debug!("collateral registered: {:02x?}", &asset.id[..4]);
        self.assets.insert(asset.id, asset);
        Ok(())
    }

    /// Update a risk weight, returning the previous one
    pub fn set_safety_ratio(&mut self, asset: &AssetId, ratio: u128) -> McUsdResult<u128> {
        check_safety_ratio(ratio)?;
        let entry = self
            .assets
            .get_mut(asset)
            .ok_or(McUsdError::UnknownCollateral { asset: *asset })?;
        let old = entry.safety_ratio;
        entry.safety_ratio = ratio;
        Ok(old)
    }

    /// Activate or deprecate an asset
    pub fn set_active(&mut self, asset: &AssetId, active: bool) -> McUsdResult<()> {
        let entry = self
            .assets
            .get_mut(asset)
            .ok_or(McUsdError::UnknownCollateral { asset: *asset })?;
        entry.active = active;
        Ok(())
    }

    /// Look up an asset
    pub fn get(&self, asset: &AssetId) -> McUsdResult<&CollateralAsset> {
        self.assets
            .get(asset)
            .ok_or(McUsdError::UnknownCollateral { asset: *asset })
    }

    /// Look up an asset that accepts new deposits
    pub fn get_depositable(&self, asset: &AssetId) -> McUsdResult<&CollateralAsset> {
        let config = self.get(asset)?;
        if !config.active {
            return Err(McUsdError::CollateralInactive { asset: *asset });
        }
        Ok(config)
    }

    pub fn contains(&self, asset: &AssetId) -> bool {
        self.assets.contains_key(asset)
    }

    /// All asset ids in deterministic order
    pub fn assets(&self) -> Vec<AssetId> {
        self.assets.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Validated oracle price for an asset
    pub fn price_of<F: PriceFeed + ?Sized>(
        &self,
        feed: &F,
        asset: &AssetId,
        now: u64,
        max_age: u64,
    ) -> McUsdResult<u64> {
        let config = self.get(asset)?;
        let data = feed.get_price(&config.price_feed)?;
        validate_price(asset, data, now, max_age)
    }

    /// Unweighted USD value of an amount
    pub fn value_of(&self, asset: &AssetId, amount: u128, price: u64) -> McUsdResult<u128> {
        let config = self.get(asset)?;
        collateral_value(amount, price, config.decimals)
    }

    /// Safety-ratio-weighted USD value of an amount
    pub fn weighted_value_of(&self, asset: &AssetId, amount: u128, price: u64) -> McUsdResult<u128> {
        let config = self.get(asset)?;
        weighted(collateral_value(amount, price, config.decimals)?, config.safety_ratio)
    }

    /// Value a whole basket with prices resolved for this transaction
    pub fn basket_value(
        &self,
        basket: &CollateralAmounts,
        prices: &PriceSnapshot,
    ) -> McUsdResult<BasketValue> {
        let mut total = BasketValue::default();
        for (asset, amount) in basket {
            if *amount == 0 {
                continue;
            }
            let config = self.get(asset)?;
            let price = *prices
                .get(asset)
                .ok_or(McUsdError::PriceUnavailable { asset: *asset })?;
            let value = collateral_value(*amount, price, config.decimals)?;
            total.value = safe_add(total.value, value)?;
            total.weighted = safe_add(total.weighted, weighted(value, config.safety_ratio)?)?;
        }
        Ok(total)
    }
}

fn check_safety_ratio(ratio: u128) -> McUsdResult<()> {
    if ratio == 0 || ratio > MAX_SAFETY_RATIO {
        return Err(McUsdError::InvalidSafetyRatio { ratio });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::precision::ONE_PERCENT;
    use crate::oracle::MockPriceFeed;

    const BTC: AssetId = [1u8; 32];
    const ETH: AssetId = [2u8; 32];
    const ONE_BTC: u128 = 100_000_000;

    fn registry() -> CollateralRegistry {
        let mut reg = CollateralRegistry::new();
        reg.add_asset(CollateralAsset::new(BTC, 8, 100 * ONE_PERCENT)).unwrap();
        reg.add_asset(CollateralAsset::new(ETH, 18, 80 * ONE_PERCENT)).unwrap();
        reg
    }

    #[test]
    fn test_add_and_duplicate() {
        let mut reg = registry();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.assets(), vec![BTC, ETH]);
        assert_eq!(
            reg.add_asset(CollateralAsset::new(BTC, 8, ONE_PERCENT)),
            Err(McUsdError::CollateralAlreadyRegistered { asset: BTC })
        );
    }

    #[test]
    fn test_safety_ratio_bounds() {
        let mut reg = registry();
        assert_eq!(
            reg.set_safety_ratio(&BTC, 0),
            Err(McUsdError::InvalidSafetyRatio { ratio: 0 })
        );
        assert!(reg.set_safety_ratio(&BTC, 101 * ONE_PERCENT).is_err());
        assert_eq!(reg.set_safety_ratio(&BTC, 90 * ONE_PERCENT).unwrap(), 100 * ONE_PERCENT);
        assert_eq!(reg.get(&BTC).unwrap().safety_ratio, 90 * ONE_PERCENT);
    }

    #[test]
    fn test_inactive_is_withdraw_only() {
        let mut reg = registry();
        reg.set_active(&ETH, false).unwrap();
        assert!(reg.get(&ETH).is_ok());
        assert_eq!(
            reg.get_depositable(&ETH),
            Err(McUsdError::CollateralInactive { asset: ETH })
        );
        assert!(reg.get_depositable(&BTC).is_ok());
    }

    #[test]
    fn test_basket_value_weighted() {
        let reg = registry();
        let mut prices = PriceSnapshot::new();
        prices.insert(BTC, 100_00000000); // $100
        prices.insert(ETH, 10_00000000); // $10

        let mut basket = CollateralAmounts::new();
        basket.insert(BTC, ONE_BTC);
        basket.insert(ETH, 10u128.pow(18));

        let v = reg.basket_value(&basket, &prices).unwrap();
        assert_eq!(v.value, 110_00000000);
        assert_eq!(v.weighted, 100_00000000 + 8_00000000);
    }

    #[test]
    fn test_price_of_uses_feed_and_staleness() {
        let reg = registry();
        let mut feed = MockPriceFeed::new();
        feed.set_price(BTC, 100_00000000, 1_000);

        assert_eq!(reg.price_of(&feed, &BTC, 1_100, 3_600).unwrap(), 100_00000000);
        assert!(matches!(
            reg.price_of(&feed, &BTC, 10_000, 3_600),
            Err(McUsdError::OracleStale { .. })
        ));
        assert!(matches!(
            reg.price_of(&feed, &[9u8; 32], 1_100, 3_600),
            Err(McUsdError::UnknownCollateral { .. })
        ));
    }
}
