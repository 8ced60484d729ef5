//! Base Rate and Fees
//!
//! The base rate rises with every redemption and decays exponentially
//! toward zero, halving every 12 hours with the default decay factor.
//! Borrowing and redemption fees are the floor plus the decayed base rate.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use mcusd_common::{
    config::ProtocolParams,
    constants::{fees::MAX_BASE_RATE, precision::DECIMAL_PRECISION, time::SECONDS_PER_MINUTE},
    errors::{McUsdError, McUsdResult},
    math::{dec_mul, dec_pow, mul_div, safe_add},
};

/// Base rate and the time it was last touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FeeState {
    /// 1e18 == 100%
    pub base_rate: u128,
    /// Only advanced in whole minutes
    pub last_fee_operation_time: u64,
}

impl FeeState {
    /// Whole minutes elapsed since the last fee operation
    pub fn minutes_passed(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_fee_operation_time) / SECONDS_PER_MINUTE
    }

    /// Base rate decayed to `now`
    pub fn decayed_base_rate(&self, params: &ProtocolParams, now: u64) -> McUsdResult<u128> {
        let factor = dec_pow(params.minute_decay_factor, self.minutes_passed(now))?;
        dec_mul(self.base_rate, factor)
    }

    /// Redemption rate for a given base rate
    pub fn redemption_rate(params: &ProtocolParams, base_rate: u128) -> McUsdResult<u128> {
        Ok(safe_add(params.redemption_fee_floor, base_rate)?.min(DECIMAL_PRECISION))
    }

    /// Redemption rate if a redemption happened at `now` without moving the base rate
    pub fn redemption_rate_with_decay(&self, params: &ProtocolParams, now: u64) -> McUsdResult<u128> {
        Self::redemption_rate(params, self.decayed_base_rate(params, now)?)
    }

    /// Borrowing rate for a given base rate
    pub fn borrowing_rate(params: &ProtocolParams, base_rate: u128) -> McUsdResult<u128> {
        Ok(safe_add(params.borrowing_fee_floor, base_rate)?.min(params.max_borrowing_fee))
    }

    pub fn borrowing_rate_with_decay(&self, params: &ProtocolParams, now: u64) -> McUsdResult<u128> {
        Self::borrowing_rate(params, self.decayed_base_rate(params, now)?)
    }

    /// Decay, then raise the base rate by `redeemed / total_debt / beta`.
    ///
    /// Returns the new base rate.
    pub fn update_from_redemption(
        &mut self,
        params: &ProtocolParams,
        redeemed: u128,
        total_debt: u128,
        now: u64,
    ) -> McUsdResult<u128> {
        if total_debt == 0 {
            return Err(McUsdError::DivisionByZero);
        }
        let decayed = self.decayed_base_rate(params, now)?;
        let fraction = mul_div(redeemed, DECIMAL_PRECISION, total_debt)?;
        let increase = fraction / params.beta;
        let new_rate = safe_add(decayed, increase)?.min(MAX_BASE_RATE);

        self.base_rate = new_rate;
        self.touch(now);
        Ok(new_rate)
    }

    /// Decay the base rate before a borrowing fee is charged
    pub fn decay_from_borrowing(&mut self, params: &ProtocolParams, now: u64) -> McUsdResult<u128> {
        let decayed = self.decayed_base_rate(params, now)?;
        self.base_rate = decayed;
        self.touch(now);
        Ok(decayed)
    }

    fn touch(&mut self, now: u64) {
        if now.saturating_sub(self.last_fee_operation_time) >= SECONDS_PER_MINUTE {
            self.last_fee_operation_time = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcusd_common::constants::precision::ONE_PERCENT;

    const HOUR: u64 = 3_600;

    #[test]
    fn test_floor_when_base_rate_zero() {
        let params = ProtocolParams::default();
        let fees = FeeState::default();
        assert_eq!(
            fees.redemption_rate_with_decay(&params, 0).unwrap(),
            params.redemption_fee_floor
        );
        assert_eq!(
            fees.borrowing_rate_with_decay(&params, 0).unwrap(),
            params.borrowing_fee_floor
        );
    }

    #[test]
    fn test_redemption_raises_base_rate() {
        let params = ProtocolParams::default();
        let mut fees = FeeState::default();

        // Redeeming 10% of total debt raises the base rate by 5%
        let rate = fees.update_from_redemption(&params, 10, 100, HOUR).unwrap();
        assert_eq!(rate, 5 * ONE_PERCENT);
        assert_eq!(fees.last_fee_operation_time, HOUR);
        assert_eq!(
            FeeState::redemption_rate(&params, rate).unwrap(),
            params.redemption_fee_floor + 5 * ONE_PERCENT
        );
    }

    #[test]
    fn test_base_rate_halves_in_twelve_hours() {
        let params = ProtocolParams::default();
        let fees = FeeState {
            base_rate: 10 * ONE_PERCENT,
            last_fee_operation_time: 0,
        };
        let half = fees.decayed_base_rate(&params, 12 * HOUR).unwrap();
        assert!(half.abs_diff(5 * ONE_PERCENT) < ONE_PERCENT / 10_000, "got {}", half);
    }

    #[test]
    fn test_fee_monotonic_decay() {
        let params = ProtocolParams::default();
        let fees = FeeState {
            base_rate: 40 * ONE_PERCENT,
            last_fee_operation_time: 0,
        };
        let mut last = u128::MAX;
        for minutes in [0u64, 1, 30, 60, 600, 6_000, 60_000] {
            let rate = fees.redemption_rate_with_decay(&params, minutes * 60).unwrap();
            assert!(rate <= last);
            assert!(rate >= params.redemption_fee_floor);
            last = rate;
        }
    }

    #[test]
    fn test_caps() {
        let params = ProtocolParams::default();
        let mut fees = FeeState::default();
        let rate = fees.update_from_redemption(&params, 100, 100, 0).unwrap();
        assert_eq!(rate, DECIMAL_PRECISION / 2);
        let rate = fees.update_from_redemption(&params, 200, 100, 0).unwrap();
        assert_eq!(rate, MAX_BASE_RATE);
        assert_eq!(FeeState::redemption_rate(&params, rate).unwrap(), DECIMAL_PRECISION);
        assert_eq!(FeeState::borrowing_rate(&params, rate).unwrap(), params.max_borrowing_fee);
    }

    #[test]
    fn test_last_operation_time_moves_in_minutes() {
        let params = ProtocolParams::default();
        let mut fees = FeeState::default();
        fees.decay_from_borrowing(&params, 30).unwrap();
        assert_eq!(fees.last_fee_operation_time, 0);
        fees.decay_from_borrowing(&params, 61).unwrap();
        assert_eq!(fees.last_fee_operation_time, 61);
    }
}
