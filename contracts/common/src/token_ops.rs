//! Token Operations
//!
//! The fungible-token ledger is an external collaborator. The engine talks to
//! it through [`TokenLedger`] and never assumes a transfer delivers exactly
//! the requested amount: collateral intake measures the balance delta.
//!
//! Outbound movements are described as [`Effect`]s so the transaction layer
//! can run them only after internal accounting is final.

use crate::errors::{McUsdError, McUsdResult};
use crate::math::mul_div;
use crate::types::{Address, AssetId};
use crate::{BTreeMap, Vec};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Standard fungible-token surface for collateral assets and the stablecoin
pub trait TokenLedger {
    /// Balance of `owner` in `token`
    fn balance_of(&self, token: &AssetId, owner: &Address) -> u128;

    /// Move `amount` from `from` to `to`
    fn transfer(&mut self, token: &AssetId, from: &Address, to: &Address, amount: u128) -> McUsdResult<()>;

    /// Create `amount` new units for `to`
    fn mint(&mut self, token: &AssetId, to: &Address, amount: u128) -> McUsdResult<()>;

    /// Destroy `amount` units held by `from`
    fn burn(&mut self, token: &AssetId, from: &Address, amount: u128) -> McUsdResult<()>;
}

/// Deferred outbound token movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Effect {
    Transfer {
        token: AssetId,
        from: Address,
        to: Address,
        amount: u128,
    },
    Mint {
        token: AssetId,
        to: Address,
        amount: u128,
    },
    Burn {
        token: AssetId,
        from: Address,
        amount: u128,
    },
}

impl Effect {
    /// Run the effect against a ledger; zero amounts are no-ops
    pub fn apply<L: TokenLedger + ?Sized>(&self, ledger: &mut L) -> McUsdResult<()> {
        match self {
            Self::Transfer { token, from, to, amount } if *amount > 0 => {
                ledger.transfer(token, from, to, *amount)
            }
            Self::Mint { token, to, amount } if *amount > 0 => ledger.mint(token, to, *amount),
            Self::Burn { token, from, amount } if *amount > 0 => ledger.burn(token, from, *amount),
            _ => Ok(()),
        }
    }
}

/// Pull tokens from `from` into `to` and return what actually arrived
pub fn pull_measured<L: TokenLedger + ?Sized>(
    ledger: &mut L,
    token: &AssetId,
    from: &Address,
    to: &Address,
    amount: u128,
) -> McUsdResult<u128> {
    let before = ledger.balance_of(token, to);
    ledger.transfer(token, from, to, amount)?;
    let after = ledger.balance_of(token, to);
    after.checked_sub(before).ok_or(McUsdError::TransferFailed {
        token: *token,
        from: *from,
        to: *to,
        amount,
    })
}

// ============ In-memory Ledger ============

/// Simple balance map used for simulation and tests.
///
/// Tokens can be configured with a transfer fee (in basis points) that is
/// burned on every transfer, to exercise fee-on-transfer handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryLedger {
    balances: BTreeMap<(AssetId, Address), u128>,
    supply: BTreeMap<AssetId, u128>,
    transfer_fee_bps: BTreeMap<AssetId, u64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total supply of a token
    pub fn total_supply(&self, token: &AssetId) -> u128 {
        self.supply.get(token).copied().unwrap_or(0)
    }

    /// Make every transfer of `token` burn `bps` / 10_000 of the amount
    pub fn set_transfer_fee(&mut self, token: AssetId, bps: u64) {
        self.transfer_fee_bps.insert(token, bps.min(10_000));
    }

    /// Every non-zero holder of a token
    pub fn holders(&self, token: &AssetId) -> Vec<(Address, u128)> {
        self.balances
            .iter()
            .filter(|((t, _), amount)| t == token && **amount > 0)
            .map(|((_, owner), amount)| (*owner, *amount))
            .collect()
    }

    fn debit(&mut self, token: &AssetId, from: &Address, amount: u128) -> McUsdResult<()> {
        let balance = self.balance_of(token, from);
        if balance < amount {
            return Err(McUsdError::InsufficientBalance {
                available: balance,
                requested: amount,
            });
        }
        self.balances.insert((*token, *from), balance - amount);
        Ok(())
    }

    fn credit(&mut self, token: &AssetId, to: &Address, amount: u128) -> McUsdResult<()> {
        let balance = self.balance_of(token, to);
        let updated = balance.checked_add(amount).ok_or(McUsdError::Overflow)?;
        self.balances.insert((*token, *to), updated);
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance_of(&self, token: &AssetId, owner: &Address) -> u128 {
        self.balances.get(&(*token, *owner)).copied().unwrap_or(0)
    }

    fn transfer(&mut self, token: &AssetId, from: &Address, to: &Address, amount: u128) -> McUsdResult<()> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        self.debit(token, from, amount)?;

        let fee_bps = self.transfer_fee_bps.get(token).copied().unwrap_or(0);
        let fee = mul_div(amount, fee_bps as u128, 10_000)?;
        if fee > 0 {
            let supply = self.total_supply(token);
            self.supply.insert(*token, supply.saturating_sub(fee));
        }
        self.credit(token, to, amount - fee)
    }

    fn mint(&mut self, token: &AssetId, to: &Address, amount: u128) -> McUsdResult<()> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        let supply = self
            .total_supply(token)
            .checked_add(amount)
            .ok_or(McUsdError::Overflow)?;
        self.credit(token, to, amount)?;
        self.supply.insert(*token, supply);
        Ok(())
    }

    fn burn(&mut self, token: &AssetId, from: &Address, amount: u128) -> McUsdResult<()> {
        if amount == 0 {
            return Err(McUsdError::ZeroAmount);
        }
        self.debit(token, from, amount)?;
        let supply = self.total_supply(token);
        self.supply.insert(*token, supply.saturating_sub(amount));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: AssetId = [1u8; 32];
    const ALICE: Address = [2u8; 32];
    const BOB: Address = [3u8; 32];

    #[test]
    fn test_mint_transfer_burn() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&TOKEN, &ALICE, 1_000).unwrap();
        ledger.transfer(&TOKEN, &ALICE, &BOB, 400).unwrap();
        ledger.burn(&TOKEN, &BOB, 100).unwrap();

        assert_eq!(ledger.balance_of(&TOKEN, &ALICE), 600);
        assert_eq!(ledger.balance_of(&TOKEN, &BOB), 300);
        assert_eq!(ledger.total_supply(&TOKEN), 900);
        assert_eq!(ledger.holders(&TOKEN).len(), 2);
    }

    #[test]
    fn test_insufficient_balance() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&TOKEN, &ALICE, 10).unwrap();
        assert_eq!(
            ledger.transfer(&TOKEN, &ALICE, &BOB, 11),
            Err(McUsdError::InsufficientBalance { available: 10, requested: 11 })
        );
    }

    #[test]
    fn test_fee_on_transfer_measured() {
        let mut ledger = InMemoryLedger::new();
        ledger.set_transfer_fee(TOKEN, 100); // 1%
        ledger.mint(&TOKEN, &ALICE, 10_000).unwrap();

        let received = pull_measured(&mut ledger, &TOKEN, &ALICE, &BOB, 10_000).unwrap();
        assert_eq!(received, 9_900);
        assert_eq!(ledger.total_supply(&TOKEN), 9_900);
    }

    #[test]
    fn test_effects_apply_in_order() {
        let mut ledger = InMemoryLedger::new();
        let effects = [
            Effect::Mint { token: TOKEN, to: ALICE, amount: 50 },
            Effect::Transfer { token: TOKEN, from: ALICE, to: BOB, amount: 20 },
            Effect::Burn { token: TOKEN, from: BOB, amount: 0 },
        ];
        for effect in &effects {
            effect.apply(&mut ledger).unwrap();
        }
        assert_eq!(ledger.balance_of(&TOKEN, &ALICE), 30);
        assert_eq!(ledger.balance_of(&TOKEN, &BOB), 20);
    }
}
