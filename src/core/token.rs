//! Debt token ledger.
//!
//! The debt token is an external collaborator of the engine; this is the
//! in-process ledger the coordinator settles mints, burns and transfers
//! against once a call's accounting has been committed:
//! - Minting and burning
//! - Balance tracking per holder (accounts and pools)
//! - Transfers
//! - Supply management

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::pools::Holder;
use crate::error::{Error, Result};
use crate::utils::crypto::Hash;

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed debt token amount (18 decimals)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from a raw 18-decimal value
    pub const fn from_wad(wad: u128) -> Self {
        Self(wad)
    }

    /// Create from whole tokens
    pub const fn from_units(units: u64) -> Self {
        Self(units as u128 * crate::utils::constants::WAD)
    }

    /// Get the raw 18-decimal value
    pub fn wad(&self) -> u128 {
        self.0
    }

    /// Decimal representation, if it fits in 96 bits
    pub fn to_decimal(&self) -> Option<Decimal> {
        i128::try_from(self.0)
            .ok()
            .and_then(|v| Decimal::try_from_i128_with_scale(v, 18).ok())
            .map(|d| d.normalize())
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating addition
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl std::fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_decimal() {
            Some(d) => write!(f, "{}", d),
            None => write!(f, "{}e-18", self.0),
        }
    }
}

impl From<u128> for TokenAmount {
    fn from(wad: u128) -> Self {
        Self(wad)
    }
}

impl From<TokenAmount> for u128 {
    fn from(amount: TokenAmount) -> Self {
        amount.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT TOKEN
// ═══════════════════════════════════════════════════════════════════════════════

/// Debt token ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtToken {
    /// Token symbol
    pub symbol: String,
    total_supply: TokenAmount,
    balances: HashMap<Holder, TokenAmount>,
}

impl Default for DebtToken {
    fn default() -> Self {
        Self::new()
    }
}

impl DebtToken {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            symbol: "PAR".to_string(),
            total_supply: TokenAmount::ZERO,
            balances: HashMap::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SUPPLY MANAGEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get total supply
    pub fn total_supply(&self) -> TokenAmount {
        self.total_supply
    }

    /// Get balance of a holder
    pub fn balance_of(&self, holder: &Holder) -> TokenAmount {
        self.balances.get(holder).copied().unwrap_or(TokenAmount::ZERO)
    }

    /// Mint new tokens
    pub fn mint(&mut self, to: Holder, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        let new_supply = self.total_supply.checked_add(amount).ok_or(Error::Overflow {
            operation: "mint total supply".into(),
        })?;
        let new_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(Error::Overflow {
                operation: "mint balance".into(),
            })?;

        self.balances.insert(to, new_balance);
        self.total_supply = new_supply;
        Ok(())
    }

    /// Burn tokens from a holder
    pub fn burn(&mut self, from: Holder, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        let current_balance = self.balance_of(&from);
        if current_balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount.wad(),
                available: current_balance.wad(),
            });
        }

        self.set_balance(from, current_balance.saturating_sub(amount));
        self.total_supply = self.total_supply.saturating_sub(amount);
        Ok(())
    }

    /// Transfer tokens between holders
    pub fn transfer(&mut self, from: Holder, to: Holder, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        if from == to {
            return Ok(());
        }

        let from_balance = self.balance_of(&from);
        if from_balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount.wad(),
                available: from_balance.wad(),
            });
        }

        let new_to_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(Error::Overflow {
                operation: "transfer balance".into(),
            })?;
        self.set_balance(from, from_balance.saturating_sub(amount));
        self.balances.insert(to, new_to_balance);
        Ok(())
    }

    fn set_balance(&mut self, holder: Holder, balance: TokenAmount) {
        if balance.is_zero() {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, balance);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get number of holders with a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Verify supply invariant (total_supply == sum of all balances)
    pub fn verify_supply_invariant(&self) -> bool {
        let sum = self
            .balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(b.wad()));
        sum == Some(self.total_supply.wad())
    }

    /// Compute state hash over supply and sorted balances
    pub fn state_hash(&self) -> Hash {
        let mut sorted: Vec<_> = self.balances.iter().collect();
        sorted.sort_by_key(|(holder, _)| **holder);

        let mut data = Vec::new();
        data.extend_from_slice(&self.total_supply.wad().to_be_bytes());
        for (holder, balance) in sorted {
            let encoded = bincode::serialize(holder).unwrap_or_default();
            data.extend_from_slice(&encoded);
            data.extend_from_slice(&balance.wad().to_be_bytes());
        }
        Hash::sha256(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pools::PoolId;
    use crate::utils::crypto::AccountId;

    fn alice() -> Holder {
        Holder::Account(AccountId::from_label("alice"))
    }

    fn bob() -> Holder {
        Holder::Account(AccountId::from_label("bob"))
    }

    #[test]
    fn test_token_amount_display() {
        assert_eq!(TokenAmount::from_units(100).to_string(), "100");
        assert_eq!(TokenAmount::from_wad(1_500_000_000_000_000_000).to_string(), "1.5");
        assert_eq!(TokenAmount::from_wad(u128::MAX).to_decimal(), None);
    }

    #[test]
    fn test_mint_and_burn() {
        let mut token = DebtToken::new();
        token.mint(alice(), TokenAmount::from_units(100)).unwrap();

        assert_eq!(token.total_supply(), TokenAmount::from_units(100));
        assert_eq!(token.balance_of(&alice()), TokenAmount::from_units(100));

        token.burn(alice(), TokenAmount::from_units(40)).unwrap();
        assert_eq!(token.total_supply(), TokenAmount::from_units(60));
        assert!(token.verify_supply_invariant());
    }

    #[test]
    fn test_burn_insufficient() {
        let mut token = DebtToken::new();
        token.mint(alice(), TokenAmount::from_units(10)).unwrap();
        let result = token.burn(alice(), TokenAmount::from_units(11));
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let mut token = DebtToken::new();
        assert_eq!(token.mint(alice(), TokenAmount::ZERO), Err(Error::ZeroAmount));
    }

    #[test]
    fn test_transfer_to_pool() {
        let mut token = DebtToken::new();
        let pool = Holder::Pool(PoolId::StabilityPool);
        token.mint(alice(), TokenAmount::from_units(50)).unwrap();
        token.transfer(alice(), pool, TokenAmount::from_units(20)).unwrap();
        token.transfer(alice(), bob(), TokenAmount::from_units(30)).unwrap();

        assert_eq!(token.balance_of(&pool), TokenAmount::from_units(20));
        assert_eq!(token.balance_of(&bob()), TokenAmount::from_units(30));
        assert!(token.balance_of(&alice()).is_zero());
        assert_eq!(token.holder_count(), 2);
    }

    #[test]
    fn test_state_hash_changes() {
        let mut token = DebtToken::new();
        let before = token.state_hash();
        token.mint(alice(), TokenAmount::from_units(1)).unwrap();
        assert_ne!(before, token.state_hash());
    }
}
