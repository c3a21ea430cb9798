//! Deferred token movements.
//!
//! Engines mutate internal accounting and queue the matching external
//! movements here. The coordinator settles the queue against the token and
//! collateral ledgers only after every accounting step of the call succeeded,
//! so no external transfer ever observes a half-updated state.

use serde::{Deserialize, Serialize};

use crate::core::collateral::{CollateralAmount, CollateralLedger};
use crate::core::pools::Holder;
use crate::core::token::{DebtToken, TokenAmount};
use crate::error::Result;

/// A single external movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interaction {
    /// Mint debt tokens
    Mint {
        /// Recipient
        to: Holder,
        /// Amount (WAD)
        amount: u128,
    },
    /// Burn debt tokens
    Burn {
        /// Holder burned from
        from: Holder,
        /// Amount (WAD)
        amount: u128,
    },
    /// Move debt tokens
    TransferDebt {
        /// Sender
        from: Holder,
        /// Recipient
        to: Holder,
        /// Amount (WAD)
        amount: u128,
    },
    /// Move collateral
    TransferCollateral {
        /// Sender
        from: Holder,
        /// Recipient
        to: Holder,
        /// Amount (WAD)
        amount: u128,
    },
}

/// Ordered queue of movements for one call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interactions {
    queue: Vec<Interaction>,
}

impl Interactions {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a mint; zero amounts are dropped
    pub fn mint(&mut self, to: impl Into<Holder>, amount: u128) {
        if amount > 0 {
            self.queue.push(Interaction::Mint {
                to: to.into(),
                amount,
            });
        }
    }

    /// Queue a burn; zero amounts are dropped
    pub fn burn(&mut self, from: impl Into<Holder>, amount: u128) {
        if amount > 0 {
            self.queue.push(Interaction::Burn {
                from: from.into(),
                amount,
            });
        }
    }

    /// Queue a debt token transfer; zero amounts are dropped
    pub fn transfer_debt(&mut self, from: impl Into<Holder>, to: impl Into<Holder>, amount: u128) {
        if amount > 0 {
            self.queue.push(Interaction::TransferDebt {
                from: from.into(),
                to: to.into(),
                amount,
            });
        }
    }

    /// Queue a collateral transfer; zero amounts are dropped
    pub fn transfer_collateral(
        &mut self,
        from: impl Into<Holder>,
        to: impl Into<Holder>,
        amount: u128,
    ) {
        if amount > 0 {
            self.queue.push(Interaction::TransferCollateral {
                from: from.into(),
                to: to.into(),
                amount,
            });
        }
    }

    /// Number of queued movements
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued movements in order
    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.queue.iter()
    }

    /// Apply every queued movement in order, returning how many were applied
    pub fn settle(self, token: &mut DebtToken, collateral: &mut CollateralLedger) -> Result<usize> {
        let count = self.queue.len();
        for interaction in self.queue {
            match interaction {
                Interaction::Mint { to, amount } => token.mint(to, TokenAmount::from_wad(amount))?,
                Interaction::Burn { from, amount } => {
                    token.burn(from, TokenAmount::from_wad(amount))?
                }
                Interaction::TransferDebt { from, to, amount } => {
                    token.transfer(from, to, TokenAmount::from_wad(amount))?
                }
                Interaction::TransferCollateral { from, to, amount } => {
                    collateral.transfer(from, to, CollateralAmount::from_wad(amount))?
                }
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pools::PoolId;
    use crate::utils::crypto::AccountId;

    #[test]
    fn test_zero_amounts_dropped() {
        let mut fx = Interactions::new();
        fx.mint(PoolId::StabilityPool, 0);
        fx.transfer_collateral(PoolId::Active, PoolId::Default, 0);
        assert!(fx.is_empty());
    }

    #[test]
    fn test_settle_in_order() {
        let alice = AccountId::from_label("alice");
        let mut token = DebtToken::new();
        let mut collateral = CollateralLedger::new();
        collateral
            .fund(Holder::Account(alice), CollateralAmount::from_units(2))
            .unwrap();

        let mut fx = Interactions::new();
        fx.transfer_collateral(alice, PoolId::Active, 2);
        fx.mint(alice, 10);
        fx.transfer_debt(alice, PoolId::StabilityPool, 4);
        fx.burn(PoolId::StabilityPool, 3);
        assert_eq!(fx.len(), 4);

        assert_eq!(fx.settle(&mut token, &mut collateral).unwrap(), 4);
        assert_eq!(token.total_supply().wad(), 7);
        assert_eq!(token.balance_of(&Holder::Pool(PoolId::StabilityPool)).wad(), 1);
        assert_eq!(collateral.pool_balance(PoolId::Active).wad(), 2);
    }

    #[test]
    fn test_settle_fails_on_missing_balance() {
        let mut token = DebtToken::new();
        let mut collateral = CollateralLedger::new();
        let mut fx = Interactions::new();
        fx.burn(AccountId::from_label("nobody"), 1);
        assert!(fx.settle(&mut token, &mut collateral).is_err());
    }
}
