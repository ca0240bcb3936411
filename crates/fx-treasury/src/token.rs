// crates/fx-treasury/src/token.rs
//
// Supply ledgers for the fractional (fToken) and leveraged (xToken) sides.
//
// Both tokens are plain balance tables. The treasury keeps its ledgers private,
// so it is the only authority that may change either supply. NAVs are
// not stored here except for the fractional peg; the residual leveraged NAV is
// derived from pool state in `nav.rs`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use fx_core::{FxError, Principal, Wad};

/// Per-holder balances plus total supply, in 18-decimal token units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplyLedger {
    balances: HashMap<Principal, u128>,
    total_supply: u128,
}

impl SupplyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, holder: &Principal) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// Credit `amount` to `to`.
    ///
    /// # Errors
    /// Returns `FxError::MathOverflow` if total supply would overflow.
    pub fn mint(&mut self, to: Principal, amount: u128) -> Result<(), FxError> {
        if amount == 0 {
            return Ok(());
        }
        let total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(FxError::MathOverflow)?;
        *self.balances.entry(to).or_insert(0) += amount;
        self.total_supply = total_supply;
        Ok(())
    }

    /// Debit `amount` from `from`.
    ///
    /// # Errors
    /// Returns `FxError::InsufficientBalance` if `from` holds less than `amount`.
    /// The ledger is unchanged on error.
    pub fn burn(&mut self, from: &Principal, amount: u128) -> Result<(), FxError> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(FxError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        if available == amount {
            self.balances.remove(from);
        } else {
            self.balances.insert(*from, available - amount);
        }
        self.total_supply -= amount;
        Ok(())
    }

    /// Fail if `from` could not burn `amount`, without touching the ledger.
    pub fn check_burn(&self, from: &Principal, amount: u128) -> Result<(), FxError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(FxError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        Ok(())
    }
}

/// The senior claim on the collateral pool.
///
/// Its NAV is fixed at construction; the treasury pegs it at 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FractionalToken {
    ledger: SupplyLedger,
    nav: Wad,
}

impl FractionalToken {
    pub fn new(nav: Wad) -> Self {
        Self {
            ledger: SupplyLedger::new(),
            nav,
        }
    }

    pub fn nav(&self) -> Wad {
        self.nav
    }

    pub fn total_supply(&self) -> u128 {
        self.ledger.total_supply()
    }

    pub fn balance_of(&self, holder: &Principal) -> u128 {
        self.ledger.balance_of(holder)
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut SupplyLedger {
        &mut self.ledger
    }

    pub(crate) fn ledger(&self) -> &SupplyLedger {
        &self.ledger
    }
}

/// The junior, residual claim on the collateral pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeveragedToken {
    ledger: SupplyLedger,
}

impl LeveragedToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> u128 {
        self.ledger.total_supply()
    }

    pub fn balance_of(&self, holder: &Principal) -> u128 {
        self.ledger.balance_of(holder)
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut SupplyLedger {
        &mut self.ledger
    }

    pub(crate) fn ledger(&self) -> &SupplyLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Principal {
        Principal::from_byte(0xa1)
    }

    fn bob() -> Principal {
        Principal::from_byte(0xb0)
    }

    #[test]
    fn test_mint_tracks_supply_and_balance() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(alice(), 100).unwrap();
        ledger.mint(bob(), 50).unwrap();
        assert_eq!(ledger.total_supply(), 150);
        assert_eq!(ledger.balance_of(&alice()), 100);
        assert_eq!(ledger.balance_of(&bob()), 50);
    }

    #[test]
    fn test_burn_insufficient_balance_leaves_ledger_unchanged() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(alice(), 10).unwrap();
        let err = ledger.burn(&alice(), 11).unwrap_err();
        assert_eq!(
            err,
            FxError::InsufficientBalance {
                requested: 11,
                available: 10
            }
        );
        assert_eq!(ledger.total_supply(), 10);
        assert_eq!(ledger.balance_of(&alice()), 10);
    }

    #[test]
    fn test_burn_exact_balance() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(alice(), 10).unwrap();
        ledger.burn(&alice(), 10).unwrap();
        assert_eq!(ledger.total_supply(), 0);
        assert_eq!(ledger.balance_of(&alice()), 0);
    }

    #[test]
    fn test_mint_overflow() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(alice(), u128::MAX).unwrap();
        assert_eq!(ledger.mint(bob(), 1), Err(FxError::MathOverflow));
        assert_eq!(ledger.balance_of(&bob()), 0);
    }

    #[test]
    fn test_fractional_nav_is_pegged() {
        let token = FractionalToken::new(Wad::ONE);
        assert_eq!(token.nav(), Wad::ONE);
        assert_eq!(token.total_supply(), 0);
    }
}
