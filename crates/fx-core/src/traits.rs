// crates/fx-core/src/traits.rs
//
// Narrow interfaces to the engine's external collaborators. The treasury never
// reads collaborator state beyond what these traits return, and every push
// (splitter, strategy) happens after the treasury has committed its own state.

use std::fmt;
use std::sync::Arc;

use crate::error::FxError;
use crate::fixed::Wad;
use crate::identity::Principal;

/// A price reading from the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    /// Base token price in the reference unit (18 decimals).
    pub price: Wad,
    /// `false` if the feed is stale or otherwise untrusted.
    pub is_valid: bool,
}

impl PriceQuote {
    /// The price, or `FxError::InvalidOraclePrice` if the quote is invalid or zero.
    pub fn valid_price(&self) -> Result<Wad, FxError> {
        if !self.is_valid || self.price.is_zero() {
            return Err(FxError::InvalidOraclePrice);
        }
        Ok(self.price)
    }
}

/// Price feed for the base collateral.
pub trait PriceOracle: Send + Sync {
    fn get_price(&self) -> PriceQuote;
}

/// Conversion rate for wrapped or rebasing collateral (1e18 = 1.0).
///
/// Multiplying a raw token amount by the rate yields value units.
pub trait RateProvider: Send + Sync {
    fn get_rate(&self) -> Wad;
}

/// Push-only sink for the rebalance pool's share of harvested yield.
pub trait RebalancePoolSplitter: Send + Sync {
    /// Called after `amount` raw units of `token` have been transferred to the splitter.
    fn receive(&self, token: Principal, amount: u128);
}

/// Trusted yield strategy holding part of the treasury's collateral.
pub trait Strategy: Send + Sync {
    /// `amount` raw units were handed to the strategy.
    fn on_transfer(&self, amount: u128);

    /// The strategy reported `amount` raw units of profit back to the treasury.
    fn on_profit_notify(&self, amount: u128);

    /// The treasury pulled `amount` raw units back to cover a payout.
    fn withdraw_to_treasury(&self, amount: u128);
}

/// A collaborator reference: the address it is known by plus a handle to
/// its implementation.
pub struct Collaborator<T: ?Sized> {
    pub address: Principal,
    pub handle: Arc<T>,
}

impl<T: ?Sized> Collaborator<T> {
    /// # Errors
    /// Returns `FxError::ZeroAddress` if `address` is the zero principal.
    pub fn new(address: Principal, handle: Arc<T>) -> Result<Self, FxError> {
        Ok(Self {
            address: address.non_zero()?,
            handle,
        })
    }
}

impl<T: ?Sized> Clone for Collaborator<T> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            handle: Arc::clone(&self.handle),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Collaborator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborator")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
