// crates/fx-engine/src/collaborators.rs
//
// In-memory implementations of the collaborator traits.
//
// The oracle and rate provider hold a value an operator (or a test) sets
// directly. The splitter and strategy record what the treasury pushes to them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use fx_core::{PriceOracle, PriceQuote, Principal, RateProvider, RebalancePoolSplitter, Strategy, Wad};

/// Oracle reporting whatever price was last set.
#[derive(Debug)]
pub struct FixedPriceOracle {
    price: RwLock<Wad>,
    valid: AtomicBool,
}

impl FixedPriceOracle {
    pub fn new(price: Wad) -> Self {
        Self {
            price: RwLock::new(price),
            valid: AtomicBool::new(true),
        }
    }

    pub fn set_price(&self, price: Wad) {
        *self.price.write().unwrap_or_else(PoisonError::into_inner) = price;
        tracing::debug!(price = %price, "oracle price set");
    }

    /// Mark subsequent quotes valid or invalid.
    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }
}

impl PriceOracle for FixedPriceOracle {
    fn get_price(&self) -> PriceQuote {
        PriceQuote {
            price: *self.price.read().unwrap_or_else(PoisonError::into_inner),
            is_valid: self.valid.load(Ordering::SeqCst),
        }
    }
}

/// Rate provider for wrapped collateral, reporting the rate last set.
#[derive(Debug)]
pub struct FixedRateProvider {
    rate: RwLock<Wad>,
}

impl FixedRateProvider {
    pub fn new(rate: Wad) -> Self {
        Self {
            rate: RwLock::new(rate),
        }
    }

    pub fn set_rate(&self, rate: Wad) {
        *self.rate.write().unwrap_or_else(PoisonError::into_inner) = rate;
    }
}

impl RateProvider for FixedRateProvider {
    fn get_rate(&self) -> Wad {
        *self.rate.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Splitter that records every transfer it receives.
#[derive(Debug, Default)]
pub struct RecordingSplitter {
    received: Mutex<Vec<(Principal, u128)>>,
}

impl RecordingSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<(Principal, u128)> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sum of all amounts received.
    pub fn total(&self) -> u128 {
        self.received().iter().map(|(_, amount)| amount).sum()
    }
}

impl RebalancePoolSplitter for RecordingSplitter {
    fn receive(&self, token: Principal, amount: u128) {
        tracing::debug!(token = %token, amount, "rebalance pool received");
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((token, amount));
    }
}

/// Running totals of what a treasury pushed to a [`RecordingStrategy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyTotals {
    pub transferred: u128,
    pub profit_notified: u128,
    pub withdrawn: u128,
}

/// Strategy that records transfers, profit notices, and withdrawals.
#[derive(Debug, Default)]
pub struct RecordingStrategy {
    totals: Mutex<StrategyTotals>,
}

impl RecordingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self) -> StrategyTotals {
        *self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut StrategyTotals)) {
        f(&mut self.totals.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Strategy for RecordingStrategy {
    fn on_transfer(&self, amount: u128) {
        self.update(|t| t.transferred += amount);
    }

    fn on_profit_notify(&self, amount: u128) {
        self.update(|t| t.profit_notified += amount);
    }

    fn withdraw_to_treasury(&self, amount: u128) {
        self.update(|t| t.withdrawn += amount);
    }
}
