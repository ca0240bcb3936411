// crates/fx-market/src/lib.rs
//
// fx-market: User-facing policy layer in front of a treasury.
//
// A `Market` charges collateral-ratio-dependent fees, enforces slippage bounds
// and the stability-mode gates, and forwards net amounts to the treasury it
// owns. `FxUsd` aggregates the fractional tokens of several markets into one
// stable token with per-market mint caps.

pub mod fee;
pub mod fx_usd;
pub mod market;

pub use fee::{FeeCurve, FeeSchedule};
pub use fx_usd::FxUsd;
pub use market::{Market, MarketFees, MarketParams, StabilityPolicy};
