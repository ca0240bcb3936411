// crates/fx-treasury/src/lib.rs
//
// fx-treasury: collateral accounting for the fx dual-token engine.
//
// The treasury holds a single base collateral asset and backs two tokens with
// it: the fractional token (senior claim, NAV pegged between settlements) and
// the leveraged token (junior claim, NAV is whatever collateral value the
// fractional side does not claim, floored at zero).
//
// All collateral is tracked in base units (raw token units normalized through
// the optional rate provider). Prices, NAVs, and ratios use 18 decimals;
// configuration ratios use 9 decimals.

pub mod ema;
pub mod harvest;
pub mod nav;
pub mod token;
pub mod treasury;

// Re-export key types for ergonomic access from downstream crates.
pub use ema::{EmaLeverage, MIN_EMA_SAMPLE_INTERVAL};
pub use harvest::{split_harvest, HarvestRatios, HarvestSplit, MAX_HARVESTER_RATIO};
pub use nav::{MintSizing, PoolState, RedeemSizing, MAX_LEVERAGE_RATIO};
pub use token::{FractionalToken, LeveragedToken, SupplyLedger};
pub use treasury::{Treasury, TreasuryParams, TreasuryState};
