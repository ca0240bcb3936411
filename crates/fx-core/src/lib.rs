// crates/fx-core/src/lib.rs
//
// fx-core: Core types, fixed-point arithmetic, and collaborator interfaces for
// the fx dual-token treasury engine.
//
// This is the leaf crate that the treasury, market, and engine crates depend on.
// It defines the canonical fixed-point types, identities, capability-based access
// control, event records, error taxonomy, and the narrow trait interfaces through
// which the engine consumes its external collaborators (oracle, rate provider,
// rebalance pool splitter, yield strategy).

pub mod access;
pub mod error;
pub mod events;
pub mod fixed;
pub mod identity;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use fx_core::Wad;`

// Fixed-point types
pub use fixed::{mul_div, FeeRatio, ParseDecimalError, Rounding, Wad, FEE_PRECISION, PRECISION};

// Identity and access control
pub use access::{AccessControl, Capability};
pub use identity::Principal;

// Events
pub use events::{EventLog, FxUsdEvent, MarketEvent, TokenKind, TreasuryEvent};

// Error type
pub use error::{ErrorKind, FxError};

// Traits
pub use traits::{
    Collaborator, PriceOracle, PriceQuote, RateProvider, RebalancePoolSplitter, Strategy,
};
