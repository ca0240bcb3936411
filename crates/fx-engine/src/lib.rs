// crates/fx-engine/src/lib.rs
//
// fx-engine: Ambient wiring around the treasury and market crates.
//
// Loads a `ProtocolConfig` from TOML, installs the tracing subscriber,
// provides in-memory implementations of the collaborator traits, and builds a
// `Deployment` with the capability grants between market and treasury in place.

pub mod collaborators;
pub mod config;
pub mod deployment;
pub mod error;
pub mod logging;

pub use collaborators::{
    FixedPriceOracle, FixedRateProvider, RecordingSplitter, RecordingStrategy, StrategyTotals,
};
pub use config::{FeeConfig, FxUsdConfig, MarketConfig, ProtocolConfig, RolesConfig, TreasuryConfig};
pub use deployment::{Collaborators, Deployment};
pub use error::EngineError;
pub use logging::{init_from_config, init_tracing};
