// crates/fx-core/src/error.rs
//
// Engine-wide error type. Every failed operation aborts with one of these
// variants and leaves the component state exactly as it was before the call.

use thiserror::Error;

use crate::access::Capability;
use crate::identity::Principal;

/// Coarse classification of an [`FxError`], used by callers to decide whether
/// a retry with different parameters can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller lacks the required capability.
    Authorization,
    /// The component is not in a state that admits the call.
    StatePrecondition,
    /// The call would break a protocol invariant (floor, cap, config bounds).
    InvariantViolation,
    /// The call arguments themselves are unusable.
    Input,
    /// Fixed-point arithmetic failed (overflow, division by zero).
    Arithmetic,
}

/// Protocol-wide error types for the fx treasury engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FxError {
    /// Caller does not hold the capability required by the entry point.
    #[error("{principal} lacks capability {capability}")]
    Unauthorized {
        principal: Principal,
        capability: Capability,
    },

    /// Only the access-control super-admin may grant or revoke capabilities.
    #[error("{principal} is not the super-admin")]
    NotSuperAdmin { principal: Principal },

    /// Strategy entry point called by someone other than the configured strategy.
    #[error("only the configured strategy may call this: caller {caller}")]
    OnlyStrategy { caller: Principal },

    /// fToken mint/redeem through a Market that has delegated them to an aggregator.
    #[error("caller {caller} is not the registered fxUSD aggregator")]
    CallerNotFxUsd { caller: Principal },

    /// `initialize_protocol` called a second time.
    #[error("protocol already initialized")]
    ProtocolInitialized,

    /// Operation requires an initialized treasury.
    #[error("protocol not initialized")]
    ProtocolNotInitialized,

    /// Treasury does not hold enough collateral to seed the protocol.
    #[error("insufficient initial base token: required {required}, available {available}")]
    InsufficientInitialBaseToken { required: u128, available: u128 },

    /// Oracle reported an invalid or zero price.
    #[error("invalid oracle price")]
    InvalidOraclePrice,

    /// Rate provider reported a zero rate.
    #[error("invalid collateral rate")]
    InvalidRate,

    /// Resulting collateral ratio would be at or below 1.0.
    #[error("collateral ratio would fall to or below 1.0")]
    UnderCollateral,

    /// Resulting collateral would exceed the base token cap.
    #[error("total base token {attempted} would exceed cap {cap}")]
    ExceedTotalCap { attempted: u128, cap: u128 },

    /// Aggregator mint would exceed the per-base-asset cap.
    #[error("fxUSD minted {attempted} would exceed cap {cap} for this base asset")]
    ExceedMintCap { attempted: u128, cap: u128 },

    #[error("harvester ratio {ratio} exceeds maximum {max}")]
    HarvesterRatioTooLarge { ratio: u64, max: u64 },

    #[error("rebalance pool ratio {ratio} exceeds maximum {max}")]
    RebalancePoolRatioTooLarge { ratio: u64, max: u64 },

    #[error("EMA sample interval {interval}s is below the minimum {min}s")]
    EmaSampleIntervalTooSmall { interval: u64, min: u64 },

    /// A fee schedule would produce a fee outside `[0, 1e9]`.
    #[error("fee ratio out of range: default {default}, delta {delta}")]
    InvalidFeeRatio { default: u64, delta: i64 },

    /// Stability ratio must be strictly above 1.0.
    #[error("invalid stability ratio {ratio}")]
    InvalidStabilityRatio { ratio: u128 },

    /// Target collateral ratio for sizing queries must be strictly above 1.0.
    #[error("invalid target collateral ratio {ratio}")]
    InvalidTargetRatio { ratio: u128 },

    /// fToken mint would push the collateral ratio below the stability ratio.
    #[error("fToken mint of {requested} exceeds {max} mintable before stability mode")]
    FTokenMintInStabilityMode { requested: u128, max: u128 },

    /// xToken redeem would push the collateral ratio below the stability ratio.
    #[error("xToken redeem of {requested} exceeds {max} redeemable before stability mode")]
    XTokenRedeemInStabilityMode { requested: u128, max: u128 },

    /// Output below the caller's minimum.
    #[error("insufficient output: expected at least {min_out}, got {actual}")]
    InsufficientOutput { min_out: u128, actual: u128 },

    /// Holder cannot burn or transfer more than it owns.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    /// A collateral payout exceeds what the treasury and its strategy hold.
    #[error("insufficient collateral: requested {requested}, available {available}")]
    InsufficientCollateral { requested: u128, available: u128 },

    /// Zero principal where a collaborator reference is required.
    #[error("zero address")]
    ZeroAddress,

    /// Zero-amount mint or redeem at the market layer.
    #[error("zero amount")]
    ZeroAmount,

    /// No market is registered for the given base token.
    #[error("unknown market for base token {base_token}")]
    UnknownMarket { base_token: Principal },

    /// A market for the given base token is already registered.
    #[error("market for base token {base_token} already registered")]
    DuplicateMarket { base_token: Principal },

    #[error("math overflow")]
    MathOverflow,

    #[error("division by zero")]
    DivisionByZero,
}

impl FxError {
    /// Classify this error per the engine's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FxError::Unauthorized { .. }
            | FxError::NotSuperAdmin { .. }
            | FxError::OnlyStrategy { .. }
            | FxError::CallerNotFxUsd { .. } => ErrorKind::Authorization,

            FxError::ProtocolInitialized
            | FxError::ProtocolNotInitialized
            | FxError::InsufficientInitialBaseToken { .. }
            | FxError::InvalidOraclePrice
            | FxError::InvalidRate => ErrorKind::StatePrecondition,

            FxError::UnderCollateral
            | FxError::ExceedTotalCap { .. }
            | FxError::ExceedMintCap { .. }
            | FxError::HarvesterRatioTooLarge { .. }
            | FxError::RebalancePoolRatioTooLarge { .. }
            | FxError::EmaSampleIntervalTooSmall { .. }
            | FxError::InvalidFeeRatio { .. }
            | FxError::InvalidStabilityRatio { .. }
            | FxError::FTokenMintInStabilityMode { .. }
            | FxError::XTokenRedeemInStabilityMode { .. }
            | FxError::InsufficientCollateral { .. } => ErrorKind::InvariantViolation,

            FxError::InvalidTargetRatio { .. }
            | FxError::InsufficientOutput { .. }
            | FxError::InsufficientBalance { .. }
            | FxError::ZeroAddress
            | FxError::ZeroAmount
            | FxError::UnknownMarket { .. }
            | FxError::DuplicateMarket { .. } => ErrorKind::Input,

            FxError::MathOverflow | FxError::DivisionByZero => ErrorKind::Arithmetic,
        }
    }
}
