// crates/fx-engine/src/error.rs
//
// Errors raised while validating configuration or wiring a deployment.

use thiserror::Error;

use fx_core::{FxError, ParseDecimalError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// A decimal field in the configuration could not be parsed.
    #[error("invalid decimal in {field}: {source}")]
    Decimal {
        field: &'static str,
        #[source]
        source: ParseDecimalError,
    },

    /// A required principal was left unset (or set to zero).
    #[error("{field} must be a non-zero principal")]
    MissingPrincipal { field: &'static str },

    /// A collaborator configured by address has no handle to back it.
    #[error("no handle supplied for configured collaborator {name}")]
    MissingCollaborator { name: &'static str },

    /// A configuration section needed for the requested wiring is absent.
    #[error("missing configuration section [{section}]")]
    MissingSection { section: &'static str },

    /// `log_level` is not a valid tracing filter directive.
    #[error("invalid log_level {value:?}: {source}")]
    LogLevel {
        value: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    /// A configured value is rejected by the protocol's own bounds.
    #[error("invalid {field}: {source}")]
    Invalid {
        field: &'static str,
        #[source]
        source: FxError,
    },

    /// Building or wiring a component failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] FxError),
}
