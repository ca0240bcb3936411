// crates/fx-engine/src/logging.rs
//
// Tracing subscriber setup. `RUST_LOG` wins when set; otherwise the configured
// level applies.

use tracing_subscriber::EnvFilter;

use crate::config::ProtocolConfig;

/// Install the global fmt subscriber.
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init()
}

/// Install the global fmt subscriber with `log_level` from `config` as the
/// default filter.
pub fn init_from_config(config: &ProtocolConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing(&config.log_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Only one global subscriber per process.
        let _ = init_tracing("debug");
        assert!(init_tracing("debug").is_err());
    }

    #[test]
    fn test_config_level_goes_through_the_same_init() {
        let config = crate::config::tests::sample();
        let _ = init_from_config(&config);
        assert!(init_from_config(&config).is_err());
    }
}
