// crates/fx-engine/src/deployment.rs
//
// Builds a treasury and its market from a validated `ProtocolConfig`.
//
// Capability wiring:
//   treasury: market address   -> Market
//             operator         -> Admin, ProtocolInitializer, SettleWhitelist
//   market:   operator         -> Admin
//   fxUSD:    operator         -> Admin (only via `into_fx_usd`)
//
// The super-admin grants everything above and holds no capability itself.

use std::sync::Arc;

use fx_core::{
    AccessControl, Capability, Collaborator, PriceOracle, Principal, RateProvider,
    RebalancePoolSplitter,
};
use fx_market::{FxUsd, Market, MarketParams};
use fx_treasury::{Treasury, TreasuryParams};

use crate::config::{parse_wad, ProtocolConfig};
use crate::error::EngineError;

/// Handles backing the collaborator addresses named in the configuration.
pub struct Collaborators {
    pub price_oracle: Arc<dyn PriceOracle>,
    /// Required exactly when `treasury.rate_provider` is configured.
    pub rate_provider: Option<Arc<dyn RateProvider>>,
    pub rebalance_pool_splitter: Arc<dyn RebalancePoolSplitter>,
}

/// A wired market (owning its treasury) and the principals that administer it.
pub struct Deployment {
    pub market: Market,
    pub super_admin: Principal,
    pub operator: Principal,
}

impl Deployment {
    /// Validate `config` and build the treasury and market with all
    /// capability grants in place. The treasury starts uninitialized.
    ///
    /// # Errors
    /// Returns the first validation failure, or `EngineError::MissingCollaborator`
    /// if a configured rate provider has no handle.
    pub fn build(config: &ProtocolConfig, collaborators: Collaborators) -> Result<Self, EngineError> {
        config.validate()?;
        let super_admin = config.roles.super_admin;
        let operator = config.roles.operator;
        let t = &config.treasury;
        let m = &config.market;

        let rate_provider = match (t.rate_provider, collaborators.rate_provider) {
            (Some(address), Some(handle)) => Some(Collaborator::new(address, handle)?),
            (Some(_), None) => {
                return Err(EngineError::MissingCollaborator {
                    name: "rate_provider",
                })
            }
            (None, Some(_)) => {
                tracing::warn!("rate provider handle supplied without an address; ignoring it");
                None
            }
            (None, None) => None,
        };
        let harvest_ratios = config.harvest_ratios()?;
        let params = TreasuryParams {
            base_token: t.base_token,
            price_oracle: Collaborator::new(t.price_oracle, collaborators.price_oracle)?,
            rate_provider,
            rebalance_pool_splitter: Collaborator::new(
                t.rebalance_pool_splitter,
                collaborators.rebalance_pool_splitter,
            )?,
            platform: t.platform,
            base_token_cap: config.base_token_cap()?,
            ema_sample_interval: t.ema_sample_interval,
            harvester_ratio: harvest_ratios.harvester(),
            rebalance_pool_ratio: harvest_ratios.rebalance_pool(),
        };

        let mut treasury = Treasury::new(params, AccessControl::new(super_admin)?)?;
        treasury.grant(&super_admin, m.address, Capability::Market)?;
        for capability in [
            Capability::Admin,
            Capability::ProtocolInitializer,
            Capability::SettleWhitelist,
        ] {
            treasury.grant(&super_admin, operator, capability)?;
        }

        let curve = config.fee_curve()?;
        let mut market = Market::new(
            MarketParams {
                address: m.address,
                stability_ratio: curve.stability_ratio(),
                stability_window: curve.window(),
                fees: config.market_fees()?,
                policy: config.stability_policy(),
                platform: m.platform,
            },
            AccessControl::new(super_admin)?,
            treasury,
        )?;
        market.grant(&super_admin, operator, Capability::Admin)?;

        tracing::info!(
            base_token = %t.base_token,
            market = %m.address,
            operator = %operator,
            "deployment built"
        );
        Ok(Self {
            market,
            super_admin,
            operator,
        })
    }

    /// Route the market's fToken flows through a new fxUSD aggregator built
    /// from the `[fx_usd]` section, and register the market with it.
    pub fn into_fx_usd(self, config: &ProtocolConfig) -> Result<FxUsd, EngineError> {
        let section = config
            .fx_usd
            .as_ref()
            .ok_or(EngineError::MissingSection { section: "fx_usd" })?;
        let mint_cap = parse_wad("fx_usd.mint_cap", &section.mint_cap)?.raw();

        let mut market = self.market;
        market.enable_fx_usd(&self.operator, section.address)?;
        let mut fx_usd = FxUsd::new(section.address, AccessControl::new(self.super_admin)?)?;
        fx_usd.grant(&self.super_admin, self.operator, Capability::Admin)?;
        fx_usd.add_market(&self.operator, market, mint_cap)?;
        Ok(fx_usd)
    }
}
