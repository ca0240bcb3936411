// crates/fx-engine/src/config.rs
//
// Protocol configuration.
// Loaded from a TOML file or populated with defaults.
//
// Amounts and 18-decimal ratios are written as decimal strings ("1.3",
// "250000") because TOML integers stop at i64. Fee ratios use the raw
// 9-decimal integer scale (10_000_000 = 1%).

use std::fs;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use fx_core::{FeeRatio, Principal, Wad};
use fx_market::{FeeCurve, FeeSchedule, MarketFees, StabilityPolicy};
use fx_treasury::{EmaLeverage, HarvestRatios};

use crate::error::EngineError;

/// Root of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// Default tracing filter ("info", "fx_treasury=debug", ...), used by
    /// `logging::init_from_config` when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub roles: RolesConfig,

    #[serde(default)]
    pub treasury: TreasuryConfig,

    #[serde(default)]
    pub market: MarketConfig,

    /// Present only when the market is aggregated into fxUSD.
    #[serde(default)]
    pub fx_usd: Option<FxUsdConfig>,
}

/// Who administers the deployment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolesConfig {
    /// Grants and revokes capabilities on every component.
    #[serde(default)]
    pub super_admin: Principal,

    /// Receives Admin, ProtocolInitializer, and SettleWhitelist.
    #[serde(default)]
    pub operator: Principal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreasuryConfig {
    #[serde(default)]
    pub base_token: Principal,

    #[serde(default)]
    pub price_oracle: Principal,

    /// Only for wrapped collateral.
    #[serde(default)]
    pub rate_provider: Option<Principal>,

    #[serde(default)]
    pub rebalance_pool_splitter: Principal,

    #[serde(default)]
    pub platform: Principal,

    /// Collateral cap in base units, as a decimal.
    #[serde(default = "default_base_token_cap")]
    pub base_token_cap: String,

    /// EMA sampling interval in seconds.
    #[serde(default = "default_ema_sample_interval")]
    pub ema_sample_interval: u64,

    #[serde(default = "default_harvester_ratio")]
    pub harvester_ratio: u64,

    #[serde(default = "default_rebalance_pool_ratio")]
    pub rebalance_pool_ratio: u64,
}

/// Default ratio plus signed delta for one fee schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FeeConfig {
    pub default_fee_ratio: u64,
    #[serde(default)]
    pub delta_fee_ratio: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Principal the market trades under on the treasury.
    #[serde(default)]
    pub address: Principal,

    #[serde(default)]
    pub platform: Principal,

    #[serde(default = "default_stability_ratio")]
    pub stability_ratio: String,

    #[serde(default = "default_stability_window")]
    pub stability_window: String,

    #[serde(default = "default_f_token_mint_fee")]
    pub f_token_mint_fee: FeeConfig,

    #[serde(default = "default_x_token_mint_fee")]
    pub x_token_mint_fee: FeeConfig,

    #[serde(default = "default_f_token_redeem_fee")]
    pub f_token_redeem_fee: FeeConfig,

    #[serde(default = "default_x_token_redeem_fee")]
    pub x_token_redeem_fee: FeeConfig,

    #[serde(default = "default_true")]
    pub f_token_mint_paused_in_stability_mode: bool,

    #[serde(default = "default_true")]
    pub x_token_redeem_paused_in_stability_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxUsdConfig {
    #[serde(default)]
    pub address: Principal,

    /// fTokens mintable through this market, as a decimal.
    #[serde(default = "default_mint_cap")]
    pub mint_cap: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_token_cap() -> String {
    "1000000".to_string()
}

fn default_ema_sample_interval() -> u64 {
    3600
}

fn default_harvester_ratio() -> u64 {
    10_000_000
}

fn default_rebalance_pool_ratio() -> u64 {
    500_000_000
}

fn default_stability_ratio() -> String {
    "1.3".to_string()
}

fn default_stability_window() -> String {
    "0.2".to_string()
}

fn default_f_token_mint_fee() -> FeeConfig {
    FeeConfig {
        default_fee_ratio: 2_500_000,
        delta_fee_ratio: 7_500_000,
    }
}

fn default_x_token_mint_fee() -> FeeConfig {
    FeeConfig {
        default_fee_ratio: 10_000_000,
        delta_fee_ratio: -10_000_000,
    }
}

fn default_f_token_redeem_fee() -> FeeConfig {
    FeeConfig {
        default_fee_ratio: 2_500_000,
        delta_fee_ratio: -2_500_000,
    }
}

fn default_x_token_redeem_fee() -> FeeConfig {
    FeeConfig {
        default_fee_ratio: 10_000_000,
        delta_fee_ratio: 40_000_000,
    }
}

fn default_true() -> bool {
    true
}

fn default_mint_cap() -> String {
    "10000000".to_string()
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            roles: RolesConfig::default(),
            treasury: TreasuryConfig::default(),
            market: MarketConfig::default(),
            fx_usd: None,
        }
    }
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            base_token: Principal::ZERO,
            price_oracle: Principal::ZERO,
            rate_provider: None,
            rebalance_pool_splitter: Principal::ZERO,
            platform: Principal::ZERO,
            base_token_cap: default_base_token_cap(),
            ema_sample_interval: default_ema_sample_interval(),
            harvester_ratio: default_harvester_ratio(),
            rebalance_pool_ratio: default_rebalance_pool_ratio(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            address: Principal::ZERO,
            platform: Principal::ZERO,
            stability_ratio: default_stability_ratio(),
            stability_window: default_stability_window(),
            f_token_mint_fee: default_f_token_mint_fee(),
            x_token_mint_fee: default_x_token_mint_fee(),
            f_token_redeem_fee: default_f_token_redeem_fee(),
            x_token_redeem_fee: default_x_token_redeem_fee(),
            f_token_mint_paused_in_stability_mode: true,
            x_token_redeem_paused_in_stability_mode: true,
        }
    }
}

impl ProtocolConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: ProtocolConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Check every field against the bounds the components enforce, so a bad
    /// file fails before anything is built.
    pub fn validate(&self) -> Result<(), EngineError> {
        EnvFilter::try_new(&self.log_level).map_err(|source| EngineError::LogLevel {
            value: self.log_level.clone(),
            source,
        })?;
        require_principal("roles.super_admin", self.roles.super_admin)?;
        require_principal("roles.operator", self.roles.operator)?;

        let t = &self.treasury;
        require_principal("treasury.base_token", t.base_token)?;
        require_principal("treasury.price_oracle", t.price_oracle)?;
        require_principal("treasury.rebalance_pool_splitter", t.rebalance_pool_splitter)?;
        require_principal("treasury.platform", t.platform)?;
        if let Some(rate_provider) = t.rate_provider {
            require_principal("treasury.rate_provider", rate_provider)?;
        }
        self.base_token_cap()?;
        EmaLeverage::new(t.ema_sample_interval).map_err(|source| EngineError::Invalid {
            field: "treasury.ema_sample_interval",
            source,
        })?;
        self.harvest_ratios()?;

        let m = &self.market;
        require_principal("market.address", m.address)?;
        require_principal("market.platform", m.platform)?;
        self.fee_curve()?;
        self.market_fees()?;

        if let Some(fx_usd) = &self.fx_usd {
            require_principal("fx_usd.address", fx_usd.address)?;
            parse_wad("fx_usd.mint_cap", &fx_usd.mint_cap)?;
        }
        Ok(())
    }

    pub fn base_token_cap(&self) -> Result<u128, EngineError> {
        Ok(parse_wad("treasury.base_token_cap", &self.treasury.base_token_cap)?.raw())
    }

    pub fn harvest_ratios(&self) -> Result<HarvestRatios, EngineError> {
        let t = &self.treasury;
        HarvestRatios::new(FeeRatio(t.harvester_ratio), FeeRatio::ZERO)
            .map_err(|source| EngineError::Invalid {
                field: "treasury.harvester_ratio",
                source,
            })?
            .with_rebalance_pool(FeeRatio(t.rebalance_pool_ratio))
            .map_err(|source| EngineError::Invalid {
                field: "treasury.rebalance_pool_ratio",
                source,
            })
    }

    pub fn fee_curve(&self) -> Result<FeeCurve, EngineError> {
        let stability_ratio = parse_wad("market.stability_ratio", &self.market.stability_ratio)?;
        let window = parse_wad("market.stability_window", &self.market.stability_window)?;
        FeeCurve::new(stability_ratio, window).map_err(|source| EngineError::Invalid {
            field: "market.stability_ratio",
            source,
        })
    }

    pub fn market_fees(&self) -> Result<MarketFees, EngineError> {
        let m = &self.market;
        Ok(MarketFees {
            f_token_mint: schedule("market.f_token_mint_fee", m.f_token_mint_fee)?,
            x_token_mint: schedule("market.x_token_mint_fee", m.x_token_mint_fee)?,
            f_token_redeem: schedule("market.f_token_redeem_fee", m.f_token_redeem_fee)?,
            x_token_redeem: schedule("market.x_token_redeem_fee", m.x_token_redeem_fee)?,
        })
    }

    pub fn stability_policy(&self) -> StabilityPolicy {
        StabilityPolicy {
            f_token_mint_paused_in_stability_mode: self.market.f_token_mint_paused_in_stability_mode,
            x_token_redeem_paused_in_stability_mode: self
                .market
                .x_token_redeem_paused_in_stability_mode,
        }
    }
}

fn require_principal(field: &'static str, principal: Principal) -> Result<(), EngineError> {
    if principal.is_zero() {
        return Err(EngineError::MissingPrincipal { field });
    }
    Ok(())
}

pub(crate) fn parse_wad(field: &'static str, value: &str) -> Result<Wad, EngineError> {
    value
        .parse()
        .map_err(|source| EngineError::Decimal { field, source })
}

fn schedule(field: &'static str, fee: FeeConfig) -> Result<FeeSchedule, EngineError> {
    FeeSchedule::new(FeeRatio(fee.default_fee_ratio), fee.delta_fee_ratio)
        .map_err(|source| EngineError::Invalid { field, source })
}
