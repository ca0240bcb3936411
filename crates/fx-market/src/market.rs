// crates/fx-market/src/market.rs
//
// The market: user-facing entry points in front of one treasury.
//
// Per call the market
//   1. checks the fxUSD routing rule and the stability-mode gates,
//   2. prices the fee off the pre-trade and projected post-trade collateral
//      ratio,
//   3. checks the slippage bound,
//   4. forwards the net amount to the treasury under its own principal, and
//   5. keeps the fee.
//
// Treasury configuration, settlement, and harvesting are not proxied: callers
// reach the treasury through `treasury_mut`, where its own capability table
// applies.

use serde::{Deserialize, Serialize};

use fx_core::{
    AccessControl, Capability, EventLog, FeeRatio, FxError, MarketEvent, Principal, Rounding,
    TokenKind, Wad,
};
use fx_treasury::{PoolState, Treasury};

use crate::fee::{FeeCurve, FeeSchedule};

/// Fee schedules for the four flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketFees {
    pub f_token_mint: FeeSchedule,
    pub x_token_mint: FeeSchedule,
    pub f_token_redeem: FeeSchedule,
    pub x_token_redeem: FeeSchedule,
}

impl MarketFees {
    fn mint(&self, token: TokenKind) -> &FeeSchedule {
        match token {
            TokenKind::Fractional => &self.f_token_mint,
            TokenKind::Leveraged => &self.x_token_mint,
        }
    }

    fn redeem(&self, token: TokenKind) -> &FeeSchedule {
        match token {
            TokenKind::Fractional => &self.f_token_redeem,
            TokenKind::Leveraged => &self.x_token_redeem,
        }
    }
}

/// Which risky flows are capped while the pool is below the stability ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityPolicy {
    pub f_token_mint_paused_in_stability_mode: bool,
    pub x_token_redeem_paused_in_stability_mode: bool,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            f_token_mint_paused_in_stability_mode: true,
            x_token_redeem_paused_in_stability_mode: true,
        }
    }
}

/// Construction parameters for a [`Market`].
#[derive(Debug, Clone)]
pub struct MarketParams {
    /// Principal the market acts under when calling its treasury.
    pub address: Principal,
    pub stability_ratio: Wad,
    /// Width of the fee slide below the stability ratio.
    pub stability_window: Wad,
    pub fees: MarketFees,
    pub policy: StabilityPolicy,
    /// Beneficiary of accrued fees.
    pub platform: Principal,
}

/// Priced mint: fee taken from the input, net forwarded to the treasury.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintQuote {
    pub fee_ratio: FeeRatio,
    pub fee: u128,
    pub net_in: u128,
    pub token_out: u128,
}

/// Priced redeem: fee taken from the treasury payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemQuote {
    pub fee_ratio: FeeRatio,
    pub fee: u128,
    pub base_out: u128,
}

pub struct Market {
    address: Principal,
    acl: AccessControl,
    treasury: Treasury,
    curve: FeeCurve,
    fees: MarketFees,
    policy: StabilityPolicy,
    platform: Principal,
    /// Raw base token collected as fees.
    accrued_fees: u128,
    fx_usd: Option<Principal>,
    events: EventLog<MarketEvent>,
}

impl Market {
    /// Wrap `treasury`. The treasury must separately grant the `Market`
    /// capability to `params.address` before trades go through.
    ///
    /// # Errors
    /// Returns `FxError::ZeroAddress` for a zero market or platform principal,
    /// and `FxError::InvalidStabilityRatio` for a ratio at or below 1.0.
    pub fn new(params: MarketParams, acl: AccessControl, treasury: Treasury) -> Result<Self, FxError> {
        Ok(Self {
            address: params.address.non_zero()?,
            acl,
            treasury,
            curve: FeeCurve::new(params.stability_ratio, params.stability_window)?,
            fees: params.fees,
            policy: params.policy,
            platform: params.platform.non_zero()?,
            accrued_fees: 0,
            fx_usd: None,
            events: EventLog::new(),
        })
    }

    pub fn address(&self) -> Principal {
        self.address
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    pub fn treasury_mut(&mut self) -> &mut Treasury {
        &mut self.treasury
    }

    pub fn base_token(&self) -> Principal {
        self.treasury.base_token()
    }

    pub fn fee_curve(&self) -> FeeCurve {
        self.curve
    }

    pub fn fees(&self) -> MarketFees {
        self.fees
    }

    pub fn stability_policy(&self) -> StabilityPolicy {
        self.policy
    }

    pub fn platform(&self) -> Principal {
        self.platform
    }

    pub fn accrued_fees(&self) -> u128 {
        self.accrued_fees
    }

    pub fn fx_usd(&self) -> Option<Principal> {
        self.fx_usd
    }

    pub fn events(&self) -> &[MarketEvent] {
        self.events.entries()
    }

    pub fn event_log(&self) -> &EventLog<MarketEvent> {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<MarketEvent> {
        self.events.take()
    }

    pub fn grant(
        &mut self,
        by: &Principal,
        principal: Principal,
        capability: Capability,
    ) -> Result<(), FxError> {
        self.acl.grant(by, principal, capability)
    }

    pub fn revoke(
        &mut self,
        by: &Principal,
        principal: Principal,
        capability: Capability,
    ) -> Result<(), FxError> {
        self.acl.revoke(by, principal, capability)
    }

    /// True while the collateral ratio sits below the stability ratio.
    pub fn in_stability_mode(&self) -> Result<bool, FxError> {
        Ok(self.treasury.collateral_ratio()? < self.curve.stability_ratio())
    }

    // ---------------------------------------------------------------
    // Quotes
    // ---------------------------------------------------------------

    fn require_initialized(&self) -> Result<(), FxError> {
        if !self.treasury.is_initialized() {
            return Err(FxError::ProtocolNotInitialized);
        }
        Ok(())
    }

    /// Price a mint of `raw_in` base units without executing it. Fails exactly
    /// when the mint would, apart from routing and slippage.
    pub fn quote_mint(&self, token: TokenKind, raw_in: u128) -> Result<MintQuote, FxError> {
        if raw_in == 0 {
            return Err(FxError::ZeroAmount);
        }
        self.require_initialized()?;
        let state = self.treasury.pool_state()?;
        let before = state.collateral_ratio()?;
        let gross_base = self.treasury.raw_to_base(raw_in)?;
        let after = project_mint(&state, token, gross_base)?.collateral_ratio()?;
        let fee_ratio = self.curve.trade_ratio(self.fees.mint(token), before, after)?;
        let fee = fee_ratio.apply(raw_in, Rounding::Up)?;
        let net_in = raw_in - fee;

        if token == TokenKind::Fractional && self.policy.f_token_mint_paused_in_stability_mode {
            let requested = self.treasury.raw_to_base(net_in)?;
            let max = state.max_mintable_f_token(self.curve.stability_ratio())?.base_in;
            if requested > max {
                return Err(FxError::FTokenMintInStabilityMode { requested, max });
            }
        }

        let token_out = self.treasury.preview_mint(token, net_in)?;
        tracing::debug!(
            ?token,
            raw_in,
            fee,
            token_out,
            before = %before,
            after = %after,
            "mint quoted"
        );
        Ok(MintQuote {
            fee_ratio,
            fee,
            net_in,
            token_out,
        })
    }

    /// Price a redemption of `token_in` tokens without executing it.
    pub fn quote_redeem(&self, token: TokenKind, token_in: u128) -> Result<RedeemQuote, FxError> {
        if token_in == 0 {
            return Err(FxError::ZeroAmount);
        }
        self.require_initialized()?;
        let state = self.treasury.pool_state()?;
        if token == TokenKind::Leveraged && self.policy.x_token_redeem_paused_in_stability_mode {
            let max = state
                .max_redeemable_x_token(self.curve.stability_ratio())?
                .token_in;
            if token_in > max {
                return Err(FxError::XTokenRedeemInStabilityMode {
                    requested: token_in,
                    max,
                });
            }
        }

        let (f_in, x_in) = match token {
            TokenKind::Fractional => (token_in, 0),
            TokenKind::Leveraged => (0, token_in),
        };
        let gross_out = self.treasury.preview_redeem(f_in, x_in)?;
        let before = state.collateral_ratio()?;
        let after = PoolState {
            base_supply: state
                .base_supply
                .saturating_sub(self.treasury.raw_to_base(gross_out)?),
            f_supply: state.f_supply - f_in,
            x_supply: state.x_supply - x_in,
            ..state
        }
        .collateral_ratio()?;
        let fee_ratio = self
            .curve
            .trade_ratio(self.fees.redeem(token), before, after)?;
        let fee = fee_ratio.apply(gross_out, Rounding::Up)?;
        tracing::debug!(?token, token_in, gross_out, fee, "redeem quoted");
        Ok(RedeemQuote {
            fee_ratio,
            fee,
            base_out: gross_out - fee,
        })
    }

    // ---------------------------------------------------------------
    // Trades
    // ---------------------------------------------------------------

    fn check_routing(&self, caller: &Principal, token: TokenKind) -> Result<(), FxError> {
        match self.fx_usd {
            Some(fx_usd) if token == TokenKind::Fractional && *caller != fx_usd => {
                Err(FxError::CallerNotFxUsd { caller: *caller })
            }
            _ => Ok(()),
        }
    }

    /// Mint fTokens for `raw_in` base units paid by `caller`.
    ///
    /// # Errors
    /// - `FxError::CallerNotFxUsd` once fToken flows are routed through an aggregator.
    /// - `FxError::FTokenMintInStabilityMode` when the gate is on and the mint
    ///   would push the ratio below the stability ratio.
    /// - `FxError::InsufficientOutput` if fewer than `min_out` tokens result.
    /// - Any treasury mint error.
    pub fn mint_f_token(
        &mut self,
        caller: &Principal,
        raw_in: u128,
        recipient: Principal,
        min_out: u128,
    ) -> Result<u128, FxError> {
        self.mint(caller, TokenKind::Fractional, raw_in, recipient, min_out)
    }

    /// Mint xTokens for `raw_in` base units paid by `caller`.
    pub fn mint_x_token(
        &mut self,
        caller: &Principal,
        raw_in: u128,
        recipient: Principal,
        min_out: u128,
    ) -> Result<u128, FxError> {
        self.mint(caller, TokenKind::Leveraged, raw_in, recipient, min_out)
    }

    fn mint(
        &mut self,
        caller: &Principal,
        token: TokenKind,
        raw_in: u128,
        recipient: Principal,
        min_out: u128,
    ) -> Result<u128, FxError> {
        self.check_routing(caller, token)?;
        let recipient = recipient.non_zero()?;
        let quote = self.quote_mint(token, raw_in)?;
        if quote.token_out < min_out {
            return Err(FxError::InsufficientOutput {
                min_out,
                actual: quote.token_out,
            });
        }
        let accrued_fees = self
            .accrued_fees
            .checked_add(quote.fee)
            .ok_or(FxError::MathOverflow)?;

        let token_out = match token {
            TokenKind::Fractional => {
                self.treasury
                    .mint_f_token(&self.address, quote.net_in, recipient)?
            }
            TokenKind::Leveraged => {
                self.treasury
                    .mint_x_token(&self.address, quote.net_in, recipient)?
            }
        };
        self.accrued_fees = accrued_fees;
        self.events.push(MarketEvent::Mint {
            token,
            owner: *caller,
            recipient,
            base_in: raw_in,
            token_out,
            fee: quote.fee,
        });
        Ok(token_out)
    }

    /// Redeem `f_token_in` of the caller's fTokens, paying the net base to `recipient`.
    ///
    /// # Errors
    /// - `FxError::CallerNotFxUsd` once fToken flows are routed through an aggregator.
    /// - `FxError::InsufficientOutput` if less than `min_out` base results.
    /// - Any treasury redeem error.
    pub fn redeem_f_token(
        &mut self,
        caller: &Principal,
        f_token_in: u128,
        recipient: Principal,
        min_out: u128,
    ) -> Result<u128, FxError> {
        self.redeem(caller, TokenKind::Fractional, f_token_in, recipient, min_out)
    }

    /// Redeem `x_token_in` of the caller's xTokens, paying the net base to `recipient`.
    ///
    /// # Errors
    /// - `FxError::XTokenRedeemInStabilityMode` when the gate is on and the
    ///   redemption would push the ratio below the stability ratio.
    /// - `FxError::InsufficientOutput` if less than `min_out` base results.
    /// - Any treasury redeem error.
    pub fn redeem_x_token(
        &mut self,
        caller: &Principal,
        x_token_in: u128,
        recipient: Principal,
        min_out: u128,
    ) -> Result<u128, FxError> {
        self.redeem(caller, TokenKind::Leveraged, x_token_in, recipient, min_out)
    }

    fn redeem(
        &mut self,
        caller: &Principal,
        token: TokenKind,
        token_in: u128,
        recipient: Principal,
        min_out: u128,
    ) -> Result<u128, FxError> {
        self.check_routing(caller, token)?;
        let recipient = recipient.non_zero()?;
        let quote = self.quote_redeem(token, token_in)?;
        if quote.base_out < min_out {
            return Err(FxError::InsufficientOutput {
                min_out,
                actual: quote.base_out,
            });
        }
        let accrued_fees = self
            .accrued_fees
            .checked_add(quote.fee)
            .ok_or(FxError::MathOverflow)?;

        let (f_in, x_in) = match token {
            TokenKind::Fractional => (token_in, 0),
            TokenKind::Leveraged => (0, token_in),
        };
        let gross_out = self.treasury.redeem(&self.address, f_in, x_in, caller)?;
        let base_out = gross_out - quote.fee;
        self.accrued_fees = accrued_fees;
        self.events.push(MarketEvent::Redeem {
            token,
            owner: *caller,
            recipient,
            token_in,
            base_out,
            fee: quote.fee,
        });
        Ok(base_out)
    }

    // ---------------------------------------------------------------
    // Configuration (Admin)
    // ---------------------------------------------------------------

    pub fn update_stability_ratio(&mut self, caller: &Principal, ratio: Wad) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let curve = self.curve.with_stability_ratio(ratio)?;
        let old = self.curve.stability_ratio();
        self.curve = curve;
        self.events
            .push(MarketEvent::UpdateStabilityRatio { old, new: ratio });
        Ok(())
    }

    /// # Errors
    /// Returns `FxError::InvalidFeeRatio` if either end of the schedule leaves [0, 100%].
    pub fn update_mint_fee_ratio(
        &mut self,
        caller: &Principal,
        token: TokenKind,
        default: FeeRatio,
        delta: i64,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let schedule = FeeSchedule::new(default, delta)?;
        match token {
            TokenKind::Fractional => self.fees.f_token_mint = schedule,
            TokenKind::Leveraged => self.fees.x_token_mint = schedule,
        }
        self.events.push(MarketEvent::UpdateMintFeeRatio {
            token,
            default,
            delta,
        });
        Ok(())
    }

    /// # Errors
    /// Returns `FxError::InvalidFeeRatio` if either end of the schedule leaves [0, 100%].
    pub fn update_redeem_fee_ratio(
        &mut self,
        caller: &Principal,
        token: TokenKind,
        default: FeeRatio,
        delta: i64,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let schedule = FeeSchedule::new(default, delta)?;
        match token {
            TokenKind::Fractional => self.fees.f_token_redeem = schedule,
            TokenKind::Leveraged => self.fees.x_token_redeem = schedule,
        }
        self.events.push(MarketEvent::UpdateRedeemFeeRatio {
            token,
            default,
            delta,
        });
        Ok(())
    }

    pub fn update_platform(&mut self, caller: &Principal, platform: Principal) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let new = platform.non_zero()?;
        let old = self.platform;
        self.platform = new;
        self.events.push(MarketEvent::UpdatePlatform { old, new });
        Ok(())
    }

    pub fn update_stability_policy(
        &mut self,
        caller: &Principal,
        policy: StabilityPolicy,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        self.policy = policy;
        self.events.push(MarketEvent::UpdateStabilityPolicy {
            f_token_mint_paused: policy.f_token_mint_paused_in_stability_mode,
            x_token_redeem_paused: policy.x_token_redeem_paused_in_stability_mode,
        });
        Ok(())
    }

    /// Route all fToken mints and redemptions through `fx_usd` from now on.
    pub fn enable_fx_usd(&mut self, caller: &Principal, fx_usd: Principal) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let fx_usd = fx_usd.non_zero()?;
        self.fx_usd = Some(fx_usd);
        self.events.push(MarketEvent::EnableFxUsd { fx_usd });
        tracing::info!(market = %self.address, fx_usd = %fx_usd, "fToken flows routed through fxUSD");
        Ok(())
    }
}

/// Pool state after adding `base_in` collateral and the tokens it would buy
/// at current NAVs.
fn project_mint(state: &PoolState, token: TokenKind, base_in: u128) -> Result<PoolState, FxError> {
    let value = state.base_nav.mul_amount(base_in, Rounding::Down)?;
    let nav = match token {
        TokenKind::Fractional => state.f_nav,
        TokenKind::Leveraged => state.x_nav()?,
    };
    let token_out = if nav.is_zero() {
        0
    } else {
        nav.div_amount(value, Rounding::Down)?
    };
    let base_supply = state
        .base_supply
        .checked_add(base_in)
        .ok_or(FxError::MathOverflow)?;
    Ok(match token {
        TokenKind::Fractional => PoolState {
            base_supply,
            f_supply: state.f_supply.saturating_add(token_out),
            ..*state
        },
        TokenKind::Leveraged => PoolState {
            base_supply,
            x_supply: state.x_supply.saturating_add(token_out),
            ..*state
        },
    })
}
