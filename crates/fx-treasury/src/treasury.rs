// crates/fx-treasury/src/treasury.rs
//
// The treasury: sole owner of the collateral balance, both token supplies,
// the reference price, and the EMA leverage state.
//
// Lifecycle:
//   Uninitialized --initialize_protocol--> Operating
//
// Operating is terminal. Outside it, only deposits and configuration setters
// are accepted.
//
// Every mutating entry point is planned first against an immutable borrow
// (all checks and arithmetic), then committed, then followed by any pushes to
// collaborators. A failed call therefore leaves the treasury untouched, and
// no collaborator ever observes a half-written state.

use std::fmt;

use fx_core::{
    AccessControl, Capability, Collaborator, EventLog, FeeRatio, FxError, PriceOracle, Principal,
    RateProvider, RebalancePoolSplitter, Rounding, Strategy, TokenKind, TreasuryEvent, Wad,
};

use crate::ema::EmaLeverage;
use crate::harvest::{split_harvest, HarvestRatios, HarvestSplit};
use crate::nav::{MintSizing, PoolState, RedeemSizing};
use crate::token::{FractionalToken, LeveragedToken};

/// Lifecycle states of a treasury.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreasuryState {
    /// Created, not yet seeded with collateral.
    Uninitialized,
    /// Seeded; accepts mint, redeem, harvest, and settle.
    Operating,
}

impl fmt::Display for TreasuryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreasuryState::Uninitialized => write!(f, "Uninitialized"),
            TreasuryState::Operating => write!(f, "Operating"),
        }
    }
}

/// Construction parameters for a [`Treasury`].
pub struct TreasuryParams {
    /// Identity of the base collateral asset.
    pub base_token: Principal,
    pub price_oracle: Collaborator<dyn PriceOracle>,
    /// Present only for wrapped or rebasing collateral.
    pub rate_provider: Option<Collaborator<dyn RateProvider>>,
    pub rebalance_pool_splitter: Collaborator<dyn RebalancePoolSplitter>,
    /// Recipient of the platform share of harvests.
    pub platform: Principal,
    /// Maximum collateral admitted, in base units.
    pub base_token_cap: u128,
    /// EMA sampling interval in seconds.
    pub ema_sample_interval: u64,
    pub harvester_ratio: FeeRatio,
    pub rebalance_pool_ratio: FeeRatio,
}

struct MintPlan {
    base_in: u128,
    token_out: u128,
}

struct RedeemPlan {
    base_out: u128,
    raw_out: u128,
    from_strategy: u128,
}

/// Collateral accounting for one base asset.
pub struct Treasury {
    base_token: Principal,
    state: TreasuryState,
    acl: AccessControl,
    f_token: FractionalToken,
    x_token: LeveragedToken,
    price_oracle: Collaborator<dyn PriceOracle>,
    rate_provider: Option<Collaborator<dyn RateProvider>>,
    strategy: Option<Collaborator<dyn Strategy>>,
    rebalance_pool_splitter: Collaborator<dyn RebalancePoolSplitter>,
    platform: Principal,
    /// Collateral accounted for, in base units.
    total_base_token: u128,
    /// Raw collateral held directly by the treasury.
    base_balance: u128,
    /// Raw collateral handed to the strategy, including reported profit.
    strategy_underlying: u128,
    base_token_cap: u128,
    reference_base_token_price: Wad,
    ema_leverage: EmaLeverage,
    harvest_ratios: HarvestRatios,
    events: EventLog<TreasuryEvent>,
}

impl Treasury {
    /// Create an uninitialized treasury. The fractional token is pegged at 1.0.
    ///
    /// # Errors
    /// Returns `FxError::ZeroAddress` for a zero base token or platform, and
    /// the corresponding bound error for an out-of-range EMA interval or
    /// harvest ratio.
    pub fn new(params: TreasuryParams, acl: AccessControl) -> Result<Self, FxError> {
        let ema_leverage = EmaLeverage::new(params.ema_sample_interval)?;
        let harvest_ratios =
            HarvestRatios::new(params.harvester_ratio, params.rebalance_pool_ratio)?;
        Ok(Self {
            base_token: params.base_token.non_zero()?,
            state: TreasuryState::Uninitialized,
            acl,
            f_token: FractionalToken::new(Wad::ONE),
            x_token: LeveragedToken::new(),
            price_oracle: params.price_oracle,
            rate_provider: params.rate_provider,
            strategy: None,
            rebalance_pool_splitter: params.rebalance_pool_splitter,
            platform: params.platform.non_zero()?,
            total_base_token: 0,
            base_balance: 0,
            strategy_underlying: 0,
            base_token_cap: params.base_token_cap,
            reference_base_token_price: Wad::ZERO,
            ema_leverage,
            harvest_ratios,
            events: EventLog::new(),
        })
    }

    // ---------------------------------------------------------------
    // Access control
    // ---------------------------------------------------------------

    pub fn access_control(&self) -> &AccessControl {
        &self.acl
    }

    /// Grant a capability on this treasury. Only the super-admin may grant.
    pub fn grant(
        &mut self,
        by: &Principal,
        principal: Principal,
        capability: Capability,
    ) -> Result<(), FxError> {
        self.acl.grant(by, principal, capability)
    }

    /// Revoke a capability on this treasury. Only the super-admin may revoke.
    pub fn revoke(
        &mut self,
        by: &Principal,
        principal: Principal,
        capability: Capability,
    ) -> Result<(), FxError> {
        self.acl.revoke(by, principal, capability)
    }

    // ---------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------

    pub fn state(&self) -> TreasuryState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == TreasuryState::Operating
    }

    pub fn base_token(&self) -> Principal {
        self.base_token
    }

    pub fn total_base_token(&self) -> u128 {
        self.total_base_token
    }

    pub fn base_token_cap(&self) -> u128 {
        self.base_token_cap
    }

    /// Raw collateral held directly (excluding the strategy's share).
    pub fn base_balance(&self) -> u128 {
        self.base_balance
    }

    pub fn strategy_underlying(&self) -> u128 {
        self.strategy_underlying
    }

    /// Price recorded at the last settlement (zero before initialization).
    pub fn reference_base_token_price(&self) -> Wad {
        self.reference_base_token_price
    }

    pub fn platform(&self) -> Principal {
        self.platform
    }

    pub fn harvest_ratios(&self) -> HarvestRatios {
        self.harvest_ratios
    }

    pub fn ema_leverage(&self) -> &EmaLeverage {
        &self.ema_leverage
    }

    pub fn f_token(&self) -> &FractionalToken {
        &self.f_token
    }

    pub fn x_token(&self) -> &LeveragedToken {
        &self.x_token
    }

    pub fn events(&self) -> &[TreasuryEvent] {
        self.events.entries()
    }

    pub fn event_log(&self) -> &EventLog<TreasuryEvent> {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<TreasuryEvent> {
        self.events.take()
    }

    /// Current oracle price.
    ///
    /// # Errors
    /// Returns `FxError::InvalidOraclePrice` if the oracle reports an invalid or zero price.
    pub fn current_base_token_price(&self) -> Result<Wad, FxError> {
        self.price_oracle.handle.get_price().valid_price()
    }

    /// Pool snapshot at the current oracle price.
    pub fn pool_state(&self) -> Result<PoolState, FxError> {
        Ok(self.pool_state_at(self.current_base_token_price()?))
    }

    fn pool_state_at(&self, price: Wad) -> PoolState {
        PoolState {
            base_supply: self.total_base_token,
            base_nav: price,
            f_supply: self.f_token.total_supply(),
            f_nav: self.f_token.nav(),
            x_supply: self.x_token.total_supply(),
        }
    }

    pub fn f_nav(&self) -> Wad {
        self.f_token.nav()
    }

    pub fn x_nav(&self) -> Result<Wad, FxError> {
        self.pool_state()?.x_nav()
    }

    pub fn collateral_ratio(&self) -> Result<Wad, FxError> {
        self.pool_state()?.collateral_ratio()
    }

    /// Instantaneous leverage ratio of the leveraged token.
    pub fn leverage_ratio(&self) -> Result<Wad, FxError> {
        self.pool_state()?.leverage_ratio()
    }

    /// Smoothed leverage ratio projected to `now`.
    pub fn ema_leverage_ratio(&self, now: u64) -> Result<Wad, FxError> {
        self.ema_leverage.ema_value(now)
    }

    pub fn max_mintable_f_token(&self, target: Wad) -> Result<MintSizing, FxError> {
        self.pool_state()?.max_mintable_f_token(target)
    }

    pub fn max_mintable_x_token(&self, target: Wad) -> Result<MintSizing, FxError> {
        self.pool_state()?.max_mintable_x_token(target)
    }

    pub fn max_redeemable_f_token(&self, target: Wad) -> Result<RedeemSizing, FxError> {
        self.pool_state()?.max_redeemable_f_token(target)
    }

    pub fn max_redeemable_x_token(&self, target: Wad) -> Result<RedeemSizing, FxError> {
        self.pool_state()?.max_redeemable_x_token(target)
    }

    /// Collateral held (directly and through the strategy) beyond what is
    /// accounted for, in base units.
    pub fn harvestable(&self) -> Result<u128, FxError> {
        let held_raw = self
            .base_balance
            .checked_add(self.strategy_held())
            .ok_or(FxError::MathOverflow)?;
        Ok(self.raw_to_base(held_raw)?.saturating_sub(self.total_base_token))
    }

    /// Raw token units to base units (rounds down).
    pub fn raw_to_base(&self, raw: u128) -> Result<u128, FxError> {
        self.rate()?.mul_amount(raw, Rounding::Down)
    }

    /// Base units to raw token units (rounds down).
    pub fn base_to_raw(&self, base: u128) -> Result<u128, FxError> {
        self.rate()?.div_amount(base, Rounding::Down)
    }

    fn rate(&self) -> Result<Wad, FxError> {
        let Some(provider) = &self.rate_provider else {
            return Ok(Wad::ONE);
        };
        let rate = provider.handle.get_rate();
        if rate.is_zero() {
            return Err(FxError::InvalidRate);
        }
        Ok(rate)
    }

    fn strategy_held(&self) -> u128 {
        if self.strategy.is_some() {
            self.strategy_underlying
        } else {
            0
        }
    }

    fn require_operating(&self) -> Result<(), FxError> {
        if self.state != TreasuryState::Operating {
            return Err(FxError::ProtocolNotInitialized);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Collateral inflow
    // ---------------------------------------------------------------

    /// Record `raw` units of base token transferred to the treasury outside
    /// of a mint (the genesis deposit, or yield donated to the treasury).
    pub fn deposit_base(&mut self, raw: u128) -> Result<(), FxError> {
        self.base_balance = self
            .base_balance
            .checked_add(raw)
            .ok_or(FxError::MathOverflow)?;
        tracing::debug!(raw, balance = self.base_balance, "base token deposited");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Seed the protocol with `raw_in` units of collateral already deposited,
    /// minting equal-value fToken and xToken halves to `recipient`.
    ///
    /// # Returns
    /// `(f_token_out, x_token_out)`.
    ///
    /// # Errors
    /// - `FxError::Unauthorized` without `ProtocolInitializer`.
    /// - `FxError::ProtocolInitialized` on a second call.
    /// - `FxError::InsufficientInitialBaseToken` if the deposit is short.
    /// - `FxError::ExceedTotalCap` if the seed exceeds the cap.
    /// - `FxError::InvalidOraclePrice` if the oracle is invalid.
    pub fn initialize_protocol(
        &mut self,
        caller: &Principal,
        raw_in: u128,
        recipient: Principal,
        now: u64,
    ) -> Result<(u128, u128), FxError> {
        self.acl.require(caller, Capability::ProtocolInitializer)?;
        if self.state == TreasuryState::Operating {
            return Err(FxError::ProtocolInitialized);
        }
        let recipient = recipient.non_zero()?;
        if raw_in == 0 {
            return Err(FxError::ZeroAmount);
        }

        let available = self.raw_to_base(self.base_balance)?;
        let base_in = self.raw_to_base(raw_in)?;
        if available < base_in {
            return Err(FxError::InsufficientInitialBaseToken {
                required: base_in,
                available,
            });
        }
        if base_in > self.base_token_cap {
            return Err(FxError::ExceedTotalCap {
                attempted: base_in,
                cap: self.base_token_cap,
            });
        }

        let price = self.current_base_token_price()?;
        let f_token_out = price.mul_amount(base_in, Rounding::Down)? / 2;
        let x_token_out = f_token_out;
        let genesis = PoolState {
            base_supply: base_in,
            base_nav: price,
            f_supply: f_token_out,
            f_nav: self.f_token.nav(),
            x_supply: x_token_out,
        };
        let leverage = genesis.leverage_ratio()?;

        self.f_token.ledger_mut().mint(recipient, f_token_out)?;
        self.x_token.ledger_mut().mint(recipient, x_token_out)?;
        self.total_base_token = base_in;
        self.reference_base_token_price = price;
        self.ema_leverage.seed(leverage, now);
        self.state = TreasuryState::Operating;

        tracing::info!(
            "Treasury state transition: {} -> {}",
            TreasuryState::Uninitialized,
            TreasuryState::Operating
        );
        self.events.push(TreasuryEvent::Settle {
            old_price: Wad::ZERO,
            new_price: price,
        });
        self.events.push(TreasuryEvent::ProtocolInitialized {
            recipient,
            base_in,
            f_token_out,
            x_token_out,
        });
        Ok((f_token_out, x_token_out))
    }

    // ---------------------------------------------------------------
    // Mint
    // ---------------------------------------------------------------

    /// Tokens `mint_f_token`/`mint_x_token` would produce for `raw_in`, without
    /// mutating state. Fails exactly when the mint would fail (authorization
    /// aside).
    pub fn preview_mint(&self, token: TokenKind, raw_in: u128) -> Result<u128, FxError> {
        Ok(self.plan_mint(token, raw_in)?.token_out)
    }

    /// Mint fTokens for `raw_in` base units transferred by the caller.
    ///
    /// # Errors
    /// - `FxError::Unauthorized` without the `Market` capability.
    /// - `FxError::ExceedTotalCap` if collateral would exceed the cap.
    /// - `FxError::UnderCollateral` if the collateral ratio is, or would end, at or below 1.0.
    pub fn mint_f_token(
        &mut self,
        caller: &Principal,
        raw_in: u128,
        recipient: Principal,
    ) -> Result<u128, FxError> {
        self.mint(caller, TokenKind::Fractional, raw_in, recipient)
    }

    /// Mint xTokens for `raw_in` base units transferred by the caller, priced
    /// at the pre-mint xToken NAV.
    ///
    /// # Errors
    /// As [`Treasury::mint_f_token`]; also `FxError::UnderCollateral` when the
    /// xToken NAV is zero.
    pub fn mint_x_token(
        &mut self,
        caller: &Principal,
        raw_in: u128,
        recipient: Principal,
    ) -> Result<u128, FxError> {
        self.mint(caller, TokenKind::Leveraged, raw_in, recipient)
    }

    fn mint(
        &mut self,
        caller: &Principal,
        token: TokenKind,
        raw_in: u128,
        recipient: Principal,
    ) -> Result<u128, FxError> {
        self.acl.require(caller, Capability::Market)?;
        if raw_in == 0 {
            return Ok(0);
        }
        let plan = self.plan_mint(token, raw_in)?;
        let base_balance = self
            .base_balance
            .checked_add(raw_in)
            .ok_or(FxError::MathOverflow)?;

        match token {
            TokenKind::Fractional => self.f_token.ledger_mut().mint(recipient, plan.token_out)?,
            TokenKind::Leveraged => self.x_token.ledger_mut().mint(recipient, plan.token_out)?,
        }
        self.base_balance = base_balance;
        self.total_base_token += plan.base_in;

        self.events.push(TreasuryEvent::Mint {
            token,
            recipient,
            base_in: plan.base_in,
            token_out: plan.token_out,
        });
        Ok(plan.token_out)
    }

    fn plan_mint(&self, token: TokenKind, raw_in: u128) -> Result<MintPlan, FxError> {
        self.require_operating()?;
        let price = self.current_base_token_price()?;
        let base_in = self.raw_to_base(raw_in)?;

        let attempted = self
            .total_base_token
            .checked_add(base_in)
            .ok_or(FxError::MathOverflow)?;
        if attempted > self.base_token_cap {
            return Err(FxError::ExceedTotalCap {
                attempted,
                cap: self.base_token_cap,
            });
        }

        let state = self.pool_state_at(price);
        if state.is_under_collateral()? {
            return Err(FxError::UnderCollateral);
        }
        let nav = match token {
            TokenKind::Fractional => state.f_nav,
            TokenKind::Leveraged => state.x_nav()?,
        };
        if nav.is_zero() {
            return Err(FxError::UnderCollateral);
        }

        let value = price.mul_amount(base_in, Rounding::Down)?;
        let token_out = nav.div_amount(value, Rounding::Down)?;
        let after = match token {
            TokenKind::Fractional => PoolState {
                base_supply: attempted,
                f_supply: state.f_supply.checked_add(token_out).ok_or(FxError::MathOverflow)?,
                ..state
            },
            TokenKind::Leveraged => PoolState {
                base_supply: attempted,
                x_supply: state.x_supply.checked_add(token_out).ok_or(FxError::MathOverflow)?,
                ..state
            },
        };
        if after.f_supply > 0 && after.collateral_ratio()? <= Wad::ONE {
            return Err(FxError::UnderCollateral);
        }

        tracing::debug!(?token, base_in, token_out, nav = %nav, price = %price, "mint planned");
        Ok(MintPlan { base_in, token_out })
    }

    // ---------------------------------------------------------------
    // Redeem
    // ---------------------------------------------------------------

    /// Raw base `redeem` would pay for the given token amounts, without
    /// mutating state.
    pub fn preview_redeem(&self, f_token_in: u128, x_token_in: u128) -> Result<u128, FxError> {
        if f_token_in == 0 && x_token_in == 0 {
            return Ok(0);
        }
        Ok(self.plan_redeem(f_token_in, x_token_in)?.raw_out)
    }

    /// Burn `f_token_in` fTokens and `x_token_in` xTokens from `owner` and pay
    /// the backing collateral to the caller.
    ///
    /// Below a collateral ratio of 1.0 only fTokens may be redeemed, and they
    /// redeem pro-rata against the remaining collateral.
    ///
    /// # Returns
    /// Raw base units paid to the caller.
    ///
    /// # Errors
    /// - `FxError::Unauthorized` without the `Market` capability.
    /// - `FxError::UnderCollateral` for an xToken redemption at or below 1.0,
    ///   or one that would leave the ratio at or below 1.0.
    /// - `FxError::InsufficientBalance` if `owner` holds too few tokens.
    pub fn redeem(
        &mut self,
        caller: &Principal,
        f_token_in: u128,
        x_token_in: u128,
        owner: &Principal,
    ) -> Result<u128, FxError> {
        self.acl.require(caller, Capability::Market)?;
        if f_token_in == 0 && x_token_in == 0 {
            return Ok(0);
        }
        let plan = self.plan_redeem(f_token_in, x_token_in)?;
        self.f_token.ledger().check_burn(owner, f_token_in)?;
        self.x_token.ledger().check_burn(owner, x_token_in)?;

        self.f_token.ledger_mut().burn(owner, f_token_in)?;
        self.x_token.ledger_mut().burn(owner, x_token_in)?;
        self.total_base_token -= plan.base_out;
        self.pay_out(plan.raw_out, plan.from_strategy);

        self.events.push(TreasuryEvent::Redeem {
            recipient: *caller,
            f_token_in,
            x_token_in,
            base_out: plan.base_out,
        });
        self.pull_from_strategy(plan.from_strategy);
        Ok(plan.raw_out)
    }

    fn plan_redeem(&self, f_token_in: u128, x_token_in: u128) -> Result<RedeemPlan, FxError> {
        self.require_operating()?;
        let price = self.current_base_token_price()?;
        let state = self.pool_state_at(price);
        if f_token_in > state.f_supply {
            return Err(FxError::InsufficientBalance {
                requested: f_token_in,
                available: state.f_supply,
            });
        }
        if x_token_in > state.x_supply {
            return Err(FxError::InsufficientBalance {
                requested: x_token_in,
                available: state.x_supply,
            });
        }

        let base_out = if state.is_under_collateral()? {
            if x_token_in > 0 {
                return Err(FxError::UnderCollateral);
            }
            fx_core::mul_div(state.base_supply, f_token_in, state.f_supply, Rounding::Down)?
        } else {
            let f_value = state.f_nav.mul_amount(f_token_in, Rounding::Down)?;
            let x_value = state.x_nav()?.mul_amount(x_token_in, Rounding::Down)?;
            let value = f_value.checked_add(x_value).ok_or(FxError::MathOverflow)?;
            price.div_amount(value, Rounding::Down)?
        };

        let base_after = state
            .base_supply
            .checked_sub(base_out)
            .ok_or(FxError::InsufficientCollateral {
                requested: base_out,
                available: state.base_supply,
            })?;
        if x_token_in > 0 {
            let after = PoolState {
                base_supply: base_after,
                f_supply: state.f_supply - f_token_in,
                x_supply: state.x_supply - x_token_in,
                ..state
            };
            if after.f_supply > 0 && after.collateral_ratio()? <= Wad::ONE {
                return Err(FxError::UnderCollateral);
            }
        }

        let raw_out = self.base_to_raw(base_out)?;
        let (raw_out, from_strategy) = self.plan_payout(raw_out)?;
        tracing::debug!(f_token_in, x_token_in, base_out, raw_out, "redeem planned");
        Ok(RedeemPlan {
            base_out,
            raw_out,
            from_strategy,
        })
    }

    /// Split a raw payout between the treasury's own balance and the strategy.
    fn plan_payout(&self, raw: u128) -> Result<(u128, u128), FxError> {
        let held = self
            .base_balance
            .checked_add(self.strategy_held())
            .ok_or(FxError::MathOverflow)?;
        if raw > held {
            return Err(FxError::InsufficientCollateral {
                requested: raw,
                available: held,
            });
        }
        Ok((raw, raw.saturating_sub(self.base_balance)))
    }

    fn pay_out(&mut self, raw: u128, from_strategy: u128) {
        self.base_balance -= raw - from_strategy;
        self.strategy_underlying -= from_strategy;
    }

    fn pull_from_strategy(&self, amount: u128) {
        if amount == 0 {
            return;
        }
        if let Some(strategy) = &self.strategy {
            tracing::info!(amount, strategy = %strategy.address, "pulled collateral from strategy");
            strategy.handle.withdraw_to_treasury(amount);
        }
    }

    // ---------------------------------------------------------------
    // Harvest and settle
    // ---------------------------------------------------------------

    /// Distribute accrued yield: a bounty to the caller, a share to the
    /// rebalance pool splitter, and the remainder to the platform.
    ///
    /// `total_base_token` is unchanged: harvestable yield was never part of it.
    /// Returns the split in base units (all zero if nothing is harvestable).
    pub fn harvest(&mut self, caller: &Principal) -> Result<HarvestSplit, FxError> {
        self.require_operating()?;
        let total = self.harvestable()?;
        if total == 0 {
            return Ok(HarvestSplit::default());
        }
        let split = split_harvest(total, &self.harvest_ratios)?;
        let bounty_raw = self.base_to_raw(split.bounty)?;
        let pool_raw = self.base_to_raw(split.rebalance_pool)?;
        let platform_raw = self.base_to_raw(split.platform)?;
        let raw_total = bounty_raw
            .checked_add(pool_raw)
            .and_then(|sum| sum.checked_add(platform_raw))
            .ok_or(FxError::MathOverflow)?;
        let (raw_total, from_strategy) = self.plan_payout(raw_total)?;

        self.pay_out(raw_total, from_strategy);
        self.events.push(TreasuryEvent::Harvest {
            caller: *caller,
            total: split.total,
            platform_amount: split.platform,
            bounty_amount: split.bounty,
            rebalance_pool_amount: split.rebalance_pool,
        });
        tracing::info!(
            caller = %caller,
            platform = %self.platform,
            total = split.total,
            "harvested yield"
        );

        self.pull_from_strategy(from_strategy);
        if pool_raw > 0 {
            self.rebalance_pool_splitter
                .handle
                .receive(self.base_token, pool_raw);
        }
        Ok(split)
    }

    /// Snapshot the oracle price as the new reference price and sample the
    /// leverage ratio into the EMA tracker.
    ///
    /// This is the only operation that changes the reference price. How often
    /// it runs is left to the whitelisted settlers.
    pub fn settle(&mut self, caller: &Principal, now: u64) -> Result<(), FxError> {
        self.acl.require(caller, Capability::SettleWhitelist)?;
        self.require_operating()?;
        let price = self.current_base_token_price()?;
        let leverage = self.pool_state_at(price).leverage_ratio()?;
        let mut ema_leverage = self.ema_leverage;
        ema_leverage.update(leverage, now)?;

        let old_price = self.reference_base_token_price;
        self.ema_leverage = ema_leverage;
        self.reference_base_token_price = price;
        self.events.push(TreasuryEvent::Settle {
            old_price,
            new_price: price,
        });
        tracing::info!(
            old_price = %old_price,
            new_price = %price,
            leverage = %leverage,
            ema = %ema_leverage.last_ema_value,
            "settled"
        );
        Ok(())
    }

    // ---------------------------------------------------------------
    // Strategy
    // ---------------------------------------------------------------

    fn require_strategy(&self, caller: &Principal) -> Result<Collaborator<dyn Strategy>, FxError> {
        match &self.strategy {
            Some(strategy) if strategy.address == *caller => Ok(strategy.clone()),
            _ => Err(FxError::OnlyStrategy { caller: *caller }),
        }
    }

    /// Hand `amount` raw units to the strategy. Callable only by the strategy.
    pub fn transfer_to_strategy(&mut self, caller: &Principal, amount: u128) -> Result<(), FxError> {
        let strategy = self.require_strategy(caller)?;
        self.require_operating()?;
        if amount > self.base_balance {
            return Err(FxError::InsufficientCollateral {
                requested: amount,
                available: self.base_balance,
            });
        }
        let strategy_underlying = self
            .strategy_underlying
            .checked_add(amount)
            .ok_or(FxError::MathOverflow)?;

        self.base_balance -= amount;
        self.strategy_underlying = strategy_underlying;
        self.events.push(TreasuryEvent::TransferToStrategy { amount });
        strategy.handle.on_transfer(amount);
        Ok(())
    }

    /// Record `amount` raw units of profit earned by the strategy. The profit
    /// becomes harvestable. Callable only by the strategy.
    pub fn notify_strategy_profit(
        &mut self,
        caller: &Principal,
        amount: u128,
    ) -> Result<(), FxError> {
        let strategy = self.require_strategy(caller)?;
        self.require_operating()?;
        self.strategy_underlying = self
            .strategy_underlying
            .checked_add(amount)
            .ok_or(FxError::MathOverflow)?;
        self.events.push(TreasuryEvent::NotifyStrategyProfit { amount });
        strategy.handle.on_profit_notify(amount);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Configuration (Admin)
    // ---------------------------------------------------------------

    /// Replace (or clear) the strategy. Everything the outgoing strategy
    /// holds is recalled to the treasury balance first, so the new strategy
    /// starts from zero.
    pub fn update_strategy(
        &mut self,
        caller: &Principal,
        strategy: Option<Collaborator<dyn Strategy>>,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let recalled = self.strategy_held();
        let base_balance = self
            .base_balance
            .checked_add(recalled)
            .ok_or(FxError::MathOverflow)?;

        let old = address_of(&self.strategy);
        let new = address_of(&strategy);
        let outgoing = std::mem::replace(&mut self.strategy, strategy);
        self.base_balance = base_balance;
        self.strategy_underlying = 0;
        self.events.push(TreasuryEvent::UpdateStrategy { old, new });

        if let Some(outgoing) = outgoing.filter(|_| recalled > 0) {
            tracing::info!(amount = recalled, strategy = %outgoing.address, "recalled collateral from strategy");
            outgoing.handle.withdraw_to_treasury(recalled);
        }
        Ok(())
    }

    pub fn update_price_oracle(
        &mut self,
        caller: &Principal,
        price_oracle: Collaborator<dyn PriceOracle>,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let old = self.price_oracle.address;
        let new = price_oracle.address;
        self.price_oracle = price_oracle;
        self.events.push(TreasuryEvent::UpdatePriceOracle { old, new });
        Ok(())
    }

    pub fn update_base_token_cap(&mut self, caller: &Principal, cap: u128) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let old = self.base_token_cap;
        self.base_token_cap = cap;
        self.events.push(TreasuryEvent::UpdateBaseTokenCap { old, new: cap });
        Ok(())
    }

    /// # Errors
    /// Returns `FxError::EmaSampleIntervalTooSmall` below the protocol floor.
    pub fn update_ema_sample_interval(
        &mut self,
        caller: &Principal,
        sample_interval: u64,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let old = self.ema_leverage.sample_interval;
        self.ema_leverage.set_sample_interval(sample_interval)?;
        self.events.push(TreasuryEvent::UpdateEmaSampleInterval {
            old,
            new: sample_interval,
        });
        Ok(())
    }

    pub fn update_platform(&mut self, caller: &Principal, platform: Principal) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let new = platform.non_zero()?;
        let old = self.platform;
        self.platform = new;
        self.events.push(TreasuryEvent::UpdatePlatform { old, new });
        Ok(())
    }

    pub fn update_rebalance_pool_splitter(
        &mut self,
        caller: &Principal,
        splitter: Collaborator<dyn RebalancePoolSplitter>,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let old = self.rebalance_pool_splitter.address;
        let new = splitter.address;
        self.rebalance_pool_splitter = splitter;
        self.events
            .push(TreasuryEvent::UpdateRebalancePoolSplitter { old, new });
        Ok(())
    }

    /// # Errors
    /// Returns `FxError::RebalancePoolRatioTooLarge` if the ratio plus the
    /// harvester ratio would exceed 100%.
    pub fn update_rebalance_pool_ratio(
        &mut self,
        caller: &Principal,
        ratio: FeeRatio,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let ratios = self.harvest_ratios.with_rebalance_pool(ratio)?;
        let old = self.harvest_ratios.rebalance_pool();
        self.harvest_ratios = ratios;
        self.events
            .push(TreasuryEvent::UpdateRebalancePoolRatio { old, new: ratio });
        Ok(())
    }

    /// # Errors
    /// Returns `FxError::HarvesterRatioTooLarge` above 10% or if the ratio
    /// plus the rebalance-pool ratio would exceed 100%.
    pub fn update_harvester_ratio(
        &mut self,
        caller: &Principal,
        ratio: FeeRatio,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let ratios = self.harvest_ratios.with_harvester(ratio)?;
        let old = self.harvest_ratios.harvester();
        self.harvest_ratios = ratios;
        self.events
            .push(TreasuryEvent::UpdateHarvesterRatio { old, new: ratio });
        Ok(())
    }

    pub fn update_rate_provider(
        &mut self,
        caller: &Principal,
        rate_provider: Option<Collaborator<dyn RateProvider>>,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let old = address_of(&self.rate_provider);
        let new = address_of(&rate_provider);
        self.rate_provider = rate_provider;
        self.events.push(TreasuryEvent::UpdateRateProvider { old, new });
        Ok(())
    }
}

fn address_of<T: ?Sized>(collaborator: &Option<Collaborator<T>>) -> Principal {
    collaborator
        .as_ref()
        .map(|c| c.address)
        .unwrap_or(Principal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use fx_core::{PriceQuote, PRECISION};

    const ONE: u128 = PRECISION;

    struct TestOracle {
        price: Mutex<Wad>,
        valid: AtomicBool,
    }

    impl TestOracle {
        fn new(price: u128) -> Arc<Self> {
            Arc::new(Self {
                price: Mutex::new(Wad::from_int(price)),
                valid: AtomicBool::new(true),
            })
        }

        fn set(&self, price: Wad) {
            *self.price.lock().unwrap() = price;
        }
    }

    impl PriceOracle for TestOracle {
        fn get_price(&self) -> PriceQuote {
            PriceQuote {
                price: *self.price.lock().unwrap(),
                is_valid: self.valid.load(Ordering::SeqCst),
            }
        }
    }

    #[derive(Default)]
    struct TestSplitter {
        received: Mutex<Vec<(Principal, u128)>>,
    }

    impl RebalancePoolSplitter for TestSplitter {
        fn receive(&self, token: Principal, amount: u128) {
            self.received.lock().unwrap().push((token, amount));
        }
    }

    #[derive(Default)]
    struct TestStrategy {
        transferred: Mutex<u128>,
        withdrawn: Mutex<u128>,
    }

    impl Strategy for TestStrategy {
        fn on_transfer(&self, amount: u128) {
            *self.transferred.lock().unwrap() += amount;
        }

        fn on_profit_notify(&self, _amount: u128) {}

        fn withdraw_to_treasury(&self, amount: u128) {
            *self.withdrawn.lock().unwrap() += amount;
        }
    }

    struct FixedRate(Wad);

    impl RateProvider for FixedRate {
        fn get_rate(&self) -> Wad {
            self.0
        }
    }

    fn admin() -> Principal {
        Principal::from_byte(0x01)
    }

    fn market() -> Principal {
        Principal::from_byte(0x02)
    }

    fn user() -> Principal {
        Principal::from_byte(0x03)
    }

    fn strategy_addr() -> Principal {
        Principal::from_byte(0x04)
    }

    fn base() -> Principal {
        Principal::from_byte(0xba)
    }

    struct Fixture {
        treasury: Treasury,
        oracle: Arc<TestOracle>,
        splitter: Arc<TestSplitter>,
    }

    fn fixture(price: u128) -> Fixture {
        let oracle = TestOracle::new(price);
        let splitter = Arc::new(TestSplitter::default());
        let oracle_handle: Arc<dyn PriceOracle> = oracle.clone();
        let splitter_handle: Arc<dyn RebalancePoolSplitter> = splitter.clone();
        let params = TreasuryParams {
            base_token: base(),
            price_oracle: Collaborator::new(Principal::from_byte(0x0a), oracle_handle).unwrap(),
            rate_provider: None,
            rebalance_pool_splitter: Collaborator::new(Principal::from_byte(0x0b), splitter_handle)
                .unwrap(),
            platform: Principal::from_byte(0x0c),
            base_token_cap: 100 * ONE,
            ema_sample_interval: 3600,
            harvester_ratio: FeeRatio::from_percent(10),
            rebalance_pool_ratio: FeeRatio::from_percent(50),
        };
        let mut treasury = Treasury::new(params, AccessControl::new(admin()).unwrap()).unwrap();
        for cap in [
            Capability::Admin,
            Capability::ProtocolInitializer,
            Capability::SettleWhitelist,
        ] {
            treasury.grant(&admin(), admin(), cap).unwrap();
        }
        treasury.grant(&admin(), market(), Capability::Market).unwrap();
        Fixture {
            treasury,
            oracle,
            splitter,
        }
    }

    /// Genesis at 2000 with 1 base: 1000 fToken + 1000 xToken to `user`.
    fn initialized(price: u128) -> Fixture {
        let mut fx = fixture(price);
        fx.treasury.deposit_base(ONE).unwrap();
        fx.treasury
            .initialize_protocol(&admin(), ONE, user(), 1_000)
            .unwrap();
        fx
    }

    #[test]
    fn test_initialize_splits_value_in_half() {
        let fx = initialized(2000);
        let t = &fx.treasury;
        assert_eq!(t.state(), TreasuryState::Operating);
        assert_eq!(t.f_token().balance_of(&user()), 1000 * ONE);
        assert_eq!(t.x_token().balance_of(&user()), 1000 * ONE);
        assert_eq!(t.total_base_token(), ONE);
        assert_eq!(t.reference_base_token_price(), Wad::from_int(2000));
        assert_eq!(t.ema_leverage().last_ema_value, Wad::from_int(2));
        assert_eq!(
            t.events()[0],
            TreasuryEvent::Settle {
                old_price: Wad::ZERO,
                new_price: Wad::from_int(2000)
            }
        );
    }

    #[test]
    fn test_initialize_only_once() {
        let mut fx = initialized(2000);
        fx.treasury.deposit_base(ONE).unwrap();
        assert_eq!(
            fx.treasury.initialize_protocol(&admin(), ONE, user(), 2_000),
            Err(FxError::ProtocolInitialized)
        );
    }

    #[test]
    fn test_initialize_requires_deposit() {
        let mut fx = fixture(2000);
        fx.treasury.deposit_base(ONE / 2).unwrap();
        assert_eq!(
            fx.treasury.initialize_protocol(&admin(), ONE, user(), 1_000),
            Err(FxError::InsufficientInitialBaseToken {
                required: ONE,
                available: ONE / 2
            })
        );
        assert_eq!(fx.treasury.state(), TreasuryState::Uninitialized);
    }

    #[test]
    fn test_initialize_requires_role() {
        let mut fx = fixture(2000);
        fx.treasury.deposit_base(ONE).unwrap();
        let err = fx
            .treasury
            .initialize_protocol(&user(), ONE, user(), 1_000)
            .unwrap_err();
        assert!(matches!(err, FxError::Unauthorized { .. }));
    }

    #[test]
    fn test_operations_rejected_before_initialization() {
        let mut fx = fixture(2000);
        assert_eq!(
            fx.treasury.mint_f_token(&market(), ONE, user()),
            Err(FxError::ProtocolNotInitialized)
        );
        assert_eq!(
            fx.treasury.settle(&admin(), 5_000),
            Err(FxError::ProtocolNotInitialized)
        );
        assert_eq!(fx.treasury.harvest(&user()), Err(FxError::ProtocolNotInitialized));
    }

    #[test]
    fn test_mint_f_token_at_higher_price() {
        let mut fx = initialized(2000);
        fx.oracle.set(Wad::from_int(2001));
        let out = fx.treasury.mint_f_token(&market(), ONE, user()).unwrap();
        assert_eq!(out, 2001 * ONE);
        assert_eq!(fx.treasury.total_base_token(), 2 * ONE);
        assert_eq!(fx.treasury.base_balance(), 2 * ONE);
    }

    #[test]
    fn test_mint_x_token_uses_pre_mint_nav() {
        let mut fx = initialized(2000);
        fx.oracle.set(Wad::from_int(2500));
        // xNav = (2500 - 1000) / 1000 = 1.5
        let out = fx.treasury.mint_x_token(&market(), ONE * 3 / 1000, user()).unwrap();
        assert_eq!(out, 5 * ONE);
    }

    #[test]
    fn test_mint_requires_market_role() {
        let mut fx = initialized(2000);
        let err = fx.treasury.mint_f_token(&user(), ONE, user()).unwrap_err();
        assert_eq!(
            err,
            FxError::Unauthorized {
                principal: user(),
                capability: Capability::Market
            }
        );
    }

    #[test]
    fn test_mint_exceeding_cap_leaves_state_unchanged() {
        let mut fx = initialized(2000);
        fx.treasury.update_base_token_cap(&admin(), 2 * ONE).unwrap();
        let err = fx
            .treasury
            .mint_f_token(&market(), ONE + 1, user())
            .unwrap_err();
        assert_eq!(
            err,
            FxError::ExceedTotalCap {
                attempted: 2 * ONE + 1,
                cap: 2 * ONE
            }
        );
        assert_eq!(fx.treasury.total_base_token(), ONE);
        assert_eq!(fx.treasury.f_token().total_supply(), 1000 * ONE);
        assert!(fx.treasury.mint_f_token(&market(), ONE, user()).is_ok());
    }

    #[test]
    fn test_invalid_oracle_blocks_mint() {
        let mut fx = initialized(2000);
        fx.oracle.valid.store(false, Ordering::SeqCst);
        assert_eq!(
            fx.treasury.mint_x_token(&market(), ONE, user()),
            Err(FxError::InvalidOraclePrice)
        );
    }

    #[test]
    fn test_zero_amounts_are_noops() {
        let mut fx = initialized(2000);
        assert_eq!(fx.treasury.mint_f_token(&market(), 0, user()).unwrap(), 0);
        assert_eq!(fx.treasury.redeem(&market(), 0, 0, &user()).unwrap(), 0);
        assert_eq!(fx.treasury.total_base_token(), ONE);
    }

    #[test]
    fn test_under_collateral_allows_only_f_token_redeem() {
        let mut fx = initialized(2000);
        fx.oracle.set(Wad::from_int(999));
        assert!(fx.treasury.collateral_ratio().unwrap() < Wad::ONE);

        assert_eq!(
            fx.treasury.redeem(&market(), ONE, ONE, &user()),
            Err(FxError::UnderCollateral)
        );
        assert_eq!(
            fx.treasury.mint_f_token(&market(), ONE, user()),
            Err(FxError::UnderCollateral)
        );
        assert_eq!(
            fx.treasury.mint_x_token(&market(), ONE, user()),
            Err(FxError::UnderCollateral)
        );

        let out = fx.treasury.redeem(&market(), ONE, 0, &user()).unwrap();
        assert_eq!(out, ONE / 1000);
        assert_eq!(fx.treasury.total_base_token(), ONE - ONE / 1000);
    }

    #[test]
    fn test_redeem_all_x_token_rejected_while_f_outstanding() {
        let mut fx = initialized(2000);
        assert_eq!(
            fx.treasury.redeem(&market(), 0, 1000 * ONE, &user()),
            Err(FxError::UnderCollateral)
        );
        let out = fx.treasury.redeem(&market(), 0, 500 * ONE, &user()).unwrap();
        assert_eq!(out, ONE / 4);
    }

    #[test]
    fn test_redeem_checks_owner_balance() {
        let mut fx = initialized(2000);
        let err = fx
            .treasury
            .redeem(&market(), ONE, 0, &Principal::from_byte(0x99))
            .unwrap_err();
        assert_eq!(
            err,
            FxError::InsufficientBalance {
                requested: ONE,
                available: 0
            }
        );
        assert_eq!(fx.treasury.total_base_token(), ONE);
    }

    #[test]
    fn test_harvest_split() {
        let mut fx = initialized(2000);
        fx.treasury.deposit_base(ONE).unwrap();
        assert_eq!(fx.treasury.harvestable().unwrap(), ONE);

        let split = fx.treasury.harvest(&user()).unwrap();
        assert_eq!(split.bounty, ONE / 10);
        assert_eq!(split.rebalance_pool, ONE / 2);
        assert_eq!(split.platform, ONE * 4 / 10);
        assert_eq!(fx.treasury.total_base_token(), ONE);
        assert_eq!(fx.treasury.base_balance(), ONE);
        assert_eq!(fx.treasury.harvestable().unwrap(), 0);
        assert_eq!(
            *fx.splitter.received.lock().unwrap(),
            vec![(base(), ONE / 2)]
        );
    }

    #[test]
    fn test_harvest_with_nothing_accrued() {
        let mut fx = initialized(2000);
        assert_eq!(fx.treasury.harvest(&user()).unwrap(), HarvestSplit::default());
        assert!(fx.splitter.received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_settle_updates_reference_and_ema() {
        let mut fx = initialized(2000);
        fx.oracle.set(Wad::from_int(3000));
        fx.treasury.settle(&admin(), 1_000 + 3600).unwrap();
        assert_eq!(fx.treasury.reference_base_token_price(), Wad::from_int(3000));
        // leverage = 3000 / (3000 - 1000)
        assert_eq!(fx.treasury.ema_leverage().last_value, Wad::from_ratio(3, 2));
        assert_eq!(fx.treasury.ema_leverage().last_ema_value, Wad::from_ratio(3, 2));
        assert_eq!(fx.treasury.f_nav(), Wad::ONE);
    }

    #[test]
    fn test_settle_requires_whitelist() {
        let mut fx = initialized(2000);
        assert!(matches!(
            fx.treasury.settle(&user(), 5_000),
            Err(FxError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_strategy_transfer_and_profit() {
        let mut fx = initialized(2000);
        let strategy = Arc::new(TestStrategy::default());
        let handle: Arc<dyn Strategy> = strategy.clone();
        fx.treasury
            .update_strategy(&admin(), Some(Collaborator::new(strategy_addr(), handle).unwrap()))
            .unwrap();

        assert_eq!(
            fx.treasury.transfer_to_strategy(&user(), ONE / 2),
            Err(FxError::OnlyStrategy { caller: user() })
        );
        fx.treasury
            .transfer_to_strategy(&strategy_addr(), ONE * 3 / 4)
            .unwrap();
        assert_eq!(fx.treasury.base_balance(), ONE / 4);
        assert_eq!(fx.treasury.strategy_underlying(), ONE * 3 / 4);
        assert_eq!(*strategy.transferred.lock().unwrap(), ONE * 3 / 4);
        assert_eq!(fx.treasury.harvestable().unwrap(), 0);

        fx.treasury
            .notify_strategy_profit(&strategy_addr(), ONE / 10)
            .unwrap();
        assert_eq!(fx.treasury.harvestable().unwrap(), ONE / 10);

        // Redeem 0.5 base worth of fToken: 0.25 from balance, 0.25 from the strategy.
        let out = fx.treasury.redeem(&market(), 1000 * ONE, 0, &user()).unwrap();
        assert_eq!(out, ONE / 2);
        assert_eq!(fx.treasury.base_balance(), 0);
        assert_eq!(fx.treasury.strategy_underlying(), ONE * 3 / 4 + ONE / 10 - ONE / 4);
        assert_eq!(*strategy.withdrawn.lock().unwrap(), ONE / 4);
    }

    #[test]
    fn test_clearing_strategy_recalls_collateral() {
        let mut fx = initialized(2000);
        let strategy = Arc::new(TestStrategy::default());
        let handle: Arc<dyn Strategy> = strategy.clone();
        fx.treasury
            .update_strategy(&admin(), Some(Collaborator::new(strategy_addr(), handle).unwrap()))
            .unwrap();
        fx.treasury
            .transfer_to_strategy(&strategy_addr(), ONE * 3 / 4)
            .unwrap();

        fx.treasury.update_strategy(&admin(), None).unwrap();
        assert_eq!(fx.treasury.base_balance(), ONE);
        assert_eq!(fx.treasury.strategy_underlying(), 0);
        assert_eq!(*strategy.withdrawn.lock().unwrap(), ONE * 3 / 4);
        assert_eq!(fx.treasury.harvestable().unwrap(), 0);

        // 1000 fToken is owed 0.5 base, more than was left on hand before the recall.
        let out = fx.treasury.redeem(&market(), 1000 * ONE, 0, &user()).unwrap();
        assert_eq!(out, ONE / 2);
        assert_eq!(fx.treasury.base_balance(), ONE / 2);
    }

    #[test]
    fn test_replacing_strategy_starts_from_zero() {
        let mut fx = initialized(2000);
        let first = Arc::new(TestStrategy::default());
        let handle: Arc<dyn Strategy> = first.clone();
        fx.treasury
            .update_strategy(&admin(), Some(Collaborator::new(strategy_addr(), handle).unwrap()))
            .unwrap();
        fx.treasury
            .transfer_to_strategy(&strategy_addr(), ONE * 3 / 4)
            .unwrap();
        fx.treasury
            .notify_strategy_profit(&strategy_addr(), ONE / 10)
            .unwrap();

        let second = Arc::new(TestStrategy::default());
        let handle: Arc<dyn Strategy> = second.clone();
        fx.treasury
            .update_strategy(
                &admin(),
                Some(Collaborator::new(Principal::from_byte(0x05), handle).unwrap()),
            )
            .unwrap();
        assert_eq!(*first.withdrawn.lock().unwrap(), ONE * 3 / 4 + ONE / 10);
        assert_eq!(*second.withdrawn.lock().unwrap(), 0);
        assert_eq!(fx.treasury.strategy_underlying(), 0);
        assert_eq!(fx.treasury.base_balance(), ONE + ONE / 10);
        assert_eq!(fx.treasury.harvestable().unwrap(), ONE / 10);
        assert!(matches!(
            fx.treasury.events().last(),
            Some(TreasuryEvent::UpdateStrategy { .. })
        ));
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        let mut fx = fixture(2000);
        let rate: Arc<dyn RateProvider> = Arc::new(FixedRate(Wad::ZERO));
        fx.treasury
            .update_rate_provider(
                &admin(),
                Some(Collaborator::new(Principal::from_byte(0x0d), rate).unwrap()),
            )
            .unwrap();
        fx.treasury.deposit_base(ONE).unwrap();
        assert_eq!(fx.treasury.raw_to_base(ONE), Err(FxError::InvalidRate));
        assert_eq!(fx.treasury.base_to_raw(ONE), Err(FxError::InvalidRate));
        assert_eq!(
            fx.treasury.initialize_protocol(&admin(), ONE, user(), 1_000),
            Err(FxError::InvalidRate)
        );
        assert_eq!(fx.treasury.state(), TreasuryState::Uninitialized);
    }

    #[test]
    fn test_wrapped_collateral_uses_rate() {
        let mut fx = fixture(2000);
        let rate: Arc<dyn RateProvider> = Arc::new(FixedRate(Wad::from_int(2)));
        fx.treasury
            .update_rate_provider(
                &admin(),
                Some(Collaborator::new(Principal::from_byte(0x0d), rate).unwrap()),
            )
            .unwrap();
        fx.treasury.deposit_base(ONE / 2).unwrap();
        let (f_out, _) = fx
            .treasury
            .initialize_protocol(&admin(), ONE / 2, user(), 1_000)
            .unwrap();
        // 0.5 raw at rate 2.0 is 1 base unit.
        assert_eq!(fx.treasury.total_base_token(), ONE);
        assert_eq!(f_out, 1000 * ONE);

        let out = fx.treasury.redeem(&market(), 1000 * ONE, 0, &user()).unwrap();
        assert_eq!(out, ONE / 4);
    }

    #[test]
    fn test_config_setters_validate_and_emit() {
        let mut fx = fixture(2000);
        assert!(matches!(
            fx.treasury.update_harvester_ratio(&admin(), FeeRatio::from_percent(11)),
            Err(FxError::HarvesterRatioTooLarge { .. })
        ));
        assert!(matches!(
            fx.treasury.update_rebalance_pool_ratio(&admin(), FeeRatio::from_percent(91)),
            Err(FxError::RebalancePoolRatioTooLarge { .. })
        ));
        assert!(matches!(
            fx.treasury.update_ema_sample_interval(&admin(), 30),
            Err(FxError::EmaSampleIntervalTooSmall { .. })
        ));
        assert_eq!(
            fx.treasury.update_platform(&admin(), Principal::ZERO),
            Err(FxError::ZeroAddress)
        );
        assert!(fx.treasury.events().is_empty());

        fx.treasury.update_ema_sample_interval(&admin(), 120).unwrap();
        fx.treasury
            .update_harvester_ratio(&admin(), FeeRatio::from_percent(5))
            .unwrap();
        assert_eq!(
            fx.treasury.take_events(),
            vec![
                TreasuryEvent::UpdateEmaSampleInterval { old: 3600, new: 120 },
                TreasuryEvent::UpdateHarvesterRatio {
                    old: FeeRatio::from_percent(10),
                    new: FeeRatio::from_percent(5)
                },
            ]
        );
    }

    #[test]
    fn test_config_setters_require_admin() {
        let mut fx = fixture(2000);
        assert!(matches!(
            fx.treasury.update_base_token_cap(&user(), 1),
            Err(FxError::Unauthorized { .. })
        ));
        assert_eq!(fx.treasury.base_token_cap(), 100 * ONE);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_mint_then_redeem_never_creates_collateral(
                price in 1_200u128..5_000,
                raw_in in 1u128..(10 * ONE),
            ) {
                let mut fx = initialized(2000);
                fx.oracle.set(Wad::from_int(price));
                let f_out = fx.treasury.mint_f_token(&market(), raw_in, user()).unwrap();
                prop_assert_eq!(fx.treasury.total_base_token(), ONE + raw_in);

                let raw_out = fx.treasury.redeem(&market(), f_out, 0, &user()).unwrap();
                prop_assert!(raw_out <= raw_in);
                prop_assert_eq!(fx.treasury.total_base_token(), fx.treasury.base_balance());
                prop_assert!(fx.treasury.collateral_ratio().unwrap() > Wad::ONE);
            }
        }
    }
}
