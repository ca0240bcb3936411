// crates/fx-market/src/fx_usd.rs
//
// fxUSD: one stable token backed by the fractional tokens of several markets.
//
// Each registered market is keyed by its base token. Wrapping mints fTokens in
// that market to the aggregator and credits the same amount of fxUSD to the
// recipient; unwrapping burns fxUSD and redeems the aggregator's fTokens for
// base. Each market carries a cap on the fTokens minted through it.

use std::collections::BTreeMap;

use fx_core::{AccessControl, Capability, EventLog, FxError, FxUsdEvent, Principal, TokenKind};
use fx_treasury::SupplyLedger;

use crate::market::Market;

struct MarketSlot {
    market: Market,
    mint_cap: u128,
    minted: u128,
}

pub struct FxUsd {
    address: Principal,
    acl: AccessControl,
    markets: BTreeMap<Principal, MarketSlot>,
    ledger: SupplyLedger,
    events: EventLog<FxUsdEvent>,
}

impl FxUsd {
    pub fn new(address: Principal, acl: AccessControl) -> Result<Self, FxError> {
        Ok(Self {
            address: address.non_zero()?,
            acl,
            markets: BTreeMap::new(),
            ledger: SupplyLedger::new(),
            events: EventLog::new(),
        })
    }

    pub fn address(&self) -> Principal {
        self.address
    }

    pub fn total_supply(&self) -> u128 {
        self.ledger.total_supply()
    }

    pub fn balance_of(&self, holder: &Principal) -> u128 {
        self.ledger.balance_of(holder)
    }

    pub fn base_tokens(&self) -> impl Iterator<Item = &Principal> {
        self.markets.keys()
    }

    pub fn market(&self, base_token: &Principal) -> Option<&Market> {
        self.markets.get(base_token).map(|slot| &slot.market)
    }

    pub fn market_mut(&mut self, base_token: &Principal) -> Option<&mut Market> {
        self.markets.get_mut(base_token).map(|slot| &mut slot.market)
    }

    pub fn mint_cap(&self, base_token: &Principal) -> Option<u128> {
        self.markets.get(base_token).map(|slot| slot.mint_cap)
    }

    /// fTokens currently minted through the market for `base_token`.
    pub fn minted(&self, base_token: &Principal) -> Option<u128> {
        self.markets.get(base_token).map(|slot| slot.minted)
    }

    pub fn events(&self) -> &[FxUsdEvent] {
        self.events.entries()
    }

    pub fn take_events(&mut self) -> Vec<FxUsdEvent> {
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

    /// Register `market` under its base token.
    ///
    /// The market should already route fToken flows to this aggregator
    /// (`Market::enable_fx_usd`) so that its fTokens cannot be minted around
    /// the cap.
    ///
    /// # Errors
    /// Returns `FxError::DuplicateMarket` if the base token is already registered.
    pub fn add_market(
        &mut self,
        caller: &Principal,
        market: Market,
        mint_cap: u128,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let base_token = market.base_token();
        if self.markets.contains_key(&base_token) {
            return Err(FxError::DuplicateMarket { base_token });
        }
        if market.fx_usd() != Some(self.address) {
            tracing::warn!(
                market = %market.address(),
                "registered market does not route fToken flows through this aggregator"
            );
        }
        self.markets.insert(
            base_token,
            MarketSlot {
                market,
                mint_cap,
                minted: 0,
            },
        );
        self.events.push(FxUsdEvent::AddMarket {
            base_token,
            mint_cap,
        });
        Ok(())
    }

    pub fn update_mint_cap(
        &mut self,
        caller: &Principal,
        base_token: Principal,
        mint_cap: u128,
    ) -> Result<(), FxError> {
        self.acl.require(caller, Capability::Admin)?;
        let slot = self
            .markets
            .get_mut(&base_token)
            .ok_or(FxError::UnknownMarket { base_token })?;
        let old = slot.mint_cap;
        slot.mint_cap = mint_cap;
        self.events.push(FxUsdEvent::UpdateMintCap {
            base_token,
            old,
            new: mint_cap,
        });
        Ok(())
    }

    /// Pay `raw_in` of `base_token` into its market and credit the minted
    /// fTokens to `recipient` as fxUSD.
    ///
    /// # Errors
    /// - `FxError::UnknownMarket` for an unregistered base token.
    /// - `FxError::ExceedMintCap` if the market's cap would be exceeded.
    /// - Any market mint error.
    pub fn wrap(
        &mut self,
        caller: &Principal,
        base_token: Principal,
        raw_in: u128,
        recipient: Principal,
        min_out: u128,
    ) -> Result<u128, FxError> {
        let recipient = recipient.non_zero()?;
        let slot = self
            .markets
            .get_mut(&base_token)
            .ok_or(FxError::UnknownMarket { base_token })?;
        let quote = slot.market.quote_mint(TokenKind::Fractional, raw_in)?;
        let attempted = slot
            .minted
            .checked_add(quote.token_out)
            .ok_or(FxError::MathOverflow)?;
        if attempted > slot.mint_cap {
            return Err(FxError::ExceedMintCap {
                attempted,
                cap: slot.mint_cap,
            });
        }
        if self.ledger.total_supply().checked_add(quote.token_out).is_none() {
            return Err(FxError::MathOverflow);
        }

        let minted = slot
            .market
            .mint_f_token(&self.address, raw_in, self.address, min_out)?;
        slot.minted += minted;
        self.ledger.mint(recipient, minted)?;
        self.events.push(FxUsdEvent::Wrap {
            base_token,
            owner: *caller,
            recipient,
            base_in: raw_in,
            minted,
        });
        Ok(minted)
    }

    /// Burn `amount` of the caller's fxUSD and redeem the same amount of
    /// fTokens in the `base_token` market, paying base to `recipient`.
    ///
    /// # Errors
    /// - `FxError::InsufficientBalance` if the caller holds too little fxUSD.
    /// - `FxError::UnknownMarket` for an unregistered base token.
    /// - Any market redeem error.
    pub fn unwrap(
        &mut self,
        caller: &Principal,
        base_token: Principal,
        amount: u128,
        recipient: Principal,
        min_out: u128,
    ) -> Result<u128, FxError> {
        let recipient = recipient.non_zero()?;
        self.ledger.check_burn(caller, amount)?;
        let slot = self
            .markets
            .get_mut(&base_token)
            .ok_or(FxError::UnknownMarket { base_token })?;

        let base_out = slot
            .market
            .redeem_f_token(&self.address, amount, recipient, min_out)?;
        slot.minted = slot.minted.saturating_sub(amount);
        self.ledger.burn(caller, amount)?;
        self.events.push(FxUsdEvent::Unwrap {
            base_token,
            owner: *caller,
            recipient,
            amount,
            base_out,
        });
        Ok(base_out)
    }
}
