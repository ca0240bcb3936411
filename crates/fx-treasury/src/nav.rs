// crates/fx-treasury/src/nav.rs
//
// Net asset value, collateral ratio, leverage, and mint/redeem sizing.
//
// Everything here is a pure function of one `PoolState` snapshot:
//
//   base value  V = B * P                 (collateral value)
//   f value     L = F * fNav              (senior liability)
//   xNav          = (V - L) / X           (residual, floored at zero)
//   CR            = V / L
//   leverage      = V / (V - L)
//
// Values are kept in 18-decimal reference units. Liabilities round up and
// assets round down, so every derived figure errs in the protocol's favor.

use serde::{Deserialize, Serialize};

use fx_core::{mul_div, FxError, Rounding, Wad, PRECISION};

/// Leverage reported once the leveraged side has no equity left.
pub const MAX_LEVERAGE_RATIO: Wad = Wad::from_int(100);

/// Collateral ratio reported when no fractional supply is outstanding.
pub const UNBOUNDED_COLLATERAL_RATIO: Wad = Wad(PRECISION * PRECISION);

/// Snapshot of everything needed to price both tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    /// Collateral held and accounted for, in base units.
    pub base_supply: u128,
    /// Base token price.
    pub base_nav: Wad,
    pub f_supply: u128,
    pub f_nav: Wad,
    pub x_supply: u128,
}

/// Result of a mint sizing query: how much base may go in and what it buys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MintSizing {
    pub base_in: u128,
    pub token_out: u128,
}

/// Result of a redeem sizing query: how many tokens may come in and what they pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RedeemSizing {
    pub token_in: u128,
    pub base_out: u128,
}

impl PoolState {
    /// Total collateral value `B * P`.
    pub fn base_value(&self) -> Result<u128, FxError> {
        self.base_nav.mul_amount(self.base_supply, Rounding::Down)
    }

    /// Senior liability `F * fNav`.
    pub fn f_value(&self) -> Result<u128, FxError> {
        self.f_nav.mul_amount(self.f_supply, Rounding::Up)
    }

    /// Residual value claimed by the leveraged side, floored at zero.
    pub fn x_value(&self) -> Result<u128, FxError> {
        Ok(self.base_value()?.saturating_sub(self.f_value()?))
    }

    /// Leveraged NAV. 1.0 when no xToken is outstanding, zero when the pool is
    /// at or below full collateralization.
    pub fn x_nav(&self) -> Result<Wad, FxError> {
        if self.x_supply == 0 {
            return Ok(Wad::ONE);
        }
        let x_value = self.x_value()?;
        Ok(Wad(mul_div(x_value, PRECISION, self.x_supply, Rounding::Down)?))
    }

    /// `V / L`, with 1.0 for an empty pool and an effectively unbounded ratio
    /// when no fractional supply is outstanding.
    pub fn collateral_ratio(&self) -> Result<Wad, FxError> {
        if self.base_supply == 0 {
            return Ok(Wad::ONE);
        }
        if self.f_supply == 0 || self.f_nav.is_zero() {
            return Ok(UNBOUNDED_COLLATERAL_RATIO);
        }
        let ratio = mul_div(self.base_value()?, PRECISION, self.f_value()?, Rounding::Down)?;
        Ok(Wad(ratio))
    }

    /// True when collateral value no longer exceeds the fractional liability.
    pub fn is_under_collateral(&self) -> Result<bool, FxError> {
        if self.f_supply == 0 {
            return Ok(false);
        }
        Ok(self.base_value()? <= self.f_value()?)
    }

    /// `V / (V - L)`, capped at [`MAX_LEVERAGE_RATIO`].
    pub fn leverage_ratio(&self) -> Result<Wad, FxError> {
        if self.base_supply == 0 {
            return Ok(Wad::ONE);
        }
        let base_value = self.base_value()?;
        let x_value = self.x_value()?;
        if x_value == 0 {
            return Ok(MAX_LEVERAGE_RATIO);
        }
        let ratio = mul_div(base_value, PRECISION, x_value, Rounding::Down)?;
        Ok(Wad(ratio.min(MAX_LEVERAGE_RATIO.raw())))
    }

    /// Largest fToken mint that keeps the collateral ratio at or above `target`.
    ///
    /// Solves `(V + dV) / (L + dV) = target` for the added value `dV`.
    pub fn max_mintable_f_token(&self, target: Wad) -> Result<MintSizing, FxError> {
        check_target(target)?;
        let base_value = self.base_value()?;
        let required = target.mul_amount(self.f_value()?, Rounding::Up)?;
        if base_value <= required {
            return Ok(MintSizing::default());
        }
        let delta_value = mul_div(
            base_value - required,
            PRECISION,
            target.raw() - PRECISION,
            Rounding::Down,
        )?;
        let base_in = self.base_nav.div_amount(delta_value, Rounding::Down)?;
        let minted_value = self.base_nav.mul_amount(base_in, Rounding::Down)?;
        Ok(MintSizing {
            base_in,
            token_out: self.f_nav.div_amount(minted_value, Rounding::Down)?,
        })
    }

    /// Smallest xToken mint that lifts the collateral ratio to `target`
    /// (zero if it is already there).
    ///
    /// Solves `(V + dV) / L = target`.
    pub fn max_mintable_x_token(&self, target: Wad) -> Result<MintSizing, FxError> {
        check_target(target)?;
        let base_value = self.base_value()?;
        let required = target.mul_amount(self.f_value()?, Rounding::Up)?;
        if base_value >= required {
            return Ok(MintSizing::default());
        }
        let delta_value = required - base_value;
        let x_nav = self.x_nav()?;
        let token_out = if x_nav.is_zero() {
            0
        } else {
            x_nav.div_amount(delta_value, Rounding::Down)?
        };
        Ok(MintSizing {
            base_in: self.base_nav.div_amount(delta_value, Rounding::Up)?,
            token_out,
        })
    }

    /// Smallest fToken redemption that lifts the collateral ratio to `target`
    /// (zero if it is already there).
    ///
    /// Solves `(V - dV) / (L - dV) = target`.
    pub fn max_redeemable_f_token(&self, target: Wad) -> Result<RedeemSizing, FxError> {
        check_target(target)?;
        let base_value = self.base_value()?;
        let required = target.mul_amount(self.f_value()?, Rounding::Up)?;
        if base_value >= required {
            return Ok(RedeemSizing::default());
        }
        let delta_value = mul_div(
            required - base_value,
            PRECISION,
            target.raw() - PRECISION,
            Rounding::Up,
        )?;
        Ok(RedeemSizing {
            token_in: self.f_nav.div_amount(delta_value, Rounding::Up)?,
            base_out: self.base_nav.div_amount(delta_value, Rounding::Down)?,
        })
    }

    /// Largest xToken redemption that keeps the collateral ratio at or above `target`.
    ///
    /// Solves `(V - dV) / L = target`.
    pub fn max_redeemable_x_token(&self, target: Wad) -> Result<RedeemSizing, FxError> {
        check_target(target)?;
        let base_value = self.base_value()?;
        let required = target.mul_amount(self.f_value()?, Rounding::Up)?;
        if base_value <= required {
            return Ok(RedeemSizing::default());
        }
        let delta_value = base_value - required;
        let x_nav = self.x_nav()?;
        if x_nav.is_zero() {
            return Ok(RedeemSizing::default());
        }
        Ok(RedeemSizing {
            token_in: x_nav.div_amount(delta_value, Rounding::Down)?,
            base_out: self.base_nav.div_amount(delta_value, Rounding::Down)?,
        })
    }
}

fn check_target(target: Wad) -> Result<(), FxError> {
    if target <= Wad::ONE {
        return Err(FxError::InvalidTargetRatio {
            ratio: target.raw(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 base at 2000 split into 1000 fToken + 1000 xToken.
    fn genesis(price: u128) -> PoolState {
        PoolState {
            base_supply: PRECISION,
            base_nav: Wad::from_int(price),
            f_supply: 1000 * PRECISION,
            f_nav: Wad::ONE,
            x_supply: 1000 * PRECISION,
        }
    }

    #[test]
    fn test_genesis_navs() {
        let state = genesis(2000);
        assert_eq!(state.x_nav().unwrap(), Wad::ONE);
        assert_eq!(state.collateral_ratio().unwrap(), Wad::from_int(2));
        assert_eq!(state.leverage_ratio().unwrap(), Wad::from_int(2));
    }

    #[test]
    fn test_x_nav_absorbs_price_moves() {
        let state = genesis(2500);
        // (2500 - 1000) / 1000
        assert_eq!(state.x_nav().unwrap(), Wad::from_ratio(3, 2));
    }

    #[test]
    fn test_x_nav_clamped_at_zero() {
        let state = genesis(999);
        assert!(state.is_under_collateral().unwrap());
        assert_eq!(state.x_nav().unwrap(), Wad::ZERO);
        assert_eq!(state.leverage_ratio().unwrap(), MAX_LEVERAGE_RATIO);
        assert_eq!(state.collateral_ratio().unwrap(), Wad::from_ratio(999, 1000));
    }

    #[test]
    fn test_degenerate_supplies() {
        let empty = PoolState {
            base_supply: 0,
            base_nav: Wad::from_int(2000),
            f_supply: 0,
            f_nav: Wad::ONE,
            x_supply: 0,
        };
        assert_eq!(empty.collateral_ratio().unwrap(), Wad::ONE);
        assert_eq!(empty.x_nav().unwrap(), Wad::ONE);
        assert_eq!(empty.leverage_ratio().unwrap(), Wad::ONE);

        let no_f = PoolState {
            f_supply: 0,
            ..genesis(2000)
        };
        assert_eq!(no_f.collateral_ratio().unwrap(), UNBOUNDED_COLLATERAL_RATIO);
        assert!(!no_f.is_under_collateral().unwrap());
    }

    #[test]
    fn test_conservation_holds_at_any_price() {
        for price in [500u128, 999, 1000, 1001, 2000, 3333] {
            let state = genesis(price);
            let x_total = state.x_nav().unwrap().mul_amount(state.x_supply, Rounding::Down).unwrap();
            let lhs = state.base_value().unwrap();
            if state.is_under_collateral().unwrap() {
                assert_eq!(x_total, 0);
            } else {
                let rhs = state.f_value().unwrap() + x_total;
                assert!(lhs >= rhs && lhs - rhs <= 1000, "price {}", price);
            }
        }
    }

    #[test]
    fn test_max_mintable_f_token_lands_on_target() {
        let state = genesis(2000);
        let target = Wad::from_ratio(13, 10);
        let sizing = state.max_mintable_f_token(target).unwrap();
        // V = 2000, L = 1000: dV = (2000 - 1300) / 0.3 = 2333.33..
        assert!(sizing.base_in > 0);
        let after = PoolState {
            base_supply: state.base_supply + sizing.base_in,
            f_supply: state.f_supply + sizing.token_out,
            ..state
        };
        let cr = after.collateral_ratio().unwrap();
        assert!(cr >= target);
        assert!(cr.raw() - target.raw() < PRECISION / 1_000_000);
    }

    #[test]
    fn test_max_mintable_f_token_zero_below_target() {
        let state = genesis(1200);
        let sizing = state.max_mintable_f_token(Wad::from_ratio(13, 10)).unwrap();
        assert_eq!(sizing, MintSizing::default());
    }

    #[test]
    fn test_max_mintable_x_token_restores_target() {
        let state = genesis(1200);
        let target = Wad::from_ratio(13, 10);
        let sizing = state.max_mintable_x_token(target).unwrap();
        // dV = 1300 - 1200 = 100 at xNav 0.2
        let after = PoolState {
            base_supply: state.base_supply + sizing.base_in,
            x_supply: state.x_supply + sizing.token_out,
            ..state
        };
        assert!(after.collateral_ratio().unwrap() >= target);
        assert_eq!(sizing.token_out, 500 * PRECISION);
    }

    #[test]
    fn test_max_redeemable_f_token_restores_target() {
        let state = genesis(1200);
        let target = Wad::from_ratio(13, 10);
        let sizing = state.max_redeemable_f_token(target).unwrap();
        let after = PoolState {
            base_supply: state.base_supply - sizing.base_out,
            f_supply: state.f_supply - sizing.token_in,
            ..state
        };
        assert!(after.collateral_ratio().unwrap() >= target);
    }

    #[test]
    fn test_max_redeemable_x_token_lands_on_target() {
        let state = genesis(2000);
        let target = Wad::from_ratio(13, 10);
        let sizing = state.max_redeemable_x_token(target).unwrap();
        // dV = 2000 - 1300 = 700 at xNav 1.0
        assert_eq!(sizing.token_in, 700 * PRECISION);
        assert_eq!(sizing.base_out, PRECISION * 7 / 20);
        let after = PoolState {
            base_supply: state.base_supply - sizing.base_out,
            x_supply: state.x_supply - sizing.token_in,
            ..state
        };
        assert!(after.collateral_ratio().unwrap() >= target);
    }

    #[test]
    fn test_target_must_exceed_one() {
        let state = genesis(2000);
        assert_eq!(
            state.max_mintable_f_token(Wad::ONE),
            Err(FxError::InvalidTargetRatio { ratio: PRECISION })
        );
        assert!(state.max_redeemable_x_token(Wad::ZERO).is_err());
    }
}
