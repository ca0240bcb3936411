// crates/fx-market/src/fee.rs
//
// Collateral-ratio-dependent fee curves.
//
// Each of the four flows (mint fToken, mint xToken, redeem fToken, redeem
// xToken) has a schedule of a default ratio and a signed delta. The curve maps
// a collateral ratio to a stress weight in [0, 1]:
//
//   stress(cr) = clamp((stability_ratio - cr) / window, 0, 1)
//
// and the fee ratio is `default + delta * stress`. Healthy pools pay the
// default. As the ratio falls through the window the fee slides toward
// `default + delta`: a positive delta discourages flows that add senior
// liability or remove junior equity, a negative delta rewards flows that
// recapitalize the pool. A zero window turns the slide into a step at the
// stability ratio.

use serde::{Deserialize, Serialize};

use fx_core::{mul_div, FeeRatio, FxError, Rounding, Wad, FEE_PRECISION, PRECISION};

/// Fee ratio schedule for one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    default: FeeRatio,
    delta: i64,
}

impl FeeSchedule {
    /// # Errors
    /// Returns `FxError::InvalidFeeRatio` unless both `default` and
    /// `default + delta` lie within [0, 100%].
    pub fn new(default: FeeRatio, delta: i64) -> Result<Self, FxError> {
        let low = default.raw() as i128;
        let high = low + delta as i128;
        let bound = 0..=FEE_PRECISION as i128;
        if !bound.contains(&low) || !bound.contains(&high) {
            return Err(FxError::InvalidFeeRatio {
                default: default.raw(),
                delta,
            });
        }
        Ok(Self { default, delta })
    }

    /// A schedule that ignores the collateral ratio.
    pub const fn flat(default: FeeRatio) -> Self {
        Self { default, delta: 0 }
    }

    pub fn default_ratio(&self) -> FeeRatio {
        self.default
    }

    pub fn delta(&self) -> i64 {
        self.delta
    }

    /// Ratio at a stress weight in [0, PRECISION].
    pub fn at_stress(&self, stress: u128) -> Result<FeeRatio, FxError> {
        let stress = stress.min(PRECISION) as i128;
        let shift = self.delta as i128 * stress / PRECISION as i128;
        let ratio = self.default.raw() as i128 + shift;
        u64::try_from(ratio)
            .map(FeeRatio)
            .map_err(|_| FxError::MathOverflow)
    }
}

/// Maps collateral ratios to stress weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCurve {
    stability_ratio: Wad,
    window: Wad,
}

impl FeeCurve {
    /// # Errors
    /// Returns `FxError::InvalidStabilityRatio` unless `stability_ratio` exceeds 1.0.
    pub fn new(stability_ratio: Wad, window: Wad) -> Result<Self, FxError> {
        check_stability_ratio(stability_ratio)?;
        Ok(Self {
            stability_ratio,
            window,
        })
    }

    pub fn stability_ratio(&self) -> Wad {
        self.stability_ratio
    }

    pub fn window(&self) -> Wad {
        self.window
    }

    /// Copy of this curve re-anchored at a new stability ratio.
    pub fn with_stability_ratio(&self, stability_ratio: Wad) -> Result<Self, FxError> {
        Self::new(stability_ratio, self.window)
    }

    /// Stress weight in [0, PRECISION] at `collateral_ratio`.
    pub fn stress(&self, collateral_ratio: Wad) -> Result<u128, FxError> {
        if collateral_ratio >= self.stability_ratio {
            return Ok(0);
        }
        let gap = self.stability_ratio.raw() - collateral_ratio.raw();
        if self.window.is_zero() || gap >= self.window.raw() {
            return Ok(PRECISION);
        }
        mul_div(gap, PRECISION, self.window.raw(), Rounding::Down)
    }

    /// Fee ratio `schedule` charges at `collateral_ratio`.
    pub fn ratio(&self, schedule: &FeeSchedule, collateral_ratio: Wad) -> Result<FeeRatio, FxError> {
        schedule.at_stress(self.stress(collateral_ratio)?)
    }

    /// The larger of the ratios at the pre-trade and post-trade collateral
    /// ratios, so a trade cannot dodge a fee by crossing the window.
    pub fn trade_ratio(
        &self,
        schedule: &FeeSchedule,
        before: Wad,
        after: Wad,
    ) -> Result<FeeRatio, FxError> {
        Ok(self
            .ratio(schedule, before)?
            .max(self.ratio(schedule, after)?))
    }
}

fn check_stability_ratio(ratio: Wad) -> Result<(), FxError> {
    if ratio <= Wad::ONE {
        return Err(FxError::InvalidStabilityRatio { ratio: ratio.raw() });
    }
    Ok(())
}
