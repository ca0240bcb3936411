// crates/fx-treasury/src/ema.rs
//
// Time-smoothed leverage ratio of the leveraged token.
//
// Each sample moves the smoothed value toward the new instantaneous value by
// a weight of min(elapsed, sample_interval) / sample_interval: a full interval
// (or more) since the last sample replaces the smoothed value outright, a
// shorter gap moves it proportionally less. Samples are only taken by the
// treasury's `settle`.

use serde::{Deserialize, Serialize};

use fx_core::{mul_div, FxError, Rounding, Wad};

/// Smallest accepted sample interval, in seconds.
pub const MIN_EMA_SAMPLE_INTERVAL: u64 = 60;

/// Smoothing state for the leverage ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmaLeverage {
    /// Timestamp (seconds) of the last sample.
    pub last_time: u64,
    /// Sampling interval in seconds.
    pub sample_interval: u64,
    /// Most recent instantaneous leverage ratio.
    pub last_value: Wad,
    /// Smoothed leverage ratio as of `last_time`.
    pub last_ema_value: Wad,
}

impl EmaLeverage {
    /// Unseeded tracker.
    ///
    /// # Errors
    /// Returns `FxError::EmaSampleIntervalTooSmall` below [`MIN_EMA_SAMPLE_INTERVAL`].
    pub fn new(sample_interval: u64) -> Result<Self, FxError> {
        check_interval(sample_interval)?;
        Ok(Self {
            last_time: 0,
            sample_interval,
            last_value: Wad::ZERO,
            last_ema_value: Wad::ZERO,
        })
    }

    /// Reset both the instantaneous and smoothed values to `value`.
    pub fn seed(&mut self, value: Wad, now: u64) {
        self.last_time = now;
        self.last_value = value;
        self.last_ema_value = value;
    }

    /// Record a new instantaneous sample. A sample at the same timestamp as
    /// the previous one is ignored. Returns whether the state changed.
    pub fn update(&mut self, value: Wad, now: u64) -> Result<bool, FxError> {
        if now <= self.last_time {
            return Ok(false);
        }
        let elapsed = now - self.last_time;
        let ema = smooth(self.last_ema_value, value, elapsed, self.sample_interval)?;
        self.last_value = value;
        self.last_ema_value = ema;
        self.last_time = now;
        Ok(true)
    }

    /// Smoothed value projected to `now`, assuming `last_value` has held since
    /// the last sample. Does not mutate state.
    pub fn ema_value(&self, now: u64) -> Result<Wad, FxError> {
        if now <= self.last_time {
            return Ok(self.last_ema_value);
        }
        smooth(
            self.last_ema_value,
            self.last_value,
            now - self.last_time,
            self.sample_interval,
        )
    }

    /// # Errors
    /// Returns `FxError::EmaSampleIntervalTooSmall` below [`MIN_EMA_SAMPLE_INTERVAL`].
    pub fn set_sample_interval(&mut self, sample_interval: u64) -> Result<(), FxError> {
        check_interval(sample_interval)?;
        self.sample_interval = sample_interval;
        Ok(())
    }
}

fn check_interval(sample_interval: u64) -> Result<(), FxError> {
    if sample_interval < MIN_EMA_SAMPLE_INTERVAL {
        return Err(FxError::EmaSampleIntervalTooSmall {
            interval: sample_interval,
            min: MIN_EMA_SAMPLE_INTERVAL,
        });
    }
    Ok(())
}

/// `previous + (target - previous) * min(elapsed, interval) / interval`.
fn smooth(previous: Wad, target: Wad, elapsed: u64, interval: u64) -> Result<Wad, FxError> {
    let weight = elapsed.min(interval) as u128;
    let interval = interval as u128;
    if target >= previous {
        let step = mul_div(target.raw() - previous.raw(), weight, interval, Rounding::Down)?;
        Ok(Wad(previous.raw() + step))
    } else {
        let step = mul_div(previous.raw() - target.raw(), weight, interval, Rounding::Down)?;
        Ok(Wad(previous.raw() - step))
    }
}
