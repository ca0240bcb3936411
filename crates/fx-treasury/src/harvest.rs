// crates/fx-treasury/src/harvest.rs
//
// Harvest split logic.
//
// Harvested yield is divided as follows:
//   1. harvester_ratio of the total goes to the caller as a bounty.
//   2. rebalance_pool_ratio of the total goes to the rebalance pool splitter.
//   3. The remainder goes to the platform.
//
// Both ratios use the 9-decimal scale. The bounty is capped at 10%, and the
// two ratios together may not exceed 100%.

use serde::{Deserialize, Serialize};

use fx_core::{FeeRatio, FxError, Rounding, FEE_PRECISION};

/// Largest accepted harvester bounty ratio (10%).
pub const MAX_HARVESTER_RATIO: FeeRatio = FeeRatio(100_000_000);

/// Validated harvester and rebalance-pool ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestRatios {
    harvester: FeeRatio,
    rebalance_pool: FeeRatio,
}

impl HarvestRatios {
    /// # Errors
    /// Returns `FxError::HarvesterRatioTooLarge` or
    /// `FxError::RebalancePoolRatioTooLarge` if either bound is violated.
    pub fn new(harvester: FeeRatio, rebalance_pool: FeeRatio) -> Result<Self, FxError> {
        check_harvester(harvester, rebalance_pool)?;
        check_rebalance_pool(rebalance_pool, harvester)?;
        Ok(Self {
            harvester,
            rebalance_pool,
        })
    }

    pub fn harvester(&self) -> FeeRatio {
        self.harvester
    }

    pub fn rebalance_pool(&self) -> FeeRatio {
        self.rebalance_pool
    }

    /// Copy with a new harvester ratio, validated against the current
    /// rebalance-pool ratio.
    pub fn with_harvester(&self, harvester: FeeRatio) -> Result<Self, FxError> {
        check_harvester(harvester, self.rebalance_pool)?;
        Ok(Self { harvester, ..*self })
    }

    /// Copy with a new rebalance-pool ratio, validated against the current
    /// harvester ratio.
    pub fn with_rebalance_pool(&self, rebalance_pool: FeeRatio) -> Result<Self, FxError> {
        check_rebalance_pool(rebalance_pool, self.harvester)?;
        Ok(Self {
            rebalance_pool,
            ..*self
        })
    }
}

fn check_harvester(harvester: FeeRatio, rebalance_pool: FeeRatio) -> Result<(), FxError> {
    let max = MAX_HARVESTER_RATIO
        .raw()
        .min(FEE_PRECISION.saturating_sub(rebalance_pool.raw()));
    if harvester.raw() > max {
        return Err(FxError::HarvesterRatioTooLarge {
            ratio: harvester.raw(),
            max,
        });
    }
    Ok(())
}

fn check_rebalance_pool(rebalance_pool: FeeRatio, harvester: FeeRatio) -> Result<(), FxError> {
    let max = FEE_PRECISION.saturating_sub(harvester.raw());
    if rebalance_pool.raw() > max {
        return Err(FxError::RebalancePoolRatioTooLarge {
            ratio: rebalance_pool.raw(),
            max,
        });
    }
    Ok(())
}

/// How one harvest is divided, in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HarvestSplit {
    pub total: u128,
    pub bounty: u128,
    pub rebalance_pool: u128,
    pub platform: u128,
}

/// Divide `total` according to `ratios`. Bounty and rebalance-pool shares
/// round down; the platform takes the exact remainder, so the three shares
/// always sum to `total`.
pub fn split_harvest(total: u128, ratios: &HarvestRatios) -> Result<HarvestSplit, FxError> {
    let bounty = ratios.harvester.apply(total, Rounding::Down)?;
    let rebalance_pool = ratios.rebalance_pool.apply(total, Rounding::Down)?;
    let platform = total - bounty - rebalance_pool;
    Ok(HarvestSplit {
        total,
        bounty,
        rebalance_pool,
        platform,
    })
}
