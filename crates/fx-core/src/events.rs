// crates/fx-core/src/events.rs
//
// Event records emitted by the treasury, market, and fxUSD aggregator for
// downstream indexing. Nothing inside the engine reads them back.

use std::fmt::Debug;

use serde::Serialize;

use crate::fixed::{FeeRatio, Wad};
use crate::identity::Principal;

/// Which side of the pair an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    /// The fractional (stable-value) token.
    Fractional,
    /// The leveraged (residual) token.
    Leveraged,
}

/// Events emitted by the treasury.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum TreasuryEvent {
    ProtocolInitialized {
        recipient: Principal,
        base_in: u128,
        f_token_out: u128,
        x_token_out: u128,
    },
    Settle {
        old_price: Wad,
        new_price: Wad,
    },
    Mint {
        token: TokenKind,
        recipient: Principal,
        base_in: u128,
        token_out: u128,
    },
    Redeem {
        recipient: Principal,
        f_token_in: u128,
        x_token_in: u128,
        base_out: u128,
    },
    Harvest {
        caller: Principal,
        total: u128,
        platform_amount: u128,
        bounty_amount: u128,
        rebalance_pool_amount: u128,
    },
    TransferToStrategy {
        amount: u128,
    },
    NotifyStrategyProfit {
        amount: u128,
    },
    UpdateStrategy {
        old: Principal,
        new: Principal,
    },
    UpdatePriceOracle {
        old: Principal,
        new: Principal,
    },
    UpdateBaseTokenCap {
        old: u128,
        new: u128,
    },
    #[serde(rename = "UpdateEMASampleInterval")]
    UpdateEmaSampleInterval {
        old: u64,
        new: u64,
    },
    UpdatePlatform {
        old: Principal,
        new: Principal,
    },
    UpdateRebalancePoolSplitter {
        old: Principal,
        new: Principal,
    },
    UpdateRebalancePoolRatio {
        old: FeeRatio,
        new: FeeRatio,
    },
    UpdateHarvesterRatio {
        old: FeeRatio,
        new: FeeRatio,
    },
    UpdateRateProvider {
        old: Principal,
        new: Principal,
    },
}

/// Events emitted by the market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum MarketEvent {
    Mint {
        token: TokenKind,
        owner: Principal,
        recipient: Principal,
        base_in: u128,
        token_out: u128,
        fee: u128,
    },
    Redeem {
        token: TokenKind,
        owner: Principal,
        recipient: Principal,
        token_in: u128,
        base_out: u128,
        fee: u128,
    },
    UpdateStabilityRatio {
        old: Wad,
        new: Wad,
    },
    UpdateMintFeeRatio {
        token: TokenKind,
        default: FeeRatio,
        delta: i64,
    },
    UpdateRedeemFeeRatio {
        token: TokenKind,
        default: FeeRatio,
        delta: i64,
    },
    UpdatePlatform {
        old: Principal,
        new: Principal,
    },
    UpdateStabilityPolicy {
        f_token_mint_paused: bool,
        x_token_redeem_paused: bool,
    },
    EnableFxUsd {
        fx_usd: Principal,
    },
}

/// Events emitted by the fxUSD aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum FxUsdEvent {
    AddMarket {
        base_token: Principal,
        mint_cap: u128,
    },
    UpdateMintCap {
        base_token: Principal,
        old: u128,
        new: u128,
    },
    Wrap {
        base_token: Principal,
        owner: Principal,
        recipient: Principal,
        base_in: u128,
        minted: u128,
    },
    Unwrap {
        base_token: Principal,
        owner: Principal,
        recipient: Principal,
        amount: u128,
        base_out: u128,
    },
}

/// Append-only in-memory event log.
///
/// Every pushed event is also emitted as a `tracing` record so that a
/// subscriber sees the same stream an indexer would.
#[derive(Debug, Clone)]
pub struct EventLog<E> {
    entries: Vec<E>,
}

impl<E: Debug + Serialize> EventLog<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, event: E) {
        tracing::info!(event = ?event, "event");
        self.entries.push(event);
    }

    /// Events recorded since the last `take`.
    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    /// Drain all recorded events.
    pub fn take(&mut self) -> Vec<E> {
        std::mem::take(&mut self.entries)
    }

    /// Render the recorded events as newline-delimited JSON.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl<E: Debug + Serialize> Default for EventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_take() {
        let mut log = EventLog::new();
        log.push(TreasuryEvent::TransferToStrategy { amount: 5 });
        assert_eq!(log.entries().len(), 1);
        let drained = log.take();
        assert_eq!(drained, vec![TreasuryEvent::TransferToStrategy { amount: 5 }]);
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_json_lines_tagged() {
        let mut log = EventLog::new();
        log.push(TreasuryEvent::Settle {
            old_price: Wad::ZERO,
            new_price: Wad::from_int(2000),
        });
        log.push(TreasuryEvent::UpdateEmaSampleInterval { old: 60, new: 120 });
        let json = log.to_json_lines().unwrap();
        let lines: Vec<&str> = json.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"event\":\"Settle\""));
        assert!(lines[0].contains("\"new_price\":2000000000000000000000"));
        assert!(lines[1].contains("\"event\":\"UpdateEMASampleInterval\""));
    }
}
