//! House-money position sizing.
//!
//! The sizer is deterministic: no clock, no randomness, no account NAV. Its
//! input type carries only the trade-bank components, so total NAV cannot
//! leak into the sizing base by construction.

use serde::{Deserialize, Serialize};

/// JPY-quoted pairs tick in hundredths; everything else in ten-thousandths.
pub fn pip_size(pair: &str) -> f64 {
    if pair.contains("JPY") {
        0.01
    } else {
        0.0001
    }
}

/// The only account figures the sizer is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BankInput {
    /// Fixed capital allocation, the sizing floor.
    pub base_allocation: f64,
    /// Realized house-money pool, already ratcheted by the account state.
    pub house_profit: f64,
}

/// Base plus the profit-only overflow. While the pool is at or below the
/// base, size draws from the base alone; only the excess above the base adds
/// sizing room. Losses shrink the pool upstream, so the bank can never fall
/// below the base allocation.
pub fn trade_bank(input: BankInput) -> f64 {
    input.base_allocation + (input.house_profit - input.base_allocation).max(0.0)
}

#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub base_allocation: f64,
    /// Fraction of the trade bank risked per trade.
    pub max_risk_per_trade: f64,
    /// Notional ceiling as a multiple of the base allocation.
    pub leverage_cap: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_allocation: 1_000.0,
            max_risk_per_trade: 0.02,
            leverage_cap: 50.0,
        }
    }
}

/// Full arithmetic trail for the decision record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingBreakdown {
    pub bank: f64,
    pub units_risk: f64,
    pub units_notional: f64,
    pub final_units: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeOutcome {
    Sized { units: f64, breakdown: SizingBreakdown },
    /// The clamp reduced size to zero; equivalent to a gate block with
    /// reason "sizing-exhausted".
    Exhausted,
}

impl SizeOutcome {
    pub fn units(&self) -> Option<f64> {
        match self {
            SizeOutcome::Sized { units, .. } => Some(*units),
            SizeOutcome::Exhausted => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    cfg: SizingConfig,
}

impl PositionSizer {
    pub fn new(cfg: SizingConfig) -> Self {
        Self { cfg }
    }

    /// Whole units for one order: risk-based size from the stop distance,
    /// clamped by the leverage ceiling. Degenerate inputs (non-positive price
    /// or stop) size to zero rather than erroring.
    pub fn size(&self, pair: &str, entry_price: f64, sl_pips: f64, bank: BankInput) -> SizeOutcome {
        if entry_price <= 0.0 || sl_pips <= 0.0 {
            return SizeOutcome::Exhausted;
        }

        let bank_value = trade_bank(bank);
        let stop_distance = sl_pips * pip_size(pair);
        let risk_amount = bank_value * self.cfg.max_risk_per_trade;
        let units_risk = risk_amount / stop_distance;

        // Leverage ceiling is a clamp against the base allocation, never the
        // bank: profit overflow widens risk capacity, not notional capacity.
        let max_notional = self.cfg.base_allocation * self.cfg.leverage_cap;
        let units_notional = max_notional / entry_price;

        let final_units = units_risk.min(units_notional).floor();
        if final_units <= 0.0 {
            return SizeOutcome::Exhausted;
        }
        SizeOutcome::Sized {
            units: final_units,
            breakdown: SizingBreakdown {
                bank: bank_value,
                units_risk,
                units_notional,
                final_units,
            },
        }
    }

    /// The candidate size used by the duplicate-size gate. Zero when sizing
    /// would be exhausted.
    pub fn candidate_units(&self, pair: &str, entry_price: f64, sl_pips: f64, bank: BankInput) -> f64 {
        self.size(pair, entry_price, sl_pips, bank).units().unwrap_or(0.0)
    }
}
