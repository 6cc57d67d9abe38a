//! Engine output contract and the fused decision type.
//!
//! Every analysis engine produces exactly one `EngineSignal` per evaluation
//! cycle. Fusion combines all of them into one `FusedSignal` per
//! (pair, timeframe, cycle); the fused value is immutable and discarded after
//! the guardrail stack consumes it.

use serde::{Deserialize, Serialize};

/// Closed set of engine identifiers. Adding an engine is a compile-time
/// visible change that propagates through weight maps and fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    Environment,
    Correlation,
    Technical,
    Fundamental,
    MarketType,
    Execution,
    TradeMgmt,
    Volume,
    Conditional,
    Psychology,
}

impl EngineId {
    pub const ALL: [EngineId; 10] = [
        EngineId::Environment,
        EngineId::Correlation,
        EngineId::Technical,
        EngineId::Fundamental,
        EngineId::MarketType,
        EngineId::Execution,
        EngineId::TradeMgmt,
        EngineId::Volume,
        EngineId::Conditional,
        EngineId::Psychology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::Environment => "environment",
            EngineId::Correlation => "correlation",
            EngineId::Technical => "technical",
            EngineId::Fundamental => "fundamental",
            EngineId::MarketType => "market_type",
            EngineId::Execution => "execution",
            EngineId::TradeMgmt => "trade_mgmt",
            EngineId::Volume => "volume",
            EngineId::Conditional => "conditional",
            EngineId::Psychology => "psychology",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Long,
    Short,
    Neutral,
}

impl Bias {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bias::Long => "long",
            Bias::Short => "short",
            Bias::Neutral => "neutral",
        }
    }
}

/// One engine's output for one cycle.
///
/// `score` is conventionally in [-1, 1] but the contract does not clamp it;
/// fusion treats excess as extra confidence. A signal with `veto` set still
/// carries its score into the weighted mean (the veto suppresses orders, not
/// scoring).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSignal {
    pub id: EngineId,
    pub bias: Bias,
    pub score: f64,
    #[serde(default)]
    pub veto: bool,
    /// Minutes until this signal is stale and must not be reused.
    #[serde(default)]
    pub ttl_min: Option<u32>,
    /// Epoch seconds when the signal was produced.
    pub issued_ts: u64,
    /// Price levels the engine considers significant, ordered.
    #[serde(default)]
    pub key_levels: Vec<f64>,
}

impl EngineSignal {
    pub fn new(id: EngineId, bias: Bias, score: f64, issued_ts: u64) -> Self {
        Self {
            id,
            bias,
            score,
            veto: false,
            ttl_min: None,
            issued_ts,
            key_levels: Vec::new(),
        }
    }

    pub fn veto(id: EngineId, issued_ts: u64) -> Self {
        Self {
            id,
            bias: Bias::Neutral,
            score: 0.0,
            veto: true,
            ttl_min: None,
            issued_ts,
            key_levels: Vec::new(),
        }
    }

    /// A signal past its TTL must not be reused.
    pub fn is_stale(&self, now_ts: u64) -> bool {
        match self.ttl_min {
            Some(ttl) => now_ts.saturating_sub(self.issued_ts) > ttl as u64 * 60,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "market",
            OrderKind::Limit => "limit",
            OrderKind::Stop => "stop",
        }
    }
}

/// Conditional order descriptor. Stop-loss and take-profit are mandatory on
/// every order (broker submission requires server-side SL/TP).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub kind: OrderKind,
    pub sl_pips: f64,
    pub tp_pips: f64,
    pub ttl_min: u32,
}

/// The single authoritative decision for one (pair, timeframe, cycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedSignal {
    pub pair: String,
    pub timeframe: String,
    pub bias: Bias,
    pub score: f64,
    pub veto: bool,
    /// At most two conditional orders; empty when vetoed.
    pub orders: Vec<OrderSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_id_all_unique() {
        let mut seen = std::collections::HashSet::new();
        for id in EngineId::ALL {
            assert!(seen.insert(id.as_str()), "duplicate engine id {}", id.as_str());
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn test_signal_staleness() {
        let mut sig = EngineSignal::new(EngineId::Technical, Bias::Long, 0.5, 1000);
        assert!(!sig.is_stale(u64::MAX), "no TTL means never stale");

        sig.ttl_min = Some(5);
        assert!(!sig.is_stale(1000 + 300), "exactly at TTL is still fresh");
        assert!(sig.is_stale(1000 + 301), "past TTL is stale");
    }

    #[test]
    fn test_veto_signal_is_neutral_zero() {
        let sig = EngineSignal::veto(EngineId::Execution, 0);
        assert!(sig.veto);
        assert_eq!(sig.bias, Bias::Neutral);
        assert_eq!(sig.score, 0.0);
    }

    #[test]
    fn test_engine_signal_json_round_trip() {
        let sig = EngineSignal {
            id: EngineId::Conditional,
            bias: Bias::Short,
            score: -0.7,
            veto: false,
            ttl_min: Some(15),
            issued_ts: 1_700_000_000,
            key_levels: vec![1.0842, 1.0910],
        };
        let json = serde_json::to_string(&sig).unwrap();
        let back: EngineSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, EngineId::Conditional);
        assert_eq!(back.key_levels, sig.key_levels);
    }
}
