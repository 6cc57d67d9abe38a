//! Fusion: N engine signals + one weight map -> one FusedSignal.
//!
//! Pure function, no state, no clock. Veto is computed before scoring and
//! suppresses order construction only; the weighted score is still produced
//! for observability. Per-signal scores are never clamped before weighting.

use crate::signal::{Bias, EngineSignal, FusedSignal, OrderKind, OrderSpec};
use crate::weights::WeightMap;

/// Fixed deadband around zero for bias derivation. Applied uniformly, not
/// per-engine.
pub const SCORE_DEADBAND: f64 = 0.1;

/// Order construction policy. These are fixed policy constants per cycle;
/// downstream sizing and guardrails decide whether either order is placed.
#[derive(Debug, Clone, Copy)]
pub struct OrderPolicy {
    pub sl_pips: f64,
    pub tp_pips: f64,
    pub limit_ttl_min: u32,
    pub stop_ttl_min: u32,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            sl_pips: 15.0,
            tp_pips: 30.0,
            limit_ttl_min: 45,
            stop_ttl_min: 90,
        }
    }
}

/// Combine all engine signals into the cycle's single decision.
///
/// A non-finite score contributes weight 0 (data errors never make fusion
/// partial). The empty signal list yields score 0, neutral bias, and is not
/// vetoed unless a news freeze is active; orders are still emitted in that
/// case so behavior stays deterministic with no engines reporting.
pub fn fuse(
    pair: &str,
    timeframe: &str,
    signals: &[EngineSignal],
    weights: &WeightMap,
    news_freeze: bool,
    policy: &OrderPolicy,
) -> FusedSignal {
    let vetoed = news_freeze || signals.iter().any(|s| s.veto);

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for sig in signals {
        if !sig.score.is_finite() {
            continue;
        }
        let w = weights.get(&sig.id).copied().unwrap_or(1.0);
        weighted_sum += sig.score * w;
        total_weight += w;
    }
    let score = if total_weight == 0.0 {
        0.0
    } else {
        weighted_sum / total_weight
    };

    let bias = if score > SCORE_DEADBAND {
        Bias::Long
    } else if score < -SCORE_DEADBAND {
        Bias::Short
    } else {
        Bias::Neutral
    };

    let orders = if vetoed {
        Vec::new()
    } else {
        build_order_pair(policy)
    };

    FusedSignal {
        pair: pair.to_string(),
        timeframe: timeframe.to_string(),
        bias,
        score,
        veto: vetoed,
        orders,
    }
}

/// Exactly two conditional orders with distinct kinds and TTLs.
fn build_order_pair(policy: &OrderPolicy) -> Vec<OrderSpec> {
    vec![
        OrderSpec {
            kind: OrderKind::Limit,
            sl_pips: policy.sl_pips,
            tp_pips: policy.tp_pips,
            ttl_min: policy.limit_ttl_min,
        },
        OrderSpec {
            kind: OrderKind::Stop,
            sl_pips: policy.sl_pips,
            tp_pips: policy.tp_pips,
            ttl_min: policy.stop_ttl_min,
        },
    ]
}

// =============================================================================
// News freeze windows
// =============================================================================

/// Externally declared windows during which fusion is forced to veto.
#[derive(Debug, Clone, Default)]
pub struct FreezeCalendar {
    /// Half-open windows [start_ts, end_ts) in epoch seconds.
    windows: Vec<(u64, u64)>,
}

impl FreezeCalendar {
    pub fn new(windows: Vec<(u64, u64)>) -> Self {
        Self { windows }
    }

    pub fn add_window(&mut self, start_ts: u64, end_ts: u64) {
        self.windows.push((start_ts, end_ts));
    }

    pub fn is_frozen(&self, now_ts: u64) -> bool {
        self.windows
            .iter()
            .any(|(start, end)| now_ts >= *start && now_ts < *end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::EngineId;

    fn sig(id: EngineId, bias: Bias, score: f64) -> EngineSignal {
        EngineSignal::new(id, bias, score, 0)
    }

    fn weights(entries: &[(EngineId, f64)]) -> WeightMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_empty_weight_fallback() {
        let signals = vec![sig(EngineId::Technical, Bias::Long, 0.5)];
        let fused = fuse("EUR_USD", "M5", &signals, &WeightMap::new(), false, &OrderPolicy::default());
        assert_eq!(fused.score, 0.5);
        assert_eq!(fused.bias, Bias::Long);
        assert!(!fused.veto);
        assert_eq!(fused.orders.len(), 2);
    }

    #[test]
    fn test_weighted_mean() {
        let signals = vec![
            sig(EngineId::Technical, Bias::Long, 0.8),
            sig(EngineId::Volume, Bias::Short, -0.2),
        ];
        let w = weights(&[(EngineId::Technical, 3.0), (EngineId::Volume, 1.0)]);
        let fused = fuse("EUR_USD", "M5", &signals, &w, false, &OrderPolicy::default());
        // (0.8*3 + -0.2*1) / 4 = 0.55
        assert!((fused.score - 0.55).abs() < 1e-12);
        assert_eq!(fused.bias, Bias::Long);
    }

    #[test]
    fn test_veto_dominance() {
        let signals = vec![
            sig(EngineId::Technical, Bias::Long, 5.0),
            EngineSignal::veto(EngineId::Execution, 0),
        ];
        let fused = fuse("EUR_USD", "M5", &signals, &WeightMap::new(), false, &OrderPolicy::default());
        assert!(fused.veto);
        assert!(fused.orders.is_empty(), "veto must force empty orders");
        assert!(fused.score > 0.0, "score still computed for observability");
    }

    #[test]
    fn test_news_freeze_overrides_score() {
        let signals = vec![
            sig(EngineId::Technical, Bias::Long, 1.0),
            sig(EngineId::Fundamental, Bias::Long, 1.0),
        ];
        let fused = fuse("EUR_USD", "M5", &signals, &WeightMap::new(), true, &OrderPolicy::default());
        assert!(fused.veto);
        assert!(fused.orders.is_empty());
        assert_eq!(fused.bias, Bias::Long, "bias derivation unaffected by freeze");
    }

    #[test]
    fn test_vetoing_signal_score_still_averaged() {
        // The end-to-end scenario from the design review: technical 0.8 long
        // plus a vetoing execution signal at equal weight averages to 0.4.
        let mut veto_sig = EngineSignal::veto(EngineId::Execution, 0);
        veto_sig.score = 0.0;
        let signals = vec![sig(EngineId::Technical, Bias::Long, 0.8), veto_sig];
        let w = weights(&[(EngineId::Technical, 1.0), (EngineId::Execution, 1.0)]);
        let fused = fuse("EUR_USD", "M5", &signals, &w, false, &OrderPolicy::default());
        assert!((fused.score - 0.4).abs() < 1e-12);
        assert_eq!(fused.bias, Bias::Long);
        assert!(fused.veto);
        assert!(fused.orders.is_empty());
    }

    #[test]
    fn test_empty_signals_deterministic() {
        let fused = fuse("EUR_USD", "M5", &[], &WeightMap::new(), false, &OrderPolicy::default());
        assert_eq!(fused.score, 0.0);
        assert_eq!(fused.bias, Bias::Neutral);
        assert!(!fused.veto);
        assert_eq!(fused.orders.len(), 2, "orders still emitted with no engines reporting");
    }

    #[test]
    fn test_zero_total_weight_scores_zero() {
        let signals = vec![
            sig(EngineId::Technical, Bias::Long, 0.9),
            sig(EngineId::Correlation, Bias::Long, 0.9),
        ];
        let w = weights(&[(EngineId::Technical, 1.0), (EngineId::Correlation, -1.0)]);
        let fused = fuse("EUR_USD", "M5", &signals, &w, false, &OrderPolicy::default());
        assert_eq!(fused.score, 0.0);
        assert_eq!(fused.bias, Bias::Neutral);
    }

    #[test]
    fn test_deadband_boundaries() {
        let mk = |score: f64| {
            let signals = vec![sig(EngineId::Technical, Bias::Neutral, score)];
            fuse("EUR_USD", "M5", &signals, &WeightMap::new(), false, &OrderPolicy::default()).bias
        };
        assert_eq!(mk(0.1), Bias::Neutral, "deadband edge is neutral");
        assert_eq!(mk(0.100001), Bias::Long);
        assert_eq!(mk(-0.1), Bias::Neutral);
        assert_eq!(mk(-0.100001), Bias::Short);
    }

    #[test]
    fn test_non_finite_score_dropped() {
        let signals = vec![
            sig(EngineId::Technical, Bias::Long, 0.6),
            sig(EngineId::Volume, Bias::Long, f64::NAN),
        ];
        let fused = fuse("EUR_USD", "M5", &signals, &WeightMap::new(), false, &OrderPolicy::default());
        assert_eq!(fused.score, 0.6, "NaN contributes weight 0, not poison");
    }

    #[test]
    fn test_no_clamping_of_overconfident_scores() {
        let signals = vec![sig(EngineId::Technical, Bias::Long, 3.0)];
        let fused = fuse("EUR_USD", "M5", &signals, &WeightMap::new(), false, &OrderPolicy::default());
        assert_eq!(fused.score, 3.0);
    }

    #[test]
    fn test_order_pair_shape() {
        let fused = fuse("EUR_USD", "M5", &[], &WeightMap::new(), false, &OrderPolicy::default());
        assert_eq!(fused.orders[0].kind, OrderKind::Limit);
        assert_eq!(fused.orders[1].kind, OrderKind::Stop);
        assert_ne!(fused.orders[0].ttl_min, fused.orders[1].ttl_min);
    }

    #[test]
    fn test_fusion_determinism() {
        let signals = vec![
            sig(EngineId::Technical, Bias::Long, 0.42),
            sig(EngineId::Psychology, Bias::Short, -0.13),
        ];
        let w = weights(&[(EngineId::Technical, 1.3)]);
        let a = fuse("EUR_USD", "M5", &signals, &w, false, &OrderPolicy::default());
        let b = fuse("EUR_USD", "M5", &signals, &w, false, &OrderPolicy::default());
        assert_eq!(a.score.to_bits(), b.score.to_bits(), "bit-identical score");
        assert_eq!(a.bias, b.bias);
        assert_eq!(a.orders, b.orders);
    }

    #[test]
    fn test_freeze_calendar_windows() {
        let cal = FreezeCalendar::new(vec![(100, 200), (300, 400)]);
        assert!(!cal.is_frozen(99));
        assert!(cal.is_frozen(100));
        assert!(cal.is_frozen(199));
        assert!(!cal.is_frozen(200), "window is half-open");
        assert!(cal.is_frozen(350));
        assert!(!cal.is_frozen(500));
    }
}
