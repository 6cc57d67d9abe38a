//! The ten analysis engines.
//!
//! Each engine is a stateless pure function: EngineContext -> EngineSignal.
//! Cross-cycle memory (trend tracking, learned thresholds) belongs to the
//! collaborators that populate the context, never to the engines themselves.
//! Every registered engine reports every cycle; a degraded input shows up as
//! a neutral or vetoing signal, not a missing one.

use crate::signal::{Bias, EngineId, EngineSignal};

/// Typed per-cycle input record. Populated upstream from market data and
/// journal collaborators; engines only read it.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub pair: String,
    pub timeframe: String,
    /// Epoch seconds of the cycle tick; stamped on every emitted signal.
    pub cycle_ts: u64,

    // Technical indicators on the working timeframe.
    pub rsi: f64,
    pub adx: f64,
    pub ema20: f64,
    pub ema50: f64,
    pub atr_pips: f64,

    // Microstructure.
    pub spread_pips: f64,
    pub volume_ratio: f64,

    // Cross-market.
    /// Rolling correlation of the pair against the dollar index. Positive
    /// means the pair moves with the dollar.
    pub correlation_dxy: f64,
    /// Aggregate macro sentiment in [-1, 1].
    pub macro_sentiment: f64,

    // Session / regime.
    pub session_active: bool,
    pub trending: bool,
    /// Price distance to the nearest tracked key level, in pips. Negative
    /// when no level is tracked.
    pub key_level_distance_pips: f64,

    // Account-derived context (read-only copies, not the live state).
    pub recent_win_rate: f64,
    pub open_position_count: usize,
}

impl EngineContext {
    pub fn is_jpy_pair(&self) -> bool {
        self.pair.ends_with("JPY")
    }
}

/// One analysis engine. Implementations must be deterministic over the
/// context; the registry calls every engine exactly once per cycle.
pub trait Engine: Send + Sync {
    fn id(&self) -> EngineId;
    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal;
}

/// The fixed engine set. Order matches EngineId::ALL.
pub fn registry() -> Vec<Box<dyn Engine>> {
    vec![
        Box::new(EnvironmentEngine),
        Box::new(CorrelationEngine),
        Box::new(TechnicalEngine),
        Box::new(FundamentalEngine),
        Box::new(MarketTypeEngine),
        Box::new(ExecutionEngine),
        Box::new(TradeMgmtEngine),
        Box::new(VolumeEngine),
        Box::new(ConditionalEngine),
        Box::new(PsychologyEngine),
    ]
}

/// Run every registered engine against one context.
pub fn evaluate_all(engines: &[Box<dyn Engine>], ctx: &EngineContext) -> Vec<EngineSignal> {
    engines.iter().map(|e| e.evaluate(ctx)).collect()
}

// =============================================================================
// Engines
// =============================================================================

/// Session and volatility environment. Outside active session hours the
/// engine leans neutral-negative rather than vetoing so a single quiet input
/// cannot silence the whole stack.
pub struct EnvironmentEngine;

impl Engine for EnvironmentEngine {
    fn id(&self) -> EngineId {
        EngineId::Environment
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        let score = if !ctx.session_active {
            -0.3
        } else if ctx.atr_pips < 3.0 {
            // Too quiet to pay for the spread.
            -0.2
        } else {
            0.2
        };
        EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts)
    }
}

/// Dollar-index correlation. The score convention is inverted relative to
/// the pair (dollar strength argues against longs in dollar-quoted pairs),
/// which is why config typically carries a negative weight for this engine.
pub struct CorrelationEngine;

impl Engine for CorrelationEngine {
    fn id(&self) -> EngineId {
        EngineId::Correlation
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        let score = ctx.correlation_dxy.clamp(-1.0, 1.0);
        EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts)
    }
}

/// RSI + ADX + EMA-cross trend rules. ADX below 25 means no tradable trend
/// and the engine stays neutral regardless of RSI.
pub struct TechnicalEngine;

impl Engine for TechnicalEngine {
    fn id(&self) -> EngineId {
        EngineId::Technical
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        let score = if ctx.adx <= 25.0 {
            0.0
        } else if ctx.rsi > 55.0 && ctx.ema20 > ctx.ema50 {
            // Trend strength scales the conviction; RSI 55 -> 0.4, RSI 80 -> 1.0.
            (0.4 + (ctx.rsi - 55.0) / 41.0).min(1.0)
        } else if ctx.rsi < 45.0 && ctx.ema20 < ctx.ema50 {
            (-0.4 - (45.0 - ctx.rsi) / 41.0).max(-1.0)
        } else {
            0.0
        };
        EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts)
    }
}

/// Macro sentiment passthrough, clamped to the conventional range.
pub struct FundamentalEngine;

impl Engine for FundamentalEngine {
    fn id(&self) -> EngineId {
        EngineId::Fundamental
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        let score = ctx.macro_sentiment.clamp(-1.0, 1.0);
        EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts)
    }
}

/// Trend-vs-range classifier. In a range it argues mildly against entries;
/// in a trend it supports whichever direction the EMAs point.
pub struct MarketTypeEngine;

impl Engine for MarketTypeEngine {
    fn id(&self) -> EngineId {
        EngineId::MarketType
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        let score = if !ctx.trending {
            -0.2
        } else if ctx.ema20 > ctx.ema50 {
            0.5
        } else if ctx.ema20 < ctx.ema50 {
            -0.5
        } else {
            0.0
        };
        EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts)
    }
}

/// Execution quality guard. The only engine that vetoes: a spread wider
/// than MAX_SPREAD_PIPS makes any entry unprofitable at this system's
/// target distances, so the whole cycle must stand down.
pub struct ExecutionEngine;

pub const MAX_SPREAD_PIPS: f64 = 3.0;

impl Engine for ExecutionEngine {
    fn id(&self) -> EngineId {
        EngineId::Execution
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        if ctx.spread_pips > MAX_SPREAD_PIPS {
            return EngineSignal::veto(self.id(), ctx.cycle_ts);
        }
        // Tighter spread, better score: 0 pips -> 0.3, cap pips -> 0.0.
        let score = 0.3 * (1.0 - ctx.spread_pips / MAX_SPREAD_PIPS);
        EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts)
    }
}

/// Portfolio load. Each already-open position argues a little harder against
/// adding another.
pub struct TradeMgmtEngine;

impl Engine for TradeMgmtEngine {
    fn id(&self) -> EngineId {
        EngineId::TradeMgmt
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        let score = (-0.15 * ctx.open_position_count as f64).max(-0.6);
        EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts)
    }
}

/// Participation confirmation. Volume above its rolling baseline confirms
/// the move; thin tape argues against it.
pub struct VolumeEngine;

impl Engine for VolumeEngine {
    fn id(&self) -> EngineId {
        EngineId::Volume
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        let score = ((ctx.volume_ratio - 1.0) * 0.5).clamp(-0.5, 0.5);
        EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts)
    }
}

/// Key-level proximity. Close to a tracked level the engine flags a likely
/// trigger zone; signals carry a short TTL since level distance goes stale
/// fast.
pub struct ConditionalEngine;

impl Engine for ConditionalEngine {
    fn id(&self) -> EngineId {
        EngineId::Conditional
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        let score = if ctx.key_level_distance_pips >= 0.0 && ctx.key_level_distance_pips < 10.0 {
            0.4
        } else {
            0.1
        };
        let mut sig = EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts);
        sig.ttl_min = Some(15);
        sig
    }
}

/// Recent-performance temperature check. A cold streak argues for smaller
/// conviction; the hard stop for cold streaks is the cool-off gate, not this
/// score.
pub struct PsychologyEngine;

impl Engine for PsychologyEngine {
    fn id(&self) -> EngineId {
        EngineId::Psychology
    }

    fn evaluate(&self, ctx: &EngineContext) -> EngineSignal {
        let score = ((ctx.recent_win_rate - 0.5) * 0.8).clamp(-0.4, 0.4);
        EngineSignal::new(self.id(), bias_of(score), score, ctx.cycle_ts)
    }
}

fn bias_of(score: f64) -> Bias {
    if score > 0.0 {
        Bias::Long
    } else if score < 0.0 {
        Bias::Short
    } else {
        Bias::Neutral
    }
}
