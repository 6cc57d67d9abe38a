//! One evaluation cycle per (pair, timeframe).
//!
//! The cycle is a straight line: engines -> stale filter -> weight
//! resolution -> fusion -> atomic gate evaluation and sizing through the
//! account actor -> order intents -> router + shadow mirror -> decision
//! record. Nothing in here is fatal after startup; a bad cycle degrades to
//! blocked or neutral and the next cycle starts clean.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::account::AccountHandle;
use crate::decision::{DecisionRecord, FinalAction};
use crate::engines::{evaluate_all, Engine, EngineContext};
use crate::fuse::{fuse, FreezeCalendar, OrderPolicy};
use crate::logging::{log, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::shadow::ShadowBook;
use crate::signal::{Bias, EngineSignal, OrderKind};
use crate::weights::{resolve_weights, WeightLayers};

// =============================================================================
// Order intents and routing
// =============================================================================

/// Cycle-level idempotency key. Both intents of a cycle derive their keys
/// from it, suffixed by order kind, so a duplicate submission of the same
/// cycle is broker-side deduplicable.
pub fn cycle_key(pair: &str, timeframe: &str, cycle_ts: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pair.as_bytes());
    hasher.update(b"|");
    hasher.update(timeframe.as_bytes());
    hasher.update(b"|");
    hasher.update(cycle_ts.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// What the broker collaborator receives. SL and TP are mandatory; the
/// broker attaches them server-side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIntent {
    pub idempotency_key: String,
    pub pair: String,
    pub timeframe: String,
    pub direction: Bias,
    pub units: f64,
    pub kind: OrderKind,
    pub sl_pips: f64,
    pub tp_pips: f64,
    pub ttl_min: u32,
}

#[async_trait]
pub trait OrderRouter: Send + Sync {
    async fn submit(&self, intent: &OrderIntent) -> Result<()>;
}

/// Accepts and logs every intent without touching a broker. The default
/// router for dry runs and tests.
pub struct NullRouter;

#[async_trait]
impl OrderRouter for NullRouter {
    async fn submit(&self, intent: &OrderIntent) -> Result<()> {
        log(
            Level::Info,
            Domain::Exec,
            "order_intent",
            obj(&[
                ("pair", v_str(&intent.pair)),
                ("timeframe", v_str(&intent.timeframe)),
                ("direction", v_str(intent.direction.as_str())),
                ("kind", v_str(intent.kind.as_str())),
                ("units", v_num(intent.units)),
                ("idempotency_key", v_str(&intent.idempotency_key)),
            ]),
        );
        Ok(())
    }
}

// =============================================================================
// The cycle
// =============================================================================

#[derive(Debug)]
pub struct CycleOutcome {
    pub record: DecisionRecord,
    pub intents: Vec<OrderIntent>,
}

pub struct Pipeline {
    engines: Vec<Box<dyn Engine>>,
    weights: WeightLayers,
    freeze: FreezeCalendar,
    policy: OrderPolicy,
    router: Box<dyn OrderRouter>,
    shadow: ShadowBook,
}

impl Pipeline {
    pub fn new(
        engines: Vec<Box<dyn Engine>>,
        weights: WeightLayers,
        freeze: FreezeCalendar,
        policy: OrderPolicy,
        router: Box<dyn OrderRouter>,
    ) -> Self {
        Self {
            engines,
            weights,
            freeze,
            policy,
            router,
            shadow: ShadowBook::new(),
        }
    }

    pub fn shadow_book(&self) -> &ShadowBook {
        &self.shadow
    }

    /// Evaluate one (pair, timeframe) cycle end to end and emit its decision
    /// record.
    pub async fn evaluate_cycle(
        &mut self,
        ctx: &EngineContext,
        entry_price: f64,
        account: &AccountHandle,
    ) -> Result<CycleOutcome> {
        let _scope = ProfileScope::with_context(
            "evaluate_cycle",
            &[("pair", v_str(&ctx.pair)), ("timeframe", v_str(&ctx.timeframe))],
        );
        // The shadow book mirrors one cycle at a time.
        self.shadow.clear();

        let signals = evaluate_all(&self.engines, ctx);
        let (fresh, stale) = partition_stale(signals, ctx.cycle_ts);
        for sig in &stale {
            log(
                Level::Warn,
                Domain::Engine,
                "stale_signal_dropped",
                obj(&[
                    ("engine", v_str(sig.id.as_str())),
                    ("pair", v_str(&ctx.pair)),
                    ("age_secs", v_num(ctx.cycle_ts.saturating_sub(sig.issued_ts) as f64)),
                ]),
            );
        }

        for sig in fresh.iter().filter(|s| !s.score.is_finite()) {
            log(
                Level::Warn,
                Domain::Engine,
                "non_finite_score",
                obj(&[("engine", v_str(sig.id.as_str())), ("pair", v_str(&ctx.pair))]),
            );
        }

        let weights = resolve_weights(&ctx.pair, &ctx.timeframe, &self.weights);
        let news_freeze = self.freeze.is_frozen(ctx.cycle_ts);
        let fused = fuse(&ctx.pair, &ctx.timeframe, &fresh, &weights, news_freeze, &self.policy);

        log(
            Level::Debug,
            Domain::Fusion,
            "fused",
            obj(&[
                ("pair", v_str(&fused.pair)),
                ("timeframe", v_str(&fused.timeframe)),
                ("score", v_num(fused.score)),
                ("bias", v_str(fused.bias.as_str())),
                ("veto", serde_json::Value::Bool(fused.veto)),
            ]),
        );

        let mut record = DecisionRecord::new(&fused, ctx.cycle_ts).with_engine_trails(&fresh, &weights);
        record.stale_dropped = stale.len();

        let reply = account
            .evaluate(fused.clone(), entry_price, self.policy.sl_pips, ctx.cycle_ts)
            .await?;
        record.gates = reply.gate_run.reports.clone();
        record.sizing = reply.sizing;

        let mut intents = Vec::new();
        match (reply.gate_run.block_reason(), reply.units) {
            (Some(reason), _) => {
                record.final_action = FinalAction::Blocked;
                record.block_reason = Some(reason.as_str());
            }
            (None, Some(units)) => {
                let key = cycle_key(&ctx.pair, &ctx.timeframe, ctx.cycle_ts);
                for order in &fused.orders {
                    intents.push(OrderIntent {
                        idempotency_key: format!("{}-{}", key, order.kind.as_str()),
                        pair: fused.pair.clone(),
                        timeframe: fused.timeframe.clone(),
                        direction: fused.bias,
                        units,
                        kind: order.kind,
                        sl_pips: order.sl_pips,
                        tp_pips: order.tp_pips,
                        ttl_min: order.ttl_min,
                    });
                }
                for intent in &intents {
                    self.shadow.mirror(intent);
                    // Routing failure degrades the cycle, never kills it.
                    if let Err(err) = self.router.submit(intent).await {
                        log(
                            Level::Error,
                            Domain::Exec,
                            "order_submit_failed",
                            obj(&[
                                ("idempotency_key", v_str(&intent.idempotency_key)),
                                ("error", v_str(&err.to_string())),
                            ]),
                        );
                    }
                }
                record.final_action = FinalAction::Submitted;
            }
            (None, None) => {
                record.final_action = FinalAction::Neutral;
            }
        }

        record.emit();
        Ok(CycleOutcome { record, intents })
    }
}

fn partition_stale(signals: Vec<EngineSignal>, now_ts: u64) -> (Vec<EngineSignal>, Vec<EngineSignal>) {
    signals.into_iter().partition(|s| !s.is_stale(now_ts))
}
