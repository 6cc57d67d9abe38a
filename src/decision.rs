//! Per-cycle decision records.
//!
//! One record per (pair, timeframe, cycle), keyed by a trace id that is
//! stable for the whole cycle. The record is the audit trail: engine scores,
//! resolved weights, every gate's status, sizing arithmetic, and the final
//! action. Emitted as JSONL on the audit stream regardless of log level.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::guard::GateReport;
use crate::logging::audit_record;
use crate::signal::{Bias, EngineSignal, FusedSignal};
use crate::sizing::SizingBreakdown;
use crate::weights::WeightMap;

/// Stable cycle key: every log line, order idempotency key, and decision
/// record of one evaluation shares it.
pub fn trace_id(pair: &str, timeframe: &str, cycle_ts: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pair.as_bytes());
    hasher.update(b"|");
    hasher.update(timeframe.as_bytes());
    hasher.update(b"|");
    hasher.update(cycle_ts.to_string().as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Per-engine scoring trail: raw score, resolved weight, weighted
/// contribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineTrail {
    pub score: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalAction {
    Submitted,
    Blocked,
    Neutral,
}

impl FinalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalAction::Submitted => "submitted",
            FinalAction::Blocked => "blocked",
            FinalAction::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub trace_id: String,
    pub pair: String,
    pub timeframe: String,
    pub cycle_ts: u64,
    /// BTreeMap keeps engine order stable across serializations.
    pub engine_trails: BTreeMap<String, EngineTrail>,
    pub fused_score: f64,
    pub bias: Bias,
    pub veto: bool,
    pub gates: Vec<GateReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizing: Option<SizingBreakdown>,
    pub final_action: FinalAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<&'static str>,
    /// Count of signals dropped before fusion for staleness.
    pub stale_dropped: usize,
    /// Age of the oldest contributing signal at cycle time, in seconds.
    pub max_signal_age_secs: u64,
}

impl DecisionRecord {
    pub fn new(fused: &FusedSignal, cycle_ts: u64) -> Self {
        Self {
            trace_id: trace_id(&fused.pair, &fused.timeframe, cycle_ts),
            pair: fused.pair.clone(),
            timeframe: fused.timeframe.clone(),
            cycle_ts,
            engine_trails: BTreeMap::new(),
            fused_score: fused.score,
            bias: fused.bias,
            veto: fused.veto,
            gates: Vec::new(),
            sizing: None,
            final_action: FinalAction::Neutral,
            block_reason: None,
            stale_dropped: 0,
            max_signal_age_secs: 0,
        }
    }

    pub fn with_engine_trails(mut self, signals: &[EngineSignal], weights: &WeightMap) -> Self {
        for sig in signals {
            let w = weights.get(&sig.id).copied().unwrap_or(1.0);
            self.engine_trails.insert(
                sig.id.as_str().to_string(),
                EngineTrail {
                    score: sig.score,
                    weight: w,
                    contribution: sig.score * w,
                },
            );
            let age = self.cycle_ts.saturating_sub(sig.issued_ts);
            if age > self.max_signal_age_secs {
                self.max_signal_age_secs = age;
            }
        }
        self
    }

    /// Write the record to the audit stream.
    pub fn emit(&self) {
        audit_record(json!({
            "kind": "decision_record",
            "record": self,
        }));
    }
}
