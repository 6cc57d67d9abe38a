//! Layered risk guardrails.
//!
//! A fused signal must pass a fixed sequence of gates before it may become
//! an order. Gates are pure over the account state except for the drawdown
//! gate's one-way kill-switch latch; the cool-off latch is written at trade
//! close, never at gate-check time. Blocks are expected, reportable outcomes
//! with machine-readable reason codes — never errors.

use serde::{Deserialize, Serialize};

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::signal::{Bias, FusedSignal};

// =============================================================================
// Account state
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub pair: String,
    pub direction: Bias,
    pub units: f64,
}

/// Process-wide per-account risk state. Owned by the account actor; gate
/// evaluation and the trade-close entry point are the only writers.
///
/// Persisted across restarts so kill-switch and cool-off semantics survive
/// a process bounce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub peak_nav: f64,
    pub current_nav: f64,
    /// Realized profit this session, signed.
    pub session_profit: f64,
    /// High-water mark of session_profit; giveback is measured against it.
    pub session_profit_peak: f64,
    /// House-money pool: grows on realized wins, shrinks on realized losses,
    /// floors at zero. Never restored by NAV recovery — only new wins re-add.
    pub house_profit: f64,
    pub loss_streak: u32,
    /// Epoch seconds; entries are blocked while now < cool_off_until.
    pub cool_off_until: u64,
    /// One-way latch. Cleared only by the explicit external reset.
    pub kill_switch_active: bool,
    pub open_positions: Vec<OpenPosition>,
}

impl AccountState {
    pub fn new(starting_nav: f64) -> Self {
        Self {
            peak_nav: starting_nav,
            current_nav: starting_nav,
            session_profit: 0.0,
            session_profit_peak: 0.0,
            house_profit: 0.0,
            loss_streak: 0,
            cool_off_until: 0,
            kill_switch_active: false,
            open_positions: Vec::new(),
        }
    }

    pub fn drawdown(&self) -> f64 {
        if self.peak_nav > 0.0 {
            (self.peak_nav - self.current_nav) / self.peak_nav
        } else {
            0.0
        }
    }

    /// Apply a NAV observation from the account provider. Peak only moves up;
    /// an observation above the recorded peak is auto-corrected, never fatal.
    pub fn observe_nav(&mut self, nav: f64) {
        if nav > self.peak_nav {
            log(
                Level::Warn,
                Domain::Risk,
                "peak_nav_corrected",
                obj(&[("old_peak", v_num(self.peak_nav)), ("nav", v_num(nav))]),
            );
            self.peak_nav = nav;
        }
        self.current_nav = nav;
    }

    /// Realized trade result. The only writer of loss_streak, cool_off_until,
    /// session profit and the house-money pool.
    pub fn on_trade_closed(&mut self, pnl: f64, now_ts: u64, cfg: &RiskConfig) {
        self.session_profit += pnl;
        if self.session_profit > self.session_profit_peak {
            self.session_profit_peak = self.session_profit;
        }

        if pnl > 0.0 {
            self.loss_streak = 0;
            self.house_profit += pnl;
        } else if pnl < 0.0 {
            self.loss_streak += 1;
            self.house_profit = (self.house_profit + pnl).max(0.0);
            if self.loss_streak >= cfg.loss_streak_limit {
                self.cool_off_until = now_ts + cfg.cool_off_secs;
                log(
                    Level::Warn,
                    Domain::Risk,
                    "cool_off_set",
                    obj(&[
                        ("loss_streak", v_num(self.loss_streak as f64)),
                        ("until", v_num(self.cool_off_until as f64)),
                    ]),
                );
            }
        }
        // Breakeven closes touch neither the streak nor the pool.
    }

    /// Explicit external reset of the kill switch. Nothing in the gate stack
    /// calls this.
    pub fn reset_kill_switch(&mut self) {
        self.kill_switch_active = false;
        log(Level::Warn, Domain::Risk, "kill_switch_reset", obj(&[]));
    }

    pub fn add_position(&mut self, pos: OpenPosition) {
        self.open_positions.push(pos);
    }

    pub fn remove_position(&mut self, pair: &str, direction: Bias) {
        self.open_positions
            .retain(|p| !(p.pair == pair && p.direction == direction));
    }
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Drawdown fraction that trips the kill switch.
    pub max_drawdown: f64,
    /// Fraction of the session-profit peak that may be given back before new
    /// entries are blocked.
    pub giveback_pct: f64,
    pub loss_streak_limit: u32,
    pub cool_off_secs: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown: 0.05,
            giveback_pct: 0.3,
            loss_streak_limit: 3,
            cool_off_secs: 1800,
        }
    }
}

// =============================================================================
// Gate outcomes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockReason {
    KillSwitch,
    Drawdown,
    ProfitGiveback,
    CoolOff,
    AntiHedge,
    DuplicateSize,
    EngineVeto,
    SizingExhausted,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::KillSwitch => "kill-switch",
            BlockReason::Drawdown => "drawdown",
            BlockReason::ProfitGiveback => "profit-giveback",
            BlockReason::CoolOff => "cool-off",
            BlockReason::AntiHedge => "anti-hedge",
            BlockReason::DuplicateSize => "duplicate-size",
            BlockReason::EngineVeto => "engine-veto",
            BlockReason::SizingExhausted => "sizing-exhausted",
        }
    }
}

/// A gate either lets the decision through, scales its size, or blocks it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateOutcome {
    Pass,
    /// Multiplier applied to the final unit count. None of the base gates
    /// uses this today; the pipeline honors it so a future gate can downsize
    /// instead of blocking.
    Modify(f64),
    Block(BlockReason),
}

/// Per-gate audit entry. Every cycle records one of these for each gate,
/// including gates skipped after the first block.
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub gate: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Approved { size_factor: f64 },
    Blocked(BlockReason),
}

#[derive(Debug, Clone)]
pub struct GateRun {
    pub verdict: Verdict,
    pub reports: Vec<GateReport>,
}

impl GateRun {
    pub fn is_approved(&self) -> bool {
        matches!(self.verdict, Verdict::Approved { .. })
    }

    pub fn block_reason(&self) -> Option<BlockReason> {
        match self.verdict {
            Verdict::Blocked(reason) => Some(reason),
            Verdict::Approved { .. } => None,
        }
    }
}

// =============================================================================
// The gate sequence
// =============================================================================

const GATE_NAMES: [&str; 7] = [
    "kill_switch",
    "drawdown",
    "profit_giveback",
    "cool_off",
    "anti_hedge",
    "duplicate_size",
    "veto_passthrough",
];

/// Run the fixed gate sequence for one cycle. The first block short-circuits
/// the remainder (reported as skipped). `intended_units` is the candidate
/// size the deterministic sizer would produce; the duplicate-size gate needs
/// it to compare against open positions.
///
/// The drawdown gate is the only gate that writes state (the kill-switch
/// latch).
pub fn run_gates(
    fused: &FusedSignal,
    state: &mut AccountState,
    now_ts: u64,
    intended_units: f64,
    cfg: &RiskConfig,
) -> GateRun {
    let mut reports = Vec::with_capacity(GATE_NAMES.len());
    let mut size_factor = 1.0;
    let mut blocked: Option<BlockReason> = None;

    for gate in GATE_NAMES {
        if blocked.is_some() {
            reports.push(GateReport { gate, status: "skip", reason: None });
            continue;
        }
        let outcome = match gate {
            "kill_switch" => gate_kill_switch(state),
            "drawdown" => gate_drawdown(state, cfg),
            "profit_giveback" => gate_profit_giveback(state, cfg),
            "cool_off" => gate_cool_off(state, now_ts),
            "anti_hedge" => gate_anti_hedge(fused, state),
            "duplicate_size" => gate_duplicate_size(fused, state, intended_units),
            "veto_passthrough" => gate_veto_passthrough(fused),
            _ => unreachable!("unknown gate {}", gate),
        };
        match outcome {
            GateOutcome::Pass => {
                reports.push(GateReport { gate, status: "pass", reason: None });
            }
            GateOutcome::Modify(factor) => {
                size_factor *= factor;
                reports.push(GateReport { gate, status: "modify", reason: None });
            }
            GateOutcome::Block(reason) => {
                log(
                    Level::Info,
                    Domain::Risk,
                    "gate_block",
                    obj(&[
                        ("gate", v_str(gate)),
                        ("reason", v_str(reason.as_str())),
                        ("pair", v_str(&fused.pair)),
                        ("timeframe", v_str(&fused.timeframe)),
                    ]),
                );
                reports.push(GateReport { gate, status: "block", reason: Some(reason.as_str()) });
                blocked = Some(reason);
            }
        }
    }

    let verdict = match blocked {
        Some(reason) => Verdict::Blocked(reason),
        None => Verdict::Approved { size_factor },
    };
    GateRun { verdict, reports }
}

fn gate_kill_switch(state: &AccountState) -> GateOutcome {
    if state.kill_switch_active {
        GateOutcome::Block(BlockReason::KillSwitch)
    } else {
        GateOutcome::Pass
    }
}

/// Trips the one-way latch at the drawdown threshold. Flattening open
/// positions is delegated to the broker collaborator.
fn gate_drawdown(state: &mut AccountState, cfg: &RiskConfig) -> GateOutcome {
    let dd = state.drawdown();
    if dd >= cfg.max_drawdown {
        state.kill_switch_active = true;
        log(
            Level::Error,
            Domain::Risk,
            "kill_switch_tripped",
            obj(&[
                ("drawdown", v_num(dd)),
                ("peak_nav", v_num(state.peak_nav)),
                ("current_nav", v_num(state.current_nav)),
            ]),
        );
        GateOutcome::Block(BlockReason::Drawdown)
    } else {
        GateOutcome::Pass
    }
}

/// Blocks new entries once session profit has retraced giveback_pct from its
/// own peak. Existing positions are unaffected.
fn gate_profit_giveback(state: &AccountState, cfg: &RiskConfig) -> GateOutcome {
    if state.session_profit_peak <= 0.0 {
        return GateOutcome::Pass;
    }
    let retraced = state.session_profit_peak - state.session_profit;
    if retraced >= cfg.giveback_pct * state.session_profit_peak {
        GateOutcome::Block(BlockReason::ProfitGiveback)
    } else {
        GateOutcome::Pass
    }
}

/// Reads the latch only; the write happens in on_trade_closed.
fn gate_cool_off(state: &AccountState, now_ts: u64) -> GateOutcome {
    if now_ts < state.cool_off_until {
        GateOutcome::Block(BlockReason::CoolOff)
    } else {
        GateOutcome::Pass
    }
}

fn gate_anti_hedge(fused: &FusedSignal, state: &AccountState) -> GateOutcome {
    if fused.bias == Bias::Neutral {
        return GateOutcome::Pass;
    }
    let opposite = match fused.bias {
        Bias::Long => Bias::Short,
        Bias::Short => Bias::Long,
        Bias::Neutral => unreachable!(),
    };
    if state
        .open_positions
        .iter()
        .any(|p| p.pair == fused.pair && p.direction == opposite)
    {
        GateOutcome::Block(BlockReason::AntiHedge)
    } else {
        GateOutcome::Pass
    }
}

/// Prevents redundant stacking: an identical (pair, direction, units)
/// position already open blocks the new entry. Unit counts come from the
/// same deterministic sizer, so exact equality is the right comparison.
fn gate_duplicate_size(
    fused: &FusedSignal,
    state: &AccountState,
    intended_units: f64,
) -> GateOutcome {
    if fused.bias == Bias::Neutral {
        return GateOutcome::Pass;
    }
    if state
        .open_positions
        .iter()
        .any(|p| p.pair == fused.pair && p.direction == fused.bias && p.units == intended_units)
    {
        GateOutcome::Block(BlockReason::DuplicateSize)
    } else {
        GateOutcome::Pass
    }
}

/// Veto is computed upstream in fusion; it blocks here so the decision record
/// reports all suppressions through one reason-code vocabulary.
fn gate_veto_passthrough(fused: &FusedSignal) -> GateOutcome {
    if fused.veto {
        GateOutcome::Block(BlockReason::EngineVeto)
    } else {
        GateOutcome::Pass
    }
}
