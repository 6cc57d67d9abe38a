//! Single-writer account actor.
//!
//! All reads and writes of `AccountState` serialize through one mpsc channel.
//! `Evaluate` runs the entire gate sequence plus sizing as one command, so a
//! `TradeClosed` arriving mid-evaluation can never interleave with the gate
//! checks. Cross-pair evaluations run in parallel up to this channel and
//! queue here.

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::guard::{
    run_gates, AccountState, BlockReason, GateReport, GateRun, OpenPosition, RiskConfig, Verdict,
};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::signal::{Bias, FusedSignal};
use crate::sizing::{BankInput, PositionSizer, SizeOutcome, SizingBreakdown};
use crate::storage::StateStore;

/// Result of one atomic evaluate command: the gate trail plus sizing when
/// the decision survived the gates.
#[derive(Debug)]
pub struct EvalReply {
    pub gate_run: GateRun,
    pub units: Option<f64>,
    pub sizing: Option<SizingBreakdown>,
}

enum Command {
    Evaluate {
        fused: FusedSignal,
        entry_price: f64,
        sl_pips: f64,
        now_ts: u64,
        respond: oneshot::Sender<EvalReply>,
    },
    TradeClosed {
        pnl: f64,
        now_ts: u64,
    },
    NavObserved {
        nav: f64,
    },
    PositionOpened {
        pos: OpenPosition,
    },
    PositionClosed {
        pair: String,
        direction: Bias,
    },
    Snapshot {
        respond: oneshot::Sender<AccountState>,
    },
    ResetKillSwitch,
}

#[derive(Clone)]
pub struct AccountHandle {
    tx: mpsc::Sender<Command>,
}

impl AccountHandle {
    pub async fn evaluate(
        &self,
        fused: FusedSignal,
        entry_price: f64,
        sl_pips: f64,
        now_ts: u64,
    ) -> Result<EvalReply> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(Command::Evaluate { fused, entry_price, sl_pips, now_ts, respond })
            .await
            .map_err(|_| anyhow!("account actor gone"))?;
        rx.await.map_err(|_| anyhow!("account actor dropped reply"))
    }

    pub async fn trade_closed(&self, pnl: f64, now_ts: u64) -> Result<()> {
        self.tx
            .send(Command::TradeClosed { pnl, now_ts })
            .await
            .map_err(|_| anyhow!("account actor gone"))
    }

    pub async fn observe_nav(&self, nav: f64) -> Result<()> {
        self.tx
            .send(Command::NavObserved { nav })
            .await
            .map_err(|_| anyhow!("account actor gone"))
    }

    pub async fn position_opened(&self, pos: OpenPosition) -> Result<()> {
        self.tx
            .send(Command::PositionOpened { pos })
            .await
            .map_err(|_| anyhow!("account actor gone"))
    }

    pub async fn position_closed(&self, pair: &str, direction: Bias) -> Result<()> {
        self.tx
            .send(Command::PositionClosed { pair: pair.to_string(), direction })
            .await
            .map_err(|_| anyhow!("account actor gone"))
    }

    pub async fn snapshot(&self) -> Result<AccountState> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { respond })
            .await
            .map_err(|_| anyhow!("account actor gone"))?;
        rx.await.map_err(|_| anyhow!("account actor dropped reply"))
    }

    pub async fn reset_kill_switch(&self) -> Result<()> {
        self.tx
            .send(Command::ResetKillSwitch)
            .await
            .map_err(|_| anyhow!("account actor gone"))
    }
}

pub struct AccountActorConfig {
    pub risk: RiskConfig,
    pub base_allocation: f64,
}

/// Spawn the actor. `store` is optional so tests can run without a database;
/// when present, state is persisted after every mutating command.
pub fn spawn(
    state: AccountState,
    sizer: PositionSizer,
    cfg: AccountActorConfig,
    store: Option<StateStore>,
) -> (AccountHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let task = tokio::spawn(run(state, sizer, cfg, store, rx));
    (AccountHandle { tx }, task)
}

async fn run(
    mut state: AccountState,
    sizer: PositionSizer,
    cfg: AccountActorConfig,
    mut store: Option<StateStore>,
    mut rx: mpsc::Receiver<Command>,
) {
    while let Some(cmd) = rx.recv().await {
        let mutated = match cmd {
            Command::Evaluate { fused, entry_price, sl_pips, now_ts, respond } => {
                let reply = evaluate(&fused, entry_price, sl_pips, now_ts, &mut state, &sizer, &cfg);
                let _ = respond.send(reply);
                true
            }
            Command::TradeClosed { pnl, now_ts } => {
                state.on_trade_closed(pnl, now_ts, &cfg.risk);
                true
            }
            Command::NavObserved { nav } => {
                state.observe_nav(nav);
                true
            }
            Command::PositionOpened { pos } => {
                state.add_position(pos);
                true
            }
            Command::PositionClosed { pair, direction } => {
                state.remove_position(&pair, direction);
                true
            }
            Command::Snapshot { respond } => {
                let _ = respond.send(state.clone());
                false
            }
            Command::ResetKillSwitch => {
                state.reset_kill_switch();
                true
            }
        };
        if mutated {
            if let Some(store) = store.as_mut() {
                if let Err(err) = store.save(&state) {
                    log(
                        Level::Error,
                        Domain::System,
                        "state_persist_failed",
                        obj(&[("error", v_str(&err.to_string()))]),
                    );
                }
            }
        }
    }
}

/// The atomic evaluation: candidate sizing, the gate sequence, final sizing.
/// Sizing exhaustion after an approved gate run is downgraded to a block so
/// every suppression shares the reason-code vocabulary.
fn evaluate(
    fused: &FusedSignal,
    entry_price: f64,
    sl_pips: f64,
    now_ts: u64,
    state: &mut AccountState,
    sizer: &PositionSizer,
    cfg: &AccountActorConfig,
) -> EvalReply {
    let bank = BankInput {
        base_allocation: cfg.base_allocation,
        house_profit: state.house_profit,
    };
    let candidate = sizer.candidate_units(&fused.pair, entry_price, sl_pips, bank);
    let mut gate_run = run_gates(fused, state, now_ts, candidate, &cfg.risk);

    let (units, sizing) = match gate_run.verdict {
        Verdict::Approved { size_factor } if fused.bias != Bias::Neutral => {
            match sizer.size(&fused.pair, entry_price, sl_pips, bank) {
                SizeOutcome::Sized { units, breakdown } => {
                    let scaled = (units * size_factor).floor();
                    if scaled <= 0.0 {
                        block_exhausted(&mut gate_run);
                        (None, Some(breakdown))
                    } else {
                        (Some(scaled), Some(breakdown))
                    }
                }
                SizeOutcome::Exhausted => {
                    block_exhausted(&mut gate_run);
                    (None, None)
                }
            }
        }
        _ => (None, None),
    };

    EvalReply { gate_run, units, sizing }
}

fn block_exhausted(gate_run: &mut GateRun) {
    gate_run.verdict = Verdict::Blocked(BlockReason::SizingExhausted);
    gate_run.reports.push(GateReport {
        gate: "sizer",
        status: "block",
        reason: Some(BlockReason::SizingExhausted.as_str()),
    });
}
