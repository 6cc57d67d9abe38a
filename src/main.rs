use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use tokio::time::{sleep, Duration};

use fusefx::account::{spawn, AccountActorConfig, AccountHandle};
use fusefx::config::{load_weight_layers, Config};
use fusefx::engines::{registry, EngineContext};
use fusefx::guard::AccountState;
use fusefx::logging::{log, obj, v_num, v_str, Domain, Level};
use fusefx::pipeline::{NullRouter, Pipeline};
use fusefx::sizing::PositionSizer;
use fusefx::storage::StateStore;

fn now_ts() -> u64 {
    Utc::now().timestamp() as u64
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let weights = load_weight_layers(&cfg)?;

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("config_hash", v_str(&cfg.hash())),
            ("pairs", v_str(&cfg.pairs.join(","))),
            ("timeframe", v_str(&cfg.timeframe)),
            ("cycle_secs", v_num(cfg.cycle_secs as f64)),
        ]),
    );

    let mut store = StateStore::new(&cfg.sqlite_path)?;
    store.init()?;
    let state = match store.load()? {
        Some(state) => {
            log(
                Level::Info,
                Domain::System,
                "state_recovered",
                obj(&[
                    ("kill_switch", serde_json::Value::Bool(state.kill_switch_active)),
                    ("loss_streak", v_num(state.loss_streak as f64)),
                    ("cool_off_until", v_num(state.cool_off_until as f64)),
                ]),
            );
            state
        }
        None => AccountState::new(cfg.starting_nav),
    };

    let sizer = PositionSizer::new(cfg.sizing());
    let actor_cfg = AccountActorConfig {
        risk: cfg.risk(),
        base_allocation: cfg.base_allocation,
    };
    let (account, actor_task) = spawn(state, sizer, actor_cfg, Some(store));

    // One pipeline per pair; pairs evaluate in parallel, account mutations
    // serialize through the actor.
    let mut pair_tasks = Vec::new();
    for pair in cfg.pairs.clone() {
        let pipeline = Pipeline::new(
            registry(),
            weights.clone(),
            cfg.freeze_calendar(),
            cfg.order_policy(),
            Box::new(NullRouter),
        );
        pair_tasks.push(tokio::spawn(run_pair(
            pair,
            cfg.timeframe.clone(),
            cfg.cycle_secs,
            pipeline,
            account.clone(),
        )));
    }

    for task in pair_tasks {
        let _ = task.await;
    }
    drop(account);
    let _ = actor_task.await;
    Ok(())
}

async fn run_pair(
    pair: String,
    timeframe: String,
    cycle_secs: u64,
    mut pipeline: Pipeline,
    account: AccountHandle,
) {
    loop {
        let ctx = synthetic_context(&pair, &timeframe, now_ts());
        let entry_price = synthetic_price(&pair);
        match pipeline.evaluate_cycle(&ctx, entry_price, &account).await {
            Ok(outcome) => {
                log(
                    Level::Info,
                    Domain::System,
                    "cycle_done",
                    obj(&[
                        ("pair", v_str(&pair)),
                        ("trace_id", v_str(&outcome.record.trace_id)),
                        ("action", v_str(outcome.record.final_action.as_str())),
                        ("intents", v_num(outcome.intents.len() as f64)),
                    ]),
                );
            }
            Err(err) => {
                log(
                    Level::Error,
                    Domain::System,
                    "cycle_failed",
                    obj(&[("pair", v_str(&pair)), ("error", v_str(&err.to_string()))]),
                );
            }
        }
        sleep(Duration::from_secs(cycle_secs)).await;
    }
}

// Synthetic market context for dry runs; a data collaborator replaces this
// in a live deployment.
fn synthetic_context(pair: &str, timeframe: &str, cycle_ts: u64) -> EngineContext {
    let mut rng = rand::thread_rng();
    let mid = synthetic_price(pair);
    EngineContext {
        pair: pair.to_string(),
        timeframe: timeframe.to_string(),
        cycle_ts,
        rsi: rng.gen_range(25.0..75.0),
        adx: rng.gen_range(10.0..45.0),
        ema20: mid * rng.gen_range(0.998..1.002),
        ema50: mid * rng.gen_range(0.998..1.002),
        atr_pips: rng.gen_range(2.0..20.0),
        spread_pips: rng.gen_range(0.4..3.5),
        volume_ratio: rng.gen_range(0.5..2.0),
        correlation_dxy: rng.gen_range(-0.9..0.9),
        macro_sentiment: rng.gen_range(-0.6..0.6),
        session_active: true,
        trending: rng.gen_bool(0.4),
        key_level_distance_pips: rng.gen_range(-1.0..40.0),
        recent_win_rate: rng.gen_range(0.3..0.7),
        open_position_count: 0,
    }
}

fn synthetic_price(pair: &str) -> f64 {
    if pair.contains("JPY") {
        148.50
    } else {
        1.0850
    }
}
