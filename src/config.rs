//! Runtime configuration.
//!
//! Everything tunable comes from the environment with sane defaults, in the
//! `VAR.ok().and_then(parse).unwrap_or(default)` style. The one exception is
//! the static weight table: an empty table at startup is the single fatal
//! configuration error this system has.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::fuse::{FreezeCalendar, OrderPolicy};
use crate::guard::RiskConfig;
use crate::signal::EngineId;
use crate::sizing::SizingConfig;
use crate::weights::{WeightLayers, WeightMap};

#[derive(Debug, Clone)]
pub struct Config {
    pub pairs: Vec<String>,
    pub timeframe: String,
    pub cycle_secs: u64,
    pub sqlite_path: String,
    pub starting_nav: f64,
    pub base_allocation: f64,
    pub max_risk_per_trade: f64,
    pub leverage_cap: f64,
    pub max_drawdown: f64,
    pub giveback_pct: f64,
    pub loss_streak_limit: u32,
    pub cool_off_secs: u64,
    pub sl_pips: f64,
    pub tp_pips: f64,
    pub limit_ttl_min: u32,
    pub stop_ttl_min: u32,
    /// Path to a JSON weight-layer file; absent means built-in statics only.
    pub weights_file: Option<String>,
    /// News-freeze windows as half-open [start, end) epoch-second pairs.
    pub freeze_windows: Vec<(u64, u64)>,
}

// FREEZE_WINDOWS="1700000000-1700003600,1700086400-1700090000". Malformed
// entries are dropped; an unparseable list degrades to no freezes.
fn parse_freeze_windows(raw: &str) -> Vec<(u64, u64)> {
    raw.split(',')
        .filter_map(|w| {
            let (start, end) = w.trim().split_once('-')?;
            let start: u64 = start.trim().parse().ok()?;
            let end: u64 = end.trim().parse().ok()?;
            (start < end).then_some((start, end))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            pairs: std::env::var("PAIRS")
                .unwrap_or_else(|_| "EUR_USD,GBP_USD,USD_JPY".to_string())
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            timeframe: std::env::var("TIMEFRAME").unwrap_or_else(|_| "M5".to_string()),
            cycle_secs: std::env::var("CYCLE_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./fusefx.sqlite".to_string()),
            starting_nav: std::env::var("STARTING_NAV").ok().and_then(|v| v.parse().ok()).unwrap_or(10_000.0),
            base_allocation: std::env::var("BASE_ALLOCATION").ok().and_then(|v| v.parse().ok()).unwrap_or(1_000.0),
            max_risk_per_trade: std::env::var("MAX_RISK_PER_TRADE").ok().and_then(|v| v.parse().ok()).unwrap_or(0.02),
            leverage_cap: std::env::var("LEVERAGE_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(50.0),
            max_drawdown: std::env::var("MAX_DRAWDOWN").ok().and_then(|v| v.parse().ok()).unwrap_or(0.05),
            giveback_pct: std::env::var("GIVEBACK_PCT").ok().and_then(|v| v.parse().ok()).unwrap_or(0.3),
            loss_streak_limit: std::env::var("LOSS_STREAK_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(3),
            cool_off_secs: std::env::var("COOL_OFF_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(1_800),
            sl_pips: std::env::var("SL_PIPS").ok().and_then(|v| v.parse().ok()).unwrap_or(15.0),
            tp_pips: std::env::var("TP_PIPS").ok().and_then(|v| v.parse().ok()).unwrap_or(30.0),
            limit_ttl_min: std::env::var("LIMIT_TTL_MIN").ok().and_then(|v| v.parse().ok()).unwrap_or(45),
            stop_ttl_min: std::env::var("STOP_TTL_MIN").ok().and_then(|v| v.parse().ok()).unwrap_or(90),
            weights_file: std::env::var("WEIGHTS_FILE").ok(),
            freeze_windows: std::env::var("FREEZE_WINDOWS")
                .map(|raw| parse_freeze_windows(&raw))
                .unwrap_or_default(),
        }
    }

    pub fn risk(&self) -> RiskConfig {
        RiskConfig {
            max_drawdown: self.max_drawdown,
            giveback_pct: self.giveback_pct,
            loss_streak_limit: self.loss_streak_limit,
            cool_off_secs: self.cool_off_secs,
        }
    }

    pub fn sizing(&self) -> SizingConfig {
        SizingConfig {
            base_allocation: self.base_allocation,
            max_risk_per_trade: self.max_risk_per_trade,
            leverage_cap: self.leverage_cap,
        }
    }

    pub fn freeze_calendar(&self) -> FreezeCalendar {
        FreezeCalendar::new(self.freeze_windows.clone())
    }

    pub fn order_policy(&self) -> OrderPolicy {
        OrderPolicy {
            sl_pips: self.sl_pips,
            tp_pips: self.tp_pips,
            limit_ttl_min: self.limit_ttl_min,
            stop_ttl_min: self.stop_ttl_min,
        }
    }

    /// Short fingerprint of the effective config, logged at startup so runs
    /// are comparable after the fact.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self).as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

// =============================================================================
// Weight layers
// =============================================================================

/// Shipped static weights, the bottom layer of resolution. Correlation is
/// negative: that engine scores with the dollar index, against the pair.
pub fn builtin_static_weights() -> WeightMap {
    let mut map = WeightMap::new();
    map.insert(EngineId::Environment, 0.6);
    map.insert(EngineId::Correlation, -0.8);
    map.insert(EngineId::Technical, 1.4);
    map.insert(EngineId::Fundamental, 1.0);
    map.insert(EngineId::MarketType, 0.8);
    map.insert(EngineId::Execution, 0.5);
    map.insert(EngineId::TradeMgmt, 0.7);
    map.insert(EngineId::Volume, 0.9);
    map.insert(EngineId::Conditional, 0.6);
    map.insert(EngineId::Psychology, 0.4);
    map
}

// Serde-friendly mirror of WeightLayers, keyed by engine-id strings. A
// present-but-empty statics table is distinguishable from an absent one.
#[derive(Debug, Default, serde::Deserialize)]
struct WeightLayersFile {
    #[serde(default)]
    statics: Option<HashMap<EngineId, f64>>,
    #[serde(default)]
    global: HashMap<EngineId, f64>,
    #[serde(default)]
    per_pair: HashMap<String, HashMap<EngineId, f64>>,
    #[serde(default)]
    per_pair_tf: HashMap<String, HashMap<EngineId, f64>>,
}

/// Build the weight layers: built-in statics, optionally overridden and
/// extended from the configured JSON file. An empty static table after
/// loading is fatal; no other weight problem is.
pub fn load_weight_layers(cfg: &Config) -> Result<WeightLayers> {
    let mut layers = WeightLayers {
        statics: builtin_static_weights(),
        ..Default::default()
    };

    if let Some(path) = &cfg.weights_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading weights file {}", path))?;
        let file: WeightLayersFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing weights file {}", path))?;
        if let Some(statics) = file.statics {
            layers.statics = statics;
        }
        layers.global = file.global;
        layers.per_pair = file.per_pair;
        layers.per_pair_tf = file.per_pair_tf;
    }

    if layers.statics.is_empty() {
        bail!("static weight table is empty; refusing to start");
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_statics_cover_all_engines() {
        let statics = builtin_static_weights();
        for id in EngineId::ALL {
            assert!(statics.contains_key(&id), "missing weight for {}", id.as_str());
        }
    }

    #[test]
    fn test_load_builtin_layers() {
        let cfg = Config { weights_file: None, ..test_config() };
        let layers = load_weight_layers(&cfg).expect("builtin layers load");
        assert_eq!(layers.statics.len(), 10);
        assert!(layers.global.is_empty());
    }

    #[test]
    fn test_weights_file_overrides_layers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("weights.json");
        let mut file = std::fs::File::create(&path).expect("create");
        write!(
            file,
            r#"{{
                "global": {{"technical": 2.0}},
                "per_pair_tf": {{"EUR_USD_M5": {{"volume": 1.5}}}}
            }}"#
        )
        .expect("write");

        let cfg = Config {
            weights_file: Some(path.to_string_lossy().into_owned()),
            ..test_config()
        };
        let layers = load_weight_layers(&cfg).expect("load");
        assert_eq!(layers.global[&EngineId::Technical], 2.0);
        assert_eq!(layers.per_pair_tf["EUR_USD_M5"][&EngineId::Volume], 1.5);
        assert_eq!(layers.statics.len(), 10, "builtin statics kept");
    }

    #[test]
    fn test_empty_static_table_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("weights.json");
        std::fs::write(&path, r#"{"statics": {}}"#).expect("write");
        let cfg = Config {
            weights_file: Some(path.to_string_lossy().into_owned()),
            ..test_config()
        };
        let err = load_weight_layers(&cfg).expect_err("empty statics must refuse startup");
        assert!(err.to_string().contains("static weight table"));
    }

    #[test]
    fn test_parse_freeze_windows() {
        let windows = parse_freeze_windows("100-200, 300-400");
        assert_eq!(windows, vec![(100, 200), (300, 400)]);

        let cfg = Config { freeze_windows: windows, ..test_config() };
        let cal = cfg.freeze_calendar();
        assert!(cal.is_frozen(150));
        assert!(!cal.is_frozen(200), "window is half-open");
        assert!(!cal.is_frozen(250));
    }

    #[test]
    fn test_malformed_freeze_windows_dropped() {
        assert_eq!(parse_freeze_windows("100-200,junk,400-300,500"), vec![(100, 200)]);
        assert!(parse_freeze_windows("").is_empty());
    }

    #[test]
    fn test_config_hash_changes_with_values() {
        let a = test_config();
        let mut b = test_config();
        b.leverage_cap = 25.0;
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), test_config().hash());
    }

    fn test_config() -> Config {
        Config {
            pairs: vec!["EUR_USD".to_string()],
            timeframe: "M5".to_string(),
            cycle_secs: 300,
            sqlite_path: ":memory:".to_string(),
            starting_nav: 10_000.0,
            base_allocation: 1_000.0,
            max_risk_per_trade: 0.02,
            leverage_cap: 50.0,
            max_drawdown: 0.05,
            giveback_pct: 0.3,
            loss_streak_limit: 3,
            cool_off_secs: 1_800,
            sl_pips: 15.0,
            tp_pips: 30.0,
            limit_ttl_min: 45,
            stop_ttl_min: 90,
            weights_file: None,
            freeze_windows: Vec::new(),
        }
    }
}
