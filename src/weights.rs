//! Per-pair / per-timeframe weight resolution.
//!
//! Four layers, increasing specificity: static < global < per-pair <
//! per-pair-timeframe. Resolution is a right-biased merge: a more specific
//! layer overwrites keys it carries, absent keys fall through. No
//! normalization happens here; fusion divides by the total weight itself.
//! Negative weights are legal and invert an engine's contribution (used for
//! engines whose bias convention is inverted, e.g. correlation vs DXY).

use std::collections::HashMap;

use crate::signal::EngineId;

pub type WeightMap = HashMap<EngineId, f64>;

/// Layered weight tables as supplied by config and the learning collaborator.
/// `per_pair` is keyed by pair ("EUR_USD"); `per_pair_tf` by pair and
/// timeframe joined with an underscore ("EUR_USD_M5").
#[derive(Debug, Clone, Default)]
pub struct WeightLayers {
    pub statics: WeightMap,
    pub global: WeightMap,
    pub per_pair: HashMap<String, WeightMap>,
    pub per_pair_tf: HashMap<String, WeightMap>,
}

pub fn pair_tf_key(pair: &str, timeframe: &str) -> String {
    format!("{}_{}", pair, timeframe)
}

/// Merge the four layers for one (pair, timeframe). Missing layers or keys
/// simply fall through; there are no failure modes.
pub fn resolve_weights(pair: &str, timeframe: &str, layers: &WeightLayers) -> WeightMap {
    let mut merged = layers.statics.clone();
    for (id, w) in &layers.global {
        merged.insert(*id, *w);
    }
    if let Some(pw) = layers.per_pair.get(pair) {
        for (id, w) in pw {
            merged.insert(*id, *w);
        }
    }
    if let Some(tw) = layers.per_pair_tf.get(&pair_tf_key(pair, timeframe)) {
        for (id, w) in tw {
            merged.insert(*id, *w);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(EngineId, f64)]) -> WeightMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_most_specific_layer_wins() {
        let mut layers = WeightLayers {
            statics: map(&[(EngineId::Technical, 1.0), (EngineId::Volume, 0.5)]),
            global: map(&[(EngineId::Technical, 1.2)]),
            ..Default::default()
        };
        layers
            .per_pair
            .insert("EUR_USD".to_string(), map(&[(EngineId::Technical, 1.5)]));
        layers
            .per_pair_tf
            .insert("EUR_USD_M5".to_string(), map(&[(EngineId::Technical, 2.0)]));

        let resolved = resolve_weights("EUR_USD", "M5", &layers);
        assert_eq!(resolved[&EngineId::Technical], 2.0, "per-pair-tf must win");
        assert_eq!(resolved[&EngineId::Volume], 0.5, "unshadowed static survives");
    }

    #[test]
    fn test_fallthrough_when_specific_layers_missing() {
        let layers = WeightLayers {
            statics: map(&[(EngineId::Psychology, 0.3)]),
            global: map(&[(EngineId::Correlation, -1.0)]),
            ..Default::default()
        };
        let resolved = resolve_weights("GBP_JPY", "H1", &layers);
        assert_eq!(resolved[&EngineId::Psychology], 0.3);
        assert_eq!(resolved[&EngineId::Correlation], -1.0);
        assert!(!resolved.contains_key(&EngineId::Technical));
    }

    #[test]
    fn test_pair_tf_layer_scoped_to_its_pair() {
        let mut layers = WeightLayers::default();
        layers
            .per_pair_tf
            .insert("EUR_USD_M5".to_string(), map(&[(EngineId::Volume, 9.0)]));

        let other = resolve_weights("USD_JPY", "M5", &layers);
        assert!(other.is_empty(), "EUR_USD_M5 weights must not leak to USD_JPY");
    }

    #[test]
    fn test_negative_weight_preserved() {
        let layers = WeightLayers {
            statics: map(&[(EngineId::Correlation, -0.8)]),
            ..Default::default()
        };
        let resolved = resolve_weights("EUR_USD", "M5", &layers);
        assert_eq!(resolved[&EngineId::Correlation], -0.8);
    }

    #[test]
    fn test_no_normalization_at_resolution() {
        let layers = WeightLayers {
            statics: map(&[(EngineId::Technical, 3.0), (EngineId::Volume, 3.0)]),
            ..Default::default()
        };
        let resolved = resolve_weights("EUR_USD", "M5", &layers);
        let total: f64 = resolved.values().sum();
        assert_eq!(total, 6.0, "resolver must not normalize");
    }
}
