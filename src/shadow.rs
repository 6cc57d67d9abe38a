//! Shadow order mirroring.
//!
//! Every live order intent is mirrored into a shadow book that never reaches
//! the broker. Comparing the two books catches divergence between what the
//! pipeline decided and what was actually routed.

use serde::Serialize;

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::pipeline::OrderIntent;

#[derive(Debug, Clone, Serialize, Default)]
pub struct ShadowBook {
    mirrored: Vec<OrderIntent>,
}

impl ShadowBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror an intent into the shadow book, unchanged.
    pub fn mirror(&mut self, intent: &OrderIntent) {
        self.mirrored.push(intent.clone());
    }

    /// Reset for the next cycle. Parity is a per-cycle property; a book that
    /// accumulates across cycles can never match a single cycle's intents.
    pub fn clear(&mut self) {
        self.mirrored.clear();
    }

    pub fn len(&self) -> usize {
        self.mirrored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrored.is_empty()
    }

    pub fn intents(&self) -> &[OrderIntent] {
        &self.mirrored
    }

    /// Field-for-field comparison against the live book. A mismatch is a
    /// warn-level event, never a trading halt.
    pub fn check_parity(&self, live: &[OrderIntent]) -> bool {
        let ok = self.mirrored.len() == live.len()
            && self.mirrored.iter().zip(live).all(|(s, l)| s == l);
        if !ok {
            log(
                Level::Warn,
                Domain::Shadow,
                "parity_mismatch",
                obj(&[
                    ("shadow_count", v_num(self.mirrored.len() as f64)),
                    ("live_count", v_num(live.len() as f64)),
                    (
                        "first_shadow_key",
                        self.mirrored
                            .first()
                            .map(|i| v_str(&i.idempotency_key))
                            .unwrap_or(serde_json::Value::Null),
                    ),
                ]),
            );
        }
        ok
    }
}
