//! Pluggable per-provider cost normalization (SPEC_FULL.md §9, Open
//! Question 1). The `Provider` trait only tags usage with provider/model;
//! turning that into a dollar figure is a separate, swappable function so a
//! full pricing engine can be layered in later without touching the trait.

use std::collections::HashMap;

use crate::types::ProviderUsage;

pub type CostFn = fn(model: &str, usage_total_tokens: i64) -> f64;

/// Flat per-million-token rate table. Not a complete pricing engine — real
/// per-input/output/cache rates are a provider concern outside this crate's
/// scope — but enough to attach a comparable cost figure to every turn.
#[derive(Clone)]
pub struct CostTable {
    per_million_tokens: HashMap<String, f64>,
    default_rate: f64,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            per_million_tokens: HashMap::new(),
            default_rate: 3.0,
        }
    }
}

impl CostTable {
    pub fn with_rate(mut self, model: impl Into<String>, dollars_per_million_tokens: f64) -> Self {
        self.per_million_tokens.insert(model.into(), dollars_per_million_tokens);
        self
    }

    pub fn cost_for(&self, usage: &ProviderUsage) -> f64 {
        let rate = self
            .per_million_tokens
            .get(&usage.model)
            .copied()
            .unwrap_or(self.default_rate);
        (usage.usage.total() as f64 / 1_000_000.0) * rate
    }
}
