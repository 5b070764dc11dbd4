//! Per-model pricing (spec §3 `ModelConfig.pricing`, §2 "compute cost").
//! The pricing catalog itself is a collaborator's concern (spec §1 names
//! "pricing-catalog loader" as out of scope); this only defines the rate
//! shape embedded in routing config and the arithmetic that turns token
//! counts into `cost_micros`.

use serde::{Deserialize, Serialize};

/// Rates in micros (1/1,000,000th of the provider's billing currency unit)
/// per million tokens, matching the `cost_micros` integer column so no
/// floating point enters the usage ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelPricing {
    pub input_per_million_micros: i64,
    #[serde(default)]
    pub cached_input_per_million_micros: Option<i64>,
    pub output_per_million_micros: i64,
    #[serde(default)]
    pub reasoning_per_million_micros: Option<i64>,
}

impl ModelPricing {
    /// Token counts times per-million rate, divided back down to a single
    /// cost in micros. `cached`/`reasoning` fall back to the input/output
    /// rate respectively when the catalog doesn't break them out.
    pub fn cost_micros(&self, input_tokens: u64, output_tokens: u64, cached_tokens: u64, reasoning_tokens: u64) -> i64 {
        let cached_rate = self.cached_input_per_million_micros.unwrap_or(self.input_per_million_micros);
        let reasoning_rate = self.reasoning_per_million_micros.unwrap_or(self.output_per_million_micros);
        let billable_input = input_tokens.saturating_sub(cached_tokens);
        let mut total = billable_input as i128 * self.input_per_million_micros as i128;
        total += cached_tokens as i128 * cached_rate as i128;
        total += output_tokens as i128 * self.output_per_million_micros as i128;
        total += reasoning_tokens as i128 * reasoning_rate as i128;
        (total / 1_000_000) as i64
    }
}
