//! Usage telemetry and cost calculation.
//!
//! Converts token usage from a provider call into a [`TelemetryRecord`]
//! using a per-model rate table (cost per 1,000,000 tokens). Telemetry is
//! derived, best-effort data: a missing rate entry means zero cost, and any
//! failure in this path is swallowed and logged - it must never fail the
//! caller's primary operation.

use crate::llm::TokenUsage;
use crate::logging::LogSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cost rates for one model, per 1,000,000 tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRates {
    pub input_cost_per_1m: f64,
    pub output_cost_per_1m: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl ModelRates {
    /// Convenience constructor for USD rates.
    #[must_use]
    pub fn usd(input_cost_per_1m: f64, output_cost_per_1m: f64) -> Self {
        Self {
            input_cost_per_1m,
            output_cost_per_1m,
            currency: default_currency(),
        }
    }
}

/// A computed per-call usage/cost summary. Reporting only - not a billing
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub command_name: String,
    pub provider_name: String,
    pub model_used: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub total_cost: f64,
    pub currency: String,
}

/// Rate table keyed by `(provider, model_id)`, with built-in defaults plus
/// configuration overrides.
#[derive(Debug, Clone, Default)]
pub struct CostTable {
    overrides: HashMap<String, ModelRates>,
}

impl CostTable {
    /// Create a table with only the built-in rates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with overrides keyed `"provider/modelId"`.
    #[must_use]
    pub fn with_overrides(overrides: HashMap<String, ModelRates>) -> Self {
        Self { overrides }
    }

    /// Look up rates for a provider/model pair.
    ///
    /// Overrides win over the built-in table. `None` means the model is
    /// unknown; callers treat that as zero cost, not an error.
    #[must_use]
    pub fn rates(&self, provider: &str, model_id: &str) -> Option<ModelRates> {
        let key = format!("{}/{}", provider.to_lowercase(), model_id);
        if let Some(rates) = self.overrides.get(&key) {
            return Some(rates.clone());
        }
        builtin_rates(provider, model_id)
    }

    /// Compute the cost for a call.
    ///
    /// `total = input*rate_in/1e6 + output*rate_out/1e6`, rounded to six
    /// decimal places. A missing rate entry yields zero cost.
    #[must_use]
    pub fn cost(&self, provider: &str, model_id: &str, usage: TokenUsage) -> (f64, String) {
        match self.rates(provider, model_id) {
            Some(rates) => {
                let total = f64::from(usage.input_tokens) * rates.input_cost_per_1m / 1e6
                    + f64::from(usage.output_tokens) * rates.output_cost_per_1m / 1e6;
                (round6(total), rates.currency)
            }
            None => (0.0, default_currency()),
        }
    }

    /// Build a telemetry record for a completed call. Best-effort: a
    /// missing rate entry is debug-logged and costed at zero; this function
    /// never fails.
    pub fn record(
        &self,
        sink: &dyn LogSink,
        command_name: &str,
        provider_name: &str,
        model_used: &str,
        usage: TokenUsage,
    ) -> TelemetryRecord {
        if self.rates(provider_name, model_used).is_none() {
            sink.debug(&format!(
                "no cost rates for {provider_name}/{model_used}; recording zero cost"
            ));
        }
        let (total_cost, currency) = self.cost(provider_name, model_used, usage);

        TelemetryRecord {
            timestamp: Utc::now(),
            command_name: command_name.to_string(),
            provider_name: provider_name.to_string(),
            model_used: model_used.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
            total_cost,
            currency,
        }
    }
}

/// Round to six decimal places.
fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Built-in rates for commonly used models.
fn builtin_rates(provider: &str, model_id: &str) -> Option<ModelRates> {
    match (provider.to_lowercase().as_str(), model_id) {
        ("anthropic", "claude-opus-4") => Some(ModelRates::usd(15.0, 75.0)),
        ("anthropic", "claude-sonnet-4") => Some(ModelRates::usd(3.0, 15.0)),
        ("anthropic", "claude-haiku-3.5") => Some(ModelRates::usd(0.80, 4.0)),
        ("openai", "gpt-4o") => Some(ModelRates::usd(2.50, 10.0)),
        ("openai", "gpt-4o-mini") => Some(ModelRates::usd(0.15, 0.60)),
        ("openai", "gpt-4-turbo") => Some(ModelRates::usd(10.0, 30.0)),
        ("openai", "o1") => Some(ModelRates::usd(15.0, 60.0)),
        ("openai", "o1-mini") => Some(ModelRates::usd(3.0, 12.0)),
        // Local inference is free.
        ("local", _) => Some(ModelRates::usd(0.0, 0.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{BufferSink, LogLevel};

    fn usage(input: u32, output: u32) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn test_cost_formula_and_rounding() {
        let table = CostTable::new();
        // gpt-4o: 2.50 in / 10.0 out per 1M
        let (cost, currency) = table.cost("openai", "gpt-4o", usage(1_000_000, 100_000));
        assert!((cost - 3.5).abs() < 1e-9);
        assert_eq!(currency, "USD");

        // Tiny usage rounds to six decimal places.
        let (cost, _) = table.cost("openai", "gpt-4o", usage(1, 1));
        assert!((cost - 0.000013).abs() < 1e-12, "got {cost}");
    }

    #[test]
    fn test_unknown_model_is_zero_cost_not_error() {
        let table = CostTable::new();
        let (cost, currency) = table.cost("openai", "gpt-99", usage(5000, 5000));
        assert_eq!(cost, 0.0);
        assert_eq!(currency, "USD");
    }

    #[test]
    fn test_local_models_are_free() {
        let table = CostTable::new();
        let (cost, _) = table.cost("local", "llama3", usage(1_000_000, 1_000_000));
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn test_overrides_win_over_builtins() {
        let mut overrides = HashMap::new();
        overrides.insert("openai/gpt-4o".to_string(), ModelRates::usd(1.0, 2.0));
        let table = CostTable::with_overrides(overrides);

        let (cost, _) = table.cost("openai", "gpt-4o", usage(1_000_000, 1_000_000));
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_provider_lookup_is_case_insensitive() {
        let table = CostTable::new();
        assert!(table.rates("Anthropic", "claude-sonnet-4").is_some());
    }

    #[test]
    fn test_record_populates_all_fields() {
        let sink = BufferSink::default();
        let table = CostTable::new();
        let record = table.record(
            &sink,
            "parse-prd",
            "anthropic",
            "claude-sonnet-4",
            usage(2000, 1000),
        );

        assert_eq!(record.command_name, "parse-prd");
        assert_eq!(record.provider_name, "anthropic");
        assert_eq!(record.model_used, "claude-sonnet-4");
        assert_eq!(record.input_tokens, 2000);
        assert_eq!(record.output_tokens, 1000);
        assert_eq!(record.total_tokens, 3000);
        // 2000*3/1e6 + 1000*15/1e6 = 0.006 + 0.015
        assert!((record.total_cost - 0.021).abs() < 1e-9);
    }

    #[test]
    fn test_record_unknown_model_logs_debug_and_never_fails() {
        let sink = BufferSink::default();
        let table = CostTable::new();
        let record = table.record(&sink, "update-task", "openai", "mystery-model", usage(10, 10));

        assert_eq!(record.total_cost, 0.0);
        assert!(sink.contains(LogLevel::Debug, "mystery-model"));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let sink = BufferSink::default();
        let record =
            CostTable::new().record(&sink, "list", "local", "llama3", usage(1, 1));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"commandName\":\"list\""));
        assert!(json.contains("\"inputTokens\":1"));
        assert!(json.contains("\"totalCost\":0.0"));
    }
}
