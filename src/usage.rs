//! Token and cost accounting from an agent's event stream.
//!
//! pi-coding-agent in json mode prints one event per line; assistant
//! `message_end` events carry a `usage` object:
//!
//! ```json
//! {"type":"message_end","message":{"role":"assistant","usage":{"input":812,"output":95,"cacheRead":0,"cacheWrite":0,"cost":{"total":0.0039}}}}
//! ```
//!
//! When no usage is reported the summary is estimated from the amount of
//! assistant content and flagged as such. Factory droid never reports usage;
//! its numbers are always estimated from the instruction and log sizes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input tokens assumed when estimating.
const ESTIMATED_INPUT_TOKENS: u64 = 500;

/// Floor for estimated output tokens.
const MIN_ESTIMATED_OUTPUT_TOKENS: u64 = 100;

/// Droid cost per 1k tokens, matched against the resolved model id.
const DROID_RATES: &[(&str, f64)] = &[
    ("opus", 0.015),
    ("haiku", 0.0008),
    ("gpt-5", 0.01),
    ("droid-core", 0.002),
    ("sonnet", 0.003),
];

const DROID_DEFAULT_RATE: f64 = 0.003;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost_usd: f64,
    /// Assistant turns that reported usage.
    pub turns: u64,
    /// True when the numbers are a rough estimate rather than reported.
    pub estimated: bool,
}

/// Sum reported usage over the log, falling back to an estimate.
pub fn summarize(log_text: &str, provider: Option<&str>) -> UsageSummary {
    let mut summary = UsageSummary::default();
    let mut assistant_chars = 0u64;

    for line in log_text.lines() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let Some(message) = event.get("message") else {
            continue;
        };
        if message.get("role").and_then(Value::as_str) != Some("assistant") {
            continue;
        }

        if let Some(content) = message.get("content") {
            assistant_chars += match content {
                Value::String(s) => s.chars().count() as u64,
                other => other.to_string().chars().count() as u64,
            };
        }

        if event.get("type").and_then(Value::as_str) == Some("message_end")
            && let Some(usage) = message.get("usage")
        {
            summary.input_tokens += count(usage, "input");
            summary.output_tokens += count(usage, "output");
            summary.cache_read_tokens += count(usage, "cacheRead");
            summary.cache_write_tokens += count(usage, "cacheWrite");
            summary.cost_usd += cost(usage);
            summary.turns += 1;
        }
    }

    if summary.input_tokens == 0 && summary.output_tokens == 0 {
        tracing::debug!("no usage reported in output; estimating");
        return estimate(assistant_chars, provider);
    }
    summary
}

fn count(usage: &Value, key: &str) -> u64 {
    usage.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn cost(usage: &Value) -> f64 {
    match usage.get("cost") {
        Some(Value::Object(parts)) => parts.get("total").and_then(Value::as_f64).unwrap_or(0.0),
        Some(other) => other.as_f64().unwrap_or(0.0),
        None => 0.0,
    }
}

fn estimate(assistant_chars: u64, provider: Option<&str>) -> UsageSummary {
    let output_per_1k = match provider {
        Some("anthropic") => 0.015,
        Some("openai") => 0.002,
        Some("google") => 0.001,
        Some("groq") => 0.0,
        _ => 0.002,
    };
    let input_per_1k = output_per_1k / 5.0;

    let input_tokens = ESTIMATED_INPUT_TOKENS;
    let output_tokens = (assistant_chars / 4).max(MIN_ESTIMATED_OUTPUT_TOKENS);

    UsageSummary {
        input_tokens,
        output_tokens,
        cost_usd: (input_tokens as f64 / 1000.0) * input_per_1k
            + (output_tokens as f64 / 1000.0) * output_per_1k,
        estimated: true,
        ..Default::default()
    }
}

/// Rough droid usage: four characters per token on both sides, one flat rate.
pub fn estimate_droid(instruction: &str, log_text: &str, droid_model: &str) -> UsageSummary {
    let input_tokens = match instruction.chars().count() as u64 {
        0 => 0,
        chars => (chars / 4).max(1),
    };
    let output_tokens = log_text.chars().count() as u64 / 4;

    let model = droid_model.to_ascii_lowercase();
    let rate = DROID_RATES
        .iter()
        .find(|(family, _)| model.contains(family))
        .map_or(DROID_DEFAULT_RATE, |(_, rate)| *rate);

    UsageSummary {
        input_tokens,
        output_tokens,
        cost_usd: (input_tokens + output_tokens) as f64 / 1000.0 * rate,
        estimated: true,
        ..Default::default()
    }
}
