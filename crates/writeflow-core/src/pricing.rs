//! Model pricing registry.
//!
//! Text prices are USD per million tokens. Image prices are USD per image.

use std::collections::HashMap;
use std::sync::OnceLock;

use writeflow_ai_harness::{ModelRef, TokenUsage};

/// Monetary cost of a text call. Stands in for an external cost service.
pub trait CostAccumulator: Send + Sync {
    fn cost_usd(&self, model: &ModelRef, usage: &TokenUsage) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub cached_input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    const fn new(input: f64, cached: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            cached_input_per_million: cached,
            output_per_million: output,
        }
    }

    pub fn calculate_cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million
            + usage.cached_input_tokens as f64 * self.cached_input_per_million
            + usage.output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

// OpenAI
const GPT_4O: ModelPricing = ModelPricing::new(2.50, 1.25, 10.00);
const GPT_4O_MINI: ModelPricing = ModelPricing::new(0.15, 0.075, 0.60);
const GPT_4_1: ModelPricing = ModelPricing::new(2.00, 0.50, 8.00);
const GPT_4_1_MINI: ModelPricing = ModelPricing::new(0.40, 0.10, 1.60);
// Anthropic (no cached accounting reported on the wire)
const CLAUDE_35_SONNET: ModelPricing = ModelPricing::new(3.00, 3.00, 15.00);
const CLAUDE_35_HAIKU: ModelPricing = ModelPricing::new(0.80, 0.80, 4.00);
const CLAUDE_3_OPUS: ModelPricing = ModelPricing::new(15.00, 15.00, 75.00);
// Google
const GEMINI_15_PRO: ModelPricing = ModelPricing::new(1.25, 1.25, 5.00);
const GEMINI_15_FLASH: ModelPricing = ModelPricing::new(0.075, 0.075, 0.30);
const GEMINI_20_FLASH: ModelPricing = ModelPricing::new(0.10, 0.10, 0.40);
// Mistral
const MISTRAL_LARGE: ModelPricing = ModelPricing::new(2.00, 2.00, 6.00);
const MISTRAL_SMALL: ModelPricing = ModelPricing::new(0.20, 0.20, 0.60);
const CODESTRAL: ModelPricing = ModelPricing::new(0.30, 0.30, 0.90);

/// Used for models missing from the table.
pub const DEFAULT_PRICING: ModelPricing = GPT_4O_MINI;

static PRICING_MAP: OnceLock<HashMap<&'static str, ModelPricing>> = OnceLock::new();

fn init_pricing() -> HashMap<&'static str, ModelPricing> {
    let mut map = HashMap::new();

    map.insert("openai/gpt-4o", GPT_4O);
    map.insert("openai/gpt-4o-mini", GPT_4O_MINI);
    map.insert("openai/gpt-4.1", GPT_4_1);
    map.insert("openai/gpt-4.1-mini", GPT_4_1_MINI);

    map.insert("anthropic/claude-3-5-sonnet-latest", CLAUDE_35_SONNET);
    map.insert("anthropic/claude-3-5-sonnet-20241022", CLAUDE_35_SONNET);
    map.insert("anthropic/claude-3-5-haiku-latest", CLAUDE_35_HAIKU);
    map.insert("anthropic/claude-3-opus-latest", CLAUDE_3_OPUS);

    map.insert("google/gemini-1.5-pro", GEMINI_15_PRO);
    map.insert("google/gemini-1.5-flash", GEMINI_15_FLASH);
    map.insert("google/gemini-2.0-flash", GEMINI_20_FLASH);

    map.insert("mistral/mistral-large-latest", MISTRAL_LARGE);
    map.insert("mistral/mistral-small-latest", MISTRAL_SMALL);
    map.insert("mistral/codestral-latest", CODESTRAL);

    map
}

/// Get pricing for `provider/model`.
pub fn get_pricing(model: &ModelRef) -> Option<ModelPricing> {
    let map = PRICING_MAP.get_or_init(init_pricing);
    map.get(model.to_string().as_str()).copied()
}

/// Default [`CostAccumulator`] backed by the static table above.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingTable;

impl CostAccumulator for PricingTable {
    fn cost_usd(&self, model: &ModelRef, usage: &TokenUsage) -> f64 {
        get_pricing(model)
            .unwrap_or(DEFAULT_PRICING)
            .calculate_cost(usage)
    }
}

/// Fallback for image model/size pairs missing from the table.
pub const DEFAULT_IMAGE_COST_USD: f64 = 0.040;

/// Fixed per-image price by model and resolution.
pub fn image_cost(model: &str, size: &str) -> f64 {
    match (model, size) {
        ("dall-e-3", "1024x1024") => 0.040,
        ("dall-e-3", "1792x1024" | "1024x1792") => 0.080,
        ("dall-e-2", "1024x1024") => 0.020,
        ("dall-e-2", "512x512") => 0.018,
        ("dall-e-2", "256x256") => 0.016,
        ("gpt-image-1", "1024x1024") => 0.042,
        ("gpt-image-1", "1792x1024" | "1024x1792" | "1536x1024" | "1024x1536") => 0.063,
        _ => DEFAULT_IMAGE_COST_USD,
    }
}
