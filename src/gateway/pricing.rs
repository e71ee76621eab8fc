//! Per-token prices for the models the engine is run with.
//!
//! Costs are in nanodollars (1e-9 USD) per token. Only used for usage records;
//! nothing in the pipeline gates on cost.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_nanos_per_token: i64,
    pub output_nanos_per_token: i64,
}

impl ModelPricing {
    const fn new(input: i64, output: i64) -> Self {
        Self {
            input_nanos_per_token: input,
            output_nanos_per_token: output,
        }
    }

    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> i64 {
        i64::from(input_tokens) * self.input_nanos_per_token
            + i64::from(output_tokens) * self.output_nanos_per_token
    }
}

// OpenRouter list prices per 1M tokens (input / output):
// gemini-2.5-pro $1.25 / $10.00, gemini-2.5-flash $0.30 / $2.50,
// gemini-2.5-flash-lite $0.10 / $0.40, gemini-3-pro-preview $2.00 / $12.00.
const PRICES: &[(&str, ModelPricing)] = &[
    ("google/gemini-2.5-pro", ModelPricing::new(1_250, 10_000)),
    ("google/gemini-2.5-flash", ModelPricing::new(300, 2_500)),
    ("google/gemini-2.5-flash-lite", ModelPricing::new(100, 400)),
    ("google/gemini-3-pro-preview", ModelPricing::new(2_000, 12_000)),
];

/// Charged for models missing from the table.
const FALLBACK: ModelPricing = ModelPricing::new(1_000, 5_000);

pub fn get_pricing(model_id: &str) -> Option<ModelPricing> {
    PRICES
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, pricing)| *pricing)
}

pub fn chat_cost(model: &str, input_tokens: u32, output_tokens: u32) -> i64 {
    get_pricing(model)
        .unwrap_or(FALLBACK)
        .calculate_cost(input_tokens, output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        // 1000 * 1250 + 1000 * 10000
        assert_eq!(chat_cost("google/gemini-2.5-pro", 1_000, 1_000), 11_250_000);
    }

    #[test]
    fn unknown_model_uses_fallback() {
        assert_eq!(get_pricing("vendor/unknown"), None);
        assert_eq!(chat_cost("vendor/unknown", 1, 1), 6_000);
    }
}
