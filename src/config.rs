//! Engine configuration from the environment.

use std::str::FromStr;
use std::time::Duration;

use crate::simulation::invoke::RetryPolicy;

pub const DEFAULT_MODEL: &str = "google/gemini-2.5-pro";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 16_384;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// OpenRouter model id.
    pub model: String,
    pub retry: RetryPolicy,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    /// Fan out one call per risk category, then synthesize.
    pub multi_agent: bool,
    /// Look up weather when the request does not carry it.
    pub fetch_weather: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            retry: RetryPolicy::default(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            multi_agent: false,
            fetch_weather: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `FLOWGUARD_*` and `USE_MULTI_AGENT`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model: std::env::var("FLOWGUARD_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.model),
            retry: RetryPolicy {
                max_attempts: env_parse("FLOWGUARD_MAX_RETRIES")
                    .unwrap_or(defaults.retry.max_attempts),
                base_delay: env_parse::<f64>("FLOWGUARD_RETRY_BASE_SECONDS")
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .map(Duration::from_secs_f64)
                    .unwrap_or(defaults.retry.base_delay),
            },
            temperature: env_parse("FLOWGUARD_TEMPERATURE").unwrap_or(defaults.temperature),
            top_p: defaults.top_p,
            max_output_tokens: env_parse("FLOWGUARD_MAX_OUTPUT_TOKENS")
                .unwrap_or(defaults.max_output_tokens),
            multi_agent: std::env::var("USE_MULTI_AGENT")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            fetch_weather: defaults.fetch_weather,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    pub fn with_multi_agent(mut self, enabled: bool) -> Self {
        self.multi_agent = enabled;
        self
    }

    pub fn with_weather_lookup(mut self, enabled: bool) -> Self {
        self.fetch_weather = enabled;
        self
    }
}

/// `1`, `true`, `yes` (any case, surrounding whitespace ignored).
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy(" TRUE "));
        assert!(is_truthy("yes"));
        assert!(!is_truthy("on"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn builders_override_defaults() {
        let cfg = EngineConfig::default()
            .with_model("google/gemini-2.5-flash")
            .with_max_attempts(5)
            .with_retry_base_delay(Duration::ZERO)
            .with_multi_agent(true)
            .with_weather_lookup(false);
        assert_eq!(cfg.model, "google/gemini-2.5-flash");
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay, Duration::ZERO);
        assert!(cfg.multi_agent);
        assert!(!cfg.fetch_weather);
        assert_eq!(cfg.max_output_tokens, DEFAULT_MAX_OUTPUT_TOKENS);
    }
}
