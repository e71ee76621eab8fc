//! Per-call usage records.
//!
//! `ProviderGateway` hands one [`ProviderCallRecord`] per upstream attempt to a
//! [`UsageSink`]. The CLI logs them with [`TracingUsageSink`]; tests discard them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{ChatRequest, ChatResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// One upstream attempt.
#[derive(Debug, Clone)]
pub struct ProviderCallRecord {
    pub provider: &'static str,
    pub model: String,
    pub caller: &'static str,
    pub simulation_id: Option<Uuid>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Nanodollars (1e-9 USD).
    pub cost_nanodollars: i64,
    pub latency_ms: u64,
    pub status: CallStatus,
    /// `ProviderError::code` when the attempt failed.
    pub error_code: Option<&'static str>,
    pub timestamp: DateTime<Utc>,
}

impl ProviderCallRecord {
    fn base(req: &ChatRequest, status: CallStatus) -> Self {
        Self {
            provider: req.model.provider(),
            model: req.model.model_id().to_string(),
            caller: req.attribution.caller,
            simulation_id: req.attribution.simulation_id,
            input_tokens: 0,
            output_tokens: 0,
            cost_nanodollars: 0,
            latency_ms: 0,
            status,
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn success(req: &ChatRequest, resp: &ChatResponse) -> Self {
        Self {
            input_tokens: resp.input_tokens,
            output_tokens: resp.output_tokens,
            cost_nanodollars: resp.cost_nanodollars,
            latency_ms: u64::try_from(resp.latency.as_millis()).unwrap_or(u64::MAX),
            ..Self::base(req, CallStatus::Success)
        }
    }

    pub fn failure(req: &ChatRequest, error_code: &'static str) -> Self {
        Self {
            error_code: Some(error_code),
            ..Self::base(req, CallStatus::Error)
        }
    }
}

/// Destination for usage records. Recording is fire-and-forget.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: ProviderCallRecord);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {}
}

/// Emits one `tracing` event per call; failures at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        match record.status {
            CallStatus::Success => tracing::info!(
                provider = record.provider,
                model = %record.model,
                caller = record.caller,
                simulation_id = ?record.simulation_id,
                input_tokens = record.input_tokens,
                output_tokens = record.output_tokens,
                cost_nanos = record.cost_nanodollars,
                latency_ms = record.latency_ms,
                "provider call"
            ),
            CallStatus::Error => tracing::warn!(
                provider = record.provider,
                model = %record.model,
                caller = record.caller,
                simulation_id = ?record.simulation_id,
                error_code = record.error_code.unwrap_or("unknown"),
                "provider call failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::types::{Attribution, ChatModel, Message};

    #[test]
    fn records_carry_attribution() {
        let sim = Uuid::new_v4();
        let req = ChatRequest::new(
            ChatModel::openrouter("google/gemini-2.5-flash"),
            vec![Message::user("hi")],
            Attribution::new("simulation::analyze").with_simulation(sim),
        );

        let resp = ChatResponse {
            input_tokens: 12,
            output_tokens: 34,
            ..ChatResponse::empty()
        };
        let ok = ProviderCallRecord::success(&req, &resp);
        assert_eq!(ok.status, CallStatus::Success);
        assert_eq!(ok.simulation_id, Some(sim));
        assert_eq!(ok.caller, "simulation::analyze");
        assert_eq!((ok.input_tokens, ok.output_tokens), (12, 34));

        let failed = ProviderCallRecord::failure(&req, "rate_limited");
        assert_eq!(failed.status, CallStatus::Error);
        assert_eq!(failed.error_code, Some("rate_limited"));
        assert_eq!(failed.model, "google/gemini-2.5-flash");
    }
}
