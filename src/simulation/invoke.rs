//! Resilient invocation of the generation endpoint.
//!
//! One attempt is one gateway call followed by JSON repair. Transport failures and
//! undecodable output share the same attempt budget and backoff schedule.

use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::SimulationError;
use crate::gateway::{ChatGateway, ChatRequest, FinishReason, ProviderError};
use crate::repair::{repair_json, RepairError};

/// Attempt budget and backoff unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Wait after failed attempt number `attempt` (1-based): `base * 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.pow(attempt.min(5));
    base * multiplier
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    FailFast,
}

/// Failure of a single attempt.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Decode(#[from] RepairError),
}

/// Transient upstream statuses and undecodable output are retried; everything else fails fast.
pub fn classify(err: &InvokeError) -> RetryDecision {
    match err {
        InvokeError::Decode(_) => RetryDecision::Retry,
        InvokeError::Provider(e) if e.is_transient() => RetryDecision::Retry,
        InvokeError::Provider(_) => RetryDecision::FailFast,
    }
}

pub struct ResilientInvoker<'a> {
    gateway: &'a dyn ChatGateway,
    policy: RetryPolicy,
}

impl<'a> ResilientInvoker<'a> {
    pub fn new(gateway: &'a dyn ChatGateway, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Call the model until a JSON value comes back or the budget runs out.
    pub async fn invoke_json(&self, req: ChatRequest) -> Result<Value, SimulationError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let caller = req.attribution.caller;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.attempt(req.clone()).await {
                Ok(value) => {
                    debug!(caller, attempt, "model returned decodable JSON");
                    return Ok(value);
                }
                Err(err) => err,
            };

            let decision = classify(&err);
            if decision == RetryDecision::FailFast || attempt >= max_attempts {
                error!(
                    caller,
                    attempt,
                    max_attempts,
                    retryable = decision == RetryDecision::Retry,
                    error = %err,
                    "model call failed"
                );
                return Err(SimulationError::Upstream {
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.delay_for(&err, attempt);
            warn!(
                caller,
                attempt,
                max_attempts,
                wait_ms = delay.as_millis() as u64,
                error = %err,
                "model call failed (retryable)"
            );
            sleep(delay).await;
        }
    }

    async fn attempt(&self, req: ChatRequest) -> Result<Value, InvokeError> {
        let resp = self.gateway.chat(req).await?;
        if resp.finish_reason == FinishReason::Length {
            info!(
                output_tokens = resp.output_tokens,
                "model output hit the token limit; repairing"
            );
        }
        Ok(repair_json(&resp.content)?)
    }

    fn delay_for(&self, err: &InvokeError, attempt: u32) -> Duration {
        let backoff = backoff_delay(self.policy.base_delay, attempt);
        match err {
            InvokeError::Provider(ProviderError::RateLimited {
                retry_after: Some(retry_after),
                ..
            }) => backoff.max(*retry_after),
            _ => backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::gateway::{Attribution, ChatModel, ChatResponse, ErrorContext, Message};

    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl ChatGateway for ScriptedGateway {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted");
            next.map(|content| ChatResponse {
                content,
                ..ChatResponse::empty()
            })
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::new(
            ChatModel::openrouter("google/gemini-2.5-pro"),
            vec![Message::user("analyse")],
            Attribution::new("test"),
        )
    }

    fn http_error(status: u16) -> ProviderError {
        ProviderError::provider_with_context(
            "openrouter",
            format!("HTTP {status}: upstream"),
            status >= 500,
            ErrorContext::new().with_status(status),
        )
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 9), Duration::from_secs(32));
        assert_eq!(backoff_delay(Duration::ZERO, 3), Duration::ZERO);
    }

    #[test]
    fn classifier_decisions() {
        assert_eq!(classify(&http_error(500).into()), RetryDecision::Retry);
        assert_eq!(classify(&http_error(503).into()), RetryDecision::Retry);
        assert_eq!(classify(&http_error(400).into()), RetryDecision::FailFast);
        assert_eq!(
            classify(&ProviderError::provider("openrouter", "upstream said 429", false).into()),
            RetryDecision::Retry
        );
        assert_eq!(
            classify(&ProviderError::refused("policy").into()),
            RetryDecision::FailFast
        );
        let decode = repair_json("nope").unwrap_err();
        assert_eq!(classify(&decode.into()), RetryDecision::Retry);
    }

    #[test]
    fn rate_limit_wait_defaults_to_backoff() {
        let gateway = ScriptedGateway::new(vec![]);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let invoker = ResilientInvoker::new(&gateway, policy);

        let no_header: InvokeError =
            ProviderError::rate_limited(None, ErrorContext::new().with_status(429)).into();
        assert_eq!(invoker.delay_for(&no_header, 1), Duration::from_millis(2));
        assert_eq!(invoker.delay_for(&no_header, 2), Duration::from_millis(4));

        let with_header: InvokeError = ProviderError::rate_limited(
            Some(Duration::from_secs(7)),
            ErrorContext::new().with_status(429),
        )
        .into();
        assert_eq!(invoker.delay_for(&with_header, 1), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let gateway = ScriptedGateway::new(vec![
            Err(http_error(503)),
            Ok(r#"{"risks": []}"#.to_string()),
        ]);
        let invoker = ResilientInvoker::new(&gateway, RetryPolicy::default());
        let value = invoker.invoke_json(request()).await.unwrap();
        assert_eq!(value["risks"], serde_json::json!([]));
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failures_share_the_budget() {
        let gateway = ScriptedGateway::new(vec![
            Ok("not json".to_string()),
            Err(http_error(500)),
            Ok("still not json".to_string()),
        ]);
        let invoker = ResilientInvoker::new(&gateway, RetryPolicy::default());
        let err = invoker.invoke_json(request()).await.unwrap_err();
        match err {
            SimulationError::Upstream { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, InvokeError::Decode(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_fails_fast() {
        let gateway = ScriptedGateway::new(vec![Err(http_error(400))]);
        let invoker = ResilientInvoker::new(&gateway, RetryPolicy::default());
        let err = invoker.invoke_json(request()).await.unwrap_err();
        assert!(matches!(err, SimulationError::Upstream { attempts: 1, .. }));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_output_is_repaired_without_retry() {
        let gateway = ScriptedGateway::new(vec![Ok(r#"{"risks":[{"title":"a"},"#.to_string())]);
        let invoker = ResilientInvoker::new(&gateway, RetryPolicy::default());
        let value = invoker.invoke_json(request()).await.unwrap();
        assert_eq!(value["risks"].as_array().unwrap().len(), 1);
        assert_eq!(gateway.calls(), 1);
    }
}
