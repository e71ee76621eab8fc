//! Provider gateway for the external generation call.
//!
//! One `chat` call is one upstream attempt. Retry and backoff live in
//! [`crate::simulation::invoke`], where transport and decode failures share a budget.

pub mod error;
pub mod openrouter;
pub mod pricing;
pub mod types;
pub mod usage;

use std::sync::Arc;

use openrouter::{ChatProvider, OpenRouterAdapter};

pub use error::{ErrorContext, ProviderError, TRANSIENT_STATUSES};
pub use pricing::*;
pub use types::*;
pub use usage::{CallStatus, NoopUsageSink, ProviderCallRecord, TracingUsageSink, UsageSink};

#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

pub struct ProviderGateway<U: UsageSink> {
    openrouter: OpenRouterAdapter,
    usage_sink: Arc<U>,
}

#[async_trait::async_trait]
impl<U: UsageSink> ChatGateway for ProviderGateway<U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl<U: UsageSink> ProviderGateway<U> {
    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        let openrouter = OpenRouterAdapter::from_env()?;
        Ok(Self::new(openrouter, usage_sink))
    }

    pub fn new(openrouter: OpenRouterAdapter, usage_sink: Arc<U>) -> Self {
        Self {
            openrouter,
            usage_sink,
        }
    }

    /// One upstream attempt. Success and failure are both recorded to the usage sink.
    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let result = self.openrouter.chat(&req).await;
        let record = match &result {
            Ok(resp) => ProviderCallRecord::success(&req, resp),
            Err(err) => ProviderCallRecord::failure(&req, err.code()),
        };
        self.usage_sink.record(record).await;
        result
    }
}
