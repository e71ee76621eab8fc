//! Event risk simulation pipeline.
//!
//! prompt -> resilient invoke -> repair -> normalize -> analytics, optionally
//! replacing the single call with the per-category fan-out in [`orchestrator`].

pub mod analytics;
pub mod invoke;
pub mod normalize;
pub mod orchestrator;
pub mod translate;
pub mod types;
pub mod validate;

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest};
use crate::prompts::{analysis_prompt, PromptInstance};
use crate::schedule::EventSchedule;
use crate::weather::WeatherProvider;
use analytics::Analytics;
use invoke::{InvokeError, ResilientInvoker};
use normalize::normalize_assessment;
use orchestrator::Orchestrator;
use types::{centroid, count_by_category, SimulationRequest, SimulationResponse, WeatherSnapshot};

/// Terminal failure of a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Rejected before any model call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The model call failed, after retries when the failure was retryable.
    #[error("upstream failure after {attempts} attempt(s): {source}")]
    Upstream {
        attempts: u32,
        #[source]
        source: InvokeError,
    },
}

/// JSON-mode chat request for a rendered prompt with the engine's sampling settings.
pub(crate) fn chat_request(
    config: &EngineConfig,
    prompt: &PromptInstance,
    attribution: Attribution,
) -> ChatRequest {
    ChatRequest::new(
        ChatModel::openrouter(&config.model),
        prompt.to_messages(),
        attribution,
    )
    .temperature(config.temperature)
    .top_p(config.top_p)
    .max_tokens(config.max_output_tokens)
    .json()
}

pub struct RiskEngine {
    gateway: Arc<dyn ChatGateway>,
    weather: Arc<dyn WeatherProvider>,
    config: EngineConfig,
}

impl RiskEngine {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        weather: Arc<dyn WeatherProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            gateway,
            weather,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &dyn ChatGateway {
        self.gateway.as_ref()
    }

    /// Run one simulation in the configured mode.
    pub async fn run_simulation(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulationResponse, SimulationError> {
        self.run(request, self.config.multi_agent).await
    }

    /// Single analysis call covering all categories.
    pub async fn run_single(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulationResponse, SimulationError> {
        self.run(request, false).await
    }

    /// Per-category fan-out plus synthesis. Only input validation can fail.
    pub async fn run_multi_agent(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulationResponse, SimulationError> {
        self.run(request, true).await
    }

    async fn run(
        &self,
        request: &SimulationRequest,
        multi_agent: bool,
    ) -> Result<SimulationResponse, SimulationError> {
        request.validate()?;

        let simulation_id = Uuid::new_v4();
        info!(
            %simulation_id,
            event = %request.event_name,
            multi_agent,
            "starting simulation"
        );

        let weather = self.resolve_weather(request).await;
        let attribution = Attribution::new("simulation::analyze").with_simulation(simulation_id);

        let raw = if multi_agent {
            Orchestrator::new(self.gateway.as_ref(), &self.config, attribution)
                .run(request, weather.as_ref())
                .await
        } else {
            let prompt = analysis_prompt(request, weather.as_ref());
            let req = chat_request(&self.config, &prompt, attribution);
            ResilientInvoker::new(self.gateway.as_ref(), self.config.retry)
                .invoke_json(req)
                .await?
        };

        Ok(build_response(simulation_id, request, &raw, weather))
    }

    /// Fetched weather, only when the request lacks any of the three weather fields.
    async fn resolve_weather(&self, request: &SimulationRequest) -> Option<WeatherSnapshot> {
        if request.supplied_weather().is_some() || !self.config.fetch_weather {
            return None;
        }
        let center = centroid(&request.polygon).unwrap_or_default();
        let timestamp =
            EventSchedule::parse(&request.date_time).lookup_timestamp(&request.date_time);
        Some(
            self.weather
                .weather_at(center.lat, center.lng, &timestamp)
                .await,
        )
    }
}

/// Assemble the response from a raw model result. Pure apart from id minting.
pub fn build_response(
    simulation_id: Uuid,
    request: &SimulationRequest,
    raw: &Value,
    weather_used: Option<WeatherSnapshot>,
) -> SimulationResponse {
    let assessment = normalize_assessment(raw);
    let analytics = Analytics::derive(
        &assessment.risks,
        assessment.overall_risk_score,
        &request.date_time,
    );

    info!(
        %simulation_id,
        risks = assessment.risks.len(),
        score = assessment.overall_risk_score,
        "simulation complete"
    );

    SimulationResponse {
        simulation_id: simulation_id.to_string(),
        event_name: request.event_name.clone(),
        event_location: request.event_location.clone(),
        date_time: request.date_time.clone(),
        risk_count_by_category: count_by_category(&assessment.risks),
        risks: assessment.risks,
        overall_risk_score: assessment.overall_risk_score,
        summary: assessment.summary,
        recommendations: assessment.recommendations,
        weather_used,
        locale: request.locale,
        risk_factor_breakdowns: analytics.risk_factor_breakdowns,
        risk_time_series: analytics.risk_time_series,
        bottlenecks: analytics.bottlenecks,
        mitigation_tasks: analytics.mitigation_tasks,
        mitigation_impacts: analytics.mitigation_impacts,
        danger_points: analytics.danger_points,
    }
}
