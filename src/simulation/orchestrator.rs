//! Multi-agent mode: one analysis call per risk category, then a synthesis call.
//!
//! Category calls run concurrently and fail independently. A failed category is
//! dropped from the merge; a failed synthesis falls back to default summary fields.

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::invoke::ResilientInvoker;
use super::normalize::{DEFAULT_OVERALL_SCORE, DEFAULT_SUMMARY};
use super::types::{RiskCategory, SimulationRequest, WeatherSnapshot};
use super::{chat_request, SimulationError};
use crate::config::EngineConfig;
use crate::gateway::{Attribution, ChatGateway};
use crate::prompts::{category_prompt, synthesis_prompt};

/// Outcome of one category agent.
#[derive(Debug)]
pub struct CategoryOutcome {
    pub category: RiskCategory,
    pub result: Result<Vec<Value>, SimulationError>,
}

/// Concatenate risks from successful categories in category order. No dedup.
pub fn merge_outcomes(outcomes: Vec<CategoryOutcome>) -> Vec<Value> {
    let total = outcomes.len();
    let mut failed = 0;
    let mut merged = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(risks) => merged.extend(risks),
            Err(err) => {
                failed += 1;
                warn!(category = %outcome.category, error = %err, "category agent failed");
            }
        }
    }
    info!(
        risks = merged.len(),
        categories = total,
        failed,
        "merged category agent results"
    );
    merged
}

/// Top-level fields from a synthesis reply, defaulting any that are missing.
pub fn synthesis_fields(synthesis: Option<&Value>) -> (Value, Value, Value) {
    let field = |key: &str| {
        synthesis
            .and_then(|s| s.get(key))
            .filter(|v| !v.is_null())
            .cloned()
    };
    (
        field("overall_risk_score").unwrap_or_else(|| json!(DEFAULT_OVERALL_SCORE)),
        field("summary").unwrap_or_else(|| json!(DEFAULT_SUMMARY)),
        field("recommendations").unwrap_or_else(|| json!([])),
    )
}

pub struct Orchestrator<'a> {
    gateway: &'a dyn ChatGateway,
    config: &'a EngineConfig,
    attribution: Attribution,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        gateway: &'a dyn ChatGateway,
        config: &'a EngineConfig,
        attribution: Attribution,
    ) -> Self {
        Self {
            gateway,
            config,
            attribution,
        }
    }

    /// Fan out, merge, synthesize. Returns a raw result shaped like a single-call reply.
    pub async fn run(
        &self,
        request: &SimulationRequest,
        weather: Option<&WeatherSnapshot>,
    ) -> Value {
        let outcomes = self.fan_out(request, weather).await;
        let risks = merge_outcomes(outcomes);
        let synthesis = self.synthesize(&risks, request).await;
        let (overall_risk_score, summary, recommendations) = synthesis_fields(synthesis.as_ref());

        json!({
            "risks": risks,
            "overall_risk_score": overall_risk_score,
            "summary": summary,
            "recommendations": recommendations,
        })
    }

    /// One invocation per category, all in flight at once. Results keep category order.
    pub async fn fan_out(
        &self,
        request: &SimulationRequest,
        weather: Option<&WeatherSnapshot>,
    ) -> Vec<CategoryOutcome> {
        stream::iter(RiskCategory::ALL)
            .map(|category| async move {
                let result = self.analyze_category(request, category, weather).await;
                CategoryOutcome { category, result }
            })
            .buffered(RiskCategory::ALL.len())
            .collect()
            .await
    }

    async fn analyze_category(
        &self,
        request: &SimulationRequest,
        category: RiskCategory,
        weather: Option<&WeatherSnapshot>,
    ) -> Result<Vec<Value>, SimulationError> {
        let prompt = category_prompt(request, category, weather);
        let attribution = Attribution {
            caller: "orchestrator::category",
            ..self.attribution.clone()
        };
        let req = chat_request(self.config, &prompt, attribution);
        let value = ResilientInvoker::new(self.gateway, self.config.retry)
            .invoke_json(req)
            .await?;

        let risks = value
            .get("risks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        info!(category = %category, risks = risks.len(), "category agent finished");
        Ok(risks)
    }

    async fn synthesize(&self, risks: &[Value], request: &SimulationRequest) -> Option<Value> {
        let prompt = synthesis_prompt(risks, request);
        let attribution = Attribution {
            caller: "orchestrator::synthesis",
            ..self.attribution.clone()
        };
        let req = chat_request(self.config, &prompt, attribution);
        match ResilientInvoker::new(self.gateway, self.config.retry)
            .invoke_json(req)
            .await
        {
            Ok(value) if value.is_object() => Some(value),
            Ok(_) => {
                warn!("synthesis reply was not an object; using defaults");
                None
            }
            Err(err) => {
                warn!(error = %err, "synthesis failed; using defaults");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChatRequest, ChatResponse, ProviderError};
    use crate::repair::repair_json;
    use crate::simulation::invoke::InvokeError;
    use crate::simulation::types::{AudienceType, EventType, LatLng, Locale};
    use std::time::Duration;

    /// Answers each category agent with one risk; `operational` and the
    /// synthesis call are refused.
    struct CategoryGateway;

    #[async_trait::async_trait]
    impl ChatGateway for CategoryGateway {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            let user = req.user_content().unwrap_or_default();
            let category = RiskCategory::ALL
                .into_iter()
                .find(|c| user.contains(&format!("specialist for the \"{c}\"")));
            match category {
                Some(RiskCategory::Operational) | None => {
                    Err(ProviderError::invalid_request("blocked"))
                }
                Some(c) => Ok(ChatResponse {
                    content: json!({"risks": [{"category": c.as_str(), "title": c.as_str()}]})
                        .to_string(),
                    ..ChatResponse::empty()
                }),
            }
        }
    }

    fn request() -> SimulationRequest {
        SimulationRequest {
            event_name: "Nagoya Castle Summer Night".to_string(),
            event_type: EventType::Exhibition,
            event_location: "Meijo Park".to_string(),
            date_time: "2026-08-14T18:00 - 21:00".to_string(),
            expected_attendance: 12_000,
            audience_type: AudienceType::Family,
            temperature_celsius: None,
            precipitation_probability: None,
            weather_condition: None,
            polygon: vec![
                LatLng::new(35.185, 136.899),
                LatLng::new(35.186, 136.901),
                LatLng::new(35.184, 136.902),
            ],
            additional_notes: String::new(),
            locale: Locale::En,
            role: None,
            alert_threshold: None,
        }
    }

    #[tokio::test]
    async fn failed_category_and_synthesis_degrade_to_defaults() {
        let config = EngineConfig::default().with_retry_base_delay(Duration::ZERO);
        let orchestrator =
            Orchestrator::new(&CategoryGateway, &config, Attribution::new("test"));

        let raw = orchestrator.run(&request(), None).await;

        let titles: Vec<_> = raw["risks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["title"].as_str().unwrap())
            .collect();
        assert_eq!(
            titles,
            [
                "crowd_safety",
                "traffic_logistics",
                "environmental_health",
                "visibility",
                "legal_compliance"
            ]
        );
        assert_eq!(raw["overall_risk_score"], json!(DEFAULT_OVERALL_SCORE));
        assert_eq!(raw["summary"], json!(DEFAULT_SUMMARY));
        assert_eq!(raw["recommendations"], json!([]));
    }

    fn failed() -> Result<Vec<Value>, SimulationError> {
        Err(SimulationError::Upstream {
            attempts: 3,
            source: InvokeError::Decode(repair_json("nope").unwrap_err()),
        })
    }

    #[test]
    fn merge_skips_failures_and_keeps_order() {
        let outcomes = vec![
            CategoryOutcome {
                category: RiskCategory::CrowdSafety,
                result: Ok(vec![json!({"title": "a"}), json!({"title": "b"})]),
            },
            CategoryOutcome {
                category: RiskCategory::TrafficLogistics,
                result: failed(),
            },
            CategoryOutcome {
                category: RiskCategory::Visibility,
                result: Ok(vec![json!({"title": "c"})]),
            },
        ];
        let merged = merge_outcomes(outcomes);
        let titles: Vec<_> = merged.iter().map(|r| r["title"].as_str().unwrap()).collect();
        assert_eq!(titles, ["a", "b", "c"]);
    }

    #[test]
    fn synthesis_defaults() {
        let (score, summary, recs) = synthesis_fields(None);
        assert_eq!(score, json!(DEFAULT_OVERALL_SCORE));
        assert_eq!(summary, json!(DEFAULT_SUMMARY));
        assert_eq!(recs, json!([]));

        let reply = json!({"overall_risk_score": 7.5, "summary": null});
        let (score, summary, _) = synthesis_fields(Some(&reply));
        assert_eq!(score, json!(7.5));
        assert_eq!(summary, json!(DEFAULT_SUMMARY));
    }
}
