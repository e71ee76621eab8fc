//! English translation of a finished simulation.
//!
//! The response is sent in chunks so each reply stays well under the output limit:
//! the head fields, then risks five at a time, then tasks, bottlenecks, and slot
//! labels concurrently. Replies are matched back by position; anything missing or
//! mistyped keeps the original text.

use serde_json::{json, Value};
use tracing::info;

use super::chat_request;
use super::types::{Locale, SimulationResponse};
use crate::config::EngineConfig;
use crate::gateway::{Attribution, ChatGateway, ProviderError};
use crate::prompts::translation_prompt;
use crate::repair::strip_code_fence;

/// Risks per translation call.
pub const RISK_BATCH_SIZE: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("translation chunk was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub async fn translate_simulation_to_english(
    gateway: &dyn ChatGateway,
    config: &EngineConfig,
    response: &SimulationResponse,
) -> Result<SimulationResponse, TranslateError> {
    Translator { gateway, config }.translate(response).await
}

struct Translator<'a> {
    gateway: &'a dyn ChatGateway,
    config: &'a EngineConfig,
}

impl Translator<'_> {
    async fn translate(&self, source: &SimulationResponse) -> Result<SimulationResponse, TranslateError> {
        let mut out = source.clone();

        let head = self
            .chunk(json!({
                "event_name": source.event_name,
                "event_location": source.event_location,
                "date_time": source.date_time,
                "summary": source.summary,
                "recommendations": source.recommendations,
            }))
            .await?;
        set_string(&mut out.event_name, &head, "event_name");
        set_string(&mut out.event_location, &head, "event_location");
        set_string(&mut out.date_time, &head, "date_time");
        set_string(&mut out.summary, &head, "summary");
        set_list(&mut out.recommendations, &head, "recommendations");

        for (batch_idx, batch) in source.risks.chunks(RISK_BATCH_SIZE).enumerate() {
            let payload: Vec<Value> = batch
                .iter()
                .map(|r| {
                    json!({
                        "id": r.id,
                        "title": r.title,
                        "description": r.description,
                        "location_description": r.location_description,
                        "evidence": r.evidence,
                        "mitigation_actions": r.mitigation_actions,
                        "cascading_risks": r.cascading_risks,
                    })
                })
                .collect();
            let reply = self.chunk(json!({ "risks": payload })).await?;
            let offset = batch_idx * RISK_BATCH_SIZE;
            for (j, tr) in items(&reply, "risks").iter().enumerate() {
                let Some(risk) = out.risks.get_mut(offset + j) else {
                    break;
                };
                set_string(&mut risk.title, tr, "title");
                set_string(&mut risk.description, tr, "description");
                set_string(&mut risk.location_description, tr, "location_description");
                set_string(&mut risk.evidence, tr, "evidence");
                set_list(&mut risk.mitigation_actions, tr, "mitigation_actions");
                set_list(&mut risk.cascading_risks, tr, "cascading_risks");
            }
        }

        let tasks: Vec<Value> = source
            .mitigation_tasks
            .iter()
            .map(|t| json!({"who": t.who, "action": t.action, "required_items": t.required_items}))
            .collect();
        let bottlenecks: Vec<Value> = source
            .bottlenecks
            .iter()
            .map(|b| {
                json!({
                    "location_description": b.location_description,
                    "reason": b.reason,
                    "suggested_measures": b.suggested_measures,
                })
            })
            .collect();
        let labels: Vec<Value> = source
            .risk_time_series
            .iter()
            .map(|s| json!({ "label": s.label }))
            .collect();

        let (tasks, bottlenecks, labels) = futures::try_join!(
            self.list_chunk("mitigation_tasks", tasks),
            self.list_chunk("bottlenecks", bottlenecks),
            self.list_chunk("risk_time_series", labels),
        )?;

        for (task, tr) in out.mitigation_tasks.iter_mut().zip(&tasks) {
            set_string(&mut task.who, tr, "who");
            set_string(&mut task.action, tr, "action");
            set_list(&mut task.required_items, tr, "required_items");
        }
        for (bottleneck, tr) in out.bottlenecks.iter_mut().zip(&bottlenecks) {
            set_string(&mut bottleneck.location_description, tr, "location_description");
            set_string(&mut bottleneck.reason, tr, "reason");
            set_list(&mut bottleneck.suggested_measures, tr, "suggested_measures");
        }
        for (slot, tr) in out.risk_time_series.iter_mut().zip(&labels) {
            if let Some(label) = tr.get("label").and_then(Value::as_str) {
                slot.label = Some(label.to_string());
            }
        }

        out.locale = Locale::En;
        info!(
            simulation_id = %source.simulation_id,
            risks = source.risks.len(),
            "translated simulation to English"
        );
        Ok(out)
    }

    /// Translate `{key: items}`; an empty list skips the call.
    async fn list_chunk(&self, key: &str, list: Vec<Value>) -> Result<Vec<Value>, TranslateError> {
        if list.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self.chunk(json!({ key: list })).await?;
        Ok(items(&reply, key).to_vec())
    }

    async fn chunk(&self, chunk: Value) -> Result<Value, TranslateError> {
        let prompt = translation_prompt(&chunk);
        let req = chat_request(self.config, &prompt, Attribution::new("simulation::translate"));
        let resp = self.gateway.chat(req).await?;
        Ok(serde_json::from_str(strip_code_fence(resp.content.trim()))?)
    }
}

fn items<'v>(reply: &'v Value, key: &str) -> &'v [Value] {
    reply
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn set_string(target: &mut String, reply: &Value, key: &str) {
    if let Some(s) = reply.get(key).and_then(Value::as_str) {
        *target = s.to_string();
    }
}

/// Replace only when the reply holds an array of strings.
fn set_list(target: &mut Vec<String>, reply: &Value, key: &str) {
    let Some(arr) = reply.get(key).and_then(Value::as_array) else {
        return;
    };
    let strings: Option<Vec<String>> = arr
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect();
    if let Some(strings) = strings {
        *target = strings;
    }
}
