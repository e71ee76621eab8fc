#![forbid(unsafe_code)]

//! # flowguard
//!
//! LLM-backed risk analysis for large public events.
//!
//! A simulation request (event, venue polygon, attendance, weather) is rendered
//! into an analysis prompt, sent through a retrying provider call, repaired when
//! the model output is truncated, normalized record by record, and expanded into
//! deterministic analytics: hourly risk series, bottlenecks, mitigation tasks and
//! map danger points. Multi-agent mode replaces the single call with one call per
//! risk category plus a synthesis call.

pub mod config;
pub mod gateway;
pub mod prompts;
pub mod repair;
pub mod schedule;
pub mod simulation;
pub mod weather;

pub use config::EngineConfig;
pub use gateway::{Attribution, ChatGateway, ProviderGateway, UsageSink};
pub use repair::{repair_json, RepairError};
pub use simulation::translate::{translate_simulation_to_english, TranslateError};
pub use simulation::types::{SimulationRequest, SimulationResponse};
pub use simulation::validate::{validate_input, InputDraft, ValidationReport};
pub use simulation::{build_response, RiskEngine, SimulationError};
pub use weather::{OpenMeteoClient, StaticWeather, WeatherProvider};
