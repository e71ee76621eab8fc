//! Minimal end-to-end example for `flowguard`.
//!
//! Runs one risk simulation for a riverside fireworks display and prints the
//! highest-severity risks and the hourly risk curve.
//!
//! To run:
//! - Set `OPENROUTER_API_KEY`
//! - `cargo run --example quickstart`
//! - Set `USE_MULTI_AGENT=1` for the per-category fan-out

use std::sync::Arc;

use flowguard::gateway::TracingUsageSink;
use flowguard::simulation::types::{
    AudienceType, EventType, LatLng, Locale, SimulationRequest,
};
use flowguard::{EngineConfig, OpenMeteoClient, ProviderGateway, RiskEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Reads OPENROUTER_API_KEY; TracingUsageSink logs token counts and cost per call.
    let gateway = ProviderGateway::from_env(Arc::new(TracingUsageSink))?;

    // The request below carries no weather, so it is looked up from Open-Meteo.
    let weather = OpenMeteoClient::from_env()?;

    let engine = RiskEngine::new(
        Arc::new(gateway),
        Arc::new(weather),
        EngineConfig::from_env(),
    );

    let request = SimulationRequest {
        event_name: "Sumida River Fireworks".to_string(),
        event_type: EventType::Fireworks,
        event_location: "Sumida Park, Taito".to_string(),
        date_time: "2026-07-25T19:00 - 20:30".to_string(),
        expected_attendance: 950_000,
        audience_type: AudienceType::Mixed,
        temperature_celsius: None,
        precipitation_probability: None,
        weather_condition: None,
        polygon: vec![
            LatLng::new(35.7115, 139.8010),
            LatLng::new(35.7160, 139.8032),
            LatLng::new(35.7122, 139.8061),
        ],
        additional_notes: "Viewing areas on both banks; bridges closed to vehicles.".to_string(),
        locale: Locale::En,
        role: None,
        alert_threshold: None,
    };

    let resp = engine.run_simulation(&request).await?;

    println!(
        "overall risk {:.1}/10, {} risks",
        resp.overall_risk_score,
        resp.risks.len()
    );
    println!("{}", resp.summary);

    let mut risks: Vec<_> = resp.risks.iter().collect();
    risks.sort_by(|a, b| b.severity.total_cmp(&a.severity));
    for risk in risks.iter().take(5) {
        println!(
            "  [{}] {:<40} severity {:.1}  p={:.2}",
            risk.category, risk.title, risk.severity, risk.probability
        );
    }

    for slot in &resp.risk_time_series {
        println!(
            "  {} - {}  {:>4.1}",
            slot.start_time, slot.end_time, slot.risk_score
        );
    }

    Ok(())
}
