use std::sync::Arc;
use std::time::Duration;

use flowguard::gateway::openrouter::OpenRouterAdapter;
use flowguard::gateway::{NoopUsageSink, ProviderGateway};
use flowguard::simulation::types::{WeatherCondition, WeatherSnapshot};
use flowguard::{EngineConfig, OpenMeteoClient, RiskEngine, SimulationRequest, WeatherProvider};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 24 hourly values; hour 13 carries the interesting numbers.
fn forecast(temp_at_13: f64, precip_at_13: f64, code_at_13: i64) -> serde_json::Value {
    let mut temps = vec![json!(22.0); 24];
    let mut precip = vec![json!(0.0); 24];
    let mut codes = vec![json!(0); 24];
    temps[13] = json!(temp_at_13);
    precip[13] = json!(precip_at_13);
    codes[13] = json!(code_at_13);
    json!({
        "hourly": {
            "time": (0..24).map(|h| format!("2026-08-01T{h:02}:00")).collect::<Vec<_>>(),
            "temperature_2m": temps,
            "precipitation_probability": precip,
            "weathercode": codes
        }
    })
}

#[tokio::test]
async fn fetch_reads_the_requested_hour() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("start_date", "2026-08-01"))
        .and(query_param("end_date", "2026-08-01"))
        .and(query_param(
            "hourly",
            "temperature_2m,precipitation_probability,weathercode",
        ))
        .and(query_param("timezone", "auto"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast(27.5, 60.0, 63)))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenMeteoClient::new(server.uri()).unwrap();
    let w = client
        .fetch(35.68, 139.76, "2026-08-01T13:00:00")
        .await
        .unwrap();
    assert_eq!(w.temperature_celsius, 27.5);
    assert_eq!(w.precipitation_probability, 60.0);
    assert_eq!(w.condition, WeatherCondition::Rain);
}

#[tokio::test]
async fn extreme_heat_overrides_the_weather_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast(35.0, 0.0, 0)))
        .mount(&server)
        .await;

    let client = OpenMeteoClient::new(server.uri()).unwrap();
    let w = client.weather_at(35.68, 139.76, "2026-08-01T13:00").await;
    assert_eq!(w.condition, WeatherCondition::ExtremeHeat);
}

#[tokio::test]
async fn upstream_failure_degrades_to_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = OpenMeteoClient::new(server.uri()).unwrap();
    let w = client.weather_at(35.68, 139.76, "2026-08-01T13:00").await;
    assert_eq!(w, WeatherSnapshot::default());
}

#[tokio::test]
async fn null_value_at_hour_degrades_to_defaults() {
    let server = MockServer::start().await;
    let mut body = forecast(30.0, 10.0, 1);
    body["hourly"]["temperature_2m"][13] = serde_json::Value::Null;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let client = OpenMeteoClient::new(server.uri()).unwrap();
    let w = client.weather_at(35.68, 139.76, "2026-08-01T13:00").await;
    assert_eq!(w, WeatherSnapshot::default());
}

#[tokio::test]
async fn unparseable_timestamp_skips_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast(30.0, 0.0, 0)))
        .expect(0)
        .mount(&server)
        .await;

    let client = OpenMeteoClient::new(server.uri()).unwrap();
    let w = client.weather_at(35.68, 139.76, "sometime in august").await;
    assert_eq!(w, WeatherSnapshot::default());
}

#[tokio::test]
async fn engine_fetches_weather_when_request_has_none() {
    let weather_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("start_date", "2026-08-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast(36.5, 5.0, 1)))
        .expect(1)
        .mount(&weather_server)
        .await;

    let llm_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Temperature: 36.5 deg C"))
        .and(body_string_contains("Extreme heat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "content": "{\"risks\": [], \"overall_risk_score\": 6}" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
        })))
        .expect(1)
        .mount(&llm_server)
        .await;

    let adapter = OpenRouterAdapter::with_config(
        "sk-test",
        llm_server.uri(),
        Duration::from_secs(5),
        None,
        None,
    )
    .unwrap();
    let engine = RiskEngine::new(
        Arc::new(ProviderGateway::new(adapter, Arc::new(NoopUsageSink))),
        Arc::new(OpenMeteoClient::new(weather_server.uri()).unwrap()),
        EngineConfig::default().with_retry_base_delay(Duration::ZERO),
    );

    let request: SimulationRequest = serde_json::from_value(json!({
        "event_name": "Summer Sonic",
        "event_type": "music_festival",
        "event_location": "Makuhari Messe",
        "date_time": "2026-08-01T13:00 - 21:00",
        "expected_attendance": 60000,
        "audience_type": "youth",
        "polygon": [
            {"lat": 35.647, "lng": 140.034},
            {"lat": 35.649, "lng": 140.036},
            {"lat": 35.645, "lng": 140.037}
        ]
    }))
    .unwrap();

    let resp = engine.run_simulation(&request).await.unwrap();
    let used = resp.weather_used.expect("fetched weather should be reported");
    assert_eq!(used.temperature_celsius, 36.5);
    assert_eq!(used.condition, WeatherCondition::ExtremeHeat);
    assert_eq!(resp.overall_risk_score, 6.0);
    assert!(resp.risks.is_empty());
}
