#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowguard::gateway::{ProviderGateway, TracingUsageSink};
use flowguard::simulation::types::WeatherSnapshot;
use flowguard::{
    repair_json, translate_simulation_to_english, validate_input, EngineConfig, InputDraft,
    OpenMeteoClient, RiskEngine, SimulationRequest, SimulationResponse, StaticWeather,
    WeatherProvider,
};

#[derive(Parser)]
#[command(name = "flowguard", version, about = "Event risk analysis CLI")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a JSON request (LLM calls)
    Simulate {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// One call per risk category plus synthesis (also `USE_MULTI_AGENT=1`)
        #[arg(long)]
        multi_agent: bool,
        #[arg(long)]
        model: Option<String>,
        /// Total attempts per model call
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        retry_base_seconds: Option<f64>,
        /// Skip the forecast lookup when the request carries no weather
        #[arg(long)]
        no_weather: bool,
    },
    /// Check a partially filled form and print the issues
    Validate {
        #[arg(long)]
        request: PathBuf,
    },
    /// Repair raw model output into JSON
    Repair {
        #[arg(long)]
        input: PathBuf,
    },
    /// Translate a simulation response into English (LLM calls)
    Translate {
        #[arg(long)]
        response: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Simulate {
            request,
            out,
            multi_agent,
            model,
            max_retries,
            retry_base_seconds,
            no_weather,
        } => {
            let req: SimulationRequest = read_json(&request)?;

            let mut config = EngineConfig::from_env().with_weather_lookup(!no_weather);
            if multi_agent {
                config = config.with_multi_agent(true);
            }
            if let Some(model) = model {
                config = config.with_model(model);
            }
            if let Some(attempts) = max_retries {
                if attempts == 0 {
                    return Err("--max-retries must be >= 1".into());
                }
                config = config.with_max_attempts(attempts);
            }
            if let Some(secs) = retry_base_seconds {
                let delay = Duration::try_from_secs_f64(secs)
                    .map_err(|e| format!("--retry-base-seconds: {e}"))?;
                config = config.with_retry_base_delay(delay);
            }

            let gateway = ProviderGateway::from_env(Arc::new(TracingUsageSink))?;
            let weather: Arc<dyn WeatherProvider> = if no_weather {
                Arc::new(StaticWeather(WeatherSnapshot::default()))
            } else {
                Arc::new(OpenMeteoClient::from_env()?)
            };

            let engine = RiskEngine::new(Arc::new(gateway), weather, config);
            let resp = engine.run_simulation(&req).await?;
            write_json(&out, &resp)?;
            println!(
                "{} risks, overall score {:.1}",
                resp.risks.len(),
                resp.overall_risk_score
            );
        }
        Commands::Validate { request } => {
            let draft: InputDraft = read_json(&request)?;
            let report = validate_input(&draft);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                return Err("input has errors".into());
            }
        }
        Commands::Repair { input } => {
            let raw = std::fs::read_to_string(&input)?;
            let value = repair_json(&raw)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Translate {
            response,
            out,
            model,
        } => {
            let resp: SimulationResponse = read_json(&response)?;
            let mut config = EngineConfig::from_env();
            if let Some(model) = model {
                config = config.with_model(model);
            }
            let gateway = ProviderGateway::from_env(Arc::new(TracingUsageSink))?;
            let translated = translate_simulation_to_english(&gateway, &config, &resp).await?;
            write_json(&out, &translated)?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), std::io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}
