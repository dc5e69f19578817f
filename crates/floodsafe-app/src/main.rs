//! FloodSafe application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Build the chat-completion, geocoding and prediction clients
//! 4. Run the chosen subcommand: HTTP API, terminal chat, or status lookup

mod cli;
mod terminal;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use floodsafe_api::{routes, AppState};
use floodsafe_chat::{
    locate_once, ChatEngine, CompletionService, NominatimGeocoder, OpenAiCompletionClient,
    ReverseGeocoder,
};
use floodsafe_core::types::Coordinates;
use floodsafe_core::FloodSafeConfig;
use floodsafe_forecast::{FloodPredictor, PredictionClient};

use cli::{CliArgs, Command};

fn init_tracing(filter: &str, to_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if to_stderr {
        builder.with_writer(std::io::stderr).init();
    } else {
        builder.init();
    }
}

async fn serve(
    mut config: FloodSafeConfig,
    args: &CliArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    config.server.port = args.resolve_port(config.server.port);

    let completion: Arc<dyn CompletionService> =
        Arc::new(OpenAiCompletionClient::new(&config.chat)?);
    let geocoder: Arc<dyn ReverseGeocoder> = Arc::new(NominatimGeocoder::new(&config.geocoding)?);
    let predictor: Arc<dyn FloodPredictor> = Arc::new(PredictionClient::new(&config.prediction)?);

    let state = AppState::new(config.clone(), completion, geocoder, predictor);
    routes::start_server(&config, state).await?;
    Ok(())
}

async fn chat(
    config: &FloodSafeConfig,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let completion = OpenAiCompletionClient::new(&config.chat)?;
    let engine = ChatEngine::new(Arc::new(completion))
        .with_request_timeout(Duration::from_secs(config.chat.request_timeout_secs.max(1)));

    if let (Some(lat), Some(lon)) = (lat, lon) {
        let coordinates = Coordinates::new(lat, lon)?;
        let geocoder = NominatimGeocoder::new(&config.geocoding)?;
        if let Some(ctx) = locate_once(&geocoder, coordinates).await {
            engine.set_location_context(ctx);
        }
    }

    terminal::run(&engine).await?;
    Ok(())
}

async fn status(
    config: &FloodSafeConfig,
    lat: f64,
    lon: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let coordinates = Coordinates::new(lat, lon)?;
    let predictor = PredictionClient::new(&config.prediction)?;
    let status = predictor.predict(coordinates).await?;
    println!("{}", status.label());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let command = args.command();

    // Config.
    let config_file = args.resolve_config_path();
    let config = FloodSafeConfig::load_or_default(&config_file);

    // Tracing. Terminal chat keeps stdout for the conversation.
    let filter = args.resolve_log_level(&config.general.log_level);
    init_tracing(&filter, !matches!(command, Command::Serve));

    tracing::info!("Starting FloodSafe v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    match command {
        Command::Serve => serve(config, &args).await,
        Command::Chat { lat, lon } => chat(&config, lat, lon).await,
        Command::Status { lat, lon } => status(&config, lat, lon).await,
    }
}
