use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use satchel::config::Config;
use satchel::gateway::{self, AppState, AuthSettings, CredentialPresence};
use satchel::intent::CourseMap;
use satchel::model::AnthropicClient;
use satchel::orchestrator::{Orchestrator, OrchestratorSettings};
use satchel::provider::HttpCapabilityProvider;
use satchel::voice::SpeechClient;

#[derive(Parser, Debug)]
#[command(name = "satchel", version, about = "Student-assistant chat server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server (default)
    Start,
    /// Load and validate the configuration, then exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| satchel::satchel_home().join("config.yaml"));

    let config = Config::load(&config_path).await?;

    if let Some(Command::Check) = cli.command {
        println!("config ok: {}", config_path.display());
        return Ok(());
    }

    let addr = config
        .gateway
        .addr
        .parse()
        .with_context(|| format!("invalid gateway address: {}", config.gateway.addr))?;

    let model_key = config.model.resolved_api_key();
    let provider_key = config.provider.resolved_api_key();
    let credentials = CredentialPresence {
        model_key: !model_key.is_empty(),
        provider_key: !provider_key.is_empty(),
    };
    if !credentials.model_key {
        tracing::warn!("model API key not set, chat requests will be rejected");
    }
    if !credentials.provider_key {
        tracing::warn!("provider API key not set, chat requests will be rejected");
    }

    let model = match &config.model.endpoint {
        Some(endpoint) => AnthropicClient::with_endpoint(model_key, endpoint.clone()),
        None => AnthropicClient::new(model_key),
    };
    let provider = Arc::new(HttpCapabilityProvider::new(
        provider_key,
        config.provider.base_url.clone(),
    ));

    let speech = config.voice.as_ref().map(|v| {
        Arc::new(SpeechClient::new(
            v.resolved_api_key(),
            v.voice_model.clone(),
        ))
    });

    let settings = OrchestratorSettings {
        model_name: config.model.model.clone(),
        max_tokens: config.model.max_tokens,
        followup_max_tokens: config.model.followup_max_tokens,
        default_user_id: config.provider.default_user_id.clone(),
        timezone: config.parsed_timezone()?,
        routing: config.parsed_routing()?,
    };
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(model),
        provider.clone(),
        CourseMap::builtin(),
        settings,
    ));

    let auth = Arc::new(AuthSettings {
        default_user_id: config.provider.default_user_id.clone(),
        gmail_auth_config_id: config.provider.gmail_auth_config_id.clone(),
        gmail_callback_url: config.provider.gmail_callback_url.clone(),
        canvas_auth_config_id: config.provider.canvas_auth_config_id.clone(),
        canvas_base_url: config.provider.canvas_base_url.clone(),
        canvas_api_key: config.provider.resolved_canvas_api_key(),
    });

    let state = AppState {
        orchestrator,
        provider,
        speech,
        auth,
        credentials,
    };

    let gateway = gateway::start_gateway(addr, state)
        .await
        .context("failed to start gateway")?;
    info!(addr = %gateway.addr, "satchel running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    gateway.handle.abort();

    Ok(())
}
