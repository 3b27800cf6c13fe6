use idp_gateway::AppState;
use idp_gateway::api::start_webserver;
use idp_gateway::config::load_config_or_panic;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "idp_gateway=info,tower_http=info,hyper=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");

    initialize_tracing();

    // `.env` is optional; real deployments configure via config.yaml + env.
    let _ = dotenvy::dotenv();
    let config = load_config_or_panic();

    // One shared client for every outbound provider call. The timeout bounds
    // hangs during provider outages.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build HTTP client");

    let state = AppState::new(config, http);
    tracing::info!(
        provider_endpoint = %state.config.provider.endpoint(),
        oauth_providers = state.config.oauth.len(),
        "starting identity gateway"
    );

    start_webserver(state).await?;
    Ok(())
}
