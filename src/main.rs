//! Morning Briefing: binary entrypoint.
//! Boots the Axum operator server: loads config, wires the briefing service,
//! mounts the API and the Prometheus endpoint.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use morning_briefing::api::{self, AppState};
use morning_briefing::commands::BriefingService;
use morning_briefing::config::BriefingConfig;
use morning_briefing::metrics::Metrics;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - BRIEFING_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("BRIEFING_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("briefing=info,ingest=info,dispatch=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let config = BriefingConfig::load_default()?;
    let metrics = Metrics::init(&config)?;
    tracing::info!(
        target: "briefing",
        keywords = config.keywords.len(),
        partitions = config.mail.partitions,
        "briefing service starting"
    );

    let service = BriefingService::from_config(config)?;
    let router = api::create_router(AppState::new(service)).merge(metrics.router());

    Ok(router.into())
}
