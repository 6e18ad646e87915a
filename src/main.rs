//! Spam filter service binary.
//! Loads configuration, opens the database, builds the strategy panel and
//! serves the JSON API.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spam_karma::api::{self, AppState};
use spam_karma::config::SpamFilterConfig;
use spam_karma::engine::FilterSystem;
use spam_karma::metrics::Metrics;

/// Compact logs; `RUST_LOG` overrides the default filter.
/// `SPAMFILTER_LOG_JSON=1` switches to JSON lines.
fn enable_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spam_karma=info,warn"));

    let json = std::env::var("SPAMFILTER_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    enable_tracing();

    let cfg = SpamFilterConfig::load_default().context("loading spam filter config")?;
    let engine = FilterSystem::from_config(&cfg)?;
    let strategies = engine.strategies().len();

    let mut app = api::router(AppState::new(engine));

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .ok()
        .is_some_and(|v| v == "1");
    if metrics_enabled {
        let metrics = Metrics::init(strategies)?;
        app = app.merge(metrics.router());
    }

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    info!(target: "api", bind = %cfg.server.bind, strategies, metrics = metrics_enabled, "spam filter listening");
    axum::serve(listener, app).await?;
    Ok(())
}
