//! Betwitness Daemon
//!
//! Watches a bookmaker bet-history export and mirrors changes into a
//! remote placed-bets API, refreshing its session credentials on a
//! separate period.

mod config;
mod shutdown;

use anyhow::Context;
use betwitness_core::consumers::{AcceptAll, DeliveryEndpoints, DeliveryWorker, EventTypeFilter};
use betwitness_core::engine::Engine;
use betwitness_core::events::{Credentials, SessionToken};
use betwitness_core::http::{HttpTransport, ReqwestTransport};
use betwitness_core::producers::{BetHistoryProducer, SessionProducer};
use betwitness_core::snapshot::GzipXmlSource;
use betwitness_core::witness::ChangeWitness;
use clap::Parser;
use config::FileConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Betwitness - bet-history change watcher and uploader
#[derive(Parser, Debug)]
#[command(name = "betwitness-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./betwitness-config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting betwitness-daemon v{}", env!("CARGO_PKG_VERSION"));

    let config = FileConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);

    // The export must be readable at cold start so the witness can take
    // its baseline; anything else is a deployment problem worth failing on.
    let source = GzipXmlSource::new(&config.watch.snapshot_path);
    let witness = ChangeWitness::new(source, config.watch.key_column.clone()).with_context(|| {
        format!(
            "failed to take the baseline snapshot from {:?}",
            config.watch.snapshot_path
        )
    })?;

    let mut engine = Engine::new(Duration::from_millis(config.engine.tick_millis));

    engine.attach_producer(
        "bethistory",
        BetHistoryProducer::new("bethistory", witness),
        Duration::from_secs(config.watch.period_secs),
    )?;
    engine.attach_producer(
        "sessiondata",
        SessionProducer::new(
            "sessiondata",
            Credentials {
                username: config.session.username.clone(),
                password: config.session.password.clone(),
            },
            config.session.login_url.clone(),
            Arc::clone(&transport),
        ),
        Duration::from_secs(config.session.refresh_period_secs),
    )?;

    let endpoints = DeliveryEndpoints::new(config.delivery.endpoint.clone());
    // The worker starts with empty credentials; the first session refresh
    // rotates real ones in before authenticated delivery can matter.
    let worker = if config.delivery.accepted_event_types.is_empty() {
        DeliveryWorker::new(
            Arc::clone(&transport),
            endpoints,
            AcceptAll,
            SessionToken::default(),
        )
    } else {
        DeliveryWorker::new(
            Arc::clone(&transport),
            endpoints,
            EventTypeFilter::new(config.delivery.accepted_event_types.clone()),
            SessionToken::default(),
        )
    };
    let _delivery = engine.attach_consumer(
        "delivery",
        worker,
        vec!["bethistory.modified".into(), "sessiondata.modified".into()],
    )?;

    engine.run(shutdown::shutdown_channel()).await;

    tracing::info!("Daemon shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
