use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pulseguard::{
    actors::{
        DispatchHandle, RetentionHandle, SchedulerHandle, TaskHandler, retention,
        scheduler::latest_applied_cycle,
    },
    alerts::AlertManager,
    config::{Config, StorageConfig, read_config_file},
    monitors::HttpProber,
    queue::{MemoryQueue, TaskQueue},
    registry::{MonitorRegistry, StaticRegistry},
    storage::{HealthStore, MemoryStore},
};
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("pulseguard", LevelFilter::TRACE),
        ("pulseguard_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn HealthStore>, Option<u32>)> {
    match config.storage.clone().unwrap_or(StorageConfig::None) {
        StorageConfig::None => {
            info!("storage disabled, health state is kept in memory");
            let store: Arc<dyn HealthStore> = Arc::new(MemoryStore::default());
            Ok((store, None))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite {
            path,
            retention_days,
        } => {
            let store = pulseguard::storage::sqlite::SqliteStore::new(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            let store: Arc<dyn HealthStore> = Arc::new(store);
            Ok((store, Some(retention_days)))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage requested but the `storage-sqlite` feature is disabled")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = read_config_file(&args.file)?;
    config.apply_env_overrides();
    config.validate()?;

    let registry: Arc<dyn MonitorRegistry> = Arc::new(StaticRegistry::with_page_size(
        config.monitors.clone(),
        config.scheduler.registry_page_size,
    ));
    let queue: Arc<dyn TaskQueue> = Arc::new(MemoryQueue::new(
        config.dispatch.visibility_timeout(),
        config.dispatch.max_receive_count,
    ));
    let (store, retention_days) = open_store(&config).await?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("pulseguard/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let prober = Arc::new(HttpProber::with_client(client.clone()));
    let alerts = AlertManager::from_config(&config.notifier, client);

    let handler = Arc::new(TaskHandler::new(
        prober,
        store.clone(),
        alerts,
        config.dispatch.store_timeout(),
    ));

    let dispatch = DispatchHandle::spawn(queue.clone(), handler.clone(), config.dispatch.workers);
    let resume_after = latest_applied_cycle(store.as_ref())
        .await
        .context("failed to read persisted cycles")?;
    debug!("resuming after cycle {resume_after}");
    let scheduler = SchedulerHandle::spawn_after(
        registry.clone(),
        queue.clone(),
        &config.scheduler,
        resume_after,
    );
    let retention = retention_days.map(|days| {
        RetentionHandle::spawn(store.clone(), days, retention::DEFAULT_RETENTION_INTERVAL)
    });

    info!(
        "watching {} monitors every {}s with {} workers",
        config.monitors.len(),
        config.scheduler.interval().as_secs(),
        config.dispatch.workers
    );

    #[cfg(feature = "api")]
    {
        if let Some(api_config) = config.api.clone() {
            let state =
                pulseguard::api::ApiState::new(registry, store.clone(), queue.clone(), handler);
            pulseguard::api::spawn_api_server(api_config, state).await?;
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    scheduler.shutdown().await;
    if let Some(retention) = retention {
        retention.shutdown().await;
    }

    if tokio::time::timeout(Duration::from_secs(30), dispatch.shutdown())
        .await
        .is_err()
    {
        warn!("dispatch workers did not stop in time");
    }

    let queue_stats = queue.stats().await?;
    debug!("queue at shutdown: {queue_stats:?}");

    store.close().await?;

    Ok(())
}
