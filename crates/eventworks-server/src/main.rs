//! Process entry point: loads configuration, connects to Postgres, Redis,
//! and Kafka, and starts the queue consumer, worker pool, and scheduler
//! coordinator side by side with a `/healthz` HTTP surface.

mod archive;
mod http;
mod task_runner;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use eventworks_broker::{KafkaConsumer, KafkaProducer};
use eventworks_cache::RedisBackend;
use eventworks_core::config::{AppConfig, LoggingConfig};
use eventworks_core::health::HealthRegistry;
use eventworks_database::{ActionRepository, DatabasePool, PersonRepository, PluginRepository, TeamRepository};
use eventworks_events::EventBus;
use eventworks_ingest::EventProcessor;
use eventworks_plugins::manager::PluginLifecycleManager;
use eventworks_queue::QueueConsumer;
use eventworks_scheduler::SchedulerCoordinator;
use eventworks_workers::{PoolDispatch, WorkerPool};

use archive::UnavailableArchiveSource;
use task_runner::IngestionTaskRunner;

#[derive(Parser, Debug)]
#[command(name = "eventworks-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (layered under defaults, over by env vars).
    #[arg(long)]
    config: Option<String>,

    /// Port the `/healthz` HTTP surface listens on.
    #[arg(long, default_value_t = 8080)]
    healthz_port: u16,
}

fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    info!(
        worker_capacity = config.worker.capacity(),
        "starting eventworks-server"
    );

    let database = DatabasePool::connect(&config.database).await?;
    info!("database connection established");

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis.url);
    let redis_pool = Arc::new(redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?);
    let redis_cache = RedisBackend::new(&config.redis.url)?;

    let kafka_consumer = Arc::new(KafkaConsumer::new(&config.kafka)?);
    let kafka_producer = Arc::new(KafkaProducer::new(&config.kafka, &config.clickhouse)?);
    info!("kafka consumer and producer initialized");

    let persons = Arc::new(PersonRepository::new(database.clone()));
    let teams = Arc::new(TeamRepository::new(database.clone()));
    let plugin_repo = Arc::new(PluginRepository::new(database.clone()));
    let actions = Arc::new(ActionRepository::new(database.clone()));
    let events = Arc::new(EventBus::new());

    let plugins = Arc::new(PluginLifecycleManager::new(
        plugin_repo.clone(),
        Arc::new(UnavailableArchiveSource),
        events,
        config.plugins.clone(),
        config.worker.task_timeout(),
    ));

    match plugin_repo.list_team_ids_with_enabled_plugins().await {
        Ok(team_ids) => {
            for team_id in team_ids {
                if let Err(e) = plugins.setup_plugins(team_id).await {
                    error!(team_id = %team_id, error = %e, "failed to set up plugins for team");
                }
            }
        }
        Err(e) => error!(error = %e, "failed to list teams with enabled plugins at startup"),
    }

    let processor = Arc::new(EventProcessor::new(
        persons,
        teams,
        plugins.clone(),
        kafka_producer.clone(),
    ));

    let runner = Arc::new(IngestionTaskRunner::new(processor, plugins.clone(), actions));
    let pool = Arc::new(WorkerPool::new(&config.worker, runner));

    let queue_consumer = Arc::new(QueueConsumer::new(
        kafka_consumer,
        Arc::new(PoolDispatch::new(pool.clone())),
        config.worker.capacity(),
    ));

    let mut scheduler = SchedulerCoordinator::new(
        redis_pool,
        config.scheduler.clone(),
        plugins,
        pool,
    );

    let mut registry = HealthRegistry::new();
    registry.register(Box::new(database));
    registry.register(Box::new(redis_cache));
    registry.register(Box::new(kafka_producer.clone()));
    let registry = Arc::new(registry);

    {
        let queue_consumer = queue_consumer.clone();
        tokio::spawn(async move {
            if let Err(e) = queue_consumer.start().await {
                error!(error = %e, "queue consumer exited with error");
            }
        });
    }

    tokio::spawn(async move {
        scheduler.run().await;
    });

    let addr: SocketAddr = ([0, 0, 0, 0], cli.healthz_port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "healthz endpoint listening");

    axum::serve(listener, http::router(registry))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    queue_consumer.stop().await;
    info!("eventworks-server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
