use std::sync::Arc;

use claimflow_db_postgres::{create_pool, run_migrations, PgJobStore, PgQueueStore, PostgresConfig};
use claimflow_upstream::HttpUpstreamFactory;
use claimflow_worker::{
    init_tracing, GaugeMetricsSink, NoopMetricsSink, QueueConsumer, WorkerConfig, WorkerPool,
};
use claimflow_worker::metrics::{init_metrics, DynMetricsSink};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        eprintln!("worker error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(WorkerConfig::from_env());

    let pg_config = match std::env::var("DATABASE_URL") {
        Ok(url) => PostgresConfig::new(url),
        Err(_) => PostgresConfig::default(),
    };
    let pool = create_pool(&pg_config).await?;
    if pg_config.run_migrations {
        run_migrations(&pool).await?;
    }

    let upstream_host =
        std::env::var("UPSTREAM_HOST").unwrap_or_else(|_| "http://localhost:4000".to_string());

    let metrics: DynMetricsSink = if config.deployment_target.is_some() {
        init_metrics();
        Arc::new(GaugeMetricsSink)
    } else {
        Arc::new(NoopMetricsSink)
    };

    let consumer = QueueConsumer::new(
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgQueueStore::new(pool)),
        Arc::new(HttpUpstreamFactory::new(upstream_host)),
        metrics,
        config.clone(),
    );

    let pool = WorkerPool::start(consumer, config.worker_count);

    tokio::signal::ctrl_c().await?;
    pool.stop().await;

    Ok(())
}
