use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use feed_service::{
    api::{AppState, run_api_server},
    clients::{
        MessageSink, PreferenceLookup, database::DatabaseClient, health::HealthChecker,
        rbmq::RabbitMqClient, redis::RedisBucketStorage, slack::SlackReporter,
    },
    config::Config,
    services::{
        aggregator::DailyAggregator, bucket_store::DailyBucketStore,
        classifier::RecipientClassifier, composer::MessageComposer, live::LiveDispatcher,
        router::EventRouter, scheduler::DigestScheduler,
    },
    worker::EventWorker,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;
    let schedule = config.digest_schedule()?;
    let composer = MessageComposer::from_config(&config)?;

    let storage = Arc::new(RedisBucketStorage::connect(&config).await?);
    let store = Arc::new(DailyBucketStore::new(storage, config.retry_config()));

    let preferences: Arc<dyn PreferenceLookup> =
        Arc::new(DatabaseClient::connect(&config.database_url).await?);

    let rabbitmq = Arc::new(RabbitMqClient::connect(&config).await?);
    let sink: Arc<dyn MessageSink> = Arc::new(rabbitmq.email_job_sink());

    let router = Arc::new(EventRouter::new(
        RecipientClassifier::new(preferences),
        LiveDispatcher::new(sink.clone(), composer.clone(), config.dispatch_timeout()),
        DailyAggregator::new(store.clone(), schedule),
        config.event_timeout(),
    ));

    let scheduler = Arc::new(DigestScheduler::new(
        store.clone(),
        sink,
        composer,
        schedule,
        config.dispatch_timeout(),
    ));

    let reporter = config
        .slack_post_url
        .as_deref()
        .map(SlackReporter::new)
        .transpose()?;

    let worker = EventWorker::new(rabbitmq, router, reporter, config.worker_concurrency);

    let cancel = CancellationToken::new();

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let state = Arc::new(AppState {
        health_checker: Some(HealthChecker::new(config.clone())),
        store,
        scheduler,
    });
    let server_port = config.server_port;
    tokio::spawn(async move {
        if let Err(e) = run_api_server(state, server_port).await {
            error!(error = %e, "Operator API server stopped");
        }
    });

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    info!(
        digest_time = %schedule.time,
        digest_timezone = %schedule.timezone,
        "Feed service started"
    );

    worker.run(cancel.clone()).await?;
    cancel.cancel();

    scheduler_task
        .await
        .map_err(|e| anyhow!("Digest scheduler task panicked: {}", e))?;

    info!("Feed service stopped");

    Ok(())
}
