//! Bot process wiring: store, write queue, status reporting and shutdown.
//!
//! Command dispatch lives elsewhere; handlers receive a [`WriteFacade`] clone
//! from [`Bot::facade`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::MissedTickBehavior;

use syndicate_infra::config::{WriteQueueConfig, millis};
use syndicate_infra::store::SqliteGameStore;
use syndicate_infra::write_queue::{DrainReport, WriteFacade, WriteQueue};

const DEFAULT_DATABASE_URL: &str = "sqlite://syndicate.db?mode=rwc";
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(10);
const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub database_url: String,
    /// How long shutdown keeps flushing queued writes.
    pub drain_grace: Duration,
    /// Period of the queue status log line.
    pub status_interval: Duration,
    pub queue: WriteQueueConfig,
}

impl BotConfig {
    /// `DATABASE_URL`, `SYNDICATE_DRAIN_GRACE_MS`, `SYNDICATE_STATUS_INTERVAL_MS`
    /// and the `SYNDICATE_QUEUE_*` queue settings.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| {
            tracing::warn!("DATABASE_URL not set; using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        Self {
            database_url,
            drain_grace: millis_or(&lookup, "SYNDICATE_DRAIN_GRACE_MS", DEFAULT_DRAIN_GRACE),
            status_interval: millis_or(
                &lookup,
                "SYNDICATE_STATUS_INTERVAL_MS",
                DEFAULT_STATUS_INTERVAL,
            ),
            queue: WriteQueueConfig::from_lookup(&lookup),
        }
    }
}

fn millis_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    match lookup(key).map(|raw| raw.trim().parse::<u64>()) {
        None => default,
        Some(Ok(0)) => default,
        Some(Ok(ms)) => Duration::from_millis(ms),
        Some(Err(err)) => {
            tracing::warn!(key, error = %err, "ignoring unparsable setting; using default");
            default
        }
    }
}

/// A running bot: the store plus a started write queue.
pub struct Bot {
    store: SqliteGameStore,
    queue: WriteQueue,
    facade: WriteFacade,
}

impl Bot {
    /// Open the database, create missing tables and start the write queue.
    pub async fn connect(config: &BotConfig) -> anyhow::Result<Self> {
        let store = SqliteGameStore::connect(&config.database_url)
            .await
            .with_context(|| format!("failed to open game database at {}", config.database_url))?;
        store
            .ensure_schema()
            .await
            .context("failed to create game tables")?;
        Self::with_store(store, config.queue.clone())
    }

    /// Start a write queue over an already prepared store.
    pub fn with_store(
        store: SqliteGameStore,
        queue_config: WriteQueueConfig,
    ) -> anyhow::Result<Self> {
        let queue = WriteQueue::new(queue_config, Arc::new(store.clone()))
            .context("invalid write queue configuration")?;
        queue.start();
        let facade = WriteFacade::new(queue.clone());
        Ok(Self {
            store,
            queue,
            facade,
        })
    }

    pub fn store(&self) -> &SqliteGameStore {
        &self.store
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    /// Handle for command handlers. Cheap to clone.
    pub fn facade(&self) -> WriteFacade {
        self.facade.clone()
    }

    fn log_status(&self) {
        let status = self.queue.status();
        tracing::info!(
            pending = status.pending_count,
            in_flight = status.in_flight_count,
            succeeded = status.succeeded_total,
            failed = status.failed_total,
            retried = status.retried_total,
            batches = status.batches_executed,
            running = status.is_running,
            "write queue status"
        );
    }

    /// Stop the scheduler and flush what is left within `grace`.
    pub async fn shutdown(self, grace: Duration) -> DrainReport {
        tracing::info!(grace_ms = millis(grace), "draining write queue");
        let report = self.queue.drain(grace).await;
        self.store.pool().close().await;
        report
    }
}

/// Run until Ctrl-C, then drain the queue.
pub async fn run(config: BotConfig) -> anyhow::Result<()> {
    let bot = Bot::connect(&config).await?;
    tracing::info!(database = %config.database_url, "syndicate bot started");

    let mut status_ticker = tokio::time::interval(config.status_interval);
    status_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    status_ticker.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                tracing::info!("shutdown requested");
                break;
            }
            _ = status_ticker.tick() => bot.log_status(),
        }
    }

    let report = bot.shutdown(config.drain_grace).await;
    if !report.is_complete() {
        anyhow::bail!(
            "{} queued writes were not persisted before shutdown",
            report.remaining
        );
    }
    Ok(())
}
