use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::aggregate::{aggregate, DerivedTables};
use crate::config::{Config, RefreshStrategy};
use crate::observation::read_observations;
use crate::source::load_source;

/// Derived tables plus the bookkeeping of the refresh cycle that produced
/// them. Cloning is cheap; the tables themselves are shared.
#[derive(Debug, Clone)]
pub struct StockSnapshot {
    pub tables: Arc<DerivedTables>,
    pub refreshed_at: DateTime<Utc>,
    pub input_rows: usize,
    pub skipped_rows: usize,
}

/// The single interface callers use to get current derived tables. When and
/// how the raw source is re-fetched is up to the implementation.
#[async_trait]
pub trait StockProvider: Send + Sync {
    /// Current tables, refreshing first if this provider's policy says the
    /// held ones are too old.
    async fn tables(&self) -> Result<StockSnapshot>;

    /// Run a refresh cycle now, regardless of policy.
    async fn refresh(&self) -> Result<StockSnapshot>;
}

/// One full refresh cycle: fetch the raw table, ingest it, recompute both
/// derived tables from scratch.
pub async fn run_refresh_cycle(config: &Config) -> Result<StockSnapshot> {
    let raw = load_source(&config.source.url, config.source.request_timeout()).await?;
    let batch = read_observations(raw.as_slice())
        .with_context(|| format!("failed ingesting source table: {}", config.source.url))?;
    let tables = aggregate(&batch.observations, &config.display);
    info!(
        "refreshed stock tables: {} POIs from {} rows ({} skipped)",
        tables.most_recent.len(),
        batch.observations.len(),
        batch.skipped_rows
    );
    Ok(StockSnapshot {
        tables: Arc::new(tables),
        refreshed_at: Utc::now(),
        input_rows: batch.observations.len(),
        skipped_rows: batch.skipped_rows,
    })
}

pub fn build_provider(config: Config) -> Arc<dyn StockProvider> {
    match config.refresh.strategy {
        RefreshStrategy::Memoize => Arc::new(MemoizedProvider::new(config)),
        RefreshStrategy::Background => Arc::new(ScheduledProvider::start(config)),
    }
}

/// Recomputes on demand and reuses the result until it is older than the
/// refresh interval. A failed refresh with a cached value present serves the
/// stale tables instead of failing the caller.
pub struct MemoizedProvider {
    config: Config,
    ttl: Duration,
    cached: RwLock<Option<StockSnapshot>>,
}

impl MemoizedProvider {
    pub fn new(config: Config) -> Self {
        let ttl = config.refresh.interval();
        Self::with_ttl(config, ttl)
    }

    pub fn with_ttl(config: Config, ttl: Duration) -> Self {
        Self {
            config,
            ttl,
            cached: RwLock::new(None),
        }
    }
}

#[async_trait]
impl StockProvider for MemoizedProvider {
    async fn tables(&self) -> Result<StockSnapshot> {
        if let Some(snapshot) = self.cached.read().await.as_ref() {
            if is_fresh(snapshot, self.ttl) {
                return Ok(snapshot.clone());
            }
        }

        // Holding the write lock across the cycle serializes concurrent
        // refreshes; late arrivals see the fresh value on the re-check.
        let mut guard = self.cached.write().await;
        if let Some(snapshot) = guard.as_ref() {
            if is_fresh(snapshot, self.ttl) {
                return Ok(snapshot.clone());
            }
        }
        match run_refresh_cycle(&self.config).await {
            Ok(snapshot) => {
                *guard = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(err) => match guard.as_ref() {
                Some(stale) => {
                    warn!("refresh failed, serving stale tables: {err:#}");
                    Ok(stale.clone())
                }
                None => Err(err),
            },
        }
    }

    async fn refresh(&self) -> Result<StockSnapshot> {
        let mut guard = self.cached.write().await;
        let snapshot = run_refresh_cycle(&self.config).await?;
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }
}

/// Refreshes on a fixed schedule in an owned background task; callers only
/// ever read the latest snapshot. Failed cycles keep the previous tables.
/// The task lives as long as the provider and is aborted on drop.
pub struct ScheduledProvider {
    config: Config,
    latest: Arc<RwLock<Option<StockSnapshot>>>,
    handle: JoinHandle<()>,
}

impl ScheduledProvider {
    pub fn start(config: Config) -> Self {
        let latest: Arc<RwLock<Option<StockSnapshot>>> = Arc::new(RwLock::new(None));
        let handle = tokio::spawn(run_schedule(config.clone(), Arc::clone(&latest)));
        Self {
            config,
            latest,
            handle,
        }
    }
}

async fn run_schedule(config: Config, latest: Arc<RwLock<Option<StockSnapshot>>>) {
    let mut ticker = tokio::time::interval(config.refresh.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        // The first tick completes immediately, filling the initial tables.
        ticker.tick().await;
        match run_refresh_cycle(&config).await {
            Ok(snapshot) => *latest.write().await = Some(snapshot),
            Err(err) => warn!("scheduled refresh failed, keeping previous tables: {err:#}"),
        }
    }
}

#[async_trait]
impl StockProvider for ScheduledProvider {
    async fn tables(&self) -> Result<StockSnapshot> {
        if let Some(snapshot) = self.latest.read().await.as_ref() {
            return Ok(snapshot.clone());
        }
        // A request can land before the first scheduled cycle finishes.
        self.refresh().await
    }

    async fn refresh(&self) -> Result<StockSnapshot> {
        let snapshot = run_refresh_cycle(&self.config).await?;
        *self.latest.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }
}

impl Drop for ScheduledProvider {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn is_fresh(snapshot: &StockSnapshot, ttl: Duration) -> bool {
    Utc::now()
        .signed_duration_since(snapshot.refreshed_at)
        .to_std()
        // A negative age means the clock went backwards; count that as fresh.
        .map(|age| age < ttl)
        .unwrap_or(true)
}
