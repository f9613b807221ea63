use std::sync::Arc;

use apy_math::{estimate, Snapshot};
use tracing::{debug, error, info, warn};

use crate::config::KeeperConfig;
use crate::endpoint::{KeeperEndpoint, RpcKeeper};
use crate::error::{KeeperError, KeeperResult};
use crate::publisher::{PublishReport, RedundantPublisher};
use crate::rpc::EthRpc;
use crate::store::{JsonFileStore, SnapshotStore};
use crate::venue::{read_observation, SettleMode, Venue};
use crate::venues::build_venue;

/// Source of Unix timestamps (seconds)
pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Everything one venue needs for a cycle
pub struct VenueRuntime {
    pub venue: Box<dyn Venue>,
    pub settle: SettleMode,
    pub store: Box<dyn SnapshotStore>,
    pub publisher: RedundantPublisher,
}

impl VenueRuntime {
    pub fn name(&self) -> &str {
        self.venue.name()
    }
}

/// Result of one venue's cycle
#[derive(Debug)]
pub struct CycleReport {
    pub venue: String,
    pub snapshot: Snapshot,
    pub publish: PublishReport,
}

/// Main keeper service: observes venues, extends their history and publishes
/// the resulting APY
pub struct Keeper {
    /// RPC client, absent when every collaborator is in-process
    rpc: Option<Arc<EthRpc>>,

    /// One runtime per enabled venue
    venues: Vec<VenueRuntime>,

    /// Dry run mode flag
    dry_run: bool,

    clock: Clock,
}

impl Keeper {
    pub fn new(venues: Vec<VenueRuntime>, dry_run: bool) -> Self {
        Self {
            rpc: None,
            venues,
            dry_run,
            clock: Box::new(|| chrono::Utc::now().timestamp()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Wire up adapters, stores and keeper endpoints for every enabled venue
    pub fn from_config(config: &KeeperConfig, dry_run: bool) -> KeeperResult<Self> {
        let rpc = Arc::new(EthRpc::new(
            config.rpc_url.clone(),
            config.rpc_timeout(),
            config.receipt_poll(),
        )?);
        let budgets = config.retry.budgets();

        let mut venues = Vec::new();
        for venue_config in config.enabled_venues() {
            let store = JsonFileStore::open(&venue_config.history_path)?;
            let endpoints: Vec<Arc<dyn KeeperEndpoint>> = venue_config
                .keepers
                .iter()
                .map(|target| {
                    Arc::new(RpcKeeper::new(
                        format!("{}/{}", venue_config.name, target.name),
                        target.address.clone(),
                        config.sender.clone(),
                        rpc.clone(),
                    )) as Arc<dyn KeeperEndpoint>
                })
                .collect();

            info!(
                venue = %venue_config.name,
                kind = venue_config.kind(),
                settle = ?venue_config.settle,
                history = store.records().len(),
                keepers = endpoints.len(),
                "venue configured"
            );
            venues.push(VenueRuntime {
                venue: build_venue(venue_config, rpc.clone()),
                settle: venue_config.settle,
                store: Box::new(store),
                publisher: RedundantPublisher::from_endpoints(endpoints, budgets.clone(), config.wire_decimals),
            });
        }

        let mut keeper = Self::new(venues, dry_run);
        keeper.rpc = Some(rpc);
        Ok(keeper)
    }

    pub fn venues(&self) -> &[VenueRuntime] {
        &self.venues
    }

    /// Observe, estimate, record and publish for one venue.
    ///
    /// The snapshot is appended before publishing, so history stays correct
    /// even when every keeper rejects the update.
    pub async fn run_cycle(&mut self, index: usize) -> KeeperResult<CycleReport> {
        let now = (self.clock)();
        let dry_run = self.dry_run;
        let runtime = self
            .venues
            .get_mut(index)
            .ok_or_else(|| KeeperError::InvalidConfig(format!("no venue at index {}", index)))?;

        let mut observation = read_observation(runtime.venue.as_ref(), runtime.settle, now).await?;

        if let Some(last) = runtime.store.last_record() {
            if observation.timestamp < last.timestamp {
                warn!(
                    venue = runtime.name(),
                    observed = observation.timestamp,
                    last = last.timestamp,
                    "clock went backwards, clamping to last snapshot"
                );
                observation.timestamp = last.timestamp;
            }
        }

        let snapshot = estimate(runtime.store.last_record(), observation);
        runtime.store.append(snapshot.clone())?;
        info!(
            venue = runtime.name(),
            balance = %snapshot.balance,
            profit = %snapshot.profit,
            interval = snapshot.interval,
            apy_pct = %snapshot.apy_percent(),
            "snapshot recorded"
        );

        let publish = if dry_run {
            runtime.publisher.dry_run(&snapshot.apy)?
        } else {
            runtime.publisher.publish(&snapshot.apy, snapshot.timestamp).await?
        };

        Ok(CycleReport {
            venue: runtime.name().to_string(),
            snapshot,
            publish,
        })
    }

    /// Run a cycle for every venue. Returns how many venues published.
    pub async fn update_all_venues(&mut self) -> KeeperResult<usize> {
        let mut published = 0;

        for index in 0..self.venues.len() {
            match self.run_cycle(index).await {
                Ok(report) => {
                    if report.publish.is_success() {
                        published += 1;
                    } else if !self.dry_run {
                        warn!(venue = %report.venue, "snapshot recorded but not published");
                    }
                }
                Err(e) => {
                    error!(venue = self.venues[index].name(), error = %e, "venue cycle failed");
                    // Continue with other venues
                }
            }
        }

        Ok(published)
    }

    /// Health check for keeper service
    pub async fn health_check(&self) -> KeeperResult<()> {
        if let Some(rpc) = &self.rpc {
            let block = rpc.block_number().await?;
            debug!(block, url = rpc.url(), "rpc reachable");
        }

        for runtime in &self.venues {
            if let Some(last) = runtime.store.last_record() {
                let age = (self.clock)() - last.timestamp;
                debug!(venue = runtime.name(), age_secs = age, records = runtime.store.records().len(), "history");
            }
        }

        debug!("Health check passed");
        Ok(())
    }
}
