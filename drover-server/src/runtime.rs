use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use drover_config::AccountsConfig;
use drover_core::fleet::{
    ClientFactory, DiscoveryDelta, DiscoveryProvider, FleetConfig,
    InMemoryScheduler, LifecycleCoordinator, LifecycleQueue,
    MapBackedCredentialsRepository, OrphanSweeper, RecomputingDiscoverer,
    RegionalClientFactory, SyncSummary, WorkerSummary, collect_workers,
};
use drover_model::{CredentialName, Region, ResourceDomain};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything the daemon wires together around the coordinator.
pub struct FleetRuntime {
    config: FleetConfig,
    coordinator: Arc<LifecycleCoordinator>,
    repository: Arc<MapBackedCredentialsRepository>,
    scheduler: InMemoryScheduler,
    providers: Vec<Arc<dyn DiscoveryProvider>>,
    queue_token: CancellationToken,
    queue_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl fmt::Debug for FleetRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetRuntime")
            .field("coordinator", &self.coordinator)
            .field("repository", &self.repository)
            .field("scheduler", &self.scheduler)
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct FleetSummary {
    pub accounts: Vec<CredentialName>,
    pub domains: Vec<DomainSummary>,
    pub aggregate_members: Option<Vec<CredentialName>>,
    pub scheduled: usize,
}

#[derive(Debug, Serialize)]
pub struct DomainSummary {
    pub domain: ResourceDomain,
    pub coverage: BTreeSet<Region>,
    pub workers: Vec<WorkerSummary>,
}

impl FleetRuntime {
    pub fn start(
        config: &FleetConfig,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let scheduler = InMemoryScheduler::new();
        let clients: Arc<dyn ClientFactory> = Arc::new(
            RegionalClientFactory::new(config.endpoint_suffix.clone()),
        );

        let mut builder = LifecycleCoordinator::builder(config.clone())
            .with_client_factory(Arc::clone(&clients));
        if config.container_handoff {
            builder = builder.with_scheduler(
                ResourceDomain::ContainerOrchestration,
                Arc::new(scheduler.clone()),
            );
        }
        let coordinator = Arc::new(
            builder
                .build()
                .context("failed to wire domain reconcilers")?,
        );

        let queue_token = shutdown.child_token();
        let (queue, queue_task) = LifecycleQueue::spawn(
            Arc::clone(&coordinator),
            config.event_queue_capacity,
            queue_token.clone(),
        );
        let repository = Arc::new(MapBackedCredentialsRepository::new(
            drover_model::credential::DEFAULT_CLOUD_PROVIDER,
            Arc::new(queue),
        ));

        // Handed-off domains are owned by the scheduler already; the rest
        // are picked up at poll time.
        let mut providers: Vec<Arc<dyn DiscoveryProvider>> =
            vec![Arc::new(RecomputingDiscoverer::serverless(
                Arc::clone(&repository) as _,
                clients,
            ))];
        for reconciler in coordinator.reconcilers() {
            if reconciler.registry().scheduler().is_none() {
                providers.push(Arc::clone(reconciler) as _);
            }
        }

        info!(
            domains = ?coordinator.domains(),
            policy = ?coordinator.policy(),
            "Fleet runtime started"
        );

        Ok(Self {
            config: config.clone(),
            coordinator,
            repository,
            scheduler,
            providers,
            queue_token,
            queue_task: Mutex::new(Some(queue_task)),
            shutdown,
        })
    }

    /// Re-reads the accounts and applies the differences.
    pub async fn reload(
        &self,
        accounts: &AccountsConfig,
    ) -> anyhow::Result<SyncSummary> {
        let credentials = accounts.load()?;
        Ok(self.repository.sync_all(credentials).await)
    }

    /// Stops intake and waits until every queued event has been applied.
    pub async fn drain(&self) {
        self.queue_token.cancel();
        if let Some(task) = self.queue_task.lock().await.take()
            && let Err(err) = task.await
        {
            warn!("Lifecycle queue task ended abnormally: {err}");
        }
    }

    /// One scheduler poll across every enabled domain.
    pub async fn poll_once(&self) -> Vec<(ResourceDomain, DiscoveryDelta)> {
        let mut deltas = Vec::new();
        for domain in self.coordinator.domains() {
            let workers =
                collect_workers(&self.providers, domain.tag()).await;
            let delta = self
                .scheduler
                .absorb_discovered(domain.tag(), &workers)
                .await;
            deltas.push((domain, delta));
        }
        deltas
    }

    pub fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let runtime = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let period = self.config.poll_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        for (domain, delta) in runtime.poll_once().await {
                            debug!(
                                domain = %domain,
                                acquired = delta.acquired.len(),
                                retired = delta.retired.len(),
                                "Scheduler poll"
                            );
                        }
                    }
                }
            }
        })
    }

    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        OrphanSweeper::new(
            Arc::clone(&self.coordinator),
            self.config.sweep_interval(),
        )
        .spawn(self.shutdown.clone())
    }

    pub fn spawn_reloader(
        self: &Arc<Self>,
        accounts: AccountsConfig,
        period: std::time::Duration,
    ) -> JoinHandle<()> {
        let runtime = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match runtime.reload(&accounts).await {
                            Ok(summary) if !summary.is_noop() => info!(
                                added = summary.added.len(),
                                updated = summary.updated.len(),
                                deleted = summary.deleted.len(),
                                "Reloaded accounts"
                            ),
                            Ok(_) => {}
                            Err(err) => warn!(
                                "Rejected account reload; keeping previous set: {err:#}"
                            ),
                        }
                    }
                }
            }
        })
    }

    pub async fn summary(&self) -> FleetSummary {
        let mut domains = Vec::new();
        for domain in self.coordinator.domains() {
            let Some(registry) = self.coordinator.registry(domain) else {
                continue;
            };
            domains.push(DomainSummary {
                domain,
                coverage: registry.coverage().await,
                workers: registry
                    .list_workers()
                    .await
                    .iter()
                    .map(|w| w.summary())
                    .collect(),
            });
        }
        FleetSummary {
            accounts: self
                .repository
                .get_all()
                .await
                .iter()
                .map(|c| c.name().clone())
                .collect(),
            domains,
            aggregate_members: self.coordinator.aggregate_members().await,
            scheduled: self.scheduler.len().await,
        }
    }
}
