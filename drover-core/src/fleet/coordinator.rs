use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use drover_model::{
    Credential, CredentialName, Region, ResourceDomain, WorkerKind,
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::error::Result;

use super::aggregate::{AggregateSync, CrossAccountAggregator};
use super::builders::standard_builder;
use super::config::{FleetConfig, RegionOwnershipPolicy};
use super::events::{
    CredentialsLifecycleHandler, LifecycleAction, LifecycleEvent,
};
use super::protocol::IncrementalReconciler;
use super::registry::{DomainRegistry, SweepOutcome};
use super::scheduler::WorkScheduler;
use super::worker::{ClientFactory, RegionalClientFactory, WorkerDescriptor};

/// Per-domain slice of a lifecycle report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DomainReport {
    pub domain: ResourceDomain,
    pub added: usize,
    pub skipped: usize,
    pub removed: usize,
    pub orphaned: usize,
    pub reassigned: usize,
    pub claimed: BTreeSet<Region>,
    pub released: BTreeSet<Region>,
    /// Released regions another active account claimed again.
    pub reclaimed: BTreeSet<Region>,
    pub errors: Vec<String>,
}

impl DomainReport {
    fn new(domain: ResourceDomain) -> Self {
        Self {
            domain,
            added: 0,
            skipped: 0,
            removed: 0,
            orphaned: 0,
            reassigned: 0,
            claimed: BTreeSet::new(),
            released: BTreeSet::new(),
            reclaimed: BTreeSet::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    pub action: LifecycleAction,
    pub account: CredentialName,
    pub domains: Vec<DomainReport>,
    pub aggregate: Option<AggregateSync>,
}

impl LifecycleReport {
    pub fn is_clean(&self) -> bool {
        self.domains.iter().all(|d| d.errors.is_empty())
    }

    pub fn failed_domains(&self) -> Vec<ResourceDomain> {
        self.domains
            .iter()
            .filter(|d| !d.errors.is_empty())
            .map(|d| d.domain)
            .collect()
    }

    pub fn domain(&self, domain: ResourceDomain) -> Option<&DomainReport> {
        self.domains.iter().find(|d| d.domain == domain)
    }

    fn total_added(&self) -> usize {
        self.domains.iter().map(|d| d.added).sum()
    }

    fn total_removed(&self) -> usize {
        self.domains.iter().map(|d| d.removed).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DomainSweep {
    pub domain: ResourceDomain,
    pub outcome: SweepOutcome,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub domains: Vec<DomainSweep>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.domains.iter().all(|d| d.outcome.is_empty())
    }
}

/// Entry point for credential lifecycle events.
///
/// Each event visits the domains in their fixed order. Domains are not
/// transactional with each other: a failure in one leaves the others as
/// they were updated.
pub struct LifecycleCoordinator {
    policy: RegionOwnershipPolicy,
    reconcilers: Vec<Arc<IncrementalReconciler>>,
    aggregator: Option<CrossAccountAggregator>,
    active: RwLock<BTreeMap<CredentialName, Arc<Credential>>>,
    account_locks: DashMap<CredentialName, Arc<Mutex<()>>>,
}

impl fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("LifecycleCoordinator");
        debug
            .field("policy", &self.policy)
            .field("domains", &self.domains())
            .field("aggregator", &self.aggregator);
        match self.active.try_read() {
            Ok(active) => {
                debug.field("active", &active.keys().collect::<Vec<_>>());
            }
            Err(_) => {
                debug.field("active", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl LifecycleCoordinator {
    pub fn builder(config: FleetConfig) -> LifecycleCoordinatorBuilder {
        LifecycleCoordinatorBuilder::new(config)
    }

    pub fn policy(&self) -> RegionOwnershipPolicy {
        self.policy
    }

    pub fn domains(&self) -> Vec<ResourceDomain> {
        self.reconcilers.iter().map(|r| r.domain()).collect()
    }

    pub fn reconcilers(&self) -> &[Arc<IncrementalReconciler>] {
        &self.reconcilers
    }

    pub fn registry(
        &self,
        domain: ResourceDomain,
    ) -> Option<&Arc<DomainRegistry>> {
        self.reconcilers
            .iter()
            .find(|r| r.domain() == domain)
            .map(|r| r.registry())
    }

    pub async fn active_credentials(&self) -> Vec<Arc<Credential>> {
        self.active.read().await.values().cloned().collect()
    }

    /// Every worker tagged with `account`, across domains.
    pub async fn workers_for(
        &self,
        account: &CredentialName,
    ) -> Vec<WorkerDescriptor> {
        let mut workers = Vec::new();
        for reconciler in &self.reconcilers {
            workers.extend(reconciler.registry().workers_for(account).await);
        }
        workers
    }

    pub async fn all_workers(&self) -> Vec<WorkerDescriptor> {
        let mut workers = Vec::new();
        for reconciler in &self.reconcilers {
            workers.extend(reconciler.registry().list_workers().await);
        }
        workers
    }

    /// Current members of the cross-account aggregate, if one is registered.
    pub async fn aggregate_members(&self) -> Option<Vec<CredentialName>> {
        let aggregator = self.aggregator.as_ref()?;
        let registry = self.registry(ResourceDomain::Compute)?;
        let handle = registry.aggregate(aggregator.kind()).await?;
        Some(handle.names().await)
    }

    fn account_gate(&self, account: &CredentialName) -> Arc<Mutex<()>> {
        Arc::clone(
            self.account_locks.entry(account.clone()).or_default().value(),
        )
    }

    /// Drops the gate of a deleted account unless another event holds it.
    fn evict_gate(&self, account: &CredentialName, gate: Arc<Mutex<()>>) {
        drop(gate);
        self.account_locks
            .remove_if(account, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub async fn apply(&self, event: LifecycleEvent) -> LifecycleReport {
        let LifecycleEvent { action, credential } = event;
        let account = credential.name().clone();

        // Events for one account apply in arrival order.
        let gate = self.account_gate(&account);
        let ordered = gate.lock().await;

        let mut report = LifecycleReport {
            action,
            account: account.clone(),
            domains: self
                .reconcilers
                .iter()
                .map(|r| DomainReport::new(r.domain()))
                .collect(),
            aggregate: None,
        };

        match action {
            LifecycleAction::Added => {
                self.schedule(&credential, &mut report).await;
                self.activate(&credential).await;
            }
            LifecycleAction::Updated => {
                self.unschedule(&account, &mut report).await;
                self.schedule(&credential, &mut report).await;
                self.activate(&credential).await;
            }
            LifecycleAction::Deleted => {
                self.unschedule(&account, &mut report).await;
                self.active.write().await.remove(&account);
            }
        }

        let member =
            (action != LifecycleAction::Deleted).then_some(&credential);
        report.aggregate = self.sync_aggregate(&account, member).await;

        drop(ordered);
        if action == LifecycleAction::Deleted {
            self.evict_gate(&account, gate);
        }
        self.reclaim_released(&account, &mut report).await;

        info!(
            account = %account,
            action = %action,
            added = report.total_added(),
            removed = report.total_removed(),
            failed = report.failed_domains().len(),
            "Applied lifecycle event"
        );
        report
    }

    async fn schedule(
        &self,
        credential: &Arc<Credential>,
        report: &mut LifecycleReport,
    ) {
        for (reconciler, slot) in
            self.reconcilers.iter().zip(report.domains.iter_mut())
        {
            match reconciler.reconcile(credential).await {
                Ok(outcome) => {
                    slot.added += outcome.added.len();
                    slot.skipped += outcome.skipped;
                    slot.claimed.extend(outcome.claimed);
                }
                Err(err) => {
                    error!(
                        account = %credential.name(),
                        domain = %reconciler.domain(),
                        "Failed to schedule workers: {err}"
                    );
                    slot.errors.push(err.to_string());
                }
            }
        }
    }

    async fn unschedule(
        &self,
        account: &CredentialName,
        report: &mut LifecycleReport,
    ) {
        for (reconciler, slot) in
            self.reconcilers.iter().zip(report.domains.iter_mut())
        {
            match reconciler.unregister(account, self.policy).await {
                Ok(removal) => {
                    slot.removed += removal.removed.len();
                    slot.orphaned += removal.orphaned.len();
                    slot.reassigned += removal.reassigned.len();
                    slot.released.extend(removal.released);
                }
                Err(err) => {
                    error!(
                        account = %account,
                        domain = %reconciler.domain(),
                        "Failed to release workers: {err}"
                    );
                    slot.errors.push(err.to_string());
                }
            }
        }
    }

    /// Lets other active accounts listing a region this event released claim
    /// it again. Each one is rebuilt under its own gate, in name order, so the
    /// lexicographically first account becomes the new owner.
    async fn reclaim_released(
        &self,
        account: &CredentialName,
        report: &mut LifecycleReport,
    ) {
        for (reconciler, slot) in
            self.reconcilers.iter().zip(report.domains.iter_mut())
        {
            if slot.released.is_empty() {
                continue;
            }
            let survivors: Vec<CredentialName> = self
                .active
                .read()
                .await
                .values()
                .filter(|c| c.name() != account)
                .filter(|c| {
                    c.regions().iter().any(|r| slot.released.contains(r))
                })
                .map(|c| c.name().clone())
                .collect();

            for survivor in survivors {
                let gate = self.account_gate(&survivor);
                let _ordered = gate.lock().await;
                let Some(credential) =
                    self.active.read().await.get(&survivor).cloned()
                else {
                    continue;
                };
                match reconciler.reconcile(&credential).await {
                    Ok(outcome) => slot.reclaimed.extend(outcome.claimed),
                    Err(err) => {
                        error!(
                            account = %survivor,
                            domain = %reconciler.domain(),
                            "Failed to reclaim released regions: {err}"
                        );
                        slot.errors.push(err.to_string());
                    }
                }
            }
        }
    }

    async fn activate(&self, credential: &Arc<Credential>) {
        self.active
            .write()
            .await
            .insert(credential.name().clone(), Arc::clone(credential));
    }

    async fn sync_aggregate(
        &self,
        account: &CredentialName,
        credential: Option<&Arc<Credential>>,
    ) -> Option<AggregateSync> {
        let aggregator = self.aggregator.as_ref()?;
        let active = self.active_credentials().await;
        Some(aggregator.sync(account, credential, &active).await)
    }

    /// Adopts or drops orphaned region workers in every domain.
    pub async fn sweep_orphans(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for reconciler in &self.reconcilers {
            let domain = reconciler.domain();
            let (outcome, error) = match reconciler.sweep().await {
                Ok(outcome) => (outcome, None),
                Err(err) => {
                    error!(domain = %domain, "Orphan sweep failed: {err}");
                    (SweepOutcome::default(), Some(err.to_string()))
                }
            };
            if !outcome.is_empty() {
                info!(
                    domain = %domain,
                    adopted = outcome.adopted.len(),
                    removed = outcome.removed.len(),
                    released = outcome.released.len(),
                    "Swept orphaned region workers"
                );
            }
            report.domains.push(DomainSweep {
                domain,
                outcome,
                error,
            });
        }
        report
    }
}

#[async_trait]
impl CredentialsLifecycleHandler for LifecycleCoordinator {
    async fn credentials_added(&self, credential: Option<&Arc<Credential>>) {
        match credential {
            Some(credential) => {
                self.apply(LifecycleEvent::added(Arc::clone(credential))).await;
            }
            None => warn!("Ignoring added notification without a credential"),
        }
    }

    async fn credentials_updated(&self, credential: Option<&Arc<Credential>>) {
        match credential {
            Some(credential) => {
                self.apply(LifecycleEvent::updated(Arc::clone(credential)))
                    .await;
            }
            None => warn!("Ignoring updated notification without a credential"),
        }
    }

    async fn credentials_deleted(&self, credential: Option<&Arc<Credential>>) {
        match credential {
            Some(credential) => {
                self.apply(LifecycleEvent::deleted(Arc::clone(credential)))
                    .await;
            }
            None => warn!("Ignoring deleted notification without a credential"),
        }
    }
}

/// Wires the standard domain reconcilers from a [`FleetConfig`].
pub struct LifecycleCoordinatorBuilder {
    config: FleetConfig,
    clients: Option<Arc<dyn ClientFactory>>,
    schedulers: HashMap<ResourceDomain, Arc<dyn WorkScheduler>>,
    custom: HashMap<ResourceDomain, IncrementalReconciler>,
}

impl fmt::Debug for LifecycleCoordinatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCoordinatorBuilder")
            .field("config", &self.config)
            .field("custom_clients", &self.clients.is_some())
            .field(
                "scheduled_domains",
                &self.schedulers.keys().collect::<Vec<_>>(),
            )
            .field("custom_domains", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LifecycleCoordinatorBuilder {
    pub fn new(config: FleetConfig) -> Self {
        Self {
            config,
            clients: None,
            schedulers: HashMap::new(),
            custom: HashMap::new(),
        }
    }

    pub fn with_client_factory(
        mut self,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Binds `domain`'s registry to an external scheduler.
    pub fn with_scheduler(
        mut self,
        domain: ResourceDomain,
        scheduler: Arc<dyn WorkScheduler>,
    ) -> Self {
        self.schedulers.insert(domain, scheduler);
        self
    }

    /// Replaces the standard reconciler of the reconciler's domain.
    pub fn with_reconciler(
        mut self,
        reconciler: IncrementalReconciler,
    ) -> Self {
        self.custom.insert(reconciler.domain(), reconciler);
        self
    }

    pub fn build(mut self) -> Result<LifecycleCoordinator> {
        let clients = self.clients.take().unwrap_or_else(|| {
            Arc::new(RegionalClientFactory::new(
                self.config.endpoint_suffix.clone(),
            ))
        });

        let mut reconcilers = Vec::new();
        for domain in ResourceDomain::ALL {
            if let Some(custom) = self.custom.remove(&domain) {
                reconcilers.push(Arc::new(custom));
                continue;
            }
            if !self.config.domains.enabled(domain) {
                continue;
            }
            let registry = match self.schedulers.get(&domain) {
                Some(scheduler) => DomainRegistry::with_scheduler(
                    domain,
                    Arc::clone(scheduler),
                ),
                None => DomainRegistry::new(domain),
            };
            let builder =
                standard_builder(domain, &self.config, Arc::clone(&clients));
            reconcilers.push(Arc::new(IncrementalReconciler::new(
                Arc::new(registry),
                builder,
            )?));
        }

        let aggregator = reconcilers
            .iter()
            .find(|r| r.domain() == WorkerKind::ReservationReport.domain())
            .map(|r| {
                CrossAccountAggregator::reservation_reports(Arc::clone(
                    r.registry(),
                ))
            });

        Ok(LifecycleCoordinator {
            policy: self.config.region_policy,
            reconcilers,
            aggregator,
            active: RwLock::new(BTreeMap::new()),
            account_locks: DashMap::new(),
        })
    }
}
