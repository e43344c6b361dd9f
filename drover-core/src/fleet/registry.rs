use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use drover_model::{
    Credential, CredentialName, Region, ResourceDomain, WorkerId, WorkerKind,
    WorkerOwner, WorkerScope,
};
use serde::Serialize;
use tokio::sync::Mutex;

use super::aggregate::AggregateHandle;
use super::builders::{BuildContext, BuildResult};
use super::config::RegionOwnershipPolicy;
use super::scheduler::WorkScheduler;
use super::worker::WorkerDescriptor;

/// Live worker collection of one resource domain.
///
/// Workers, region coverage, account membership, the aggregate index and the
/// health index all live behind a single lock.
pub struct DomainRegistry {
    domain: ResourceDomain,
    state: Mutex<DomainState>,
    scheduler: Option<Arc<dyn WorkScheduler>>,
}

#[derive(Debug, Default)]
struct DomainState {
    workers: BTreeMap<WorkerId, WorkerDescriptor>,
    coverage: BTreeSet<Region>,
    members: BTreeMap<CredentialName, BTreeSet<Region>>,
    aggregates: HashMap<WorkerKind, AggregateHandle>,
    health: BTreeSet<WorkerId>,
}

impl fmt::Debug for DomainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("DomainRegistry");
        debug
            .field("domain", &self.domain)
            .field("scheduler", &self.scheduler.is_some());
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("workers", &state.workers.len())
                    .field("coverage", &state.coverage)
                    .field(
                        "members",
                        &state.members.keys().collect::<Vec<_>>(),
                    );
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

/// Record of what one commit changed, used to undo it.
#[derive(Debug, Default)]
pub struct Commit {
    pub account: Option<CredentialName>,
    pub added: Vec<WorkerDescriptor>,
    pub claimed: BTreeSet<Region>,
    pub skipped: usize,
    previous_membership: Option<Option<BTreeSet<Region>>>,
}

impl Commit {
    pub fn added_ids(&self) -> Vec<WorkerId> {
        self.added.iter().map(|w| w.id().clone()).collect()
    }
}

/// Result of removing an account's workers.
#[derive(Debug, Default)]
pub struct Removal {
    pub removed: Vec<WorkerDescriptor>,
    pub orphaned: Vec<WorkerId>,
    pub reassigned: Vec<(WorkerId, CredentialName)>,
    pub released: BTreeSet<Region>,
}

impl Removal {
    pub fn removed_ids(&self) -> Vec<WorkerId> {
        self.removed.iter().map(|w| w.id().clone()).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub adopted: Vec<(WorkerId, CredentialName)>,
    pub removed: Vec<WorkerId>,
    pub released: BTreeSet<Region>,
}

impl SweepOutcome {
    pub fn is_empty(&self) -> bool {
        self.adopted.is_empty() && self.removed.is_empty()
    }
}

impl DomainState {
    fn resync_health(&mut self) {
        self.health = self
            .workers
            .values()
            .filter(|w| w.kind().provides_health())
            .map(|w| w.id().clone())
            .collect();
    }

    /// Lexicographically first member that lists `region`.
    fn heir_for(&self, region: &Region) -> Option<CredentialName> {
        self.members
            .iter()
            .find(|(_, regions)| regions.contains(region))
            .map(|(name, _)| name.clone())
    }

    fn has_region_global(&self, region: &Region) -> bool {
        self.workers.values().any(|w| {
            w.kind().scope() == WorkerScope::RegionGlobal
                && w.region() == Some(region)
        })
    }

    fn release_uncovered(
        &mut self,
        candidates: BTreeSet<Region>,
    ) -> BTreeSet<Region> {
        let mut released = BTreeSet::new();
        for region in candidates {
            if !self.has_region_global(&region)
                && self.coverage.remove(&region)
            {
                released.insert(region);
            }
        }
        released
    }

    fn insert_worker(&mut self, worker: WorkerDescriptor) -> bool {
        if self.workers.contains_key(worker.id()) {
            return false;
        }
        if let Some(members) = worker.members() {
            self.aggregates
                .entry(worker.kind())
                .or_insert_with(|| Arc::clone(members));
        }
        self.workers.insert(worker.id().clone(), worker);
        true
    }

    fn take_worker(&mut self, id: &WorkerId) -> Option<WorkerDescriptor> {
        let worker = self.workers.remove(id)?;
        if worker.members().is_some() {
            self.aggregates.remove(&worker.kind());
        }
        Some(worker)
    }
}

impl DomainRegistry {
    pub fn new(domain: ResourceDomain) -> Self {
        Self {
            domain,
            state: Mutex::new(DomainState::default()),
            scheduler: None,
        }
    }

    pub fn with_scheduler(
        domain: ResourceDomain,
        scheduler: Arc<dyn WorkScheduler>,
    ) -> Self {
        Self {
            scheduler: Some(scheduler),
            ..Self::new(domain)
        }
    }

    pub fn domain(&self) -> ResourceDomain {
        self.domain
    }

    pub fn scheduler(&self) -> Option<&Arc<dyn WorkScheduler>> {
        self.scheduler.as_ref()
    }

    /// Inserts descriptors whose id is not yet registered; returns the ones
    /// that were added.
    pub async fn add_workers(
        &self,
        workers: Vec<WorkerDescriptor>,
    ) -> Vec<WorkerDescriptor> {
        let mut state = self.state.lock().await;
        let mut added = Vec::new();
        for worker in workers {
            if state.insert_worker(worker.clone()) {
                added.push(worker);
            }
        }
        state.resync_health();
        added
    }

    pub async fn list_workers(&self) -> Vec<WorkerDescriptor> {
        self.state.lock().await.workers.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.workers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: &WorkerId) -> Option<WorkerDescriptor> {
        self.state.lock().await.workers.get(id).cloned()
    }

    pub async fn workers_for(
        &self,
        account: &CredentialName,
    ) -> Vec<WorkerDescriptor> {
        self.state
            .lock()
            .await
            .workers
            .values()
            .filter(|w| w.is_owned_by(account))
            .cloned()
            .collect()
    }

    pub async fn orphans(&self) -> Vec<WorkerDescriptor> {
        self.state
            .lock()
            .await
            .workers
            .values()
            .filter(|w| w.owner().is_orphaned())
            .cloned()
            .collect()
    }

    pub async fn coverage(&self) -> BTreeSet<Region> {
        self.state.lock().await.coverage.clone()
    }

    pub async fn members(&self) -> Vec<CredentialName> {
        self.state.lock().await.members.keys().cloned().collect()
    }

    pub async fn aggregate(&self, kind: WorkerKind) -> Option<AggregateHandle> {
        self.state.lock().await.aggregates.get(&kind).cloned()
    }

    pub async fn health_workers(&self) -> Vec<WorkerId> {
        self.state.lock().await.health.iter().cloned().collect()
    }

    pub async fn build_context(
        &self,
        account: &CredentialName,
    ) -> BuildContext {
        let state = self.state.lock().await;
        BuildContext {
            represented: state.members.contains_key(account),
            coverage: state.coverage.clone(),
            aggregates: state.aggregates.keys().copied().collect(),
        }
    }

    /// Applies a build result computed outside the lock.
    ///
    /// Region-global workers for regions covered since the snapshot are
    /// dropped, so each region keeps a single first writer.
    pub async fn commit(
        &self,
        credential: &Credential,
        result: BuildResult,
    ) -> Commit {
        let mut state = self.state.lock().await;
        let mut commit = Commit {
            account: Some(credential.name().clone()),
            ..Commit::default()
        };

        let claimable: BTreeSet<Region> = result
            .regions_to_cover
            .into_iter()
            .filter(|region| !state.coverage.contains(region))
            .collect();
        let produced_any = !result.workers.is_empty();

        for worker in result.workers {
            let lost_region = worker.kind().scope() == WorkerScope::RegionGlobal
                && worker.region().is_none_or(|r| !claimable.contains(r));
            if lost_region || !state.insert_worker(worker.clone()) {
                commit.skipped += 1;
                continue;
            }
            commit.added.push(worker);
        }

        for region in claimable {
            state.coverage.insert(region.clone());
            commit.claimed.insert(region);
        }

        if produced_any {
            let regions = credential.regions().iter().cloned().collect();
            commit.previous_membership =
                Some(state.members.insert(credential.name().clone(), regions));
        }

        state.resync_health();
        commit
    }

    /// Undoes a commit whose scheduler handoff failed.
    pub async fn rollback(&self, commit: Commit) {
        let mut state = self.state.lock().await;
        for worker in &commit.added {
            state.take_worker(worker.id());
        }
        for region in &commit.claimed {
            if !state.has_region_global(region) {
                state.coverage.remove(region);
            }
        }
        if let (Some(account), Some(previous)) =
            (commit.account, commit.previous_membership)
        {
            match previous {
                Some(regions) => {
                    state.members.insert(account, regions);
                }
                None => {
                    state.members.remove(&account);
                }
            }
        }
        state.resync_health();
    }

    /// Removes every worker tagged with `account`. Region-global workers are
    /// handled according to `policy`.
    pub async fn remove_workers_for_account(
        &self,
        account: &CredentialName,
        policy: RegionOwnershipPolicy,
    ) -> Removal {
        let mut state = self.state.lock().await;
        let mut removal = Removal::default();
        state.members.remove(account);

        let owned: Vec<WorkerId> = state
            .workers
            .values()
            .filter(|w| w.is_owned_by(account))
            .map(|w| w.id().clone())
            .collect();

        let mut vacated = BTreeSet::new();
        for id in owned {
            let Some(worker) = state.workers.get(&id) else {
                continue;
            };
            let region = worker.region().cloned();
            if worker.kind().scope() == WorkerScope::RegionGlobal {
                let heir = match policy {
                    RegionOwnershipPolicy::Retain => {
                        if let Some(worker) = state.workers.get_mut(&id) {
                            worker.set_owner(WorkerOwner::Orphaned {
                                former: account.clone(),
                            });
                        }
                        removal.orphaned.push(id);
                        continue;
                    }
                    RegionOwnershipPolicy::Reassign => {
                        region.as_ref().and_then(|r| state.heir_for(r))
                    }
                    RegionOwnershipPolicy::Release => None,
                };
                if let Some(heir) = heir {
                    if let Some(worker) = state.workers.get_mut(&id) {
                        worker.set_owner(WorkerOwner::Account(heir.clone()));
                    }
                    removal.reassigned.push((id, heir));
                    continue;
                }
                vacated.extend(region);
            }
            if let Some(worker) = state.take_worker(&id) {
                removal.removed.push(worker);
            }
        }

        removal.released = state.release_uncovered(vacated);
        state.resync_health();
        removal
    }

    /// Hands orphans to a member listing their region, or drops them.
    pub async fn sweep_orphans(&self) -> SweepOutcome {
        let mut state = self.state.lock().await;
        let mut outcome = SweepOutcome::default();

        let orphans: Vec<(WorkerId, Option<Region>)> = state
            .workers
            .values()
            .filter(|w| w.owner().is_orphaned())
            .map(|w| (w.id().clone(), w.region().cloned()))
            .collect();
        if orphans.is_empty() {
            return outcome;
        }

        let mut vacated = BTreeSet::new();
        for (id, region) in orphans {
            match region.as_ref().and_then(|r| state.heir_for(r)) {
                Some(heir) => {
                    if let Some(worker) = state.workers.get_mut(&id) {
                        worker.set_owner(WorkerOwner::Account(heir.clone()));
                    }
                    outcome.adopted.push((id, heir));
                }
                None => {
                    state.take_worker(&id);
                    vacated.extend(region);
                    outcome.removed.push(id);
                }
            }
        }

        outcome.released = state.release_uncovered(vacated);
        state.resync_health();
        outcome
    }
}
