use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use drover_model::{
    Credential, CredentialName, Region, ResourceDomain, WorkerId,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::{FleetError, Result};

use super::builders::WorkerSetBuilder;
use super::config::RegionOwnershipPolicy;
use super::discovery::DiscoveryProvider;
use super::registry::{DomainRegistry, Removal, SweepOutcome};
use super::scheduler::WorkScheduler;
use super::worker::WorkerDescriptor;

/// What one reconcile added to its domain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: Vec<WorkerId>,
    pub claimed: BTreeSet<Region>,
    pub skipped: usize,
}

/// Applies builder output to one domain registry and keeps the bound
/// scheduler's ownership in step.
///
/// Ids the scheduler refused to release are kept and retried by the next
/// [`sweep`](Self::sweep).
pub struct IncrementalReconciler {
    registry: Arc<DomainRegistry>,
    builder: Arc<dyn WorkerSetBuilder>,
    unreleased: Mutex<BTreeSet<WorkerId>>,
}

impl fmt::Debug for IncrementalReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalReconciler")
            .field("registry", &self.registry)
            .field("builder", &self.builder)
            .field(
                "unreleased",
                &self.unreleased.try_lock().map(|ids| ids.len()).ok(),
            )
            .finish()
    }
}

impl IncrementalReconciler {
    pub fn new(
        registry: Arc<DomainRegistry>,
        builder: Arc<dyn WorkerSetBuilder>,
    ) -> Result<Self> {
        if registry.domain() != builder.domain() {
            return Err(FleetError::Internal(format!(
                "{} builder cannot feed the {} registry",
                builder.domain(),
                registry.domain()
            )));
        }
        Ok(Self {
            registry,
            builder,
            unreleased: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn domain(&self) -> ResourceDomain {
        self.registry.domain()
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    /// Builds and registers the workers `credential` needs in this domain.
    ///
    /// With a scheduler bound, each added worker is released and then
    /// acquired. If that handoff fails the commit is undone.
    pub async fn reconcile(
        &self,
        credential: &Arc<Credential>,
    ) -> Result<ReconcileOutcome> {
        let domain = self.domain();
        let context = self.registry.build_context(credential.name()).await;
        let result =
            self.builder.build(credential, &context).map_err(|source| {
                FleetError::Build {
                    domain,
                    account: credential.name().clone(),
                    source,
                }
            })?;

        let commit = self.registry.commit(credential, result).await;
        let outcome = ReconcileOutcome {
            added: commit.added_ids(),
            claimed: commit.claimed.clone(),
            skipped: commit.skipped,
        };

        if let Some(scheduler) = self.registry.scheduler()
            && !commit.added.is_empty()
        {
            let handoff =
                self.hand_off(scheduler.as_ref(), &commit.added).await;
            let Err(err) = handoff else {
                return Ok(outcome);
            };
            let ids = commit.added_ids();
            self.registry.rollback(commit).await;
            // Best effort; refused ids wait for the next sweep.
            let _ = self.release_or_defer(&ids).await;
            return Err(err);
        }

        Ok(outcome)
    }

    async fn hand_off(
        &self,
        scheduler: &dyn WorkScheduler,
        workers: &[WorkerDescriptor],
    ) -> Result<()> {
        let domain = self.domain();
        let ids: Vec<WorkerId> =
            workers.iter().map(|w| w.id().clone()).collect();
        scheduler.unschedule(domain, &ids).await?;
        scheduler.schedule(domain, workers).await?;
        debug!(
            domain = %domain,
            workers = ids.len(),
            "Handed workers to scheduler"
        );
        Ok(())
    }

    /// Removes the account's workers, then releases them in the scheduler.
    ///
    /// The registry change stands even when the release fails; the refused
    /// ids are retried by the next sweep.
    pub async fn unregister(
        &self,
        account: &CredentialName,
        policy: RegionOwnershipPolicy,
    ) -> Result<Removal> {
        let removal = self
            .registry
            .remove_workers_for_account(account, policy)
            .await;
        self.release_or_defer(&removal.removed_ids()).await?;
        Ok(removal)
    }

    /// Retries deferred releases, then adopts or drops orphans.
    pub async fn sweep(&self) -> Result<SweepOutcome> {
        let retried = self.retry_unreleased().await;
        let outcome = self.registry.sweep_orphans().await;
        self.release_or_defer(&outcome.removed).await?;
        retried?;
        Ok(outcome)
    }

    /// Ids waiting for a scheduler release.
    pub async fn unreleased(&self) -> Vec<WorkerId> {
        self.unreleased.lock().await.iter().cloned().collect()
    }

    async fn release_or_defer(&self, ids: &[WorkerId]) -> Result<()> {
        let result = self.release(ids).await;
        if let Err(err) = &result {
            error!(
                domain = %self.domain(),
                workers = ids.len(),
                "Scheduler refused release; retrying at next sweep: {err}"
            );
            self.unreleased.lock().await.extend(ids.iter().cloned());
        }
        result
    }

    async fn retry_unreleased(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.unreleased.lock().await);
        if pending.is_empty() {
            return Ok(());
        }
        // Ids registered again since the failure belong to the scheduler now.
        let mut stale = Vec::with_capacity(pending.len());
        for id in pending {
            if self.registry.get(&id).await.is_none() {
                stale.push(id);
            }
        }
        self.release_or_defer(&stale).await?;
        if !stale.is_empty() {
            info!(
                domain = %self.domain(),
                workers = stale.len(),
                "Released workers the scheduler had kept"
            );
        }
        Ok(())
    }

    async fn release(&self, ids: &[WorkerId]) -> Result<()> {
        match self.registry.scheduler() {
            Some(scheduler) if !ids.is_empty() => {
                scheduler.unschedule(self.domain(), ids).await
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DiscoveryProvider for IncrementalReconciler {
    fn supports(&self, domain_tag: &str) -> bool {
        self.domain().tag().eq_ignore_ascii_case(domain_tag.trim())
    }

    async fn discover(&self) -> Vec<WorkerDescriptor> {
        self.registry.list_workers().await
    }
}
