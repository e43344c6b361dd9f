//! External work scheduler contract and an in-process implementation.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drover_model::{ResourceDomain, WorkerId, WorkerOwner};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

use super::worker::WorkerDescriptor;

/// Scheduler that owns the partitions workers poll.
///
/// Reconcilers release stale ownership with `unschedule` before they
/// `schedule` a worker, so implementations may treat a `schedule` for an id
/// they already own as a double acquisition.
#[async_trait]
pub trait WorkScheduler: Send + Sync {
    /// Acquire ownership of the given workers
    async fn schedule(
        &self,
        domain: ResourceDomain,
        workers: &[WorkerDescriptor],
    ) -> Result<()>;

    /// Release ownership; unknown ids are ignored
    async fn unschedule(
        &self,
        domain: ResourceDomain,
        worker_ids: &[WorkerId],
    ) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOrigin {
    /// Acquired through a reconciler handoff.
    Handoff,
    /// Acquired from a poll-time discovery result.
    Discovered,
}

/// Ownership record for one scheduled worker.
#[derive(Clone, Debug, Serialize)]
pub struct Assignment {
    pub domain: ResourceDomain,
    pub owner: WorkerOwner,
    pub lease: Uuid,
    pub origin: AssignmentOrigin,
    pub acquired_at: DateTime<Utc>,
}

/// Changes produced by absorbing one discovery poll.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryDelta {
    pub acquired: Vec<WorkerId>,
    pub retired: Vec<WorkerId>,
    pub unchanged: usize,
}

#[derive(Debug, Default)]
struct SchedulerState {
    active: HashMap<WorkerId, Assignment>,
    discovered: HashMap<String, BTreeSet<WorkerId>>,
    double_acquisitions: u64,
}

/// In-memory scheduler tracking partition ownership.
#[derive(Clone, Default)]
pub struct InMemoryScheduler {
    state: Arc<tokio::sync::Mutex<SchedulerState>>,
}

impl fmt::Debug for InMemoryScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryScheduler");
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("active", &state.active.len())
                    .field("discovery_sources", &state.discovered.len())
                    .field("double_acquisitions", &state.double_acquisitions);
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn active_ids(&self) -> Vec<WorkerId> {
        let state = self.state.lock().await;
        let mut ids: Vec<WorkerId> = state.active.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn assignment(&self, id: &WorkerId) -> Option<Assignment> {
        self.state.lock().await.active.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.active.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Times a worker was scheduled while already owned.
    pub async fn double_acquisitions(&self) -> u64 {
        self.state.lock().await.double_acquisitions
    }

    /// Replaces the last discovery result from `source` with `workers`.
    ///
    /// Workers already owned through a handoff are left alone; discovered
    /// workers missing from the new result are retired.
    pub async fn absorb_discovered(
        &self,
        source: &str,
        workers: &[WorkerDescriptor],
    ) -> DiscoveryDelta {
        let mut state = self.state.lock().await;
        let mut delta = DiscoveryDelta::default();
        let key = source.to_ascii_lowercase();

        let mut current = BTreeSet::new();
        for worker in workers {
            if !current.insert(worker.id().clone()) {
                continue;
            }
            if let Some(held) = state.active.get_mut(worker.id()) {
                // Region-global workers change hands when their owner leaves.
                held.owner = worker.owner().clone();
                delta.unchanged += 1;
                continue;
            }
            state.active.insert(
                worker.id().clone(),
                Assignment {
                    domain: worker.domain(),
                    owner: worker.owner().clone(),
                    lease: Uuid::now_v7(),
                    origin: AssignmentOrigin::Discovered,
                    acquired_at: Utc::now(),
                },
            );
            delta.acquired.push(worker.id().clone());
        }

        let previous = state.discovered.remove(&key).unwrap_or_default();
        for id in previous.difference(&current) {
            let discovered = state
                .active
                .get(id)
                .is_some_and(|a| a.origin == AssignmentOrigin::Discovered);
            if discovered {
                state.active.remove(id);
                delta.retired.push(id.clone());
            }
        }
        state.discovered.insert(key, current);

        debug!(
            source,
            acquired = delta.acquired.len(),
            retired = delta.retired.len(),
            unchanged = delta.unchanged,
            "Absorbed discovery poll"
        );
        delta
    }
}

#[async_trait]
impl WorkScheduler for InMemoryScheduler {
    async fn schedule(
        &self,
        domain: ResourceDomain,
        workers: &[WorkerDescriptor],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        for worker in workers {
            let assignment = Assignment {
                domain,
                owner: worker.owner().clone(),
                lease: Uuid::now_v7(),
                origin: AssignmentOrigin::Handoff,
                acquired_at: Utc::now(),
            };
            if state
                .active
                .insert(worker.id().clone(), assignment)
                .is_some()
            {
                state.double_acquisitions += 1;
                warn!(
                    domain = %domain,
                    worker = %worker.id(),
                    "Worker scheduled while already owned"
                );
            }
        }
        Ok(())
    }

    async fn unschedule(
        &self,
        domain: ResourceDomain,
        worker_ids: &[WorkerId],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut released = 0usize;
        for id in worker_ids {
            if state.active.remove(id).is_some() {
                released += 1;
            }
        }
        debug!(domain = %domain, released, "Released worker ownership");
        Ok(())
    }
}
