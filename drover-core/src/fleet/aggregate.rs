use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use drover_model::{Credential, CredentialName, WorkerKind};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::registry::DomainRegistry;

pub type AggregateHandle = Arc<AggregateMembers>;

/// Member set of a cross-account worker, keyed by credential name.
#[derive(Default)]
pub struct AggregateMembers {
    state: Mutex<MemberState>,
}

#[derive(Debug, Default)]
struct MemberState {
    seeded: bool,
    members: BTreeMap<CredentialName, Arc<Credential>>,
}

impl fmt::Debug for AggregateMembers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AggregateMembers");
        match self.state.try_lock() {
            Ok(state) => {
                debug.field("seeded", &state.seeded).field(
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

impl AggregateMembers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn names(&self) -> Vec<CredentialName> {
        self.state.lock().await.members.keys().cloned().collect()
    }

    pub async fn credentials(&self) -> Vec<Arc<Credential>> {
        self.state.lock().await.members.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.members.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, name: &CredentialName) -> bool {
        self.state.lock().await.members.contains_key(name)
    }
}

/// Outcome of one aggregate sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregateSync {
    /// No aggregate of that kind is registered yet.
    NotFound,
    Synced { seeded: bool, members: usize },
}

/// Keeps a cross-account aggregate's member set equal to the active,
/// eligible credentials.
pub struct CrossAccountAggregator {
    registry: Arc<DomainRegistry>,
    kind: WorkerKind,
    eligible: fn(&Credential) -> bool,
}

impl fmt::Debug for CrossAccountAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossAccountAggregator")
            .field("domain", &self.registry.domain())
            .field("kind", &self.kind)
            .finish()
    }
}

impl CrossAccountAggregator {
    pub fn new(
        registry: Arc<DomainRegistry>,
        kind: WorkerKind,
        eligible: fn(&Credential) -> bool,
    ) -> Self {
        Self {
            registry,
            kind,
            eligible,
        }
    }

    /// The reservation report aggregate of the compute domain.
    pub fn reservation_reports(registry: Arc<DomainRegistry>) -> Self {
        Self::new(registry, WorkerKind::ReservationReport, |credential| {
            credential.capabilities().reservation_reports
        })
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Removes any entry named `name`, then inserts `credential` if given and
    /// eligible. `active` seeds the member set the first time the aggregate
    /// is seen and must already reflect the event being applied.
    pub async fn sync(
        &self,
        name: &CredentialName,
        credential: Option<&Arc<Credential>>,
        active: &[Arc<Credential>],
    ) -> AggregateSync {
        let Some(handle) = self.registry.aggregate(self.kind).await else {
            debug!(
                kind = %self.kind,
                account = %name,
                "No aggregate registered; skipping member sync"
            );
            return AggregateSync::NotFound;
        };

        let mut state = handle.state.lock().await;
        let seeded = !state.seeded;
        if seeded {
            for candidate in active.iter().filter(|c| (self.eligible)(c)) {
                state
                    .members
                    .insert(candidate.name().clone(), Arc::clone(candidate));
            }
            state.seeded = true;
        }

        state.members.remove(name);
        if let Some(credential) = credential.filter(|c| (self.eligible)(c)) {
            state
                .members
                .insert(credential.name().clone(), Arc::clone(credential));
        }

        AggregateSync::Synced {
            seeded,
            members: state.members.len(),
        }
    }
}
