use std::fmt;
use std::sync::Arc;

use drover_model::{Credential, ResourceDomain, WorkerKind};

use super::{BuildContext, BuildError, BuildResult, KindPlan, WorkerSetBuilder};
use crate::fleet::config::CleanupConfig;
use crate::fleet::worker::ClientFactory;

pub struct CleanupWorkerSetBuilder {
    clients: Arc<dyn ClientFactory>,
    kinds: Vec<WorkerKind>,
}

impl fmt::Debug for CleanupWorkerSetBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupWorkerSetBuilder")
            .field("kinds", &self.kinds)
            .finish()
    }
}

impl CleanupWorkerSetBuilder {
    pub fn new(clients: Arc<dyn ClientFactory>, config: CleanupConfig) -> Self {
        let mut kinds = Vec::new();
        if config.alarms {
            kinds.push(WorkerKind::AlarmCleanup);
        }
        if config.detached_instances {
            kinds.push(WorkerKind::DetachedInstanceCleanup);
        }
        Self { clients, kinds }
    }
}

impl WorkerSetBuilder for CleanupWorkerSetBuilder {
    fn domain(&self) -> ResourceDomain {
        ResourceDomain::Cleanup
    }

    fn build(
        &self,
        credential: &Credential,
        context: &BuildContext,
    ) -> Result<BuildResult, BuildError> {
        KindPlan {
            account_region: &self.kinds,
            ..KindPlan::default()
        }
        .expand(credential, context, &self.clients)
    }
}
