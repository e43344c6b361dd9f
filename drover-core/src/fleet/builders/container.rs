use std::fmt;
use std::sync::Arc;

use drover_model::{Credential, ResourceDomain, WorkerKind};

use super::{BuildContext, BuildError, BuildResult, KindPlan, WorkerSetBuilder};
use crate::fleet::worker::ClientFactory;

const PLAN: KindPlan<'static> = KindPlan {
    account_global: &[WorkerKind::EcsIamRole],
    account_region: &[
        WorkerKind::EcsCluster,
        WorkerKind::EcsService,
        WorkerKind::EcsTask,
        WorkerKind::ContainerInstance,
        WorkerKind::TaskDefinition,
        WorkerKind::TaskHealth,
        WorkerKind::CloudMetricAlarm,
        WorkerKind::ScalableTargets,
        WorkerKind::Secret,
        WorkerKind::ServiceDiscovery,
        WorkerKind::TargetHealth,
    ],
    region_global: &[],
};

/// Container orchestration pollers; only credentials that opted in get any.
pub struct ContainerWorkerSetBuilder {
    clients: Arc<dyn ClientFactory>,
}

impl fmt::Debug for ContainerWorkerSetBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerWorkerSetBuilder")
            .finish_non_exhaustive()
    }
}

impl ContainerWorkerSetBuilder {
    pub fn new(clients: Arc<dyn ClientFactory>) -> Self {
        Self { clients }
    }
}

impl WorkerSetBuilder for ContainerWorkerSetBuilder {
    fn domain(&self) -> ResourceDomain {
        ResourceDomain::ContainerOrchestration
    }

    fn build(
        &self,
        credential: &Credential,
        context: &BuildContext,
    ) -> Result<BuildResult, BuildError> {
        if !credential.capabilities().container_orchestration {
            return Ok(BuildResult::default());
        }
        PLAN.expand(credential, context, &self.clients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::builders::test_support::*;

    #[test]
    fn credentials_without_the_capability_get_nothing() {
        let builder = ContainerWorkerSetBuilder::new(clients());
        let credential = credential("acct-a", &["us-east-1"]);
        let result = builder
            .build(&credential, &BuildContext::default())
            .expect("build");
        assert!(result.is_empty());
    }

    #[test]
    fn iam_role_plus_eleven_regional_kinds() {
        let builder = ContainerWorkerSetBuilder::new(clients());
        let credential =
            container_credential("acct-a", &["us-east-1", "us-west-2"]);

        let result = builder
            .build(&credential, &BuildContext::default())
            .expect("build");

        assert_eq!(result.workers.len(), 1 + 2 * 11);
        let health = result
            .workers
            .iter()
            .filter(|w| w.kind().provides_health())
            .count();
        assert_eq!(health, 4);
        assert!(result.regions_to_cover.is_empty());
    }
}
