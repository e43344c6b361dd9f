use std::fmt;
use std::sync::Arc;

use drover_model::{Credential, ResourceDomain, WorkerKind};

use super::{BuildContext, BuildError, BuildResult, KindPlan, WorkerSetBuilder};
use crate::fleet::worker::ClientFactory;

const PLAN: KindPlan<'static> = KindPlan {
    account_global: &[],
    account_region: &[
        WorkerKind::ElasticIpCaching,
        WorkerKind::KeyPairCaching,
        WorkerKind::SecurityGroupCaching,
        WorkerKind::SubnetCaching,
        WorkerKind::VpcCaching,
    ],
    region_global: &[WorkerKind::InstanceTypeCaching],
};

/// Network and account-level infrastructure pollers.
pub struct InfrastructureWorkerSetBuilder {
    clients: Arc<dyn ClientFactory>,
}

impl fmt::Debug for InfrastructureWorkerSetBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfrastructureWorkerSetBuilder")
            .finish_non_exhaustive()
    }
}

impl InfrastructureWorkerSetBuilder {
    pub fn new(clients: Arc<dyn ClientFactory>) -> Self {
        Self { clients }
    }
}

impl WorkerSetBuilder for InfrastructureWorkerSetBuilder {
    fn domain(&self) -> ResourceDomain {
        ResourceDomain::Infrastructure
    }

    fn build(
        &self,
        credential: &Credential,
        context: &BuildContext,
    ) -> Result<BuildResult, BuildError> {
        PLAN.expand(credential, context, &self.clients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::builders::test_support::*;

    #[test]
    fn instance_types_are_polled_once_per_region() {
        let builder = InfrastructureWorkerSetBuilder::new(clients());
        let credential = credential("acct-a", &["us-east-1", "eu-west-1"]);

        let result = builder
            .build(&credential, &covered(&["eu-west-1"]))
            .expect("build");

        let instance_types: Vec<_> = result
            .workers
            .iter()
            .filter(|w| w.kind() == WorkerKind::InstanceTypeCaching)
            .map(|w| w.id().to_string())
            .collect();
        assert_eq!(
            instance_types,
            vec!["infrastructure/us-east-1/InstanceTypeCaching".to_string()]
        );
        assert_eq!(result.workers.len(), 11);
    }
}
