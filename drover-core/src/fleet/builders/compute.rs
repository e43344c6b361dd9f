use std::fmt;
use std::sync::Arc;

use drover_model::{Credential, ResourceDomain, WorkerKind};

use super::{BuildContext, BuildError, BuildResult, KindPlan, WorkerSetBuilder};
use crate::fleet::aggregate::AggregateMembers;
use crate::fleet::worker::{ClientFactory, WorkerDescriptor};

const PLAN: KindPlan<'static> = KindPlan {
    account_global: &[],
    account_region: &[
        WorkerKind::ClusterCaching,
        WorkerKind::InstanceCaching,
        WorkerKind::ImageCaching,
        WorkerKind::LaunchConfigCaching,
        WorkerKind::LoadBalancerCaching,
        WorkerKind::LoadBalancerInstanceState,
        WorkerKind::ReservedInstancesCaching,
    ],
    region_global: &[WorkerKind::PublicImageCaching],
};

pub struct ComputeWorkerSetBuilder {
    clients: Arc<dyn ClientFactory>,
    reservation_reports: bool,
}

impl fmt::Debug for ComputeWorkerSetBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeWorkerSetBuilder")
            .field("reservation_reports", &self.reservation_reports)
            .finish()
    }
}

impl ComputeWorkerSetBuilder {
    pub fn new(
        clients: Arc<dyn ClientFactory>,
        reservation_reports: bool,
    ) -> Self {
        Self {
            clients,
            reservation_reports,
        }
    }
}

impl WorkerSetBuilder for ComputeWorkerSetBuilder {
    fn domain(&self) -> ResourceDomain {
        ResourceDomain::Compute
    }

    fn build(
        &self,
        credential: &Credential,
        context: &BuildContext,
    ) -> Result<BuildResult, BuildError> {
        let mut result = PLAN.expand(credential, context, &self.clients)?;

        // Members are filled in by the aggregator, not here.
        if self.reservation_reports
            && !context.has_aggregate(WorkerKind::ReservationReport)
        {
            result.workers.push(WorkerDescriptor::cross_account(
                WorkerKind::ReservationReport,
                &self.clients,
                Arc::new(AggregateMembers::new()),
            ));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use drover_model::WorkerOwner;

    use super::*;
    use crate::fleet::builders::test_support::*;

    #[test]
    fn first_account_brings_the_aggregate_and_public_images() {
        let builder = ComputeWorkerSetBuilder::new(clients(), true);
        let credential = credential("acct-a", &["us-east-1"]);

        let result = builder
            .build(&credential, &BuildContext::default())
            .expect("build");

        assert_eq!(result.workers.len(), 9);
        let aggregate = result
            .workers
            .iter()
            .find(|w| w.kind() == WorkerKind::ReservationReport)
            .expect("aggregate");
        assert_eq!(aggregate.owner(), &WorkerOwner::Shared);
        assert_eq!(aggregate.id().as_str(), "compute/ReservationReport");
        assert!(aggregate.members().is_some());
        assert!(
            result
                .workers
                .iter()
                .any(|w| w.kind() == WorkerKind::PublicImageCaching)
        );
    }

    #[test]
    fn covered_regions_and_existing_aggregates_are_left_alone() {
        let builder = ComputeWorkerSetBuilder::new(clients(), true);
        let credential = credential("acct-b", &["us-east-1"]);
        let mut context = covered(&["us-east-1"]);
        context.aggregates = BTreeSet::from([WorkerKind::ReservationReport]);

        let result = builder.build(&credential, &context).expect("build");

        assert_eq!(result.workers.len(), 7);
        assert!(result.regions_to_cover.is_empty());
        assert!(
            result
                .workers
                .iter()
                .all(|w| w.is_owned_by(credential.name()))
        );
    }

    #[test]
    fn aggregate_can_be_switched_off() {
        let builder = ComputeWorkerSetBuilder::new(clients(), false);
        let result = builder
            .build(&credential("acct-a", &[]), &BuildContext::default())
            .expect("build");
        assert!(result.is_empty());
    }
}
