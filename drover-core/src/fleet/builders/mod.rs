//! Per-domain worker set builders.
//!
//! A builder is a pure function of a credential and a snapshot of the
//! domain's state. It never touches the registry; the reconciler commits its
//! output under the registry lock.

mod cleanup;
mod compute;
mod container;
mod infrastructure;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use drover_model::{
    Credential, CredentialName, Region, ResourceDomain, WorkerKind,
};
use thiserror::Error;

use super::config::FleetConfig;
use super::worker::{ClientFactory, WorkerDescriptor};

pub use cleanup::CleanupWorkerSetBuilder;
pub use compute::ComputeWorkerSetBuilder;
pub use container::ContainerWorkerSetBuilder;
pub use infrastructure::InfrastructureWorkerSetBuilder;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("malformed region `{region}` in credential {account}")]
    MalformedRegion {
        account: CredentialName,
        region: Region,
    },

    #[error("invalid client endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Snapshot of a domain taken before a build.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildContext {
    /// The account already has workers registered in this domain.
    pub represented: bool,
    pub coverage: BTreeSet<Region>,
    pub aggregates: BTreeSet<WorkerKind>,
}

impl BuildContext {
    pub fn is_covered(&self, region: &Region) -> bool {
        self.coverage.contains(region)
    }

    pub fn has_aggregate(&self, kind: WorkerKind) -> bool {
        self.aggregates.contains(&kind)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BuildResult {
    pub workers: Vec<WorkerDescriptor>,
    pub regions_to_cover: BTreeSet<Region>,
}

impl BuildResult {
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

pub trait WorkerSetBuilder: Send + Sync + fmt::Debug {
    fn domain(&self) -> ResourceDomain;

    fn build(
        &self,
        credential: &Credential,
        context: &BuildContext,
    ) -> Result<BuildResult, BuildError>;
}

/// Worker kinds a builder emits, grouped by scope.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct KindPlan<'a> {
    pub account_global: &'a [WorkerKind],
    pub account_region: &'a [WorkerKind],
    pub region_global: &'a [WorkerKind],
}

impl KindPlan<'_> {
    /// Identity workers always; per-region workers only for accounts the
    /// domain has not seen; region-global workers for every uncovered
    /// region, represented or not.
    pub(crate) fn expand(
        &self,
        credential: &Credential,
        context: &BuildContext,
        clients: &Arc<dyn ClientFactory>,
    ) -> Result<BuildResult, BuildError> {
        let mut result = BuildResult::default();

        for kind in self.account_global {
            result.workers.push(WorkerDescriptor::for_account(
                *kind, credential, None, clients,
            )?);
        }

        for region in credential.regions() {
            if !context.represented {
                for kind in self.account_region {
                    result.workers.push(WorkerDescriptor::for_account(
                        *kind,
                        credential,
                        Some(region),
                        clients,
                    )?);
                }
            }

            if self.region_global.is_empty() || context.is_covered(region) {
                continue;
            }
            for kind in self.region_global {
                result.workers.push(WorkerDescriptor::for_region(
                    *kind, credential, region, clients,
                )?);
            }
            result.regions_to_cover.insert(region.clone());
        }

        Ok(result)
    }
}

/// The builder a standard deployment uses for `domain`.
pub fn standard_builder(
    domain: ResourceDomain,
    config: &FleetConfig,
    clients: Arc<dyn ClientFactory>,
) -> Arc<dyn WorkerSetBuilder> {
    match domain {
        ResourceDomain::Compute => Arc::new(ComputeWorkerSetBuilder::new(
            clients,
            config.reservation_reports,
        )),
        ResourceDomain::Infrastructure => {
            Arc::new(InfrastructureWorkerSetBuilder::new(clients))
        }
        ResourceDomain::Cleanup => Arc::new(CleanupWorkerSetBuilder::new(
            clients,
            config.cleanup.clone(),
        )),
        ResourceDomain::ContainerOrchestration => {
            Arc::new(ContainerWorkerSetBuilder::new(clients))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    const PLAN: KindPlan<'static> = KindPlan {
        account_global: &[WorkerKind::EcsIamRole],
        account_region: &[WorkerKind::EcsCluster],
        region_global: &[WorkerKind::InstanceTypeCaching],
    };

    #[test]
    fn first_writer_claims_uncovered_regions() {
        let credential = credential("acct-a", &["us-east-1", "us-west-2"]);
        let result = PLAN
            .expand(&credential, &covered(&["us-west-2"]), &clients())
            .expect("build");

        let covered: Vec<&str> =
            result.regions_to_cover.iter().map(|r| r.as_str()).collect();
        assert_eq!(covered, vec!["us-east-1"]);
        assert_eq!(
            kinds(&result),
            vec![
                WorkerKind::InstanceTypeCaching,
                WorkerKind::EcsIamRole,
                WorkerKind::EcsCluster,
                WorkerKind::EcsCluster,
            ]
        );
    }

    #[test]
    fn represented_accounts_only_get_identity_workers() {
        let credential = credential("acct-a", &["us-east-1"]);
        let context = BuildContext {
            represented: true,
            ..covered(&["us-east-1"])
        };

        let result = PLAN
            .expand(&credential, &context, &clients())
            .expect("build");
        assert_eq!(kinds(&result), vec![WorkerKind::EcsIamRole]);
        assert!(result.regions_to_cover.is_empty());
    }

    #[test]
    fn represented_accounts_claim_regions_that_lost_coverage() {
        let credential = credential("acct-a", &["us-east-1", "us-west-2"]);
        let context = BuildContext {
            represented: true,
            ..covered(&["us-west-2"])
        };

        let result = PLAN
            .expand(&credential, &context, &clients())
            .expect("build");
        assert_eq!(
            kinds(&result),
            vec![WorkerKind::InstanceTypeCaching, WorkerKind::EcsIamRole]
        );
        let claimed: Vec<&str> =
            result.regions_to_cover.iter().map(|r| r.as_str()).collect();
        assert_eq!(claimed, vec!["us-east-1"]);
    }

    #[test]
    fn a_malformed_region_fails_the_whole_build() {
        let credential = credential("acct-a", &["us-east-1", "not_a_region"]);
        let err = PLAN
            .expand(&credential, &BuildContext::default(), &clients())
            .expect_err("malformed");
        assert!(matches!(
            err,
            BuildError::MalformedRegion { ref region, .. }
                if region.as_str() == "not_a_region"
        ));
    }
}
