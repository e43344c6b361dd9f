use std::fmt;

use crate::ids::CredentialName;

/// Resource category with its own worker registry and builder.
///
/// Declaration order is the order lifecycle events visit the domains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum ResourceDomain {
    Compute,
    Infrastructure,
    Cleanup,
    ContainerOrchestration,
}

impl ResourceDomain {
    pub const ALL: [ResourceDomain; 4] = [
        ResourceDomain::Compute,
        ResourceDomain::Infrastructure,
        ResourceDomain::Cleanup,
        ResourceDomain::ContainerOrchestration,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            ResourceDomain::Compute => "compute",
            ResourceDomain::Infrastructure => "infrastructure",
            ResourceDomain::Cleanup => "cleanup",
            ResourceDomain::ContainerOrchestration => "container-orchestration",
        }
    }

    /// Case-insensitive lookup by tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|domain| domain.tag().eq_ignore_ascii_case(tag.trim()))
    }
}

impl fmt::Display for ResourceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How a worker relates to accounts and regions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerScope {
    /// One per account, not tied to a region (identity/policy pollers).
    AccountGlobal,
    /// One per account per region.
    AccountRegion,
    /// One per region regardless of how many accounts list it.
    RegionGlobal,
    /// A single instance watching a set of accounts.
    CrossAccount,
}

/// Kind tag of a polling worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WorkerKind {
    // compute
    ClusterCaching,
    InstanceCaching,
    ImageCaching,
    LaunchConfigCaching,
    LoadBalancerCaching,
    LoadBalancerInstanceState,
    ReservedInstancesCaching,
    PublicImageCaching,
    ReservationReport,
    LambdaIamRole,
    LambdaFunctions,
    // infrastructure
    ElasticIpCaching,
    KeyPairCaching,
    SecurityGroupCaching,
    SubnetCaching,
    VpcCaching,
    InstanceTypeCaching,
    // cleanup
    AlarmCleanup,
    DetachedInstanceCleanup,
    // container orchestration
    EcsIamRole,
    EcsCluster,
    EcsService,
    EcsTask,
    ContainerInstance,
    TaskDefinition,
    TaskHealth,
    CloudMetricAlarm,
    ScalableTargets,
    Secret,
    ServiceDiscovery,
    TargetHealth,
}

impl WorkerKind {
    pub const fn name(self) -> &'static str {
        match self {
            WorkerKind::ClusterCaching => "ClusterCaching",
            WorkerKind::InstanceCaching => "InstanceCaching",
            WorkerKind::ImageCaching => "ImageCaching",
            WorkerKind::LaunchConfigCaching => "LaunchConfigCaching",
            WorkerKind::LoadBalancerCaching => "LoadBalancerCaching",
            WorkerKind::LoadBalancerInstanceState => {
                "LoadBalancerInstanceState"
            }
            WorkerKind::ReservedInstancesCaching => "ReservedInstancesCaching",
            WorkerKind::PublicImageCaching => "PublicImageCaching",
            WorkerKind::ReservationReport => "ReservationReport",
            WorkerKind::LambdaIamRole => "LambdaIamRole",
            WorkerKind::LambdaFunctions => "LambdaFunctions",
            WorkerKind::ElasticIpCaching => "ElasticIpCaching",
            WorkerKind::KeyPairCaching => "KeyPairCaching",
            WorkerKind::SecurityGroupCaching => "SecurityGroupCaching",
            WorkerKind::SubnetCaching => "SubnetCaching",
            WorkerKind::VpcCaching => "VpcCaching",
            WorkerKind::InstanceTypeCaching => "InstanceTypeCaching",
            WorkerKind::AlarmCleanup => "AlarmCleanup",
            WorkerKind::DetachedInstanceCleanup => "DetachedInstanceCleanup",
            WorkerKind::EcsIamRole => "EcsIamRole",
            WorkerKind::EcsCluster => "EcsCluster",
            WorkerKind::EcsService => "EcsService",
            WorkerKind::EcsTask => "EcsTask",
            WorkerKind::ContainerInstance => "ContainerInstance",
            WorkerKind::TaskDefinition => "TaskDefinition",
            WorkerKind::TaskHealth => "TaskHealth",
            WorkerKind::CloudMetricAlarm => "CloudMetricAlarm",
            WorkerKind::ScalableTargets => "ScalableTargets",
            WorkerKind::Secret => "Secret",
            WorkerKind::ServiceDiscovery => "ServiceDiscovery",
            WorkerKind::TargetHealth => "TargetHealth",
        }
    }

    pub const fn domain(self) -> ResourceDomain {
        match self {
            WorkerKind::ClusterCaching
            | WorkerKind::InstanceCaching
            | WorkerKind::ImageCaching
            | WorkerKind::LaunchConfigCaching
            | WorkerKind::LoadBalancerCaching
            | WorkerKind::LoadBalancerInstanceState
            | WorkerKind::ReservedInstancesCaching
            | WorkerKind::PublicImageCaching
            | WorkerKind::ReservationReport
            | WorkerKind::LambdaIamRole
            | WorkerKind::LambdaFunctions => ResourceDomain::Compute,
            WorkerKind::ElasticIpCaching
            | WorkerKind::KeyPairCaching
            | WorkerKind::SecurityGroupCaching
            | WorkerKind::SubnetCaching
            | WorkerKind::VpcCaching
            | WorkerKind::InstanceTypeCaching => ResourceDomain::Infrastructure,
            WorkerKind::AlarmCleanup | WorkerKind::DetachedInstanceCleanup => {
                ResourceDomain::Cleanup
            }
            WorkerKind::EcsIamRole
            | WorkerKind::EcsCluster
            | WorkerKind::EcsService
            | WorkerKind::EcsTask
            | WorkerKind::ContainerInstance
            | WorkerKind::TaskDefinition
            | WorkerKind::TaskHealth
            | WorkerKind::CloudMetricAlarm
            | WorkerKind::ScalableTargets
            | WorkerKind::Secret
            | WorkerKind::ServiceDiscovery
            | WorkerKind::TargetHealth => {
                ResourceDomain::ContainerOrchestration
            }
        }
    }

    pub const fn scope(self) -> WorkerScope {
        match self {
            WorkerKind::LambdaIamRole | WorkerKind::EcsIamRole => {
                WorkerScope::AccountGlobal
            }
            WorkerKind::PublicImageCaching
            | WorkerKind::InstanceTypeCaching => WorkerScope::RegionGlobal,
            WorkerKind::ReservationReport => WorkerScope::CrossAccount,
            _ => WorkerScope::AccountRegion,
        }
    }

    /// Service name used when the client factory builds an endpoint.
    pub const fn service(self) -> &'static str {
        match self {
            WorkerKind::ClusterCaching | WorkerKind::LaunchConfigCaching => {
                "autoscaling"
            }
            WorkerKind::LoadBalancerCaching
            | WorkerKind::LoadBalancerInstanceState
            | WorkerKind::TargetHealth => "elasticloadbalancing",
            WorkerKind::LambdaIamRole | WorkerKind::EcsIamRole => "iam",
            WorkerKind::LambdaFunctions => "lambda",
            WorkerKind::AlarmCleanup | WorkerKind::CloudMetricAlarm => {
                "monitoring"
            }
            WorkerKind::EcsCluster
            | WorkerKind::EcsService
            | WorkerKind::EcsTask
            | WorkerKind::ContainerInstance
            | WorkerKind::TaskDefinition
            | WorkerKind::TaskHealth => "ecs",
            WorkerKind::ScalableTargets => "application-autoscaling",
            WorkerKind::Secret => "secretsmanager",
            WorkerKind::ServiceDiscovery => "servicediscovery",
            _ => "ec2",
        }
    }

    /// Whether the worker feeds instance/target health views.
    pub const fn provides_health(self) -> bool {
        matches!(
            self,
            WorkerKind::LoadBalancerInstanceState
                | WorkerKind::TaskHealth
                | WorkerKind::TargetHealth
        )
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who a worker currently belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WorkerOwner {
    Account(CredentialName),
    /// Region-global worker retained after its owning account was deleted.
    Orphaned { former: CredentialName },
    /// Cross-account aggregate.
    Shared,
}

impl WorkerOwner {
    pub fn account(&self) -> Option<&CredentialName> {
        match self {
            WorkerOwner::Account(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_account(&self, name: &CredentialName) -> bool {
        self.account() == Some(name)
    }

    pub fn is_orphaned(&self) -> bool {
        matches!(self, WorkerOwner::Orphaned { .. })
    }
}

impl fmt::Display for WorkerOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerOwner::Account(name) => write!(f, "{name}"),
            WorkerOwner::Orphaned { former } => {
                write!(f, "orphan(was {former})")
            }
            WorkerOwner::Shared => f.write_str("shared"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_case_insensitively() {
        for domain in ResourceDomain::ALL {
            assert_eq!(ResourceDomain::from_tag(domain.tag()), Some(domain));
        }
        assert_eq!(
            ResourceDomain::from_tag("Container-Orchestration"),
            Some(ResourceDomain::ContainerOrchestration)
        );
        assert_eq!(ResourceDomain::from_tag("storage"), None);
    }

    #[test]
    fn health_kinds_are_regional() {
        for kind in [
            WorkerKind::LoadBalancerInstanceState,
            WorkerKind::TaskHealth,
            WorkerKind::TargetHealth,
        ] {
            assert!(kind.provides_health());
            assert_eq!(kind.scope(), WorkerScope::AccountRegion);
        }
        assert!(!WorkerKind::EcsIamRole.provides_health());
    }
}
