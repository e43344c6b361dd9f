use std::time::Duration;

use drover_model::ResourceDomain;
use serde::{Deserialize, Serialize};

/// What happens to region-global workers when their owning account goes
/// away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionOwnershipPolicy {
    /// Keep the worker as an orphan until the sweeper adopts or drops it.
    #[default]
    Retain,
    /// Hand the worker to a surviving member at delete time.
    Reassign,
    /// Remove the worker and release its region.
    Release,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainToggles {
    pub compute: bool,
    pub infrastructure: bool,
    pub cleanup: bool,
    pub container_orchestration: bool,
}

impl Default for DomainToggles {
    fn default() -> Self {
        Self {
            compute: true,
            infrastructure: true,
            cleanup: true,
            container_orchestration: true,
        }
    }
}

impl DomainToggles {
    pub fn enabled(&self, domain: ResourceDomain) -> bool {
        match domain {
            ResourceDomain::Compute => self.compute,
            ResourceDomain::Infrastructure => self.infrastructure,
            ResourceDomain::Cleanup => self.cleanup,
            ResourceDomain::ContainerOrchestration => {
                self.container_orchestration
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub alarms: bool,
    pub detached_instances: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            alarms: false,
            detached_instances: true,
        }
    }
}

/// Tuning knobs for the reconciliation core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub domains: DomainToggles,
    pub region_policy: RegionOwnershipPolicy,
    /// Register the cross-account reservation report worker.
    pub reservation_reports: bool,
    pub cleanup: CleanupConfig,
    /// Bind the container orchestration domain to the work scheduler.
    pub container_handoff: bool,
    pub endpoint_suffix: String,
    pub sweep_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub event_queue_capacity: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            domains: DomainToggles::default(),
            region_policy: RegionOwnershipPolicy::default(),
            reservation_reports: true,
            cleanup: CleanupConfig::default(),
            container_handoff: true,
            endpoint_suffix: "amazonaws.com".to_string(),
            sweep_interval_ms: 60_000,
            poll_interval_ms: 30_000,
            event_queue_capacity: 256,
        }
    }
}

impl FleetConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn enabled_domains(&self) -> Vec<ResourceDomain> {
        ResourceDomain::ALL
            .into_iter()
            .filter(|domain| self.domains.enabled(*domain))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let config: FleetConfig = serde_json::from_str(
            r#"{"region_policy": "reassign", "domains": {"cleanup": false}}"#,
        )
        .expect("parse");

        assert_eq!(config.region_policy, RegionOwnershipPolicy::Reassign);
        assert_eq!(
            config.enabled_domains(),
            vec![
                ResourceDomain::Compute,
                ResourceDomain::Infrastructure,
                ResourceDomain::ContainerOrchestration,
            ]
        );
        assert_eq!(config.event_queue_capacity, 256);
        assert!(config.cleanup.detached_instances);
    }
}
