use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::coordinator::{LifecycleCoordinator, SweepReport};

/// Periodically adopts or drops orphaned region workers.
#[derive(Debug, Clone)]
pub struct OrphanSweeper {
    coordinator: Arc<LifecycleCoordinator>,
    interval: Duration,
}

impl OrphanSweeper {
    pub fn new(
        coordinator: Arc<LifecycleCoordinator>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    pub async fn run_once(&self) -> SweepReport {
        self.coordinator.sweep_orphans().await
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        if report.is_empty() {
                            debug!("Orphan sweep found nothing to do");
                        }
                    }
                }
            }
            info!("Orphan sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use drover_model::{ResourceDomain, WorkerOwner, WorkerScope};

    use super::*;
    use crate::fleet::builders::test_support::credential;
    use crate::fleet::config::FleetConfig;
    use crate::fleet::coordinator::LifecycleCoordinatorBuilder;
    use crate::fleet::events::LifecycleEvent;

    #[tokio::test]
    async fn spawned_sweeper_adopts_orphans_on_its_interval() {
        let coordinator = Arc::new(
            LifecycleCoordinatorBuilder::new(FleetConfig::default())
                .build()
                .expect("coordinator"),
        );
        let a = Arc::new(credential("acct-a", &["us-east-1"]));
        let b = Arc::new(credential("acct-b", &["us-east-1"]));
        coordinator.apply(LifecycleEvent::added(Arc::clone(&a))).await;
        coordinator.apply(LifecycleEvent::added(Arc::clone(&b))).await;
        coordinator.apply(LifecycleEvent::deleted(Arc::clone(&a))).await;

        let registry = coordinator
            .registry(ResourceDomain::Infrastructure)
            .expect("infrastructure");
        assert_eq!(registry.orphans().await.len(), 1);

        let shutdown = CancellationToken::new();
        let handle = OrphanSweeper::new(
            Arc::clone(&coordinator),
            Duration::from_millis(20),
        )
        .spawn(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.await.expect("sweeper");

        assert!(registry.orphans().await.is_empty());
        let region_workers: Vec<WorkerOwner> = registry
            .list_workers()
            .await
            .into_iter()
            .filter(|w| w.kind().scope() == WorkerScope::RegionGlobal)
            .map(|w| w.owner().clone())
            .collect();
        assert_eq!(
            region_workers,
            vec![WorkerOwner::Account(b.name().clone())]
        );
    }
}
