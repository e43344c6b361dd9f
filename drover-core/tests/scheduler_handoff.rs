use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use drover_core::FleetError;
use drover_core::fleet::{
    FleetConfig, LifecycleCoordinator, LifecycleCoordinatorBuilder,
    LifecycleEvent, WorkScheduler, WorkerDescriptor,
};
use drover_model::{
    Credential, CredentialName, Region, ResourceDomain, WorkerId,
};
use mockall::{Sequence, mock};

mock! {
    pub Scheduler {}

    #[async_trait]
    impl WorkScheduler for Scheduler {
        async fn schedule(
            &self,
            domain: ResourceDomain,
            workers: &[WorkerDescriptor],
        ) -> drover_core::Result<()>;

        async fn unschedule(
            &self,
            domain: ResourceDomain,
            worker_ids: &[WorkerId],
        ) -> drover_core::Result<()>;
    }
}

fn credential(name: &str, regions: &[&str]) -> Arc<Credential> {
    Arc::new(Credential::new(
        CredentialName::try_new(name).expect("name"),
        regions.iter().map(|r| Region::try_new(*r).expect("region")),
    ))
}

/// Only the infrastructure domain, bound to `scheduler`.
fn coordinator(scheduler: MockScheduler) -> LifecycleCoordinator {
    let mut config = FleetConfig::default();
    config.domains.compute = false;
    config.domains.cleanup = false;
    config.domains.container_orchestration = false;
    LifecycleCoordinatorBuilder::new(config)
        .with_scheduler(ResourceDomain::Infrastructure, Arc::new(scheduler))
        .build()
        .expect("coordinator")
}

#[tokio::test]
async fn added_workers_are_released_before_they_are_acquired() {
    let mut scheduler = MockScheduler::new();
    let mut seq = Sequence::new();
    scheduler
        .expect_unschedule()
        .withf(|domain, ids| {
            *domain == ResourceDomain::Infrastructure && ids.len() == 6
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    scheduler
        .expect_schedule()
        .withf(|_, workers| workers.len() == 6)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    let coordinator = coordinator(scheduler);
    let report = coordinator
        .apply(LifecycleEvent::added(credential("acct-a", &["us-east-1"])))
        .await;

    assert!(report.is_clean());
    let infrastructure = report
        .domain(ResourceDomain::Infrastructure)
        .expect("infrastructure");
    assert_eq!(infrastructure.added, 6);
}

#[tokio::test]
async fn a_failed_handoff_rolls_the_domain_back() {
    let mut scheduler = MockScheduler::new();
    scheduler
        .expect_unschedule()
        .times(2)
        .returning(|_, _| Ok(()));
    scheduler.expect_schedule().times(1).returning(|domain, _| {
        Err(FleetError::Scheduler {
            domain,
            message: "partition store unavailable".into(),
        })
    });

    let coordinator = coordinator(scheduler);
    let acct = credential("acct-a", &["us-east-1"]);
    let report = coordinator
        .apply(LifecycleEvent::added(Arc::clone(&acct)))
        .await;

    assert_eq!(report.failed_domains(), vec![ResourceDomain::Infrastructure]);
    let registry = coordinator
        .registry(ResourceDomain::Infrastructure)
        .expect("infrastructure");
    assert!(registry.is_empty().await);
    assert!(registry.coverage().await.is_empty());
    assert!(!registry.build_context(acct.name()).await.represented);
}

#[tokio::test]
async fn delete_releases_only_the_removed_workers() {
    let mut scheduler = MockScheduler::new();
    let mut seq = Sequence::new();
    scheduler
        .expect_unschedule()
        .withf(|_, ids| ids.len() == 6)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    scheduler
        .expect_schedule()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    // The region worker is retained as an orphan, so five ids are released.
    scheduler
        .expect_unschedule()
        .withf(|_, ids| {
            ids.len() == 5
                && ids.iter().all(|id| {
                    id.as_str().starts_with("infrastructure/acct-a/")
                })
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    let coordinator = coordinator(scheduler);
    let acct = credential("acct-a", &["us-east-1"]);
    coordinator.apply(LifecycleEvent::added(Arc::clone(&acct))).await;
    let report = coordinator.apply(LifecycleEvent::deleted(acct)).await;

    let infrastructure = report
        .domain(ResourceDomain::Infrastructure)
        .expect("infrastructure");
    assert_eq!(infrastructure.removed, 5);
    assert_eq!(infrastructure.orphaned, 1);
}

#[tokio::test]
async fn refused_releases_are_retried_by_the_sweep() {
    let mut scheduler = MockScheduler::new();
    scheduler
        .expect_unschedule()
        .withf(|_, ids| ids.len() == 6)
        .times(1)
        .returning(|_, _| Ok(()));
    scheduler.expect_schedule().times(1).returning(|_, _| Ok(()));
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    scheduler
        .expect_unschedule()
        .withf(|_, ids| ids.len() == 5)
        .times(2)
        .returning(move |domain, _| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FleetError::Scheduler {
                    domain,
                    message: "lease store timed out".into(),
                })
            } else {
                Ok(())
            }
        });
    // The orphaned region worker, dropped by the sweep.
    scheduler
        .expect_unschedule()
        .withf(|_, ids| ids.len() == 1)
        .times(1)
        .returning(|_, _| Ok(()));

    let coordinator = coordinator(scheduler);
    let acct = credential("acct-a", &["us-east-1"]);
    coordinator.apply(LifecycleEvent::added(Arc::clone(&acct))).await;
    let report = coordinator.apply(LifecycleEvent::deleted(acct)).await;

    assert_eq!(report.failed_domains(), vec![ResourceDomain::Infrastructure]);
    let reconciler = &coordinator.reconcilers()[0];
    assert_eq!(reconciler.unreleased().await.len(), 5);

    let sweep = coordinator.sweep_orphans().await;

    assert!(sweep.domains.iter().all(|d| d.error.is_none()));
    assert!(reconciler.unreleased().await.is_empty());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(reconciler.registry().is_empty().await);
}
