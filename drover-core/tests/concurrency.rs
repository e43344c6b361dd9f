use std::sync::Arc;

use drover_core::fleet::{
    FleetConfig, InMemoryScheduler, LifecycleCoordinator,
    LifecycleCoordinatorBuilder, LifecycleEvent,
};
use drover_model::{
    Credential, CredentialName, Region, ResourceDomain, WorkerScope,
};
use futures::future::join_all;

fn credential(name: &str, regions: &[&str]) -> Arc<Credential> {
    Arc::new(Credential::new(
        CredentialName::try_new(name).expect("name"),
        regions.iter().map(|r| Region::try_new(*r).expect("region")),
    ))
}

fn coordinator(scheduler: &InMemoryScheduler) -> Arc<LifecycleCoordinator> {
    let mut builder = LifecycleCoordinatorBuilder::new(FleetConfig::default());
    for domain in ResourceDomain::ALL {
        builder = builder.with_scheduler(domain, Arc::new(scheduler.clone()));
    }
    Arc::new(builder.build().expect("coordinator"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_sharing_a_region_claim_it_once() {
    let scheduler = InMemoryScheduler::new();
    let coordinator = coordinator(&scheduler);
    let accounts: Vec<Arc<Credential>> = (0..16)
        .map(|i| {
            credential(&format!("acct-{i:02}"), &["us-east-1", "eu-west-1"])
        })
        .collect();

    let tasks = accounts.iter().map(|acct| {
        let coordinator = Arc::clone(&coordinator);
        let acct = Arc::clone(acct);
        tokio::spawn(async move {
            coordinator.apply(LifecycleEvent::added(acct)).await
        })
    });
    for report in join_all(tasks).await {
        assert!(report.expect("task").is_clean());
    }

    let region_global = coordinator
        .all_workers()
        .await
        .into_iter()
        .filter(|w| w.kind().scope() == WorkerScope::RegionGlobal)
        .count();
    // One public image and one instance type worker per region.
    assert_eq!(region_global, 4);

    let members = coordinator.aggregate_members().await.expect("aggregate");
    assert_eq!(members.len(), 16);
    assert_eq!(scheduler.double_acquisitions().await, 0);
    assert_eq!(scheduler.len().await, coordinator.all_workers().await.len());
}

#[tokio::test]
async fn events_for_one_account_apply_in_arrival_order() {
    let scheduler = InMemoryScheduler::new();
    let coordinator = coordinator(&scheduler);
    let first = credential("acct-a", &["us-east-1"]);
    let second = credential("acct-a", &["us-west-2"]);

    join_all([
        coordinator.apply(LifecycleEvent::added(Arc::clone(&first))),
        coordinator.apply(LifecycleEvent::updated(Arc::clone(&second))),
    ])
    .await;

    let regions: Vec<String> = coordinator
        .workers_for(first.name())
        .await
        .iter()
        .filter_map(|w| w.region().map(|r| r.to_string()))
        .collect();
    assert!(!regions.is_empty());
    assert!(regions.iter().all(|r| r == "us-west-2"));

    join_all([
        coordinator.apply(LifecycleEvent::updated(Arc::clone(&first))),
        coordinator.apply(LifecycleEvent::deleted(Arc::clone(&first))),
    ])
    .await;

    assert!(coordinator.workers_for(first.name()).await.is_empty());
    assert_eq!(coordinator.aggregate_members().await, Some(vec![]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn churn_on_distinct_accounts_never_double_acquires() {
    let scheduler = InMemoryScheduler::new();
    let coordinator = coordinator(&scheduler);

    let tasks = (0..8).map(|i| {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let name = format!("acct-{i}");
            let acct = credential(&name, &["us-east-1"]);
            coordinator.apply(LifecycleEvent::added(Arc::clone(&acct))).await;
            let widened = credential(&name, &["us-east-1", "ap-south-1"]);
            coordinator.apply(LifecycleEvent::updated(widened)).await;
            if i % 2 == 0 {
                coordinator.apply(LifecycleEvent::deleted(acct)).await;
            }
        })
    });
    for task in join_all(tasks).await {
        task.expect("task");
    }

    assert_eq!(scheduler.double_acquisitions().await, 0);
    let members = coordinator.aggregate_members().await.expect("aggregate");
    assert_eq!(members.len(), 4);
    for deleted in (0..8).step_by(2) {
        let name =
            CredentialName::try_new(format!("acct-{deleted}")).expect("name");
        assert!(coordinator.workers_for(&name).await.is_empty());
    }
}
