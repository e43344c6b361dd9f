use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use drover_model::{Credential, CredentialName};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{FleetError, Result};

use super::coordinator::LifecycleCoordinator;

/// Receiver of credential lifecycle notifications.
///
/// `None` stands for a credential that failed to parse upstream.
#[async_trait]
pub trait CredentialsLifecycleHandler: Send + Sync {
    async fn credentials_added(&self, credential: Option<&Arc<Credential>>);

    async fn credentials_updated(&self, credential: Option<&Arc<Credential>>);

    async fn credentials_deleted(&self, credential: Option<&Arc<Credential>>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Added,
    Updated,
    Deleted,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleAction::Added => "added",
            LifecycleAction::Updated => "updated",
            LifecycleAction::Deleted => "deleted",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub action: LifecycleAction,
    pub credential: Arc<Credential>,
}

impl LifecycleEvent {
    pub fn added(credential: Arc<Credential>) -> Self {
        Self {
            action: LifecycleAction::Added,
            credential,
        }
    }

    pub fn updated(credential: Arc<Credential>) -> Self {
        Self {
            action: LifecycleAction::Updated,
            credential,
        }
    }

    pub fn deleted(credential: Arc<Credential>) -> Self {
        Self {
            action: LifecycleAction::Deleted,
            credential,
        }
    }

    pub fn account(&self) -> &CredentialName {
        self.credential.name()
    }
}

/// Single ordered queue in front of the coordinator. Events are applied one
/// at a time in submission order by a dedicated consumer task.
#[derive(Clone)]
pub struct LifecycleQueue {
    sender: mpsc::Sender<LifecycleEvent>,
}

impl fmt::Debug for LifecycleQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleQueue")
            .field("capacity", &self.sender.max_capacity())
            .field("available", &self.sender.capacity())
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl LifecycleQueue {
    /// Starts the consumer. Cancelling `shutdown` stops intake; events
    /// already queued are still applied before the task exits.
    pub fn spawn(
        coordinator: Arc<LifecycleCoordinator>,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = receiver.recv() => match next {
                        Some(event) => {
                            coordinator.apply(event).await;
                        }
                        None => return,
                    },
                }
            }

            receiver.close();
            let mut drained = 0usize;
            while let Some(event) = receiver.recv().await {
                coordinator.apply(event).await;
                drained += 1;
            }
            info!(drained, "Lifecycle queue stopped");
        });
        (Self { sender }, handle)
    }

    pub async fn submit(&self, event: LifecycleEvent) -> Result<()> {
        debug!(
            account = %event.account(),
            action = %event.action,
            "Queued lifecycle event"
        );
        self.sender
            .send(event)
            .await
            .map_err(|_| FleetError::QueueClosed)
    }

    async fn forward(
        &self,
        credential: Option<&Arc<Credential>>,
        event: fn(Arc<Credential>) -> LifecycleEvent,
    ) {
        let Some(credential) = credential else {
            warn!("Ignoring lifecycle notification without a credential");
            return;
        };
        if let Err(err) = self.submit(event(Arc::clone(credential))).await {
            error!(
                account = %credential.name(),
                "Dropped lifecycle event: {err}"
            );
        }
    }
}

#[async_trait]
impl CredentialsLifecycleHandler for LifecycleQueue {
    async fn credentials_added(&self, credential: Option<&Arc<Credential>>) {
        self.forward(credential, LifecycleEvent::added).await;
    }

    async fn credentials_updated(&self, credential: Option<&Arc<Credential>>) {
        self.forward(credential, LifecycleEvent::updated).await;
    }

    async fn credentials_deleted(&self, credential: Option<&Arc<Credential>>) {
        self.forward(credential, LifecycleEvent::deleted).await;
    }
}

#[cfg(test)]
mod tests {
    use drover_model::ResourceDomain;

    use super::*;
    use crate::fleet::builders::test_support::credential;
    use crate::fleet::config::FleetConfig;
    use crate::fleet::coordinator::LifecycleCoordinatorBuilder;

    fn coordinator() -> Arc<LifecycleCoordinator> {
        Arc::new(
            LifecycleCoordinatorBuilder::new(FleetConfig::default())
                .build()
                .expect("coordinator"),
        )
    }

    #[tokio::test]
    async fn events_apply_in_submission_order_and_drain_on_shutdown() {
        let coordinator = coordinator();
        let shutdown = CancellationToken::new();
        let (queue, handle) = LifecycleQueue::spawn(
            Arc::clone(&coordinator),
            8,
            shutdown.clone(),
        );

        let first = Arc::new(credential("acct-a", &["us-east-1"]));
        let second = Arc::new(credential("acct-a", &["us-west-2"]));
        queue.credentials_added(Some(&first)).await;
        queue.credentials_updated(Some(&second)).await;
        queue.credentials_deleted(None).await;

        shutdown.cancel();
        handle.await.expect("consumer");

        let registry = coordinator
            .registry(ResourceDomain::Infrastructure)
            .expect("infrastructure");
        let regions: Vec<_> = registry
            .workers_for(first.name())
            .await
            .iter()
            .filter_map(|w| w.region().map(|r| r.to_string()))
            .collect();
        assert!(!regions.is_empty());
        assert!(regions.iter().all(|r| r == "us-west-2"));
    }

    #[tokio::test]
    async fn submitting_after_the_consumer_exits_fails() {
        let shutdown = CancellationToken::new();
        let (queue, handle) =
            LifecycleQueue::spawn(coordinator(), 1, shutdown.clone());
        shutdown.cancel();
        handle.await.expect("consumer");

        let err = queue
            .submit(LifecycleEvent::added(Arc::new(credential("acct-a", &[]))))
            .await
            .expect_err("closed");
        assert!(matches!(err, FleetError::QueueClosed));
    }
}
