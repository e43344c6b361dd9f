use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use drover_model::{Credential, CredentialName};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::discovery::CredentialSource;
use super::events::CredentialsLifecycleHandler;

/// Counts from one bulk reload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub added: Vec<CredentialName>,
    pub updated: Vec<CredentialName>,
    pub deleted: Vec<CredentialName>,
    pub unchanged: usize,
}

impl SyncSummary {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
    }
}

/// Map-backed credential store that notifies a lifecycle handler on every
/// change.
///
/// Mutations are serialized and the handler is called before the next one
/// starts, so handlers observe changes in the order they were made.
pub struct MapBackedCredentialsRepository {
    provider: String,
    credentials: RwLock<BTreeMap<CredentialName, Arc<Credential>>>,
    ordering: Mutex<()>,
    handler: Arc<dyn CredentialsLifecycleHandler>,
}

impl fmt::Debug for MapBackedCredentialsRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MapBackedCredentialsRepository");
        debug.field("provider", &self.provider);
        match self.credentials.try_read() {
            Ok(credentials) => {
                debug.field(
                    "credentials",
                    &credentials.keys().collect::<Vec<_>>(),
                );
            }
            Err(_) => {
                debug.field("credentials", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl MapBackedCredentialsRepository {
    pub fn new(
        provider: impl Into<String>,
        handler: Arc<dyn CredentialsLifecycleHandler>,
    ) -> Self {
        Self {
            provider: provider.into(),
            credentials: RwLock::new(BTreeMap::new()),
            ordering: Mutex::new(()),
            handler,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub async fn get_one(
        &self,
        name: &CredentialName,
    ) -> Option<Arc<Credential>> {
        self.credentials.read().await.get(name).cloned()
    }

    pub async fn get_all(&self) -> Vec<Arc<Credential>> {
        self.credentials.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stores `credential`, firing `added` or `updated`. Saving a value equal
    /// to the stored one fires nothing.
    pub async fn save(&self, credential: Credential) -> Arc<Credential> {
        let _ordered = self.ordering.lock().await;
        self.save_locked(Arc::new(credential)).await.0
    }

    pub async fn delete(
        &self,
        name: &CredentialName,
    ) -> Option<Arc<Credential>> {
        let _ordered = self.ordering.lock().await;
        self.delete_locked(name).await
    }

    /// Makes the stored set equal to `definitions`, firing one event per
    /// difference. Later duplicates of a name win.
    pub async fn sync_all(&self, definitions: Vec<Credential>) -> SyncSummary {
        let _ordered = self.ordering.lock().await;
        let mut summary = SyncSummary::default();

        let mut desired: BTreeMap<CredentialName, Credential> = BTreeMap::new();
        for credential in definitions {
            desired.insert(credential.name().clone(), credential);
        }

        let stale: Vec<CredentialName> = {
            let current = self.credentials.read().await;
            let keep: BTreeSet<&CredentialName> = desired.keys().collect();
            current
                .keys()
                .filter(|name| !keep.contains(name))
                .cloned()
                .collect()
        };
        for name in stale {
            if self.delete_locked(&name).await.is_some() {
                summary.deleted.push(name);
            }
        }

        for (name, credential) in desired {
            match self.save_locked(Arc::new(credential)).await.1 {
                Some(SaveKind::Added) => summary.added.push(name),
                Some(SaveKind::Updated) => summary.updated.push(name),
                None => summary.unchanged += 1,
            }
        }

        if !summary.is_noop() {
            info!(
                provider = %self.provider,
                added = summary.added.len(),
                updated = summary.updated.len(),
                deleted = summary.deleted.len(),
                "Synchronized credentials"
            );
        }
        summary
    }

    async fn save_locked(
        &self,
        credential: Arc<Credential>,
    ) -> (Arc<Credential>, Option<SaveKind>) {
        let previous = {
            let mut credentials = self.credentials.write().await;
            if let Some(existing) = credentials.get(credential.name())
                && existing.as_ref() == credential.as_ref()
            {
                return (Arc::clone(existing), None);
            }
            credentials
                .insert(credential.name().clone(), Arc::clone(&credential))
        };

        if previous.is_some() {
            self.handler.credentials_updated(Some(&credential)).await;
            (credential, Some(SaveKind::Updated))
        } else {
            self.handler.credentials_added(Some(&credential)).await;
            (credential, Some(SaveKind::Added))
        }
    }

    async fn delete_locked(
        &self,
        name: &CredentialName,
    ) -> Option<Arc<Credential>> {
        let removed = self.credentials.write().await.remove(name)?;
        self.handler.credentials_deleted(Some(&removed)).await;
        Some(removed)
    }
}

#[derive(Clone, Copy, Debug)]
enum SaveKind {
    Added,
    Updated,
}

#[async_trait]
impl CredentialSource for MapBackedCredentialsRepository {
    async fn snapshot(&self) -> Vec<Arc<Credential>> {
        self.get_all().await
    }
}
