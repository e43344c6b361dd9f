use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use drover_model::{Credential, ResourceDomain, WorkerKind};
use tracing::{debug, error};

use super::builders::BuildError;
use super::worker::{ClientFactory, WorkerDescriptor};

/// Source of worker lists answered at scheduler poll time.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Whether this provider answers polls for the given domain tag
    fn supports(&self, domain_tag: &str) -> bool;

    /// The full worker list this provider currently wants scheduled
    async fn discover(&self) -> Vec<WorkerDescriptor>;
}

/// Read access to the currently active credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn snapshot(&self) -> Vec<Arc<Credential>>;
}

/// Discovery provider that rebuilds its whole list from the credential
/// source on every poll. Keeps no state between polls.
pub struct RecomputingDiscoverer {
    domain: ResourceDomain,
    credentials: Arc<dyn CredentialSource>,
    clients: Arc<dyn ClientFactory>,
}

impl fmt::Debug for RecomputingDiscoverer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecomputingDiscoverer")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl RecomputingDiscoverer {
    /// Serverless function pollers for credentials with the `serverless`
    /// capability.
    pub fn serverless(
        credentials: Arc<dyn CredentialSource>,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            domain: ResourceDomain::Compute,
            credentials,
            clients,
        }
    }

    fn workers_for(
        &self,
        credential: &Credential,
    ) -> Result<Vec<WorkerDescriptor>, BuildError> {
        let mut workers = Vec::with_capacity(credential.regions().len() + 1);
        workers.push(WorkerDescriptor::for_account(
            WorkerKind::LambdaIamRole,
            credential,
            None,
            &self.clients,
        )?);
        for region in credential.regions() {
            workers.push(WorkerDescriptor::for_account(
                WorkerKind::LambdaFunctions,
                credential,
                Some(region),
                &self.clients,
            )?);
        }
        Ok(workers)
    }
}

#[async_trait]
impl DiscoveryProvider for RecomputingDiscoverer {
    fn supports(&self, domain_tag: &str) -> bool {
        self.domain.tag().eq_ignore_ascii_case(domain_tag.trim())
    }

    async fn discover(&self) -> Vec<WorkerDescriptor> {
        let mut credentials = self.credentials.snapshot().await;
        credentials.sort_by(|a, b| a.name().cmp(b.name()));

        let mut workers = Vec::new();
        for credential in credentials
            .iter()
            .filter(|c| c.capabilities().serverless)
        {
            match self.workers_for(credential) {
                Ok(built) => workers.extend(built),
                Err(err) => error!(
                    account = %credential.name(),
                    domain = %self.domain,
                    "Skipping credential during discovery: {err}"
                ),
            }
        }
        debug!(
            domain = %self.domain,
            workers = workers.len(),
            "Recomputed discovery list"
        );
        workers
    }
}

/// Merges the answers of every provider supporting `domain_tag`, keeping the
/// first descriptor seen for each id.
pub async fn collect_workers(
    providers: &[Arc<dyn DiscoveryProvider>],
    domain_tag: &str,
) -> Vec<WorkerDescriptor> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for provider in providers.iter().filter(|p| p.supports(domain_tag)) {
        for worker in provider.discover().await {
            if seen.insert(worker.id().clone()) {
                merged.push(worker);
            }
        }
    }
    merged
}
