use std::{
    any::type_name_of_val,
    fmt,
    sync::Arc,
};

use drover_model::{
    Credential, CredentialName, Region, ResourceDomain, WorkerId, WorkerKind,
    WorkerOwner,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

use super::aggregate::AggregateHandle;
use super::builders::BuildError;

static DEFAULT_REGION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("static region pattern")
});

/// Address a worker's client talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientEndpoint {
    pub url: Url,
}

/// Builds client endpoints for workers. Held by reference in every
/// descriptor so the poller can construct its client lazily.
pub trait ClientFactory: Send + Sync {
    fn endpoint(
        &self,
        kind: WorkerKind,
        credential: &Credential,
        region: Option<&Region>,
    ) -> Result<ClientEndpoint, BuildError>;
}

/// Endpoint factory for a single partition
/// (`https://{service}.{region}.{suffix}/`).
#[derive(Clone, Debug)]
pub struct RegionalClientFactory {
    suffix: String,
    pattern: Regex,
}

impl Default for RegionalClientFactory {
    fn default() -> Self {
        Self::new("amazonaws.com")
    }
}

impl RegionalClientFactory {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            pattern: DEFAULT_REGION_PATTERN.clone(),
        }
    }

    pub fn with_region_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = pattern;
        self
    }
}

impl ClientFactory for RegionalClientFactory {
    fn endpoint(
        &self,
        kind: WorkerKind,
        credential: &Credential,
        region: Option<&Region>,
    ) -> Result<ClientEndpoint, BuildError> {
        let raw = match region {
            Some(region) => {
                if !self.pattern.is_match(region.as_str()) {
                    return Err(BuildError::MalformedRegion {
                        account: credential.name().clone(),
                        region: region.clone(),
                    });
                }
                format!(
                    "https://{}.{}.{}/",
                    kind.service(),
                    region,
                    self.suffix
                )
            }
            None => format!("https://{}.{}/", kind.service(), self.suffix),
        };
        Ok(ClientEndpoint {
            url: Url::parse(&raw)?,
        })
    }
}

/// One unit of periodic polling work.
///
/// Descriptors never run anything themselves; they carry the identity and
/// construction parameters the external scheduler needs.
#[derive(Clone)]
pub struct WorkerDescriptor {
    id: WorkerId,
    kind: WorkerKind,
    owner: WorkerOwner,
    region: Option<Region>,
    endpoint: Option<ClientEndpoint>,
    clients: Arc<dyn ClientFactory>,
    members: Option<AggregateHandle>,
}

impl fmt::Debug for WorkerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerDescriptor")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint.as_ref().map(|e| e.url.as_str()))
            .field("clients", &type_name_of_val(self.clients.as_ref()))
            .field("aggregate", &self.members.is_some())
            .finish()
    }
}

impl WorkerDescriptor {
    /// Account-global (`region == None`) or account-region worker.
    pub fn for_account(
        kind: WorkerKind,
        credential: &Credential,
        region: Option<&Region>,
        clients: &Arc<dyn ClientFactory>,
    ) -> Result<Self, BuildError> {
        let endpoint = clients.endpoint(kind, credential, region)?;
        Ok(Self {
            id: WorkerId::compose(
                kind.domain(),
                kind,
                Some(credential.name()),
                region,
            ),
            kind,
            owner: WorkerOwner::Account(credential.name().clone()),
            region: region.cloned(),
            endpoint: Some(endpoint),
            clients: Arc::clone(clients),
            members: None,
        })
    }

    /// Region-global worker owned by the account that first brought the
    /// region in.
    pub fn for_region(
        kind: WorkerKind,
        credential: &Credential,
        region: &Region,
        clients: &Arc<dyn ClientFactory>,
    ) -> Result<Self, BuildError> {
        let endpoint = clients.endpoint(kind, credential, Some(region))?;
        Ok(Self {
            id: WorkerId::compose(kind.domain(), kind, None, Some(region)),
            kind,
            owner: WorkerOwner::Account(credential.name().clone()),
            region: Some(region.clone()),
            endpoint: Some(endpoint),
            clients: Arc::clone(clients),
            members: None,
        })
    }

    pub fn cross_account(
        kind: WorkerKind,
        clients: &Arc<dyn ClientFactory>,
        members: AggregateHandle,
    ) -> Self {
        Self {
            id: WorkerId::compose(kind.domain(), kind, None, None),
            kind,
            owner: WorkerOwner::Shared,
            region: None,
            endpoint: None,
            clients: Arc::clone(clients),
            members: Some(members),
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn domain(&self) -> ResourceDomain {
        self.kind.domain()
    }

    pub fn owner(&self) -> &WorkerOwner {
        &self.owner
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn endpoint(&self) -> Option<&ClientEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn clients(&self) -> &Arc<dyn ClientFactory> {
        &self.clients
    }

    pub fn members(&self) -> Option<&AggregateHandle> {
        self.members.as_ref()
    }

    pub fn is_owned_by(&self, account: &CredentialName) -> bool {
        self.owner.is_account(account)
    }

    pub(crate) fn set_owner(&mut self, owner: WorkerOwner) {
        self.owner = owner;
    }

    pub fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            id: self.id.clone(),
            kind: self.kind,
            owner: self.owner.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.as_ref().map(|e| e.url.to_string()),
        }
    }
}

/// Serializable view of a descriptor for logs and status output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub kind: WorkerKind,
    pub owner: WorkerOwner,
    pub region: Option<Region>,
    pub endpoint: Option<String>,
}
