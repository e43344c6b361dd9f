use drover_model::{CredentialName, ResourceDomain};
use thiserror::Error;

use crate::fleet::BuildError;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("failed to build {domain} workers for {account}: {source}")]
    Build {
        domain: ResourceDomain,
        account: CredentialName,
        #[source]
        source: BuildError,
    },

    #[error("scheduler handoff failed for {domain}: {message}")]
    Scheduler {
        domain: ResourceDomain,
        message: String,
    },

    #[error("lifecycle queue closed")]
    QueueClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FleetError>;
