//! Core data model definitions shared across Drover crates.
#![allow(missing_docs)]

pub mod credential;
pub mod domain;
pub mod error;
pub mod ids;
pub mod region;

pub use credential::{Capabilities, Credential, CredentialDefinition};
pub use domain::{ResourceDomain, WorkerKind, WorkerOwner, WorkerScope};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{CredentialName, WorkerId};
pub use region::Region;
