//! Credential-driven reconciliation of polling workers.
//!
//! A [`LifecycleCoordinator`] receives credential add/update/delete events
//! and drives one [`IncrementalReconciler`] per resource domain. Each
//! reconciler asks its [`WorkerSetBuilder`] for the workers a credential
//! needs, commits them to the domain's [`DomainRegistry`] and, when the
//! domain is bound to a [`WorkScheduler`], hands them off with an
//! unschedule-then-schedule exchange.

pub mod aggregate;
pub mod builders;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod events;
pub mod protocol;
pub mod registry;
pub mod repository;
pub mod scheduler;
pub mod sweep;
pub mod worker;

pub use aggregate::{
    AggregateHandle, AggregateMembers, AggregateSync, CrossAccountAggregator,
};
pub use builders::{
    BuildContext, BuildError, BuildResult, WorkerSetBuilder, standard_builder,
};
pub use config::{
    CleanupConfig, DomainToggles, FleetConfig, RegionOwnershipPolicy,
};
pub use coordinator::{
    DomainReport, DomainSweep, LifecycleCoordinator,
    LifecycleCoordinatorBuilder, LifecycleReport, SweepReport,
};
pub use discovery::{
    CredentialSource, DiscoveryProvider, RecomputingDiscoverer, collect_workers,
};
pub use events::{
    CredentialsLifecycleHandler, LifecycleAction, LifecycleEvent,
    LifecycleQueue,
};
pub use protocol::{IncrementalReconciler, ReconcileOutcome};
pub use registry::{Commit, DomainRegistry, Removal, SweepOutcome};
pub use repository::{MapBackedCredentialsRepository, SyncSummary};
pub use scheduler::{
    Assignment, AssignmentOrigin, DiscoveryDelta, InMemoryScheduler,
    WorkScheduler,
};
pub use sweep::OrphanSweeper;
pub use worker::{
    ClientEndpoint, ClientFactory, RegionalClientFactory, WorkerDescriptor,
    WorkerSummary,
};
