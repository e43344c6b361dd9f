//! Reconciliation core for Drover.
//!
//! Keeps the population of per-account polling workers in step with the
//! set of active account credentials.
#![allow(missing_docs)]

pub mod error;
pub mod fleet;

pub use error::{FleetError, Result};
