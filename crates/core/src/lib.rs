//! # IPD Core
//!
//! Core business logic for the in-patient department workflow service:
//! - Admission lifecycle driven through a single transition authority
//! - Bed allocation ledger and transfer bed reservations with per-bed
//!   uniqueness guarantees
//! - The four-step ward-transfer protocol with role-gated checkpoints
//! - Priority scoring with audited overrides
//! - An append-only audit trail written in the same unit of work as every
//!   state change
//!
//! **No API concerns**: authentication, HTTP servers, and request validation
//! belong in `api-rest` and `api-shared`. The core consumes a resolved
//! [`actor::Actor`] and performs role allow-list checks itself.

pub mod actor;
pub mod admission;
pub mod audit;
pub mod config;
pub mod constants;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod priority;
pub mod reservation;
pub mod status;
pub mod store;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::CoreConfig;
pub use error::{AdmissionError, AdmissionResult, ErrorKind};
pub use store::Store;
