//! # API Shared
//!
//! Shared request/response definitions for the IPD APIs.
//!
//! Contains:
//! - JSON DTOs (`dto` module) used by `api-rest` and any future surface
//! - Shared services like `HealthService`
//!
//! DTOs deliberately use plain strings for ids, enums and timestamps so the
//! wire contract stays decoupled from core types; `api-rest` owns the
//! mapping in both directions.

pub mod dto;
pub mod health;

pub use dto::*;
pub use health::HealthService;
