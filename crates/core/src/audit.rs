//! Append-only audit trail.
//!
//! Every accepted status transition, priority override, transfer-workflow
//! step and bed occupancy change writes exactly one row here, in the same
//! unit of work as the state change it describes. Rows are immutable once
//! written; the store exposes append and query paths only, so no update or
//! delete code path exists anywhere in the crate.

use crate::actor::Role;
use crate::priority::PriorityTier;
use crate::status::AdmissionStatus;
use crate::store::Store;
use crate::{AdmissionError, AdmissionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One accepted admission status transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionStatusAuditLog {
    pub id: Uuid,
    pub admission_id: Uuid,
    /// `None` for the creation transition into `ADMITTED`.
    pub from: Option<AdmissionStatus>,
    pub to: AdmissionStatus,
    pub actor_id: Uuid,
    pub role: Role,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// One priority override call, recorded whether or not the value changed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionPriorityAuditLog {
    pub id: Uuid,
    pub admission_id: Uuid,
    pub previous: Option<PriorityTier>,
    pub new_tier: PriorityTier,
    pub actor_id: Uuid,
    pub role: Role,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Which transfer-workflow step an audit row describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStep {
    Recommended,
    JustificationProvided,
    Consented,
    BedReserved,
    ReservationConfirmed,
    Executed,
    Abandoned,
}

/// One transfer-workflow step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferAuditLog {
    pub id: Uuid,
    pub recommendation_id: Uuid,
    pub admission_id: Uuid,
    pub step: TransferStep,
    pub actor_id: Uuid,
    pub role: Role,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Direction of a bed occupancy change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BedAvailabilityChange {
    Occupied,
    Freed,
}

/// One bed occupancy change.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BedAvailabilityAuditLog {
    pub id: Uuid,
    pub bed_id: Uuid,
    pub admission_id: Uuid,
    pub change: BedAvailabilityChange,
    pub actor_id: Uuid,
    pub role: Role,
    pub recorded_at: DateTime<Utc>,
}

/// Entity kinds addressable by the trail query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Admission,
    Bed,
    Transfer,
}

impl std::str::FromStr for EntityKind {
    type Err = AdmissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "admission" => Ok(EntityKind::Admission),
            "bed" => Ok(EntityKind::Bed),
            "transfer" => Ok(EntityKind::Transfer),
            other => Err(AdmissionError::InvalidInput(format!(
                "unknown audit entity kind: '{other}'"
            ))),
        }
    }
}

/// A single trail entry, tagged by the table it came from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    Status(AdmissionStatusAuditLog),
    Priority(AdmissionPriorityAuditLog),
    Transfer(TransferAuditLog),
    BedAvailability(BedAvailabilityAuditLog),
}

impl AuditEvent {
    pub fn recorded_at(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::Status(row) => row.recorded_at,
            AuditEvent::Priority(row) => row.recorded_at,
            AuditEvent::Transfer(row) => row.recorded_at,
            AuditEvent::BedAvailability(row) => row.recorded_at,
        }
    }
}

/// Read-side service over the audit tables.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<Store>,
}

impl AuditTrail {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Lists the trail for one entity, newest first.
    ///
    /// For an admission this merges its status, priority and transfer rows;
    /// for a bed, its occupancy rows; for a transfer, its workflow rows.
    /// `range`, when present, bounds `recorded_at` inclusively on both ends.
    pub fn list(
        &self,
        entity: EntityKind,
        id: Uuid,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> AdmissionResult<Vec<AuditEvent>> {
        let tables = self.store.read();

        let mut events: Vec<AuditEvent> = match entity {
            EntityKind::Admission => {
                if !tables.admissions.contains_key(&id) {
                    return Err(AdmissionError::NotFound {
                        kind: "admission",
                        id: id.to_string(),
                    });
                }
                tables
                    .status_audit_for_admission(id)
                    .cloned()
                    .map(AuditEvent::Status)
                    .chain(
                        tables
                            .priority_audit_for_admission(id)
                            .cloned()
                            .map(AuditEvent::Priority),
                    )
                    .chain(
                        tables
                            .transfer_audit_for_admission(id)
                            .cloned()
                            .map(AuditEvent::Transfer),
                    )
                    .collect()
            }
            EntityKind::Bed => {
                if !tables.beds.contains_key(&id) {
                    return Err(AdmissionError::NotFound {
                        kind: "bed",
                        id: id.to_string(),
                    });
                }
                tables
                    .bed_audit_for_bed(id)
                    .cloned()
                    .map(AuditEvent::BedAvailability)
                    .collect()
            }
            EntityKind::Transfer => {
                if !tables.recommendations.contains_key(&id) {
                    return Err(AdmissionError::NotFound {
                        kind: "transfer recommendation",
                        id: id.to_string(),
                    });
                }
                tables
                    .transfer_audit_for_recommendation(id)
                    .cloned()
                    .map(AuditEvent::Transfer)
                    .collect()
            }
        };

        if let Some((from, to)) = range {
            events.retain(|event| {
                let at = event.recorded_at();
                at >= from && at <= to
            });
        }

        events.sort_by(|a, b| b.recorded_at().cmp(&a.recorded_at()));
        Ok(events)
    }
}
