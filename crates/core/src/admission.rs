//! In-patient admissions and their lifecycle operations.
//!
//! An admission's status is mutated only here and in the transfer
//! orchestrator, always through the shared transition authority, and always
//! with the audit row written in the same unit of work as the status change.

use crate::actor::{
    require_role, Actor, CAN_ADMIT, CAN_SHIFT_TO_WARD, CAN_TRANSITION_STATUS,
};
use crate::audit::{
    AdmissionStatusAuditLog, BedAvailabilityAuditLog, BedAvailabilityChange,
};
use crate::directory::{require_bed, require_patient};
use crate::priority::PriorityTier;
use crate::status::{authority, AdmissionStatus};
use crate::store::{Store, Tables};
use crate::{ledger, AdmissionError, AdmissionResult};
use chrono::{DateTime, Datelike, Utc};
use ipd_types::{AdmissionNumber, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One in-patient admission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IpdAdmission {
    pub id: Uuid,
    pub admission_no: AdmissionNumber,
    pub patient_id: Uuid,
    pub status: AdmissionStatus,
    /// Resolved priority tier, set by assessment or override.
    pub priority: Option<PriorityTier>,
    pub admitted_at: DateTime<Utc>,
    /// Set when the admission reaches any terminal status.
    pub ended_at: Option<DateTime<Utc>>,
}

/// Lifecycle service for admissions.
#[derive(Clone)]
pub struct AdmissionService {
    store: Arc<Store>,
}

impl AdmissionService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Creates a new admission for a registered patient.
    ///
    /// The only legal initial status is `ADMITTED`; even creation consults
    /// the transition authority, so the rule lives in exactly one place.
    /// Writes the creation audit row in the same unit of work.
    ///
    /// # Errors
    ///
    /// * [`AdmissionError::Forbidden`] - actor is not permitted to admit
    /// * [`AdmissionError::NotFound`] - unknown patient id
    pub fn create(&self, actor: &Actor, patient_id: Uuid) -> AdmissionResult<IpdAdmission> {
        require_role(actor, CAN_ADMIT, "create an admission")?;

        let mut tables = self.store.write();
        require_patient(&tables, patient_id)?;
        authority().check(None, AdmissionStatus::Admitted)?;

        let now = Utc::now();
        let admission = IpdAdmission {
            id: Uuid::new_v4(),
            admission_no: tables.issue_admission_number(now.year()),
            patient_id,
            status: AdmissionStatus::Admitted,
            priority: None,
            admitted_at: now,
            ended_at: None,
        };
        tables.admissions.insert(admission.id, admission.clone());

        tables.append_status_audit(AdmissionStatusAuditLog {
            id: Uuid::new_v4(),
            admission_id: admission.id,
            from: None,
            to: AdmissionStatus::Admitted,
            actor_id: actor.id,
            role: actor.role,
            reason: None,
            recorded_at: now,
        });

        tracing::info!(
            admission_id = %admission.id,
            admission_no = %admission.admission_no,
            "created admission"
        );
        Ok(admission)
    }

    pub fn get(&self, id: Uuid) -> AdmissionResult<IpdAdmission> {
        let tables = self.store.read();
        tables
            .admissions
            .get(&id)
            .cloned()
            .ok_or(AdmissionError::NotFound {
                kind: "admission",
                id: id.to_string(),
            })
    }

    /// All admissions, newest first.
    pub fn list(&self) -> Vec<IpdAdmission> {
        let tables = self.store.read();
        let mut rows: Vec<IpdAdmission> = tables.admissions.values().cloned().collect();
        rows.sort_by(|a, b| b.admitted_at.cmp(&a.admitted_at));
        rows
    }

    /// Statuses reachable from the admission's current status.
    pub fn allowed_targets(&self, id: Uuid) -> AdmissionResult<Vec<AdmissionStatus>> {
        let current = self.get(id)?.status;
        Ok(authority()
            .allowed_targets(Some(current))
            .into_iter()
            .collect())
    }

    /// Drives a direct status transition.
    ///
    /// Rejected transitions leave no trace: no state change, no audit row.
    /// Reaching a terminal status releases any bed the admission still holds
    /// (with its occupancy audit row) and stamps `ended_at`, all in the same
    /// unit of work.
    ///
    /// The `TRANSFERRED -> ACTIVE` edge is nominally status-only, but the
    /// write is rejected unless the admission holds exactly one active
    /// allocation at that moment.
    pub fn transition_status(
        &self,
        actor: &Actor,
        id: Uuid,
        target: AdmissionStatus,
        reason: Option<NonEmptyText>,
    ) -> AdmissionResult<IpdAdmission> {
        require_role(actor, CAN_TRANSITION_STATUS, "change admission status")?;

        let mut tables = self.store.write();
        let current = tables
            .admissions
            .get(&id)
            .ok_or(AdmissionError::NotFound {
                kind: "admission",
                id: id.to_string(),
            })?
            .status;

        authority().check(Some(current), target)?;

        if current == AdmissionStatus::Transferred
            && target == AdmissionStatus::Active
            && ledger::active_for_admission(&tables, id).is_none()
        {
            return Err(AdmissionError::InvalidInput(
                "admission has no active bed allocation to return to".into(),
            ));
        }

        let now = Utc::now();
        let updated = apply_transition(&mut tables, actor, id, current, target, reason, now)?;

        tracing::info!(admission_id = %id, from = %current, to = %target, "status transition");
        Ok(updated)
    }

    /// Shift-to-ward: the initial bed allocation that takes an `ADMITTED`
    /// patient to `ACTIVE`.
    ///
    /// Allocation, status change and both audit rows happen in one unit of
    /// work; a validation failure leaves everything untouched.
    ///
    /// # Errors
    ///
    /// * [`AdmissionError::InvalidStatusTransition`] - admission is not `ADMITTED`
    /// * [`AdmissionError::BedAlreadyOccupied`] / [`AdmissionError::AdmissionAlreadyHasBed`]
    pub fn shift_to_ward(
        &self,
        actor: &Actor,
        id: Uuid,
        bed_id: Uuid,
    ) -> AdmissionResult<IpdAdmission> {
        require_role(actor, CAN_SHIFT_TO_WARD, "shift a patient to a ward")?;

        let mut tables = self.store.write();
        let current = tables
            .admissions
            .get(&id)
            .ok_or(AdmissionError::NotFound {
                kind: "admission",
                id: id.to_string(),
            })?
            .status;
        require_bed(&tables, bed_id)?;
        authority().check(Some(current), AdmissionStatus::Active)?;

        let now = Utc::now();
        ledger::allocate(&mut tables, bed_id, id, now)?;
        tables.append_bed_audit(BedAvailabilityAuditLog {
            id: Uuid::new_v4(),
            bed_id,
            admission_id: id,
            change: BedAvailabilityChange::Occupied,
            actor_id: actor.id,
            role: actor.role,
            recorded_at: now,
        });
        let updated = apply_transition(
            &mut tables,
            actor,
            id,
            current,
            AdmissionStatus::Active,
            None,
            now,
        )?;

        tracing::info!(admission_id = %id, bed_id = %bed_id, "shifted patient to ward");
        Ok(updated)
    }
}

/// Applies an already-validated transition: status write, `ended_at` stamp,
/// terminal bed release, and the status audit row.
///
/// Callers must have checked the edge with the transition authority first.
pub(crate) fn apply_transition(
    tables: &mut Tables,
    actor: &Actor,
    admission_id: Uuid,
    from: AdmissionStatus,
    to: AdmissionStatus,
    reason: Option<NonEmptyText>,
    now: DateTime<Utc>,
) -> AdmissionResult<IpdAdmission> {
    if authority().is_terminal(to) {
        if let Some(active) = ledger::active_for_admission(tables, admission_id) {
            let bed_id = active.bed_id;
            ledger::release(tables, bed_id, now)?;
            tables.append_bed_audit(BedAvailabilityAuditLog {
                id: Uuid::new_v4(),
                bed_id,
                admission_id,
                change: BedAvailabilityChange::Freed,
                actor_id: actor.id,
                role: actor.role,
                recorded_at: now,
            });
        }
    }

    let admission = tables
        .admissions
        .get_mut(&admission_id)
        .ok_or(AdmissionError::NotFound {
            kind: "admission",
            id: admission_id.to_string(),
        })?;
    admission.status = to;
    if authority().is_terminal(to) {
        admission.ended_at = Some(now);
    }
    let updated = admission.clone();

    tables.append_status_audit(AdmissionStatusAuditLog {
        id: Uuid::new_v4(),
        admission_id,
        from: Some(from),
        to,
        actor_id: actor.id,
        role: actor.role,
        reason: reason.map(|text| text.as_str().to_owned()),
        recorded_at: now,
    });
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::directory::WardType;
    use crate::testutil;

    fn doctor() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Doctor)
    }

    fn nurse() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Nurse)
    }

    #[test]
    fn test_create_starts_admitted_with_audit_row() {
        let store = Arc::new(Store::new());
        let patient_id = testutil::patient(&store);
        let service = AdmissionService::new(store.clone());

        let admission = service
            .create(&doctor(), patient_id)
            .expect("create should succeed");
        assert_eq!(admission.status, AdmissionStatus::Admitted);
        assert!(admission.admission_no.as_str().starts_with("IPD-"));

        let tables = store.read();
        let rows: Vec<_> = tables.status_audit_for_admission(admission.id).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].from, None);
        assert_eq!(rows[0].to, AdmissionStatus::Admitted);
    }

    #[test]
    fn test_create_rejects_unknown_patient() {
        let store = Arc::new(Store::new());
        let service = AdmissionService::new(store);

        let err = service
            .create(&doctor(), Uuid::new_v4())
            .expect_err("unknown patient id must fail");
        assert!(matches!(err, AdmissionError::NotFound { kind: "patient", .. }));
    }

    #[test]
    fn test_admission_numbers_are_unique_and_sequential() {
        let store = Arc::new(Store::new());
        let patient_a = testutil::patient(&store);
        let patient_b = testutil::patient(&store);
        let service = AdmissionService::new(store);

        let first = service.create(&doctor(), patient_a).expect("create should succeed");
        let second = service.create(&doctor(), patient_b).expect("create should succeed");
        assert_ne!(first.admission_no, second.admission_no);
    }

    #[test]
    fn test_direct_discharge_is_rejected_without_trace() {
        let store = Arc::new(Store::new());
        let patient_id = testutil::patient(&store);
        let service = AdmissionService::new(store.clone());
        let admission = service.create(&doctor(), patient_id).expect("create should succeed");

        let err = service
            .transition_status(&doctor(), admission.id, AdmissionStatus::Discharged, None)
            .expect_err("ADMITTED cannot jump straight to DISCHARGED");
        assert!(matches!(err, AdmissionError::InvalidStatusTransition { .. }));

        let tables = store.read();
        assert_eq!(tables.admissions[&admission.id].status, AdmissionStatus::Admitted);
        assert_eq!(
            tables.status_audit_for_admission(admission.id).count(),
            1,
            "a rejected transition must not add an audit row"
        );
    }

    #[test]
    fn test_shift_to_ward_allocates_and_activates() {
        let store = Arc::new(Store::new());
        let patient_id = testutil::patient(&store);
        let bed_id = testutil::bed(&store, "GEN-01", WardType::General);
        let service = AdmissionService::new(store.clone());
        let admission = service.create(&doctor(), patient_id).expect("create should succeed");

        let shifted = service
            .shift_to_ward(&nurse(), admission.id, bed_id)
            .expect("shift should succeed");
        assert_eq!(shifted.status, AdmissionStatus::Active);

        let tables = store.read();
        let active = ledger::active_for_bed(&tables, bed_id).expect("bed should be occupied");
        assert_eq!(active.admission_id, admission.id);
        assert_eq!(tables.bed_audit_for_bed(bed_id).count(), 1);
    }

    #[test]
    fn test_shift_to_ward_rejects_occupied_bed_without_status_change() {
        let store = Arc::new(Store::new());
        let patient_a = testutil::patient(&store);
        let patient_b = testutil::patient(&store);
        let bed_id = testutil::bed(&store, "GEN-02", WardType::General);
        let service = AdmissionService::new(store.clone());

        let first = service.create(&doctor(), patient_a).expect("create should succeed");
        let second = service.create(&doctor(), patient_b).expect("create should succeed");

        service
            .shift_to_ward(&nurse(), first.id, bed_id)
            .expect("first shift should succeed");
        let err = service
            .shift_to_ward(&nurse(), second.id, bed_id)
            .expect_err("occupied bed must reject the second shift");
        assert!(matches!(err, AdmissionError::BedAlreadyOccupied { .. }));

        let tables = store.read();
        assert_eq!(
            tables.admissions[&second.id].status,
            AdmissionStatus::Admitted,
            "failed shift must leave the admission as it was"
        );
    }

    #[test]
    fn test_terminal_transition_frees_the_bed() {
        let store = Arc::new(Store::new());
        let patient_id = testutil::patient(&store);
        let bed_id = testutil::bed(&store, "GEN-03", WardType::General);
        let service = AdmissionService::new(store.clone());
        let admission = service.create(&doctor(), patient_id).expect("create should succeed");
        service
            .shift_to_ward(&nurse(), admission.id, bed_id)
            .expect("shift should succeed");

        service
            .transition_status(&doctor(), admission.id, AdmissionStatus::Lama, None)
            .expect("ACTIVE -> LAMA is legal");

        let tables = store.read();
        assert!(
            ledger::active_for_bed(&tables, bed_id).is_none(),
            "terminal status must free the bed"
        );
        assert!(tables.admissions[&admission.id].ended_at.is_some());
        assert_eq!(
            tables.bed_audit_for_bed(bed_id).count(),
            2,
            "occupied + freed rows"
        );
    }

    #[test]
    fn test_full_discharge_walk() {
        let store = Arc::new(Store::new());
        let patient_id = testutil::patient(&store);
        let bed_id = testutil::bed(&store, "GEN-04", WardType::General);
        let service = AdmissionService::new(store.clone());
        let admission = service.create(&doctor(), patient_id).expect("create should succeed");

        service
            .shift_to_ward(&nurse(), admission.id, bed_id)
            .expect("shift should succeed");
        service
            .transition_status(
                &doctor(),
                admission.id,
                AdmissionStatus::DischargeInitiated,
                None,
            )
            .expect("ACTIVE -> DISCHARGE_INITIATED is legal");
        let discharged = service
            .transition_status(&doctor(), admission.id, AdmissionStatus::Discharged, None)
            .expect("DISCHARGE_INITIATED -> DISCHARGED is legal");

        assert_eq!(discharged.status, AdmissionStatus::Discharged);
        assert!(discharged.ended_at.is_some());

        let tables = store.read();
        // Creation + shift + initiation + discharge = 4 accepted transitions.
        assert_eq!(tables.status_audit_for_admission(admission.id).count(), 4);
    }

    #[test]
    fn test_nurse_may_not_drive_direct_transitions() {
        let store = Arc::new(Store::new());
        let patient_id = testutil::patient(&store);
        let service = AdmissionService::new(store);
        let admission = service.create(&doctor(), patient_id).expect("create should succeed");

        let err = service
            .transition_status(&nurse(), admission.id, AdmissionStatus::Cancelled, None)
            .expect_err("nurse is not in the transition allow-list");
        assert!(matches!(err, AdmissionError::Forbidden { .. }));
    }
}
