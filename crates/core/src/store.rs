//! The embedded workflow state store.
//!
//! Every table lives behind one `RwLock`. A mutating operation takes the
//! write guard once, validates fully, then mutates: that guard scope is the
//! unit-of-work boundary, so multi-entity updates (release + allocate +
//! status change + audit) are all-or-nothing and concurrent operations on a
//! shared bed or admission serialise on the lock. Uniqueness rules (one
//! active allocation per bed and per admission, one active reservation per
//! bed) are enforced on the insert paths in `ledger` and `reservation`, not
//! by callers.
//!
//! Audit tables are private to this module and reachable only through the
//! append and query methods below; no update or delete code path exists.
//!
//! The full state serialises to a JSON snapshot under the configured data
//! directory, written via write-then-rename. Binaries load at startup and
//! persist after successful mutations; in-process state is authoritative
//! while the process runs.

use crate::admission::IpdAdmission;
use crate::audit::{
    AdmissionPriorityAuditLog, AdmissionStatusAuditLog, BedAvailabilityAuditLog, TransferAuditLog,
};
use crate::constants::{STATE_SNAPSHOT_FILENAME, STATE_SNAPSHOT_TMP_FILENAME};
use crate::directory::{Bed, PatientRecord};
use crate::ledger::BedAllocation;
use crate::priority::{ConditionType, ConsiderationType, PriorityRule, SpecialConsideration};
use crate::reservation::TransferBedReservation;
use crate::transfer::{TransferConsent, TransferRecommendation};
use crate::{AdmissionError, AdmissionResult};
use ipd_types::AdmissionNumber;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// All durable tables. Obtained only through [`Store::read`]/[`Store::write`].
#[derive(Default, Serialize, Deserialize)]
pub struct Tables {
    pub(crate) admissions: HashMap<Uuid, IpdAdmission>,
    admission_seq: u64,
    pub(crate) allocations: Vec<BedAllocation>,
    pub(crate) recommendations: HashMap<Uuid, TransferRecommendation>,
    pub(crate) consents: Vec<TransferConsent>,
    pub(crate) reservations: HashMap<Uuid, TransferBedReservation>,
    pub(crate) priority_rules: BTreeMap<ConditionType, PriorityRule>,
    pub(crate) considerations: BTreeMap<ConsiderationType, SpecialConsideration>,
    pub(crate) patients: HashMap<Uuid, PatientRecord>,
    pub(crate) beds: HashMap<Uuid, Bed>,
    audit: AuditTables,
}

#[derive(Default, Serialize, Deserialize)]
struct AuditTables {
    status: Vec<AdmissionStatusAuditLog>,
    priority: Vec<AdmissionPriorityAuditLog>,
    transfer: Vec<TransferAuditLog>,
    bed: Vec<BedAvailabilityAuditLog>,
}

impl Tables {
    /// Issues the next unique human-readable admission number.
    pub(crate) fn issue_admission_number(&mut self, year: i32) -> AdmissionNumber {
        self.admission_seq += 1;
        AdmissionNumber::issue(year, self.admission_seq)
    }

    pub(crate) fn append_status_audit(&mut self, row: AdmissionStatusAuditLog) {
        self.audit.status.push(row);
    }

    pub(crate) fn append_priority_audit(&mut self, row: AdmissionPriorityAuditLog) {
        self.audit.priority.push(row);
    }

    pub(crate) fn append_transfer_audit(&mut self, row: TransferAuditLog) {
        self.audit.transfer.push(row);
    }

    pub(crate) fn append_bed_audit(&mut self, row: BedAvailabilityAuditLog) {
        self.audit.bed.push(row);
    }

    pub(crate) fn status_audit_for_admission(
        &self,
        admission_id: Uuid,
    ) -> impl Iterator<Item = &AdmissionStatusAuditLog> {
        self.audit
            .status
            .iter()
            .filter(move |row| row.admission_id == admission_id)
    }

    pub(crate) fn priority_audit_for_admission(
        &self,
        admission_id: Uuid,
    ) -> impl Iterator<Item = &AdmissionPriorityAuditLog> {
        self.audit
            .priority
            .iter()
            .filter(move |row| row.admission_id == admission_id)
    }

    pub(crate) fn transfer_audit_for_admission(
        &self,
        admission_id: Uuid,
    ) -> impl Iterator<Item = &TransferAuditLog> {
        self.audit
            .transfer
            .iter()
            .filter(move |row| row.admission_id == admission_id)
    }

    pub(crate) fn transfer_audit_for_recommendation(
        &self,
        recommendation_id: Uuid,
    ) -> impl Iterator<Item = &TransferAuditLog> {
        self.audit
            .transfer
            .iter()
            .filter(move |row| row.recommendation_id == recommendation_id)
    }

    pub(crate) fn bed_audit_for_bed(
        &self,
        bed_id: Uuid,
    ) -> impl Iterator<Item = &BedAvailabilityAuditLog> {
        self.audit
            .bed
            .iter()
            .filter(move |row| row.bed_id == bed_id)
    }
}

/// The shared state store. Cheap to clone via `Arc`; services hold one.
#[derive(Default)]
pub struct Store {
    inner: RwLock<Tables>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to the tables.
    ///
    /// A poisoned lock is recovered rather than propagated: the state is
    /// guarded by validate-then-mutate, so a panicking writer cannot leave a
    /// torn multi-entity update behind.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access to the tables; the guard scope is the unit of work.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the snapshot from `data_dir`, or starts empty when none exists.
    pub fn load(data_dir: &Path) -> AdmissionResult<Self> {
        let snapshot_path = data_dir.join(STATE_SNAPSHOT_FILENAME);
        if !snapshot_path.is_file() {
            return Ok(Self::new());
        }

        let contents = fs::read_to_string(&snapshot_path).map_err(AdmissionError::SnapshotRead)?;
        let tables: Tables =
            serde_json::from_str(&contents).map_err(AdmissionError::SnapshotDeserialization)?;

        tracing::debug!(path = %snapshot_path.display(), "loaded state snapshot");
        Ok(Self {
            inner: RwLock::new(tables),
        })
    }

    /// Persists the snapshot to `data_dir` via write-then-rename.
    pub fn persist(&self, data_dir: &Path) -> AdmissionResult<()> {
        fs::create_dir_all(data_dir).map_err(AdmissionError::SnapshotWrite)?;

        let tables = self.read();
        let contents =
            serde_json::to_string_pretty(&*tables).map_err(AdmissionError::SnapshotSerialization)?;
        drop(tables);

        let tmp_path = data_dir.join(STATE_SNAPSHOT_TMP_FILENAME);
        let snapshot_path = data_dir.join(STATE_SNAPSHOT_FILENAME);
        fs::write(&tmp_path, contents).map_err(AdmissionError::SnapshotWrite)?;
        fs::rename(&tmp_path, &snapshot_path).map_err(AdmissionError::SnapshotWrite)?;

        tracing::debug!(path = %snapshot_path.display(), "persisted state snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, Role};
    use crate::admission::AdmissionService;
    use crate::directory::WardType;
    use crate::status::AdmissionStatus;
    use crate::testutil;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_snapshot_starts_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::load(temp_dir.path()).expect("load should succeed");
        assert!(store.read().admissions.is_empty());
    }

    #[test]
    fn test_snapshot_round_trip_preserves_workflow_state() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let store = Arc::new(Store::new());
        let patient_id = testutil::patient(&store);
        let bed_id = testutil::bed(&store, "GEN-01", WardType::General);
        let doctor = Actor::new(Uuid::new_v4(), Role::Doctor);
        let nurse = Actor::new(Uuid::new_v4(), Role::Nurse);

        let service = AdmissionService::new(store.clone());
        let admission = service.create(&doctor, patient_id).expect("create should succeed");
        service
            .shift_to_ward(&nurse, admission.id, bed_id)
            .expect("shift should succeed");

        store.persist(temp_dir.path()).expect("persist should succeed");

        let reloaded = Store::load(temp_dir.path()).expect("load should succeed");
        let tables = reloaded.read();
        assert_eq!(tables.admissions.len(), 1);
        assert_eq!(
            tables.admissions[&admission.id].status,
            AdmissionStatus::Active
        );
        assert_eq!(tables.allocations.len(), 1);
        assert_eq!(tables.status_audit_for_admission(admission.id).count(), 2);
        assert_eq!(tables.bed_audit_for_bed(bed_id).count(), 1);
    }

    #[test]
    fn test_admission_numbers_continue_after_reload() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let store = Arc::new(Store::new());
        let first = store.write().issue_admission_number(2026);
        store.persist(temp_dir.path()).expect("persist should succeed");

        let reloaded = Store::load(temp_dir.path()).expect("load should succeed");
        let second = reloaded.write().issue_admission_number(2026);
        assert_ne!(first, second, "the sequence must survive a reload");
    }
}
