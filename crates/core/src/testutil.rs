//! Shared fixtures for module tests.

use crate::admission::IpdAdmission;
use crate::directory::{Bed, PatientRecord, WardType};
use crate::status::AdmissionStatus;
use crate::store::Store;
use chrono::{Datelike, Utc};
use ipd_types::NonEmptyText;
use uuid::Uuid;

/// Registers a patient directly in the tables and returns its id.
pub(crate) fn patient(store: &Store) -> Uuid {
    let id = Uuid::new_v4();
    let mut tables = store.write();
    tables.patients.insert(
        id,
        PatientRecord {
            id,
            uhid: NonEmptyText::new(format!("UH-{}", id.simple())).unwrap(),
            name: NonEmptyText::new("Test Patient").unwrap(),
        },
    );
    id
}

/// Registers a bed directly in the tables and returns its id.
pub(crate) fn bed(store: &Store, code: &str, ward_type: WardType) -> Uuid {
    let id = Uuid::new_v4();
    let mut tables = store.write();
    tables.beds.insert(
        id,
        Bed {
            id,
            code: NonEmptyText::new(code).unwrap(),
            ward_type,
        },
    );
    id
}

/// Inserts a freshly admitted admission without driving the full service path.
pub(crate) fn admitted_admission(store: &Store) -> IpdAdmission {
    let patient_id = patient(store);
    let now = Utc::now();

    let mut tables = store.write();
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
    admission
}
