//! Master-data lookups consumed by the workflow engine.
//!
//! Patients, wards and beds are owned by an upstream master-data service; the
//! core only needs to resolve ids and check ward-type compatibility, so this
//! module keeps a thin registry of what that collaborator has told us about.
//! Lifecycle management of these records is out of scope.

use crate::actor::{require_role, Actor, CAN_MANAGE_DIRECTORY};
use crate::store::{Store, Tables};
use crate::{AdmissionError, AdmissionResult};
use ipd_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Clinical ward category a bed belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WardType {
    General,
    Surgical,
    Icu,
    Hdu,
    Maternity,
    Pediatric,
    Isolation,
}

impl std::fmt::Display for WardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            WardType::General => "general",
            WardType::Surgical => "surgical",
            WardType::Icu => "icu",
            WardType::Hdu => "hdu",
            WardType::Maternity => "maternity",
            WardType::Pediatric => "pediatric",
            WardType::Isolation => "isolation",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for WardType {
    type Err = AdmissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "general" => Ok(WardType::General),
            "surgical" => Ok(WardType::Surgical),
            "icu" => Ok(WardType::Icu),
            "hdu" => Ok(WardType::Hdu),
            "maternity" => Ok(WardType::Maternity),
            "pediatric" => Ok(WardType::Pediatric),
            "isolation" => Ok(WardType::Isolation),
            other => Err(AdmissionError::InvalidInput(format!(
                "unknown ward type: '{other}'"
            ))),
        }
    }
}

/// A physical bed as reported by the master-data collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bed {
    pub id: Uuid,
    /// Ward-local label quoted by staff, e.g. `ICU-03`.
    pub code: NonEmptyText,
    pub ward_type: WardType,
}

/// A patient reference as reported by the master-data collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: Uuid,
    /// Unique hospital identifier assigned upstream.
    pub uhid: NonEmptyText,
    pub name: NonEmptyText,
}

/// Registry service over the master-data tables.
#[derive(Clone)]
pub struct Directory {
    store: Arc<Store>,
}

impl Directory {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Registers a patient reference received from the master-data collaborator.
    pub fn register_patient(
        &self,
        actor: &Actor,
        uhid: NonEmptyText,
        name: NonEmptyText,
    ) -> AdmissionResult<PatientRecord> {
        require_role(actor, CAN_MANAGE_DIRECTORY, "register a patient")?;

        let mut tables = self.store.write();
        if tables
            .patients
            .values()
            .any(|p| p.uhid.as_str() == uhid.as_str())
        {
            return Err(AdmissionError::InvalidInput(format!(
                "a patient with UHID '{uhid}' is already registered"
            )));
        }

        let patient = PatientRecord {
            id: Uuid::new_v4(),
            uhid,
            name,
        };
        tables.patients.insert(patient.id, patient.clone());
        tracing::info!(patient_id = %patient.id, "registered patient reference");
        Ok(patient)
    }

    /// Registers a bed received from the master-data collaborator.
    pub fn register_bed(
        &self,
        actor: &Actor,
        code: NonEmptyText,
        ward_type: WardType,
    ) -> AdmissionResult<Bed> {
        require_role(actor, CAN_MANAGE_DIRECTORY, "register a bed")?;

        let mut tables = self.store.write();
        if tables
            .beds
            .values()
            .any(|b| b.code.as_str() == code.as_str())
        {
            return Err(AdmissionError::InvalidInput(format!(
                "a bed with code '{code}' is already registered"
            )));
        }

        let bed = Bed {
            id: Uuid::new_v4(),
            code,
            ward_type,
        };
        tables.beds.insert(bed.id, bed.clone());
        tracing::info!(bed_id = %bed.id, ward = %bed.ward_type, "registered bed");
        Ok(bed)
    }

    pub fn patient(&self, id: Uuid) -> AdmissionResult<PatientRecord> {
        let tables = self.store.read();
        require_patient(&tables, id).cloned()
    }

    pub fn bed(&self, id: Uuid) -> AdmissionResult<Bed> {
        let tables = self.store.read();
        require_bed(&tables, id).cloned()
    }

    pub fn list_beds(&self) -> Vec<Bed> {
        let tables = self.store.read();
        let mut beds: Vec<Bed> = tables.beds.values().cloned().collect();
        beds.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str()));
        beds
    }
}

/// Resolves a patient id or fails with `ResourceNotFound` semantics.
pub(crate) fn require_patient(tables: &Tables, id: Uuid) -> AdmissionResult<&PatientRecord> {
    tables.patients.get(&id).ok_or(AdmissionError::NotFound {
        kind: "patient",
        id: id.to_string(),
    })
}

/// Resolves a bed id or fails with `ResourceNotFound` semantics.
pub(crate) fn require_bed(tables: &Tables, id: Uuid) -> AdmissionResult<&Bed> {
    tables.beds.get(&id).ok_or(AdmissionError::NotFound {
        kind: "bed",
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    #[test]
    fn test_register_and_resolve_bed() {
        let store = Arc::new(Store::new());
        let directory = Directory::new(store);

        let bed = directory
            .register_bed(
                &admin(),
                NonEmptyText::new("ICU-03").unwrap(),
                WardType::Icu,
            )
            .expect("bed registration should succeed");

        let resolved = directory.bed(bed.id).expect("bed should resolve by id");
        assert_eq!(resolved.code.as_str(), "ICU-03");
        assert_eq!(resolved.ward_type, WardType::Icu);
    }

    #[test]
    fn test_duplicate_bed_code_rejected() {
        let store = Arc::new(Store::new());
        let directory = Directory::new(store);
        let code = NonEmptyText::new("GEN-01").unwrap();

        directory
            .register_bed(&admin(), code.clone(), WardType::General)
            .expect("first registration should succeed");
        let err = directory
            .register_bed(&admin(), code, WardType::General)
            .expect_err("duplicate bed code should be rejected");
        assert!(matches!(err, AdmissionError::InvalidInput(_)));
    }

    #[test]
    fn test_unknown_ids_fail_with_not_found() {
        let store = Arc::new(Store::new());
        let directory = Directory::new(store);

        let err = directory
            .patient(Uuid::new_v4())
            .expect_err("unknown patient id should fail");
        assert!(matches!(err, AdmissionError::NotFound { kind: "patient", .. }));

        let err = directory
            .bed(Uuid::new_v4())
            .expect_err("unknown bed id should fail");
        assert!(matches!(err, AdmissionError::NotFound { kind: "bed", .. }));
    }

    #[test]
    fn test_non_admin_may_not_register() {
        let store = Arc::new(Store::new());
        let directory = Directory::new(store);
        let nurse = Actor::new(Uuid::new_v4(), Role::Nurse);

        let err = directory
            .register_bed(&nurse, NonEmptyText::new("GEN-02").unwrap(), WardType::General)
            .expect_err("nurse may not register beds");
        assert!(matches!(err, AdmissionError::Forbidden { .. }));
    }
}
