//! Ward-transfer workflow orchestration.
//!
//! A transfer moves through `RECOMMENDED -> CONSENTED -> BED_RESERVED ->
//! EXECUTED`, with `ABANDONED` reachable from any non-terminal stage. Each
//! step is role-gated, validated synchronously, and never partially applied:
//! a failed step leaves the recommendation, the admission and both bed tables
//! exactly as they were, and the caller re-drives the workflow from the
//! failed step. There is no automatic retry.

use crate::actor::{require_role, Actor, CAN_APPROVE, CAN_EXECUTE, CAN_RECOMMEND};
use crate::admission::{apply_transition, IpdAdmission};
use crate::audit::{
    BedAvailabilityAuditLog, BedAvailabilityChange, TransferAuditLog, TransferStep,
};
use crate::directory::{require_bed, WardType};
use crate::reservation::{ReleaseOutcome, ReservationStatus, TransferBedReservation};
use crate::status::{authority, AdmissionStatus};
use crate::store::{Store, Tables};
use crate::{ledger, reservation, AdmissionError, AdmissionResult};
use chrono::{DateTime, Utc};
use ipd_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Stage of a transfer recommendation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStage {
    Recommended,
    Consented,
    BedReserved,
    Executed,
    Abandoned,
}

impl TransferStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStage::Executed | TransferStage::Abandoned)
    }
}

impl std::fmt::Display for TransferStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransferStage::Recommended => "RECOMMENDED",
            TransferStage::Consented => "CONSENTED",
            TransferStage::BedReserved => "BED_RESERVED",
            TransferStage::Executed => "EXECUTED",
            TransferStage::Abandoned => "ABANDONED",
        };
        write!(f, "{label}")
    }
}

/// A doctor's recommendation to move an admission to another ward type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferRecommendation {
    pub id: Uuid,
    pub admission_id: Uuid,
    pub recommended_by: Uuid,
    pub target_ward: WardType,
    pub emergency: bool,
    /// Mandatory follow-up for emergency recommendations; until present the
    /// record is pending compliance and shows up in the misuse-prevention
    /// query.
    pub emergency_justification: Option<String>,
    pub recommended_at: DateTime<Utc>,
    pub stage: TransferStage,
}

impl TransferRecommendation {
    /// Whether this record awaits its emergency justification.
    pub fn pending_justification(&self) -> bool {
        self.emergency
            && self.emergency_justification.is_none()
            && self.stage != TransferStage::Abandoned
    }
}

/// Outcome of a consent decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentOutcome {
    Granted,
    Declined,
}

impl std::fmt::Display for ConsentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsentOutcome::Granted => write!(f, "granted"),
            ConsentOutcome::Declined => write!(f, "declined"),
        }
    }
}

/// One consent decision against a recommendation. Prior consents are retained
/// as history; the most recent one is the meaningful decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConsent {
    pub id: Uuid,
    pub recommendation_id: Uuid,
    pub consented_by: Uuid,
    pub outcome: ConsentOutcome,
    pub consented_at: DateTime<Utc>,
}

/// Orchestrates the four-step transfer protocol.
#[derive(Clone)]
pub struct TransferService {
    store: Arc<Store>,
}

impl TransferService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn get(&self, id: Uuid) -> AdmissionResult<TransferRecommendation> {
        let tables = self.store.read();
        recommendation(&tables, id).cloned()
    }

    /// All recommendations, newest first.
    pub fn list(&self) -> Vec<TransferRecommendation> {
        let tables = self.store.read();
        let mut rows: Vec<TransferRecommendation> =
            tables.recommendations.values().cloned().collect();
        rows.sort_by(|a, b| b.recommended_at.cmp(&a.recommended_at));
        rows
    }

    /// Emergency recommendations still awaiting their justification.
    pub fn pending_justification(&self) -> Vec<TransferRecommendation> {
        let tables = self.store.read();
        let mut rows: Vec<TransferRecommendation> = tables
            .recommendations
            .values()
            .filter(|row| row.pending_justification())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recommended_at.cmp(&a.recommended_at));
        rows
    }

    /// Step 1: a doctor recommends the transfer.
    ///
    /// An emergency recommendation may be created without its justification;
    /// it is then pending compliance until one is supplied.
    pub fn recommend(
        &self,
        actor: &Actor,
        admission_id: Uuid,
        target_ward: WardType,
        emergency: bool,
        justification: Option<&str>,
    ) -> AdmissionResult<TransferRecommendation> {
        require_role(actor, CAN_RECOMMEND, "recommend a transfer")?;

        let justification = match justification {
            Some(text) => {
                if !emergency {
                    return Err(AdmissionError::InvalidInput(
                        "justification applies only to emergency recommendations".into(),
                    ));
                }
                Some(NonEmptyText::new(text)?.as_str().to_owned())
            }
            None => None,
        };

        let mut tables = self.store.write();
        let status = tables
            .admissions
            .get(&admission_id)
            .ok_or(AdmissionError::NotFound {
                kind: "admission",
                id: admission_id.to_string(),
            })?
            .status;
        if !matches!(
            status,
            AdmissionStatus::Active | AdmissionStatus::Transferred
        ) {
            return Err(AdmissionError::InvalidInput(format!(
                "admission is {status}; only an in-ward admission can be transferred"
            )));
        }

        let now = Utc::now();
        let recommendation = TransferRecommendation {
            id: Uuid::new_v4(),
            admission_id,
            recommended_by: actor.id,
            target_ward,
            emergency,
            emergency_justification: justification,
            recommended_at: now,
            stage: TransferStage::Recommended,
        };
        tables
            .recommendations
            .insert(recommendation.id, recommendation.clone());

        append_step(
            &mut tables,
            &recommendation,
            TransferStep::Recommended,
            actor,
            Some(format!("target ward: {target_ward}")),
            now,
        );

        tracing::info!(
            recommendation_id = %recommendation.id,
            admission_id = %admission_id,
            emergency,
            "transfer recommended"
        );
        Ok(recommendation)
    }

    /// Supplies the emergency justification after the fact.
    ///
    /// Allowed at any stage so compliance can be restored even on an executed
    /// transfer; the pending-justification query stops listing the record
    /// once the text is present.
    pub fn provide_justification(
        &self,
        actor: &Actor,
        recommendation_id: Uuid,
        justification: &str,
    ) -> AdmissionResult<TransferRecommendation> {
        require_role(actor, CAN_RECOMMEND, "justify an emergency transfer")?;
        let justification = NonEmptyText::new(justification)
            .map_err(|_| AdmissionError::InvalidInput("justification cannot be blank".into()))?;

        let mut tables = self.store.write();
        let row = tables
            .recommendations
            .get_mut(&recommendation_id)
            .ok_or(AdmissionError::NotFound {
                kind: "transfer recommendation",
                id: recommendation_id.to_string(),
            })?;
        if !row.emergency {
            return Err(AdmissionError::InvalidInput(
                "recommendation is not flagged as an emergency".into(),
            ));
        }

        row.emergency_justification = Some(justification.as_str().to_owned());
        let updated = row.clone();

        let now = Utc::now();
        append_step(
            &mut tables,
            &updated,
            TransferStep::JustificationProvided,
            actor,
            None,
            now,
        );
        Ok(updated)
    }

    /// Step 2: the IPD manager records a consent decision.
    ///
    /// Only a granted decision advances the stage; a declined one is kept as
    /// history and leaves the stage untouched.
    pub fn consent(
        &self,
        actor: &Actor,
        recommendation_id: Uuid,
        outcome: ConsentOutcome,
    ) -> AdmissionResult<TransferConsent> {
        require_role(actor, CAN_APPROVE, "consent to a transfer")?;

        let mut tables = self.store.write();
        let stage = recommendation(&tables, recommendation_id)?.stage;
        if stage.is_terminal() {
            return Err(AdmissionError::InvalidTransferStage {
                stage,
                action: "record consent",
            });
        }

        let now = Utc::now();
        let consent = TransferConsent {
            id: Uuid::new_v4(),
            recommendation_id,
            consented_by: actor.id,
            outcome,
            consented_at: now,
        };
        tables.consents.push(consent.clone());

        if outcome == ConsentOutcome::Granted && stage == TransferStage::Recommended {
            set_stage(&mut tables, recommendation_id, TransferStage::Consented)?;
        }

        let row = recommendation(&tables, recommendation_id)?.clone();
        append_step(
            &mut tables,
            &row,
            TransferStep::Consented,
            actor,
            Some(format!("outcome: {outcome}")),
            now,
        );

        tracing::info!(
            recommendation_id = %recommendation_id,
            %outcome,
            "transfer consent recorded"
        );
        Ok(consent)
    }

    /// Consent history for a recommendation, newest first.
    pub fn consents_for(&self, recommendation_id: Uuid) -> Vec<TransferConsent> {
        let tables = self.store.read();
        let mut rows: Vec<TransferConsent> = tables
            .consents
            .iter()
            .filter(|row| row.recommendation_id == recommendation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.consented_at.cmp(&a.consented_at));
        rows
    }

    /// Step 3: holds a candidate bed for the transfer.
    ///
    /// Requires recorded consent. On `BedAlreadyReserved` the recommendation
    /// stays `CONSENTED`; the caller picks another bed or retries later.
    pub fn reserve_bed(
        &self,
        actor: &Actor,
        recommendation_id: Uuid,
        bed_id: Uuid,
    ) -> AdmissionResult<TransferBedReservation> {
        require_role(actor, CAN_APPROVE, "reserve a transfer bed")?;

        let mut tables = self.store.write();
        let row = recommendation(&tables, recommendation_id)?.clone();
        if row.stage != TransferStage::Consented {
            return Err(AdmissionError::InvalidTransferStage {
                stage: row.stage,
                action: "reserve a bed",
            });
        }

        let bed = require_bed(&tables, bed_id)?;
        if bed.ward_type != row.target_ward {
            return Err(AdmissionError::InvalidInput(format!(
                "bed {} is in a {} ward; the recommendation targets {}",
                bed.code, bed.ward_type, row.target_ward
            )));
        }
        if ledger::active_for_bed(&tables, bed_id)
            .is_some_and(|active| active.admission_id == row.admission_id)
        {
            return Err(AdmissionError::InvalidInput(
                "target bed is the admission's current bed".into(),
            ));
        }

        let now = Utc::now();
        let reservation = reservation::reserve(&mut tables, recommendation_id, bed_id, now)?;
        set_stage(&mut tables, recommendation_id, TransferStage::BedReserved)?;

        append_step(
            &mut tables,
            &row,
            TransferStep::BedReserved,
            actor,
            Some(format!("bed: {bed_id}")),
            now,
        );

        tracing::info!(
            recommendation_id = %recommendation_id,
            bed_id = %bed_id,
            "transfer bed held"
        );
        Ok(reservation)
    }

    /// Confirms the held bed, a precondition of execution.
    pub fn confirm_reservation(
        &self,
        actor: &Actor,
        recommendation_id: Uuid,
    ) -> AdmissionResult<TransferBedReservation> {
        require_role(actor, CAN_APPROVE, "confirm a transfer reservation")?;

        let mut tables = self.store.write();
        let row = recommendation(&tables, recommendation_id)?.clone();
        if row.stage != TransferStage::BedReserved {
            return Err(AdmissionError::InvalidTransferStage {
                stage: row.stage,
                action: "confirm a reservation",
            });
        }

        let reservation_id = reservation::latest_for_recommendation(&tables, recommendation_id)
            .ok_or(AdmissionError::NotFound {
                kind: "reservation",
                id: recommendation_id.to_string(),
            })?
            .id;

        let now = Utc::now();
        let confirmed = reservation::confirm(&mut tables, reservation_id, now)?;

        append_step(
            &mut tables,
            &row,
            TransferStep::ReservationConfirmed,
            actor,
            None,
            now,
        );
        Ok(confirmed)
    }

    /// Step 4: executes the physical move.
    ///
    /// Requires a `CONFIRMED` reservation. Releases the current bed,
    /// allocates the reserved one, transitions the admission to
    /// `TRANSFERRED`, consumes the reservation and writes the audit rows,
    /// all in one unit of work. Every validation runs before the first
    /// mutation, so any failure leaves the admission's bed and status exactly
    /// as they were.
    pub fn execute(&self, actor: &Actor, recommendation_id: Uuid) -> AdmissionResult<IpdAdmission> {
        require_role(actor, CAN_EXECUTE, "execute a transfer")?;

        let mut tables = self.store.write();
        let row = recommendation(&tables, recommendation_id)?.clone();
        if row.stage != TransferStage::BedReserved {
            return Err(AdmissionError::InvalidTransferStage {
                stage: row.stage,
                action: "execute",
            });
        }

        let held = reservation::latest_for_recommendation(&tables, recommendation_id)
            .ok_or(AdmissionError::NotFound {
                kind: "reservation",
                id: recommendation_id.to_string(),
            })?
            .clone();
        if held.consumed_at.is_some() {
            return Err(AdmissionError::InvalidReservationState {
                reservation_id: held.id,
            });
        }
        if held.status != ReservationStatus::Confirmed {
            return Err(AdmissionError::ReservationNotConfirmed {
                reservation_id: held.id,
            });
        }

        let current_status = tables
            .admissions
            .get(&row.admission_id)
            .ok_or(AdmissionError::NotFound {
                kind: "admission",
                id: row.admission_id.to_string(),
            })?
            .status;
        authority().check(Some(current_status), AdmissionStatus::Transferred)?;

        let old_bed = ledger::active_for_admission(&tables, row.admission_id)
            .ok_or(AdmissionError::NoActiveAllocation {
                bed_id: held.bed_id,
            })?
            .bed_id;
        if ledger::active_for_bed(&tables, held.bed_id).is_some() {
            return Err(AdmissionError::BedAlreadyOccupied {
                bed_id: held.bed_id,
            });
        }

        // All checks passed; mutate.
        let now = Utc::now();
        ledger::release(&mut tables, old_bed, now)?;
        ledger::allocate(&mut tables, held.bed_id, row.admission_id, now)?;
        reservation::consume(&mut tables, held.id, now)?;
        let updated = apply_transition(
            &mut tables,
            actor,
            row.admission_id,
            current_status,
            AdmissionStatus::Transferred,
            None,
            now,
        )?;
        set_stage(&mut tables, recommendation_id, TransferStage::Executed)?;

        tables.append_bed_audit(BedAvailabilityAuditLog {
            id: Uuid::new_v4(),
            bed_id: old_bed,
            admission_id: row.admission_id,
            change: BedAvailabilityChange::Freed,
            actor_id: actor.id,
            role: actor.role,
            recorded_at: now,
        });
        tables.append_bed_audit(BedAvailabilityAuditLog {
            id: Uuid::new_v4(),
            bed_id: held.bed_id,
            admission_id: row.admission_id,
            change: BedAvailabilityChange::Occupied,
            actor_id: actor.id,
            role: actor.role,
            recorded_at: now,
        });
        append_step(
            &mut tables,
            &row,
            TransferStep::Executed,
            actor,
            Some(format!("bed: {} -> {}", old_bed, held.bed_id)),
            now,
        );

        tracing::info!(
            recommendation_id = %recommendation_id,
            admission_id = %row.admission_id,
            from_bed = %old_bed,
            to_bed = %held.bed_id,
            "transfer executed"
        );
        Ok(updated)
    }

    /// Abandons the workflow from any non-terminal stage, releasing a live
    /// reservation if one exists.
    pub fn abandon(
        &self,
        actor: &Actor,
        recommendation_id: Uuid,
        reason: Option<&str>,
    ) -> AdmissionResult<TransferRecommendation> {
        require_role(actor, CAN_APPROVE, "abandon a transfer")?;
        let reason = match reason {
            Some(text) => Some(NonEmptyText::new(text)?.as_str().to_owned()),
            None => None,
        };

        let mut tables = self.store.write();
        let row = recommendation(&tables, recommendation_id)?.clone();
        if row.stage.is_terminal() {
            return Err(AdmissionError::InvalidTransferStage {
                stage: row.stage,
                action: "abandon",
            });
        }

        let now = Utc::now();
        if let Some(held) = reservation::latest_for_recommendation(&tables, recommendation_id) {
            let reservation_id = held.id;
            if reservation::release(&mut tables, reservation_id, now)? == ReleaseOutcome::Released
            {
                tracing::debug!(%reservation_id, "released reservation of abandoned transfer");
            }
        }
        set_stage(&mut tables, recommendation_id, TransferStage::Abandoned)?;

        let updated = recommendation(&tables, recommendation_id)?.clone();
        append_step(&mut tables, &updated, TransferStep::Abandoned, actor, reason, now);
        Ok(updated)
    }
}

fn recommendation(
    tables: &Tables,
    id: Uuid,
) -> AdmissionResult<&TransferRecommendation> {
    tables
        .recommendations
        .get(&id)
        .ok_or(AdmissionError::NotFound {
            kind: "transfer recommendation",
            id: id.to_string(),
        })
}

fn set_stage(
    tables: &mut Tables,
    id: Uuid,
    stage: TransferStage,
) -> AdmissionResult<()> {
    let row = tables
        .recommendations
        .get_mut(&id)
        .ok_or(AdmissionError::NotFound {
            kind: "transfer recommendation",
            id: id.to_string(),
        })?;
    row.stage = stage;
    Ok(())
}

fn append_step(
    tables: &mut Tables,
    recommendation: &TransferRecommendation,
    step: TransferStep,
    actor: &Actor,
    detail: Option<String>,
    now: DateTime<Utc>,
) {
    tables.append_transfer_audit(TransferAuditLog {
        id: Uuid::new_v4(),
        recommendation_id: recommendation.id,
        admission_id: recommendation.admission_id,
        step,
        actor_id: actor.id,
        role: actor.role,
        detail,
        recorded_at: now,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::admission::AdmissionService;
    use crate::testutil;

    struct Fixture {
        store: Arc<Store>,
        service: TransferService,
        admissions: AdmissionService,
        admission: IpdAdmission,
        icu_bed: Uuid,
        doctor: Actor,
        manager: Actor,
        nurse: Actor,
    }

    /// An active admission in a general-ward bed, with a free ICU bed to
    /// transfer into.
    fn fixture() -> Fixture {
        let store = Arc::new(Store::new());
        let patient_id = testutil::patient(&store);
        let general_bed = testutil::bed(&store, "GEN-01", WardType::General);
        let icu_bed = testutil::bed(&store, "ICU-01", WardType::Icu);

        let doctor = Actor::new(Uuid::new_v4(), Role::Doctor);
        let manager = Actor::new(Uuid::new_v4(), Role::IpdManager);
        let nurse = Actor::new(Uuid::new_v4(), Role::Nurse);

        let admissions = AdmissionService::new(store.clone());
        let admission = admissions
            .create(&doctor, patient_id)
            .expect("create should succeed");
        let admission = admissions
            .shift_to_ward(&nurse, admission.id, general_bed)
            .expect("shift should succeed");

        Fixture {
            service: TransferService::new(store.clone()),
            store,
            admissions,
            admission,
            icu_bed,
            doctor,
            manager,
            nurse,
        }
    }

    fn drive_to_reserved(fx: &Fixture) -> TransferRecommendation {
        let recommendation = fx
            .service
            .recommend(&fx.doctor, fx.admission.id, WardType::Icu, false, None)
            .expect("recommend should succeed");
        fx.service
            .consent(&fx.manager, recommendation.id, ConsentOutcome::Granted)
            .expect("consent should succeed");
        fx.service
            .reserve_bed(&fx.manager, recommendation.id, fx.icu_bed)
            .expect("reserve should succeed");
        recommendation
    }

    #[test]
    fn test_full_protocol_moves_the_patient() {
        let fx = fixture();
        let recommendation = drive_to_reserved(&fx);
        fx.service
            .confirm_reservation(&fx.manager, recommendation.id)
            .expect("confirm should succeed");

        let updated = fx
            .service
            .execute(&fx.nurse, recommendation.id)
            .expect("execute should succeed");
        assert_eq!(updated.status, AdmissionStatus::Transferred);

        let tables = fx.store.read();
        let active = ledger::active_for_admission(&tables, fx.admission.id)
            .expect("admission should hold a bed");
        assert_eq!(active.bed_id, fx.icu_bed);
        assert_eq!(
            tables.recommendations[&recommendation.id].stage,
            TransferStage::Executed
        );

        // Recommend + consent + reserve + confirm + execute.
        assert_eq!(
            tables.transfer_audit_for_recommendation(recommendation.id).count(),
            5
        );
    }

    #[test]
    fn test_recommend_requires_in_ward_admission() {
        let store = Arc::new(Store::new());
        let patient_id = testutil::patient(&store);
        let doctor = Actor::new(Uuid::new_v4(), Role::Doctor);
        let admissions = AdmissionService::new(store.clone());
        let admission = admissions
            .create(&doctor, patient_id)
            .expect("create should succeed");

        let service = TransferService::new(store);
        let err = service
            .recommend(&doctor, admission.id, WardType::Icu, false, None)
            .expect_err("an ADMITTED patient has no bed to transfer from");
        assert!(matches!(err, AdmissionError::InvalidInput(_)));
    }

    #[test]
    fn test_consent_required_before_reserve() {
        let fx = fixture();
        let recommendation = fx
            .service
            .recommend(&fx.doctor, fx.admission.id, WardType::Icu, false, None)
            .expect("recommend should succeed");

        let err = fx
            .service
            .reserve_bed(&fx.manager, recommendation.id, fx.icu_bed)
            .expect_err("reserve requires recorded consent");
        assert!(matches!(err, AdmissionError::InvalidTransferStage { .. }));
    }

    #[test]
    fn test_declined_consent_leaves_stage_untouched() {
        let fx = fixture();
        let recommendation = fx
            .service
            .recommend(&fx.doctor, fx.admission.id, WardType::Icu, false, None)
            .expect("recommend should succeed");

        fx.service
            .consent(&fx.manager, recommendation.id, ConsentOutcome::Declined)
            .expect("declined consent is still recorded");

        let row = fx.service.get(recommendation.id).expect("row should exist");
        assert_eq!(row.stage, TransferStage::Recommended);
        assert_eq!(fx.service.consents_for(recommendation.id).len(), 1);
    }

    #[test]
    fn test_second_reservation_on_same_bed_conflicts() {
        let fx = fixture();

        // Second admission competing for the same ICU bed.
        let patient_b = testutil::patient(&fx.store);
        let bed_b = testutil::bed(&fx.store, "GEN-02", WardType::General);
        let admission_b = fx
            .admissions
            .create(&fx.doctor, patient_b)
            .expect("create should succeed");
        fx.admissions
            .shift_to_ward(&fx.nurse, admission_b.id, bed_b)
            .expect("shift should succeed");

        let reco_a = drive_to_reserved(&fx);

        let reco_b = fx
            .service
            .recommend(&fx.doctor, admission_b.id, WardType::Icu, false, None)
            .expect("recommend should succeed");
        fx.service
            .consent(&fx.manager, reco_b.id, ConsentOutcome::Granted)
            .expect("consent should succeed");
        let err = fx
            .service
            .reserve_bed(&fx.manager, reco_b.id, fx.icu_bed)
            .expect_err("exactly one reservation may win the bed");
        assert!(matches!(err, AdmissionError::BedAlreadyReserved { .. }));

        // The loser stays CONSENTED and can retry with another bed.
        let row = fx.service.get(reco_b.id).expect("row should exist");
        assert_eq!(row.stage, TransferStage::Consented);

        let winner = fx.service.get(reco_a.id).expect("row should exist");
        assert_eq!(winner.stage, TransferStage::BedReserved);
    }

    #[test]
    fn test_reserve_rejects_ward_type_mismatch() {
        let fx = fixture();
        let hdu_bed = testutil::bed(&fx.store, "HDU-01", WardType::Hdu);
        let recommendation = fx
            .service
            .recommend(&fx.doctor, fx.admission.id, WardType::Icu, false, None)
            .expect("recommend should succeed");
        fx.service
            .consent(&fx.manager, recommendation.id, ConsentOutcome::Granted)
            .expect("consent should succeed");

        let err = fx
            .service
            .reserve_bed(&fx.manager, recommendation.id, hdu_bed)
            .expect_err("bed ward type must match the recommendation target");
        assert!(matches!(err, AdmissionError::InvalidInput(_)));
    }

    #[test]
    fn test_execute_requires_confirmed_reservation() {
        let fx = fixture();
        let recommendation = drive_to_reserved(&fx);

        let err = fx
            .service
            .execute(&fx.nurse, recommendation.id)
            .expect_err("a HELD reservation must not execute");
        assert!(matches!(err, AdmissionError::ReservationNotConfirmed { .. }));

        // Nothing may have moved.
        let tables = fx.store.read();
        assert_eq!(
            tables.admissions[&fx.admission.id].status,
            AdmissionStatus::Active
        );
        let active = ledger::active_for_admission(&tables, fx.admission.id)
            .expect("admission still holds its bed");
        assert_ne!(active.bed_id, fx.icu_bed);
        assert!(
            !tables
                .transfer_audit_for_recommendation(recommendation.id)
                .any(|row| row.step == TransferStep::Executed),
            "no partial audit row may be written"
        );
    }

    #[test]
    fn test_execute_role_gate() {
        let fx = fixture();
        let recommendation = drive_to_reserved(&fx);
        fx.service
            .confirm_reservation(&fx.manager, recommendation.id)
            .expect("confirm should succeed");

        let err = fx
            .service
            .execute(&fx.manager, recommendation.id)
            .expect_err("the manager is not in the execute allow-list");
        assert!(matches!(err, AdmissionError::Forbidden { .. }));
    }

    #[test]
    fn test_abandon_releases_the_held_bed() {
        let fx = fixture();
        let recommendation = drive_to_reserved(&fx);

        fx.service
            .abandon(&fx.manager, recommendation.id, Some("patient stabilised"))
            .expect("abandon should succeed");

        let tables = fx.store.read();
        assert!(
            reservation::active_for_bed(&tables, fx.icu_bed).is_none(),
            "abandonment must free the held bed"
        );
        assert_eq!(
            tables.recommendations[&recommendation.id].stage,
            TransferStage::Abandoned
        );
    }

    #[test]
    fn test_consent_rejected_after_abandonment() {
        let fx = fixture();
        let recommendation = fx
            .service
            .recommend(&fx.doctor, fx.admission.id, WardType::Icu, false, None)
            .expect("recommend should succeed");
        fx.service
            .abandon(&fx.manager, recommendation.id, None)
            .expect("abandon should succeed");

        let err = fx
            .service
            .consent(&fx.manager, recommendation.id, ConsentOutcome::Granted)
            .expect_err("an abandoned workflow accepts no consent");
        assert!(matches!(err, AdmissionError::InvalidTransferStage { .. }));
    }

    #[test]
    fn test_emergency_pending_justification_lifecycle() {
        let fx = fixture();
        let recommendation = fx
            .service
            .recommend(&fx.doctor, fx.admission.id, WardType::Icu, true, None)
            .expect("emergency recommendation without justification is allowed");

        let pending = fx.service.pending_justification();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, recommendation.id);

        fx.service
            .provide_justification(&fx.doctor, recommendation.id, "deteriorating saturation")
            .expect("justification should be accepted");

        assert!(
            fx.service.pending_justification().is_empty(),
            "justified records leave the compliance query"
        );
    }

    #[test]
    fn test_blank_justification_rejected() {
        let fx = fixture();
        let recommendation = fx
            .service
            .recommend(&fx.doctor, fx.admission.id, WardType::Icu, true, None)
            .expect("recommend should succeed");

        let err = fx
            .service
            .provide_justification(&fx.doctor, recommendation.id, "  ")
            .expect_err("blank justification must be rejected");
        assert!(matches!(err, AdmissionError::InvalidInput(_)));
    }

    #[test]
    fn test_second_transfer_from_transferred_status() {
        let fx = fixture();
        let first = drive_to_reserved(&fx);
        fx.service
            .confirm_reservation(&fx.manager, first.id)
            .expect("confirm should succeed");
        fx.service
            .execute(&fx.nurse, first.id)
            .expect("first execute should succeed");

        let hdu_bed = testutil::bed(&fx.store, "HDU-01", WardType::Hdu);
        let second = fx
            .service
            .recommend(&fx.doctor, fx.admission.id, WardType::Hdu, false, None)
            .expect("a TRANSFERRED admission may be transferred again");
        fx.service
            .consent(&fx.manager, second.id, ConsentOutcome::Granted)
            .expect("consent should succeed");
        fx.service
            .reserve_bed(&fx.manager, second.id, hdu_bed)
            .expect("reserve should succeed");
        fx.service
            .confirm_reservation(&fx.manager, second.id)
            .expect("confirm should succeed");
        let updated = fx
            .service
            .execute(&fx.nurse, second.id)
            .expect("second execute should succeed");

        assert_eq!(updated.status, AdmissionStatus::Transferred);
        let tables = fx.store.read();
        let active = ledger::active_for_admission(&tables, fx.admission.id)
            .expect("admission should hold a bed");
        assert_eq!(active.bed_id, hdu_bed);

        // The consumed first reservation no longer blocks its bed.
        assert!(reservation::active_for_bed(&tables, fx.icu_bed).is_none());
    }

    #[test]
    fn test_consumed_reservation_cannot_be_released_by_abandon_path() {
        let fx = fixture();
        let recommendation = drive_to_reserved(&fx);
        fx.service
            .confirm_reservation(&fx.manager, recommendation.id)
            .expect("confirm should succeed");
        fx.service
            .execute(&fx.nurse, recommendation.id)
            .expect("execute should succeed");

        // Executed is terminal, so abandon is rejected at the stage gate
        // before it ever reaches the consumed reservation.
        let err = fx
            .service
            .abandon(&fx.manager, recommendation.id, None)
            .expect_err("an executed workflow cannot be abandoned");
        assert!(matches!(err, AdmissionError::InvalidTransferStage { .. }));
    }
}
