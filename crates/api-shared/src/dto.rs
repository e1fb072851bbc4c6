//! JSON request/response bodies for the IPD REST API.
//!
//! Every mutating request carries the resolved actor identity (`actor_id`,
//! `actor_role`) supplied by the upstream identity collaborator. Ids, enums
//! and timestamps travel as strings; `api-rest` parses and renders them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health check response.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Structured error body for business-rule rejections.
///
/// `kind` is stable and machine-readable; `message` is for humans. Internal
/// failures carry a generic message only.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub kind: String,
    pub message: String,
}

// ============================================================================
// MASTER DATA
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterPatientReq {
    pub actor_id: String,
    pub actor_role: String,
    pub uhid: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientRes {
    pub id: String,
    pub uhid: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterBedReq {
    pub actor_id: String,
    pub actor_role: String,
    pub code: String,
    pub ward_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BedRes {
    pub id: String,
    pub code: String,
    pub ward_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListBedsRes {
    pub beds: Vec<BedRes>,
}

// ============================================================================
// ADMISSIONS
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateAdmissionReq {
    pub actor_id: String,
    pub actor_role: String,
    pub patient_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AdmissionRes {
    pub id: String,
    pub admission_no: String,
    pub patient_id: String,
    pub status: String,
    pub priority: Option<String>,
    pub admitted_at: String,
    pub ended_at: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListAdmissionsRes {
    pub admissions: Vec<AdmissionRes>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransitionStatusReq {
    pub actor_id: String,
    pub actor_role: String,
    pub target: String,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ShiftToWardReq {
    pub actor_id: String,
    pub actor_role: String,
    pub bed_id: String,
}

// ============================================================================
// PRIORITY
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EvaluatePriorityReq {
    pub condition: String,
    #[serde(default)]
    pub considerations: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AppliedRuleRes {
    /// `base_rule` or `boost`.
    pub source: String,
    /// The condition or consideration that contributed.
    pub reference: String,
    pub tier: Option<String>,
    pub boost: Option<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PriorityEvaluationRes {
    pub tier: String,
    pub label: String,
    pub applied: Vec<AppliedRuleRes>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignPriorityReq {
    pub actor_id: String,
    pub actor_role: String,
    pub condition: String,
    #[serde(default)]
    pub considerations: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignPriorityRes {
    pub admission: AdmissionRes,
    pub evaluation: PriorityEvaluationRes,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OverridePriorityReq {
    pub actor_id: String,
    pub actor_role: String,
    pub target: String,
    pub reason: String,
}

// ============================================================================
// TRANSFERS
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RecommendTransferReq {
    pub actor_id: String,
    pub actor_role: String,
    pub admission_id: String,
    pub target_ward: String,
    #[serde(default)]
    pub emergency: bool,
    pub justification: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferRes {
    pub id: String,
    pub admission_id: String,
    pub recommended_by: String,
    pub target_ward: String,
    pub emergency: bool,
    pub emergency_justification: Option<String>,
    pub recommended_at: String,
    pub stage: String,
    pub pending_justification: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListTransfersRes {
    pub transfers: Vec<TransferRes>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JustificationReq {
    pub actor_id: String,
    pub actor_role: String,
    pub justification: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsentReq {
    pub actor_id: String,
    pub actor_role: String,
    /// `granted` or `declined`.
    pub outcome: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsentRes {
    pub id: String,
    pub recommendation_id: String,
    pub consented_by: String,
    pub outcome: String,
    pub consented_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReserveBedReq {
    pub actor_id: String,
    pub actor_role: String,
    pub bed_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReservationRes {
    pub id: String,
    pub recommendation_id: String,
    pub bed_id: String,
    pub status: String,
    pub reserved_at: String,
    pub confirmed_at: Option<String>,
    pub released_at: Option<String>,
}

/// Request body for the confirm / execute / abandon steps, which need only
/// the acting identity (abandon also takes an optional reason).
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferActionReq {
    pub actor_id: String,
    pub actor_role: String,
    pub reason: Option<String>,
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditEventRes {
    /// `status`, `priority`, `transfer` or `bed_availability`.
    pub kind: String,
    pub recorded_at: String,
    pub actor_id: String,
    pub role: String,
    /// Human-readable rendering of the row, e.g. `ACTIVE -> TRANSFERRED`.
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditTrailRes {
    pub events: Vec<AuditEventRes>,
}
