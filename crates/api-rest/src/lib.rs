//! # API REST
//!
//! REST API implementation for the IPD workflow service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, error mapping)
//!
//! Uses `api-shared` for the wire DTOs. Handlers parse the string-typed DTO
//! fields into core types, invoke the core services, persist the state
//! snapshot on success, and map [`AdmissionError`] kinds onto status codes.
//! Business-rule rejections return a structured `ErrorRes`; internal
//! failures return a generic message with the detail logged.

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use api_shared::dto::*;
use api_shared::HealthService;
use ipd_core::actor::Actor;
use ipd_core::admission::{AdmissionService, IpdAdmission};
use ipd_core::audit::{AuditEvent, AuditTrail, EntityKind, TransferStep};
use ipd_core::directory::{Bed, Directory, PatientRecord, WardType};
use ipd_core::priority::{
    AppliedRule, ConditionType, ConsiderationType, PriorityEngine, PriorityEvaluation,
    PriorityTier,
};
use ipd_core::reservation::TransferBedReservation;
use ipd_core::status::AdmissionStatus;
use ipd_core::transfer::{ConsentOutcome, TransferConsent, TransferRecommendation, TransferService};
use ipd_core::{AdmissionError, CoreConfig, ErrorKind, Store};
use ipd_types::NonEmptyText;

/// Application state shared across REST API handlers.
///
/// Holds the startup configuration and the state store; handlers construct
/// the core services they need per request, which are thin wrappers over the
/// shared store.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<CoreConfig>,
    pub store: Arc<Store>,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<Store>) -> Self {
        Self { cfg, store }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        register_patient,
        register_bed,
        list_beds,
        create_admission,
        list_admissions,
        get_admission,
        transition_status,
        shift_to_ward,
        evaluate_priority,
        assign_priority,
        override_priority,
        recommend_transfer,
        list_transfers,
        get_transfer,
        pending_justification,
        put_justification,
        consent_transfer,
        reserve_bed,
        confirm_reservation,
        execute_transfer,
        abandon_transfer,
        audit_trail,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        RegisterPatientReq,
        PatientRes,
        RegisterBedReq,
        BedRes,
        ListBedsRes,
        CreateAdmissionReq,
        AdmissionRes,
        ListAdmissionsRes,
        TransitionStatusReq,
        ShiftToWardReq,
        EvaluatePriorityReq,
        AppliedRuleRes,
        PriorityEvaluationRes,
        AssignPriorityReq,
        AssignPriorityRes,
        OverridePriorityReq,
        RecommendTransferReq,
        TransferRes,
        ListTransfersRes,
        JustificationReq,
        ConsentReq,
        ConsentRes,
        ReserveBedReq,
        ReservationRes,
        TransferActionReq,
        AuditEventRes,
        AuditTrailRes,
    ))
)]
struct ApiDoc;

/// Builds the full REST router over the given state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients", post(register_patient))
        .route("/beds", post(register_bed))
        .route("/beds", get(list_beds))
        .route("/admissions", post(create_admission))
        .route("/admissions", get(list_admissions))
        .route("/admissions/:id", get(get_admission))
        .route("/admissions/:id/status", post(transition_status))
        .route("/admissions/:id/shift", post(shift_to_ward))
        .route("/priority/evaluate", post(evaluate_priority))
        .route("/admissions/:id/priority", post(assign_priority))
        .route("/admissions/:id/priority/override", post(override_priority))
        .route("/transfers", post(recommend_transfer))
        .route("/transfers", get(list_transfers))
        .route("/transfers/pending-justification", get(pending_justification))
        .route("/transfers/:id", get(get_transfer))
        .route("/transfers/:id/justification", put(put_justification))
        .route("/transfers/:id/consent", post(consent_transfer))
        .route("/transfers/:id/reserve", post(reserve_bed))
        .route("/transfers/:id/reserve/confirm", post(confirm_reservation))
        .route("/transfers/:id/execute", post(execute_transfer))
        .route("/transfers/:id/abandon", post(abandon_transfer))
        .route("/audit/:entity/:id", get(audit_trail))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// ERROR MAPPING AND PARSING HELPERS
// ============================================================================

type ErrorReply = (StatusCode, Json<ErrorRes>);

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation_error",
        ErrorKind::Transition => "invalid_transition",
        ErrorKind::NotFound => "resource_not_found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Forbidden => "authorization_error",
        ErrorKind::RuleMissing => "no_rule_configured",
        ErrorKind::Internal => "internal_error",
    }
}

/// Maps a core error onto an HTTP status and structured body.
///
/// Internal failures are logged with full detail and surface only a generic
/// message, never the underlying cause.
fn business_error(err: AdmissionError) -> ErrorReply {
    let kind = err.kind();
    let status = match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Transition | ErrorKind::RuleMissing => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if kind == ErrorKind::Internal {
        tracing::error!("internal failure: {err:?}");
        "Internal error".to_string()
    } else {
        err.to_string()
    };

    (
        status,
        Json(ErrorRes {
            kind: kind_label(kind).to_string(),
            message,
        }),
    )
}

fn parse_uuid(value: &str, field: &'static str) -> Result<Uuid, ErrorReply> {
    Uuid::parse_str(value.trim()).map_err(|_| {
        business_error(AdmissionError::InvalidInput(format!(
            "{field} is not a valid UUID: '{value}'"
        )))
    })
}

fn parse_actor(actor_id: &str, actor_role: &str) -> Result<Actor, ErrorReply> {
    let id = parse_uuid(actor_id, "actor_id")?;
    let role = actor_role.parse().map_err(business_error)?;
    Ok(Actor::new(id, role))
}

fn parse_considerations(
    values: &[String],
) -> Result<BTreeSet<ConsiderationType>, ErrorReply> {
    values
        .iter()
        .map(|value| value.parse::<ConsiderationType>().map_err(business_error))
        .collect()
}

fn parse_non_empty(value: &str, field: &'static str) -> Result<NonEmptyText, ErrorReply> {
    NonEmptyText::new(value).map_err(|_| {
        business_error(AdmissionError::InvalidInput(format!(
            "{field} cannot be empty"
        )))
    })
}

/// Persists the state snapshot after a successful mutation.
fn persist_state(state: &AppState) -> Result<(), ErrorReply> {
    state
        .store
        .persist(state.cfg.data_dir())
        .map_err(business_error)
}

// ============================================================================
// RESPONSE RENDERING
// ============================================================================

fn admission_res(admission: &IpdAdmission) -> AdmissionRes {
    AdmissionRes {
        id: admission.id.to_string(),
        admission_no: admission.admission_no.to_string(),
        patient_id: admission.patient_id.to_string(),
        status: admission.status.to_string(),
        priority: admission.priority.map(|tier| tier.to_string()),
        admitted_at: admission.admitted_at.to_rfc3339(),
        ended_at: admission.ended_at.map(|at| at.to_rfc3339()),
    }
}

fn patient_res(patient: &PatientRecord) -> PatientRes {
    PatientRes {
        id: patient.id.to_string(),
        uhid: patient.uhid.to_string(),
        name: patient.name.to_string(),
    }
}

fn bed_res(bed: &Bed) -> BedRes {
    BedRes {
        id: bed.id.to_string(),
        code: bed.code.to_string(),
        ward_type: bed.ward_type.to_string(),
    }
}

fn transfer_res(row: &TransferRecommendation) -> TransferRes {
    TransferRes {
        id: row.id.to_string(),
        admission_id: row.admission_id.to_string(),
        recommended_by: row.recommended_by.to_string(),
        target_ward: row.target_ward.to_string(),
        emergency: row.emergency,
        emergency_justification: row.emergency_justification.clone(),
        recommended_at: row.recommended_at.to_rfc3339(),
        stage: row.stage.to_string(),
        pending_justification: row.pending_justification(),
    }
}

fn consent_res(row: &TransferConsent) -> ConsentRes {
    ConsentRes {
        id: row.id.to_string(),
        recommendation_id: row.recommendation_id.to_string(),
        consented_by: row.consented_by.to_string(),
        outcome: row.outcome.to_string(),
        consented_at: row.consented_at.to_rfc3339(),
    }
}

fn reservation_res(row: &TransferBedReservation) -> ReservationRes {
    ReservationRes {
        id: row.id.to_string(),
        recommendation_id: row.recommendation_id.to_string(),
        bed_id: row.bed_id.to_string(),
        status: row.status.to_string(),
        reserved_at: row.reserved_at.to_rfc3339(),
        confirmed_at: row.confirmed_at.map(|at| at.to_rfc3339()),
        released_at: row.released_at.map(|at| at.to_rfc3339()),
    }
}

fn evaluation_res(evaluation: &PriorityEvaluation) -> PriorityEvaluationRes {
    PriorityEvaluationRes {
        tier: evaluation.tier.to_string(),
        label: evaluation.tier.label().to_string(),
        applied: evaluation
            .applied
            .iter()
            .map(|rule| match rule {
                AppliedRule::BaseRule { condition, tier } => AppliedRuleRes {
                    source: "base_rule".into(),
                    reference: condition.to_string(),
                    tier: Some(tier.to_string()),
                    boost: None,
                },
                AppliedRule::Boost {
                    consideration,
                    boost,
                } => AppliedRuleRes {
                    source: "boost".into(),
                    reference: consideration.to_string(),
                    tier: None,
                    boost: Some(*boost),
                },
            })
            .collect(),
    }
}

fn transfer_step_label(step: TransferStep) -> &'static str {
    match step {
        TransferStep::Recommended => "recommended",
        TransferStep::JustificationProvided => "justification provided",
        TransferStep::Consented => "consented",
        TransferStep::BedReserved => "bed reserved",
        TransferStep::ReservationConfirmed => "reservation confirmed",
        TransferStep::Executed => "executed",
        TransferStep::Abandoned => "abandoned",
    }
}

fn audit_event_res(event: &AuditEvent) -> AuditEventRes {
    match event {
        AuditEvent::Status(row) => AuditEventRes {
            kind: "status".into(),
            recorded_at: row.recorded_at.to_rfc3339(),
            actor_id: row.actor_id.to_string(),
            role: row.role.to_string(),
            description: match row.from {
                Some(from) => format!("status {} -> {}", from, row.to),
                None => format!("created as {}", row.to),
            },
        },
        AuditEvent::Priority(row) => AuditEventRes {
            kind: "priority".into(),
            recorded_at: row.recorded_at.to_rfc3339(),
            actor_id: row.actor_id.to_string(),
            role: row.role.to_string(),
            description: match row.previous {
                Some(previous) => {
                    format!("priority {} -> {} ({})", previous, row.new_tier, row.reason)
                }
                None => format!("priority set to {} ({})", row.new_tier, row.reason),
            },
        },
        AuditEvent::Transfer(row) => AuditEventRes {
            kind: "transfer".into(),
            recorded_at: row.recorded_at.to_rfc3339(),
            actor_id: row.actor_id.to_string(),
            role: row.role.to_string(),
            description: match &row.detail {
                Some(detail) => format!("{} ({detail})", transfer_step_label(row.step)),
                None => transfer_step_label(row.step).to_string(),
            },
        },
        AuditEvent::BedAvailability(row) => AuditEventRes {
            kind: "bed_availability".into(),
            recorded_at: row.recorded_at.to_rfc3339(),
            actor_id: row.actor_id.to_string(),
            role: row.role.to_string(),
            description: match row.change {
                ipd_core::audit::BedAvailabilityChange::Occupied => {
                    format!("bed {} occupied by admission {}", row.bed_id, row.admission_id)
                }
                ipd_core::audit::BedAvailabilityChange::Freed => {
                    format!("bed {} freed by admission {}", row.bed_id, row.admission_id)
                }
            },
        },
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = RegisterPatientReq,
    responses(
        (status = 200, description = "Patient registered", body = PatientRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 403, description = "Forbidden", body = ErrorRes)
    )
)]
/// Registers a patient reference from the master-data collaborator.
#[axum::debug_handler]
async fn register_patient(
    State(state): State<AppState>,
    Json(req): Json<RegisterPatientReq>,
) -> Result<Json<PatientRes>, ErrorReply> {
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let uhid = parse_non_empty(&req.uhid, "uhid")?;
    let name = parse_non_empty(&req.name, "name")?;

    let patient = Directory::new(state.store.clone())
        .register_patient(&actor, uhid, name)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(patient_res(&patient)))
}

#[utoipa::path(
    post,
    path = "/beds",
    request_body = RegisterBedReq,
    responses(
        (status = 200, description = "Bed registered", body = BedRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 403, description = "Forbidden", body = ErrorRes)
    )
)]
/// Registers a bed from the master-data collaborator.
#[axum::debug_handler]
async fn register_bed(
    State(state): State<AppState>,
    Json(req): Json<RegisterBedReq>,
) -> Result<Json<BedRes>, ErrorReply> {
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let code = parse_non_empty(&req.code, "code")?;
    let ward_type: WardType = req.ward_type.parse().map_err(business_error)?;

    let bed = Directory::new(state.store.clone())
        .register_bed(&actor, code, ward_type)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(bed_res(&bed)))
}

#[utoipa::path(
    get,
    path = "/beds",
    responses(
        (status = 200, description = "Registered beds", body = ListBedsRes)
    )
)]
/// Lists registered beds.
#[axum::debug_handler]
async fn list_beds(State(state): State<AppState>) -> Json<ListBedsRes> {
    let beds = Directory::new(state.store.clone()).list_beds();
    Json(ListBedsRes {
        beds: beds.iter().map(bed_res).collect(),
    })
}

#[utoipa::path(
    post,
    path = "/admissions",
    request_body = CreateAdmissionReq,
    responses(
        (status = 200, description = "Admission created", body = AdmissionRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
/// Creates an admission in the `ADMITTED` status.
#[axum::debug_handler]
async fn create_admission(
    State(state): State<AppState>,
    Json(req): Json<CreateAdmissionReq>,
) -> Result<Json<AdmissionRes>, ErrorReply> {
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let patient_id = parse_uuid(&req.patient_id, "patient_id")?;

    let admission = AdmissionService::new(state.store.clone())
        .create(&actor, patient_id)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(admission_res(&admission)))
}

#[utoipa::path(
    get,
    path = "/admissions",
    responses(
        (status = 200, description = "All admissions, newest first", body = ListAdmissionsRes)
    )
)]
/// Lists admissions.
#[axum::debug_handler]
async fn list_admissions(State(state): State<AppState>) -> Json<ListAdmissionsRes> {
    let admissions = AdmissionService::new(state.store.clone()).list();
    Json(ListAdmissionsRes {
        admissions: admissions.iter().map(admission_res).collect(),
    })
}

#[utoipa::path(
    get,
    path = "/admissions/{id}",
    responses(
        (status = 200, description = "Admission", body = AdmissionRes),
        (status = 404, description = "Unknown admission", body = ErrorRes)
    )
)]
/// Fetches one admission.
#[axum::debug_handler]
async fn get_admission(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<AdmissionRes>, ErrorReply> {
    let id = parse_uuid(&id, "admission id")?;
    let admission = AdmissionService::new(state.store.clone())
        .get(id)
        .map_err(business_error)?;
    Ok(Json(admission_res(&admission)))
}

#[utoipa::path(
    post,
    path = "/admissions/{id}/status",
    request_body = TransitionStatusReq,
    responses(
        (status = 200, description = "Status changed", body = AdmissionRes),
        (status = 403, description = "Forbidden", body = ErrorRes),
        (status = 422, description = "Invalid transition", body = ErrorRes)
    )
)]
/// Drives a direct admission status transition through the transition
/// authority. Rejected transitions leave no state change and no audit row.
#[axum::debug_handler]
async fn transition_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<TransitionStatusReq>,
) -> Result<Json<AdmissionRes>, ErrorReply> {
    let id = parse_uuid(&id, "admission id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let target: AdmissionStatus = req.target.parse().map_err(business_error)?;
    let reason = match req.reason.as_deref() {
        Some(text) => Some(parse_non_empty(text, "reason")?),
        None => None,
    };

    let admission = AdmissionService::new(state.store.clone())
        .transition_status(&actor, id, target, reason)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(admission_res(&admission)))
}

#[utoipa::path(
    post,
    path = "/admissions/{id}/shift",
    request_body = ShiftToWardReq,
    responses(
        (status = 200, description = "Patient shifted to ward", body = AdmissionRes),
        (status = 409, description = "Bed conflict", body = ErrorRes),
        (status = 422, description = "Invalid transition", body = ErrorRes)
    )
)]
/// Shift-to-ward: allocates the initial bed and activates the admission.
#[axum::debug_handler]
async fn shift_to_ward(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ShiftToWardReq>,
) -> Result<Json<AdmissionRes>, ErrorReply> {
    let id = parse_uuid(&id, "admission id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let bed_id = parse_uuid(&req.bed_id, "bed_id")?;

    let admission = AdmissionService::new(state.store.clone())
        .shift_to_ward(&actor, id, bed_id)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(admission_res(&admission)))
}

#[utoipa::path(
    post,
    path = "/priority/evaluate",
    request_body = EvaluatePriorityReq,
    responses(
        (status = 200, description = "Resolved priority", body = PriorityEvaluationRes),
        (status = 422, description = "No rule configured", body = ErrorRes)
    )
)]
/// Evaluates a priority without touching any admission.
#[axum::debug_handler]
async fn evaluate_priority(
    State(state): State<AppState>,
    Json(req): Json<EvaluatePriorityReq>,
) -> Result<Json<PriorityEvaluationRes>, ErrorReply> {
    let condition: ConditionType = req.condition.parse().map_err(business_error)?;
    let considerations = parse_considerations(&req.considerations)?;

    let evaluation = PriorityEngine::new(state.store.clone())
        .evaluate(condition, &considerations)
        .map_err(business_error)?;
    Ok(Json(evaluation_res(&evaluation)))
}

#[utoipa::path(
    post,
    path = "/admissions/{id}/priority",
    request_body = AssignPriorityReq,
    responses(
        (status = 200, description = "Priority assigned", body = AssignPriorityRes),
        (status = 422, description = "No rule configured", body = ErrorRes)
    )
)]
/// Evaluates and stores the resolved priority on the admission.
#[axum::debug_handler]
async fn assign_priority(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<AssignPriorityReq>,
) -> Result<Json<AssignPriorityRes>, ErrorReply> {
    let id = parse_uuid(&id, "admission id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let condition: ConditionType = req.condition.parse().map_err(business_error)?;
    let considerations = parse_considerations(&req.considerations)?;

    let (admission, evaluation) = PriorityEngine::new(state.store.clone())
        .assign(&actor, id, condition, &considerations)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(AssignPriorityRes {
        admission: admission_res(&admission),
        evaluation: evaluation_res(&evaluation),
    }))
}

#[utoipa::path(
    post,
    path = "/admissions/{id}/priority/override",
    request_body = OverridePriorityReq,
    responses(
        (status = 200, description = "Priority overridden", body = AdmissionRes),
        (status = 400, description = "Missing reason", body = ErrorRes),
        (status = 403, description = "Forbidden", body = ErrorRes)
    )
)]
/// Overrides the resolved priority; role-gated, mandatory reason, audited.
#[axum::debug_handler]
async fn override_priority(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<OverridePriorityReq>,
) -> Result<Json<AdmissionRes>, ErrorReply> {
    let id = parse_uuid(&id, "admission id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let target: PriorityTier = req.target.parse().map_err(business_error)?;

    let admission = PriorityEngine::new(state.store.clone())
        .override_priority(&actor, id, target, &req.reason)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(admission_res(&admission)))
}

#[utoipa::path(
    post,
    path = "/transfers",
    request_body = RecommendTransferReq,
    responses(
        (status = 200, description = "Transfer recommended", body = TransferRes),
        (status = 403, description = "Forbidden", body = ErrorRes),
        (status = 404, description = "Unknown admission", body = ErrorRes)
    )
)]
/// Step 1 of the transfer protocol: the recommendation.
#[axum::debug_handler]
async fn recommend_transfer(
    State(state): State<AppState>,
    Json(req): Json<RecommendTransferReq>,
) -> Result<Json<TransferRes>, ErrorReply> {
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let admission_id = parse_uuid(&req.admission_id, "admission_id")?;
    let target_ward: WardType = req.target_ward.parse().map_err(business_error)?;

    let recommendation = TransferService::new(state.store.clone())
        .recommend(
            &actor,
            admission_id,
            target_ward,
            req.emergency,
            req.justification.as_deref(),
        )
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(transfer_res(&recommendation)))
}

#[utoipa::path(
    get,
    path = "/transfers",
    responses(
        (status = 200, description = "All transfer recommendations, newest first", body = ListTransfersRes)
    )
)]
/// Lists transfer recommendations.
#[axum::debug_handler]
async fn list_transfers(State(state): State<AppState>) -> Json<ListTransfersRes> {
    let transfers = TransferService::new(state.store.clone()).list();
    Json(ListTransfersRes {
        transfers: transfers.iter().map(transfer_res).collect(),
    })
}

#[utoipa::path(
    get,
    path = "/transfers/{id}",
    responses(
        (status = 200, description = "Transfer recommendation", body = TransferRes),
        (status = 404, description = "Unknown recommendation", body = ErrorRes)
    )
)]
/// Fetches one transfer recommendation.
#[axum::debug_handler]
async fn get_transfer(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<TransferRes>, ErrorReply> {
    let id = parse_uuid(&id, "recommendation id")?;
    let recommendation = TransferService::new(state.store.clone())
        .get(id)
        .map_err(business_error)?;
    Ok(Json(transfer_res(&recommendation)))
}

#[utoipa::path(
    get,
    path = "/transfers/pending-justification",
    responses(
        (status = 200, description = "Emergency transfers awaiting justification", body = ListTransfersRes)
    )
)]
/// Misuse-prevention query: emergency recommendations without justification.
#[axum::debug_handler]
async fn pending_justification(State(state): State<AppState>) -> Json<ListTransfersRes> {
    let transfers = TransferService::new(state.store.clone()).pending_justification();
    Json(ListTransfersRes {
        transfers: transfers.iter().map(transfer_res).collect(),
    })
}

#[utoipa::path(
    put,
    path = "/transfers/{id}/justification",
    request_body = JustificationReq,
    responses(
        (status = 200, description = "Justification recorded", body = TransferRes),
        (status = 400, description = "Blank justification", body = ErrorRes)
    )
)]
/// Supplies the emergency justification after the fact.
#[axum::debug_handler]
async fn put_justification(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<JustificationReq>,
) -> Result<Json<TransferRes>, ErrorReply> {
    let id = parse_uuid(&id, "recommendation id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;

    let recommendation = TransferService::new(state.store.clone())
        .provide_justification(&actor, id, &req.justification)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(transfer_res(&recommendation)))
}

#[utoipa::path(
    post,
    path = "/transfers/{id}/consent",
    request_body = ConsentReq,
    responses(
        (status = 200, description = "Consent recorded", body = ConsentRes),
        (status = 403, description = "Forbidden", body = ErrorRes),
        (status = 422, description = "Workflow stage violation", body = ErrorRes)
    )
)]
/// Step 2 of the transfer protocol: the consent decision.
#[axum::debug_handler]
async fn consent_transfer(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ConsentReq>,
) -> Result<Json<ConsentRes>, ErrorReply> {
    let id = parse_uuid(&id, "recommendation id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let outcome = match req.outcome.trim() {
        "granted" => ConsentOutcome::Granted,
        "declined" => ConsentOutcome::Declined,
        other => {
            return Err(business_error(AdmissionError::InvalidInput(format!(
                "unknown consent outcome: '{other}'"
            ))))
        }
    };

    let consent = TransferService::new(state.store.clone())
        .consent(&actor, id, outcome)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(consent_res(&consent)))
}

#[utoipa::path(
    post,
    path = "/transfers/{id}/reserve",
    request_body = ReserveBedReq,
    responses(
        (status = 200, description = "Bed held for the transfer", body = ReservationRes),
        (status = 409, description = "Bed already reserved", body = ErrorRes),
        (status = 422, description = "Consent not recorded", body = ErrorRes)
    )
)]
/// Step 3 of the transfer protocol: the bed hold. On a conflict the
/// recommendation stays `CONSENTED`; pick another bed and retry.
#[axum::debug_handler]
async fn reserve_bed(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ReserveBedReq>,
) -> Result<Json<ReservationRes>, ErrorReply> {
    let id = parse_uuid(&id, "recommendation id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;
    let bed_id = parse_uuid(&req.bed_id, "bed_id")?;

    let reservation = TransferService::new(state.store.clone())
        .reserve_bed(&actor, id, bed_id)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(reservation_res(&reservation)))
}

#[utoipa::path(
    post,
    path = "/transfers/{id}/reserve/confirm",
    request_body = TransferActionReq,
    responses(
        (status = 200, description = "Reservation confirmed", body = ReservationRes),
        (status = 422, description = "Reservation not held", body = ErrorRes)
    )
)]
/// Confirms the held bed; execution requires a confirmed reservation.
#[axum::debug_handler]
async fn confirm_reservation(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<TransferActionReq>,
) -> Result<Json<ReservationRes>, ErrorReply> {
    let id = parse_uuid(&id, "recommendation id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;

    let reservation = TransferService::new(state.store.clone())
        .confirm_reservation(&actor, id)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(reservation_res(&reservation)))
}

#[utoipa::path(
    post,
    path = "/transfers/{id}/execute",
    request_body = TransferActionReq,
    responses(
        (status = 200, description = "Transfer executed", body = AdmissionRes),
        (status = 403, description = "Forbidden", body = ErrorRes),
        (status = 422, description = "Reservation not confirmed", body = ErrorRes)
    )
)]
/// Step 4 of the transfer protocol: the physical move, all-or-nothing.
#[axum::debug_handler]
async fn execute_transfer(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<TransferActionReq>,
) -> Result<Json<AdmissionRes>, ErrorReply> {
    let id = parse_uuid(&id, "recommendation id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;

    let admission = TransferService::new(state.store.clone())
        .execute(&actor, id)
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(admission_res(&admission)))
}

#[utoipa::path(
    post,
    path = "/transfers/{id}/abandon",
    request_body = TransferActionReq,
    responses(
        (status = 200, description = "Transfer abandoned", body = TransferRes),
        (status = 422, description = "Workflow already finished", body = ErrorRes)
    )
)]
/// Abandons the workflow, releasing any live bed hold.
#[axum::debug_handler]
async fn abandon_transfer(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<TransferActionReq>,
) -> Result<Json<TransferRes>, ErrorReply> {
    let id = parse_uuid(&id, "recommendation id")?;
    let actor = parse_actor(&req.actor_id, &req.actor_role)?;

    let recommendation = TransferService::new(state.store.clone())
        .abandon(&actor, id, req.reason.as_deref())
        .map_err(business_error)?;
    persist_state(&state)?;
    Ok(Json(transfer_res(&recommendation)))
}

#[derive(serde::Deserialize)]
struct AuditQuery {
    from: Option<String>,
    to: Option<String>,
}

#[utoipa::path(
    get,
    path = "/audit/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "admission | bed | transfer"),
        ("id" = String, Path, description = "Entity id"),
        ("from" = Option<String>, Query, description = "RFC 3339 range start (requires 'to')"),
        ("to" = Option<String>, Query, description = "RFC 3339 range end (requires 'from')")
    ),
    responses(
        (status = 200, description = "Audit trail, newest first", body = AuditTrailRes),
        (status = 404, description = "Unknown entity", body = ErrorRes)
    )
)]
/// Lists the audit trail for one entity, newest first, optionally bounded to
/// a time range.
#[axum::debug_handler]
async fn audit_trail(
    State(state): State<AppState>,
    AxumPath((entity, id)): AxumPath<(String, String)>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditTrailRes>, ErrorReply> {
    let entity: EntityKind = entity.parse().map_err(business_error)?;
    let id = parse_uuid(&id, "entity id")?;

    let range = match (query.from.as_deref(), query.to.as_deref()) {
        (None, None) => None,
        (Some(from), Some(to)) => Some((parse_timestamp(from)?, parse_timestamp(to)?)),
        _ => {
            return Err(business_error(AdmissionError::InvalidInput(
                "'from' and 'to' must be supplied together".into(),
            )))
        }
    };

    let events = AuditTrail::new(state.store.clone())
        .list(entity, id, range)
        .map_err(business_error)?;
    Ok(Json(AuditTrailRes {
        events: events.iter().map(audit_event_res).collect(),
    }))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ErrorReply> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| {
            business_error(AdmissionError::InvalidInput(format!(
                "'{value}' is not an RFC 3339 timestamp"
            )))
        })
}
