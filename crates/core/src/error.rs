use crate::priority::ConditionType;
use crate::status::AdmissionStatus;
use crate::transfer::TransferStage;

/// Errors produced by the IPD core services.
///
/// Every business-rule rejection carries enough structure for the caller to
/// react programmatically; [`AdmissionError::kind`] groups the variants into
/// the transport-facing taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid status transition: {} -> {to}", from_label(.from))]
    InvalidStatusTransition {
        from: Option<AdmissionStatus>,
        to: AdmissionStatus,
    },

    #[error("transfer recommendation is {stage} and cannot {action}")]
    InvalidTransferStage {
        stage: TransferStage,
        action: &'static str,
    },

    #[error("reservation {reservation_id} is not held")]
    ReservationNotHeld { reservation_id: uuid::Uuid },

    #[error("reservation {reservation_id} is not confirmed")]
    ReservationNotConfirmed { reservation_id: uuid::Uuid },

    #[error("reservation {reservation_id} was already consumed by a transfer execution")]
    InvalidReservationState { reservation_id: uuid::Uuid },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("bed {bed_id} already has an active allocation")]
    BedAlreadyOccupied { bed_id: uuid::Uuid },

    #[error("bed {bed_id} already has an active reservation")]
    BedAlreadyReserved { bed_id: uuid::Uuid },

    #[error("admission {admission_id} already holds an active bed allocation")]
    AdmissionAlreadyHasBed { admission_id: uuid::Uuid },

    #[error("bed {bed_id} has no active allocation to release")]
    NoActiveAllocation { bed_id: uuid::Uuid },

    #[error("role {role} is not permitted to {action}")]
    Forbidden {
        role: crate::actor::Role,
        action: &'static str,
    },

    #[error("no active priority rule configured for condition {0}")]
    NoRuleConfigured(ConditionType),

    #[error("failed to read state snapshot: {0}")]
    SnapshotRead(std::io::Error),
    #[error("failed to write state snapshot: {0}")]
    SnapshotWrite(std::io::Error),
    #[error("failed to serialize state snapshot: {0}")]
    SnapshotSerialization(serde_json::Error),
    #[error("failed to deserialize state snapshot: {0}")]
    SnapshotDeserialization(serde_json::Error),
}

fn from_label(from: &Option<AdmissionStatus>) -> String {
    match from {
        Some(status) => status.to_string(),
        None => "(none)".to_string(),
    }
}

/// Transport-facing grouping of [`AdmissionError`] variants.
///
/// Business-rule rejections map onto the first six kinds; `Internal` covers
/// storage faults and must never be conflated with a rule rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transition,
    NotFound,
    Conflict,
    Forbidden,
    RuleMissing,
    Internal,
}

impl AdmissionError {
    /// Returns the taxonomy kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdmissionError::InvalidInput(_) => ErrorKind::Validation,
            AdmissionError::InvalidStatusTransition { .. }
            | AdmissionError::InvalidTransferStage { .. }
            | AdmissionError::ReservationNotHeld { .. }
            | AdmissionError::ReservationNotConfirmed { .. }
            | AdmissionError::InvalidReservationState { .. } => ErrorKind::Transition,
            AdmissionError::NotFound { .. } => ErrorKind::NotFound,
            AdmissionError::BedAlreadyOccupied { .. }
            | AdmissionError::BedAlreadyReserved { .. }
            | AdmissionError::AdmissionAlreadyHasBed { .. }
            | AdmissionError::NoActiveAllocation { .. } => ErrorKind::Conflict,
            AdmissionError::Forbidden { .. } => ErrorKind::Forbidden,
            AdmissionError::NoRuleConfigured(_) => ErrorKind::RuleMissing,
            AdmissionError::SnapshotRead(_)
            | AdmissionError::SnapshotWrite(_)
            | AdmissionError::SnapshotSerialization(_)
            | AdmissionError::SnapshotDeserialization(_) => ErrorKind::Internal,
        }
    }
}

impl From<ipd_types::TextError> for AdmissionError {
    fn from(err: ipd_types::TextError) -> Self {
        AdmissionError::InvalidInput(err.to_string())
    }
}

pub type AdmissionResult<T> = std::result::Result<T, AdmissionError>;
