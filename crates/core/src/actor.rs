//! Actor identity and role gating.
//!
//! Authentication is owned by an upstream collaborator; the core receives a
//! resolved actor identity plus role and performs allow-list checks itself.
//! Each workflow operation names its allow-list as a constant so the permitted
//! role sets live in one place rather than scattered comparisons.

use crate::{AdmissionError, AdmissionResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Professional role of the actor driving an operation, as resolved by the
/// upstream identity collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Nurse,
    IpdManager,
    MedicalSuperintendent,
    EmergencyHead,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::IpdManager => "ipd_manager",
            Role::MedicalSuperintendent => "medical_superintendent",
            Role::EmergencyHead => "emergency_head",
            Role::Admin => "admin",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for Role {
    type Err = AdmissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "doctor" => Ok(Role::Doctor),
            "nurse" => Ok(Role::Nurse),
            "ipd_manager" => Ok(Role::IpdManager),
            "medical_superintendent" => Ok(Role::MedicalSuperintendent),
            "emergency_head" => Ok(Role::EmergencyHead),
            "admin" => Ok(Role::Admin),
            other => Err(AdmissionError::InvalidInput(format!(
                "unknown role: '{other}'"
            ))),
        }
    }
}

/// A resolved actor: who is driving the operation and in what capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Roles permitted to create a new admission.
pub const CAN_ADMIT: &[Role] = &[Role::Doctor, Role::IpdManager, Role::Admin];

/// Roles permitted to drive a direct admission status transition.
pub const CAN_TRANSITION_STATUS: &[Role] = &[Role::Doctor, Role::IpdManager, Role::Admin];

/// Roles permitted to perform the initial shift-to-ward bed allocation.
pub const CAN_SHIFT_TO_WARD: &[Role] = &[Role::Nurse, Role::IpdManager, Role::Admin];

/// Roles permitted to evaluate and assign an admission priority.
pub const CAN_ASSESS_PRIORITY: &[Role] = &[Role::Doctor, Role::IpdManager, Role::Admin];

/// Roles permitted to override a resolved admission priority.
pub const CAN_OVERRIDE_PRIORITY: &[Role] = &[
    Role::MedicalSuperintendent,
    Role::EmergencyHead,
    Role::IpdManager,
];

/// Roles permitted to recommend a ward transfer.
pub const CAN_RECOMMEND: &[Role] = &[Role::Doctor, Role::Admin];

/// Roles permitted to consent to, reserve for, or abandon a transfer.
pub const CAN_APPROVE: &[Role] = &[Role::IpdManager, Role::Admin];

/// Roles permitted to execute the physical bed move of a transfer.
pub const CAN_EXECUTE: &[Role] = &[Role::Nurse, Role::Admin];

/// Roles permitted to register master data (patients, beds).
pub const CAN_MANAGE_DIRECTORY: &[Role] = &[Role::Admin];

/// Central role check used by every gated operation.
///
/// # Errors
///
/// Returns [`AdmissionError::Forbidden`] naming the role and the attempted
/// action when the actor's role is not in `allowed`.
pub fn require_role(actor: &Actor, allowed: &[Role], action: &'static str) -> AdmissionResult<()> {
    if allowed.contains(&actor.role) {
        Ok(())
    } else {
        Err(AdmissionError::Forbidden {
            role: actor.role,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [
            Role::Doctor,
            Role::Nurse,
            Role::IpdManager,
            Role::MedicalSuperintendent,
            Role::EmergencyHead,
            Role::Admin,
        ] {
            let parsed: Role = role.to_string().parse().expect("label should parse back");
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn test_require_role_rejects_outside_allow_list() {
        let nurse = Actor::new(Uuid::new_v4(), Role::Nurse);
        let err = require_role(&nurse, CAN_OVERRIDE_PRIORITY, "override priority")
            .expect_err("nurse may not override priority");
        assert!(matches!(
            err,
            AdmissionError::Forbidden {
                role: Role::Nurse,
                ..
            }
        ));
    }

    #[test]
    fn test_require_role_accepts_allow_list_member() {
        let head = Actor::new(Uuid::new_v4(), Role::EmergencyHead);
        require_role(&head, CAN_OVERRIDE_PRIORITY, "override priority")
            .expect("emergency head may override priority");
    }
}
