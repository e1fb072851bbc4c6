//! Admission status lifecycle and the transition authority.
//!
//! The transition table is data, not scattered branches: a single adjacency
//! map consulted by every caller that wants to change an admission's status.
//! No service re-implements the rules inline.

use crate::{AdmissionError, AdmissionResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

/// Lifecycle status of an in-patient admission.
///
/// `Discharged`, `Cancelled`, `Referred`, `Lama` and `Expired` are terminal:
/// no outgoing transitions exist. `Admitted` is the only legal initial status.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionStatus {
    Admitted,
    Active,
    Transferred,
    DischargeInitiated,
    Discharged,
    Cancelled,
    Referred,
    /// Left against medical advice.
    Lama,
    Expired,
}

impl std::fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AdmissionStatus::Admitted => "ADMITTED",
            AdmissionStatus::Active => "ACTIVE",
            AdmissionStatus::Transferred => "TRANSFERRED",
            AdmissionStatus::DischargeInitiated => "DISCHARGE_INITIATED",
            AdmissionStatus::Discharged => "DISCHARGED",
            AdmissionStatus::Cancelled => "CANCELLED",
            AdmissionStatus::Referred => "REFERRED",
            AdmissionStatus::Lama => "LAMA",
            AdmissionStatus::Expired => "EXPIRED",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for AdmissionStatus {
    type Err = AdmissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "ADMITTED" => Ok(AdmissionStatus::Admitted),
            "ACTIVE" => Ok(AdmissionStatus::Active),
            "TRANSFERRED" => Ok(AdmissionStatus::Transferred),
            "DISCHARGE_INITIATED" => Ok(AdmissionStatus::DischargeInitiated),
            "DISCHARGED" => Ok(AdmissionStatus::Discharged),
            "CANCELLED" => Ok(AdmissionStatus::Cancelled),
            "REFERRED" => Ok(AdmissionStatus::Referred),
            "LAMA" => Ok(AdmissionStatus::Lama),
            "EXPIRED" => Ok(AdmissionStatus::Expired),
            other => Err(AdmissionError::InvalidInput(format!(
                "unknown admission status: '{other}'"
            ))),
        }
    }
}

/// The fixed admission status transition table.
///
/// `is_allowed(None, to)` answers whether an admission may be *created* in
/// `to`; only `ADMITTED` qualifies. A status with an empty adjacency row is
/// terminal. The table includes the `TRANSFERRED -> TRANSFERRED` self-edge so
/// that a second transfer execution is a real, audited transition.
#[derive(Debug)]
pub struct TransitionAuthority {
    table: HashMap<AdmissionStatus, BTreeSet<AdmissionStatus>>,
}

impl TransitionAuthority {
    /// Builds the fixed transition table. Not configurable at runtime.
    fn new() -> Self {
        use AdmissionStatus::*;

        let mut table: HashMap<AdmissionStatus, BTreeSet<AdmissionStatus>> = HashMap::new();

        table.insert(Admitted, BTreeSet::from([Active, Cancelled]));
        table.insert(
            Active,
            BTreeSet::from([Transferred, DischargeInitiated, Referred, Lama, Expired]),
        );
        table.insert(
            Transferred,
            BTreeSet::from([
                Active,
                Transferred,
                DischargeInitiated,
                Referred,
                Lama,
                Expired,
            ]),
        );
        table.insert(DischargeInitiated, BTreeSet::from([Discharged]));
        table.insert(Discharged, BTreeSet::new());
        table.insert(Cancelled, BTreeSet::new());
        table.insert(Referred, BTreeSet::new());
        table.insert(Lama, BTreeSet::new());
        table.insert(Expired, BTreeSet::new());

        Self { table }
    }

    /// Whether the transition `from -> to` is in the table.
    ///
    /// `from = None` models admission creation; only `ADMITTED` is reachable.
    pub fn is_allowed(&self, from: Option<AdmissionStatus>, to: AdmissionStatus) -> bool {
        match from {
            None => to == AdmissionStatus::Admitted,
            Some(from) => self
                .table
                .get(&from)
                .is_some_and(|targets| targets.contains(&to)),
        }
    }

    /// The set of statuses reachable from `from`.
    pub fn allowed_targets(&self, from: Option<AdmissionStatus>) -> BTreeSet<AdmissionStatus> {
        match from {
            None => BTreeSet::from([AdmissionStatus::Admitted]),
            Some(from) => self.table.get(&from).cloned().unwrap_or_default(),
        }
    }

    /// Whether `status` has no outgoing transitions.
    pub fn is_terminal(&self, status: AdmissionStatus) -> bool {
        self.table
            .get(&status)
            .map_or(true, |targets| targets.is_empty())
    }

    /// Checks a transition, returning [`AdmissionError::InvalidStatusTransition`]
    /// when it is absent from the table.
    pub fn check(
        &self,
        from: Option<AdmissionStatus>,
        to: AdmissionStatus,
    ) -> AdmissionResult<()> {
        if self.is_allowed(from, to) {
            Ok(())
        } else {
            Err(AdmissionError::InvalidStatusTransition { from, to })
        }
    }
}

/// Returns the shared transition authority.
///
/// Every status mutation in the crate goes through this single instance.
pub fn authority() -> &'static TransitionAuthority {
    static AUTHORITY: OnceLock<TransitionAuthority> = OnceLock::new();
    AUTHORITY.get_or_init(TransitionAuthority::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use AdmissionStatus::*;

    #[test]
    fn test_creation_only_reaches_admitted() {
        let authority = authority();
        assert!(authority.is_allowed(None, Admitted));
        for target in [Active, Transferred, Discharged, Cancelled, Referred, Lama, Expired] {
            assert!(
                !authority.is_allowed(None, target),
                "creation must not reach {target}"
            );
        }
    }

    #[test]
    fn test_admitted_row() {
        let targets = authority().allowed_targets(Some(Admitted));
        assert_eq!(targets, BTreeSet::from([Active, Cancelled]));
    }

    #[test]
    fn test_active_row() {
        let targets = authority().allowed_targets(Some(Active));
        assert_eq!(
            targets,
            BTreeSet::from([Transferred, DischargeInitiated, Referred, Lama, Expired])
        );
    }

    #[test]
    fn test_transferred_is_not_terminal_and_allows_repeat_transfer() {
        let authority = authority();
        assert!(!authority.is_terminal(Transferred));
        assert!(authority.is_allowed(Some(Transferred), Active));
        assert!(authority.is_allowed(Some(Transferred), Transferred));
        assert!(authority.is_allowed(Some(Transferred), DischargeInitiated));
    }

    #[test]
    fn test_discharge_must_pass_through_initiation() {
        let authority = authority();
        assert!(!authority.is_allowed(Some(Active), Discharged));
        assert!(!authority.is_allowed(Some(Admitted), Discharged));
        assert!(authority.is_allowed(Some(DischargeInitiated), Discharged));
        assert_eq!(
            authority.allowed_targets(Some(DischargeInitiated)),
            BTreeSet::from([Discharged])
        );
    }

    #[test]
    fn test_terminal_statuses_have_no_targets() {
        let authority = authority();
        for status in [Discharged, Cancelled, Referred, Lama, Expired] {
            assert!(authority.is_terminal(status), "{status} should be terminal");
            assert!(authority.allowed_targets(Some(status)).is_empty());
        }
    }

    #[test]
    fn test_check_reports_offending_edge() {
        let err = authority()
            .check(Some(Admitted), Discharged)
            .expect_err("ADMITTED -> DISCHARGED is not a legal edge");
        assert!(matches!(
            err,
            AdmissionError::InvalidStatusTransition {
                from: Some(Admitted),
                to: Discharged
            }
        ));
    }

    #[test]
    fn test_status_labels_round_trip() {
        for status in [
            Admitted,
            Active,
            Transferred,
            DischargeInitiated,
            Discharged,
            Cancelled,
            Referred,
            Lama,
            Expired,
        ] {
            let parsed: AdmissionStatus = status
                .to_string()
                .parse()
                .expect("label should parse back");
            assert_eq!(parsed, status);
        }
    }
}
