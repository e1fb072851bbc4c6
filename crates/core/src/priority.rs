//! Admission priority scoring and audited overrides.
//!
//! Condition-to-priority mapping is a fixed lookup over reference tables, not
//! an expression evaluator. A base rule resolves the tier for the clinical
//! condition; active special considerations then apply additive boosts,
//! clamped to the defined tier range. Overrides bypass the lookup for a
//! single admission, are role-gated, and always leave an audit row.

use crate::actor::{require_role, Actor, CAN_ASSESS_PRIORITY, CAN_OVERRIDE_PRIORITY};
use crate::admission::IpdAdmission;
use crate::audit::AdmissionPriorityAuditLog;
use crate::constants::{TIER_ORDER_MIN, TIER_ORDER_MAX};
use crate::store::Store;
use crate::{AdmissionError, AdmissionResult};
use chrono::Utc;
use ipd_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Priority tier of an admission. `P1` is the most urgent.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PriorityTier {
    P1,
    P2,
    P3,
    P4,
}

impl PriorityTier {
    /// Position in the ordered master list, ascending = most urgent.
    pub fn order(&self) -> u8 {
        match self {
            PriorityTier::P1 => 1,
            PriorityTier::P2 => 2,
            PriorityTier::P3 => 3,
            PriorityTier::P4 => 4,
        }
    }

    /// Tier for an order value clamped into the defined range.
    pub fn from_order_clamped(order: u8) -> Self {
        match order.clamp(TIER_ORDER_MIN, TIER_ORDER_MAX) {
            1 => PriorityTier::P1,
            2 => PriorityTier::P2,
            3 => PriorityTier::P3,
            _ => PriorityTier::P4,
        }
    }

    /// The least urgent tier, used as the explicit fallback when no rule is
    /// configured for a condition.
    pub fn lowest() -> Self {
        PriorityTier::P4
    }

    pub fn label(&self) -> &'static str {
        match self {
            PriorityTier::P1 => "Immediate",
            PriorityTier::P2 => "Urgent",
            PriorityTier::P3 => "Semi-urgent",
            PriorityTier::P4 => "Routine",
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityTier::P1 => write!(f, "P1"),
            PriorityTier::P2 => write!(f, "P2"),
            PriorityTier::P3 => write!(f, "P3"),
            PriorityTier::P4 => write!(f, "P4"),
        }
    }
}

impl std::str::FromStr for PriorityTier {
    type Err = AdmissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "P1" => Ok(PriorityTier::P1),
            "P2" => Ok(PriorityTier::P2),
            "P3" => Ok(PriorityTier::P3),
            "P4" => Ok(PriorityTier::P4),
            other => Err(AdmissionError::InvalidInput(format!(
                "unknown priority tier: '{other}'"
            ))),
        }
    }
}

/// Clinical condition categories the rule table maps from.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    CardiacArrest,
    Stroke,
    Sepsis,
    MajorTrauma,
    RespiratoryDistress,
    AcuteAbdomen,
    Fracture,
    ChronicCare,
    ElectiveProcedure,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConditionType::CardiacArrest => "cardiac_arrest",
            ConditionType::Stroke => "stroke",
            ConditionType::Sepsis => "sepsis",
            ConditionType::MajorTrauma => "major_trauma",
            ConditionType::RespiratoryDistress => "respiratory_distress",
            ConditionType::AcuteAbdomen => "acute_abdomen",
            ConditionType::Fracture => "fracture",
            ConditionType::ChronicCare => "chronic_care",
            ConditionType::ElectiveProcedure => "elective_procedure",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for ConditionType {
    type Err = AdmissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "cardiac_arrest" => Ok(ConditionType::CardiacArrest),
            "stroke" => Ok(ConditionType::Stroke),
            "sepsis" => Ok(ConditionType::Sepsis),
            "major_trauma" => Ok(ConditionType::MajorTrauma),
            "respiratory_distress" => Ok(ConditionType::RespiratoryDistress),
            "acute_abdomen" => Ok(ConditionType::AcuteAbdomen),
            "fracture" => Ok(ConditionType::Fracture),
            "chronic_care" => Ok(ConditionType::ChronicCare),
            "elective_procedure" => Ok(ConditionType::ElectiveProcedure),
            other => Err(AdmissionError::InvalidInput(format!(
                "unknown condition type: '{other}'"
            ))),
        }
    }
}

/// Special-consideration categories carrying a priority boost.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConsiderationType {
    Pregnancy,
    Pediatric,
    Geriatric,
    Immunocompromised,
}

impl std::fmt::Display for ConsiderationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConsiderationType::Pregnancy => "pregnancy",
            ConsiderationType::Pediatric => "pediatric",
            ConsiderationType::Geriatric => "geriatric",
            ConsiderationType::Immunocompromised => "immunocompromised",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for ConsiderationType {
    type Err = AdmissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pregnancy" => Ok(ConsiderationType::Pregnancy),
            "pediatric" => Ok(ConsiderationType::Pediatric),
            "geriatric" => Ok(ConsiderationType::Geriatric),
            "immunocompromised" => Ok(ConsiderationType::Immunocompromised),
            other => Err(AdmissionError::InvalidInput(format!(
                "unknown consideration type: '{other}'"
            ))),
        }
    }
}

/// Maps a condition type to its base tier. At most one active rule exists per
/// condition; the table is keyed by condition to enforce that.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriorityRule {
    pub condition: ConditionType,
    pub tier: PriorityTier,
    pub active: bool,
}

/// Maps a consideration type to its additive boost. At most one active row
/// exists per consideration type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpecialConsideration {
    pub consideration: ConsiderationType,
    /// Tier steps toward P1 applied on top of the base rule.
    pub boost: u8,
    pub active: bool,
}

/// One contribution to a resolved priority, for display and audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum AppliedRule {
    BaseRule {
        condition: ConditionType,
        tier: PriorityTier,
    },
    Boost {
        consideration: ConsiderationType,
        boost: u8,
    },
}

/// Result of a priority evaluation: the resolved tier and what contributed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriorityEvaluation {
    pub tier: PriorityTier,
    pub applied: Vec<AppliedRule>,
}

/// The default reference rule table installed by `seed`.
pub fn default_rules() -> Vec<PriorityRule> {
    use ConditionType::*;
    use PriorityTier::*;

    [
        (CardiacArrest, P1),
        (Stroke, P1),
        (Sepsis, P2),
        (MajorTrauma, P2),
        (RespiratoryDistress, P2),
        (AcuteAbdomen, P3),
        (Fracture, P3),
        (ChronicCare, P4),
        (ElectiveProcedure, P4),
    ]
    .into_iter()
    .map(|(condition, tier)| PriorityRule {
        condition,
        tier,
        active: true,
    })
    .collect()
}

/// The default reference consideration table installed by `seed`.
pub fn default_considerations() -> Vec<SpecialConsideration> {
    use ConsiderationType::*;

    [(Pregnancy, 1), (Pediatric, 1), (Geriatric, 1), (Immunocompromised, 1)]
        .into_iter()
        .map(|(consideration, boost)| SpecialConsideration {
            consideration,
            boost,
            active: true,
        })
        .collect()
}

/// Priority engine over the reference tables, plus the audited override path.
#[derive(Clone)]
pub struct PriorityEngine {
    store: Arc<Store>,
}

impl PriorityEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Installs the default rule and consideration tables, replacing any
    /// existing rows. Intended for deployment seeding and tests.
    pub fn seed_defaults(&self) {
        let mut tables = self.store.write();
        tables.priority_rules = default_rules()
            .into_iter()
            .map(|rule| (rule.condition, rule))
            .collect();
        tables.considerations = default_considerations()
            .into_iter()
            .map(|row| (row.consideration, row))
            .collect();
    }

    /// The configured rule table, ordered by condition.
    pub fn rules(&self) -> Vec<PriorityRule> {
        let tables = self.store.read();
        tables.priority_rules.values().cloned().collect()
    }

    /// The configured consideration table, ordered by consideration.
    pub fn considerations(&self) -> Vec<SpecialConsideration> {
        let tables = self.store.read();
        tables.considerations.values().cloned().collect()
    }

    /// Resolves the priority tier for a condition and set of considerations.
    ///
    /// Looks up the active rule for `condition`, then applies each present and
    /// active consideration's boost, clamped so the result never leaves the
    /// defined tier range. Returns the tier together with the contributions
    /// that produced it.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::NoRuleConfigured`] when no active rule exists
    /// for `condition`. Callers wanting a fallback must use
    /// [`PriorityTier::lowest`] explicitly; the engine never picks a tier on
    /// its own.
    pub fn evaluate(
        &self,
        condition: ConditionType,
        considerations: &BTreeSet<ConsiderationType>,
    ) -> AdmissionResult<PriorityEvaluation> {
        let tables = self.store.read();
        evaluate_in(&tables, condition, considerations)
    }

    /// Evaluates and stores the resolved tier on the admission record.
    ///
    /// The stored value is what a later override is compared against. The
    /// reference tables are never touched.
    pub fn assign(
        &self,
        actor: &Actor,
        admission_id: Uuid,
        condition: ConditionType,
        considerations: &BTreeSet<ConsiderationType>,
    ) -> AdmissionResult<(IpdAdmission, PriorityEvaluation)> {
        require_role(actor, CAN_ASSESS_PRIORITY, "assess admission priority")?;

        let mut tables = self.store.write();
        let evaluation = evaluate_in(&tables, condition, considerations)?;

        let admission = tables
            .admissions
            .get_mut(&admission_id)
            .ok_or(AdmissionError::NotFound {
                kind: "admission",
                id: admission_id.to_string(),
            })?;
        admission.priority = Some(evaluation.tier);
        let admission = admission.clone();

        tracing::info!(
            admission_id = %admission_id,
            tier = %evaluation.tier,
            "assigned admission priority"
        );
        Ok((admission, evaluation))
    }

    /// Overrides the resolved priority of one admission.
    ///
    /// Permitted only for the `CAN_OVERRIDE_PRIORITY` roles. The reason is
    /// mandatory and non-blank. Every call writes exactly one audit row with
    /// the old and new tier, whether or not the value changed. Master tables
    /// are never mutated by an override.
    pub fn override_priority(
        &self,
        actor: &Actor,
        admission_id: Uuid,
        target: PriorityTier,
        reason: &str,
    ) -> AdmissionResult<IpdAdmission> {
        require_role(actor, CAN_OVERRIDE_PRIORITY, "override admission priority")?;
        let reason = NonEmptyText::new(reason)
            .map_err(|_| AdmissionError::InvalidInput("override reason is mandatory".into()))?;

        let mut tables = self.store.write();
        let admission = tables
            .admissions
            .get_mut(&admission_id)
            .ok_or(AdmissionError::NotFound {
                kind: "admission",
                id: admission_id.to_string(),
            })?;

        let previous = admission.priority;
        admission.priority = Some(target);
        let admission = admission.clone();

        tables.append_priority_audit(AdmissionPriorityAuditLog {
            id: Uuid::new_v4(),
            admission_id,
            previous,
            new_tier: target,
            actor_id: actor.id,
            role: actor.role,
            reason: reason.as_str().to_owned(),
            recorded_at: Utc::now(),
        });

        tracing::info!(
            admission_id = %admission_id,
            previous = ?previous,
            target = %target,
            "priority override recorded"
        );
        Ok(admission)
    }
}

/// Table-level evaluation shared by the read and assign paths.
pub(crate) fn evaluate_in(
    tables: &crate::store::Tables,
    condition: ConditionType,
    considerations: &BTreeSet<ConsiderationType>,
) -> AdmissionResult<PriorityEvaluation> {
    let rule = tables
        .priority_rules
        .get(&condition)
        .filter(|rule| rule.active)
        .ok_or(AdmissionError::NoRuleConfigured(condition))?;

    let mut applied = vec![AppliedRule::BaseRule {
        condition,
        tier: rule.tier,
    }];
    let mut order = rule.tier.order();

    for consideration in considerations {
        let Some(row) = tables
            .considerations
            .get(consideration)
            .filter(|row| row.active)
        else {
            continue;
        };
        order = order.saturating_sub(row.boost).max(TIER_ORDER_MIN);
        applied.push(AppliedRule::Boost {
            consideration: *consideration,
            boost: row.boost,
        });
    }

    Ok(PriorityEvaluation {
        tier: PriorityTier::from_order_clamped(order),
        applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::testutil;

    fn engine() -> (Arc<Store>, PriorityEngine) {
        let store = Arc::new(Store::new());
        let engine = PriorityEngine::new(store.clone());
        engine.seed_defaults();
        (store, engine)
    }

    #[test]
    fn test_base_rule_resolves_tier() {
        let (_store, engine) = engine();
        let evaluation = engine
            .evaluate(ConditionType::Sepsis, &BTreeSet::new())
            .expect("rule for sepsis is seeded");
        assert_eq!(evaluation.tier, PriorityTier::P2);
        assert_eq!(evaluation.applied.len(), 1);
    }

    #[test]
    fn test_boost_moves_toward_p1_and_clamps() {
        let (_store, engine) = engine();

        let boosted = engine
            .evaluate(
                ConditionType::Fracture,
                &BTreeSet::from([ConsiderationType::Pediatric]),
            )
            .expect("rule for fracture is seeded");
        assert_eq!(boosted.tier, PriorityTier::P2);
        assert_eq!(boosted.applied.len(), 2);

        // Already at the top of the range: boosts must not escape it.
        let clamped = engine
            .evaluate(
                ConditionType::CardiacArrest,
                &BTreeSet::from([
                    ConsiderationType::Pregnancy,
                    ConsiderationType::Geriatric,
                ]),
            )
            .expect("rule for cardiac arrest is seeded");
        assert_eq!(clamped.tier, PriorityTier::P1);
    }

    #[test]
    fn test_inactive_consideration_does_not_contribute() {
        let (store, engine) = engine();
        {
            let mut tables = store.write();
            let row = tables
                .considerations
                .get_mut(&ConsiderationType::Geriatric)
                .expect("geriatric row is seeded");
            row.active = false;
        }

        let evaluation = engine
            .evaluate(
                ConditionType::Fracture,
                &BTreeSet::from([ConsiderationType::Geriatric]),
            )
            .expect("rule for fracture is seeded");
        assert_eq!(evaluation.tier, PriorityTier::P3);
        assert_eq!(evaluation.applied.len(), 1, "inactive boost must not apply");
    }

    #[test]
    fn test_missing_rule_fails_rather_than_guessing() {
        let store = Arc::new(Store::new());
        let engine = PriorityEngine::new(store);

        let err = engine
            .evaluate(ConditionType::Stroke, &BTreeSet::new())
            .expect_err("no rules are configured");
        assert!(matches!(
            err,
            AdmissionError::NoRuleConfigured(ConditionType::Stroke)
        ));

        // The documented fallback for callers that need a tier anyway.
        assert_eq!(PriorityTier::lowest(), PriorityTier::P4);
    }

    #[test]
    fn test_override_requires_reason() {
        let (store, engine) = engine();
        let admission = testutil::admitted_admission(&store);
        let manager = Actor::new(Uuid::new_v4(), Role::IpdManager);

        let err = engine
            .override_priority(&manager, admission.id, PriorityTier::P1, "   ")
            .expect_err("blank reason must be rejected");
        assert!(matches!(err, AdmissionError::InvalidInput(_)));

        // A rejected override must not leave an audit row behind.
        let tables = store.read();
        assert_eq!(tables.priority_audit_for_admission(admission.id).count(), 0);
    }

    #[test]
    fn test_override_writes_exactly_one_audit_row() {
        let (store, engine) = engine();
        let admission = testutil::admitted_admission(&store);
        let manager = Actor::new(Uuid::new_v4(), Role::IpdManager);

        let updated = engine
            .override_priority(&manager, admission.id, PriorityTier::P1, "trauma escalation")
            .expect("override should succeed");
        assert_eq!(updated.priority, Some(PriorityTier::P1));

        let tables = store.read();
        let rows: Vec<_> = tables.priority_audit_for_admission(admission.id).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].previous, None);
        assert_eq!(rows[0].new_tier, PriorityTier::P1);
        assert_eq!(rows[0].reason, "trauma escalation");
        assert_eq!(rows[0].actor_id, manager.id);
    }

    #[test]
    fn test_override_rejected_for_unlisted_role() {
        let (store, engine) = engine();
        let admission = testutil::admitted_admission(&store);
        let doctor = Actor::new(Uuid::new_v4(), Role::Doctor);

        let err = engine
            .override_priority(&doctor, admission.id, PriorityTier::P1, "seems urgent")
            .expect_err("doctor is not in the override allow-list");
        assert!(matches!(err, AdmissionError::Forbidden { .. }));
    }

    #[test]
    fn test_unchanged_override_still_audited() {
        let (store, engine) = engine();
        let admission = testutil::admitted_admission(&store);
        let superintendent = Actor::new(Uuid::new_v4(), Role::MedicalSuperintendent);

        engine
            .override_priority(&superintendent, admission.id, PriorityTier::P2, "review")
            .expect("first override should succeed");
        engine
            .override_priority(&superintendent, admission.id, PriorityTier::P2, "re-review")
            .expect("no-change override should still succeed");

        let tables = store.read();
        assert_eq!(
            tables.priority_audit_for_admission(admission.id).count(),
            2,
            "every override call writes a row"
        );
    }
}
