//! Override planning for one schedule or policy snapshot.
//!
//! Planning is pure: it takes a snapshot and returns the edited entity plus
//! a step per slot. The orchestrator does the reading and writing, and can
//! re-plan against a fresh snapshot when a write fails.

use crate::error::{EntityKind, RosterError};
use crate::model::{EscalationPolicy, Schedule};
use crate::policy_editor::PolicyEdit;
use crate::replacement::{replacement_for_layer, replacement_for_rule, AvoidSet};
use crate::schedule_editor::ScheduleEdit;

use super::ticket::OutcomeDetail;

/// Planned override of one entity.
#[derive(Debug)]
pub struct OverridePlan<T> {
    /// Entity to write back. `None` when nothing changed or a slot is
    /// blocked.
    pub edited: Option<T>,
    /// One step per slot that referenced the departing identity.
    pub steps: Vec<OutcomeDetail>,
}

impl<T> OverridePlan<T> {
    /// Whether a slot has no safe substitute.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step, OutcomeDetail::Failed(_)))
    }
}

/// Backfill every layer of `schedule` that holds `departing_id`.
///
/// A layer without a substitute blocks the whole schedule, unless
/// `drop_coverage` is set and other members keep the layer staffed.
pub fn plan_schedule_override(
    schedule: &Schedule,
    departing_id: &str,
    avoid: &AvoidSet,
    drop_coverage: bool,
) -> OverridePlan<Schedule> {
    let mut edit = ScheduleEdit::new(schedule);
    let mut steps = Vec::new();

    for (index, layer) in schedule.layers.iter().enumerate() {
        if !layer.references(departing_id) {
            continue;
        }

        if let Some(replacement) = replacement_for_layer(schedule, index, avoid) {
            edit.replace_in_layer(index, departing_id, &replacement);
            steps.push(OutcomeDetail::LayerReplaced {
                layer: index,
                replacement,
            });
        } else if drop_coverage
            && layer
                .assignments
                .iter()
                .any(|a| a.identity_id != departing_id)
        {
            edit.remove_from_layer(index, departing_id);
            steps.push(OutcomeDetail::LayerDropped { layer: index });
        } else {
            steps.push(OutcomeDetail::Failed(RosterError::NoSafeReplacement {
                entity: EntityKind::Schedule,
                id: schedule.id.clone(),
            }));
        }
    }

    finish(edit.finish(), steps)
}

/// Take `departing_id` out of every rule of `policy` that targets it.
///
/// Candidates are the rule's own targets, so the departing identity is
/// removed and the surviving target covers the rule.
pub fn plan_policy_override(
    policy: &EscalationPolicy,
    departing_id: &str,
    avoid: &AvoidSet,
    drop_coverage: bool,
) -> OverridePlan<EscalationPolicy> {
    let mut edit = PolicyEdit::new(policy);
    let mut steps = Vec::new();

    for (index, rule) in policy.rules.iter().enumerate() {
        if !rule.references(departing_id) {
            continue;
        }

        if let Some(covered_by) = replacement_for_rule(rule, avoid) {
            edit.replace_target(index, departing_id, covered_by.clone());
            steps.push(OutcomeDetail::RuleTargetRemoved {
                rule: index,
                covered_by,
            });
        } else if drop_coverage && rule.targets.iter().any(|t| !t.is_identity(departing_id)) {
            edit.remove_target(index, departing_id);
            steps.push(OutcomeDetail::RuleTargetDropped { rule: index });
        } else {
            steps.push(OutcomeDetail::Failed(RosterError::NoSafeReplacement {
                entity: EntityKind::Policy,
                id: policy.id.clone(),
            }));
        }
    }

    finish(edit.finish(), steps)
}

fn finish<T>(edited: Option<T>, steps: Vec<OutcomeDetail>) -> OverridePlan<T> {
    let mut plan = OverridePlan { edited, steps };
    if plan.is_blocked() {
        plan.edited = None;
    }
    plan
}
