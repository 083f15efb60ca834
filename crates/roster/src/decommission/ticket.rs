//! Per-run record of a decommission.

use tracing::warn;

use super::stage::Stage;
use crate::error::{EntityKind, RosterError};
use crate::model::Target;
use crate::replacement::AvoidSet;

/// What happened to one entity (or one slot within it) during a stage.
#[derive(Debug)]
pub enum OutcomeDetail {
    /// Identity is referenced here and will be processed.
    Collected,
    /// Layer slot now held by a substitute.
    LayerReplaced { layer: usize, replacement: String },
    /// Layer slot dropped without a substitute (drop-coverage only).
    LayerDropped { layer: usize },
    /// Rule target removed; the rule is still covered by another target.
    RuleTargetRemoved { rule: usize, covered_by: Target },
    /// Rule target removed without a covering target (drop-coverage only).
    RuleTargetDropped { rule: usize },
    /// Edited entity written back.
    Saved,
    /// Entity no longer references the identity; nothing to write.
    Unchanged,
    /// Incident handed to its escalation policy.
    HandedOff { policy_id: String },
    /// Verification passed for this entity.
    Clean,
    /// Identity deleted.
    Deleted,
    /// Something went wrong.
    Failed(RosterError),
}

/// Outcome of one entity at one stage.
#[derive(Debug)]
pub struct EntityOutcome {
    pub stage: Stage,
    pub entity: EntityKind,
    pub id: String,
    pub detail: OutcomeDetail,
}

impl EntityOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.detail, OutcomeDetail::Failed(_))
    }

    /// The error, for failed outcomes.
    #[must_use]
    pub fn error(&self) -> Option<&RosterError> {
        match &self.detail {
            OutcomeDetail::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Working state of one decommission run.
///
/// Owned by exactly one run; discarded when it finishes.
#[derive(Debug)]
pub struct DecommissionTicket {
    identity_id: String,
    avoid: AvoidSet,
    stage: Stage,
    aborted_at: Option<Stage>,
    outcomes: Vec<EntityOutcome>,
}

impl DecommissionTicket {
    /// Open a ticket. The departing identity is always avoided.
    #[must_use]
    pub fn new(identity_id: &str, extra_avoid: &AvoidSet) -> Self {
        let mut avoid = extra_avoid.clone();
        avoid.insert(identity_id.to_string());
        Self {
            identity_id: identity_id.to_string(),
            avoid,
            stage: Stage::Collect,
            aborted_at: None,
            outcomes: Vec::new(),
        }
    }

    #[must_use]
    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    #[must_use]
    pub fn avoid(&self) -> &AvoidSet {
        &self.avoid
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn outcomes(&self) -> &[EntityOutcome] {
        &self.outcomes
    }

    /// Move to the next stage on the success path.
    ///
    /// Terminal stages stay where they are.
    pub fn advance(&mut self) -> Stage {
        if let Some(next) = self.stage.next() {
            self.stage = next;
        }
        self.stage
    }

    /// Stop the run. Deletion is no longer reachable.
    pub fn abort(&mut self) {
        if !self.stage.is_terminal() {
            self.aborted_at = Some(self.stage);
            self.stage = Stage::Aborted;
        }
    }

    /// Whether anything other than a missing entity failed at the current
    /// stage.
    #[must_use]
    pub fn stage_failed(&self) -> bool {
        self.outcomes
            .iter()
            .filter(|o| o.stage == self.stage)
            .filter_map(EntityOutcome::error)
            .any(|e| !e.is_not_found())
    }

    /// Record an outcome at the current stage.
    pub fn record(&mut self, entity: EntityKind, id: impl Into<String>, detail: OutcomeDetail) {
        let id = id.into();
        if let OutcomeDetail::Failed(error) = &detail {
            warn!(
                identity_id = %self.identity_id,
                stage = %self.stage,
                entity = %entity,
                id = %id,
                error = %error,
                "Decommission step failed"
            );
        }
        self.outcomes.push(EntityOutcome {
            stage: self.stage,
            entity,
            id,
            detail,
        });
    }

    /// Record a failure at the current stage.
    pub fn fail(&mut self, entity: EntityKind, id: impl Into<String>, error: RosterError) {
        self.record(entity, id, OutcomeDetail::Failed(error));
    }

    /// Close the ticket into a report.
    #[must_use]
    pub fn into_report(self) -> DecommissionReport {
        DecommissionReport {
            identity_id: self.identity_id,
            stage: self.stage,
            aborted_at: self.aborted_at,
            outcomes: self.outcomes,
        }
    }
}

/// Final record of a decommission run.
#[derive(Debug)]
pub struct DecommissionReport {
    pub identity_id: String,
    /// `Done` or `Aborted`.
    pub stage: Stage,
    /// Stage that closed the gate, for aborted runs.
    pub aborted_at: Option<Stage>,
    pub outcomes: Vec<EntityOutcome>,
}

impl DecommissionReport {
    /// Whether the identity was deleted.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// The error that stopped the run.
    ///
    /// First failure recorded at the aborting stage, preferring anything
    /// over a missing entity.
    #[must_use]
    pub fn failure(&self) -> Option<&RosterError> {
        let stage = self.aborted_at?;
        let errors: Vec<&RosterError> = self
            .at_stage(stage)
            .filter_map(EntityOutcome::error)
            .collect();
        errors
            .iter()
            .find(|e| !e.is_not_found())
            .or_else(|| errors.first())
            .copied()
    }

    /// Failed outcomes, in the order they happened.
    pub fn failures(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    /// Outcomes recorded at `stage`.
    pub fn at_stage(&self, stage: Stage) -> impl Iterator<Item = &EntityOutcome> {
        self.outcomes.iter().filter(move |o| o.stage == stage)
    }

    /// `(entity, id)` of every entity left without a safe substitute. These
    /// need a human before the identity can be removed.
    pub fn unsafe_slots(&self) -> Vec<(EntityKind, &str)> {
        self.failures()
            .filter_map(|o| match o.error() {
                Some(RosterError::NoSafeReplacement { entity, id }) => Some((*entity, id.as_str())),
                _ => None,
            })
            .collect()
    }
}
