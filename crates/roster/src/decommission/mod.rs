//! Fail-closed decommissioning of one identity.
//!
//! A run moves through the stages in [`Stage`] order. Overrides and incident
//! handoffs only prepare the ground; the identity is deleted after fresh
//! reads in every verification stage show it is no longer referenced. Any
//! doubt ends the run in [`Stage::Aborted`] with the identity intact.

mod overrides;
mod stage;
mod ticket;

pub use overrides::{plan_policy_override, plan_schedule_override, OverridePlan};
pub use stage::Stage;
pub use ticket::{DecommissionReport, DecommissionTicket, EntityOutcome, OutcomeDetail};

use tracing::{info, instrument, warn};

use crate::directory::DirectoryClient;
use crate::error::{EntityKind, RosterError};
use crate::incidents::{HandoffOutcome, IncidentReassigner};
use crate::model::{EscalationPolicy, Schedule};
use crate::replacement::AvoidSet;

/// Knobs for a decommission run.
#[derive(Debug, Clone, Default)]
pub struct DecommissionOptions {
    /// Remove the identity from slots that have no substitute, as long as
    /// the slot keeps at least one other member.
    pub drop_coverage: bool,
    /// Identities that must never be picked as substitutes.
    pub extra_avoid: AvoidSet,
}

/// Ids gathered during [`Stage::Collect`], in discovery order.
#[derive(Debug, Default)]
struct Collected {
    schedules: Vec<String>,
    policies: Vec<String>,
}

impl Collected {
    fn add_schedule(&mut self, id: &str) -> bool {
        push_unique(&mut self.schedules, id)
    }

    fn add_policy(&mut self, id: &str) -> bool {
        push_unique(&mut self.policies, id)
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) -> bool {
    if ids.iter().any(|existing| existing == id) {
        return false;
    }
    ids.push(id.to_string());
    true
}

/// Runs decommissions against a [`DirectoryClient`].
pub struct Decommissioner<'a, C: DirectoryClient + ?Sized> {
    client: &'a C,
    options: DecommissionOptions,
}

impl<'a, C: DirectoryClient + ?Sized> Decommissioner<'a, C> {
    #[must_use]
    pub fn new(client: &'a C, options: DecommissionOptions) -> Self {
        Self { client, options }
    }

    /// Decommission `identity_id`.
    ///
    /// Never fails as a whole: every problem is recorded in the report and
    /// the run ends in [`Stage::Done`] or [`Stage::Aborted`].
    #[instrument(skip(self), fields(drop_coverage = self.options.drop_coverage))]
    pub async fn run(&self, identity_id: &str) -> DecommissionReport {
        let mut ticket = DecommissionTicket::new(identity_id, &self.options.extra_avoid);
        info!(identity_id, "Starting decommission");

        let collected = self.collect(&mut ticket).await;

        while !ticket.stage().is_terminal() {
            let stage = ticket.stage();
            let passed = match stage {
                Stage::Collect => collected.is_some(),
                Stage::OverrideSchedules => {
                    self.override_schedules(&mut ticket, collected.as_ref()).await
                }
                Stage::OverridePolicies => {
                    self.override_policies(&mut ticket, collected.as_ref()).await
                }
                Stage::ReassignIncidents => {
                    self.reassign_incidents(&mut ticket).await;
                    true
                }
                Stage::VerifySchedules => {
                    self.verify_schedules(&mut ticket, collected.as_ref()).await
                }
                Stage::VerifyPolicies => {
                    self.verify_policies(&mut ticket, collected.as_ref()).await
                }
                Stage::VerifyIncidents => self.verify_incidents(&mut ticket).await,
                Stage::Delete => self.delete(&mut ticket).await,
                Stage::Done | Stage::Aborted => break,
            };

            if passed {
                ticket.advance();
            } else {
                warn!(identity_id, stage = %stage, "Decommission aborted");
                ticket.abort();
            }
        }

        let report = ticket.into_report();
        if report.is_done() {
            info!(identity_id, "Decommission complete");
        }
        report
    }

    /// On-call lookup, then the schedules targeted by every collected
    /// policy. `None` when the lookup itself failed.
    async fn collect(&self, ticket: &mut DecommissionTicket) -> Option<Collected> {
        let identity_id = ticket.identity_id().to_string();
        let mut collected = Collected::default();

        let entries = match self.client.list_oncall(&identity_id).await {
            Ok(entries) => entries,
            Err(e) => {
                ticket.fail(EntityKind::Identity, &identity_id, e);
                return None;
            }
        };

        for entry in &entries {
            collected.add_policy(&entry.policy_id);
            if let Some(schedule_id) = &entry.schedule_id {
                collected.add_schedule(schedule_id);
            }
        }

        for policy_id in collected.policies.clone() {
            match self.client.get_policy(&policy_id).await {
                Ok(policy) => {
                    for schedule_id in policy.schedule_ids() {
                        collected.add_schedule(&schedule_id);
                    }
                }
                Err(e) if e.is_not_found() => ticket.fail(EntityKind::Policy, &policy_id, e),
                Err(e) => {
                    ticket.fail(EntityKind::Policy, &policy_id, e);
                    return None;
                }
            }
        }

        for id in &collected.schedules {
            ticket.record(EntityKind::Schedule, id, OutcomeDetail::Collected);
        }
        for id in &collected.policies {
            ticket.record(EntityKind::Policy, id, OutcomeDetail::Collected);
        }
        info!(
            identity_id = %identity_id,
            schedules = collected.schedules.len(),
            policies = collected.policies.len(),
            "Collected references"
        );
        Some(collected)
    }

    async fn override_schedules(
        &self,
        ticket: &mut DecommissionTicket,
        collected: Option<&Collected>,
    ) -> bool {
        let Some(collected) = collected else {
            return false;
        };
        for id in &collected.schedules {
            match self.override_schedule(id, ticket.identity_id(), ticket.avoid()).await {
                Ok(steps) => record_steps(ticket, EntityKind::Schedule, id, steps),
                Err(e) => ticket.fail(EntityKind::Schedule, id, e),
            }
        }
        !ticket.stage_failed()
    }

    async fn override_policies(
        &self,
        ticket: &mut DecommissionTicket,
        collected: Option<&Collected>,
    ) -> bool {
        let Some(collected) = collected else {
            return false;
        };
        for id in &collected.policies {
            match self.override_policy(id, ticket.identity_id(), ticket.avoid()).await {
                Ok(steps) => record_steps(ticket, EntityKind::Policy, id, steps),
                Err(e) => ticket.fail(EntityKind::Policy, id, e),
            }
        }
        !ticket.stage_failed()
    }

    /// Read, plan and write one schedule. A failed write is retried once
    /// against a fresh snapshot.
    async fn override_schedule(
        &self,
        id: &str,
        departing_id: &str,
        avoid: &AvoidSet,
    ) -> Result<Vec<OutcomeDetail>, RosterError> {
        let plan_for = |snapshot: &Schedule| {
            plan_schedule_override(snapshot, departing_id, avoid, self.options.drop_coverage)
        };

        let plan = plan_for(&self.client.get_schedule(id).await?);
        let Some(edited) = &plan.edited else {
            return Ok(unchanged(plan));
        };
        match self.client.put_schedule(id, edited).await {
            Ok(()) => return Ok(saved(plan)),
            Err(e) => {
                warn!(schedule_id = id, error = %e, "Schedule write failed, retrying");
            }
        }

        let plan = plan_for(&self.client.get_schedule(id).await?);
        let Some(edited) = &plan.edited else {
            return Ok(unchanged(plan));
        };
        self.client
            .put_schedule(id, edited)
            .await
            .map_err(|e| write_conflict(EntityKind::Schedule, id, &e))?;
        Ok(saved(plan))
    }

    /// Read, plan and write one policy, with the same retry as schedules.
    async fn override_policy(
        &self,
        id: &str,
        departing_id: &str,
        avoid: &AvoidSet,
    ) -> Result<Vec<OutcomeDetail>, RosterError> {
        let plan_for = |snapshot: &EscalationPolicy| {
            plan_policy_override(snapshot, departing_id, avoid, self.options.drop_coverage)
        };

        let plan = plan_for(&self.client.get_policy(id).await?);
        let Some(edited) = &plan.edited else {
            return Ok(unchanged(plan));
        };
        match self.client.put_policy(id, edited).await {
            Ok(()) => return Ok(saved(plan)),
            Err(e) => {
                warn!(policy_id = id, error = %e, "Policy write failed, retrying");
            }
        }

        let plan = plan_for(&self.client.get_policy(id).await?);
        let Some(edited) = &plan.edited else {
            return Ok(unchanged(plan));
        };
        self.client
            .put_policy(id, edited)
            .await
            .map_err(|e| write_conflict(EntityKind::Policy, id, &e))?;
        Ok(saved(plan))
    }

    /// Hand every open incident back to its policy. Failures are recorded;
    /// [`Stage::VerifyIncidents`] decides whether they block deletion.
    async fn reassign_incidents(&self, ticket: &mut DecommissionTicket) {
        let identity_id = ticket.identity_id().to_string();
        let incidents = match self.client.list_open_incidents(&identity_id).await {
            Ok(incidents) => incidents,
            Err(e) => {
                ticket.fail(EntityKind::Identity, &identity_id, e);
                return;
            }
        };

        let reassigner = IncidentReassigner::new(self.client);
        for incident in &incidents {
            match reassigner.handoff(incident, &identity_id).await {
                Ok(HandoffOutcome::ReassignedToPolicy { policy_id }) => ticket.record(
                    EntityKind::Incident,
                    &incident.id,
                    OutcomeDetail::HandedOff { policy_id },
                ),
                Ok(HandoffOutcome::AlreadyResolved) => {
                    ticket.record(EntityKind::Incident, &incident.id, OutcomeDetail::Unchanged);
                }
                Err(e) => ticket.fail(EntityKind::Incident, &incident.id, e),
            }
        }
    }

    async fn verify_schedules(
        &self,
        ticket: &mut DecommissionTicket,
        collected: Option<&Collected>,
    ) -> bool {
        let Some(fresh) = self.fresh_ids(ticket, collected).await else {
            return false;
        };
        let stage = ticket.stage();
        for id in &fresh.schedules {
            let still_there = self
                .client
                .get_schedule(id)
                .await
                .map(|s| s.references(ticket.identity_id()));
            check(ticket, stage, EntityKind::Schedule, id, still_there);
        }
        !ticket.stage_failed()
    }

    async fn verify_policies(
        &self,
        ticket: &mut DecommissionTicket,
        collected: Option<&Collected>,
    ) -> bool {
        let Some(fresh) = self.fresh_ids(ticket, collected).await else {
            return false;
        };
        let stage = ticket.stage();
        for id in &fresh.policies {
            let still_there = self
                .client
                .get_policy(id)
                .await
                .map(|p| p.references(ticket.identity_id()));
            check(ticket, stage, EntityKind::Policy, id, still_there);
        }
        !ticket.stage_failed()
    }

    async fn verify_incidents(&self, ticket: &mut DecommissionTicket) -> bool {
        let identity_id = ticket.identity_id().to_string();
        let stage = ticket.stage();
        match self.client.list_open_incidents(&identity_id).await {
            Ok(incidents) if incidents.is_empty() => {
                ticket.record(EntityKind::Identity, &identity_id, OutcomeDetail::Clean);
                true
            }
            Ok(incidents) => {
                for incident in incidents {
                    ticket.fail(
                        EntityKind::Incident,
                        &incident.id,
                        RosterError::VerificationFailed {
                            stage: stage.to_string(),
                            entity: EntityKind::Incident,
                            id: incident.id.clone(),
                        },
                    );
                }
                false
            }
            Err(e) => {
                ticket.fail(EntityKind::Identity, &identity_id, e);
                false
            }
        }
    }

    async fn delete(&self, ticket: &mut DecommissionTicket) -> bool {
        let identity_id = ticket.identity_id().to_string();
        match self.client.delete_identity(&identity_id).await {
            Ok(()) => {
                ticket.record(EntityKind::Identity, &identity_id, OutcomeDetail::Deleted);
                true
            }
            Err(e) => {
                ticket.fail(EntityKind::Identity, &identity_id, e);
                false
            }
        }
    }

    /// Collected ids merged with those from a fresh on-call lookup. `None`
    /// when the lookup failed.
    async fn fresh_ids(
        &self,
        ticket: &mut DecommissionTicket,
        collected: Option<&Collected>,
    ) -> Option<Collected> {
        let identity_id = ticket.identity_id().to_string();
        let entries = match self.client.list_oncall(&identity_id).await {
            Ok(entries) => entries,
            Err(e) => {
                ticket.fail(EntityKind::Identity, &identity_id, e);
                return None;
            }
        };

        let mut merged = Collected::default();
        if let Some(collected) = collected {
            merged.schedules.clone_from(&collected.schedules);
            merged.policies.clone_from(&collected.policies);
        }
        for entry in &entries {
            merged.add_policy(&entry.policy_id);
            if let Some(schedule_id) = &entry.schedule_id {
                merged.add_schedule(schedule_id);
            }
        }
        Some(merged)
    }
}

/// Record one re-read during verification. A missing entity cannot
/// reference anyone and counts as clean; any other read error fails closed.
fn check(
    ticket: &mut DecommissionTicket,
    stage: Stage,
    entity: EntityKind,
    id: &str,
    still_there: Result<bool, RosterError>,
) {
    match still_there {
        Ok(false) => ticket.record(entity, id, OutcomeDetail::Clean),
        Err(e) if e.is_not_found() => ticket.record(entity, id, OutcomeDetail::Clean),
        Ok(true) => ticket.fail(
            entity,
            id,
            RosterError::VerificationFailed {
                stage: stage.to_string(),
                entity,
                id: id.to_string(),
            },
        ),
        Err(e) => ticket.fail(entity, id, e),
    }
}

fn record_steps(
    ticket: &mut DecommissionTicket,
    entity: EntityKind,
    id: &str,
    steps: Vec<OutcomeDetail>,
) {
    for step in steps {
        ticket.record(entity, id, step);
    }
}

fn unchanged<T>(plan: OverridePlan<T>) -> Vec<OutcomeDetail> {
    let blocked = plan.is_blocked();
    let mut steps = plan.steps;
    if !blocked {
        steps.push(OutcomeDetail::Unchanged);
    }
    steps
}

fn saved<T>(plan: OverridePlan<T>) -> Vec<OutcomeDetail> {
    let mut steps = plan.steps;
    steps.push(OutcomeDetail::Saved);
    steps
}

fn write_conflict(entity: EntityKind, id: &str, error: &RosterError) -> RosterError {
    RosterError::RemoteWriteConflict {
        entity,
        id: id.to_string(),
        reason: error.to_string(),
    }
}
