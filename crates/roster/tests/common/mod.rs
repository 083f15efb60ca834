//! In-memory roster used by the integration tests.

#![allow(dead_code)]
#![allow(clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use roster::directory::{AccountDirectory, DirectoryClient, IncidentDesk};
use roster::error::{EntityKind, RosterError};
use roster::model::{
    EscalationPolicy, EscalationRule, Identity, Incident, IncidentStatus, NewIdentity,
    OnCallEntry, Schedule, ScheduleLayer, ScheduleLayerAssignment, Target, Team,
};
use serde_json::Map;

// =============================================================================
// Fixtures
// =============================================================================

pub fn identity(id: &str) -> Identity {
    Identity {
        id: id.to_string(),
        display_name: format!("User {id}"),
        email: format!("{}@example.com", id.to_lowercase()),
        role: "user".to_string(),
        team_refs: Vec::new(),
    }
}

/// Schedule `id` with one layer per member list.
pub fn schedule(id: &str, layers: &[&[&str]]) -> Schedule {
    Schedule {
        id: id.to_string(),
        name: format!("Schedule {id}"),
        layers: layers
            .iter()
            .enumerate()
            .map(|(i, members)| ScheduleLayer {
                id: Some(format!("{id}-L{i}")),
                name: format!("Layer {i}"),
                assignments: members
                    .iter()
                    .map(|m| ScheduleLayerAssignment::always(*m))
                    .collect(),
                attributes: Map::new(),
            })
            .collect(),
        attributes: Map::new(),
    }
}

/// Policy `id` with one rule per target list.
pub fn policy(id: &str, rules: Vec<Vec<Target>>) -> EscalationPolicy {
    EscalationPolicy {
        id: id.to_string(),
        name: format!("Policy {id}"),
        rules: rules
            .into_iter()
            .enumerate()
            .map(|(i, targets)| EscalationRule {
                id: Some(format!("{id}-R{i}")),
                delay_minutes: 30,
                targets,
            })
            .collect(),
        attributes: Map::new(),
    }
}

pub fn incident(id: &str, assignee: &str, policy_id: Option<&str>) -> Incident {
    Incident {
        id: id.to_string(),
        title: format!("Incident {id}"),
        status: IncidentStatus::Triggered,
        assigned_policy_id: policy_id.map(str::to_string),
        assignee_identity_id: Some(assignee.to_string()),
        urgency: Some("high".to_string()),
    }
}

pub fn oncall(policy_id: &str, schedule_id: Option<&str>) -> OnCallEntry {
    OnCallEntry {
        policy_id: policy_id.to_string(),
        policy_name: None,
        schedule_id: schedule_id.map(str::to_string),
        schedule_name: None,
        level: Some(1),
    }
}

// =============================================================================
// Fake directory
// =============================================================================

/// Remote state plus knobs for simulating misbehaving writes.
#[derive(Default)]
pub struct FakeState {
    pub identities: BTreeMap<String, Identity>,
    pub schedules: BTreeMap<String, Schedule>,
    pub policies: BTreeMap<String, EscalationPolicy>,
    pub incidents: BTreeMap<String, Incident>,
    pub oncall: BTreeMap<String, Vec<OnCallEntry>>,
    pub teams: Vec<Team>,
    /// Service name to policy id.
    pub services: BTreeMap<String, String>,

    /// Schedule writes succeed but are not stored, as if someone re-added
    /// the identity right after.
    pub ignore_schedule_writes: bool,
    /// Same for policy writes.
    pub ignore_policy_writes: bool,
    /// On-call entries that only show up from the second lookup on, as if
    /// someone put the identity on call mid-run.
    pub late_oncall: Vec<OnCallEntry>,
    /// Schedule reads fail with a server error once a schedule was written.
    pub schedule_reads_fail_after_write: bool,
    /// Number of upcoming schedule writes that fail.
    pub failing_schedule_puts: usize,
    /// Number of upcoming policy writes that fail.
    pub failing_policy_puts: usize,
    /// Reject deletion with a conflict.
    pub refuse_delete: bool,
    /// References whose lookup fails with a server error.
    pub failing_lookups: Vec<String>,

    pub schedule_puts: usize,
    pub policy_puts: usize,
    pub incident_polls: usize,
    pub oncall_lookups: usize,
    pub delete_calls: usize,
    pub acknowledged: Vec<String>,
    pub resolved: Vec<String>,
}

#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<FakeState>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_identity(self, id: &str) -> Self {
        self.state().identities.insert(id.to_string(), identity(id));
        self
    }

    pub fn with_schedule(self, schedule: Schedule) -> Self {
        self.state().schedules.insert(schedule.id.clone(), schedule);
        self
    }

    pub fn with_policy(self, policy: EscalationPolicy) -> Self {
        self.state().policies.insert(policy.id.clone(), policy);
        self
    }

    pub fn with_incident(self, incident: Incident) -> Self {
        self.state().incidents.insert(incident.id.clone(), incident);
        self
    }

    pub fn with_oncall(self, identity_id: &str, entry: OnCallEntry) -> Self {
        self.state()
            .oncall
            .entry(identity_id.to_string())
            .or_default()
            .push(entry);
        self
    }

    pub fn schedule(&self, id: &str) -> Schedule {
        self.state().schedules[id].clone()
    }

    pub fn policy(&self, id: &str) -> EscalationPolicy {
        self.state().policies[id].clone()
    }

    pub fn incident(&self, id: &str) -> Incident {
        self.state().incidents[id].clone()
    }

    pub fn has_identity(&self, id: &str) -> bool {
        self.state().identities.contains_key(id)
    }
}

fn write_failure(entity: EntityKind, id: &str) -> RosterError {
    RosterError::Api {
        status: 409,
        message: format!("{entity} {id} was modified concurrently"),
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn lookup_identity(&self, reference: &str) -> Result<Option<Identity>, RosterError> {
        let state = self.state();
        if state.failing_lookups.iter().any(|r| r == reference) {
            return Err(RosterError::Api {
                status: 500,
                message: "internal server error".to_string(),
            });
        }
        Ok(state
            .identities
            .values()
            .find(|i| i.id == reference || i.email.eq_ignore_ascii_case(reference))
            .cloned())
    }

    async fn list_oncall(&self, identity_id: &str) -> Result<Vec<OnCallEntry>, RosterError> {
        let mut state = self.state();
        state.oncall_lookups += 1;
        let mut entries = state.oncall.get(identity_id).cloned().unwrap_or_default();
        if state.oncall_lookups > 1 {
            entries.extend(state.late_oncall.iter().cloned());
        }
        Ok(entries)
    }

    async fn get_schedule(&self, id: &str) -> Result<Schedule, RosterError> {
        let state = self.state();
        if state.schedule_reads_fail_after_write && state.schedule_puts > 0 {
            return Err(RosterError::Api {
                status: 500,
                message: "internal server error".to_string(),
            });
        }
        state
            .schedules
            .get(id)
            .cloned()
            .ok_or_else(|| RosterError::not_found(EntityKind::Schedule, id))
    }

    async fn put_schedule(&self, id: &str, schedule: &Schedule) -> Result<(), RosterError> {
        let mut state = self.state();
        state.schedule_puts += 1;
        if state.failing_schedule_puts > 0 {
            state.failing_schedule_puts -= 1;
            return Err(write_failure(EntityKind::Schedule, id));
        }
        if !state.schedules.contains_key(id) {
            return Err(RosterError::not_found(EntityKind::Schedule, id));
        }
        if !state.ignore_schedule_writes {
            state.schedules.insert(id.to_string(), schedule.clone());
        }
        Ok(())
    }

    async fn get_policy(&self, id: &str) -> Result<EscalationPolicy, RosterError> {
        self.state()
            .policies
            .get(id)
            .cloned()
            .ok_or_else(|| RosterError::not_found(EntityKind::Policy, id))
    }

    async fn put_policy(&self, id: &str, policy: &EscalationPolicy) -> Result<(), RosterError> {
        let mut state = self.state();
        state.policy_puts += 1;
        if state.failing_policy_puts > 0 {
            state.failing_policy_puts -= 1;
            return Err(write_failure(EntityKind::Policy, id));
        }
        if !state.policies.contains_key(id) {
            return Err(RosterError::not_found(EntityKind::Policy, id));
        }
        if !state.ignore_policy_writes {
            state.policies.insert(id.to_string(), policy.clone());
        }
        Ok(())
    }

    async fn list_open_incidents(&self, identity_id: &str) -> Result<Vec<Incident>, RosterError> {
        let mut state = self.state();
        state.incident_polls += 1;
        Ok(state
            .incidents
            .values()
            .filter(|i| i.status.is_open())
            .filter(|i| i.assignee_identity_id.as_deref() == Some(identity_id))
            .cloned()
            .collect())
    }

    async fn reassign_incident_to_policy(
        &self,
        incident_id: &str,
        policy_id: &str,
    ) -> Result<(), RosterError> {
        let mut state = self.state();
        let incident = state
            .incidents
            .get_mut(incident_id)
            .ok_or_else(|| RosterError::not_found(EntityKind::Incident, incident_id))?;
        incident.assigned_policy_id = Some(policy_id.to_string());
        incident.assignee_identity_id = None;
        Ok(())
    }

    async fn reassign_incident_to_identity(
        &self,
        incident_id: &str,
        identity_id: &str,
    ) -> Result<(), RosterError> {
        let mut state = self.state();
        let incident = state
            .incidents
            .get_mut(incident_id)
            .ok_or_else(|| RosterError::not_found(EntityKind::Incident, incident_id))?;
        incident.assignee_identity_id = Some(identity_id.to_string());
        Ok(())
    }

    async fn delete_identity(&self, id: &str) -> Result<(), RosterError> {
        let mut state = self.state();
        state.delete_calls += 1;
        if state.refuse_delete {
            return Err(RosterError::DeleteConflict {
                id: id.to_string(),
                reason: "user has open incidents".to_string(),
            });
        }
        state
            .identities
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RosterError::not_found(EntityKind::Identity, id))
    }
}

#[async_trait]
impl IncidentDesk for FakeDirectory {
    async fn acknowledge_incident(&self, incident_id: &str) -> Result<(), RosterError> {
        let mut state = self.state();
        let incident = state
            .incidents
            .get_mut(incident_id)
            .ok_or_else(|| RosterError::not_found(EntityKind::Incident, incident_id))?;
        incident.status = IncidentStatus::Acknowledged;
        state.acknowledged.push(incident_id.to_string());
        Ok(())
    }

    async fn resolve_incident(&self, incident_id: &str) -> Result<(), RosterError> {
        let mut state = self.state();
        let incident = state
            .incidents
            .get_mut(incident_id)
            .ok_or_else(|| RosterError::not_found(EntityKind::Incident, incident_id))?;
        incident.status = IncidentStatus::Resolved;
        state.resolved.push(incident_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl AccountDirectory for FakeDirectory {
    async fn create_identity(&self, new: &NewIdentity) -> Result<Identity, RosterError> {
        let mut state = self.state();
        let created = Identity {
            id: format!("UNEW{}", state.identities.len() + 1),
            display_name: new.display_name.clone(),
            email: new.email.clone(),
            role: new.role.clone(),
            team_refs: Vec::new(),
        };
        state
            .identities
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn list_teams(&self) -> Result<Vec<Team>, RosterError> {
        Ok(self.state().teams.clone())
    }

    async fn policy_for_service(&self, service_name: &str) -> Result<Option<String>, RosterError> {
        Ok(self
            .state()
            .services
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(service_name))
            .map(|(_, policy_id)| policy_id.clone()))
    }
}
