//! PagerDuty REST API v2 wire models.
//!
//! Unknown fields of policies, schedules and layers are captured with
//! `#[serde(flatten)]` and sent back unchanged on write.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{
    EscalationPolicy, EscalationRule, Identity, Incident, IncidentStatus, OnCallEntry, Schedule,
    ScheduleLayer, ScheduleLayerAssignment, Target, TargetKind, Team,
};

// ============================================================================
// Common
// ============================================================================

/// `{ id, type, summary }` reference object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ref_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Reference {
    fn typed(id: &str, ref_type: &str) -> Self {
        Self {
            id: id.to_string(),
            ref_type: Some(ref_type.to_string()),
            summary: None,
        }
    }
}

/// Error body returned on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ApiError {
    pub fn describe(&self) -> String {
        if self.errors.is_empty() {
            self.message.clone()
        } else {
            format!("{}: {}", self.message, self.errors.join("; "))
        }
    }
}

// ============================================================================
// Users and teams
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UserResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub teams: Vec<Reference>,
}

impl From<UserResource> for Identity {
    fn from(user: UserResource) -> Self {
        Self {
            id: user.id,
            display_name: user.name,
            email: user.email,
            role: user.role,
            team_refs: user.teams.into_iter().map(|t| t.id).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserEnvelope {
    pub user: UserResource,
}

#[derive(Debug, Serialize)]
pub struct CreateUserBody<'a> {
    pub user: CreateUser<'a>,
}

#[derive(Debug, Serialize)]
pub struct CreateUser<'a> {
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    pub name: &'a str,
    pub email: &'a str,
    pub role: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TeamResource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl From<TeamResource> for Team {
    fn from(team: TeamResource) -> Self {
        let name = team.name.or(team.summary).unwrap_or_else(|| team.id.clone());
        Self { id: team.id, name }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceResource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub escalation_policy: Option<Reference>,
}

impl ServiceResource {
    pub fn matches_name(&self, wanted: &str) -> bool {
        [self.name.as_deref(), self.summary.as_deref()]
            .into_iter()
            .flatten()
            .any(|n| n.eq_ignore_ascii_case(wanted))
    }
}

// ============================================================================
// On-calls
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OnCallResource {
    pub escalation_policy: Reference,
    #[serde(default)]
    pub schedule: Option<Reference>,
    #[serde(default)]
    pub escalation_level: Option<u32>,
}

impl From<OnCallResource> for OnCallEntry {
    fn from(oncall: OnCallResource) -> Self {
        let (schedule_id, schedule_name) = match oncall.schedule {
            Some(s) => (Some(s.id), s.summary),
            None => (None, None),
        };
        Self {
            policy_id: oncall.escalation_policy.id,
            policy_name: oncall.escalation_policy.summary,
            schedule_id,
            schedule_name,
            level: oncall.escalation_level,
        }
    }
}

// ============================================================================
// Escalation policies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    #[serde(rename = "user_reference", alias = "user")]
    User,
    #[serde(rename = "schedule_reference", alias = "schedule")]
    Schedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetResource {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: TargetType,
}

impl From<TargetResource> for Target {
    fn from(target: TargetResource) -> Self {
        let kind = match target.target_type {
            TargetType::User => TargetKind::Identity,
            TargetType::Schedule => TargetKind::Schedule,
        };
        Self {
            kind,
            id: target.id,
        }
    }
}

impl From<&Target> for TargetResource {
    fn from(target: &Target) -> Self {
        let target_type = match target.kind {
            TargetKind::Identity => TargetType::User,
            TargetKind::Schedule => TargetType::Schedule,
        };
        Self {
            id: target.id.clone(),
            target_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub escalation_delay_in_minutes: u32,
    #[serde(default)]
    pub targets: Vec<TargetResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub escalation_rules: Vec<RuleResource>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl PolicyResource {
    pub fn into_policy(self, fallback_id: &str) -> EscalationPolicy {
        EscalationPolicy {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            name: self.name,
            rules: self
                .escalation_rules
                .into_iter()
                .map(|rule| EscalationRule {
                    id: rule.id,
                    delay_minutes: rule.escalation_delay_in_minutes,
                    targets: rule.targets.into_iter().map(Target::from).collect(),
                })
                .collect(),
            attributes: self.rest,
        }
    }
}

impl From<&EscalationPolicy> for PolicyResource {
    fn from(policy: &EscalationPolicy) -> Self {
        Self {
            id: Some(policy.id.clone()),
            resource_type: "escalation_policy".to_string(),
            name: policy.name.clone(),
            escalation_rules: policy
                .rules
                .iter()
                .map(|rule| RuleResource {
                    id: rule.id.clone(),
                    escalation_delay_in_minutes: rule.delay_minutes,
                    targets: rule.targets.iter().map(TargetResource::from).collect(),
                })
                .collect(),
            rest: policy.attributes.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyEnvelope {
    pub escalation_policy: PolicyResource,
}

// ============================================================================
// Schedules
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerUser {
    pub user: Reference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub users: Vec<LayerUser>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub schedule_layers: Vec<LayerResource>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ScheduleResource {
    /// PagerDuty layers carry no per-member windows, so every assignment is
    /// read as unbounded within its layer.
    pub fn into_schedule(self, fallback_id: &str) -> Schedule {
        Schedule {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            name: self.name,
            layers: self
                .schedule_layers
                .into_iter()
                .map(|layer| ScheduleLayer {
                    id: layer.id,
                    name: layer.name,
                    assignments: layer
                        .users
                        .into_iter()
                        .map(|u| ScheduleLayerAssignment::always(u.user.id))
                        .collect(),
                    attributes: layer.rest,
                })
                .collect(),
            attributes: self.rest,
        }
    }
}

impl From<&Schedule> for ScheduleResource {
    fn from(schedule: &Schedule) -> Self {
        Self {
            id: Some(schedule.id.clone()),
            resource_type: "schedule".to_string(),
            name: schedule.name.clone(),
            schedule_layers: schedule
                .layers
                .iter()
                .map(|layer| LayerResource {
                    id: layer.id.clone(),
                    name: layer.name.clone(),
                    users: layer
                        .assignments
                        .iter()
                        .map(|a| LayerUser {
                            user: Reference::typed(&a.identity_id, "user_reference"),
                        })
                        .collect(),
                    rest: layer.attributes.clone(),
                })
                .collect(),
            rest: schedule.attributes.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleEnvelope {
    pub schedule: ScheduleResource,
}

// ============================================================================
// Incidents
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Assignment {
    pub assignee: Reference,
}

#[derive(Debug, Deserialize)]
pub struct IncidentResource {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: IncidentStatus,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub escalation_policy: Option<Reference>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl From<IncidentResource> for Incident {
    fn from(incident: IncidentResource) -> Self {
        Self {
            id: incident.id,
            title: incident.title,
            status: incident.status,
            assigned_policy_id: incident.escalation_policy.map(|p| p.id),
            assignee_identity_id: incident.assignments.into_iter().next().map(|a| a.assignee.id),
            urgency: incident.urgency,
        }
    }
}

/// Body of `PUT /incidents/{id}`.
#[derive(Debug, Serialize)]
pub struct IncidentUpdateBody {
    pub incident: IncidentUpdate,
}

#[derive(Debug, Serialize)]
pub struct IncidentUpdate {
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_policy: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignments: Option<Vec<AssignmentUpdate>>,
}

#[derive(Debug, Serialize)]
pub struct AssignmentUpdate {
    pub assignee: Reference,
}

impl IncidentUpdateBody {
    fn empty() -> IncidentUpdate {
        IncidentUpdate {
            resource_type: "incident_reference",
            status: None,
            escalation_policy: None,
            assignments: None,
        }
    }

    pub fn status(status: IncidentStatus) -> Self {
        Self {
            incident: IncidentUpdate {
                status: Some(status),
                ..Self::empty()
            },
        }
    }

    pub fn to_policy(policy_id: &str) -> Self {
        Self {
            incident: IncidentUpdate {
                escalation_policy: Some(Reference::typed(
                    policy_id,
                    "escalation_policy_reference",
                )),
                ..Self::empty()
            },
        }
    }

    pub fn to_identity(identity_id: &str) -> Self {
        Self {
            incident: IncidentUpdate {
                assignments: Some(vec![AssignmentUpdate {
                    assignee: Reference::typed(identity_id, "user_reference"),
                }]),
                ..Self::empty()
            },
        }
    }
}
