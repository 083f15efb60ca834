//! Roster domain types.
//!
//! These are snapshots of remote state. They are owned by the platform; this
//! crate only edits copies and writes them back whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A responder account on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque platform id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Login email.
    pub email: String,
    /// Base role (`user`, `limited_user`, `manager`, `responder`, ...).
    pub role: String,
    /// Ids of the teams the identity belongs to.
    #[serde(default)]
    pub team_refs: Vec<String>,
}

/// Request to create a new identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdentity {
    pub email: String,
    pub display_name: String,
    pub role: String,
}

/// A team, used only to label identities in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
}

/// What an escalation target points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Identity,
    Schedule,
}

/// An escalation rule target.
///
/// Equality is over `(kind, id)` only, so targets read at different times
/// compare equal even when the platform decorates them differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub id: String,
}

impl Target {
    /// Target pointing at an identity.
    pub fn identity(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Identity,
            id: id.into(),
        }
    }

    /// Target pointing at a schedule.
    pub fn schedule(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Schedule,
            id: id.into(),
        }
    }

    /// Whether this target is the given identity.
    #[must_use]
    pub fn is_identity(&self, identity_id: &str) -> bool {
        self.kind == TargetKind::Identity && self.id == identity_id
    }
}

/// One level of an escalation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    /// Platform rule id; `None` for rules not yet written.
    pub id: Option<String>,
    /// Minutes before escalating to the next rule.
    pub delay_minutes: u32,
    /// Notification targets. No `(kind, id)` pair appears twice.
    pub targets: Vec<Target>,
}

impl EscalationRule {
    /// Ids of identity targets, in rule order.
    pub fn identity_ids(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter(|t| t.kind == TargetKind::Identity)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Ids of schedule targets, in rule order.
    pub fn schedule_ids(&self) -> impl Iterator<Item = &str> {
        self.targets
            .iter()
            .filter(|t| t.kind == TargetKind::Schedule)
            .map(|t| t.id.as_str())
    }

    #[must_use]
    pub fn references(&self, identity_id: &str) -> bool {
        self.targets.iter().any(|t| t.is_identity(identity_id))
    }
}

/// An ordered escalation chain. Rule 0 is notified first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub id: String,
    pub name: String,
    pub rules: Vec<EscalationRule>,
    /// Remote fields this crate does not interpret, written back untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl EscalationPolicy {
    /// Whether any rule targets the identity directly.
    #[must_use]
    pub fn references(&self, identity_id: &str) -> bool {
        self.rules.iter().any(|r| r.references(identity_id))
    }

    /// Every schedule targeted by any rule, first occurrence order.
    pub fn schedule_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.rules.iter().flat_map(EscalationRule::schedule_ids) {
            if !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }
}

/// A member slot in a schedule layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLayerAssignment {
    pub identity_id: String,
    /// Window start; `None` with `end: None` means always on in this layer.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ScheduleLayerAssignment {
    /// Unbounded assignment.
    pub fn always(identity_id: impl Into<String>) -> Self {
        Self {
            identity_id: identity_id.into(),
            start: None,
            end: None,
        }
    }
}

/// One rotation pattern within a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleLayer {
    pub id: Option<String>,
    pub name: String,
    pub assignments: Vec<ScheduleLayerAssignment>,
    /// Rotation settings and other remote fields, written back untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl ScheduleLayer {
    /// Member ids in rotation order (duplicates kept).
    pub fn member_ids(&self) -> Vec<String> {
        self.assignments
            .iter()
            .map(|a| a.identity_id.clone())
            .collect()
    }

    #[must_use]
    pub fn references(&self, identity_id: &str) -> bool {
        self.assignments.iter().any(|a| a.identity_id == identity_id)
    }
}

/// A named on-call rotation made of ordered layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub layers: Vec<ScheduleLayer>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Schedule {
    #[must_use]
    pub fn references(&self, identity_id: &str) -> bool {
        self.layers.iter().any(|l| l.references(identity_id))
    }
}

/// Incident status. Moves forward only; `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Triggered,
    Acknowledged,
    Resolved,
}

impl IncidentStatus {
    /// Triggered or acknowledged.
    #[must_use]
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Resolved)
    }

    /// Whether moving to `next` is a forward transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.is_open() && next > self
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Triggered => write!(f, "triggered"),
            Self::Acknowledged => write!(f, "acknowledged"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// An incident as seen by the roster tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub status: IncidentStatus,
    /// Escalation policy the incident is routed through, if known.
    pub assigned_policy_id: Option<String>,
    pub assignee_identity_id: Option<String>,
    /// Platform urgency (`high` / `low`).
    pub urgency: Option<String>,
}

/// One entry of an identity's current on-call duties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnCallEntry {
    pub policy_id: String,
    pub policy_name: Option<String>,
    /// Schedule through which the identity is on call; `None` for direct
    /// rule targets.
    pub schedule_id: Option<String>,
    pub schedule_name: Option<String>,
    /// Escalation level (1-based, as reported by the platform).
    pub level: Option<u32>,
}
