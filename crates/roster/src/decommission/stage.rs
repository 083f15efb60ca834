//! Decommission stages and transitions.

use serde::{Deserialize, Serialize};

/// Canonical decommission stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Gather schedules and policies referencing the identity
    Collect,
    /// Backfill schedule layers
    OverrideSchedules,
    /// Backfill escalation rules
    OverridePolicies,
    /// Hand open incidents back to their policies
    ReassignIncidents,
    /// Re-read schedules, identity must be gone
    VerifySchedules,
    /// Re-read policies, identity must be gone
    VerifyPolicies,
    /// Re-list open incidents, none may remain
    VerifyIncidents,
    /// Delete the identity
    Delete,
    /// Identity deleted
    Done,
    /// Stopped before deletion
    Aborted,
}

impl Stage {
    /// Check if this is a terminal stage.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Check if this stage is one of the verification gates.
    #[must_use]
    pub fn is_verification(&self) -> bool {
        matches!(
            self,
            Self::VerifySchedules | Self::VerifyPolicies | Self::VerifyIncidents
        )
    }

    /// Get the next stage on the success path.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Collect => Some(Self::OverrideSchedules),
            Self::OverrideSchedules => Some(Self::OverridePolicies),
            Self::OverridePolicies => Some(Self::ReassignIncidents),
            Self::ReassignIncidents => Some(Self::VerifySchedules),
            Self::VerifySchedules => Some(Self::VerifyPolicies),
            Self::VerifyPolicies => Some(Self::VerifyIncidents),
            Self::VerifyIncidents => Some(Self::Delete),
            Self::Delete => Some(Self::Done),
            Self::Done | Self::Aborted => None,
        }
    }

    /// Get the display name for this stage.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Collect => "COLLECT",
            Self::OverrideSchedules => "OVERRIDE_SCHEDULES",
            Self::OverridePolicies => "OVERRIDE_POLICIES",
            Self::ReassignIncidents => "REASSIGN_INCIDENTS",
            Self::VerifySchedules => "VERIFY_SCHEDULES",
            Self::VerifyPolicies => "VERIFY_POLICIES",
            Self::VerifyIncidents => "VERIFY_INCIDENTS",
            Self::Delete => "DELETE",
            Self::Done => "DONE",
            Self::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
