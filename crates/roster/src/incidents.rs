//! Moving in-flight incidents off a departing identity.
//!
//! Incidents are handed back to their escalation policy rather than to a
//! specific person. The platform's own rotation then picks the next
//! responder, and keeps escalating if that responder is unavailable too.

use tracing::{info, warn};

use crate::directory::DirectoryClient;
use crate::error::RosterError;
use crate::model::Incident;

/// Result of a successful handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// The incident now sits with its escalation policy.
    ReassignedToPolicy { policy_id: String },
    /// Resolved in the meantime; nothing to do.
    AlreadyResolved,
}

/// Hands incidents back to their escalation policies.
pub struct IncidentReassigner<'a, C: DirectoryClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: DirectoryClient + ?Sized> IncidentReassigner<'a, C> {
    #[must_use]
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Hand `incident` off `departing_id`.
    ///
    /// Fails with [`RosterError::IncidentReassignmentFailed`] when the
    /// incident has no escalation policy or the platform rejects the move.
    pub async fn handoff(
        &self,
        incident: &Incident,
        departing_id: &str,
    ) -> Result<HandoffOutcome, RosterError> {
        if !incident.status.is_open() {
            return Ok(HandoffOutcome::AlreadyResolved);
        }

        let Some(policy_id) = incident.assigned_policy_id.as_deref() else {
            warn!(
                incident_id = %incident.id,
                identity_id = %departing_id,
                "Incident has no escalation policy, cannot hand off"
            );
            return Err(RosterError::IncidentReassignmentFailed {
                incident_id: incident.id.clone(),
                reason: "no escalation policy resolvable".to_string(),
            });
        };

        self.client
            .reassign_incident_to_policy(&incident.id, policy_id)
            .await
            .map_err(|e| RosterError::IncidentReassignmentFailed {
                incident_id: incident.id.clone(),
                reason: e.to_string(),
            })?;

        info!(
            incident_id = %incident.id,
            policy_id,
            identity_id = %departing_id,
            "Incident handed back to escalation policy"
        );
        Ok(HandoffOutcome::ReassignedToPolicy {
            policy_id: policy_id.to_string(),
        })
    }
}
