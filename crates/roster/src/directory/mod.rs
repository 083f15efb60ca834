//! Access to the remote roster.
//!
//! [`DirectoryClient`] is the seam between the decommissioning engine and the
//! platform. [`IncidentDesk`] and [`AccountDirectory`] add the operations the
//! peripheral actions need.

pub mod pagerduty;

use async_trait::async_trait;
use tracing::warn;

use crate::error::RosterError;
use crate::model::{
    EscalationPolicy, Identity, Incident, NewIdentity, OnCallEntry, Schedule, Team,
};

/// Read/write access to identities, schedules, policies and incidents.
///
/// Writes replace the whole entity; no partial-patch semantics are assumed.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Look up an identity by email (anything containing `@`) or by id.
    async fn lookup_identity(&self, reference: &str) -> Result<Option<Identity>, RosterError>;

    /// Current on-call duties of an identity.
    async fn list_oncall(&self, identity_id: &str) -> Result<Vec<OnCallEntry>, RosterError>;

    /// Read a schedule.
    async fn get_schedule(&self, id: &str) -> Result<Schedule, RosterError>;

    /// Replace a schedule.
    async fn put_schedule(&self, id: &str, schedule: &Schedule) -> Result<(), RosterError>;

    /// Read an escalation policy.
    async fn get_policy(&self, id: &str) -> Result<EscalationPolicy, RosterError>;

    /// Replace an escalation policy.
    async fn put_policy(&self, id: &str, policy: &EscalationPolicy) -> Result<(), RosterError>;

    /// Triggered and acknowledged incidents assigned to an identity.
    async fn list_open_incidents(&self, identity_id: &str) -> Result<Vec<Incident>, RosterError>;

    /// Hand an incident to a policy so the platform picks the responder.
    async fn reassign_incident_to_policy(
        &self,
        incident_id: &str,
        policy_id: &str,
    ) -> Result<(), RosterError>;

    /// Hand an incident to one identity.
    async fn reassign_incident_to_identity(
        &self,
        incident_id: &str,
        identity_id: &str,
    ) -> Result<(), RosterError>;

    /// Delete an identity. Fails with [`RosterError::DeleteConflict`] when the
    /// platform refuses.
    async fn delete_identity(&self, id: &str) -> Result<(), RosterError>;
}

/// Incident status changes.
#[async_trait]
pub trait IncidentDesk: DirectoryClient {
    /// Move a triggered incident to acknowledged.
    async fn acknowledge_incident(&self, incident_id: &str) -> Result<(), RosterError>;

    /// Move an open incident to resolved.
    async fn resolve_incident(&self, incident_id: &str) -> Result<(), RosterError>;
}

/// Account-level lookups and provisioning.
#[async_trait]
pub trait AccountDirectory: DirectoryClient {
    /// Create a new identity.
    async fn create_identity(&self, identity: &NewIdentity) -> Result<Identity, RosterError>;

    /// All teams on the account.
    async fn list_teams(&self) -> Result<Vec<Team>, RosterError>;

    /// Escalation policy of the service named `service_name` (case-insensitive).
    async fn policy_for_service(&self, service_name: &str) -> Result<Option<String>, RosterError>;
}

/// Result of looking up one user reference of a batch.
#[derive(Debug)]
pub struct IdentityLookup {
    pub reference: String,
    /// `Ok(None)` when the platform has no such identity.
    pub result: Result<Option<Identity>, RosterError>,
}

/// Look up every reference in order. A failed lookup is returned next to
/// the others instead of ending the batch.
pub async fn lookup_all<C: DirectoryClient + ?Sized>(
    client: &C,
    references: &[String],
) -> Vec<IdentityLookup> {
    let mut lookups = Vec::with_capacity(references.len());
    for reference in references {
        let result = client.lookup_identity(reference).await;
        if let Err(e) = &result {
            warn!(reference = %reference, error = %e, "Identity lookup failed");
        }
        lookups.push(IdentityLookup {
            reference: reference.clone(),
            result,
        });
    }
    lookups
}

/// Whether a user reference is an email rather than an opaque id.
#[must_use]
pub fn is_email_reference(reference: &str) -> bool {
    reference.contains('@')
}
