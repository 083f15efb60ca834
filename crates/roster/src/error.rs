//! Error types for roster operations.

use std::fmt;

use thiserror::Error;

/// Kind of remote entity an error or outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Identity,
    Schedule,
    Policy,
    Incident,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identity => "identity",
            Self::Schedule => "schedule",
            Self::Policy => "escalation policy",
            Self::Incident => "incident",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during roster operations.
#[derive(Debug, Error)]
pub enum RosterError {
    /// Identity, schedule, policy or incident is absent on the platform.
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    /// No substitute could be found for a slot held by the departing identity.
    #[error("no safe replacement in {entity} {id}")]
    NoSafeReplacement { entity: EntityKind, id: String },

    /// A post-override scan still found the departing identity.
    #[error("verification failed at {stage}: identity still referenced by {entity} {id}")]
    VerificationFailed {
        stage: String,
        entity: EntityKind,
        id: String,
    },

    /// A write failed twice, the second time against freshly read state.
    #[error("write to {entity} {id} failed after retry: {reason}")]
    RemoteWriteConflict {
        entity: EntityKind,
        id: String,
        reason: String,
    },

    /// An incident could not be handed off.
    #[error("could not reassign incident {incident_id}: {reason}")]
    IncidentReassignmentFailed { incident_id: String, reason: String },

    /// The platform refused to delete the identity.
    #[error("platform refused to delete identity {id}: {reason}")]
    DeleteConflict { id: String, reason: String },

    /// No escalation policy was named, derivable from a service, or configured.
    #[error("no escalation policy given and no default_policy_id configured")]
    NoPolicyResolved,

    /// A new identity was requested without a name or role.
    #[error("new identity {email} needs a display name and a role")]
    MissingIdentityDetails { email: String },

    /// The email is malformed or outside the allowed domain.
    #[error("email {email} is not accepted for new identities")]
    EmailNotAllowed { email: String },

    /// An explicit rule index does not exist on the policy.
    #[error("policy {policy_id} has {rule_count} rules, index {index} is out of range")]
    RuleIndexOutOfRange {
        policy_id: String,
        index: usize,
        rule_count: usize,
    },

    /// The API token could not be resolved.
    #[error("PagerDuty API token missing (argument, environment variable, or config.yaml)")]
    MissingCredential,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file could not be parsed.
    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Config file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RosterError {
    /// Shorthand for [`RosterError::NotFound`].
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether the error means the entity does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
