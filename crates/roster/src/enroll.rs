//! Adding responders to escalation policies.

use tracing::{debug, info};

use crate::config::Config;
use crate::directory::{AccountDirectory, DirectoryClient};
use crate::error::RosterError;
use crate::model::{Identity, NewIdentity, Target};
use crate::policy_editor::PolicyEdit;

/// Where the policies for an enrollment come from.
#[derive(Debug, Clone, Default)]
pub struct PolicySelection {
    /// Explicit policy ids, in the order given.
    pub policies: Vec<String>,
    /// A single explicit policy id.
    pub policy: Option<String>,
    /// Service whose escalation policy should be used.
    pub service: Option<String>,
}

/// Policy ids for an enrollment, deduplicated in order of appearance.
///
/// Explicit ids come first, then the policy of the service (when it
/// resolved). The configured default is used only when nothing else gave an
/// id.
pub fn resolve_policy_ids(
    selection: &PolicySelection,
    service_policy: Option<&str>,
    config: &Config,
) -> Result<Vec<String>, RosterError> {
    let mut ids: Vec<String> = Vec::new();
    let explicit = selection
        .policies
        .iter()
        .map(String::as_str)
        .chain(selection.policy.as_deref())
        .chain(service_policy);
    for id in explicit {
        if !id.is_empty() && !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }

    if ids.is_empty() {
        if let Some(default) = config.default_policy_id.as_deref().filter(|s| !s.is_empty()) {
            debug!(policy_id = default, "Using default policy from config");
            ids.push(default.to_string());
        }
    }

    if ids.is_empty() {
        return Err(RosterError::NoPolicyResolved);
    }
    Ok(ids)
}

/// Resolve the selection against the platform, then [`resolve_policy_ids`].
pub async fn select_policies<C: AccountDirectory + ?Sized>(
    client: &C,
    selection: &PolicySelection,
    config: &Config,
) -> Result<Vec<String>, RosterError> {
    let service_policy = match selection.service.as_deref() {
        Some(name) => {
            let found = client.policy_for_service(name).await?;
            if found.is_none() {
                info!(service = name, "Service not found or has no escalation policy");
            }
            found
        }
        None => None,
    };
    resolve_policy_ids(selection, service_policy.as_deref(), config)
}

/// Result of [`ensure_identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrollee {
    Existing(Identity),
    Created(Identity),
}

impl Enrollee {
    #[must_use]
    pub fn identity(&self) -> &Identity {
        match self {
            Self::Existing(identity) | Self::Created(identity) => identity,
        }
    }
}

/// Look up `email`, creating the identity when it does not exist yet.
///
/// Creation needs both `display_name` and `role`.
pub async fn ensure_identity<C: AccountDirectory + ?Sized>(
    client: &C,
    config: &Config,
    email: &str,
    display_name: Option<&str>,
    role: Option<&str>,
) -> Result<Enrollee, RosterError> {
    if !config.accepts_email(email) {
        return Err(RosterError::EmailNotAllowed {
            email: email.to_string(),
        });
    }

    if let Some(identity) = client.lookup_identity(email).await? {
        return Ok(Enrollee::Existing(identity));
    }

    let (Some(display_name), Some(role)) = (display_name, role) else {
        return Err(RosterError::MissingIdentityDetails {
            email: email.to_string(),
        });
    };

    let identity = client
        .create_identity(&NewIdentity {
            email: email.to_string(),
            display_name: display_name.to_string(),
            role: role.to_string(),
        })
        .await?;
    Ok(Enrollee::Created(identity))
}

/// Add `identity_id` to rule `rule_index` of `policy_id`.
///
/// Writes the policy only when the target was not already there. Returns
/// whether it was added.
pub async fn enroll_in_policy<C: DirectoryClient + ?Sized>(
    client: &C,
    identity_id: &str,
    policy_id: &str,
    rule_index: usize,
) -> Result<bool, RosterError> {
    let snapshot = client.get_policy(policy_id).await?;
    let mut edit = PolicyEdit::new(&snapshot);
    edit.add_target_at(rule_index, Target::identity(identity_id))?;

    let Some(edited) = edit.finish() else {
        debug!(identity_id, policy_id, "Identity already targeted by rule");
        return Ok(false);
    };

    client.put_policy(policy_id, &edited).await?;
    info!(identity_id, policy_id, rule_index, "Identity added to escalation policy");
    Ok(true)
}
