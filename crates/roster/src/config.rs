//! Configuration for the roster tool.
//!
//! Settings come from an optional `config.yaml` in the working directory,
//! overridden by environment variables and command-line arguments.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RosterError;

/// Environment variable holding the REST API token.
pub const ENV_API_TOKEN: &str = "PAGERDUTY_API_TOKEN";

/// Environment variable overriding the API base URL.
pub const ENV_API_URL: &str = "PAGERDUTY_API_URL";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Time zone used for on-call queries when none is configured.
const DEFAULT_TIME_ZONE: &str = "UTC";

/// Roster tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// REST API token. Prefer the environment variable.
    #[serde(default)]
    pub pagerduty_api_token: Option<String>,
    /// Policy used by `add` when none is given on the command line.
    #[serde(default)]
    pub default_policy_id: Option<String>,
    /// When set, `add` only accepts emails in this domain (e.g. `example.com`).
    #[serde(default)]
    pub allowed_email_domain: Option<String>,
    /// Requester email sent as `From` on incident and user mutations.
    #[serde(default)]
    pub from_email: Option<String>,
    /// Time zone for on-call queries.
    #[serde(default)]
    pub time_zone: Option<String>,
    /// API base URL override.
    #[serde(default)]
    pub api_url: Option<String>,
}

impl Config {
    /// Load `path`, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let parsed: Option<Self> = serde_yaml::from_str(&text)?;
            debug!(path = %path.display(), "Loaded config file");
            parsed.unwrap_or_default()
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        if let Some(url) = env::var(ENV_API_URL).ok().filter(|s| !s.is_empty()) {
            config.api_url = Some(url);
        }
        Ok(config)
    }

    /// Time zone for on-call queries.
    #[must_use]
    pub fn time_zone(&self) -> &str {
        self.time_zone.as_deref().unwrap_or(DEFAULT_TIME_ZONE)
    }

    /// Resolve the API token: argument, then environment (unless
    /// `use_env` is false), then config file.
    pub fn resolve_token(&self, arg: Option<&str>, use_env: bool) -> Result<String, RosterError> {
        let from_env = if use_env {
            env::var(ENV_API_TOKEN).ok()
        } else {
            None
        };
        self.resolve_token_from(arg, from_env)
    }

    fn resolve_token_from(
        &self,
        arg: Option<&str>,
        from_env: Option<String>,
    ) -> Result<String, RosterError> {
        arg.map(str::to_string)
            .into_iter()
            .chain(from_env)
            .chain(self.pagerduty_api_token.clone())
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())
            .ok_or(RosterError::MissingCredential)
    }

    /// Whether `email` is acceptable for new identities.
    #[must_use]
    pub fn accepts_email(&self, email: &str) -> bool {
        let Some((local, domain)) = email.rsplit_once('@') else {
            return false;
        };
        if local.is_empty() {
            return false;
        }
        match &self.allowed_email_domain {
            Some(allowed) => domain.eq_ignore_ascii_case(allowed.trim_start_matches('@')),
            None => !domain.is_empty(),
        }
    }
}
