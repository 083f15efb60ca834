//! PagerDuty REST API v2 client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::models::{
    CreateUser, CreateUserBody, ErrorEnvelope, IncidentResource, IncidentUpdateBody,
    OnCallResource, PolicyEnvelope, PolicyResource, ScheduleEnvelope, ScheduleResource,
    ServiceResource, TeamResource, UserEnvelope, UserResource,
};
use crate::config::Config;
use crate::directory::{is_email_reference, AccountDirectory, DirectoryClient, IncidentDesk};
use crate::error::{EntityKind, RosterError};
use crate::model::{
    EscalationPolicy, Identity, Incident, IncidentStatus, NewIdentity, OnCallEntry, Schedule, Team,
};

/// Base URL for the PagerDuty REST API.
pub const API_BASE_URL: &str = "https://api.pagerduty.com";

/// Accept header selecting API version 2.
const ACCEPT_V2: &str = "application/vnd.pagerduty+json;version=2";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Page size for list endpoints.
const PAGE_LIMIT: usize = 100;

/// PagerDuty directory client.
#[derive(Debug, Clone)]
pub struct PagerDutyClient {
    client: Client,
    base_url: String,
    /// Requester email, sent as `From` on incident mutations.
    from_email: Option<String>,
    /// Time zone for on-call queries.
    time_zone: String,
}

impl PagerDutyClient {
    /// Create a new client with a REST API token.
    ///
    /// # Errors
    /// Returns error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(api_token: &str) -> Result<Self, RosterError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token token={api_token}"))
                .map_err(|_| RosterError::Config("API token is not a valid header value".into()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V2));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        debug!("PagerDuty client initialized");

        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
            from_email: None,
            time_zone: "UTC".to_string(),
        })
    }

    /// Create a client from loaded configuration and a resolved token.
    pub fn from_config(config: &Config, api_token: &str) -> Result<Self, RosterError> {
        let mut client = Self::new(api_token)?.with_time_zone(config.time_zone());
        if let Some(url) = &config.api_url {
            client = client.with_base_url(url);
        }
        if let Some(from) = &config.from_email {
            client = client.with_from_email(from);
        }
        Ok(client)
    }

    /// Point the client at another API host (mock servers, EU region).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the `From` header used for incident mutations.
    #[must_use]
    pub fn with_from_email(mut self, email: impl Into<String>) -> Self {
        self.from_email = Some(email.into());
        self
    }

    /// Set the time zone for on-call queries.
    #[must_use]
    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn with_from(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.from_email {
            Some(from) => request.header("From", from),
            None => request,
        }
    }

    /// GET and decode a JSON body.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RosterError> {
        let url = self.url(path);
        debug!(url = %url, "GET request");

        let response = self.client.get(&url).query(query).send().await?;
        Self::handle_response(response).await
    }

    /// PUT a JSON body, discarding the response body.
    async fn put<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        with_from: bool,
    ) -> Result<(), RosterError> {
        let url = self.url(path);
        debug!(url = %url, "PUT request");

        let mut request = self.client.put(&url).json(body);
        if with_from {
            request = self.with_from(request);
        }
        let response = request.send().await?;
        Self::handle_response::<Value>(response).await.map(|_| ())
    }

    /// Fetch every page of a classic offset-paginated list endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RosterError> {
        let mut items = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut page_query = query.to_vec();
            page_query.push(("limit", PAGE_LIMIT.to_string()));
            page_query.push(("offset", offset.to_string()));

            let mut page: Value = self.get(path, &page_query).await?;
            let batch: Vec<T> = match page.get_mut(key) {
                Some(value) => serde_json::from_value(value.take())?,
                None => Vec::new(),
            };
            let more = page.get("more").and_then(Value::as_bool).unwrap_or(false);

            let fetched = batch.len();
            items.extend(batch);
            if !more || fetched == 0 {
                break;
            }
            offset += fetched;
        }

        debug!(path, count = items.len(), "Fetched paginated list");
        Ok(items)
    }

    /// Handle API response, parsing JSON or error.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RosterError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let body = if text.trim().is_empty() { "null" } else { &text };
            serde_json::from_str(body).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                RosterError::Serialization(e)
            })
        } else {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.describe())
                .unwrap_or(text);
            Err(RosterError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Map a 404 API error to [`RosterError::NotFound`] for the given entity.
fn not_found_as(entity: EntityKind, id: &str) -> impl FnOnce(RosterError) -> RosterError + '_ {
    move |err| match err {
        RosterError::Api { status: 404, .. } => RosterError::not_found(entity, id),
        other => other,
    }
}

#[async_trait]
impl DirectoryClient for PagerDutyClient {
    #[instrument(skip(self))]
    async fn lookup_identity(&self, reference: &str) -> Result<Option<Identity>, RosterError> {
        if is_email_reference(reference) {
            let users: Vec<UserResource> = self
                .get_all("/users", "users", &[("query", reference.to_string())])
                .await?;
            return Ok(users
                .into_iter()
                .find(|u| u.email.eq_ignore_ascii_case(reference))
                .map(Identity::from));
        }

        match self
            .get::<UserEnvelope>(&format!("/users/{reference}"), &[])
            .await
        {
            Ok(envelope) => Ok(Some(envelope.user.into())),
            Err(RosterError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn list_oncall(&self, identity_id: &str) -> Result<Vec<OnCallEntry>, RosterError> {
        let oncalls: Vec<OnCallResource> = self
            .get_all(
                "/oncalls",
                "oncalls",
                &[
                    ("user_ids[]", identity_id.to_string()),
                    ("time_zone", self.time_zone.clone()),
                ],
            )
            .await?;
        Ok(oncalls.into_iter().map(OnCallEntry::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_schedule(&self, id: &str) -> Result<Schedule, RosterError> {
        let envelope: ScheduleEnvelope = self
            .get(&format!("/schedules/{id}"), &[])
            .await
            .map_err(not_found_as(EntityKind::Schedule, id))?;
        Ok(envelope.schedule.into_schedule(id))
    }

    #[instrument(skip(self, schedule))]
    async fn put_schedule(&self, id: &str, schedule: &Schedule) -> Result<(), RosterError> {
        let body = ScheduleEnvelope {
            schedule: ScheduleResource::from(schedule),
        };
        self.put(&format!("/schedules/{id}"), &body, false)
            .await
            .map_err(not_found_as(EntityKind::Schedule, id))?;
        info!(schedule_id = %id, "Schedule updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_policy(&self, id: &str) -> Result<EscalationPolicy, RosterError> {
        let envelope: PolicyEnvelope = self
            .get(&format!("/escalation_policies/{id}"), &[])
            .await
            .map_err(not_found_as(EntityKind::Policy, id))?;
        Ok(envelope.escalation_policy.into_policy(id))
    }

    #[instrument(skip(self, policy))]
    async fn put_policy(&self, id: &str, policy: &EscalationPolicy) -> Result<(), RosterError> {
        let body = PolicyEnvelope {
            escalation_policy: PolicyResource::from(policy),
        };
        self.put(&format!("/escalation_policies/{id}"), &body, false)
            .await
            .map_err(not_found_as(EntityKind::Policy, id))?;
        info!(policy_id = %id, "Escalation policy updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_open_incidents(&self, identity_id: &str) -> Result<Vec<Incident>, RosterError> {
        let incidents: Vec<IncidentResource> = self
            .get_all(
                "/incidents",
                "incidents",
                &[
                    ("user_ids[]", identity_id.to_string()),
                    ("statuses[]", IncidentStatus::Triggered.to_string()),
                    ("statuses[]", IncidentStatus::Acknowledged.to_string()),
                    // without it the API only returns recent incidents
                    ("date_range", "all".to_string()),
                ],
            )
            .await?;
        Ok(incidents
            .into_iter()
            .map(Incident::from)
            .filter(|i| i.status.is_open())
            .collect())
    }

    #[instrument(skip(self))]
    async fn reassign_incident_to_policy(
        &self,
        incident_id: &str,
        policy_id: &str,
    ) -> Result<(), RosterError> {
        self.put(
            &format!("/incidents/{incident_id}"),
            &IncidentUpdateBody::to_policy(policy_id),
            true,
        )
        .await
        .map_err(not_found_as(EntityKind::Incident, incident_id))?;
        info!(incident_id, policy_id, "Incident handed to escalation policy");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reassign_incident_to_identity(
        &self,
        incident_id: &str,
        identity_id: &str,
    ) -> Result<(), RosterError> {
        self.put(
            &format!("/incidents/{incident_id}"),
            &IncidentUpdateBody::to_identity(identity_id),
            true,
        )
        .await
        .map_err(not_found_as(EntityKind::Incident, incident_id))?;
        info!(incident_id, identity_id, "Incident assigned to identity");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_identity(&self, id: &str) -> Result<(), RosterError> {
        let url = self.url(&format!("/users/{id}"));
        debug!(url = %url, "DELETE request");

        let response = self.client.delete(&url).send().await?;
        match Self::handle_response::<Value>(response).await {
            Ok(_) => {
                info!(identity_id = %id, "Identity deleted");
                Ok(())
            }
            Err(RosterError::Api { status: 404, .. }) => {
                Err(RosterError::not_found(EntityKind::Identity, id))
            }
            Err(RosterError::Api { status, message })
                if status == StatusCode::BAD_REQUEST.as_u16()
                    || status == StatusCode::CONFLICT.as_u16() =>
            {
                Err(RosterError::DeleteConflict {
                    id: id.to_string(),
                    reason: message,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl IncidentDesk for PagerDutyClient {
    #[instrument(skip(self))]
    async fn acknowledge_incident(&self, incident_id: &str) -> Result<(), RosterError> {
        self.put(
            &format!("/incidents/{incident_id}"),
            &IncidentUpdateBody::status(IncidentStatus::Acknowledged),
            true,
        )
        .await
        .map_err(not_found_as(EntityKind::Incident, incident_id))
    }

    #[instrument(skip(self))]
    async fn resolve_incident(&self, incident_id: &str) -> Result<(), RosterError> {
        self.put(
            &format!("/incidents/{incident_id}"),
            &IncidentUpdateBody::status(IncidentStatus::Resolved),
            true,
        )
        .await
        .map_err(not_found_as(EntityKind::Incident, incident_id))
    }
}

#[async_trait]
impl AccountDirectory for PagerDutyClient {
    #[instrument(skip(self, identity), fields(email = %identity.email))]
    async fn create_identity(&self, identity: &NewIdentity) -> Result<Identity, RosterError> {
        let body = CreateUserBody {
            user: CreateUser {
                resource_type: "user",
                name: &identity.display_name,
                email: &identity.email,
                role: &identity.role,
            },
        };

        let url = self.url("/users");
        debug!(url = %url, "POST request");
        let response = self.with_from(self.client.post(&url).json(&body)).send().await?;
        let envelope: UserEnvelope = Self::handle_response(response).await?;

        info!(identity_id = %envelope.user.id, "Identity created");
        Ok(envelope.user.into())
    }

    async fn list_teams(&self) -> Result<Vec<Team>, RosterError> {
        let teams: Vec<TeamResource> = self.get_all("/teams", "teams", &[]).await?;
        Ok(teams.into_iter().map(Team::from).collect())
    }

    #[instrument(skip(self))]
    async fn policy_for_service(&self, service_name: &str) -> Result<Option<String>, RosterError> {
        let services: Vec<ServiceResource> = self
            .get_all("/services", "services", &[("query", service_name.to_string())])
            .await?;
        Ok(services
            .into_iter()
            .find(|s| s.matches_name(service_name))
            .and_then(|s| s.escalation_policy)
            .map(|p| p.id))
    }
}
