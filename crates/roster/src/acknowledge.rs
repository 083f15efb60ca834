//! Incident acknowledge loop and batch resolution.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::directory::IncidentDesk;
use crate::error::RosterError;
use crate::model::{Incident, IncidentStatus};

/// Default polling interval of the acknowledge loop.
pub const DEFAULT_ACK_INTERVAL: Duration = Duration::from_secs(10);

/// Acknowledges triggered incidents of one identity as they arrive.
pub struct AckLoop<'a, C: IncidentDesk + ?Sized> {
    client: &'a C,
    identity_id: String,
    interval: Duration,
    acknowledged: HashSet<String>,
}

impl<'a, C: IncidentDesk + ?Sized> AckLoop<'a, C> {
    #[must_use]
    pub fn new(client: &'a C, identity_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            client,
            identity_id: identity_id.into(),
            interval,
            acknowledged: HashSet::new(),
        }
    }

    /// Incidents acknowledged by this loop that are still open.
    #[must_use]
    pub fn acknowledged(&self) -> &HashSet<String> {
        &self.acknowledged
    }

    /// One poll: acknowledge every triggered incident not acknowledged
    /// before. Returns the incidents acknowledged in this cycle.
    ///
    /// A failed acknowledgement is logged and retried on the next cycle.
    pub async fn poll_once(&mut self) -> Result<Vec<Incident>, RosterError> {
        let incidents = self.client.list_open_incidents(&self.identity_id).await?;
        // track only incidents that are still open
        self.acknowledged
            .retain(|id| incidents.iter().any(|incident| &incident.id == id));
        let mut newly = Vec::new();

        for incident in incidents {
            if !incident.status.can_transition_to(IncidentStatus::Acknowledged)
                || self.acknowledged.contains(&incident.id)
            {
                continue;
            }
            match self.client.acknowledge_incident(&incident.id).await {
                Ok(()) => {
                    info!(incident_id = %incident.id, title = %incident.title, "Acknowledged incident");
                    self.acknowledged.insert(incident.id.clone());
                    newly.push(incident);
                }
                Err(e) => {
                    warn!(incident_id = %incident.id, error = %e, "Failed to acknowledge incident");
                }
            }
        }
        Ok(newly)
    }

    /// Poll until `cancel` fires.
    ///
    /// Cancellation is checked before every poll and interrupts the sleep
    /// between polls. `on_ack` sees each acknowledged incident once.
    pub async fn run(&mut self, cancel: &CancellationToken, mut on_ack: impl FnMut(&Incident)) {
        info!(
            identity_id = %self.identity_id,
            interval_secs = self.interval.as_secs(),
            "Starting acknowledge loop"
        );

        while !cancel.is_cancelled() {
            match self.poll_once().await {
                Ok(acked) => acked.iter().for_each(&mut on_ack),
                Err(e) => warn!(identity_id = %self.identity_id, error = %e, "Incident poll failed"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(
            identity_id = %self.identity_id,
            acknowledged = self.acknowledged.len(),
            "Acknowledge loop stopped"
        );
    }
}

/// Outcome of resolving one incident.
#[derive(Debug)]
pub struct ResolveOutcome {
    pub incident: Incident,
    pub result: Result<(), RosterError>,
}

/// Resolve every open incident of `identity_id`, optionally only those of
/// one `urgency`. Failures are reported per incident.
pub async fn resolve_incidents<C: IncidentDesk + ?Sized>(
    client: &C,
    identity_id: &str,
    urgency: Option<&str>,
) -> Result<Vec<ResolveOutcome>, RosterError> {
    let incidents = client.list_open_incidents(identity_id).await?;
    let mut outcomes = Vec::new();

    for incident in incidents {
        if !incident.status.can_transition_to(IncidentStatus::Resolved)
            || !matches_urgency(&incident, urgency)
        {
            debug!(incident_id = %incident.id, "Skipping incident");
            continue;
        }
        let result = client.resolve_incident(&incident.id).await;
        if let Err(e) = &result {
            warn!(incident_id = %incident.id, error = %e, "Failed to resolve incident");
        }
        outcomes.push(ResolveOutcome { incident, result });
    }
    Ok(outcomes)
}

fn matches_urgency(incident: &Incident, urgency: Option<&str>) -> bool {
    match urgency {
        None => true,
        Some(wanted) => incident
            .urgency
            .as_deref()
            .is_some_and(|u| u.eq_ignore_ascii_case(wanted)),
    }
}
