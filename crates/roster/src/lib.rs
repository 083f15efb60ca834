//! On-call roster lifecycle automation for PagerDuty.
//!
//! This crate adds, inspects and removes responders on an incident-management
//! platform. Its core is the decommissioning engine: removing a responder
//! must never leave an empty on-call slot or an unattended incident behind.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Decommissioner                           │
//! │  COLLECT → OVERRIDE_SCHEDULES → OVERRIDE_POLICIES →          │
//! │  REASSIGN_INCIDENTS → VERIFY_* → DELETE                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  replacement        schedule_editor   policy_editor          │
//! │  (substitute search) (layer rewrites)  (rule rewrites)       │
//! │                      incidents (policy-level handoff)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  DirectoryClient trait  ◄──  PagerDutyClient (REST API v2)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The editors never perform I/O. Remote entities are read as snapshots,
//! edited through a builder and written back once per entity.
//!
//! ## Example
//!
//! ```ignore
//! use roster::directory::pagerduty::PagerDutyClient;
//! use roster::decommission::{DecommissionOptions, Decommissioner};
//!
//! let client = PagerDutyClient::new(token)?;
//! let identity = client.lookup_identity("leaver@example.com").await?.unwrap();
//!
//! let report = Decommissioner::new(&client, DecommissionOptions::default())
//!     .run(&identity.id)
//!     .await;
//! assert!(report.is_done());
//! ```

pub mod acknowledge;
pub mod config;
pub mod decommission;
pub mod directory;
pub mod enroll;
pub mod error;
pub mod incidents;
pub mod model;
pub mod policy_editor;
pub mod replacement;
pub mod schedule_editor;

pub use config::Config;
pub use decommission::{DecommissionOptions, DecommissionReport, Decommissioner, Stage};
pub use directory::{AccountDirectory, DirectoryClient, IncidentDesk};
pub use error::{EntityKind, RosterError};
pub use model::{
    EscalationPolicy, EscalationRule, Identity, Incident, IncidentStatus, OnCallEntry, Schedule,
    ScheduleLayer, ScheduleLayerAssignment, Target, TargetKind, Team,
};
