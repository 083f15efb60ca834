//! PagerDuty REST API v2 directory.
//!
//! Implements [`DirectoryClient`](super::DirectoryClient),
//! [`IncidentDesk`](super::IncidentDesk) and
//! [`AccountDirectory`](super::AccountDirectory).
//!
//! ## Example
//!
//! ```ignore
//! use roster::directory::pagerduty::PagerDutyClient;
//! use roster::DirectoryClient;
//!
//! let client = PagerDutyClient::new(token)?.with_from_email("ops@example.com");
//! let oncall = client.list_oncall("PABC123").await?;
//! ```
//!
//! # Configuration
//!
//! - `PAGERDUTY_API_TOKEN`: REST API token
//! - `PAGERDUTY_API_URL`: API base URL (default: `https://api.pagerduty.com`)

mod client;
mod models;

pub use client::PagerDutyClient;
