//! Roster CLI - add, inspect and remove PagerDuty responders.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roster::acknowledge::{resolve_incidents, AckLoop, DEFAULT_ACK_INTERVAL};
use roster::config::DEFAULT_CONFIG_FILE;
use roster::decommission::{DecommissionReport, OutcomeDetail};
use roster::directory::pagerduty::PagerDutyClient;
use roster::directory::lookup_all;
use roster::enroll::{enroll_in_policy, ensure_identity, select_policies, Enrollee, PolicySelection};
use roster::{
    AccountDirectory, Config, DecommissionOptions, Decommissioner, DirectoryClient, Identity,
    RosterError,
};

/// Roster CLI - PagerDuty responder lifecycle.
#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "Add, inspect and safely remove PagerDuty responders")]
struct Cli {
    /// PagerDuty API token. Prefer the `PAGERDUTY_API_TOKEN` env var.
    #[arg(long, global = true)]
    pagerduty_api_token: Option<String>,

    /// Do not read the token from the environment.
    #[arg(long, global = true, default_value = "false")]
    no_env: bool,

    /// Config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show identity details, teams, on-call duties and open incidents.
    GetInfo {
        /// User emails or ids.
        #[arg(long, required = true, num_args = 1..)]
        user: Vec<String>,
    },

    /// Add users to escalation policies, creating them when missing.
    Add {
        /// User emails.
        #[arg(long, required = true, num_args = 1..)]
        user: Vec<String>,

        /// Full names for new users, matched to `--user` by position.
        #[arg(long, num_args = 1..)]
        user_name: Vec<String>,

        /// Roles (`user`, `limited_user`, `responder`, `manager`, ...) for
        /// new users, matched to `--user` by position.
        #[arg(long, num_args = 1..)]
        user_role: Vec<String>,

        /// Escalation policy id.
        #[arg(long)]
        policy: Option<String>,

        /// Escalation policy ids.
        #[arg(long, num_args = 1..)]
        policies: Vec<String>,

        /// Service whose escalation policy to use.
        #[arg(long)]
        service: Option<String>,

        /// Escalation rule to add the user to (0 is notified first).
        #[arg(long, default_value = "0")]
        rule_index: usize,
    },

    /// Backfill, hand off incidents, verify, then delete users.
    Remove {
        /// User emails or ids.
        #[arg(long, required = true, num_args = 1..)]
        user: Vec<String>,

        /// Remove users from slots with no substitute, if others remain.
        #[arg(long, default_value = "false")]
        drop_coverage: bool,

        /// User ids never to pick as substitutes (comma-separated).
        #[arg(long, value_delimiter = ',')]
        avoid: Vec<String>,
    },

    /// Keep acknowledging triggered incidents until Ctrl-C.
    Ack {
        /// User emails or ids.
        #[arg(long, required = true, num_args = 1..)]
        user: Vec<String>,

        /// Polling interval in seconds.
        #[arg(long, default_value_t = DEFAULT_ACK_INTERVAL.as_secs())]
        interval: u64,
    },

    /// Resolve open incidents once.
    Resolve {
        /// User emails or ids.
        #[arg(long, required = true, num_args = 1..)]
        user: Vec<String>,

        /// Only incidents of this urgency (`high` or `low`).
        #[arg(long)]
        urgency: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Resolve credentials before touching the network
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let token = config.resolve_token(cli.pagerduty_api_token.as_deref(), !cli.no_env)?;
    let client =
        PagerDutyClient::from_config(&config, &token).context("Failed to create PagerDuty client")?;

    // Per-user problems are reported and counted; the batch goes on.
    let mut failures = 0usize;

    match cli.command {
        Commands::GetInfo { user } => {
            let (identities, missing) = resolve_users(&client, &user).await;
            failures += missing;
            for identity in &identities {
                if let Err(e) = print_identity(&client, identity).await {
                    println!("❌ {}: {e:#}", identity.email);
                    failures += 1;
                }
            }
        }

        Commands::Add {
            user,
            user_name,
            user_role,
            policy,
            policies,
            service,
            rule_index,
        } => {
            let selection = PolicySelection {
                policies,
                policy,
                service,
            };
            let policy_ids = match select_policies(&client, &selection, &config).await {
                Ok(ids) => ids,
                Err(RosterError::NoPolicyResolved) => {
                    println!("❌ {}", RosterError::NoPolicyResolved);
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e).context("Failed to resolve escalation policies"),
            };

            for (index, email) in user.iter().enumerate() {
                if let Err(e) = add_user(
                    &client,
                    &config,
                    email,
                    user_name.get(index).map(String::as_str),
                    user_role.get(index).map(String::as_str),
                    &policy_ids,
                    rule_index,
                )
                .await
                {
                    println!("❌ {email}: {e}");
                    failures += 1;
                }
            }
        }

        Commands::Remove {
            user,
            drop_coverage,
            avoid,
        } => {
            let (identities, missing) = resolve_users(&client, &user).await;
            failures += missing;
            // others leaving in the same batch are never substitutes
            let extra_avoid = identities
                .iter()
                .map(|i| i.id.clone())
                .chain(avoid)
                .collect();
            let decommissioner = Decommissioner::new(
                &client,
                DecommissionOptions {
                    drop_coverage,
                    extra_avoid,
                },
            );

            let mut aborted = 0;
            for identity in &identities {
                println!(
                    "\n🔻 Decommissioning {} ({}, {})",
                    identity.display_name.bold(),
                    identity.email,
                    identity.id
                );
                let report = decommissioner.run(&identity.id).await;
                print_report(&report);
                if !report.is_done() {
                    aborted += 1;
                }
            }

            if aborted > 0 {
                println!(
                    "\n{}",
                    format!("{aborted} decommission(s) aborted; those users were not deleted")
                        .red()
                );
            }
            failures += aborted;
        }

        Commands::Ack { user, interval } => {
            let (identities, missing) = resolve_users(&client, &user).await;
            failures += missing;
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C, stopping");
                ctrl_c.cancel();
            });

            let loops = identities.iter().map(|identity| {
                let cancel = &cancel;
                let client = &client;
                async move {
                    println!(
                        "👀 Monitoring incidents for {} ({})",
                        identity.display_name, identity.email
                    );
                    let mut ack =
                        AckLoop::new(client, identity.id.as_str(), Duration::from_secs(interval));
                    ack.run(cancel, |incident| {
                        println!("✅ Acknowledged {} ({})", incident.id, incident.title);
                    })
                    .await;
                }
            });
            futures::future::join_all(loops).await;
        }

        Commands::Resolve { user, urgency } => {
            let (identities, missing) = resolve_users(&client, &user).await;
            failures += missing;
            for identity in &identities {
                let outcomes =
                    match resolve_incidents(&client, &identity.id, urgency.as_deref()).await {
                        Ok(outcomes) => outcomes,
                        Err(e) => {
                            println!("❌ Failed to list incidents for {}: {e}", identity.email);
                            failures += 1;
                            continue;
                        }
                    };
                if outcomes.is_empty() {
                    println!("No matching incidents for {}.", identity.email);
                }
                for outcome in outcomes {
                    match outcome.result {
                        Ok(()) => println!(
                            "✅ Resolved {} ({})",
                            outcome.incident.id, outcome.incident.title
                        ),
                        Err(e) => {
                            println!("❌ Failed to resolve {}: {e}", outcome.incident.id);
                            failures += 1;
                        }
                    }
                }
            }
        }
    }

    if failures > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Look up every reference. Returns the identities found and the number of
/// references that were missing or failed, each reported on the console.
async fn resolve_users(client: &PagerDutyClient, references: &[String]) -> (Vec<Identity>, usize) {
    let mut identities = Vec::new();
    let mut failed = 0;
    for lookup in lookup_all(client, references).await {
        match lookup.result {
            Ok(Some(identity)) => identities.push(identity),
            Ok(None) => {
                println!("❌ User not found: {}", lookup.reference);
                failed += 1;
            }
            Err(e) => {
                println!("❌ Failed to look up {}: {e}", lookup.reference);
                failed += 1;
            }
        }
    }
    (identities, failed)
}

async fn add_user(
    client: &PagerDutyClient,
    config: &Config,
    email: &str,
    user_name: Option<&str>,
    user_role: Option<&str>,
    policy_ids: &[String],
    rule_index: usize,
) -> Result<(), RosterError> {
    let enrollee = ensure_identity(client, config, email, user_name, user_role).await?;
    match &enrollee {
        Enrollee::Created(identity) => println!("🆕 User created: {}", identity.display_name),
        Enrollee::Existing(identity) => println!("👤 User found: {}", identity.display_name),
    }

    let identity = enrollee.identity();
    for policy_id in policy_ids {
        if enroll_in_policy(client, &identity.id, policy_id, rule_index).await? {
            println!("✅ Added {email} to policy {policy_id} at rule {rule_index}");
        } else {
            println!("ℹ️  {email} already in policy {policy_id} at rule {rule_index}");
        }
    }
    Ok(())
}

async fn print_identity(client: &PagerDutyClient, identity: &Identity) -> Result<()> {
    println!("\n👤 User Details");
    println!("{}", "=".repeat(60));
    println!("   Name     : {}", identity.display_name.bold());
    println!("   Email    : {}", identity.email);
    println!("   ID       : {}", identity.id);
    println!("   Base Role: {}", identity.role);

    if identity.team_refs.is_empty() {
        println!("   Teams    : (none)");
    } else {
        let teams = client.list_teams().await.context("Failed to list teams")?;
        let names: Vec<&str> = identity
            .team_refs
            .iter()
            .map(|id| {
                teams
                    .iter()
                    .find(|t| &t.id == id)
                    .map_or(id.as_str(), |t| t.name.as_str())
            })
            .collect();
        println!("   Teams    : {}", names.join(", "));
    }

    println!("\n📟 Current on-call");
    let oncalls = client.list_oncall(&identity.id).await?;
    if oncalls.is_empty() {
        println!("   ❌ Not on call in any escalation policy or schedule");
    }
    for entry in oncalls {
        let level = entry.level.map_or_else(String::new, |l| format!(" (level {l})"));
        println!(
            "   ✅ {} - {}{}",
            entry.policy_name.as_deref().unwrap_or(&entry.policy_id),
            entry
                .schedule_name
                .as_deref()
                .or(entry.schedule_id.as_deref())
                .unwrap_or("direct"),
            level
        );
    }

    println!("\n🚨 Open incidents");
    let incidents = client.list_open_incidents(&identity.id).await?;
    if incidents.is_empty() {
        println!("   (none)");
    }
    for incident in incidents {
        println!("   - [{}] {} ({})", incident.status, incident.title, incident.id);
    }
    Ok(())
}

fn print_report(report: &DecommissionReport) {
    for outcome in &report.outcomes {
        let line = match &outcome.detail {
            OutcomeDetail::Collected => continue,
            OutcomeDetail::LayerReplaced { layer, replacement } => {
                format!("layer {layer}: replaced by {replacement}")
            }
            OutcomeDetail::LayerDropped { layer } => format!("layer {layer}: dropped"),
            OutcomeDetail::RuleTargetRemoved { rule, covered_by } => {
                format!("rule {rule}: removed, covered by {}", covered_by.id)
            }
            OutcomeDetail::RuleTargetDropped { rule } => format!("rule {rule}: dropped"),
            OutcomeDetail::Saved => "saved".to_string(),
            OutcomeDetail::Unchanged => "unchanged".to_string(),
            OutcomeDetail::HandedOff { policy_id } => format!("handed to policy {policy_id}"),
            OutcomeDetail::Clean => "clean".to_string(),
            OutcomeDetail::Deleted => "deleted".to_string(),
            OutcomeDetail::Failed(e) => {
                println!(
                    "   {} [{}] {} {}: {}",
                    "✗".red(),
                    outcome.stage,
                    outcome.entity,
                    outcome.id,
                    e.to_string().red()
                );
                continue;
            }
        };
        println!(
            "   {} [{}] {} {}: {}",
            "✓".green(),
            outcome.stage.to_string().bright_black(),
            outcome.entity,
            outcome.id,
            line
        );
    }

    if report.is_done() {
        println!("{} {}", "✓".green().bold(), "User deleted".green());
    } else {
        let stage = report
            .aborted_at
            .map_or_else(|| "?".to_string(), |s| s.to_string());
        let reason = report
            .failure()
            .map_or_else(String::new, |e| format!(": {e}"));
        println!(
            "{} {}",
            "⚠".yellow().bold(),
            format!("Aborted at {stage}, user kept{reason}").yellow()
        );
        for (entity, id) in report.unsafe_slots() {
            println!("   {} {entity} {id} needs a substitute picked by hand", "→".yellow());
        }
    }
}
