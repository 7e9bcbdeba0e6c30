mod config;
mod database;
mod incidents;
mod monitoring;
mod notifier;
mod orchestrator;
mod pool;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::database::models::{IncidentQuery, IncidentStatus, Monitor};
use crate::monitoring::types::{HttpMethod, ProbeTarget};
use crate::monitoring::validation::validate_monitor;
use crate::orchestrator::Orchestrator;

/// apimon - periodic HTTP endpoint monitoring with incident alerts
#[derive(Parser)]
#[command(name = "apimon")]
#[command(version, about)]
struct Cli {
    /// Path to the config file (defaults to $XDG_CONFIG_HOME/apimon/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitoring scheduler until Ctrl-C (default)
    Run,

    /// Run one check cycle over all active monitors and exit
    Cycle,

    /// Check one monitor right now
    Check {
        monitor: Uuid,
    },

    /// Register a new monitor
    Add {
        /// Display name
        name: String,

        /// Endpoint to probe
        url: String,

        #[arg(long, default_value = "GET")]
        method: HttpMethod,

        /// Request header as `Name: value`, repeatable
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Check interval in minutes
        #[arg(long, default_value_t = 5)]
        interval: u32,

        #[arg(long, default_value_t = 200)]
        expected_status: u16,

        /// Owning user, a random id when omitted
        #[arg(long)]
        owner: Option<Uuid>,

        /// Also alert on Slack
        #[arg(long)]
        slack: bool,

        /// Do not alert by email
        #[arg(long)]
        no_email: bool,
    },

    /// List every monitor with its status and uptime
    List,

    /// Change the configuration of a monitor
    Update {
        monitor: Uuid,

        #[command(flatten)]
        edit: MonitorEdit,
    },

    /// Delete a monitor and all of its incidents
    Delete {
        monitor: Uuid,
    },

    /// Stop checking a monitor
    Pause {
        monitor: Uuid,
    },

    /// Resume checking a paused monitor
    Resume {
        monitor: Uuid,
    },

    /// Acknowledge an open incident
    Acknowledge {
        incident: Uuid,
    },

    /// Resolve an incident by hand
    Resolve {
        incident: Uuid,

        /// Who resolved it
        #[arg(long)]
        by: Option<Uuid>,
    },

    /// List recent incidents, of one monitor or of all
    Incidents {
        monitor: Option<Uuid>,

        /// Only incidents in this status (open, acknowledged, resolved)
        #[arg(long)]
        status: Option<IncidentStatus>,

        /// Only incidents started within the last N days
        #[arg(long)]
        days: Option<i64>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print the effective configuration
    Config,
}

/// Fields of a monitor that `update` may change; absent flags keep the
/// stored value
#[derive(Args, Debug, Default)]
struct MonitorEdit {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    method: Option<HttpMethod>,

    /// Replaces all stored headers, repeatable
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Drop all stored headers
    #[arg(long, conflicts_with = "headers")]
    clear_headers: bool,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Check interval in minutes
    #[arg(long)]
    interval: Option<u32>,

    #[arg(long)]
    expected_status: Option<u16>,

    /// Alert by email (true or false)
    #[arg(long)]
    email: Option<bool>,

    /// Alert on Slack (true or false)
    #[arg(long)]
    slack: Option<bool>,
}

impl MonitorEdit {
    fn apply(self, monitor: &mut Monitor) {
        if let Some(name) = self.name {
            monitor.name = name;
        }
        if let Some(url) = self.url {
            monitor.target.url = url;
        }
        if let Some(method) = self.method {
            monitor.target.method = method;
        }
        if self.clear_headers || !self.headers.is_empty() {
            monitor.target.headers = self.headers.into_iter().collect();
        }
        if let Some(timeout) = self.timeout {
            monitor.target.timeout_seconds = timeout;
        }
        if let Some(interval) = self.interval {
            monitor.interval_minutes = interval;
        }
        if let Some(expected_status) = self.expected_status {
            monitor.target.expected_status_code = expected_status;
        }
        if let Some(email) = self.email {
            monitor.alert_channels.email = email;
        }
        if let Some(slack) = self.slack {
            monitor.alert_channels.slack = slack;
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw.split_once(':').ok_or_else(|| format!("expected `Name: value`, got `{raw}`"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_ref()).context("Failed to load configuration")?;
    logger::init(&config.logging.level, config.log_format()?);

    let command = cli.command.unwrap_or(Command::Run);
    if let Command::Config = command {
        print!("{config}");
        return Ok(());
    }

    info!("Opening database at {}", config.database.path);
    let pool = pool::open_pool(&config.database.path, config.database.max_connections).await?;

    if let Command::Run = command {
        info!("Starting apimon service...");
        return Orchestrator::start(config, pool).await;
    }

    let orchestrator = Orchestrator::new(config, pool).await?;
    execute(&orchestrator, command).await
}

async fn execute(orchestrator: &Orchestrator, command: Command) -> Result<()> {
    let database = orchestrator.database();

    match command {
        // Handled in main
        Command::Run | Command::Config => {}
        Command::Cycle => match orchestrator.run_cycle().await? {
            Some(report) => println!(
                "Checked {} monitors in {} batches ({} failed) in {}ms",
                report.checked,
                report.batches.len(),
                report.failed,
                report.duration_ms
            ),
            None => println!("A check cycle is already running"),
        },
        Command::Check { monitor } => {
            let summary = orchestrator.executor().check_monitor_now(monitor).await?;
            println!(
                "{} - {} ({}ms), opened {}, resolved {}, suppressed {}",
                summary.monitor_id,
                summary.status,
                summary.outcome.elapsed_ms(),
                summary.opened.len(),
                summary.resolved.len(),
                summary.suppressed
            );
            if !summary.persisted {
                println!("Monitor was modified during the check, result discarded");
            }
        }
        Command::Add { name, url, method, headers, timeout, interval, expected_status, owner, slack, no_email } => {
            let mut target = ProbeTarget::new(url);
            target.method = method;
            target.headers = headers.into_iter().collect();
            target.timeout_seconds = timeout;
            target.expected_status_code = expected_status;

            let mut monitor = Monitor::new(owner.unwrap_or_else(Uuid::new_v4), name, target);
            monitor.interval_minutes = interval;
            monitor.alert_channels.slack = slack;
            monitor.alert_channels.email = !no_email;

            validate_monitor(&monitor)?;
            database.insert_monitor(&monitor).await?;
            println!("Created monitor {} ({})", monitor.id, monitor.name);
        }
        Command::List => {
            let monitors = database.list_monitors().await?;
            if monitors.is_empty() {
                println!("No monitors");
            }
            for monitor in monitors {
                println!(
                    "{}  {:<8} {:<7} {:>7}%  every {}m  {}  {}",
                    monitor.id,
                    monitor.status,
                    if monitor.is_active { "active" } else { "paused" },
                    monitor.uptime.percentage,
                    monitor.interval_minutes,
                    monitor.name,
                    monitor.target.url
                );
            }
        }
        Command::Update { monitor, edit } => {
            let mut stored = database.get_monitor(monitor).await?.with_context(|| format!("Monitor not found: {monitor}"))?;
            edit.apply(&mut stored);
            validate_monitor(&stored)?;
            let updated = database.update_monitor(&stored).await?;
            println!("Updated {} ({})", updated.id, updated.name);
        }
        Command::Delete { monitor } => {
            database.delete_monitor(monitor).await?;
            println!("Deleted monitor {monitor} and its incidents");
        }
        Command::Pause { monitor } => {
            let monitor = database.set_monitor_active(monitor, false).await?;
            println!("Paused {} ({})", monitor.id, monitor.name);
        }
        Command::Resume { monitor } => {
            let monitor = database.set_monitor_active(monitor, true).await?;
            println!("Resumed {} ({})", monitor.id, monitor.name);
        }
        Command::Acknowledge { incident } => {
            let incident = orchestrator.tracker().acknowledge(incident).await?;
            println!("Incident {} is {}", incident.id, incident.status);
        }
        Command::Resolve { incident, by } => {
            let incident = orchestrator.tracker().resolve(incident, by).await?;
            println!("Incident {} resolved after {}", incident.id, incident.duration_string());
        }
        Command::Incidents { monitor, status, days, limit } => {
            let query = IncidentQuery {
                monitor_id: monitor,
                status,
                since: days.map(|days| Utc::now() - Duration::days(days)),
                limit,
            };
            let incidents = database.list_incidents(&query).await?;
            if incidents.is_empty() {
                println!("No incidents");
            }
            for incident in incidents {
                println!(
                    "{}  {:<13} {:<21} {}  {}",
                    incident.id,
                    incident.status,
                    incident.kind,
                    incident.start_time.format("%Y-%m-%d %H:%M:%S"),
                    incident.duration_string()
                );
            }
        }
    }

    Ok(())
}
