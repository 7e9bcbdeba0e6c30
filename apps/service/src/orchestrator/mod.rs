/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Prepares the database schema
/// - Wires checker, incident tracker, alert dispatcher and scheduler together
/// - Runs the scheduler until shutdown is requested


use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AlertsConfig, Config};
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::incidents::IncidentTracker;
use crate::monitoring::{BatchExecutor, Checker, CycleReport, HttpChecker, MonitoringExecutor, MonitoringScheduler};
use crate::notifier::AlertDispatcher;
use crate::notifier::senders::{EmailSender, SlackSender};
use crate::pool::LibsqlPool;

/// Main orchestrator for the apimon service
pub struct Orchestrator {
    database: Arc<dyn Database>,
    tracker: Arc<IncidentTracker>,
    executor: Arc<MonitoringExecutor>,
    scheduler: MonitoringScheduler,
}

impl Orchestrator {
    /// Create and start a new orchestrator
    /// This is a convenience method that creates and immediately runs the orchestrator
    pub async fn start(config: Config, pool: LibsqlPool) -> Result<()> {
        let mut orchestrator = Self::new(config, pool).await?;
        orchestrator.run().await
    }

    /// Create a new orchestrator instance probing over HTTP
    pub async fn new(config: Config, pool: LibsqlPool) -> Result<Self> {
        let checker = Arc::new(HttpChecker::new()?);
        Self::with_checker(config, pool, checker).await
    }

    /// Create a new orchestrator instance with a custom checker
    pub async fn with_checker(config: Config, pool: LibsqlPool, checker: Arc<dyn Checker>) -> Result<Self> {
        // Get database connection for initialization
        let conn = pool.get().await?;

        // Initialize database schema
        info!("Initializing database schema...");
        initialize_database(&conn).await?;
        drop(conn);

        // Create database instance with pool
        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));

        let dispatcher = Arc::new(build_dispatcher(&config.alerts));
        let tracker = Arc::new(IncidentTracker::new(database.clone(), dispatcher));

        let executor = Arc::new(MonitoringExecutor::new(
            checker,
            database.clone(),
            tracker.clone(),
            config.thresholds(),
        ));
        let batches = Arc::new(BatchExecutor::new(executor.clone(), config.monitoring.batch_size));
        let scheduler = MonitoringScheduler::new(database.clone(), batches, config.check_interval());

        Ok(Self { database, tracker, executor, scheduler })
    }

    /// Run the scheduler until Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        self.scheduler.start();

        tokio::signal::ctrl_c().await?;
        info!("Shutdown requested, stopping monitoring scheduler...");

        if self.scheduler.is_running() {
            self.scheduler.stop().await;
        }
        Ok(())
    }

    /// Run a single check cycle over every active monitor
    pub async fn run_cycle(&self) -> Result<Option<CycleReport>> {
        Ok(self.scheduler.run_once().await?)
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn tracker(&self) -> &IncidentTracker {
        &self.tracker
    }

    pub fn executor(&self) -> &MonitoringExecutor {
        &self.executor
    }
}

/// Build the alert dispatcher from whatever channels are configured.
///
/// A channel that cannot be set up is left out; its attempts are then
/// recorded as failed deliveries.
fn build_dispatcher(alerts: &AlertsConfig) -> AlertDispatcher {
    let mut dispatcher = AlertDispatcher::new();

    match (&alerts.smtp, &alerts.alert_email) {
        (Some(smtp), Some(recipient)) => match EmailSender::new(smtp, recipient) {
            Ok(sender) => {
                info!("Email alerts enabled for {}", recipient);
                dispatcher = dispatcher.with_sender(Arc::new(sender));
            }
            Err(e) => warn!("Email alerts disabled: {}", e),
        },
        _ => warn!("Email service not configured, email alerts will be recorded as failed"),
    }

    if let Some(webhook) = &alerts.slack_webhook {
        match SlackSender::new(webhook) {
            Ok(sender) => {
                info!("Slack alerts enabled");
                dispatcher = dispatcher.with_sender(Arc::new(sender));
            }
            Err(e) => warn!("Slack alerts disabled: {}", e),
        }
    }

    dispatcher
}
