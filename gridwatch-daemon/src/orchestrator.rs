//! Stage orchestration -- assembly, channel wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `gridwatch-daemon`.
//! It loads configuration, creates inter-stage channels, builds the four
//! pipeline stages, manages startup/shutdown ordering, and runs the main
//! event loop.
//!
//! # Channel Topology
//!
//! ```text
//! producers -> raw records -> ingest -+-> events  -> correlation -+-> results -> alert -+-> alerts      -> distribution
//!                                     |-> intel   ----------------|-> events  ----------|-> escalations -> distribution
//!                                     `-> decoded records --------------------------------> distribution
//! ```
//!
//! # Startup Order (producers before consumers)
//!
//! 1. Ingest (produces events and decoded records)
//! 2. Correlation (consumes events, produces results)
//! 3. Alert (consumes events/results/intel, produces alerts)
//! 4. Distribution (consumes everything, pushes to subscribers)
//!
//! Shutdown runs in the same order so downstream stages can drain what
//! upstream stages produced before stopping.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};

use gridwatch_core::config::GridwatchConfig;
use gridwatch_core::pipeline::Pipeline;
use gridwatch_core::types::KillChain;

use gridwatch_alert::intel::ThreatIntelIndex;
use gridwatch_alert::pipeline::{AlertPipeline, AlertPipelineBuilder};
use gridwatch_alert::processor::AlertProcessor;
use gridwatch_alert::rules::SuppressionLoader;
use gridwatch_correlation::engine::CorrelationEngine;
use gridwatch_correlation::loader::RuleLoader;
use gridwatch_correlation::pipeline::{CorrelationPipeline, CorrelationPipelineBuilder};
use gridwatch_correlation::rules::default_rules;
use gridwatch_distribution::pipeline::{DistributionPipeline, DistributionPipelineBuilder};
use gridwatch_distribution::registry::Distributor;
use gridwatch_distribution::topic::{HealthUpdate, OutboundItem};
use gridwatch_ingest::pipeline::{IngestPipeline, IngestPipelineBuilder};
use gridwatch_ingest::record::RawRecord;

use crate::health::{DaemonHealth, StageHealth, aggregate_status};
use crate::metrics_server;

/// Channel capacity constants.
const EVENT_CHANNEL_CAPACITY: usize = 1024;
const RECORD_CHANNEL_CAPACITY: usize = 1024;
const RESULT_CHANNEL_CAPACITY: usize = 256;
const ALERT_CHANNEL_CAPACITY: usize = 256;
const ESCALATION_CHANNEL_CAPACITY: usize = 64;
const INTEL_CHANNEL_CAPACITY: usize = 256;

/// Interval between health report publications.
const HEALTH_REPORT_INTERVAL_SECS: u64 = 30;

/// The main daemon orchestrator.
///
/// Owns the four pipeline stages and the shared distributor, and
/// manages the complete daemon lifecycle.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: GridwatchConfig,
    /// Ingest stage.
    ingest: IngestPipeline,
    /// Correlation stage.
    correlation: CorrelationPipeline,
    /// Alert stage.
    alert: AlertPipeline,
    /// Distribution stage.
    distribution: DistributionPipeline,
    /// Shared distributor (for subscriptions and health publication).
    distributor: Arc<Distributor>,
    /// Raw record sender handed to upstream producers.
    raw_tx: mpsc::Sender<RawRecord>,
    /// Shutdown broadcast sender (signals background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = GridwatchConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Useful for testing or when config has already been loaded.
    pub async fn build_from_config(config: GridwatchConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before stage initialization
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        // Load correlation rules; fall back to the built-in set when the
        // rule directory is unavailable.
        let rules = match RuleLoader::load_directory(&config.correlation.rule_dir).await {
            Ok(rules) if !rules.is_empty() => rules,
            Ok(_) => {
                tracing::warn!(
                    dir = %config.correlation.rule_dir,
                    "rule directory is empty, using built-in default rules"
                );
                default_rules()
            }
            Err(e) => {
                tracing::warn!(
                    dir = %config.correlation.rule_dir,
                    error = %e,
                    "failed to load rule directory, using built-in default rules"
                );
                default_rules()
            }
        };

        // Load suppression rules; an unavailable directory means no
        // signature-specific windows (the default window still applies).
        let suppressions =
            match SuppressionLoader::load_directory(&config.alert.suppression_dir).await {
                Ok(rules) => rules,
                Err(e) => {
                    tracing::warn!(
                        dir = %config.alert.suppression_dir,
                        error = %e,
                        "failed to load suppression directory, using default window only"
                    );
                    Vec::new()
                }
            };

        let kill_chain = KillChain::new(config.kill_chain.phases.clone());
        let engine = Arc::new(
            CorrelationEngine::new(rules, kill_chain, config.correlation.max_buffer_events)
                .map_err(|e| anyhow::anyhow!("failed to build correlation engine: {}", e))?,
        );

        let intel = Arc::new(ThreatIntelIndex::new());
        let processor = Arc::new(AlertProcessor::new(
            suppressions,
            config.alert.default_suppression_secs,
            config.alert.max_alert_records,
            Arc::clone(&intel),
        ));

        let distributor = Arc::new(Distributor::new(config.distribution.mailbox_capacity));

        tracing::debug!("creating inter-stage channels");
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (intel_tx, intel_rx) = mpsc::channel(INTEL_CHANNEL_CAPACITY);
        let (result_tx, result_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let (forward_tx, forward_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (alert_tx, alert_rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);
        let (escalation_tx, escalation_rx) = mpsc::channel(ESCALATION_CHANNEL_CAPACITY);
        let (correlation_out_tx, correlation_out_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        tracing::info!("initializing ingest stage");
        let (ingest, raw_tx) = IngestPipelineBuilder::new()
            .config(config.ingest.clone())
            .event_sender(event_tx)
            .intel_sender(intel_tx)
            .publish_sender(record_tx)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build ingest stage: {}", e))?;

        tracing::info!("initializing correlation stage");
        let correlation = CorrelationPipelineBuilder::new()
            .engine(engine)
            .event_receiver(event_rx)
            .result_sender(result_tx)
            .forward_sender(forward_tx)
            .workers(config.correlation.workers)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build correlation stage: {}", e))?;

        tracing::info!("initializing alert stage");
        let alert = AlertPipelineBuilder::new()
            .processor(processor)
            .intel_index(intel)
            .event_receiver(forward_rx)
            .result_receiver(result_rx)
            .intel_receiver(intel_rx)
            .alert_sender(alert_tx)
            .escalation_sender(escalation_tx)
            .correlation_sender(correlation_out_tx)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build alert stage: {}", e))?;

        tracing::info!("initializing distribution stage");
        let distribution = DistributionPipelineBuilder::new()
            .distributor(Arc::clone(&distributor))
            .record_receiver(record_rx)
            .alert_receiver(alert_rx)
            .escalation_receiver(escalation_rx)
            .correlation_receiver(correlation_out_rx)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build distribution stage: {}", e))?;

        let (shutdown_tx, _) = broadcast::channel(16);

        tracing::info!("orchestrator initialized");

        Ok(Self {
            config,
            ingest,
            correlation,
            alert,
            distribution,
            distributor,
            raw_tx,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Get the raw record sender for upstream producers.
    pub fn raw_sender(&self) -> mpsc::Sender<RawRecord> {
        self.raw_tx.clone()
    }

    /// Get the shared distributor for opening subscriptions.
    pub fn distributor(&self) -> Arc<Distributor> {
        Arc::clone(&self.distributor)
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &GridwatchConfig {
        &self.config
    }

    /// Start all stages in dependency order (producers first).
    pub async fn start_stages(&mut self) -> Result<()> {
        tracing::info!("starting all stages");
        self.ingest
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("ingest start failed: {}", e))?;
        self.correlation
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("correlation start failed: {}", e))?;
        self.alert
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("alert start failed: {}", e))?;
        self.distribution
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("distribution start failed: {}", e))?;
        tracing::info!("all stages running");
        Ok(())
    }

    /// Stop all stages (producers first, so consumers can drain).
    pub async fn stop_stages(&mut self) -> Result<()> {
        tracing::info!("stopping all stages");
        let mut first_error = None;
        for (name, result) in [
            ("ingest", self.ingest.stop().await),
            ("correlation", self.correlation.stop().await),
            ("alert", self.alert.stop().await),
            ("distribution", self.distribution.stop().await),
        ] {
            if let Err(e) = result {
                tracing::error!(stage = name, error = %e, "stage stop failed");
                first_error.get_or_insert_with(|| anyhow::anyhow!("{name} stop failed: {e}"));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Start all stages and block until a shutdown signal is received.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        // Write PID file if configured
        if !self.config.general.pid_file.is_empty() {
            let path = Path::new(&self.config.general.pid_file);
            write_pid_file(path)?;
        }

        if let Err(e) = self.start_stages().await {
            tracing::error!(error = %e, "stage startup failed, rolling back");
            let _ = self.stop_stages().await;
            if !self.config.general.pid_file.is_empty() {
                remove_pid_file(Path::new(&self.config.general.pid_file));
            }
            return Err(e);
        }

        // Spawn health reporter task
        let health_task = spawn_health_reporter(
            Arc::clone(&self.distributor),
            self.start_time,
            self.config.metrics.enabled,
            self.shutdown_tx.subscribe(),
        );

        // Main event loop
        tracing::info!("entering main event loop");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        // Initiate shutdown
        let _ = self.shutdown_tx.send(());
        let _ = health_task.await;

        self.stop_stages().await?;

        // Remove PID file
        if !self.config.general.pid_file.is_empty() {
            remove_pid_file(Path::new(&self.config.general.pid_file));
        }

        Ok(())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let stages = vec![
            StageHealth {
                name: "ingest".to_owned(),
                status: self.ingest.health_check().await,
            },
            StageHealth {
                name: "correlation".to_owned(),
                status: self.correlation.health_check().await,
            },
            StageHealth {
                name: "alert".to_owned(),
                status: self.alert.health_check().await,
            },
            StageHealth {
                name: "distribution".to_owned(),
                status: self.distribution.health_check().await,
            },
        ];

        let overall_status = aggregate_status(&stages);
        let uptime_secs = self.start_time.elapsed().as_secs();

        DaemonHealth {
            status: overall_status,
            uptime_secs,
            stages,
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Spawn a background task that periodically publishes the daemon health
/// to the system-health topic and refreshes the uptime metric.
fn spawn_health_reporter(
    distributor: Arc<Distributor>,
    start_time: Instant,
    metrics_enabled: bool,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
            HEALTH_REPORT_INTERVAL_SECS,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    distributor.publish(&OutboundItem::Health(HealthUpdate {
                        status: "healthy".to_owned(),
                        detail: String::new(),
                        reported_at: Utc::now(),
                    }));

                    if metrics_enabled {
                        let uptime_secs = start_time.elapsed().as_secs();
                        #[allow(clippy::cast_precision_loss)]
                        metrics::gauge!(gridwatch_core::metrics::DAEMON_UPTIME_SECONDS)
                            .set(uptime_secs as f64);
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("health reporter shutting down");
                    break;
                }
            }
        }
    })
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances. The file is created with
/// `create_new(true)` so a concurrent second daemon loses the race.
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        file.set_permissions(permissions)?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}
