//! Robot cashier PoC - dual-arm banknote collection and change dispensing
//!
//! Orchestrates a physical cashier transaction: senses the customer's hand
//! poses, takes banknotes, recognises their value, and hands back change
//! until the balance settles.
//!
//! Module structure:
//! - `domain/` - Core business types (Ledger, Inventory, Pose, Session)
//! - `io/` - External interfaces (pose sensing, recognition, planner, display, till)
//! - `services/` - Business logic (Cashier, Selector, Animation, Calibration)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use cashier_poc::infra::{Config, Metrics};
use cashier_poc::io::{
    start_till_listener, MqttDisplay, PlannerClient, PoseSensorClient, ReceiptWriter,
    RecognizerClient,
};
use cashier_poc::services::{calibration, Cashier};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Robot cashier PoC - automated banknote collection and change dispensing
#[derive(Parser, Debug)]
#[command(name = "cashier-poc", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full cycle visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("cashier-poc starting");

    // Parse command line arguments using clap
    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    // Start embedded MQTT broker for the display and till topics
    cashier_poc::infra::broker::start_embedded_broker(&config);

    // Log configuration
    info!(
        config_file = %config.config_file(),
        robot_id = %config.robot_id(),
        pose_url = %config.pose_url(),
        recognizer_url = %config.recognizer_url(),
        planner_url = %config.planner_url(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        till_topic = %config.till_topic(),
        display_topic = %config.display_topic(),
        max_pose_age_secs = %config.max_pose_age_secs(),
        extra_slots = %config.extra_slots(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let timeout = Duration::from_millis(config.service_timeout_ms());
    let sensor = Arc::new(PoseSensorClient::new(config.pose_url(), timeout));
    let recognizer = Arc::new(RecognizerClient::new(config.recognizer_url(), timeout));
    let planner = Arc::new(PlannerClient::new(config.planner_url(), timeout));
    let display = Arc::new(MqttDisplay::new(&config));
    let metrics = Arc::new(Metrics::new());
    let receipts = ReceiptWriter::new(config.receipt_file());

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Set up the banknote inventories (interactive calibration unless disabled)
    let (table_left, table_right) =
        calibration::setup_inventories(planner.as_ref(), &config).await?;

    // Start till listener feeding session requests
    let (session_tx, mut session_rx) = mpsc::channel(16);
    let till_config = config.clone();
    let till_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_till_listener(&till_config, session_tx, till_shutdown).await {
            tracing::error!(error = %e, "till listener error");
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    let mut cashier = Cashier::new(
        sensor,
        recognizer,
        planner,
        display,
        table_left,
        table_right,
        config,
        metrics,
    );
    info!("cashier_ready");

    // Session driver: one session per till request, until shutdown
    let mut shutdown = shutdown_rx;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            request = session_rx.recv() => {
                match request {
                    Some(amount_due) => {
                        let record = cashier.start_session(amount_due).await;
                        receipts.write_record(&record);
                    }
                    None => break,
                }
            }
        }
    }

    info!("cashier-poc shutdown complete");
    Ok(())
}
