pub mod bridge;
pub mod config;
pub mod device;
pub mod identity;
pub mod mqtt;
pub mod update;

use crate::bridge::reporter::Reporter;
use crate::bridge::telemetry::TelemetryScheduler;
use crate::bridge::Bridge;
use crate::config::{resolve_config_path, Config, RunMode};
use crate::device::macos::MacOsDevice;
use crate::identity::HostIdentity;
use crate::mqtt::connection::{ConnectError, ConnectionManager};
use crate::mqtt::topics::Topics;
use crate::update::install::Installer;
use crate::update::release::GithubReleases;
use crate::update::version::VERSION;
use crate::update::{UpdateScheduler, Updater};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Bridges this computer's volume, power and telemetry to MQTT
#[derive(Parser, Debug)]
#[command(name = "mac2mqtt", version = VERSION)]
struct Args {
    /// Config file (defaults to ./mac2mqtt.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging and publish tracing
    #[arg(long)]
    debug: bool,

    /// Simulate the broker connection, nothing leaves the machine
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup()?;

    let config_path = resolve_config_path(args.config);
    let forced = RunMode {
        debug: args.debug,
        dry_run: args.dry_run,
    };
    let config = Config::load(&config_path, forced).await;

    // Logging level depends on the config, so errors are reported once it is up
    let level = match &config {
        Ok(c) if c.mode.debug => Level::DEBUG,
        _ => Level::INFO,
    };
    setup_logging_env(level);

    info!("Started");
    info!("Version: {}", VERSION);
    let config = config?;
    info!("Using config file {}", config_path.display());
    if config.mode.dry_run {
        info!("Dry-run mode enabled: no MQTT traffic will leave this machine");
    }

    let host = HostIdentity::detect().map_err(|e| eyre!("Failed to get hostname: {}", e))?;
    info!("Host identity: {}", host);
    let topics = Arc::new(Topics::new(host));

    let shutdown = CancellationToken::new();
    let signals = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        signals.cancel();
    });

    let device = Arc::new(MacOsDevice::probe(config.mode.debug).await?);

    let manager = ConnectionManager::new(&config, topics.as_ref().clone());
    let mut session = match manager.connect(&shutdown).await {
        Ok(session) => session,
        Err(ConnectError::Cancelled) => {
            info!("Shutdown before a broker connection was established");
            return Ok(());
        }
    };

    let reporter = Reporter::new(session.publisher(), topics.clone(), device);
    let bridge = Bridge::new(reporter.clone(), VERSION);
    let telemetry = TelemetryScheduler::new(reporter).spawn(shutdown.clone());

    let (restart_tx, mut restart_rx) = mpsc::channel(1);
    let updates = if config.auto_update_enabled() {
        info!("Auto-update enabled (checks every hour)");
        let source = Arc::new(GithubReleases::new(VERSION)?);
        let updater = Updater::new(source, Installer::for_running_executable());
        Some(UpdateScheduler::new(updater).spawn(restart_tx, shutdown.clone()))
    } else if config.mode.dry_run {
        info!("Auto-update disabled in dry-run mode");
        drop(restart_tx);
        None
    } else {
        info!("Auto-update disabled");
        drop(restart_tx);
        None
    };

    let restart = tokio::select! {
        _ = bridge.run(&mut session, &shutdown) => None,
        Some(report) = restart_rx.recv() => Some(report),
    };

    if let Some(report) = restart {
        // Keep serving until the backup is gone, the supervisor restarts us afterwards
        let mut cleanup = report.cleanup;
        tokio::select! {
            _ = &mut cleanup => {}
            _ = bridge.run(&mut session, &shutdown) => {
                if let Err(e) = cleanup.await {
                    warn!("Backup cleanup task failed: {}", e);
                }
            }
        }
    }

    shutdown.cancel();
    telemetry.join().await;
    if let Some(updates) = updates {
        updates.abort();
    }

    bridge.say_goodbye().await;
    debug!("Connection state at shutdown: {:?}", session.state());
    session.close().await;
    info!("Stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
