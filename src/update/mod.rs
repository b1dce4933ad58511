//! # Self-Update
//!
//! ```text
//! update/
//! ├── version.rs   - Running version, tag comparison, platform asset name
//! ├── release.rs   - Release descriptor and the GitHub source
//! ├── download.rs  - Size-verified streaming download
//! ├── install.rs   - Backup, atomic rename, restore, deferred cleanup
//! └── engine.rs    - Update cycle state machine
//! ```
//!
//! The engine never restarts the process itself. A finished installation is
//! handed to the caller, which exits cleanly and leaves the restart to the
//! service supervisor.

pub mod download;
pub mod engine;
pub mod error;
pub mod install;
pub mod release;
pub mod version;

pub use engine::{UpdateOutcome, Updater};
pub use error::UpdateError;
pub use install::InstallReport;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const FIRST_CHECK_DELAY: Duration = Duration::from_secs(30);
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Runs update cycles on a timer and reports a finished installation.
pub struct UpdateScheduler {
    updater: Updater,
    first_check: Duration,
    interval: Duration,
}

impl UpdateScheduler {
    pub fn new(updater: Updater) -> Self {
        Self {
            updater,
            first_check: FIRST_CHECK_DELAY,
            interval: CHECK_INTERVAL,
        }
    }

    pub fn with_timing(mut self, first_check: Duration, interval: Duration) -> Self {
        self.first_check = first_check;
        self.interval = interval;
        self
    }

    /// Stops after the first installation or when `shutdown` fires.
    pub fn spawn(
        self,
        restart: mpsc::Sender<InstallReport>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = Instant::now();
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = sleep_until(start + self.first_check) => {}
            }

            let mut interval = interval_at(start + self.interval, self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if let Some(report) = self.run_once().await {
                    info!("Exiting to allow launchd restart with new binary");
                    if restart.send(report).await.is_err() {
                        warn!("Restart request dropped, nobody is listening");
                    }
                    return;
                }

                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = interval.tick() => {}
                }
            }
        })
    }

    async fn run_once(&self) -> Option<InstallReport> {
        info!("Checking for updates...");
        match self.updater.check_and_apply().await {
            Ok(UpdateOutcome::Installed { report, .. }) => Some(report),
            Ok(_) => {
                info!("No update required");
                None
            }
            Err(e) => {
                warn!("Update failed: {} (will retry in 1 hour)", e);
                None
            }
        }
    }
}
