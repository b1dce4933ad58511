//! Periodic telemetry
//!
//! Two independent cycles so a slow probe (system_profiler, swift) never
//! delays the volume updates. The first tick of each cycle is one period
//! after start.

use super::reporter::Reporter;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const FAST_PERIOD: Duration = Duration::from_secs(2);
pub const SLOW_PERIOD: Duration = Duration::from_secs(60);

pub struct TelemetryScheduler {
    reporter: Reporter,
    fast: Duration,
    slow: Duration,
}

pub struct TelemetryTasks {
    fast: JoinHandle<()>,
    slow: JoinHandle<()>,
}

impl TelemetryTasks {
    pub async fn join(self) {
        let _ = self.fast.await;
        let _ = self.slow.await;
    }
}

impl TelemetryScheduler {
    pub fn new(reporter: Reporter) -> Self {
        Self::with_periods(reporter, FAST_PERIOD, SLOW_PERIOD)
    }

    pub fn with_periods(reporter: Reporter, fast: Duration, slow: Duration) -> Self {
        Self {
            reporter,
            fast,
            slow,
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> TelemetryTasks {
        let fast_reporter = self.reporter.clone();
        let fast = tokio::spawn(run_cycle("fast", self.fast, shutdown.clone(), move || {
            let reporter = fast_reporter.clone();
            async move { reporter.report_fast().await }
        }));

        let slow_reporter = self.reporter;
        let slow = tokio::spawn(run_cycle("slow", self.slow, shutdown, move || {
            let reporter = slow_reporter.clone();
            async move { reporter.report_slow().await }
        }));

        TelemetryTasks { fast, slow }
    }
}

async fn run_cycle<F, Fut>(name: &'static str, period: Duration, shutdown: CancellationToken, tick: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // A tick body may be slow (system_profiler), shutdown must not wait for it
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = async {
                interval.tick().await;
                tick().await;
            } => {}
        }
    }
    debug!("Telemetry {} cycle stopped", name);
}
