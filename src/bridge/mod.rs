//! # Bridge Runtime
//!
//! Glue between the broker session and the device.
//!
//! ```text
//! Session ──► SessionEvent ──► Bridge ─┬─► Connected: alive, discovery, snapshot, subscribe
//!                                      ├─► Message:   CommandDispatcher ──► Device
//!                                      └─► Lost:      logged, driver reconnects
//!
//! TelemetryScheduler ──► Reporter ──► Publisher   (own timers)
//! ```

pub mod dispatcher;
pub mod reporter;
pub mod telemetry;

use crate::mqtt::connection::{Session, SessionEvent};
use dispatcher::CommandDispatcher;
use reporter::Reporter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Bridge {
    reporter: Reporter,
    dispatcher: CommandDispatcher,
    version: String,
}

impl Bridge {
    pub fn new(reporter: Reporter, version: impl Into<String>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(reporter.clone()),
            reporter,
            version: version.into(),
        }
    }

    /// Consumes session events until `shutdown` fires or the session ends.
    pub async fn run(&self, session: &mut Session, shutdown: &CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = session.next_event() => event,
            };

            match event {
                Some(event) => self.handle(event).await,
                None => {
                    debug!("Session event stream closed");
                    break;
                }
            }
        }
    }

    pub async fn handle(&self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => self.on_connected().await,
            SessionEvent::Message(message) => {
                self.dispatcher.dispatch(&message).await;
            }
            SessionEvent::Lost(reason) => debug!("Session lost: {}", reason),
        }
    }

    /// Runs after every (re)connect: a fresh session has no subscriptions and
    /// observers may have missed updates while we were away.
    async fn on_connected(&self) {
        self.reporter.announce_alive(true).await;
        self.reporter.publish_discovery(&self.version).await;
        self.reporter.report_snapshot().await;

        let filter = self.reporter.topics().command_filter();
        match self.reporter.publisher().subscribe(&filter).await {
            Ok(()) => info!("Subscribed to {}", filter),
            Err(e) => warn!("Failed to subscribe to {}: {}", filter, e),
        }
    }

    /// Stops taking commands and leaves a retained `alive=false` before a
    /// clean disconnect; the broker does not send the last will for those.
    pub async fn say_goodbye(&self) {
        let filter = self.reporter.topics().command_filter();
        if let Err(e) = self.reporter.publisher().unsubscribe(&filter).await {
            warn!("Failed to unsubscribe from {}: {}", filter, e);
        }
        self.reporter.announce_alive(false).await;
    }
}
