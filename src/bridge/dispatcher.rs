//! Command dispatch
//!
//! Each incoming message is handled on its own: validate, apply to the
//! device, republish the affected state. A message that fails at any step
//! is logged and dropped without touching the next one.

use super::reporter::Reporter;
use crate::device::DeviceError;
use crate::mqtt::codec::{Command, CommandError};
use crate::mqtt::message::IncomingMessage;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CommandDispatcher {
    reporter: Reporter,
}

impl CommandDispatcher {
    pub fn new(reporter: Reporter) -> Self {
        Self { reporter }
    }

    /// Returns the command that was applied, if any.
    pub async fn dispatch(&self, message: &IncomingMessage) -> Option<Command> {
        let Some(action) = self.reporter.topics().command_action(&message.topic) else {
            debug!("Ignoring message on foreign topic {}", message.topic);
            return None;
        };

        let command = match Command::decode(action, &message.payload) {
            Ok(command) => command,
            Err(e @ CommandError::SentinelMismatch { .. }) => {
                debug!("{}", e);
                return None;
            }
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };

        match self.apply(command).await {
            Ok(()) => Some(command),
            Err(e) => {
                warn!("Failed to execute {:?}: {}", command, e);
                None
            }
        }
    }

    async fn apply(&self, command: Command) -> Result<(), DeviceError> {
        let device = self.reporter.device();
        match command {
            Command::SetVolume(volume) => {
                let result = device.set_volume(volume).await;
                self.republish_audio().await;
                result
            }
            Command::SetMute(muted) => {
                let result = device.set_mute(muted).await;
                self.republish_audio().await;
                result
            }
            Command::Sleep => {
                info!("Putting system to sleep");
                device.sleep().await
            }
            Command::DisplaySleep => {
                info!("Putting display to sleep");
                device.display_sleep().await
            }
            Command::Shutdown => {
                info!("Shutting down system");
                device.shutdown().await
            }
        }
    }

    // Republished whether or not the set succeeded
    async fn republish_audio(&self) {
        self.reporter.report_volume().await;
        self.reporter.report_mute().await;
    }
}
