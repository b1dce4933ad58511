//! Device capability interface
//!
//! The bridge never talks to the OS directly; it goes through [`Device`].
//! Getters never fail, a probe that cannot produce a value returns the
//! sentinel documented on each method. Actions report failures so callers can
//! log them.

pub mod macos;
pub mod probes;

use async_trait::async_trait;
use thiserror::Error;

pub const NOT_CONNECTED: &str = "Not Connected";
pub const UNKNOWN_APP: &str = "Unknown";
pub const ZERO: &str = "0";

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

#[async_trait]
pub trait Device: Send + Sync {
    /// Output volume `0..=100`; `0` when unreadable
    async fn volume(&self) -> u8;
    async fn set_volume(&self, volume: u8) -> Result<(), DeviceError>;

    /// `false` when unreadable
    async fn muted(&self) -> bool;
    async fn set_mute(&self, muted: bool) -> Result<(), DeviceError>;

    async fn sleep(&self) -> Result<(), DeviceError>;
    async fn display_sleep(&self) -> Result<(), DeviceError>;

    /// Unconditional when privileged, otherwise a request that other
    /// sessions may veto
    async fn shutdown(&self) -> Result<(), DeviceError>;

    /// Charge percentage; `"0"` when unreadable
    async fn battery_percent(&self) -> String;

    /// Foreground application; `"Unknown"` when unreadable
    async fn active_app(&self) -> String;

    /// `"Not Connected"` when unavailable
    async fn wifi_ssid(&self) -> String;

    /// RSSI in dBm; `"0"` when unavailable
    async fn wifi_signal(&self) -> String;

    /// `"Not Connected"` when unavailable
    async fn wifi_ip(&self) -> String;

    /// Seconds since boot; `"0"` when unreadable
    async fn uptime_seconds(&self) -> String;
}
