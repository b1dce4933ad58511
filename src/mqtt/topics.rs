//! Topic naming
//!
//! All topics hang off `mac2mqtt/<host>`. Discovery documents live in the Home
//! Assistant namespace and are keyed by `mac2mqtt_<host>`.

use crate::identity::HostIdentity;
use std::fmt;

pub const NAMESPACE: &str = "mac2mqtt";
pub const DISCOVERY_NAMESPACE: &str = "homeassistant";

/// Published status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Alive,
    Volume,
    Mute,
    Battery,
    ActiveApp,
    WifiSsid,
    WifiSignalStrength,
    WifiIp,
    Uptime,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Alive => "alive",
            Metric::Volume => "volume",
            Metric::Mute => "mute",
            Metric::Battery => "battery",
            Metric::ActiveApp => "active_app",
            Metric::WifiSsid => "wifi_ssid",
            Metric::WifiSignalStrength => "wifi_signal_strength",
            Metric::WifiIp => "wifi_ip",
            Metric::Uptime => "uptime",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted command actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Volume,
    Mute,
    Sleep,
    DisplaySleep,
    Shutdown,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Volume,
        Action::Mute,
        Action::Sleep,
        Action::DisplaySleep,
        Action::Shutdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Volume => "volume",
            Action::Mute => "mute",
            Action::Sleep => "sleep",
            Action::DisplaySleep => "displaysleep",
            Action::Shutdown => "shutdown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic builder bound to one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    host: HostIdentity,
    prefix: String,
}

impl Topics {
    pub fn new(host: HostIdentity) -> Self {
        let prefix = format!("{}/{}", NAMESPACE, host);
        Self { host, prefix }
    }

    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn status(&self, metric: Metric) -> String {
        format!("{}/status/{}", self.prefix, metric)
    }

    pub fn alive(&self) -> String {
        self.status(Metric::Alive)
    }

    pub fn command(&self, action: Action) -> String {
        format!("{}/command/{}", self.prefix, action)
    }

    /// Wildcard filter covering every command topic
    pub fn command_filter(&self) -> String {
        format!("{}/command/#", self.prefix)
    }

    /// Returns the raw action segment if `topic` is one of our command topics.
    /// The action itself is not validated here.
    pub fn command_action<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix("/command/")
    }

    /// `mac2mqtt_<host>`, shared by the device block and every unique id
    pub fn device_id(&self) -> String {
        format!("{}_{}", NAMESPACE, self.host)
    }

    pub fn unique_id(&self, object: &str) -> String {
        format!("{}_{}", self.device_id(), object)
    }

    pub fn object_id(&self, object: &str) -> String {
        format!("{}_{}", self.host, object)
    }

    pub fn discovery(&self, component: &str, object: &str) -> String {
        format!(
            "{}/{}/{}/{}/config",
            DISCOVERY_NAMESPACE,
            component,
            self.device_id(),
            self.object_id(object)
        )
    }
}
