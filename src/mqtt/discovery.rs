//! Home Assistant MQTT discovery documents
//!
//! Every entity carries the same [`DeviceInfo`] so Home Assistant groups them
//! under one device per host. All entities except the connectivity sensor
//! itself use the alive topic for availability.

use super::codec::{FALSE, TRUE};
use super::topics::{Action, Metric, Topics};
use serde::Serialize;

const MODEL: &str = "macOS Computer";
const MANUFACTURER: &str = "Apple";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub sw_version: String,
}

impl DeviceInfo {
    pub fn new(topics: &Topics, version: &str) -> Self {
        Self {
            identifiers: vec![topics.device_id()],
            name: topics.host().to_string(),
            model: MODEL.to_string(),
            manufacturer: MANUFACTURER.to_string(),
            sw_version: version.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct EntityConfig {
    pub name: String,
    pub unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_press: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_available: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_not_available: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
}

/// One discovery document plus where it goes
#[derive(Debug, Clone)]
pub struct DiscoveryEntity {
    pub component: &'static str,
    pub object: &'static str,
    pub topic: String,
    pub config: EntityConfig,
}

impl DiscoveryEntity {
    pub fn payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.config)
    }
}

struct EntityBuilder<'a> {
    topics: &'a Topics,
    device: &'a DeviceInfo,
}

impl<'a> EntityBuilder<'a> {
    fn base(&self, object: &str, label: &str) -> EntityConfig {
        EntityConfig {
            name: format!("{} {}", self.topics.host(), label),
            unique_id: self.topics.unique_id(object),
            availability_topic: Some(self.topics.alive()),
            payload_available: Some(TRUE.to_string()),
            payload_not_available: Some(FALSE.to_string()),
            device: Some(self.device.clone()),
            ..Default::default()
        }
    }

    fn entity(
        &self,
        component: &'static str,
        object: &'static str,
        config: EntityConfig,
    ) -> DiscoveryEntity {
        DiscoveryEntity {
            component,
            object,
            topic: self.topics.discovery(component, object),
            config,
        }
    }

    fn sensor(
        &self,
        object: &'static str,
        label: &str,
        metric: Metric,
        icon: Option<&str>,
        unit: Option<&str>,
        device_class: Option<&str>,
    ) -> DiscoveryEntity {
        let config = EntityConfig {
            state_topic: Some(self.topics.status(metric)),
            icon: icon.map(str::to_string),
            unit_of_measurement: unit.map(str::to_string),
            device_class: device_class.map(str::to_string),
            ..self.base(object, label)
        };
        self.entity("sensor", object, config)
    }

    fn button(
        &self,
        object: &'static str,
        label: &str,
        action: Action,
        icon: &str,
    ) -> DiscoveryEntity {
        let config = EntityConfig {
            command_topic: Some(self.topics.command(action)),
            payload_press: Some(action.as_str().to_string()),
            icon: Some(icon.to_string()),
            ..self.base(object, label)
        };
        self.entity("button", object, config)
    }
}

/// All discovery documents for this host, in publish order.
pub fn entities(topics: &Topics, version: &str) -> Vec<DiscoveryEntity> {
    let device = DeviceInfo::new(topics, version);
    let b = EntityBuilder {
        topics,
        device: &device,
    };

    // The connectivity sensor is the availability source, so it has none itself
    let alive = EntityConfig {
        name: format!("{} Status", topics.host()),
        unique_id: topics.unique_id("alive"),
        state_topic: Some(topics.alive()),
        payload_on: Some(TRUE.to_string()),
        payload_off: Some(FALSE.to_string()),
        device_class: Some("connectivity".to_string()),
        device: Some(device.clone()),
        ..Default::default()
    };

    let mute = EntityConfig {
        state_topic: Some(topics.status(Metric::Mute)),
        command_topic: Some(topics.command(Action::Mute)),
        payload_on: Some(TRUE.to_string()),
        payload_off: Some(FALSE.to_string()),
        icon: Some("mdi:volume-mute".to_string()),
        ..b.base("mute", "Mute")
    };

    let volume = EntityConfig {
        state_topic: Some(topics.status(Metric::Volume)),
        command_topic: Some(topics.command(Action::Volume)),
        min: Some(0),
        max: Some(100),
        step: Some(1),
        icon: Some("mdi:volume-medium".to_string()),
        ..b.base("volume", "Volume")
    };

    vec![
        b.entity("binary_sensor", "alive", alive),
        b.sensor(
            "battery",
            "Battery",
            Metric::Battery,
            None,
            Some("%"),
            Some("battery"),
        ),
        b.sensor(
            "volume_sensor",
            "Volume Level",
            Metric::Volume,
            Some("mdi:volume-high"),
            Some("%"),
            None,
        ),
        b.entity("switch", "mute", mute),
        b.entity("number", "volume", volume),
        b.button("sleep", "Sleep", Action::Sleep, "mdi:power-sleep"),
        b.button("shutdown", "Shutdown", Action::Shutdown, "mdi:power"),
        b.button(
            "displaysleep",
            "Display Sleep",
            Action::DisplaySleep,
            "mdi:monitor-off",
        ),
        b.sensor(
            "active_app",
            "Active App",
            Metric::ActiveApp,
            Some("mdi:application"),
            None,
            None,
        ),
        b.sensor(
            "wifi_ssid",
            "Wi-Fi SSID",
            Metric::WifiSsid,
            Some("mdi:wifi"),
            None,
            None,
        ),
        b.sensor(
            "wifi_signal_strength",
            "Wi-Fi Signal Strength",
            Metric::WifiSignalStrength,
            Some("mdi:wifi-strength-2"),
            Some("dBm"),
            None,
        ),
        b.sensor(
            "wifi_ip",
            "Wi-Fi IP",
            Metric::WifiIp,
            Some("mdi:ip-network"),
            None,
            None,
        ),
        b.sensor(
            "uptime",
            "Uptime",
            Metric::Uptime,
            Some("mdi:clock-outline"),
            Some("s"),
            Some("duration"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::HostIdentity;
    use serde_json::Value;

    fn topics() -> Topics {
        Topics::new(HostIdentity::from_hostname("studio").unwrap())
    }

    #[test]
    fn device_identifier_prefixes_every_unique_id() {
        for entity in entities(&topics(), "1.2.3") {
            let doc: Value = serde_json::from_slice(&entity.payload().unwrap()).unwrap();
            let identifiers = doc["device"]["identifiers"].as_array().unwrap();
            let id = identifiers[0].as_str().unwrap();
            let unique_id = doc["unique_id"].as_str().unwrap();

            assert_eq!(id, "mac2mqtt_studio");
            assert!(unique_id.starts_with(id), "{unique_id} vs {id}");
            assert_eq!(doc["device"]["sw_version"], "1.2.3");
        }
    }

    #[test]
    fn availability_points_at_alive_topic() {
        let all = entities(&topics(), "dev");
        assert_eq!(all.len(), 13);

        for entity in &all {
            let doc: Value = serde_json::to_value(&entity.config).unwrap();
            if entity.object == "alive" {
                assert!(doc.get("availability_topic").is_none());
                assert_eq!(doc["payload_on"], "true");
                assert_eq!(doc["device_class"], "connectivity");
            } else {
                assert_eq!(doc["availability_topic"], "mac2mqtt/studio/status/alive");
                assert_eq!(doc["payload_available"], "true");
                assert_eq!(doc["payload_not_available"], "false");
            }
        }
    }

    #[test]
    fn controls_reference_command_topics() {
        let all = entities(&topics(), "dev");
        let find = |object: &str| all.iter().find(|e| e.object == object).unwrap();

        let volume = serde_json::to_value(&find("volume").config).unwrap();
        assert_eq!(volume["command_topic"], "mac2mqtt/studio/command/volume");
        assert_eq!(volume["max"], 100);

        let shutdown = find("shutdown");
        assert_eq!(
            shutdown.topic,
            "homeassistant/button/mac2mqtt_studio/studio_shutdown/config"
        );
        assert_eq!(shutdown.config.payload_press.as_deref(), Some("shutdown"));
    }
}
