//! Publishes device state onto the status topics

use crate::device::Device;
use crate::mqtt::codec::{encode_bool, TRUE};
use crate::mqtt::discovery;
use crate::mqtt::topics::{Metric, Topics};
use crate::mqtt::transport::Publisher;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads the device and publishes what it reads. Publish failures are logged
/// and never interrupt the caller.
#[derive(Clone)]
pub struct Reporter {
    publisher: Publisher,
    topics: Arc<Topics>,
    device: Arc<dyn Device>,
}

impl Reporter {
    pub fn new(publisher: Publisher, topics: Arc<Topics>, device: Arc<dyn Device>) -> Self {
        Self {
            publisher,
            topics,
            device,
        }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    async fn report(&self, metric: Metric, value: String) {
        let topic = self.topics.status(metric);
        if let Err(e) = self.publisher.publish_status(topic, value, false).await {
            warn!("Failed to publish {}: {}", metric, e);
        }
    }

    pub async fn report_volume(&self) {
        let volume = self.device.volume().await;
        self.report(Metric::Volume, volume.to_string()).await;
    }

    pub async fn report_mute(&self) {
        let muted = self.device.muted().await;
        self.report(Metric::Mute, encode_bool(muted).to_string())
            .await;
    }

    pub async fn report_active_app(&self) {
        let app = self.device.active_app().await;
        self.report(Metric::ActiveApp, app).await;
    }

    pub async fn report_battery(&self) {
        let battery = self.device.battery_percent().await;
        self.report(Metric::Battery, battery).await;
    }

    pub async fn report_wifi(&self) {
        let ssid = self.device.wifi_ssid().await;
        self.report(Metric::WifiSsid, ssid).await;
        let signal = self.device.wifi_signal().await;
        self.report(Metric::WifiSignalStrength, signal).await;
        let ip = self.device.wifi_ip().await;
        self.report(Metric::WifiIp, ip).await;
    }

    pub async fn report_uptime(&self) {
        let uptime = self.device.uptime_seconds().await;
        self.report(Metric::Uptime, uptime).await;
    }

    /// Volume, mute and foreground app
    pub async fn report_fast(&self) {
        self.report_volume().await;
        self.report_mute().await;
        self.report_active_app().await;
    }

    /// Battery, Wi-Fi and uptime
    pub async fn report_slow(&self) {
        self.report_battery().await;
        self.report_wifi().await;
        self.report_uptime().await;
    }

    /// Every metric once, in the order a fresh subscriber expects
    pub async fn report_snapshot(&self) {
        self.report_volume().await;
        self.report_mute().await;
        self.report_battery().await;
        self.report_active_app().await;
        self.report_wifi().await;
        self.report_uptime().await;
    }

    /// Retained alive flag
    pub async fn announce_alive(&self, alive: bool) {
        let topic = self.topics.alive();
        let payload = encode_bool(alive);
        match self
            .publisher
            .publish_status(topic.clone(), payload, true)
            .await
        {
            Ok(()) if payload == TRUE => info!("Sending 'true' to topic: {}", topic),
            Ok(()) => debug!("Sending '{}' to topic: {}", payload, topic),
            Err(e) => warn!("Failed to publish alive state: {}", e),
        }
    }

    /// Retained Home Assistant discovery documents
    pub async fn publish_discovery(&self, version: &str) {
        let entities = discovery::entities(&self.topics, version);
        let total = entities.len();
        let mut published = 0;

        for entity in entities {
            let payload = match entity.payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to encode discovery config for {}: {}", entity.object, e);
                    continue;
                }
            };
            match self
                .publisher
                .publish_status(entity.topic.clone(), payload, true)
                .await
            {
                Ok(()) => published += 1,
                Err(e) => warn!("Failed to publish discovery config {}: {}", entity.topic, e),
            }
        }

        info!("Published {}/{} Home Assistant discovery configs", published, total);
    }
}
