//! Broker transports
//!
//! [`Transport`] is the capability the rest of the bridge publishes through.
//! [`LiveTransport`] forwards to a rumqttc client, [`InertTransport`] accepts
//! everything and touches nothing. The choice is made once, at connect time.
//! [`Publisher`] is the clonable handle handed to every component; it adds
//! the optional publish tracing in front of whichever transport is in use.

use super::message::OutgoingMessage;
use crate::config::RunMode;
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, message: OutgoingMessage) -> Result<(), TransportError>;
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), TransportError>;
    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct LiveTransport {
    client: AsyncClient,
}

impl LiveTransport {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for LiveTransport {
    // The request queue is bounded and nothing drains it while the eventloop
    // is reconnecting, so a full queue is an error instead of a wait.
    async fn publish(&self, message: OutgoingMessage) -> Result<(), TransportError> {
        self.client
            .try_publish(message.topic, message.qos, message.retain, message.payload.to_vec())?;
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), TransportError> {
        self.client.try_subscribe(filter, qos)?;
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.client.try_unsubscribe(filter)?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.client.try_disconnect()?;
        Ok(())
    }
}

/// No-op transport for dry runs
#[derive(Debug, Default)]
pub struct InertTransport;

#[async_trait]
impl Transport for InertTransport {
    async fn publish(&self, _message: OutgoingMessage) -> Result<(), TransportError> {
        Ok(())
    }

    async fn subscribe(&self, filter: &str, _qos: QoS) -> Result<(), TransportError> {
        debug!("Dry-run subscribe to {}", filter);
        Ok(())
    }

    async fn unsubscribe(&self, _filter: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    mode: RunMode,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, mode: RunMode) -> Self {
        Self { transport, mode }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub async fn publish(&self, message: OutgoingMessage) -> Result<(), TransportError> {
        if self.mode.traces_publishes() {
            let prefix = if self.mode.dry_run {
                "[DRY-RUN]"
            } else {
                "[DEBUG]"
            };
            info!("{} {}", prefix, message);
        }
        self.transport.publish(message).await
    }

    /// Status value, QoS 0
    pub async fn publish_status(
        &self,
        topic: String,
        payload: impl Into<bytes::Bytes>,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.publish(OutgoingMessage::new(topic, payload, retain)).await
    }

    pub async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.transport.subscribe(filter, QoS::AtMostOnce).await
    }

    pub async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.transport.unsubscribe(filter).await
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.transport.disconnect().await
    }
}
