//! Broker session lifecycle
//!
//! # State machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Lost(err) ──► Connecting ──► …
//! ```
//!
//! The initial connection is driven here with a [`RetryBudget`]. Once the
//! first ConnAck arrives the eventloop is handed to a driver task which keeps
//! polling it; rumqttc re-establishes the connection on the next poll after an
//! error, the driver only paces those polls and reports what happened as
//! [`SessionEvent`]s. Every ConnAck, the first one included, produces a
//! `Connected` event so the bridge can republish its state.

use super::message::IncomingMessage;
use super::retry::{ReconnectPolicy, RetryBudget, RetryPhase, RetryStep};
use super::topics::Topics;
use super::transport::{InertTransport, LiveTransport, Publisher};
use crate::config::{BrokerSettings, Config, RunMode};
use crate::mqtt::codec::FALSE;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 100;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Lost(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A (re)connection succeeded; downstream state must be republished
    Connected,
    Lost(String),
    Message(IncomingMessage),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Connection attempt cancelled by shutdown")]
    Cancelled,
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error("{0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("no ConnAck within {0:?}")]
    Timeout(Duration),
}

/// A usable broker session
pub struct Session {
    publisher: Publisher,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    // Kept so the event stream stays open for transports without a driver
    _events_tx: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Receiver<ConnectionState>,
    driver: Option<JoinHandle<()>>,
}

impl Session {
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Sends a clean disconnect and waits briefly for the driver to flush it.
    pub async fn close(mut self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.publisher.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to request disconnect: {}", e),
            Err(_) => warn!("Disconnect request timed out"),
        }

        if let Some(mut driver) = self.driver.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, &mut driver).await {
                Ok(_) => debug!("Eventloop driver finished"),
                Err(_) => {
                    warn!("Eventloop driver did not finish in time, aborting");
                    driver.abort();
                }
            }
        }
    }
}

pub struct ConnectionManager {
    broker: BrokerSettings,
    mode: RunMode,
    topics: Topics,
    budget: RetryBudget,
    reconnect: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(config: &Config, topics: Topics) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            broker: config.broker.clone(),
            mode: config.mode,
            topics,
            budget: RetryBudget::default(),
            reconnect: ReconnectPolicy::default(),
            state_tx,
        }
    }

    pub fn with_retry(mut self, budget: RetryBudget, reconnect: ReconnectPolicy) -> Self {
        self.budget = budget;
        self.reconnect = reconnect;
        self
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Blocks until a session is usable, or until `shutdown` fires.
    pub async fn connect(self, shutdown: &CancellationToken) -> Result<Session, ConnectError> {
        if self.mode.dry_run {
            Ok(self.connect_inert())
        } else {
            self.connect_live(shutdown).await
        }
    }

    /// Options for the live client. The last will is part of the CONNECT
    /// packet, so it is in place before the first attempt.
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.topics.device_id(),
            self.broker.host.clone(),
            self.broker.port,
        );
        options
            .set_keep_alive(KEEP_ALIVE)
            .set_clean_session(true)
            .set_last_will(LastWill::new(
                self.topics.alive(),
                FALSE,
                QoS::AtMostOnce,
                true,
            ));

        if let Some(user) = &self.broker.user {
            options.set_credentials(user.clone(), self.broker.password.clone().unwrap_or_default());
        }
        options
    }

    fn connect_inert(self) -> Session {
        info!("Dry-run mode: Simulating MQTT connection");

        let (events_tx, events) = mpsc::unbounded_channel();
        self.state_tx.send_replace(ConnectionState::Connected);
        let _ = events_tx.send(SessionEvent::Connected);

        Session {
            publisher: Publisher::new(Arc::new(InertTransport), self.mode),
            events,
            _events_tx: events_tx,
            state: self.state_tx.subscribe(),
            driver: None,
        }
    }

    async fn connect_live(mut self, shutdown: &CancellationToken) -> Result<Session, ConnectError> {
        let (client, mut eventloop) = AsyncClient::new(self.mqtt_options(), REQUEST_CAPACITY);
        self.state_tx.send_replace(ConnectionState::Connecting);

        loop {
            let attempt = self.budget.begin_attempt();
            match self.budget.phase() {
                RetryPhase::Bounded => info!(
                    "Attempting to connect to MQTT broker at {}:{} (attempt {}/{})",
                    self.broker.host,
                    self.broker.port,
                    attempt,
                    self.budget.bounded_attempts()
                ),
                RetryPhase::Unbounded => info!(
                    "Attempting to connect to MQTT broker at {}:{} (attempt {})",
                    self.broker.host, self.broker.port, attempt
                ),
            }

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    return Err(ConnectError::Cancelled);
                }
                outcome = await_connack(&mut eventloop) => outcome,
            };

            let error = match outcome {
                Ok(()) => break,
                Err(e) => e,
            };

            warn!("Failed to connect to MQTT: {}", error);
            let wait = match self.budget.on_failure() {
                RetryStep::Wait(delay) => {
                    info!("Retrying in {:?}...", delay);
                    delay
                }
                RetryStep::Exhausted => {
                    info!(
                        "Initial connection attempts failed. Will keep trying every {:?}...",
                        self.budget.ceiling()
                    );
                    Duration::ZERO
                }
            };

            if !wait.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        self.state_tx.send_replace(ConnectionState::Disconnected);
                        return Err(ConnectError::Cancelled);
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        info!("Successfully connected to MQTT broker");
        self.budget.reset();
        self.state_tx.send_replace(ConnectionState::Connected);

        let (events_tx, events) = mpsc::unbounded_channel();
        let _ = events_tx.send(SessionEvent::Connected);

        let driver = tokio::spawn(drive_eventloop(
            eventloop,
            events_tx.clone(),
            self.state_tx.clone(),
            self.reconnect.clone(),
        ));

        Ok(Session {
            publisher: Publisher::new(Arc::new(LiveTransport::new(client)), self.mode),
            events,
            _events_tx: events_tx,
            state: self.state_tx.subscribe(),
            driver: Some(driver),
        })
    }
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<(), AttemptError> {
    let wait = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(other) => debug!("Event before ConnAck: {:?}", other),
                Err(e) => return Err(AttemptError::from(e)),
            }
        }
    };

    tokio::time::timeout(CONNECT_TIMEOUT, wait)
        .await
        .unwrap_or(Err(AttemptError::Timeout(CONNECT_TIMEOUT)))
}

async fn drive_eventloop(
    mut eventloop: EventLoop,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<ConnectionState>,
    mut reconnect: ReconnectPolicy,
) {
    // Runs until the disconnect requested by `Session::close` goes out, so
    // anything published before closing is still flushed.
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT");
                reconnect.reset();
                state.send_replace(ConnectionState::Connected);
                let _ = events.send(SessionEvent::Connected);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = IncomingMessage::from_topic(publish.topic, publish.payload);
                info!("Received message: {}", message);
                let _ = events.send(SessionEvent::Message(message));
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnected from MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let was_connected = *state.borrow() == ConnectionState::Connected;
                if was_connected {
                    warn!("Disconnected from MQTT: {}", e);
                    state.send_replace(ConnectionState::Lost(e.to_string()));
                    let _ = events.send(SessionEvent::Lost(e.to_string()));
                } else {
                    debug!("Reconnect attempt failed: {}", e);
                }

                let delay = reconnect.next_delay();
                debug!("Reconnecting in {:?}", delay);
                tokio::time::sleep(delay).await;
                state.send_replace(ConnectionState::Connecting);
            }
        }
    }

    state.send_replace(ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::HostIdentity;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::Notify;
    use tokio::time::timeout;

    // MQTT 3.1.1 CONNACK, session not present, accepted
    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const WAIT: Duration = Duration::from_secs(5);

    async fn read_connect(socket: &mut TcpStream) {
        let mut buf = [0u8; 512];
        let read = socket.read(&mut buf).await.unwrap();
        assert_eq!(buf[0] >> 4, 1, "expected a CONNECT packet, got {:?}", &buf[..read]);
    }

    async fn local_broker() -> (TcpListener, Config) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = config(&format!("mqtt_ip: 127.0.0.1\nmqtt_port: {port}\n"));
        (listener, config)
    }

    fn quick_retry(manager: ConnectionManager) -> ConnectionManager {
        manager.with_retry(
            RetryBudget::new(Duration::from_millis(100), Duration::from_millis(200), 3),
            ReconnectPolicy::new(Duration::from_millis(300), Duration::from_millis(300)),
        )
    }

    async fn next(session: &mut Session) -> SessionEvent {
        timeout(WAIT, session.next_event()).await.unwrap().unwrap()
    }

    fn topics() -> Topics {
        Topics::new(HostIdentity::from_hostname("mbp-workstation.local").unwrap())
    }

    fn config(yaml: &str) -> Config {
        Config::from_yaml_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn dry_run_session_is_connected_without_network() {
        let manager = ConnectionManager::new(&config("dry_run: true\n"), topics());
        let state = manager.watch_state();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);

        let token = CancellationToken::new();
        let mut session = manager.connect(&token).await.unwrap();

        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(*state.borrow(), ConnectionState::Connected);
        assert_eq!(session.next_event().await, Some(SessionEvent::Connected));
        assert!(session.driver.is_none());
        assert!(session.publisher().mode().dry_run);

        session.close().await;
    }

    #[test]
    fn last_will_marks_host_offline() {
        let manager = ConnectionManager::new(
            &config("mqtt_ip: broker\nmqtt_port: 1884\nmqtt_user: u\nmqtt_password: p\n"),
            topics(),
        );
        let options = manager.mqtt_options();

        let will = options.last_will().unwrap();
        assert_eq!(will.topic, "mac2mqtt/mbp-workstationlocal/status/alive");
        assert_eq!(&will.message[..], b"false");
        assert_eq!(will.qos, QoS::AtMostOnce);
        assert!(will.retain);

        assert_eq!(options.broker_address(), ("broker".to_string(), 1884));
        assert_eq!(options.client_id(), "mac2mqtt_mbp-workstationlocal");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_shutdown_stops_initial_retry() {
        // Port 9 on loopback refuses connections immediately
        let manager = ConnectionManager::new(&config("mqtt_ip: 127.0.0.1\nmqtt_port: 9\n"), topics())
            .with_retry(
                RetryBudget::new(Duration::from_secs(1), Duration::from_secs(2), 3),
                ReconnectPolicy::default(),
            );
        let state = manager.watch_state();
        let token = CancellationToken::new();
        let canceller = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            canceller.cancel();
        });

        let result = manager.connect(&token).await;
        assert!(matches!(result, Err(ConnectError::Cancelled)));
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_emits_connected_again() {
        let (listener, config) = local_broker().await;
        let release = Arc::new(Notify::new());
        let broker_release = release.clone();
        let broker = tokio::spawn(async move {
            let (mut first, _) = listener.accept().await.unwrap();
            read_connect(&mut first).await;
            first.write_all(&CONNACK).await.unwrap();
            drop(first);

            let (mut second, _) = listener.accept().await.unwrap();
            read_connect(&mut second).await;
            broker_release.notified().await;
            second.write_all(&CONNACK).await.unwrap();
            std::future::pending::<()>().await;
        });

        let manager = quick_retry(ConnectionManager::new(&config, topics()));
        let mut state = manager.watch_state();
        let token = CancellationToken::new();
        let mut session = timeout(WAIT, manager.connect(&token)).await.unwrap().unwrap();

        assert_eq!(next(&mut session).await, SessionEvent::Connected);
        assert!(matches!(next(&mut session).await, SessionEvent::Lost(_)));
        assert!(matches!(session.state(), ConnectionState::Lost(_)));

        timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connecting))
            .await
            .unwrap()
            .unwrap();
        release.notify_one();

        assert_eq!(next(&mut session).await, SessionEvent::Connected);
        assert_eq!(session.state(), ConnectionState::Connected);

        broker.abort();
        session.close().await;
    }

    #[tokio::test]
    async fn publishes_fail_fast_while_broker_is_gone() {
        let (listener, config) = local_broker().await;
        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_connect(&mut socket).await;
            socket.write_all(&CONNACK).await.unwrap();
            // Socket and listener both go away, reconnects are refused
        });

        let manager = quick_retry(ConnectionManager::new(&config, topics()));
        let token = CancellationToken::new();
        let mut session = timeout(WAIT, manager.connect(&token)).await.unwrap().unwrap();
        broker.await.unwrap();

        assert_eq!(next(&mut session).await, SessionEvent::Connected);
        assert!(matches!(next(&mut session).await, SessionEvent::Lost(_)));
        assert_ne!(session.state(), ConnectionState::Connected);

        let publisher = session.publisher();
        let mut failed = 0;
        for i in 0..(REQUEST_CAPACITY * 2) {
            let result = timeout(
                Duration::from_secs(1),
                publisher.publish_status(format!("mac2mqtt/test/{i}"), "1", false),
            )
            .await
            .unwrap();
            if result.is_err() {
                failed += 1;
            }
        }
        assert!(failed > 0);

        timeout(WAIT, session.close()).await.unwrap();
    }
}
