//! # MQTT Integration Module
//!
//! Everything that touches the broker: topic naming, payload encoding,
//! discovery documents and the session lifecycle.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── topics.rs      - Topic strings derived from the host identity
//! ├── codec.rs       - Plain-text status payloads and command validation
//! ├── discovery.rs   - Home Assistant discovery documents
//! ├── message.rs     - Incoming/outgoing message representation
//! ├── transport.rs   - Live and inert transports, traced publisher handle
//! ├── retry.rs       - Backoff for the initial connection and reconnects
//! └── connection.rs  - Connection state machine and eventloop driver
//! ```
//!
//! ## Wire Surface
//!
//! QoS 0 throughout. The alive topic and the discovery documents are retained,
//! every other status topic is not. The last will (`alive=false`, retained) is
//! registered with the CONNECT packet so observers learn about unclean
//! disconnects.
//!
//! ## Dry Run
//!
//! With `dry_run` set the connection manager hands out an inert transport and
//! an already-connected session. Everything downstream runs unmodified and the
//! publish trace is identical to a live run; no socket is opened.

pub mod codec;
pub mod connection;
pub mod discovery;
pub mod message;
pub mod retry;
pub mod topics;
pub mod transport;
