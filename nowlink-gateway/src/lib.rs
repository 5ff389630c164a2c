// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # NowLink Gateway - Radio to MQTT forwarding
//!
//! Receives NowLink telemetry records from battery-powered nodes and
//! forwards them to an MQTT broker as JSON.
//!
//! ## Overview
//!
//! Nodes wake, send one fixed-layout record with acknowledgement, and go
//! back to sleep. The gateway accepts records in its receive context, buffers
//! them in a bounded queue, and publishes them from a single cooperative
//! loop that also keeps the broker session alive and reports its own health.
//!
//! ## Features
//!
//! - **Bounded ingress**: drop-on-full queue that never blocks the receiver
//! - **At-least-once forwarding**: a record leaves the queue only once published
//! - **Reconnect state machine**: rate-limited, with retained presence and last-will
//! - **Watchdog**: restarts the process after a prolonged broker outage
//! - **Health reports**: startup, status and network companion topics
//!
//! ## Quick Start
//!
//! ```rust
//! use nowlink::{ManualClock, RestartCounter, TelemetryRecord};
//! use nowlink_gateway::{receive, Gateway, GatewayConfig, ScriptedBroker, StaticProbe};
//!
//! let config = GatewayConfig {
//!     device_name: "gateway_ff".to_string(),
//!     base_topic: "home/espnow".to_string(),
//!     ..Default::default()
//! };
//! let broker = ScriptedBroker::new();
//! let clock = ManualClock::new(0);
//!
//! let mut gateway = Gateway::new(
//!     &config,
//!     broker.clone(),
//!     clock.clone(),
//!     Box::new(RestartCounter::new()),
//!     Box::new(StaticProbe::default()),
//! )
//! .unwrap();
//!
//! // Receive context
//! let record = TelemetryRecord::new("front_door")
//!     .with_message_id(1)
//!     .with_ints([1, 3012, 85, 0]);
//! receive(&gateway.queue(), &gateway.stats(), &record.to_bytes());
//!
//! // Main loop
//! gateway.tick();
//! clock.advance(10);
//!
//! let published = broker.published_on("home/espnow/front_door/state");
//! assert_eq!(published.len(), 1);
//! assert!(published[0].payload.contains("\"ival2\":3012"));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  receive()  ┌──────────────┐  tick()  ┌───────────────┐
//! │ Radio / UDP  │────────────▶│ IngressQueue │─────────▶│  Forwarder    │──▶ <base>/<dev>/state
//! └──────────────┘             └──────────────┘          ├───────────────┤
//!                                                        │ Connection    │──▶ <base>/<gw>/LWT
//!                                                        │ Watchdog      │
//!                                                        │ HealthReporter│──▶ <base>/<gw>/{init,state,wifi}
//!                                                        │ MotionSensor  │──▶ <base>/<motion>/state
//!                                                        └───────────────┘
//! ```

mod broker;
mod config;
mod connection;
mod error;
mod forwarder;
mod gateway;
mod health;
mod ingress;
mod message;
mod peripherals;
mod queue;
mod watchdog;

pub use broker::{
    Broker, LastWill, Published, ScriptedBroker, SessionConfig, Topics, PRESENCE_OFFLINE,
    PRESENCE_ONLINE,
};
pub use config::{BrokerConfig, GatewayConfig, MotionConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{BrokerError, GatewayError, Result};
pub use forwarder::{ForwardOutcome, Forwarder};
pub use gateway::{Gateway, TickReport};
pub use health::{
    format_uptime, message_rate, HealthReporter, HealthSample, StaticProbe, SystemProbe,
    DEFAULT_INTERVAL_MS,
};
pub use ingress::{is_topic_level, receive, IngressStats, ReceiveOutcome};
pub use message::{HealthMessage, InitMessage, RecordMessage, WifiMessage};
pub use peripherals::{
    Indicator, MotionSensor, MotionSource, StatusIndicator, ValueFileIndicator, ValueFileSource,
    MOTION_OFF, MOTION_ON,
};
pub use queue::{IngressQueue, DEFAULT_CAPACITY};
pub use watchdog::{Watchdog, DEFAULT_TIMEOUT_MS};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
