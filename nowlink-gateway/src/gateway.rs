// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! High-level Gateway API
//!
//! [`Gateway`] owns the broker session and runs everything on one
//! cooperative tick. Receive contexts only touch the shared
//! [`IngressQueue`] (through [`receive`](crate::receive)).
//!
//! # Example
//!
//! ```rust
//! use nowlink::{ManualClock, RestartCounter, TelemetryRecord};
//! use nowlink_gateway::{receive, Gateway, GatewayConfig, ScriptedBroker, StaticProbe};
//!
//! let broker = ScriptedBroker::new();
//! let mut gateway = Gateway::new(
//!     &GatewayConfig::default(),
//!     broker.clone(),
//!     ManualClock::new(0),
//!     Box::new(RestartCounter::new()),
//!     Box::new(StaticProbe::default()),
//! )
//! .unwrap();
//!
//! let bytes = TelemetryRecord::new("front_door").with_message_id(1).to_bytes();
//! receive(&gateway.queue(), &gateway.stats(), &bytes);
//!
//! gateway.tick();
//! assert_eq!(broker.published_on("home/nowlink/front_door/state").len(), 1);
//! ```

use crate::broker::{Broker, Topics};
use crate::config::GatewayConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::Result;
use crate::forwarder::{ForwardOutcome, Forwarder};
use crate::health::{HealthReporter, HealthSample, SystemProbe};
use crate::ingress::IngressStats;
use crate::message::InitMessage;
use crate::peripherals::{Indicator, MotionSensor, MotionSource, StatusIndicator};
use crate::queue::IngressQueue;
use crate::watchdog::Watchdog;
use nowlink::{Clock, Restart};
use std::sync::Arc;

/// Summary of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Broker session live after connectivity maintenance
    pub connected: bool,
    /// What the forwarding step did
    pub forward: ForwardOutcome,
    /// The watchdog requested a restart during this tick
    pub restart_requested: bool,
}

/// Radio-to-broker gateway
pub struct Gateway<B: Broker, C: Clock> {
    broker: B,
    clock: C,
    topics: Topics,
    queue: Arc<IngressQueue>,
    stats: Arc<IngressStats>,
    connection: ConnectionManager,
    watchdog: Watchdog<Box<dyn Restart>>,
    forwarder: Forwarder,
    health: HealthReporter,
    probe: Box<dyn SystemProbe>,
    motion: Option<MotionSensor<Box<dyn MotionSource>>>,
    indicator: Option<StatusIndicator<Box<dyn Indicator>>>,
}

impl<B: Broker, C: Clock> Gateway<B, C> {
    /// Create a gateway
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`](crate::GatewayError::Config) if the
    /// configuration does not validate.
    pub fn new(
        config: &GatewayConfig,
        broker: B,
        clock: C,
        restarter: Box<dyn Restart>,
        probe: Box<dyn SystemProbe>,
    ) -> Result<Self> {
        config.validate()?;

        let now = clock.now_ms();
        let topics = Topics::new(&config.base_topic, &config.device_name);
        let queue = Arc::new(IngressQueue::new(config.queue_capacity));
        let init = InitMessage {
            version: config.version.clone(),
            tot_mem_kb: config.total_storage_kb,
            mac: config.station_address()?.to_string(),
            mac_ap: config.ap_address()?.to_string(),
            channel: config.channel,
        };

        tracing::info!(
            device = %config.device_name,
            base_topic = %config.base_topic,
            queue_capacity = config.queue_capacity,
            "gateway created"
        );

        Ok(Self {
            connection: ConnectionManager::new(
                &config.device_name,
                &topics,
                config.reconnect_interval_ms,
            ),
            watchdog: Watchdog::new(config.watchdog_timeout_ms(), now, restarter),
            forwarder: Forwarder::new(Arc::clone(&queue), topics.clone()),
            health: HealthReporter::new(topics.clone(), init, config.health_interval_ms, now),
            stats: Arc::new(IngressStats::new()),
            broker,
            clock,
            topics,
            queue,
            probe,
            motion: None,
            indicator: None,
        })
    }

    /// Attach a motion sensor published as `<base>/<name>/state`
    pub fn with_motion(mut self, name: &str, source: Box<dyn MotionSource>) -> Self {
        self.motion = Some(MotionSensor::new(name, &self.topics, source));
        self
    }

    /// Attach a connectivity indicator
    pub fn with_indicator(mut self, output: Box<dyn Indicator>) -> Self {
        self.indicator = Some(StatusIndicator::new(output));
        self
    }

    /// Shared ingress queue, for receive contexts
    pub fn queue(&self) -> Arc<IngressQueue> {
        Arc::clone(&self.queue)
    }

    /// Shared receive counters
    pub fn stats(&self) -> Arc<IngressStats> {
        Arc::clone(&self.stats)
    }

    /// Topic layout
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Broker session state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Records forwarded since start
    pub fn published(&self) -> u64 {
        self.forwarder.published()
    }

    /// Whether the startup report went out
    pub fn is_initialized(&self) -> bool {
        self.health.is_initialized()
    }

    /// The broker
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Run one cooperative tick
    ///
    /// Order: connectivity and watchdog, forwarding, health timers, attached
    /// peripherals.
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now_ms();

        let connected = self.connection.maintain(&mut self.broker, now);
        let restart_requested = self.watchdog.update(connected, now);
        if let Some(indicator) = self.indicator.as_mut() {
            indicator.update(connected);
        }

        let forward = self.forwarder.tick(&mut self.broker, connected);

        let sample = HealthSample {
            msg_count: self.forwarder.published(),
            queue_len: self.queue.depth(),
        };
        self.health
            .tick(&mut self.broker, self.probe.as_mut(), connected, now, sample);

        if let Some(motion) = self.motion.as_mut() {
            motion.tick(&mut self.broker, connected);
        }

        TickReport {
            connected,
            forward,
            restart_requested,
        }
    }
}
