// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Broker abstraction and topic layout
//!
//! The gateway only needs three things from a broker session: connect with a
//! last-will, report liveness, publish. [`Broker`] captures that; the MQTT
//! client lives in the binary and [`ScriptedBroker`] stands in for it in
//! tests and dry runs.

use crate::error::BrokerError;
use std::sync::{Arc, Mutex, MutexGuard};

/// Presence payload published while the gateway is up
pub const PRESENCE_ONLINE: &str = "online";

/// Presence payload the broker publishes on an unclean disconnect
pub const PRESENCE_OFFLINE: &str = "offline";

/// Last-will message registered with a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    /// Topic the broker publishes on
    pub topic: String,
    /// Payload published
    pub payload: String,
    /// Retain flag
    pub retain: bool,
}

/// Parameters of one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Client identifier
    pub client_id: String,
    /// Last-will registration
    pub will: LastWill,
}

/// Publish/subscribe broker session
pub trait Broker {
    /// Open a new session; replaces any previous one
    fn connect(&mut self, session: &SessionConfig) -> Result<(), BrokerError>;

    /// Service pending network events and report whether the session is live
    fn is_connected(&mut self) -> bool;

    /// Publish a payload
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BrokerError>;
}

/// Topic names derived from the base topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
    gateway: String,
}

impl Topics {
    /// Create the layout for a gateway named `gateway` under `base`
    pub fn new(base: &str, gateway: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            gateway: gateway.to_string(),
        }
    }

    /// `<base>/<device>/state`, where node records go
    pub fn device_state(&self, device: &str) -> String {
        format!("{}/{}/state", self.base, device)
    }

    /// `<base>/<gateway>/LWT`
    pub fn lwt(&self) -> String {
        self.gateway_topic("LWT")
    }

    /// `<base>/<gateway>/init`
    pub fn init(&self) -> String {
        self.gateway_topic("init")
    }

    /// `<base>/<gateway>/state`, the gateway's own status
    pub fn health(&self) -> String {
        self.gateway_topic("state")
    }

    /// `<base>/<gateway>/wifi`
    pub fn wifi(&self) -> String {
        self.gateway_topic("wifi")
    }

    fn gateway_topic(&self, leaf: &str) -> String {
        format!("{}/{}/{}", self.base, self.gateway, leaf)
    }
}

/// A message accepted by [`ScriptedBroker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Topic
    pub topic: String,
    /// Payload as text
    pub payload: String,
    /// Retain flag
    pub retain: bool,
}

#[derive(Debug, Default)]
struct ScriptState {
    connected: bool,
    reachable: bool,
    connect_attempts: u32,
    fail_connects: u32,
    fail_publishes: u32,
    publish_attempts: u32,
    session: Option<SessionConfig>,
    published: Vec<Published>,
}

/// In-memory broker with scripted failures
///
/// Clones share state, so a test can keep a handle while the gateway owns
/// another.
#[derive(Debug, Clone)]
pub struct ScriptedBroker {
    state: Arc<Mutex<ScriptState>>,
}

impl Default for ScriptedBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBroker {
    /// Create a reachable broker
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                reachable: true,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the broker reachable or not; going unreachable drops the session
    pub fn set_reachable(&self, reachable: bool) {
        let mut state = self.lock();
        state.reachable = reachable;
        if !reachable {
            state.connected = false;
        }
    }

    /// Drop the current session as a network failure would
    pub fn drop_session(&self) {
        self.lock().connected = false;
    }

    /// Fail the next `n` connection attempts
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().fail_connects = n;
    }

    /// Fail the next `n` publishes
    pub fn fail_next_publishes(&self, n: u32) {
        self.lock().fail_publishes = n;
    }

    /// Connection attempts so far
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Publish attempts so far, failed ones included
    pub fn publish_attempts(&self) -> u32 {
        self.lock().publish_attempts
    }

    /// Session parameters of the last connect
    pub fn session(&self) -> Option<SessionConfig> {
        self.lock().session.clone()
    }

    /// Messages accepted so far
    pub fn published(&self) -> Vec<Published> {
        self.lock().published.clone()
    }

    /// Messages accepted on `topic`
    pub fn published_on(&self, topic: &str) -> Vec<Published> {
        self.lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }
}

impl Broker for ScriptedBroker {
    fn connect(&mut self, session: &SessionConfig) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if !state.reachable {
            return Err(BrokerError::ConnectFailed("broker unreachable".to_string()));
        }
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(BrokerError::ConnectFailed("connection refused".to_string()));
        }
        state.connected = true;
        state.session = Some(session.clone());
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.lock().connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.publish_attempts += 1;
        if !state.connected {
            return Err(BrokerError::NotConnected);
        }
        if topic.contains(['+', '#']) {
            return Err(BrokerError::PublishFailed {
                topic: topic.to_string(),
                reason: "wildcard in publish topic".to_string(),
            });
        }
        if state.fail_publishes > 0 {
            state.fail_publishes -= 1;
            return Err(BrokerError::PublishFailed {
                topic: topic.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        state.published.push(Published {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            retain,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionConfig {
        SessionConfig {
            client_id: "gw".to_string(),
            will: LastWill {
                topic: "home/gw/LWT".to_string(),
                payload: PRESENCE_OFFLINE.to_string(),
                retain: true,
            },
        }
    }

    #[test]
    fn test_topics() {
        let topics = Topics::new("home/espnow/", "gateway_ff");
        assert_eq!(topics.device_state("door"), "home/espnow/door/state");
        assert_eq!(topics.lwt(), "home/espnow/gateway_ff/LWT");
        assert_eq!(topics.init(), "home/espnow/gateway_ff/init");
        assert_eq!(topics.health(), "home/espnow/gateway_ff/state");
        assert_eq!(topics.wifi(), "home/espnow/gateway_ff/wifi");
    }

    #[test]
    fn test_scripted_publish_requires_session() {
        let mut broker = ScriptedBroker::new();
        assert_eq!(
            broker.publish("t", b"x", false),
            Err(BrokerError::NotConnected)
        );

        broker.connect(&session()).unwrap();
        broker.publish("t", b"x", true).unwrap();
        assert_eq!(broker.published_on("t")[0].payload, "x");
        assert!(broker.published_on("t")[0].retain);
    }

    #[test]
    fn test_scripted_failures() {
        let mut broker = ScriptedBroker::new();
        let observer = broker.clone();
        broker.fail_next_connects(1);
        assert!(broker.connect(&session()).is_err());
        broker.connect(&session()).unwrap();
        assert_eq!(observer.connect_attempts(), 2);
        assert_eq!(observer.session().map(|s| s.will.payload), Some("offline".into()));

        broker.fail_next_publishes(1);
        assert!(broker.publish("t", b"1", false).is_err());
        assert!(broker.publish("t", b"2", false).is_ok());
        assert_eq!(observer.publish_attempts(), 2);
        assert_eq!(observer.published().len(), 1);

        observer.set_reachable(false);
        assert!(!broker.is_connected());
    }
}
