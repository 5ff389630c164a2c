// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Broker reconnection state machine
//!
//! ```text
//! Disconnected ──attempt──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │
//!      └────────failed──────────┘◀──────lost───────┘
//! ```
//!
//! Attempts are rate-limited to one per retry interval. The first attempt
//! happens on the first call.

use crate::broker::{Broker, LastWill, SessionConfig, Topics, PRESENCE_OFFLINE, PRESENCE_ONLINE};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session
    Disconnected,
    /// Attempt in progress
    Connecting,
    /// Session established
    Connected,
}

/// Keeps the broker session alive
#[derive(Debug)]
pub struct ConnectionManager {
    session: SessionConfig,
    retry_interval_ms: u64,
    state: ConnectionState,
    last_transition_ms: u64,
    last_attempt_ms: Option<u64>,
    sessions_opened: u32,
}

impl ConnectionManager {
    /// Create a manager for the client `client_id`
    ///
    /// The session registers a retained `"offline"` last-will on the
    /// gateway's LWT topic.
    pub fn new(client_id: &str, topics: &Topics, retry_interval_ms: u64) -> Self {
        Self {
            session: SessionConfig {
                client_id: client_id.to_string(),
                will: LastWill {
                    topic: topics.lwt(),
                    payload: PRESENCE_OFFLINE.to_string(),
                    retain: true,
                },
            },
            retry_interval_ms,
            state: ConnectionState::Disconnected,
            last_transition_ms: 0,
            last_attempt_ms: None,
            sessions_opened: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Time of the last state change
    pub fn last_transition_ms(&self) -> u64 {
        self.last_transition_ms
    }

    /// Sessions successfully opened so far
    pub fn sessions_opened(&self) -> u32 {
        self.sessions_opened
    }

    /// Session parameters used for every attempt
    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Detect session loss and reconnect when due; returns whether connected
    pub fn maintain<B: Broker + ?Sized>(&mut self, broker: &mut B, now_ms: u64) -> bool {
        if broker.is_connected() {
            if self.state != ConnectionState::Connected {
                self.transition(ConnectionState::Connected, now_ms);
            }
            return true;
        }

        if self.state == ConnectionState::Connected {
            tracing::warn!("broker session lost");
            self.transition(ConnectionState::Disconnected, now_ms);
        }

        let due = self
            .last_attempt_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.retry_interval_ms);
        if !due {
            return false;
        }

        self.last_attempt_ms = Some(now_ms);
        self.transition(ConnectionState::Connecting, now_ms);
        tracing::info!(client_id = %self.session.client_id, "connecting to broker");

        match broker.connect(&self.session) {
            Ok(()) => {
                self.sessions_opened += 1;
                self.transition(ConnectionState::Connected, now_ms);
                if let Err(e) = broker.publish(
                    &self.session.will.topic,
                    PRESENCE_ONLINE.as_bytes(),
                    true,
                ) {
                    tracing::warn!(error = %e, "failed to publish presence");
                }
                tracing::info!("broker connected");
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in_ms = self.retry_interval_ms,
                    "broker connection failed"
                );
                self.transition(ConnectionState::Disconnected, now_ms);
                false
            }
        }
    }

    fn transition(&mut self, state: ConnectionState, now_ms: u64) {
        tracing::debug!(from = ?self.state, to = ?state, "connection state");
        self.state = state;
        self.last_transition_ms = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ScriptedBroker;

    fn manager() -> ConnectionManager {
        ConnectionManager::new("gw", &Topics::new("home/nowlink", "gw"), 5_000)
    }

    #[test]
    fn test_first_attempt_is_immediate() {
        let mut conn = manager();
        let mut broker = ScriptedBroker::new();

        assert!(conn.maintain(&mut broker, 0));
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.sessions_opened(), 1);

        let presence = broker.published_on("home/nowlink/gw/LWT");
        assert_eq!(presence.len(), 1);
        assert_eq!(presence[0].payload, "online");
        assert!(presence[0].retain);

        let will = broker.session().unwrap().will;
        assert_eq!(will.topic, "home/nowlink/gw/LWT");
        assert_eq!(will.payload, "offline");
        assert!(will.retain);
    }

    #[test]
    fn test_attempts_rate_limited() {
        let mut conn = manager();
        let mut broker = ScriptedBroker::new();
        broker.set_reachable(false);

        for now in (0..20_000).step_by(100) {
            conn.maintain(&mut broker, now);
        }
        // Attempts at 0, 5000, 10000, 15000
        assert_eq!(broker.connect_attempts(), 4);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.last_transition_ms(), 15_000);
    }

    #[test]
    fn test_loss_detected_and_recovered() {
        let mut conn = manager();
        let mut broker = ScriptedBroker::new();
        conn.maintain(&mut broker, 0);

        broker.drop_session();
        broker.fail_next_connects(1);
        assert!(!conn.maintain(&mut broker, 6_000));
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        assert!(!conn.maintain(&mut broker, 7_000));
        assert!(conn.maintain(&mut broker, 11_000));
        assert_eq!(conn.sessions_opened(), 2);
        assert_eq!(broker.published_on("home/nowlink/gw/LWT").len(), 2);
    }

    #[test]
    fn test_connected_makes_no_attempts() {
        let mut conn = manager();
        let mut broker = ScriptedBroker::new();
        for now in 0..100 {
            assert!(conn.maintain(&mut broker, now * 1_000));
        }
        assert_eq!(broker.connect_attempts(), 1);
    }
}
