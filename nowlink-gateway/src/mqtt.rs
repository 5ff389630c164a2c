// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! MQTT broker session over the synchronous `rumqttc` client
//!
//! The client's own reconnect loop is never used: when the connection
//! reports an error the session is torn down and the gateway's state
//! machine decides when to try again.

use nowlink_gateway::{Broker, BrokerConfig, BrokerError, SessionConfig};
use rumqttc::{
    Client, ConnectReturnCode, Connection, Event, LastWill, MqttOptions, Packet, QoS,
};
use std::time::{Duration, Instant};

/// Request channel capacity between client handle and event loop
const REQUEST_CAPACITY: usize = 64;

/// Wait used to service the event loop without stalling the tick
const POLL_WAIT: Duration = Duration::from_millis(1);

/// Events serviced per call at most
const MAX_EVENTS_PER_POLL: usize = 64;

struct Session {
    client: Client,
    connection: Connection,
}

/// `Broker` implementation backed by an MQTT 3.1.1 connection
pub struct MqttBroker {
    config: BrokerConfig,
    session: Option<Session>,
}

impl MqttBroker {
    /// Create a broker handle; nothing connects until `connect`
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn options(&self, session: &SessionConfig) -> MqttOptions {
        let mut options =
            MqttOptions::new(session.client_id.clone(), self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(1)));
        options.set_clean_session(true);
        if let Some(username) = &self.config.username {
            options.set_credentials(
                username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        options.set_last_will(LastWill::new(
            session.will.topic.clone(),
            session.will.payload.clone().into_bytes(),
            QoS::AtLeastOnce,
            session.will.retain,
        ));
        options
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            // Best effort; the socket may already be gone
            let _ = session.client.try_disconnect();
        }
    }

    /// Drain pending events; returns `false` if the session failed
    fn service(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        for _ in 0..MAX_EVENTS_PER_POLL {
            match session.connection.recv_timeout(POLL_WAIT) {
                Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                    tracing::warn!("broker closed the session");
                    self.teardown();
                    return false;
                }
                Ok(Ok(event)) => tracing::trace!(?event, "mqtt event"),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "mqtt connection error");
                    self.teardown();
                    return false;
                }
                // Nothing pending
                Err(_) => break,
            }
        }
        true
    }
}

impl Broker for MqttBroker {
    fn connect(&mut self, session: &SessionConfig) -> Result<(), BrokerError> {
        self.teardown();

        let (client, mut connection) = Client::new(self.options(session), REQUEST_CAPACITY);
        let deadline = Instant::now() + Duration::from_millis(self.config.connect_timeout_ms);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BrokerError::ConnectFailed(format!(
                    "no CONNACK from {}:{} within {} ms",
                    self.config.host, self.config.port, self.config.connect_timeout_ms
                )));
            }

            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BrokerError::ConnectFailed(format!(
                            "broker refused connection: {:?}",
                            ack.code
                        )));
                    }
                    tracing::debug!(
                        host = %self.config.host,
                        port = self.config.port,
                        "CONNACK received"
                    );
                    self.session = Some(Session { client, connection });
                    return Ok(());
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(BrokerError::ConnectFailed(e.to_string())),
                Err(_) => continue,
            }
        }
    }

    fn is_connected(&mut self) -> bool {
        self.service()
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BrokerError> {
        let Some(session) = self.session.as_mut() else {
            return Err(BrokerError::NotConnected);
        };

        session
            .client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| BrokerError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        if self.service() {
            Ok(())
        } else {
            Err(BrokerError::PublishFailed {
                topic: topic.to_string(),
                reason: "session lost while publishing".to_string(),
            })
        }
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowlink_gateway::LastWill as Will;

    fn session() -> SessionConfig {
        SessionConfig {
            client_id: "gateway_ff".to_string(),
            will: Will {
                topic: "home/nowlink/gateway_ff/LWT".to_string(),
                payload: "offline".to_string(),
                retain: true,
            },
        }
    }

    #[test]
    fn test_publish_without_session() {
        let mut broker = MqttBroker::new(BrokerConfig::default());
        assert!(!broker.is_connected());
        assert_eq!(
            broker.publish("t", b"x", false),
            Err(BrokerError::NotConnected)
        );
    }

    #[test]
    fn test_options_carry_will() {
        let broker = MqttBroker::new(BrokerConfig {
            username: Some("nowlink".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        });
        let options = broker.options(&session());

        assert_eq!(options.client_id(), "gateway_ff");
        assert_eq!(options.keep_alive(), Duration::from_secs(15));
        let will = options.last_will().unwrap();
        assert!(will.retain);
        assert_eq!(will.qos, QoS::AtLeastOnce);
    }
}
