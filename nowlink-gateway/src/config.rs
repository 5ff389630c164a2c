// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for NowLink Gateway
//!
//! Every field has a default, so a JSON file only needs the values that
//! differ from a stock install:
//!
//! ```json
//! {
//!   "device_name": "gateway_ff",
//!   "broker": { "host": "192.168.1.10", "username": "nowlink" },
//!   "motion": {
//!     "name": "family_room_motion",
//!     "value_path": "/sys/class/gpio/gpio13/value"
//!   }
//! }
//! ```

use crate::error::{GatewayError, Result};
use nowlink::{MacAddress, WifiChannel};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name or address
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Optional user name
    pub username: Option<String>,
    /// Optional password, only used together with `username`
    pub password: Option<String>,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
    /// Time allowed for the broker to accept a connection, in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            keep_alive_secs: 15,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Optional motion sensor attached to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Name used as the sensor's topic segment
    pub name: String,
    /// File holding the sensor level as `0`/`1`, e.g. a sysfs GPIO `value`
    pub value_path: String,
}

/// Gateway-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway name, used as client id and topic segment (no spaces)
    pub device_name: String,

    /// Topic prefix shared by the gateway and every node
    pub base_topic: String,

    /// Broker connection settings
    pub broker: BrokerConfig,

    /// Ingress queue capacity (default: 50)
    pub queue_capacity: usize,

    /// Minimum time between reconnect attempts (default: 5000 ms)
    pub reconnect_interval_ms: u64,

    /// Status report interval (default: 30 s)
    pub health_interval_ms: u64,

    /// Restart after the broker has been unreachable this long (default: 600 s)
    pub watchdog_timeout_secs: u64,

    /// Version string published in the startup report
    pub version: String,

    /// UDP address the host ingress listens on
    pub listen: String,

    /// Operating radio channel reported in the startup report
    pub channel: u8,

    /// Station hardware address
    pub mac: String,

    /// Soft-AP hardware address
    pub mac_ap: String,

    /// Total storage reported in the startup report, in KB
    pub total_storage_kb: f64,

    /// Attached motion sensor, if any
    pub motion: Option<MotionConfig>,

    /// Value file of a status indicator driven from broker connectivity
    pub status_led: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            device_name: "nowlink_gateway".to_string(),
            base_topic: "home/nowlink".to_string(),
            broker: BrokerConfig::default(),
            queue_capacity: 50,
            reconnect_interval_ms: 5_000,
            health_interval_ms: 30_000,
            watchdog_timeout_secs: 600,
            version: crate::VERSION.to_string(),
            listen: "0.0.0.0:4210".to_string(),
            channel: 1,
            mac: "02:00:00:00:00:01".to_string(),
            mac_ap: "02:00:00:00:00:02".to_string(),
            total_storage_kb: 4096.0,
            motion: None,
            status_led: None,
        }
    }
}

impl GatewayConfig {
    /// Load a JSON configuration file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the gateway misbehave
    pub fn validate(&self) -> Result<()> {
        check_topic_segment("device_name", &self.device_name)?;
        if self.base_topic.trim_matches('/').is_empty() {
            return Err(invalid("base_topic must not be empty"));
        }
        if let Some(motion) = &self.motion {
            check_topic_segment("motion.name", &motion.name)?;
            if motion.value_path.is_empty() {
                return Err(invalid("motion.value_path must not be empty"));
            }
        }
        if self.broker.host.is_empty() {
            return Err(invalid("broker.host must not be empty"));
        }
        if self.broker.port == 0 {
            return Err(invalid("broker.port must not be 0"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be at least 1"));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(invalid("reconnect_interval_ms must be at least 1"));
        }
        if self.health_interval_ms == 0 {
            return Err(invalid("health_interval_ms must be at least 1"));
        }
        if self.watchdog_timeout_secs == 0 {
            return Err(invalid("watchdog_timeout_secs must be at least 1"));
        }
        if WifiChannel::new(self.channel).is_none() {
            return Err(invalid(&format!(
                "channel {} outside 1-14",
                self.channel
            )));
        }
        self.station_address()?;
        self.ap_address()?;
        Ok(())
    }

    /// Parsed station hardware address
    pub fn station_address(&self) -> Result<MacAddress> {
        self.mac
            .parse()
            .map_err(|e| invalid(&format!("mac: {}", e)))
    }

    /// Parsed soft-AP hardware address
    pub fn ap_address(&self) -> Result<MacAddress> {
        self.mac_ap
            .parse()
            .map_err(|e| invalid(&format!("mac_ap: {}", e)))
    }

    /// Watchdog timeout in milliseconds
    pub fn watchdog_timeout_ms(&self) -> u64 {
        self.watchdog_timeout_secs.saturating_mul(1000)
    }
}

fn invalid(message: &str) -> GatewayError {
    GatewayError::Config(message.to_string())
}

fn check_topic_segment(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(&format!("{} must not be empty", field)));
    }
    if value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '+' | '#'))
    {
        return Err(invalid(&format!(
            "{} '{}' must not contain spaces, '/', '+' or '#'",
            field, value
        )));
    }
    Ok(())
}
