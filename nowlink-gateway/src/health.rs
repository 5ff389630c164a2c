// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Gateway health reporting
//!
//! Three companion messages describe the gateway itself:
//!
//! | Topic                    | Retained | When                                 |
//! |--------------------------|----------|--------------------------------------|
//! | `<base>/<gateway>/init`  | yes      | once, after the first connect        |
//! | `<base>/<gateway>/state` | no       | every interval                       |
//! | `<base>/<gateway>/wifi`  | yes      | with every status report             |

use crate::broker::{Broker, Topics};
use crate::message::{HealthMessage, InitMessage, WifiMessage};
use serde::Serialize;

/// Default status report interval
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

/// Host measurements used by the status reports
pub trait SystemProbe {
    /// Free memory in bytes
    fn free_memory_bytes(&mut self) -> u64;

    /// Current network address
    fn ip_address(&mut self) -> String;

    /// Received signal strength in dBm, 0 if unknown
    fn rssi(&mut self) -> i32;
}

/// Probe returning fixed values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticProbe {
    /// Reported free memory in bytes
    pub free_memory_bytes: u64,
    /// Reported address
    pub ip_address: String,
    /// Reported signal strength
    pub rssi: i32,
}

impl Default for StaticProbe {
    fn default() -> Self {
        Self {
            free_memory_bytes: 0,
            ip_address: "0.0.0.0".to_string(),
            rssi: 0,
        }
    }
}

impl SystemProbe for StaticProbe {
    fn free_memory_bytes(&mut self) -> u64 {
        self.free_memory_bytes
    }

    fn ip_address(&mut self) -> String {
        self.ip_address.clone()
    }

    fn rssi(&mut self) -> i32 {
        self.rssi
    }
}

/// Format an uptime as `D HH:MM:SS ago`
pub fn format_uptime(uptime_ms: u64) -> String {
    let secs = uptime_ms / 1000;
    format!(
        "{} {:02}:{:02}:{:02} ago",
        secs / 86_400,
        (secs / 3_600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

/// Messages per minute over one interval, rounded to one decimal
pub fn message_rate(count: u64, count_at_last_report: u64, interval_ms: u64) -> f64 {
    if interval_ms == 0 {
        return 0.0;
    }
    let minutes = interval_ms as f64 / 60_000.0;
    let rate = count.saturating_sub(count_at_last_report) as f64 / minutes;
    (rate * 10.0).round() / 10.0
}

/// Counters sampled for one status report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSample {
    /// Records published since start
    pub msg_count: u64,
    /// Current ingress queue depth
    pub queue_len: usize,
}

/// Publishes the startup, status and wifi reports
#[derive(Debug)]
pub struct HealthReporter {
    topics: Topics,
    init: InitMessage,
    interval_ms: u64,
    started_ms: u64,
    initialized: bool,
    last_init_attempt_ms: Option<u64>,
    last_report_ms: u64,
    count_at_last_report: u64,
    last_rate: f64,
    reports_sent: u64,
}

impl HealthReporter {
    /// Create a reporter; the first status report is due one interval after
    /// `now_ms`
    pub fn new(topics: Topics, init: InitMessage, interval_ms: u64, now_ms: u64) -> Self {
        Self {
            topics,
            init,
            interval_ms,
            started_ms: now_ms,
            initialized: false,
            last_init_attempt_ms: None,
            last_report_ms: now_ms,
            count_at_last_report: 0,
            last_rate: 0.0,
            reports_sent: 0,
        }
    }

    /// Whether the startup report has been delivered
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Rate computed for the most recent status report
    pub fn last_rate(&self) -> f64 {
        self.last_rate
    }

    /// Status reports delivered
    pub fn reports_sent(&self) -> u64 {
        self.reports_sent
    }

    /// Run the report timers
    pub fn tick<B: Broker + ?Sized>(
        &mut self,
        broker: &mut B,
        probe: &mut dyn SystemProbe,
        connected: bool,
        now_ms: u64,
        sample: HealthSample,
    ) {
        if connected && !self.initialized {
            let due = self
                .last_init_attempt_ms
                .map_or(true, |last| now_ms.saturating_sub(last) >= self.interval_ms);
            if due {
                self.last_init_attempt_ms = Some(now_ms);
                let topic = self.topics.init();
                self.initialized = publish_json(broker, &topic, &self.init, true);
                if self.initialized {
                    tracing::info!(%topic, version = %self.init.version, "startup report sent");
                }
            }
        }

        if now_ms.saturating_sub(self.last_report_ms) < self.interval_ms {
            return;
        }

        self.last_rate = message_rate(sample.msg_count, self.count_at_last_report, self.interval_ms);
        self.count_at_last_report = sample.msg_count;
        self.last_report_ms = now_ms;

        if !connected {
            tracing::debug!(rate = self.last_rate, "broker offline, status report skipped");
            return;
        }

        let health = HealthMessage {
            uptime: format_uptime(now_ms.saturating_sub(self.started_ms)),
            mem_free_kb: probe.free_memory_bytes() / 1024,
            msg_count: sample.msg_count,
            queue_len: sample.queue_len,
            msg_rate: self.last_rate,
        };
        if publish_json(broker, &self.topics.health(), &health, false) {
            self.reports_sent += 1;
        }

        let wifi = WifiMessage {
            ip_address: probe.ip_address(),
            rssi: probe.rssi(),
        };
        publish_json(broker, &self.topics.wifi(), &wifi, true);
    }
}

fn publish_json<B: Broker + ?Sized, T: Serialize>(
    broker: &mut B,
    topic: &str,
    message: &T,
    retain: bool,
) -> bool {
    let payload = match serde_json::to_vec(message) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(%topic, error = %e, "failed to serialize report");
            return false;
        }
    };
    match broker.publish(topic, &payload, retain) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(%topic, error = %e, "failed to publish report");
            false
        }
    }
}
