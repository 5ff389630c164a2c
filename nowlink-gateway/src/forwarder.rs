// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Broker forwarding loop
//!
//! One record per tick moves from the ingress queue to the broker. The head
//! record is leased (copied into the in-flight slot, left in the queue) and
//! only removed once the broker accepted it, so a broker outage never loses
//! a record: delivery is at-least-once with head-of-line blocking.

use crate::broker::{Broker, Topics};
use crate::message::RecordMessage;
use crate::queue::IngressQueue;
use nowlink::TelemetryRecord;
use std::sync::Arc;

/// What a forwarding tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Broker not connected, nothing attempted
    Offline,
    /// Queue empty
    Idle,
    /// The in-flight record was published and removed from the queue
    Published,
    /// Publish failed; the record stays in flight for the next tick
    Retained,
}

/// Drains the ingress queue into the broker
#[derive(Debug)]
pub struct Forwarder {
    queue: Arc<IngressQueue>,
    topics: Topics,
    in_flight: Option<TelemetryRecord>,
    published: u64,
    failed_attempts: u64,
}

impl Forwarder {
    /// Create a forwarder for `queue`
    pub fn new(queue: Arc<IngressQueue>, topics: Topics) -> Self {
        Self {
            queue,
            topics,
            in_flight: None,
            published: 0,
            failed_attempts: 0,
        }
    }

    /// Records published since start
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Publish attempts that failed since start
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts
    }

    /// Record currently awaiting a successful publish
    pub fn in_flight(&self) -> Option<&TelemetryRecord> {
        self.in_flight.as_ref()
    }

    /// Run one forwarding step
    pub fn tick<B: Broker + ?Sized>(&mut self, broker: &mut B, connected: bool) -> ForwardOutcome {
        if !connected {
            return ForwardOutcome::Offline;
        }

        if self.in_flight.is_none() {
            self.in_flight = self.queue.peek();
        }
        let Some(record) = &self.in_flight else {
            return ForwardOutcome::Idle;
        };

        let topic = self.topics.device_state(record.device_name.as_str());
        let payload = match serde_json::to_vec(&RecordMessage::from(record)) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize record {}", record);
                self.failed_attempts += 1;
                return ForwardOutcome::Retained;
            }
        };

        match broker.publish(&topic, &payload, false) {
            Ok(()) => {
                tracing::debug!(%topic, message_id = record.message_id, "record forwarded");
                self.published += 1;
                // The forwarder is the only consumer, so the head is still the leased record
                self.queue.dequeue();
                self.in_flight = None;
                ForwardOutcome::Published
            }
            Err(e) => {
                self.failed_attempts += 1;
                tracing::warn!(
                    %topic,
                    message_id = record.message_id,
                    error = %e,
                    "publish failed, record kept for retry"
                );
                ForwardOutcome::Retained
            }
        }
    }
}
