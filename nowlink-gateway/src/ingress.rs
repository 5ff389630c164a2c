// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Receive boundary
//!
//! Whatever delivers frames (a radio callback, a UDP socket) hands the raw
//! payload to [`receive`], which decodes it and enqueues the record. Runs in
//! the receive context, so it never blocks beyond the queue's lock.

use crate::queue::IngressQueue;
use nowlink::TelemetryRecord;
use std::sync::atomic::{AtomicU64, Ordering};

/// What happened to a received payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Decoded and queued
    Queued,
    /// Decoded, but the queue was full
    Dropped,
    /// Not a record, or a device name that cannot be a topic level
    Malformed,
}

/// Counters shared by every receive context
#[derive(Debug, Default)]
pub struct IngressStats {
    received: AtomicU64,
    malformed: AtomicU64,
}

impl IngressStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads seen, malformed included
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Payloads rejected by the decoder
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

/// Whether `name` can be used as one level of a publish topic
pub fn is_topic_level(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '+', '#', '\0'])
}

/// Decode `payload` and enqueue it
///
/// The device name becomes a topic level, so names the broker would refuse
/// are rejected here rather than stalling the forwarder.
pub fn receive(queue: &IngressQueue, stats: &IngressStats, payload: &[u8]) -> ReceiveOutcome {
    stats.received.fetch_add(1, Ordering::Relaxed);
    match TelemetryRecord::from_bytes(payload) {
        Ok(record) if !is_topic_level(record.device_name.as_str()) => {
            let malformed = stats.malformed.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                device = %record.device_name,
                malformed,
                "device name is not a valid topic level, record discarded"
            );
            ReceiveOutcome::Malformed
        }
        Ok(record) => {
            tracing::debug!(device = %record.device_name, message_id = record.message_id, "record received");
            if queue.enqueue(record) {
                ReceiveOutcome::Queued
            } else {
                ReceiveOutcome::Dropped
            }
        }
        Err(e) => {
            let malformed = stats.malformed.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(error = %e, malformed, "malformed payload discarded");
            ReceiveOutcome::Malformed
        }
    }
}
