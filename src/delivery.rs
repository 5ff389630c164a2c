// NowLink - Sensor telemetry link
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! One-shot delivery reports
//!
//! Each transmit attempt gets a fresh slot. The radio driver keeps the
//! [`DeliveryTicket`] and completes it from its send-done context, which may
//! be an interrupt or another thread. The sender keeps the
//! [`DeliveryWaiter`] and polls it. A late report for an earlier attempt
//! lands in that attempt's slot and can never be mistaken for the current one.

use crate::clock::Clock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Transport status code for a successful delivery
pub const STATUS_SUCCESS: u8 = 0;

/// Outcome reported by the transport for one transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Peer acknowledged the frame
    Delivered,
    /// Transport reported a failure code
    Failed(u8),
}

impl DeliveryStatus {
    /// Build from a raw transport status code
    pub fn from_code(code: u8) -> Self {
        if code == STATUS_SUCCESS {
            Self::Delivered
        } else {
            Self::Failed(code)
        }
    }

    /// Raw transport status code
    pub fn code(&self) -> u8 {
        match self {
            Self::Delivered => STATUS_SUCCESS,
            Self::Failed(code) => *code,
        }
    }

    /// Check for a successful delivery
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

#[derive(Debug, Default)]
struct Slot {
    ready: AtomicBool,
    delivered: AtomicBool,
    code: AtomicU8,
}

/// Completion half, held by the transport
#[derive(Debug)]
pub struct DeliveryTicket {
    slot: Arc<Slot>,
}

impl DeliveryTicket {
    /// Report the outcome. Consumes the ticket: one report per attempt.
    ///
    /// Success is recorded apart from the code, so `Failed(0)` stays a failure.
    pub fn complete(self, status: DeliveryStatus) {
        self.slot
            .delivered
            .store(status.is_delivered(), Ordering::Relaxed);
        self.slot.code.store(status.code(), Ordering::Relaxed);
        self.slot.ready.store(true, Ordering::Release);
    }
}

/// Waiting half, held by the sender
#[derive(Debug)]
pub struct DeliveryWaiter {
    slot: Arc<Slot>,
}

impl DeliveryWaiter {
    /// Non-blocking check for a report
    pub fn poll(&self) -> Option<DeliveryStatus> {
        if !self.slot.ready.load(Ordering::Acquire) {
            return None;
        }
        if self.slot.delivered.load(Ordering::Relaxed) {
            Some(DeliveryStatus::Delivered)
        } else {
            Some(DeliveryStatus::Failed(self.slot.code.load(Ordering::Relaxed)))
        }
    }

    /// Poll until a report arrives or `timeout_ms` elapses, yielding 1 ms
    /// between polls
    pub fn wait<C: Clock + ?Sized>(&self, clock: &C, timeout_ms: u64) -> Option<DeliveryStatus> {
        let start = clock.now_ms();
        loop {
            if let Some(status) = self.poll() {
                return Some(status);
            }
            if clock.now_ms().saturating_sub(start) >= timeout_ms {
                return self.poll();
            }
            clock.delay_ms(1);
        }
    }
}

/// Create a fresh ticket/waiter pair for one transmission
pub fn delivery_slot() -> (DeliveryTicket, DeliveryWaiter) {
    let slot = Arc::new(Slot::default());
    (
        DeliveryTicket { slot: slot.clone() },
        DeliveryWaiter { slot },
    )
}
