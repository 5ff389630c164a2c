// NowLink - Sensor telemetry link
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Time and restart seams
//!
//! All timeouts in the link are measured against a monotonic millisecond
//! counter supplied through [`Clock`]. Process restarts, the last-resort
//! recovery action, go through [`Restart`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic millisecond time source
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;

    /// Block for roughly `ms` milliseconds, yielding to other work
    fn delay_ms(&self, ms: u64);
}

/// Clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn delay_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Manually driven clock for simulations and tests
///
/// Clones share the same time; `delay_ms` advances it instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock starting at `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Move time forward
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn delay_ms(&self, ms: u64) {
        self.advance(ms);
    }
}

/// Full process restart
pub trait Restart {
    /// Request a restart. Real implementations do not return.
    fn restart(&mut self, reason: &str);
}

impl<R: Restart + ?Sized> Restart for Box<R> {
    fn restart(&mut self, reason: &str) {
        (**self).restart(reason)
    }
}

/// Restart sink that only counts requests
#[derive(Debug, Clone, Default)]
pub struct RestartCounter {
    count: Arc<AtomicU32>,
}

impl RestartCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of restarts requested so far
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Restart for RestartCounter {
    fn restart(&mut self, reason: &str) {
        log::warn!("restart requested: {}", reason);
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
