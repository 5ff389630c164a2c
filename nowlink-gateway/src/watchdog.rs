// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Liveness watchdog
//!
//! Fed a health flag every tick. When the flag has been false for longer
//! than the timeout, the restarter is invoked once; it is not invoked again
//! until a healthy update re-arms the watchdog.

use nowlink::Restart;

/// Default timeout: 10 minutes
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

/// Restart-on-prolonged-failure watchdog
#[derive(Debug)]
pub struct Watchdog<R: Restart> {
    timeout_ms: u64,
    last_good_ms: u64,
    tripped: bool,
    restarter: R,
}

impl<R: Restart> Watchdog<R> {
    /// Create a watchdog, healthy as of `now_ms`
    pub fn new(timeout_ms: u64, now_ms: u64, restarter: R) -> Self {
        Self {
            timeout_ms,
            last_good_ms: now_ms,
            tripped: false,
            restarter,
        }
    }

    /// Feed the watchdog; returns `true` if this update triggered a restart
    pub fn update(&mut self, healthy: bool, now_ms: u64) -> bool {
        if healthy {
            self.last_good_ms = now_ms;
            self.tripped = false;
            return false;
        }

        let unhealthy_for = now_ms.saturating_sub(self.last_good_ms);
        if self.tripped || unhealthy_for <= self.timeout_ms {
            return false;
        }

        self.tripped = true;
        tracing::error!(unhealthy_for_ms = unhealthy_for, "watchdog timeout, restarting");
        self.restarter
            .restart(&format!("unhealthy for {} ms", unhealthy_for));
        true
    }

    /// Time of the last healthy update
    pub fn last_good_ms(&self) -> u64 {
        self.last_good_ms
    }

    /// Whether a restart was requested in the current unhealthy episode
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}
