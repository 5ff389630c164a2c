// NowLink - Sensor telemetry link
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Send-with-acknowledgment protocol
//!
//! A node has a few tens of milliseconds of power left when it sends its
//! record, so a send is a short bounded loop:
//!
//! ```text
//! IDLE -> TRANSMITTING -> WAITING_ACK -> DELIVERED
//!                              |
//!                              +-> RETRY -> TRANSMITTING ...
//!                              +-> FAILED (budget exhausted)
//! ```
//!
//! The first failure of a cycle forces a channel rescan, since the usual
//! cause is the gateway's network having moved to another channel. Later
//! failures in the same cycle reuse that result.

use crate::channel::ChannelSynchronizer;
use crate::clock::Clock;
use crate::delivery::{delivery_slot, DeliveryStatus};
use crate::error::{RadioError, SendError, SendFailure};
use crate::peer::{refresh_peer, PeerRegistration};
use crate::radio::Radio;
use crate::record::TelemetryRecord;
use crate::storage::ChannelStore;

/// Default number of retries after the first attempt
pub const DEFAULT_RETRIES: u8 = 1;

/// Default time to wait for a delivery report, in milliseconds
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 25;

/// Successful outcome of a send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Transmit attempts used, 1 for a first-try delivery
    pub attempts: u8,
    /// Whether the channel was rescanned during this send
    pub channel_refreshed: bool,
}

/// Node-side sender bound to one gateway peer
#[derive(Debug)]
pub struct AckSender<R, S, C> {
    radio: R,
    sync: ChannelSynchronizer<S>,
    clock: C,
    peer: PeerRegistration,
    peer_registered: bool,
    retries: u8,
    ack_timeout_ms: u64,
    channel_refreshed: bool,
}

impl<R, S, C> AckSender<R, S, C>
where
    R: Radio,
    S: ChannelStore,
    C: Clock,
{
    /// Create a sender with the default retry budget and ack timeout
    ///
    /// A peer the radio does not know yet is added before the first transmit.
    pub fn new(radio: R, sync: ChannelSynchronizer<S>, clock: C, peer: PeerRegistration) -> Self {
        let peer_registered = radio.has_peer(&peer.address);
        Self {
            radio,
            sync,
            clock,
            peer,
            peer_registered,
            retries: DEFAULT_RETRIES,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            channel_refreshed: false,
        }
    }

    /// Set the retry budget; values below 1 are raised to 1 so a channel
    /// refresh always gets a second attempt
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Set the delivery report timeout
    pub fn with_ack_timeout(mut self, timeout_ms: u64) -> Self {
        self.ack_timeout_ms = timeout_ms;
        self
    }

    /// Effective retry budget
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Effective ack timeout in milliseconds
    pub fn ack_timeout_ms(&self) -> u64 {
        self.ack_timeout_ms
    }

    /// The gateway peer as currently registered
    pub fn peer(&self) -> &PeerRegistration {
        &self.peer
    }

    /// Whether the radio accepted the last registration of the peer
    pub fn peer_registered(&self) -> bool {
        self.peer_registered
    }

    /// Add the peer again if its last registration was rejected
    pub fn ensure_peer(&mut self) -> Result<(), RadioError> {
        if self.peer_registered {
            return Ok(());
        }
        refresh_peer(&mut self.radio, &self.peer)?;
        self.peer_registered = true;
        Ok(())
    }

    /// Whether a rescan already happened in the current cycle
    pub fn channel_refreshed(&self) -> bool {
        self.channel_refreshed
    }

    /// Allow the next failure to rescan again
    pub fn reset_cycle(&mut self) {
        self.channel_refreshed = false;
    }

    /// Borrow the radio
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutably borrow the radio
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Borrow the channel synchronizer
    pub fn synchronizer(&self) -> &ChannelSynchronizer<S> {
        &self.sync
    }

    /// Send one record to the gateway
    ///
    /// With `ack` set, waits for a delivery report after each transmit and
    /// retries within the budget. Without it, returns as soon as the
    /// transmit call has been accepted.
    pub fn send(&mut self, record: &TelemetryRecord, ack: bool) -> Result<Delivery, SendError> {
        let payload = record.to_bytes();

        if !ack {
            // Nobody waits on the report; the driver may complete or drop it
            let (ticket, _waiter) = delivery_slot();
            self.radio
                .send(&self.peer.address, &payload, ticket)
                .map_err(SendError::NotTransmitted)?;
            return Ok(Delivery {
                attempts: 1,
                channel_refreshed: false,
            });
        }

        let max_attempts = self.retries.saturating_add(1);
        let mut last = SendFailure::Timeout;

        for attempt in 1..=max_attempts {
            match self.attempt(&payload) {
                Ok(()) => {
                    log::debug!(
                        "message {} delivered on attempt {}",
                        record.message_id,
                        attempt
                    );
                    let refreshed = self.channel_refreshed;
                    self.channel_refreshed = false;
                    return Ok(Delivery {
                        attempts: attempt,
                        channel_refreshed: refreshed,
                    });
                }
                Err(failure) => {
                    log::debug!(
                        "attempt {}/{} for message {} failed: {}",
                        attempt,
                        max_attempts,
                        record.message_id,
                        failure
                    );
                    last = failure;
                    if attempt < max_attempts && !self.channel_refreshed {
                        self.refresh_channel();
                    }
                }
            }
        }

        log::warn!(
            "giving up on message {} after {} attempts: {}",
            record.message_id,
            max_attempts,
            last
        );
        Err(SendError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }

    fn attempt(&mut self, payload: &[u8]) -> Result<(), SendFailure> {
        self.ensure_peer().map_err(SendFailure::Radio)?;

        let (ticket, waiter) = delivery_slot();
        self.radio
            .send(&self.peer.address, payload, ticket)
            .map_err(SendFailure::Radio)?;

        match waiter.wait(&self.clock, self.ack_timeout_ms) {
            Some(DeliveryStatus::Delivered) => Ok(()),
            Some(DeliveryStatus::Failed(code)) => Err(SendFailure::Nack(code)),
            None => Err(SendFailure::Timeout),
        }
    }

    /// Force a rescan once per cycle and follow the gateway if it moved
    fn refresh_channel(&mut self) {
        log::info!("refreshing channel for '{}'", self.sync.network_name());
        self.channel_refreshed = true;

        let resolution = self.sync.synchronize(&mut self.radio, true, None);
        if let Some(channel) = resolution.channel() {
            if channel != self.peer.channel || !self.peer_registered {
                self.peer = self.peer.on_channel(channel);
                self.peer_registered = refresh_peer(&mut self.radio, &self.peer).is_ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::WifiChannel;
    use crate::clock::ManualClock;
    use crate::error::RadioError;
    use crate::peer::PeerRole;
    use crate::radio::{AckBehavior, MacAddress, NetworkInfo, SimulatedRadio};
    use crate::storage::{ChannelCache, MemoryNv};

    type TestSender = AckSender<SimulatedRadio, ChannelCache<MemoryNv>, ManualClock>;

    fn gateway_on(channel: u8) -> PeerRegistration {
        PeerRegistration::new(
            MacAddress::new([0x5E, 0xCF, 0x7F, 0x80, 0x34, 0x75]),
            WifiChannel::new(channel).unwrap(),
            PeerRole::Combo,
        )
    }

    fn sender(ack: AckBehavior) -> (TestSender, ManualClock) {
        let clock = ManualClock::new(0);
        let mut radio =
            SimulatedRadio::new(1, vec![NetworkInfo::new("home", 1)]).with_ack(ack);
        let peer = gateway_on(1);
        refresh_peer(&mut radio, &peer).unwrap();
        let sync = ChannelSynchronizer::new("home", ChannelCache::new(MemoryNv::new(16)));
        (AckSender::new(radio, sync, clock.clone(), peer), clock)
    }

    fn record() -> TelemetryRecord {
        TelemetryRecord::new("door").with_message_id(7)
    }

    #[test]
    fn test_never_acked_uses_two_attempts_and_one_rescan() {
        let (mut sender, clock) = sender(AckBehavior::Drop);

        let result = sender.send(&record(), true);
        assert_eq!(
            result,
            Err(SendError::Exhausted {
                attempts: 2,
                last: SendFailure::Timeout
            })
        );
        assert_eq!(sender.radio().stats().transmits, 2);
        assert_eq!(sender.radio().stats().scans, 1);
        assert!(clock.now_ms() >= 2 * DEFAULT_ACK_TIMEOUT_MS);
    }

    #[test]
    fn test_acked_send_uses_one_attempt_no_rescan() {
        let (mut sender, _clock) = sender(AckBehavior::Deliver);

        let delivery = sender.send(&record(), true).unwrap();
        assert_eq!(delivery.attempts, 1);
        assert!(!delivery.channel_refreshed);
        assert_eq!(sender.radio().stats().transmits, 1);
        assert_eq!(sender.radio().stats().scans, 0);
        assert_eq!(sender.radio().sent()[0], record().to_bytes().to_vec());
    }

    #[test]
    fn test_retry_succeeds_and_clears_refresh_flag() {
        let (mut sender, _clock) = sender(AckBehavior::DropFirst(1));

        let delivery = sender.send(&record(), true).unwrap();
        assert_eq!(delivery.attempts, 2);
        assert!(delivery.channel_refreshed);
        assert!(!sender.channel_refreshed());
    }

    #[test]
    fn test_rescan_at_most_once_per_cycle() {
        let (sender, _clock) = sender(AckBehavior::Nack(5));
        let mut sender = sender.with_retries(3);

        let result = sender.send(&record(), true);
        assert_eq!(
            result,
            Err(SendError::Exhausted {
                attempts: 4,
                last: SendFailure::Nack(5)
            })
        );
        assert_eq!(sender.radio().stats().transmits, 4);
        assert_eq!(sender.radio().stats().scans, 1);

        // Flag survives a failed cycle until reset
        sender.send(&record(), true).unwrap_err();
        assert_eq!(sender.radio().stats().scans, 1);
        sender.reset_cycle();
        sender.send(&record(), true).unwrap_err();
        assert_eq!(sender.radio().stats().scans, 2);
    }

    #[test]
    fn test_zero_retries_raised_to_one() {
        let (sender, _clock) = sender(AckBehavior::Drop);
        let mut sender = sender.with_retries(0);
        assert_eq!(sender.retries(), 1);

        sender.send(&record(), true).unwrap_err();
        assert_eq!(sender.radio().stats().transmits, 2);
    }

    #[test]
    fn test_gateway_moved_follows_new_channel() {
        let (mut sender, _clock) = sender(AckBehavior::DropFirst(1));
        sender
            .radio_mut()
            .set_networks(vec![NetworkInfo::new("home", 11)]);

        let delivery = sender.send(&record(), true).unwrap();
        assert_eq!(delivery.attempts, 2);
        assert_eq!(sender.radio().channel(), 11);
        assert_eq!(sender.peer().channel.get(), 11);
        assert_eq!(sender.radio().peers()[0].channel.get(), 11);
        assert_eq!(sender.synchronizer().store().writes(), 1);
    }

    #[test]
    fn test_nack_code_zero_is_a_failure() {
        let (mut sender, _clock) = sender(AckBehavior::Nack(0));

        let result = sender.send(&record(), true);
        assert_eq!(
            result,
            Err(SendError::Exhausted {
                attempts: 2,
                last: SendFailure::Nack(0)
            })
        );
    }

    #[test]
    fn test_rejected_peer_is_added_again() {
        let (mut sender, _clock) = sender(AckBehavior::Drop);
        sender
            .radio_mut()
            .set_networks(vec![NetworkInfo::new("home", 11)]);
        sender.radio_mut().set_reject_peers(true);

        sender.send(&record(), true).unwrap_err();
        assert!(!sender.peer_registered());
        assert_eq!(sender.peer().channel.get(), 11);
        assert!(sender.radio().peers().is_empty());

        sender.radio_mut().set_reject_peers(false);
        sender.radio_mut().set_ack(AckBehavior::Deliver);
        sender.reset_cycle();

        let delivery = sender.send(&record(), true).unwrap();
        assert_eq!(delivery.attempts, 1);
        assert!(sender.peer_registered());
        assert_eq!(sender.radio().peers()[0].channel.get(), 11);
    }

    #[test]
    fn test_unknown_peer_added_before_first_transmit() {
        let radio = SimulatedRadio::new(1, vec![NetworkInfo::new("home", 1)]);
        let sync = ChannelSynchronizer::new("home", ChannelCache::new(MemoryNv::new(16)));
        let mut sender = AckSender::new(radio, sync, ManualClock::new(0), gateway_on(1));
        assert!(!sender.peer_registered());

        sender.send(&record(), true).unwrap();
        assert!(sender.peer_registered());
        assert_eq!(sender.radio().stats().peer_adds, 1);
    }

    #[test]
    fn test_transmit_error_is_retried() {
        let (mut sender, _clock) = sender(AckBehavior::Deliver);
        sender.radio_mut().set_transmit_error(Some(3));

        let result = sender.send(&record(), true);
        assert_eq!(
            result,
            Err(SendError::Exhausted {
                attempts: 2,
                last: SendFailure::Radio(RadioError::TransmitFailed(3))
            })
        );
    }

    #[test]
    fn test_no_ack_reports_transmit_only() {
        let (mut sender, clock) = sender(AckBehavior::Drop);

        let delivery = sender.send(&record(), false).unwrap();
        assert_eq!(delivery.attempts, 1);
        assert_eq!(sender.radio().stats().transmits, 1);
        assert_eq!(clock.now_ms(), 0);

        sender.radio_mut().set_transmit_error(Some(1));
        assert_eq!(
            sender.send(&record(), false),
            Err(SendError::NotTransmitted(RadioError::TransmitFailed(1)))
        );
    }
}
