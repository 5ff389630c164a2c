// NowLink - Sensor telemetry link
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor node wake cycle
//!
//! A node is powered only long enough to report one reading: tune the radio
//! to the gateway's channel, register the gateway, send, power off. The
//! [`DeviceProfile`] carries everything that differs between nodes.

use crate::channel::{ChannelResolution, ChannelSynchronizer, WifiChannel};
use crate::clock::{Clock, Restart};
use crate::error::Result;
use crate::peer::{refresh_peer, PeerRegistration, PeerRole, KEY_LEN};
use crate::radio::{MacAddress, Radio};
use crate::record::TelemetryRecord;
use crate::sender::{AckSender, Delivery, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_RETRIES};
use crate::storage::ChannelStore;

/// Runtime identity and link settings of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Name sent in every record; empty means derive from the hardware address
    pub device_name: String,
    /// Hardware address of the gateway
    pub gateway: MacAddress,
    /// Network whose channel the gateway follows
    pub network_name: String,
    /// Role the gateway peer is registered with
    pub gateway_role: PeerRole,
    /// Optional link key
    pub key: Option<[u8; KEY_LEN]>,
    /// Retries after the first attempt
    pub retries: u8,
    /// Delivery report timeout in milliseconds
    pub ack_timeout_ms: u64,
    /// Restart when the radio cannot be tuned at start-up
    pub restart_on_error: bool,
}

impl DeviceProfile {
    /// Create a profile with default link settings
    pub fn new(
        device_name: impl Into<String>,
        gateway: MacAddress,
        network_name: impl Into<String>,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            gateway,
            network_name: network_name.into(),
            gateway_role: PeerRole::Combo,
            key: None,
            retries: DEFAULT_RETRIES,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            restart_on_error: false,
        }
    }

    /// Set the gateway role
    pub fn with_gateway_role(mut self, role: PeerRole) -> Self {
        self.gateway_role = role;
        self
    }

    /// Set the link key
    pub fn with_key(mut self, key: [u8; KEY_LEN]) -> Self {
        self.key = Some(key);
        self
    }

    /// Set the retry budget
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    /// Set the ack timeout
    pub fn with_ack_timeout(mut self, timeout_ms: u64) -> Self {
        self.ack_timeout_ms = timeout_ms;
        self
    }

    /// Enable or disable restart on radio errors
    pub fn with_restart_on_error(mut self, restart: bool) -> Self {
        self.restart_on_error = restart;
        self
    }

    /// Name to put in records, falling back to the compact hardware address
    pub fn effective_name(&self, own_address: &MacAddress) -> String {
        if self.device_name.is_empty() {
            own_address.to_compact()
        } else {
            self.device_name.clone()
        }
    }

    fn gateway_peer(&self, channel: WifiChannel) -> PeerRegistration {
        let peer = PeerRegistration::new(self.gateway, channel, self.gateway_role);
        match self.key {
            Some(key) => peer.with_key(key),
            None => peer,
        }
    }
}

/// What a cold start found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartReport {
    /// Outcome of the channel lookup
    pub resolution: ChannelResolution,
    /// Channel the gateway peer was registered on
    pub channel: WifiChannel,
    /// Whether the peer registration was accepted
    pub peer_registered: bool,
}

/// A started node, ready to send
#[derive(Debug)]
pub struct Node<R, S, C> {
    name: String,
    sender: AckSender<R, S, C>,
}

impl<R, S, C> Node<R, S, C>
where
    R: Radio,
    S: ChannelStore,
    C: Clock,
{
    /// Cold start: resolve and apply the channel, then register the gateway
    ///
    /// An unknown channel is not fatal; the node stays on whatever channel
    /// the radio is on and relies on the send-time rescan.
    pub fn start(
        profile: &DeviceProfile,
        own_address: MacAddress,
        mut radio: R,
        store: S,
        clock: C,
        restart: Option<&mut dyn Restart>,
    ) -> (Self, StartReport) {
        let mut sync = ChannelSynchronizer::new(profile.network_name.clone(), store);
        let restart = if profile.restart_on_error { restart } else { None };
        let resolution = sync.synchronize(&mut radio, false, restart);

        let channel = resolution
            .channel()
            .or_else(|| WifiChannel::new(radio.channel()))
            .unwrap_or(WifiChannel::FALLBACK);

        let peer = profile.gateway_peer(channel);
        let peer_registered = refresh_peer(&mut radio, &peer).is_ok();

        let sender = AckSender::new(radio, sync, clock, peer)
            .with_retries(profile.retries)
            .with_ack_timeout(profile.ack_timeout_ms);

        let node = Self {
            name: profile.effective_name(&own_address),
            sender,
        };
        let report = StartReport {
            resolution,
            channel,
            peer_registered,
        };
        log::info!(
            "node '{}' started on channel {} (peer registered: {})",
            node.name,
            channel,
            peer_registered
        );
        (node, report)
    }

    /// Device name used in records
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start a record carrying this node's name
    pub fn record(&self, message_id: u32) -> TelemetryRecord {
        TelemetryRecord::new(&self.name).with_message_id(message_id)
    }

    /// Send a record, waiting for delivery when `ack` is set
    pub fn send(&mut self, record: &TelemetryRecord, ack: bool) -> Result<Delivery> {
        Ok(self.sender.send(record, ack)?)
    }

    /// Report a reading: send with acknowledgment
    ///
    /// A gateway peer rejected at start-up is added again first; if the
    /// radio still refuses it the report fails with that radio error.
    pub fn report(&mut self, record: &TelemetryRecord) -> Result<Delivery> {
        self.sender.ensure_peer()?;
        self.send(record, true)
    }

    /// Borrow the underlying sender
    pub fn sender(&self) -> &AckSender<R, S, C> {
        &self.sender
    }

    /// Mutably borrow the underlying sender
    pub fn sender_mut(&mut self) -> &mut AckSender<R, S, C> {
        &mut self.sender
    }
}
