// NowLink - Sensor telemetry link
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Radio driver abstraction
//!
//! This module provides the [`Radio`] trait implemented by the wireless
//! driver of a node, plus [`SimulatedRadio`] for host-side runs and tests.

use crate::channel::WifiChannel;
use crate::delivery::{DeliveryStatus, DeliveryTicket};
use crate::error::RadioError;
use crate::peer::PeerRegistration;
use std::fmt;
use std::str::FromStr;

/// 6-byte hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Broadcast address
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    /// Create from raw bytes
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Upper-case hex without separators, e.g. `2CF43220842D`
    pub fn to_compact(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// Error parsing a textual hardware address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacError(pub String);

impl fmt::Display for ParseMacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid hardware address: {}", self.0)
    }
}

impl std::error::Error for ParseMacError {}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(ParseMacError(s.to_string()));
        }
        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(parts) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

/// A network seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Network name
    pub name: String,
    /// Channel the network operates on
    pub channel: u8,
}

impl NetworkInfo {
    /// Create a scan entry
    pub fn new(name: impl Into<String>, channel: u8) -> Self {
        Self {
            name: name.into(),
            channel,
        }
    }
}

/// Trait for the node's wireless driver
pub trait Radio {
    /// Scan all visible networks
    fn scan_networks(&mut self) -> Vec<NetworkInfo>;

    /// Current operating channel, 0 when the radio cannot tell
    fn channel(&self) -> u8;

    /// Enter or leave promiscuous mode, required around channel changes
    fn set_promiscuous(&mut self, enabled: bool);

    /// Tune the radio
    fn set_channel(&mut self, channel: WifiChannel) -> Result<(), RadioError>;

    /// Register a unicast peer
    fn add_peer(&mut self, peer: &PeerRegistration) -> Result<(), RadioError>;

    /// Remove a unicast peer
    fn remove_peer(&mut self, address: &MacAddress) -> Result<(), RadioError>;

    /// Check whether a peer is registered
    fn has_peer(&self, address: &MacAddress) -> bool;

    /// Unicast `payload` to a peer. The driver completes `ticket` when the
    /// link layer knows whether the frame was delivered.
    fn send(
        &mut self,
        peer: &MacAddress,
        payload: &[u8],
        ticket: DeliveryTicket,
    ) -> Result<(), RadioError>;
}

/// How the simulated link acknowledges frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckBehavior {
    /// Every frame is acknowledged
    #[default]
    Deliver,
    /// No report ever arrives
    Drop,
    /// Every frame is reported failed with this code
    Nack(u8),
    /// The first `n` frames get no report, later frames are acknowledged
    DropFirst(u32),
}

/// Counters kept by [`SimulatedRadio`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadioStats {
    /// Transmit calls
    pub transmits: u32,
    /// Network scans
    pub scans: u32,
    /// Successful channel changes
    pub channel_sets: u32,
    /// Peer registrations
    pub peer_adds: u32,
    /// Peer removals
    pub peer_removes: u32,
}

/// In-memory radio for host runs and tests
#[derive(Debug, Default)]
pub struct SimulatedRadio {
    networks: Vec<NetworkInfo>,
    channel: u8,
    promiscuous: bool,
    stuck: bool,
    reject_peers: bool,
    transmit_error: Option<u8>,
    ack: AckBehavior,
    peers: Vec<PeerRegistration>,
    sent: Vec<Vec<u8>>,
    stats: RadioStats,
}

impl SimulatedRadio {
    /// Create a radio on `channel` that sees `networks`
    pub fn new(channel: u8, networks: Vec<NetworkInfo>) -> Self {
        Self {
            networks,
            channel,
            ..Default::default()
        }
    }

    /// Set the acknowledgment behavior
    pub fn with_ack(mut self, ack: AckBehavior) -> Self {
        self.ack = ack;
        self
    }

    /// Change the acknowledgment behavior
    pub fn set_ack(&mut self, ack: AckBehavior) {
        self.ack = ack;
    }

    /// Replace the visible networks
    pub fn set_networks(&mut self, networks: Vec<NetworkInfo>) {
        self.networks = networks;
    }

    /// Simulate a wedged radio that ignores channel changes and reports 0
    pub fn set_stuck(&mut self, stuck: bool) {
        self.stuck = stuck;
        if stuck {
            self.channel = 0;
        }
    }

    /// Make peer registration fail
    pub fn set_reject_peers(&mut self, reject: bool) {
        self.reject_peers = reject;
    }

    /// Make the transmit call itself fail with `code`
    pub fn set_transmit_error(&mut self, code: Option<u8>) {
        self.transmit_error = code;
    }

    /// Counters
    pub fn stats(&self) -> RadioStats {
        self.stats
    }

    /// Frames handed to the link, in order
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Registered peers
    pub fn peers(&self) -> &[PeerRegistration] {
        &self.peers
    }
}

impl Radio for SimulatedRadio {
    fn scan_networks(&mut self) -> Vec<NetworkInfo> {
        self.stats.scans += 1;
        self.networks.clone()
    }

    fn channel(&self) -> u8 {
        self.channel
    }

    fn set_promiscuous(&mut self, enabled: bool) {
        self.promiscuous = enabled;
    }

    fn set_channel(&mut self, channel: WifiChannel) -> Result<(), RadioError> {
        if !self.promiscuous {
            return Err(RadioError::ChannelRejected(channel.get()));
        }
        if !self.stuck {
            self.channel = channel.get();
            self.stats.channel_sets += 1;
        }
        Ok(())
    }

    fn add_peer(&mut self, peer: &PeerRegistration) -> Result<(), RadioError> {
        if self.reject_peers {
            return Err(RadioError::PeerRejected {
                address: peer.address.to_string(),
                channel: peer.channel.get(),
            });
        }
        self.peers.retain(|p| p.address != peer.address);
        self.peers.push(peer.clone());
        self.stats.peer_adds += 1;
        Ok(())
    }

    fn remove_peer(&mut self, address: &MacAddress) -> Result<(), RadioError> {
        let before = self.peers.len();
        self.peers.retain(|p| &p.address != address);
        if self.peers.len() == before {
            return Err(RadioError::PeerNotFound);
        }
        self.stats.peer_removes += 1;
        Ok(())
    }

    fn has_peer(&self, address: &MacAddress) -> bool {
        self.peers.iter().any(|p| &p.address == address)
    }

    fn send(
        &mut self,
        peer: &MacAddress,
        payload: &[u8],
        ticket: DeliveryTicket,
    ) -> Result<(), RadioError> {
        self.stats.transmits += 1;
        if let Some(code) = self.transmit_error {
            return Err(RadioError::TransmitFailed(code));
        }
        if !self.has_peer(peer) {
            return Err(RadioError::PeerNotFound);
        }
        self.sent.push(payload.to_vec());

        match self.ack {
            AckBehavior::Deliver => ticket.complete(DeliveryStatus::Delivered),
            AckBehavior::Drop => {}
            AckBehavior::Nack(code) => ticket.complete(DeliveryStatus::Failed(code)),
            AckBehavior::DropFirst(n) => {
                if self.stats.transmits > n {
                    ticket.complete(DeliveryStatus::Delivered);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::delivery_slot;
    use crate::peer::PeerRole;

    #[test]
    fn test_mac_display_and_parse() {
        let mac = MacAddress::new([0x4C, 0xF2, 0x32, 0xF0, 0x74, 0x2D]);
        assert_eq!(mac.to_string(), "4C:F2:32:F0:74:2D");
        assert_eq!(mac.to_compact(), "4CF232F0742D");
        assert_eq!("4c:f2:32:f0:74:2d".parse::<MacAddress>().unwrap(), mac);
        assert_eq!("4C-F2-32-F0-74-2D".parse::<MacAddress>().unwrap(), mac);
    }

    #[test]
    fn test_mac_parse_errors() {
        assert!("4C:F2:32".parse::<MacAddress>().is_err());
        assert!("zz:f2:32:f0:74:2d".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_channel_change_requires_promiscuous() {
        let mut radio = SimulatedRadio::new(1, vec![]);
        let ch = WifiChannel::new(6).unwrap();
        assert!(radio.set_channel(ch).is_err());

        radio.set_promiscuous(true);
        radio.set_channel(ch).unwrap();
        radio.set_promiscuous(false);
        assert_eq!(radio.channel(), 6);
    }

    #[test]
    fn test_send_requires_registered_peer() {
        let mut radio = SimulatedRadio::new(1, vec![]);
        let (ticket, _waiter) = delivery_slot();
        let result = radio.send(&MacAddress::BROADCAST, &[1, 2, 3], ticket);
        assert_eq!(result, Err(RadioError::PeerNotFound));
    }

    #[test]
    fn test_drop_first_behavior() {
        let peer = PeerRegistration::new(
            MacAddress::BROADCAST,
            WifiChannel::new(1).unwrap(),
            PeerRole::Combo,
        );
        let mut radio = SimulatedRadio::new(1, vec![]).with_ack(AckBehavior::DropFirst(1));
        radio.add_peer(&peer).unwrap();

        let (ticket, waiter) = delivery_slot();
        radio.send(&peer.address, &[0], ticket).unwrap();
        assert_eq!(waiter.poll(), None);

        let (ticket, waiter) = delivery_slot();
        radio.send(&peer.address, &[0], ticket).unwrap();
        assert_eq!(waiter.poll(), Some(DeliveryStatus::Delivered));
    }
}
