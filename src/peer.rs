// NowLink - Sensor telemetry link
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Peer registration
//!
//! A peer registration is bound to the channel it was created on, so it is
//! rebuilt (delete, then add) at cold start and whenever the channel moves.

use crate::channel::WifiChannel;
use crate::error::RadioError;
use crate::radio::{MacAddress, Radio};

/// Length of a link encryption key
pub const KEY_LEN: usize = 16;

/// Role tag of a radio endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PeerRole {
    /// No interface
    Idle = 0,
    /// Sends records, station interface has priority
    Controller = 1,
    /// Receives records, soft-AP interface has priority
    Slave = 2,
    /// Both directions
    #[default]
    Combo = 3,
}

impl PeerRole {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PeerRole::Idle),
            1 => Some(PeerRole::Controller),
            2 => Some(PeerRole::Slave),
            3 => Some(PeerRole::Combo),
            _ => None,
        }
    }
}

/// A registered unicast peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRegistration {
    /// Hardware address of the peer
    pub address: MacAddress,
    /// Channel the registration is bound to
    pub channel: WifiChannel,
    /// Optional link key
    pub key: Option<[u8; KEY_LEN]>,
    /// Role of the peer
    pub role: PeerRole,
}

impl PeerRegistration {
    /// Create an unencrypted registration
    pub fn new(address: MacAddress, channel: WifiChannel, role: PeerRole) -> Self {
        Self {
            address,
            channel,
            key: None,
            role,
        }
    }

    /// Attach a link key
    pub fn with_key(mut self, key: [u8; KEY_LEN]) -> Self {
        self.key = Some(key);
        self
    }

    /// Copy of this registration bound to another channel
    pub fn on_channel(&self, channel: WifiChannel) -> Self {
        Self {
            channel,
            ..self.clone()
        }
    }
}

/// Delete the peer if present, then add it again
///
/// Failure to add is logged and returned; the caller may retry on the next
/// channel change.
pub fn refresh_peer<R: Radio + ?Sized>(
    radio: &mut R,
    peer: &PeerRegistration,
) -> Result<(), RadioError> {
    if radio.has_peer(&peer.address) {
        // Removal failure is not fatal, the add below decides
        if let Err(e) = radio.remove_peer(&peer.address) {
            log::debug!("removing peer {} failed: {}", peer.address, e);
        }
    }

    match radio.add_peer(peer) {
        Ok(()) => {
            log::info!(
                "added peer {} on channel {} with role {:?}",
                peer.address,
                peer.channel,
                peer.role
            );
            Ok(())
        }
        Err(e) => {
            log::warn!(
                "failed to add peer {} on channel {}: {}",
                peer.address,
                peer.channel,
                e
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::SimulatedRadio;

    fn gateway() -> PeerRegistration {
        PeerRegistration::new(
            MacAddress::new([0x5E, 0xCF, 0x7F, 0x01, 0x02, 0x03]),
            WifiChannel::new(1).unwrap(),
            PeerRole::Combo,
        )
    }

    #[test]
    fn test_refresh_adds_missing_peer() {
        let mut radio = SimulatedRadio::new(1, vec![]);
        refresh_peer(&mut radio, &gateway()).unwrap();
        assert!(radio.has_peer(&gateway().address));
        assert_eq!(radio.stats().peer_removes, 0);
    }

    #[test]
    fn test_refresh_replaces_existing_peer() {
        let mut radio = SimulatedRadio::new(1, vec![]);
        refresh_peer(&mut radio, &gateway()).unwrap();

        let moved = gateway().on_channel(WifiChannel::new(11).unwrap());
        refresh_peer(&mut radio, &moved).unwrap();

        assert_eq!(radio.peers().len(), 1);
        assert_eq!(radio.peers()[0].channel.get(), 11);
        assert_eq!(radio.stats().peer_removes, 1);
        assert_eq!(radio.stats().peer_adds, 2);
    }

    #[test]
    fn test_refresh_surfaces_rejection() {
        let mut radio = SimulatedRadio::new(1, vec![]);
        radio.set_reject_peers(true);
        let result = refresh_peer(&mut radio, &gateway());
        assert!(matches!(result, Err(RadioError::PeerRejected { .. })));
    }

    #[test]
    fn test_role_from_u8() {
        assert_eq!(PeerRole::from_u8(2), Some(PeerRole::Slave));
        assert_eq!(PeerRole::from_u8(9), None);
    }

    #[test]
    fn test_with_key() {
        let peer = gateway().with_key([7; KEY_LEN]);
        assert_eq!(peer.key, Some([7; KEY_LEN]));
    }
}
