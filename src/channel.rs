// NowLink - Sensor telemetry link
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Channel synchronization
//!
//! The gateway's radio follows the channel of the network it is joined to,
//! so a node has to find that channel before it can reach the gateway.
//! Scanning costs seconds of battery; the result is therefore cached in
//! non-volatile memory and only rescanned when the cache is empty or a send
//! keeps failing.

use crate::clock::Restart;
use crate::radio::Radio;
use crate::storage::ChannelStore;
use std::fmt;

/// Lowest valid channel
pub const MIN_CHANNEL: u8 = 1;

/// Highest valid channel
pub const MAX_CHANNEL: u8 = 14;

/// A radio channel in the range 1-14
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WifiChannel(u8);

impl WifiChannel {
    /// Channel 1, used when nothing better is known
    pub const FALLBACK: WifiChannel = WifiChannel(MIN_CHANNEL);

    /// Validate a raw channel number
    pub fn new(channel: u8) -> Option<Self> {
        if (MIN_CHANNEL..=MAX_CHANNEL).contains(&channel) {
            Some(Self(channel))
        } else {
            None
        }
    }

    /// Raw channel number
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for WifiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a resolved channel came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSource {
    /// Read from the channel cache
    Cache,
    /// Found by scanning for the network
    Scan,
}

/// Result of a channel resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelResolution {
    /// A channel was determined
    Resolved {
        /// The channel
        channel: WifiChannel,
        /// Its origin
        source: ChannelSource,
    },
    /// The network was not visible; the radio stays where it is
    NotFound,
}

impl ChannelResolution {
    /// The resolved channel, if any
    pub fn channel(&self) -> Option<WifiChannel> {
        match self {
            Self::Resolved { channel, .. } => Some(*channel),
            Self::NotFound => None,
        }
    }
}

/// Finds, persists and applies the channel of a named network
#[derive(Debug)]
pub struct ChannelSynchronizer<S> {
    network_name: String,
    store: S,
    current: Option<WifiChannel>,
}

impl<S: ChannelStore> ChannelSynchronizer<S> {
    /// Create a synchronizer for `network_name` backed by `store`
    pub fn new(network_name: impl Into<String>, store: S) -> Self {
        Self {
            network_name: network_name.into(),
            store,
            current: None,
        }
    }

    /// Name of the network being followed
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    /// Last channel resolved by this synchronizer
    pub fn current(&self) -> Option<WifiChannel> {
        self.current
    }

    /// Borrow the backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Determine the channel without touching the radio's tuning
    ///
    /// Uses the cache unless `force_rescan` is set or the cache is empty,
    /// then scans for the network and persists a changed channel.
    pub fn resolve_channel<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        force_rescan: bool,
    ) -> ChannelResolution {
        if !force_rescan {
            if let Some(channel) = self.store.load() {
                log::debug!("channel {} read from cache", channel);
                self.current = Some(channel);
                return ChannelResolution::Resolved {
                    channel,
                    source: ChannelSource::Cache,
                };
            }
        }

        log::debug!("scanning for network '{}'", self.network_name);
        let found = radio
            .scan_networks()
            .into_iter()
            .find(|n| n.name == self.network_name)
            .and_then(|n| WifiChannel::new(n.channel));

        match found {
            Some(channel) => {
                // A failed write only costs a rescan on the next wake
                if let Err(e) = self.store.store(channel) {
                    log::warn!("failed to persist channel {}: {}", channel, e);
                }
                self.current = Some(channel);
                ChannelResolution::Resolved {
                    channel,
                    source: ChannelSource::Scan,
                }
            }
            None => {
                log::warn!("no valid channel found for '{}'", self.network_name);
                ChannelResolution::NotFound
            }
        }
    }

    /// Resolve the channel and tune the radio to it
    ///
    /// When the radio cannot report a channel after the switch and a
    /// `restart_on_error` handle is given, a full restart is requested.
    pub fn synchronize<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        force_rescan: bool,
        restart_on_error: Option<&mut dyn Restart>,
    ) -> ChannelResolution {
        let resolution = self.resolve_channel(radio, force_rescan);

        if let Some(channel) = resolution.channel() {
            if radio.channel() != channel.get() {
                radio.set_promiscuous(true);
                let result = radio.set_channel(channel);
                radio.set_promiscuous(false);
                match result {
                    Ok(()) => log::info!("radio switched to channel {}", channel),
                    Err(e) => log::warn!("failed to switch to channel {}: {}", channel, e),
                }
            }
        }

        if radio.channel() == 0 {
            if let Some(restarter) = restart_on_error {
                restarter.restart("radio channel could not be set");
            }
        }

        resolution
    }
}
