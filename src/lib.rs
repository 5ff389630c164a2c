//! # NowLink - Sensor telemetry link
//!
//! Node-side half of a low-power telemetry network: battery nodes wake, send
//! one fixed-format record to a mains-powered gateway over a short-range
//! radio link, and power off again.
//!
//! ## Key Features
//!
//! - **Fixed wire record**: 84-byte little-endian layout shared with the gateway
//! - **Channel following**: the gateway's channel is scanned once and cached
//!   in non-volatile memory, rescanned only when sends keep failing
//! - **Bounded delivery**: transmit, wait for the link-level ack, retry
//!   within a small budget
//!
//! ## Quick Start
//!
//! ```rust
//! use nowlink::{
//!     ChannelCache, DeviceProfile, MacAddress, ManualClock, MemoryNv, NetworkInfo, Node,
//!     SimulatedRadio,
//! };
//!
//! let gateway: MacAddress = "5E:CF:7F:80:34:75".parse().unwrap();
//! let profile = DeviceProfile::new("front_door", gateway, "home");
//!
//! let radio = SimulatedRadio::new(1, vec![NetworkInfo::new("home", 6)]);
//! let store = ChannelCache::new(MemoryNv::new(16));
//! let own = MacAddress::new([0x2C, 0xF4, 0x32, 0x20, 0x84, 0x2D]);
//!
//! let (mut node, _report) = Node::start(&profile, own, radio, store, ManualClock::new(0), None);
//! let record = node.record(1).with_ints([1, 3012, 0, 0]);
//! let delivery = node.report(&record).unwrap();
//! assert_eq!(delivery.attempts, 1);
//! ```
//!
//! ## Modules
//!
//! - [`record`]: Telemetry record and wire format
//! - [`channel`]: Channel discovery and tuning
//! - [`storage`]: Persisted channel cache
//! - [`sender`]: Send-with-acknowledgment protocol
//! - [`node`]: Device profile and wake cycle

// Modules
pub mod channel;
pub mod clock;
pub mod delivery;
pub mod error;
pub mod node;
pub mod peer;
pub mod radio;
pub mod record;
pub mod sender;
pub mod storage;

// Re-exports for convenient access
pub use channel::{ChannelResolution, ChannelSource, ChannelSynchronizer, WifiChannel};
pub use clock::{Clock, ManualClock, Restart, RestartCounter, SystemClock};
pub use delivery::{delivery_slot, DeliveryStatus, DeliveryTicket, DeliveryWaiter};
pub use error::{
    CodecError, NowlinkError, RadioError, Result, SendError, SendFailure, StorageError,
};
pub use node::{DeviceProfile, Node, StartReport};
pub use peer::{refresh_peer, PeerRegistration, PeerRole};
pub use radio::{AckBehavior, MacAddress, NetworkInfo, Radio, RadioStats, SimulatedRadio};
pub use record::{TelemetryRecord, Text16, MAX_RADIO_PAYLOAD, RECORD_SIZE};
pub use sender::{AckSender, Delivery};
pub use storage::{ChannelCache, ChannelStore, FileNv, MemoryNv, NvMemory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_record_survives_the_link() {
        let record = TelemetryRecord::new("kitchen")
            .with_message_id(9)
            .with_floats([21.5, 48.0, 0.0, 0.0]);
        let decoded = TelemetryRecord::from_bytes(&record.to_bytes()).unwrap();
        assert_eq!(decoded, record);
    }
}
