// NowLink - Sensor telemetry link
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Telemetry record and its wire format
//!
//! Every node and the gateway exchange the same fixed 84-byte record. The
//! layout follows the natural alignment of the firmware struct, little-endian:
//!
//! ```text
//! offset  size  field
//!      0    16  device name (NUL terminated)
//!     16     4  message id (u32)
//!     20    16  ival1..ival4 (i32)
//!     36    16  fval1..fval4 (f32)
//!     52    16  char1 (NUL terminated)
//!     68    16  char2 (NUL terminated)
//! ```

use crate::error::CodecError;
use std::fmt;

/// Size of a text field on the wire, terminator included
pub const TEXT_FIELD_SIZE: usize = 16;

/// Maximum usable bytes of a text field
pub const TEXT_MAX_LEN: usize = TEXT_FIELD_SIZE - 1;

/// Encoded record size in bytes
pub const RECORD_SIZE: usize = 84;

/// Hard payload ceiling of the radio link
pub const MAX_RADIO_PAYLOAD: usize = 250;

const OFFSET_MESSAGE_ID: usize = 16;
const OFFSET_INTS: usize = 20;
const OFFSET_FLOATS: usize = 36;
const OFFSET_CHAR1: usize = 52;
const OFFSET_CHAR2: usize = 68;

/// Short text stored in a fixed 16-byte field
///
/// Holds at most 15 bytes; longer input is cut at the last character
/// boundary that fits, and anything from an embedded NUL onward is dropped,
/// so a value always survives an encode/decode cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Text16(String);

impl Text16 {
    /// Create a text field, truncating to fit
    pub fn new(text: &str) -> Self {
        let text = text.split('\0').next().unwrap_or("");
        let mut end = text.len().min(TEXT_MAX_LEN);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Self(text[..end].to_string())
    }

    /// Borrow the text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the field is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn write_to(&self, out: &mut [u8]) {
        let bytes = self.0.as_bytes();
        out[..bytes.len()].copy_from_slice(bytes);
        out[bytes.len()..TEXT_FIELD_SIZE].fill(0);
    }

    fn read_from(field: &[u8]) -> Self {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        Self::new(&String::from_utf8_lossy(&field[..end]))
    }
}

impl From<&str> for Text16 {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Text16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One telemetry record as carried over the radio link
///
/// Equality compares every corresponding field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryRecord {
    /// Unique name of the sending node
    pub device_name: Text16,
    /// Loosely increasing message identifier
    pub message_id: u32,
    /// Integer slots
    pub ints: [i32; 4],
    /// Floating-point slots
    pub floats: [f32; 4],
    /// First text slot
    pub char1: Text16,
    /// Second text slot
    pub char2: Text16,
}

impl TelemetryRecord {
    /// Create an empty record for a device
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: Text16::new(device_name),
            ..Default::default()
        }
    }

    /// Set the message identifier
    pub fn with_message_id(mut self, message_id: u32) -> Self {
        self.message_id = message_id;
        self
    }

    /// Set the integer slots
    pub fn with_ints(mut self, ints: [i32; 4]) -> Self {
        self.ints = ints;
        self
    }

    /// Set the floating-point slots
    pub fn with_floats(mut self, floats: [f32; 4]) -> Self {
        self.floats = floats;
        self
    }

    /// Set both text slots
    pub fn with_text(mut self, char1: &str, char2: &str) -> Self {
        self.char1 = Text16::new(char1);
        self.char2 = Text16::new(char2);
        self
    }

    /// Serialize into the fixed wire layout
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        self.device_name.write_to(&mut bytes[..TEXT_FIELD_SIZE]);
        bytes[OFFSET_MESSAGE_ID..OFFSET_INTS].copy_from_slice(&self.message_id.to_le_bytes());
        for (i, value) in self.ints.iter().enumerate() {
            let at = OFFSET_INTS + i * 4;
            bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        for (i, value) in self.floats.iter().enumerate() {
            let at = OFFSET_FLOATS + i * 4;
            bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        self.char1.write_to(&mut bytes[OFFSET_CHAR1..OFFSET_CHAR2]);
        self.char2.write_to(&mut bytes[OFFSET_CHAR2..RECORD_SIZE]);
        bytes
    }

    /// Deserialize from the fixed wire layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != RECORD_SIZE {
            return Err(CodecError::LengthMismatch {
                expected: RECORD_SIZE,
                actual: bytes.len(),
            });
        }

        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];

        let mut ints = [0i32; 4];
        for (i, slot) in ints.iter_mut().enumerate() {
            *slot = i32::from_le_bytes(word(OFFSET_INTS + i * 4));
        }
        let mut floats = [0f32; 4];
        for (i, slot) in floats.iter_mut().enumerate() {
            *slot = f32::from_le_bytes(word(OFFSET_FLOATS + i * 4));
        }

        Ok(Self {
            device_name: Text16::read_from(&bytes[..TEXT_FIELD_SIZE]),
            message_id: u32::from_le_bytes(word(OFFSET_MESSAGE_ID)),
            ints,
            floats,
            char1: Text16::read_from(&bytes[OFFSET_CHAR1..OFFSET_CHAR2]),
            char2: Text16::read_from(&bytes[OFFSET_CHAR2..RECORD_SIZE]),
        })
    }
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}: {:?} {:?} '{}' '{}'",
            self.device_name, self.message_id, self.ints, self.floats, self.char1, self.char2
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetryRecord {
        TelemetryRecord::new("main_door")
            .with_message_id(0xDEAD_BEEF)
            .with_ints([1, -2, 3_000_000, i32::MIN])
            .with_floats([0.5, -1.25, 1e9, f32::MAX])
            .with_text("open", "2.3 Jan  1 2025")
    }

    #[test]
    fn test_record_fits_radio_payload() {
        assert!(RECORD_SIZE <= MAX_RADIO_PAYLOAD);
        assert_eq!(sample().to_bytes().len(), RECORD_SIZE);
    }

    #[test]
    fn test_record_roundtrip() {
        let record = sample();
        let decoded = TelemetryRecord::from_bytes(&record.to_bytes()).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn test_wire_layout_offsets() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[..9], b"main_door");
        assert_eq!(bytes[9], 0);
        assert_eq!(&bytes[16..20], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(&bytes[20..24], &1i32.to_le_bytes());
        assert_eq!(&bytes[36..40], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[52..56], b"open");
        assert_eq!(bytes[83], 0);
    }

    #[test]
    fn test_text_truncated_to_fifteen_bytes() {
        let text = Text16::new("a_very_long_device_name");
        assert_eq!(text.as_str(), "a_very_long_dev");

        // Never split a multi-byte character
        let text = Text16::new("aaaaaaaaaaaaaaé");
        assert_eq!(text.as_str().len(), 14);
    }

    #[test]
    fn test_text_stops_at_nul() {
        assert_eq!(Text16::new("abc\0def").as_str(), "abc");
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let result = TelemetryRecord::from_bytes(&[0u8; 10]);
        assert_eq!(
            result,
            Err(CodecError::LengthMismatch {
                expected: RECORD_SIZE,
                actual: 10
            })
        );

        let result = TelemetryRecord::from_bytes(&[0u8; RECORD_SIZE + 1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_record_is_zeroed() {
        let bytes = TelemetryRecord::default().to_bytes();
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_equality_checks_every_int_slot() {
        let a = TelemetryRecord::new("n").with_ints([1, 2, 3, 4]);
        let b = TelemetryRecord::new("n").with_ints([1, 9, 3, 4]);
        assert_ne!(a, b);
    }
}
