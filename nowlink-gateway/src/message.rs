// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON payloads published to the broker

use nowlink::TelemetryRecord;
use serde::{Deserialize, Serialize};

/// A node record as published on `<base>/<device>/state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMessage {
    pub id: u32,
    pub device: String,
    pub ival1: i32,
    pub ival2: i32,
    pub ival3: i32,
    pub ival4: i32,
    pub fval1: f32,
    pub fval2: f32,
    pub fval3: f32,
    pub fval4: f32,
    pub char1: String,
    pub char2: String,
}

impl From<&TelemetryRecord> for RecordMessage {
    fn from(record: &TelemetryRecord) -> Self {
        let [ival1, ival2, ival3, ival4] = record.ints;
        let [fval1, fval2, fval3, fval4] = record.floats;
        Self {
            id: record.message_id,
            device: record.device_name.to_string(),
            ival1,
            ival2,
            ival3,
            ival4,
            fval1,
            fval2,
            fval3,
            fval4,
            char1: record.char1.to_string(),
            char2: record.char2.to_string(),
        }
    }
}

/// Gateway status on `<base>/<gateway>/state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMessage {
    /// Uptime as `D HH:MM:SS ago`
    pub uptime: String,
    /// Free memory in KB, whole number
    #[serde(rename = "mem_freeKB")]
    pub mem_free_kb: u64,
    /// Records published since start
    pub msg_count: u64,
    /// Current ingress queue depth
    pub queue_len: usize,
    /// Records per minute over the last interval, one decimal
    pub msg_rate: f64,
}

/// Network details on `<base>/<gateway>/wifi`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiMessage {
    pub ip_address: String,
    pub rssi: i32,
}

/// One-time startup report on `<base>/<gateway>/init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitMessage {
    pub version: String,
    #[serde(rename = "tot_memKB")]
    pub tot_mem_kb: f64,
    pub mac: String,
    #[serde(rename = "macAP")]
    pub mac_ap: String,
    pub channel: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_record_message_keys() {
        let record = TelemetryRecord::new("front_door")
            .with_message_id(77)
            .with_ints([1, 3012, 85, 0])
            .with_floats([0.5, 0.0, 0.0, 0.0])
            .with_text("", "2.3 Jan  1");

        let json: Value = serde_json::to_value(RecordMessage::from(&record)).unwrap();
        assert_eq!(json["id"], 77);
        assert_eq!(json["device"], "front_door");
        assert_eq!(json["ival2"], 3012);
        assert_eq!(json["fval1"], 0.5);
        assert_eq!(json["char1"], "");
        assert_eq!(json["char2"], "2.3 Jan  1");
        assert_eq!(json.as_object().map(|o| o.len()), Some(12));
    }

    #[test]
    fn test_health_message_field_names() {
        let msg = HealthMessage {
            uptime: "0 00:00:30 ago".to_string(),
            mem_free_kb: 23,
            msg_count: 4,
            queue_len: 0,
            msg_rate: 8.0,
        };
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["mem_freeKB"], 23);
        assert_eq!(json["msg_rate"], 8.0);
    }

    #[test]
    fn test_init_message_field_names() {
        let msg = InitMessage {
            version: "1.2".to_string(),
            tot_mem_kb: 4096.0,
            mac: "A".to_string(),
            mac_ap: "B".to_string(),
            channel: 6,
        };
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["tot_memKB"], 4096.0);
        assert_eq!(json["macAP"], "B");
        assert_eq!(json["channel"], 6);
    }
}
