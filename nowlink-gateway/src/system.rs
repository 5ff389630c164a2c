// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Host system probe and restarter

use nowlink::Restart;
use nowlink_gateway::SystemProbe;
use std::fs;
use std::net::UdpSocket;

/// Exit status asking the supervisor to relaunch the gateway
pub const RESTART_EXIT_CODE: i32 = 75;

const MEMINFO: &str = "/proc/meminfo";
const WIRELESS: &str = "/proc/net/wireless";

/// Reads memory, address and signal strength from the host
pub struct HostProbe {
    /// Address used to pick the outbound interface
    route_target: (String, u16),
}

impl HostProbe {
    /// Probe the interface that routes to `host:port`
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            route_target: (host.to_string(), port),
        }
    }
}

impl SystemProbe for HostProbe {
    fn free_memory_bytes(&mut self) -> u64 {
        fs::read_to_string(MEMINFO)
            .ok()
            .and_then(|text| parse_mem_available_kb(&text))
            .map_or(0, |kb| kb * 1024)
    }

    fn ip_address(&mut self) -> String {
        // Connecting a UDP socket sends nothing; it only selects a route
        UdpSocket::bind("0.0.0.0:0")
            .and_then(|socket| {
                socket.connect((self.route_target.0.as_str(), self.route_target.1))?;
                socket.local_addr()
            })
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|_| "0.0.0.0".to_string())
    }

    fn rssi(&mut self) -> i32 {
        fs::read_to_string(WIRELESS)
            .ok()
            .and_then(|text| parse_wireless_level(&text))
            .unwrap_or(0)
    }
}

/// `MemAvailable` (or `MemFree`) in KB from `/proc/meminfo`
fn parse_mem_available_kb(meminfo: &str) -> Option<u64> {
    let field = |name: &str| {
        meminfo.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse().ok()
        })
    };
    field("MemAvailable").or_else(|| field("MemFree"))
}

/// Signal level of the first interface in `/proc/net/wireless`
fn parse_wireless_level(wireless: &str) -> Option<i32> {
    // Two header lines, then `iface: status link level noise ...`
    let line = wireless.lines().nth(2)?;
    let level = line.split_whitespace().nth(3)?;
    let level: f64 = level.trim_end_matches('.').parse().ok()?;
    Some(level as i32)
}

/// Restarts by exiting with [`RESTART_EXIT_CODE`]
pub struct ProcessRestarter;

impl Restart for ProcessRestarter {
    fn restart(&mut self, reason: &str) {
        tracing::error!(reason, exit_code = RESTART_EXIT_CODE, "restarting gateway");
        std::process::exit(RESTART_EXIT_CODE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo() {
        let text = "MemTotal:        3884404 kB\nMemFree:          211340 kB\nMemAvailable:    2049812 kB\n";
        assert_eq!(parse_mem_available_kb(text), Some(2_049_812));

        let old_kernel = "MemTotal: 1000 kB\nMemFree: 300 kB\n";
        assert_eq!(parse_mem_available_kb(old_kernel), Some(300));
        assert_eq!(parse_mem_available_kb(""), None);
    }

    #[test]
    fn test_parse_wireless() {
        let text = "Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE\n \
                    face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22\n \
                    wlan0: 0000   49.  -61.  -256        0      0      0      0     13        0\n";
        assert_eq!(parse_wireless_level(text), Some(-61));
        assert_eq!(parse_wireless_level("header\nheader\n"), None);
    }

    #[test]
    fn test_ip_address_falls_back() {
        let mut probe = HostProbe::new("", 0);
        assert!(!probe.ip_address().is_empty());
    }
}
