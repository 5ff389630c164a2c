// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! UDP ingress
//!
//! Stands in for the radio receive context on a host: each datagram carries
//! one record and is answered with a one-byte link status, `0` when the
//! record was decoded. A record dropped on a full queue is still
//! acknowledged, as the radio link would.

use nowlink::MAX_RADIO_PAYLOAD;
use nowlink_gateway::{receive, IngressQueue, IngressStats, ReceiveOutcome};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Status byte for a decoded record
pub const ACK_OK: u8 = 0;

/// Status byte for a payload that is not a record
pub const ACK_MALFORMED: u8 = 1;

/// Link status returned to the sender
pub fn ack_code(outcome: ReceiveOutcome) -> u8 {
    match outcome {
        ReceiveOutcome::Queued | ReceiveOutcome::Dropped => ACK_OK,
        ReceiveOutcome::Malformed => ACK_MALFORMED,
    }
}

/// Receive thread bound to a UDP socket
pub struct UdpIngress {
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl UdpIngress {
    /// Bind `listen` and start receiving into `queue`
    pub fn spawn(
        listen: &str,
        queue: Arc<IngressQueue>,
        stats: Arc<IngressStats>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(listen)?;
        let local_addr = socket.local_addr()?;
        tracing::info!(%local_addr, "udp ingress listening");

        let handle = thread::Builder::new()
            .name("udp-ingress".to_string())
            .spawn(move || run(socket, &queue, &stats))?;

        Ok(Self { local_addr, handle })
    }

    /// Bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the receive thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn run(socket: UdpSocket, queue: &IngressQueue, stats: &IngressStats) {
    // One extra byte so oversized payloads are seen as such
    let mut buf = [0u8; MAX_RADIO_PAYLOAD + 1];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(error = %e, "udp ingress receive failed, stopping");
                return;
            }
        };

        let code = ack_code(receive(queue, stats, &buf[..len]));
        if let Err(e) = socket.send_to(&[code], peer) {
            tracing::debug!(%peer, error = %e, "failed to send link ack");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowlink::TelemetryRecord;
    use std::time::Duration;

    #[test]
    fn test_ack_codes() {
        assert_eq!(ack_code(ReceiveOutcome::Queued), ACK_OK);
        assert_eq!(ack_code(ReceiveOutcome::Dropped), ACK_OK);
        assert_eq!(ack_code(ReceiveOutcome::Malformed), ACK_MALFORMED);
    }

    #[test]
    fn test_loopback_datagram() {
        let queue = Arc::new(IngressQueue::new(4));
        let stats = Arc::new(IngressStats::new());
        let ingress =
            UdpIngress::spawn("127.0.0.1:0", Arc::clone(&queue), Arc::clone(&stats)).unwrap();

        let node = UdpSocket::bind("127.0.0.1:0").unwrap();
        node.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let record = TelemetryRecord::new("door").with_message_id(3);
        node.send_to(&record.to_bytes(), ingress.local_addr()).unwrap();

        let mut ack = [0xFFu8; 1];
        node.recv_from(&mut ack).unwrap();
        assert_eq!(ack[0], ACK_OK);
        assert_eq!(queue.dequeue(), Some(record));

        node.send_to(b"short", ingress.local_addr()).unwrap();
        node.recv_from(&mut ack).unwrap();
        assert_eq!(ack[0], ACK_MALFORMED);
        assert_eq!(stats.malformed(), 1);
        assert!(!ingress.is_finished());
    }
}
