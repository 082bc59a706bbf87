//! Periodic fire-and-forget DMX sender
//!
//! Every call to [`DmxTransmitter::send`] puts the full channel table on the
//! wire. Failures are logged and counted; the next tick resends full state,
//! so nothing is retried.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dmx::protocol::{ChannelTable, FrameEncoder, FrameHeader};
use crate::error::TransportError;
use crate::network::udp::create_socket;

/// UDP sender for one universe
pub struct DmxTransmitter {
    socket: UdpSocket,
    target: SocketAddr,
    header: FrameHeader,
    encoder: FrameEncoder,
    /// Advance the sequence byte each frame (1..=255) instead of sending 0
    sequenced: bool,
    closed: bool,
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
}

impl DmxTransmitter {
    /// Open a socket for `target`
    pub fn new(target: SocketAddr, universe: u16, physical: u8) -> Result<Self, TransportError> {
        let socket = create_socket(target)?;
        tracing::info!("DMX transmitter ready: {} universe {}", target, universe);

        Ok(Self {
            socket,
            target,
            header: FrameHeader {
                sequence: 0,
                physical,
                universe,
            },
            encoder: FrameEncoder::new(),
            sequenced: false,
            closed: false,
            frames_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
        })
    }

    pub fn with_sequencing(mut self, sequenced: bool) -> Self {
        self.sequenced = sequenced;
        self
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one frame. Returns whether the datagram was handed to the OS.
    pub fn send(&mut self, table: &ChannelTable) -> bool {
        if self.closed {
            return false;
        }
        if self.sequenced {
            self.header.sequence = match self.header.sequence {
                255 => 1,
                n => n + 1,
            };
        }

        let frame = self.encoder.encode(self.header, table);
        match self.socket.send_to(frame, self.target) {
            Ok(_) => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                let failures = self.send_failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    "DMX send to {} failed ({} total): {}",
                    self.target,
                    failures,
                    TransportError::SendFailed(e.to_string())
                );
                false
            }
        }
    }

    /// Send an all-zero frame and stop transmitting.
    ///
    /// Called automatically on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.send(&ChannelTable::new());
        self.closed = true;
        tracing::info!("DMX transmitter to {} closed", self.target);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> TransmitterStats {
        TransmitterStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for DmxTransmitter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Transmitter statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitterStats {
    pub frames_sent: u64,
    pub send_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmx::protocol::{decode_frame, FRAME_LEN};
    use std::time::Duration;

    fn receiver() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        socket
    }

    #[test]
    fn test_send_full_frame() {
        let rx = receiver();
        let mut tx = DmxTransmitter::new(rx.local_addr().unwrap(), 3, 0).unwrap();

        let mut table = ChannelTable::new();
        table.set(5, 200);
        assert!(tx.send(&table));

        let mut buf = [0u8; 1024];
        let len = rx.recv(&mut buf).unwrap();
        assert_eq!(len, FRAME_LEN);
        let frame = decode_frame(&buf[..len]).unwrap();
        assert_eq!(frame.header.universe, 3);
        assert_eq!(frame.data[4], 200);
        assert_eq!(tx.stats().frames_sent, 1);
    }

    #[test]
    fn test_close_sends_zero_frame_once() {
        let rx = receiver();
        let mut tx = DmxTransmitter::new(rx.local_addr().unwrap(), 0, 0).unwrap();

        let mut table = ChannelTable::new();
        table.set(1, 255);
        tx.send(&table);
        tx.close();
        tx.close();
        assert!(!tx.send(&table));
        drop(tx);

        let mut buf = [0u8; 1024];
        let first = rx.recv(&mut buf).unwrap();
        assert_eq!(decode_frame(&buf[..first]).unwrap().data[0], 255);
        let second = rx.recv(&mut buf).unwrap();
        assert!(decode_frame(&buf[..second]).unwrap().data.iter().all(|b| *b == 0));

        rx.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        assert!(rx.recv(&mut buf).is_err());
    }

    #[test]
    fn test_failed_send_does_not_stop_next_frame() {
        let rx = receiver();
        let addr = rx.local_addr().unwrap();
        let mut tx = DmxTransmitter::new(addr, 0, 0).unwrap();
        let mut table = ChannelTable::new();
        table.set(1, 42);

        // Port 0 is never a valid destination
        tx.target = SocketAddr::from(([127, 0, 0, 1], 0));
        assert!(!tx.send(&table));
        assert_eq!(
            tx.stats(),
            TransmitterStats {
                frames_sent: 0,
                send_failures: 1
            }
        );

        tx.target = addr;
        assert!(tx.send(&table));
        let mut buf = [0u8; 1024];
        let len = rx.recv(&mut buf).unwrap();
        assert_eq!(decode_frame(&buf[..len]).unwrap().data[0], 42);
        assert_eq!(
            tx.stats(),
            TransmitterStats {
                frames_sent: 1,
                send_failures: 1
            }
        );
    }

    #[test]
    fn test_sequencing_skips_zero() {
        let rx = receiver();
        let mut tx = DmxTransmitter::new(rx.local_addr().unwrap(), 0, 0)
            .unwrap()
            .with_sequencing(true);
        let table = ChannelTable::new();
        let mut buf = [0u8; 1024];
        for expected in [1u8, 2] {
            tx.send(&table);
            let len = rx.recv(&mut buf).unwrap();
            assert_eq!(decode_frame(&buf[..len]).unwrap().header.sequence, expected);
        }
    }
}
