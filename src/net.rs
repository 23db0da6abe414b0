//! UDP frame reader: binds one socket and reads the header/data datagram
//! pair that makes up one radar frame.

use std::{io, net::SocketAddr, time::Duration};

use log::warn;
use tokio::net::UdpSocket;

use crate::wire::{DATA_PACKET_SIZE, HEADER_SIZE};

/// Coarse read timeout so shutdown stays responsive even with no traffic.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Reads the header/data-packet datagram pairs that make up radar frames.
///
/// Contract: one logical frame is exactly one header datagram followed by
/// exactly one data-packet datagram, regardless of the header's declared
/// `data_packets_expected` (see `wire::decode_frame`). This reader performs
/// no internal buffering or retries: a mis-sized datagram is discarded and
/// logged, and the next read starts a fresh header.
pub struct FrameReader {
    socket: UdpSocket,
}

impl FrameReader {
    /// Binds a UDP socket at `addr`. Bind failure is fatal and propagated.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(FrameReader { socket })
    }

    /// Reads one header datagram, honoring [`READ_TIMEOUT`]. Returns
    /// `Ok(None)` on timeout so the caller can check for shutdown and retry.
    /// A mis-sized datagram is discarded and reported as `Some(Vec::new())`.
    pub async fn read_header(&self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; HEADER_SIZE + 1];
        match tokio::time::timeout(READ_TIMEOUT, self.socket.recv(&mut buf)).await {
            Ok(Ok(n)) => {
                if n != HEADER_SIZE {
                    warn!("discarding header datagram of {} bytes", n);
                    return Ok(Some(Vec::new()));
                }
                buf.truncate(n);
                Ok(Some(buf))
            }
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Ok(None),
        }
    }

    /// Reads one data-packet datagram. A mis-sized datagram is discarded
    /// (returned as an empty vec) rather than retried.
    pub async fn read_data_packet(&self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; DATA_PACKET_SIZE + 1];
        let n = self.socket.recv(&mut buf).await?;
        if n != DATA_PACKET_SIZE {
            warn!("discarding data packet datagram of {} bytes", n);
            return Ok(Vec::new());
        }
        buf.truncate(n);
        Ok(buf)
    }
}
