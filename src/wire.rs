//! Binary frame layout for the iSYS-5021 UDP protocol: header + data-packet
//! decoding, integrity check, and frame-loss detection.

use std::{fmt, io};

/// Size in bytes of the fixed header datagram.
pub const HEADER_SIZE: usize = 256;
/// Size in bytes of one data-packet datagram.
pub const DATA_PACKET_SIZE: usize = 1012;
/// Number of target slots per data packet.
pub const TARGETS_PER_PACKET: usize = 42;
/// Wire size in bytes of one target record.
pub const TARGET_SIZE: usize = 24;

/// Frame decode error kinds.
#[derive(Debug)]
pub enum Error {
    /// Header datagram was not exactly [`HEADER_SIZE`] bytes.
    ShortHeader(usize),
    /// A data-packet datagram was not exactly [`DATA_PACKET_SIZE`] bytes.
    ShortPacket(usize),
    /// Computed checksum did not match the header's `crc32` field.
    BadCrc { expected: u32, computed: u32 },
    /// `bytes_per_target` in the header did not match [`TARGET_SIZE`].
    ReservedSize(u16),
    /// I/O error from the underlying socket.
    Io(io::Error),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ShortHeader(n) => write!(f, "short header: {} bytes", n),
            Error::ShortPacket(n) => write!(f, "short data packet: {} bytes", n),
            Error::BadCrc { expected, computed } => {
                write!(f, "crc mismatch: expected {:#x}, computed {:#x}", expected, computed)
            }
            Error::ReservedSize(n) => write!(f, "unexpected bytes_per_target: {}", n),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

/// One fixed-size target slot as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawTarget {
    /// Reported signal strength, in dB.
    pub signal_strength_db: f32,
    /// Reported range, in meters.
    pub range_m: f32,
    /// Reported radial velocity, in m/s, signed.
    pub velocity_m_s: f32,
    /// Reported azimuth, in degrees.
    pub azimuth_deg: f32,
    reserved_a: u32,
    reserved_b: u32,
}

impl RawTarget {
    /// A slot where all four floats are exactly zero is an empty sentinel.
    pub fn is_empty_sentinel(&self) -> bool {
        self.signal_strength_db == 0.0
            && self.range_m == 0.0
            && self.velocity_m_s == 0.0
            && self.azimuth_deg == 0.0
    }

    fn from_bytes(b: &[u8; TARGET_SIZE]) -> RawTarget {
        RawTarget {
            signal_strength_db: f32::from_le_bytes(b[0..4].try_into().unwrap()),
            range_m: f32::from_le_bytes(b[4..8].try_into().unwrap()),
            velocity_m_s: f32::from_le_bytes(b[8..12].try_into().unwrap()),
            azimuth_deg: f32::from_le_bytes(b[12..16].try_into().unwrap()),
            reserved_a: u32::from_le_bytes(b[16..20].try_into().unwrap()),
            reserved_b: u32::from_le_bytes(b[20..24].try_into().unwrap()),
        }
    }

    fn to_bytes(self) -> [u8; TARGET_SIZE] {
        let mut out = [0u8; TARGET_SIZE];
        out[0..4].copy_from_slice(&self.signal_strength_db.to_le_bytes());
        out[4..8].copy_from_slice(&self.range_m.to_le_bytes());
        out[8..12].copy_from_slice(&self.velocity_m_s.to_le_bytes());
        out[12..16].copy_from_slice(&self.azimuth_deg.to_le_bytes());
        out[16..20].copy_from_slice(&self.reserved_a.to_le_bytes());
        out[20..24].copy_from_slice(&self.reserved_b.to_le_bytes());
        out
    }

    #[cfg(test)]
    pub fn new(signal_strength_db: f32, range_m: f32, velocity_m_s: f32, azimuth_deg: f32) -> Self {
        RawTarget {
            signal_strength_db,
            range_m,
            velocity_m_s,
            azimuth_deg,
            reserved_a: 0,
            reserved_b: 0,
        }
    }
}

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Header {
    frame_id: u16,
    fw_major: u16,
    fw_fix: u16,
    fw_minor: u16,
    detections_reported: u16,
    targets_reported: u16,
    crc32: u32,
    bytes_per_target: u16,
    data_packets_expected: u16,
}

fn parse_header(bytes: &[u8]) -> Result<Header, Error> {
    if bytes.len() != HEADER_SIZE {
        return Err(Error::ShortHeader(bytes.len()));
    }
    let header = Header {
        frame_id: u16::from_le_bytes(bytes[0..2].try_into().unwrap()),
        fw_major: u16::from_le_bytes(bytes[2..4].try_into().unwrap()),
        fw_fix: u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
        fw_minor: u16::from_le_bytes(bytes[6..8].try_into().unwrap()),
        detections_reported: u16::from_le_bytes(bytes[8..10].try_into().unwrap()),
        targets_reported: u16::from_le_bytes(bytes[10..12].try_into().unwrap()),
        crc32: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        bytes_per_target: u16::from_le_bytes(bytes[16..18].try_into().unwrap()),
        data_packets_expected: u16::from_le_bytes(bytes[18..20].try_into().unwrap()),
    };
    if header.bytes_per_target as usize != TARGET_SIZE {
        return Err(Error::ReservedSize(header.bytes_per_target));
    }
    Ok(header)
}

/// Additive 32-bit checksum over `data` (wraps on overflow), matching the
/// radar's own integrity check — not a CRC polynomial.
pub fn additive_checksum(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    for &byte in data {
        sum = sum.wrapping_add(byte as u32);
    }
    sum
}

/// A fully decoded radar frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Sequence id from the header, wraps mod 2^16.
    pub frame_id: u16,
    /// `(major, fix, minor)` firmware version.
    pub firmware: (u16, u16, u16),
    /// `detections_reported` field from the header.
    pub detections_reported: u16,
    /// `targets_reported` field from the header; only this many of
    /// `targets` are semantically valid.
    pub targets_reported: u16,
    /// `data_packets_expected` field from the header, carried through for
    /// logging. The radar always sends exactly one data-packet datagram per
    /// frame regardless of this field's value, so it is not used to read
    /// further packets (see `decode_frame`).
    pub data_packets_expected: u16,
    /// All target slots in the frame's one data packet, [`TARGETS_PER_PACKET`]
    /// long.
    pub targets: Vec<RawTarget>,
}

/// Decode one frame from a header datagram and its single following
/// data-packet datagram.
///
/// The wire protocol's header carries a `data_packets_expected` field, but
/// every real sender (confirmed against the reference Python
/// implementations this protocol was reverse-engineered from) always
/// follows a header with exactly one [`DATA_PACKET_SIZE`] data-packet
/// datagram and computes `crc32` over that single packet's payload only —
/// `data_packets_expected` is parsed but never used to read a second
/// packet. This function mirrors that: it reads one packet and checksums
/// it against the header's `crc32`. A header declaring more than one
/// packet is not an error; the extra packets, if the radar ever sent them,
/// would simply never be read by this call.
pub fn decode_frame(header_bytes: &[u8], data_packet: &[u8]) -> Result<RawFrame, Error> {
    let header = parse_header(header_bytes)?;

    if data_packet.len() != DATA_PACKET_SIZE {
        return Err(Error::ShortPacket(data_packet.len()));
    }

    let payload_len =
        (header.targets_reported as usize * TARGET_SIZE).min(DATA_PACKET_SIZE.saturating_sub(4));
    let computed = additive_checksum(&data_packet[4..4 + payload_len]);
    if computed != header.crc32 {
        return Err(Error::BadCrc {
            expected: header.crc32,
            computed,
        });
    }

    let mut targets = Vec::with_capacity(TARGETS_PER_PACKET);
    for slot in 0..TARGETS_PER_PACKET {
        let base = 4 + slot * TARGET_SIZE;
        let chunk: [u8; TARGET_SIZE] = data_packet[base..base + TARGET_SIZE].try_into().unwrap();
        targets.push(RawTarget::from_bytes(&chunk));
    }

    Ok(RawFrame {
        frame_id: header.frame_id,
        firmware: (header.fw_major, header.fw_fix, header.fw_minor),
        detections_reported: header.detections_reported,
        targets_reported: header.targets_reported,
        data_packets_expected: header.data_packets_expected,
        targets,
    })
}

/// Tracks the last seen frame id and reports whether the newest id
/// represents a gap (lost frame), without blocking processing of the frame.
#[derive(Debug, Default)]
pub struct FrameLossTracker {
    last_frame_id: Option<u16>,
}

impl FrameLossTracker {
    /// Creates a fresh tracker with no prior frame observed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes `frame_id`, returning `true` if it represents a gap versus
    /// the previously observed id.
    pub fn observe(&mut self, frame_id: u16) -> bool {
        let gapped = match self.last_frame_id {
            Some(last) => frame_id != last.wrapping_add(1),
            None => false,
        };
        self.last_frame_id = Some(frame_id);
        gapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_header(
        frame_id: u16,
        targets_reported: u16,
        data_packets_expected: u16,
        crc32: u32,
    ) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..2].copy_from_slice(&frame_id.to_le_bytes());
        bytes[2..4].copy_from_slice(&1u16.to_le_bytes());
        bytes[4..6].copy_from_slice(&0u16.to_le_bytes());
        bytes[6..8].copy_from_slice(&0u16.to_le_bytes());
        bytes[8..10].copy_from_slice(&targets_reported.to_le_bytes());
        bytes[10..12].copy_from_slice(&targets_reported.to_le_bytes());
        bytes[12..16].copy_from_slice(&crc32.to_le_bytes());
        bytes[16..18].copy_from_slice(&(TARGET_SIZE as u16).to_le_bytes());
        bytes[18..20].copy_from_slice(&data_packets_expected.to_le_bytes());
        bytes
    }

    fn encode_data_packet(frame_id: u16, packet_num: u16, targets: &[RawTarget]) -> Vec<u8> {
        let mut bytes = vec![0u8; DATA_PACKET_SIZE];
        bytes[0..2].copy_from_slice(&frame_id.to_le_bytes());
        bytes[2..4].copy_from_slice(&packet_num.to_le_bytes());
        for (i, target) in targets.iter().enumerate() {
            let base = 4 + i * TARGET_SIZE;
            bytes[base..base + TARGET_SIZE].copy_from_slice(&target.to_bytes());
        }
        bytes
    }

    #[test]
    fn empty_frame_round_trip() {
        let targets = vec![RawTarget::default(); TARGETS_PER_PACKET];
        let data = encode_data_packet(1, 1, &targets);
        let payload_crc = additive_checksum(&data[4..4]);
        let header = encode_header(1, 0, 1, payload_crc);

        let frame = decode_frame(&header, &data).unwrap();
        assert_eq!(frame.frame_id, 1);
        assert_eq!(frame.targets_reported, 0);
        assert_eq!(frame.targets.len(), TARGETS_PER_PACKET);
        assert!(frame.targets.iter().all(|t| t.is_empty_sentinel()));
    }

    #[test]
    fn single_target_round_trip() {
        let mut targets = vec![RawTarget::default(); TARGETS_PER_PACKET];
        targets[0] = RawTarget::new(30.0, 50.0, 5.0, 10.0);
        let data = encode_data_packet(7, 1, &targets);
        let payload_crc = additive_checksum(&data[4..4 + TARGET_SIZE]);
        let header = encode_header(7, 1, 1, payload_crc);

        let frame = decode_frame(&header, &data).unwrap();
        assert_eq!(frame.frame_id, 7);
        assert_eq!(frame.targets[0], targets[0]);
    }

    #[test]
    fn crc_mismatch_is_rejected() {
        let targets = vec![RawTarget::default(); TARGETS_PER_PACKET];
        let mut data = encode_data_packet(1, 1, &targets);
        data[4] ^= 0xFF; // flip one payload byte
        let header = encode_header(1, 0, 1, 0);

        let err = decode_frame(&header, &data).unwrap_err();
        assert!(matches!(err, Error::BadCrc { .. }));
    }

    #[test]
    fn short_header_is_rejected() {
        let err = decode_frame(&[0u8; HEADER_SIZE - 1], &[]).unwrap_err();
        assert!(matches!(err, Error::ShortHeader(_)));
    }

    #[test]
    fn short_packet_is_rejected() {
        let header = encode_header(1, 0, 1, 0);
        let short = vec![0u8; DATA_PACKET_SIZE - 1];
        let err = decode_frame(&header, &short).unwrap_err();
        assert!(matches!(err, Error::ShortPacket(_)));
    }

    #[test]
    fn declared_multi_packet_header_reads_only_the_one_packet_given() {
        // Real senders always follow a header with exactly one data-packet
        // datagram regardless of what `data_packets_expected` declares,
        // and checksum it as such; a declared value of 2 must not make
        // decode_frame try to read or checksum a second packet.
        let mut targets = vec![RawTarget::default(); TARGETS_PER_PACKET];
        targets[0] = RawTarget::new(25.0, 40.0, -3.0, -15.0);
        let data = encode_data_packet(3, 1, &targets);
        let payload_crc = additive_checksum(&data[4..4 + TARGET_SIZE]);
        let header = encode_header(3, 1, 2, payload_crc);

        let frame = decode_frame(&header, &data).unwrap();
        assert_eq!(frame.data_packets_expected, 2);
        assert_eq!(frame.targets.len(), TARGETS_PER_PACKET);
        assert_eq!(frame.targets[0], targets[0]);
    }

    #[test]
    fn frame_loss_tracker_detects_gap() {
        let mut tracker = FrameLossTracker::new();
        assert!(!tracker.observe(1));
        assert!(!tracker.observe(2));
        assert!(tracker.observe(4)); // gap: 3 skipped
        assert!(!tracker.observe(5));
    }

    #[test]
    fn frame_loss_tracker_wraps_at_u16_max() {
        let mut tracker = FrameLossTracker::new();
        assert!(!tracker.observe(65535));
        assert!(!tracker.observe(0));
    }
}
