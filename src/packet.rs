//! Single radio frames and their wire form.
//!
//! ## Frame layout
//!
//! ```text
//! [address: u32 BE][type:3 | sequence:5][body: 0..=25 bytes]
//! ```
//!
//! On the air the serialized frame is followed by a CRC-8 and then
//! Manchester-encoded by [`ManchesterCodec`]. [`encode_frame`] and
//! [`decode_capture`] do both directions, including the checksum gate.

use core::fmt;
use std::time::SystemTime;

use crate::consts::{FRAME_HEADER_LEN, MAX_FRAME_BODY_LEN, PACKET_SEQUENCE_MODULUS};
use crate::crc::crc8;
use crate::encoding::ManchesterCodec;
use crate::transceiver::RawCapture;

/// Role of a frame within an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// First frame of a controller request.
    Pdm,
    /// First frame of a pod response.
    Pod,
    /// Acknowledgement, also used to pull continuation frames.
    Ack,
    /// Continuation of a multi-frame message.
    Con,
}

impl PacketType {
    /// The 3-bit code carried in the frame's type/sequence byte.
    pub const fn code(self) -> u8 {
        match self {
            PacketType::Pdm => 0b101,
            PacketType::Pod => 0b111,
            PacketType::Ack => 0b010,
            PacketType::Con => 0b100,
        }
    }

    /// Looks up a type from its 3-bit code.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0b101 => Some(PacketType::Pdm),
            0b111 => Some(PacketType::Pod),
            0b010 => Some(PacketType::Ack),
            0b100 => Some(PacketType::Con),
            _ => None,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PacketType::Pdm => "PDM",
            PacketType::Pod => "POD",
            PacketType::Ack => "ACK",
            PacketType::Con => "CON",
        })
    }
}

/// One radio frame: address, 5-bit sequence, type and body.
///
/// Only the sequence is mutable after construction; the engine stamps it
/// right before every transmission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    address: u32,
    packet_type: PacketType,
    sequence: u8,
    body: Vec<u8>,
    timestamp: Option<SystemTime>,
}

impl Frame {
    /// Creates an outgoing frame. `sequence` is masked to 5 bits.
    pub fn new(address: u32, packet_type: PacketType, sequence: u8, body: Vec<u8>) -> Self {
        Self {
            address,
            packet_type,
            sequence: sequence % PACKET_SEQUENCE_MODULUS,
            body,
            timestamp: None,
        }
    }

    /// Creates an acknowledgement addressed to `address`.
    ///
    /// Intermediate acknowledgements echo the pod address; the final
    /// acknowledgement closing an exchange carries zero instead.
    pub fn ack(address: u32, final_ack: bool) -> Self {
        let acked = if final_ack { 0 } else { address };
        Self::new(address, PacketType::Ack, 0, acked.to_be_bytes().to_vec())
    }

    /// Parses a frame out of decoded, checksum-verified bytes.
    ///
    /// Returns `None` for input shorter than the header, an unknown type code,
    /// an oversized body, an empty body on a non-ACK frame, or an ACK body that
    /// isn't exactly one address.
    pub fn parse(timestamp: SystemTime, data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }
        let address = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let packet_type = PacketType::from_code(data[4] >> 5)?;
        let body = &data[FRAME_HEADER_LEN..];
        let well_formed = match packet_type {
            PacketType::Ack => body.len() == 4,
            _ => !body.is_empty() && body.len() <= MAX_FRAME_BODY_LEN,
        };
        if !well_formed {
            return None;
        }
        Some(Self {
            address,
            packet_type,
            sequence: data[4] & 0x1f,
            body: body.to_vec(),
            timestamp: Some(timestamp),
        })
    }

    /// Device address this frame is sent to or from.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Frame type.
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// 5-bit sequence number.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Sets the sequence number, masked to 5 bits.
    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence % PACKET_SEQUENCE_MODULUS;
    }

    /// Frame body, after the header.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// When the frame was received; `None` for frames built locally.
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }

    /// Address acknowledged by an ACK frame.
    pub fn ack_address(&self) -> Option<u32> {
        match (self.packet_type, self.body.as_slice()) {
            (PacketType::Ack, &[a, b, c, d]) => Some(u32::from_be_bytes([a, b, c, d])),
            _ => None,
        }
    }

    /// Serializes the frame, without checksum.
    pub fn data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(FRAME_HEADER_LEN + self.body.len() + 1);
        data.extend_from_slice(&self.address.to_be_bytes());
        data.push((self.packet_type.code() << 5) | self.sequence);
        data.extend_from_slice(&self.body);
        data
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:08x} seq={:02} body={}",
            self.packet_type,
            self.address,
            self.sequence,
            Hex(&self.body)
        )
    }
}

/// Lowercase hex rendering for log lines.
pub(crate) struct Hex<'a>(pub(crate) &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Serializes `frame`, appends its checksum and line-encodes it for the air.
pub fn encode_frame(codec: &mut ManchesterCodec, frame: &Frame, frame_length: usize) -> Vec<u8> {
    let mut data = frame.data();
    data.push(crc8(&data));
    codec.encode(&data, frame_length)
}

/// Decodes a raw capture into a frame.
///
/// The capture is Manchester-decoded up to the first invalid symbol; the last
/// decoded byte must match the CRC-8 of everything before it. Anything that
/// fails is treated as "no frame".
pub fn decode_capture(codec: &ManchesterCodec, capture: &RawCapture) -> Option<Frame> {
    let data = codec.decode(&capture.data);
    let (&check, payload) = data.split_last()?;
    if payload.is_empty() || crc8(payload) != check {
        log::trace!("dropping capture with bad checksum: {}", Hex(&data));
        return None;
    }
    Frame::parse(capture.timestamp, payload)
}
