//! Protocol-level messages spanning one or more frames.
//!
//! ## Message layout
//!
//! ```text
//! [address: u32 BE][seq:4 << 2 | len_hi:2][len_lo: u8][body: len bytes][crc16 BE]
//! ```
//!
//! The serialized message is cut into [`MAX_FRAME_BODY_LEN`] chunks: the first
//! travels in a PDM (controller) or POD (pod) frame, the rest in CON frames.
//! The receiving side starts a [`Message`] from the first frame and feeds it
//! continuation frames until [`MessageState::Complete`] or
//! [`MessageState::Invalid`].

use core::fmt;

use crate::consts::{
    MAX_FRAME_BODY_LEN, MAX_MESSAGE_BODY_LEN, MESSAGE_CRC_LEN, MESSAGE_HEADER_LEN,
    MESSAGE_SEQUENCE_MODULUS,
};
use crate::crc::crc16;
use crate::error::RadioError;
use crate::packet::{Frame, Hex, PacketType};

/// Which side of the link sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Controller request.
    Pdm,
    /// Pod response.
    Pod,
}

impl MessageType {
    /// Frame type carrying the first chunk of this kind of message.
    pub const fn start_packet_type(self) -> PacketType {
        match self {
            MessageType::Pdm => PacketType::Pdm,
            MessageType::Pod => PacketType::Pod,
        }
    }

    const fn from_start_packet(packet_type: PacketType) -> Option<Self> {
        match packet_type {
            PacketType::Pdm => Some(MessageType::Pdm),
            PacketType::Pod => Some(MessageType::Pod),
            _ => None,
        }
    }
}

/// Assembly state of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// All bytes arrived and the checksum matches.
    Complete,
    /// More continuation frames are needed.
    NeedsContinuation,
    /// Overlong, out of order, or failed its checksum.
    Invalid,
}

/// A logical message with a 4-bit sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    address: u32,
    sequence: u8,
    body: Vec<u8>,
    state: MessageState,
    received: Vec<u8>,
    expected_len: usize,
}

impl Message {
    /// Creates a complete outgoing message.
    pub fn new(message_type: MessageType, address: u32, body: Vec<u8>) -> Result<Self, RadioError> {
        if body.len() > MAX_MESSAGE_BODY_LEN {
            return Err(RadioError::MessageTooLong(body.len()));
        }
        Ok(Self {
            message_type,
            address,
            sequence: 0,
            expected_len: MESSAGE_HEADER_LEN + body.len() + MESSAGE_CRC_LEN,
            body,
            state: MessageState::Complete,
            received: Vec::new(),
        })
    }

    /// Starts a message from its first frame.
    ///
    /// Returns `None` if the frame is not a PDM/POD frame or is too short to
    /// carry the message header.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let message_type = MessageType::from_start_packet(frame.packet_type())?;
        let raw = frame.body();
        if raw.len() < MESSAGE_HEADER_LEN {
            return None;
        }
        let address = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let body_len = (((raw[4] & 0x03) as usize) << 8) | raw[5] as usize;
        let mut message = Self {
            message_type,
            address,
            sequence: (raw[4] >> 2) & 0x0f,
            body: Vec::new(),
            state: MessageState::NeedsContinuation,
            received: raw.to_vec(),
            expected_len: MESSAGE_HEADER_LEN + body_len + MESSAGE_CRC_LEN,
        };
        message.evaluate();
        Some(message)
    }

    /// Appends a continuation frame.
    ///
    /// Anything other than a CON frame, or a frame arriving when no
    /// continuation is expected, makes the message invalid.
    pub fn add_continuation_frame(&mut self, frame: &Frame) {
        if self.state != MessageState::NeedsContinuation
            || frame.packet_type() != PacketType::Con
        {
            self.state = MessageState::Invalid;
            return;
        }
        self.received.extend_from_slice(frame.body());
        self.evaluate();
    }

    fn evaluate(&mut self) {
        if self.received.len() < self.expected_len {
            self.state = MessageState::NeedsContinuation;
            return;
        }
        if self.received.len() > self.expected_len {
            self.state = MessageState::Invalid;
            return;
        }
        let (content, check) = self.received.split_at(self.expected_len - MESSAGE_CRC_LEN);
        if crc16(content) == u16::from_be_bytes([check[0], check[1]]) {
            self.body = content[MESSAGE_HEADER_LEN..].to_vec();
            self.state = MessageState::Complete;
        } else {
            log::trace!("message checksum mismatch: {}", Hex(&self.received));
            self.state = MessageState::Invalid;
        }
    }

    /// Who sent the message.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Pod address carried in the message header.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// 4-bit message sequence.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Sets the sequence, masked to 4 bits.
    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence % MESSAGE_SEQUENCE_MODULUS;
    }

    /// Assembly state.
    pub fn state(&self) -> MessageState {
        self.state
    }

    /// Message body. Empty until the message is complete.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serializes header, body and checksum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.body.len();
        let mut data = Vec::with_capacity(MESSAGE_HEADER_LEN + len + MESSAGE_CRC_LEN);
        data.extend_from_slice(&self.address.to_be_bytes());
        data.push((self.sequence << 2) | ((len >> 8) as u8 & 0x03));
        data.push((len & 0xff) as u8);
        data.extend_from_slice(&self.body);
        let crc = crc16(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        data
    }

    /// Splits the message into frames ready to send, sequence numbers unset.
    pub fn frames(&self) -> Vec<Frame> {
        self.to_bytes()
            .chunks(MAX_FRAME_BODY_LEN)
            .enumerate()
            .map(|(i, chunk)| {
                let packet_type = if i == 0 {
                    self.message_type.start_packet_type()
                } else {
                    PacketType::Con
                };
                Frame::new(self.address, packet_type, 0, chunk.to_vec())
            })
            .collect()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:08x} seq={:02} {:?} body={}",
            self.message_type.start_packet_type(),
            self.address,
            self.sequence,
            self.state,
            Hex(&self.body)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    const ADDRESS: u32 = 0x1f01482a;

    fn received(frame: &Frame) -> Frame {
        Frame::parse(SystemTime::now(), &frame.data()).unwrap()
    }

    #[test]
    fn test_serialization_layout() {
        let mut message = Message::new(MessageType::Pdm, ADDRESS, vec![0x0e, 0x01, 0x00]).unwrap();
        message.set_sequence(5);
        let bytes = message.to_bytes();
        assert_eq!(&bytes[..6], &[0x1f, 0x01, 0x48, 0x2a, 5 << 2, 3]);
        assert_eq!(&bytes[6..9], &[0x0e, 0x01, 0x00]);
        assert_eq!(&bytes[9..], &crc16(&bytes[..9]).to_be_bytes());
    }

    #[test]
    fn test_long_body_sets_length_high_bits() {
        let message = Message::new(MessageType::Pod, ADDRESS, vec![0xab; 0x1ff]).unwrap();
        let bytes = message.to_bytes();
        assert_eq!(bytes[4] & 0x03, 0x01);
        assert_eq!(bytes[5], 0xff);
        assert!(Message::new(MessageType::Pod, ADDRESS, vec![0; 1024]).is_err());
    }

    #[test]
    fn test_sequence_is_masked() {
        let mut message = Message::new(MessageType::Pdm, ADDRESS, vec![1]).unwrap();
        message.set_sequence(17);
        assert_eq!(message.sequence(), 1);
    }

    #[test]
    fn test_short_message_fits_one_frame() {
        let message = Message::new(MessageType::Pdm, ADDRESS, vec![0x0e, 0x01, 0x00]).unwrap();
        let frames = message.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet_type(), PacketType::Pdm);
        assert_eq!(frames[0].address(), ADDRESS);
        assert_eq!(frames[0].body(), message.to_bytes().as_slice());
    }

    #[test]
    fn test_long_message_splits_into_continuations() {
        let message = Message::new(MessageType::Pod, ADDRESS, (0u8..60).collect()).unwrap();
        let frames = message.frames();
        // 6 + 60 + 2 = 68 bytes -> 25 + 25 + 18
        let types: Vec<_> = frames.iter().map(Frame::packet_type).collect();
        assert_eq!(types, vec![PacketType::Pod, PacketType::Con, PacketType::Con]);
        assert_eq!(frames[2].body().len(), 18);
    }

    #[test]
    fn test_single_frame_message_is_complete() {
        let mut sent = Message::new(MessageType::Pod, ADDRESS, vec![0x1d, 0x18, 0x02]).unwrap();
        sent.set_sequence(9);
        let message = Message::from_frame(&received(&sent.frames()[0])).unwrap();
        assert_eq!(message.state(), MessageState::Complete);
        assert_eq!(message.sequence(), 9);
        assert_eq!(message.address(), ADDRESS);
        assert_eq!(message.message_type(), MessageType::Pod);
        assert_eq!(message.body(), &[0x1d, 0x18, 0x02]);
    }

    #[test]
    fn test_reassembles_continuations() {
        let sent = Message::new(MessageType::Pod, ADDRESS, (0u8..60).collect()).unwrap();
        let frames = sent.frames();
        let mut message = Message::from_frame(&received(&frames[0])).unwrap();
        assert_eq!(message.state(), MessageState::NeedsContinuation);
        assert!(message.body().is_empty());
        message.add_continuation_frame(&received(&frames[1]));
        assert_eq!(message.state(), MessageState::NeedsContinuation);
        message.add_continuation_frame(&received(&frames[2]));
        assert_eq!(message.state(), MessageState::Complete);
        assert_eq!(message.body(), sent.body());
    }

    #[test]
    fn test_corrupted_checksum_is_invalid() {
        let sent = Message::new(MessageType::Pod, ADDRESS, vec![0x1d, 0x18]).unwrap();
        let mut bytes = sent.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        let frame = Frame::new(ADDRESS, PacketType::Pod, 0, bytes);
        let message = Message::from_frame(&frame).unwrap();
        assert_eq!(message.state(), MessageState::Invalid);
    }

    #[test]
    fn test_wrong_continuation_type_is_invalid() {
        let sent = Message::new(MessageType::Pod, ADDRESS, (0u8..40).collect()).unwrap();
        let frames = sent.frames();
        let mut message = Message::from_frame(&frames[0]).unwrap();
        message.add_continuation_frame(&Frame::ack(ADDRESS, false));
        assert_eq!(message.state(), MessageState::Invalid);
    }

    #[test]
    fn test_overlong_continuation_is_invalid() {
        let sent = Message::new(MessageType::Pod, ADDRESS, (0u8..30).collect()).unwrap();
        let frames = sent.frames();
        let mut message = Message::from_frame(&frames[0]).unwrap();
        let mut padded = frames[1].body().to_vec();
        padded.push(0);
        message.add_continuation_frame(&Frame::new(ADDRESS, PacketType::Con, 0, padded));
        assert_eq!(message.state(), MessageState::Invalid);
    }

    #[test]
    fn test_from_frame_rejects_non_start_frames() {
        assert!(Message::from_frame(&Frame::ack(ADDRESS, true)).is_none());
        assert!(Message::from_frame(&Frame::new(ADDRESS, PacketType::Con, 0, vec![0; 10])).is_none());
        assert!(Message::from_frame(&Frame::new(ADDRESS, PacketType::Pod, 0, vec![0; 5])).is_none());
    }
}
