//! Constants used across the pod radio protocol implementation.
//!
//! This module collects the fixed numbers the link and transport layers agree
//! on with the pod firmware: line framing geometry, retry budgets, reply
//! timeout windows, sequence moduli and frame/message size limits.
//!
//! ## Key Concepts
//!
//! - **Preamble**: a long `0x66 0x65` tone followed by the `0xa5 0x5a` sync tail.
//!   The radio is configured with `0xa55a` as its sync word, so everything it hands
//!   back on reception starts right after the preamble.
//! - **Noise lines**: trailing padding built only from nibbles that are not valid
//!   Manchester halves, so decoding always stops where the real payload ends.
//! - **Budgets**: a single-frame exchange runs up to [`MAX_EXCHANGE_ROUNDS`] rounds
//!   of [`MAX_ATTEMPTS_PER_ROUND`] transmissions each.
//! - **Timeout windows**: reply waits are drawn at random from inclusive millisecond
//!   windows; the window widens after the pod has been heard answering with the
//!   wrong frame type.

use core::ops::RangeInclusive;

/// The two byte tone repeated at the start of every transmission.
pub const PREAMBLE_TONE: [u8; 2] = [0x66, 0x65];

/// Number of times [`PREAMBLE_TONE`] is repeated.
pub const PREAMBLE_REPEAT: usize = 200;

/// Sync tail closing the preamble. Matches the radio's configured sync word.
pub const PREAMBLE_SYNC: [u8; 2] = [0xa5, 0x5a];

/// Total preamble length in bytes, tone repetitions plus sync tail.
pub const PREAMBLE_LEN: usize = PREAMBLE_REPEAT * PREAMBLE_TONE.len() + PREAMBLE_SYNC.len();

/// Preamble bytes always kept in front of the payload when trimming a frame.
pub const MIN_PREAMBLE_BYTES: usize = 4;

/// Noise bytes always reserved after the payload when trimming a frame.
pub const MIN_NOISE_BYTES: usize = 2;

/// Number of pre-generated noise lines rotated through on transmit.
pub const NOISE_LINE_COUNT: usize = 32;

/// Length in bytes of each noise line (160 nibbles).
pub const NOISE_LINE_LEN: usize = 80;

/// Leading nibble of every noise line.
pub const NOISE_LEAD_NIBBLE: u8 = 0xf;

/// Nibbles noise is drawn from. `5`, `6`, `9` and `a` are left out since those are
/// exactly the nibbles a Manchester symbol is made of.
pub const NOISE_NIBBLES: [u8; 12] = [
    0x0, 0x1, 0x2, 0x3, 0x4, 0x7, 0x8, 0xb, 0xc, 0xd, 0xe, 0xf,
];

/// Modulus of the 5-bit packet sequence.
pub const PACKET_SEQUENCE_MODULUS: u8 = 32;

/// Modulus of the 4-bit message sequence.
pub const MESSAGE_SEQUENCE_MODULUS: u8 = 16;

/// Length of the frame header: 4 address bytes and the type/sequence byte.
pub const FRAME_HEADER_LEN: usize = 5;

/// Maximum body carried by a single frame.
pub const MAX_FRAME_BODY_LEN: usize = 25;

/// Length of the message header: 4 address bytes and 2 sequence/length bytes.
pub const MESSAGE_HEADER_LEN: usize = 6;

/// Length of the message trailer (CRC-16).
pub const MESSAGE_CRC_LEN: usize = 2;

/// Largest message body expressible by the 10-bit length field.
pub const MAX_MESSAGE_BODY_LEN: usize = 0x3ff;

/// Number of rounds a single-frame exchange may escalate through.
pub const MAX_EXCHANGE_ROUNDS: u32 = 3;

/// Transmissions per round before the exchange is declared silent.
pub const MAX_ATTEMPTS_PER_ROUND: u32 = 20;

/// Transmissions of the final acknowledgement before giving up on silence.
pub const QUIET_ATTEMPTS: u32 = 10;

/// Reply window after each final acknowledgement transmission.
pub const QUIET_TIMEOUT_MS: u64 = 500;

/// Reply window used while the pod has not answered with a wrong frame type.
pub const REPLY_TIMEOUT_MS: RangeInclusive<u64> = 1000..=1300;

/// Reply window for the attempt following the first wrong-typed reply.
pub const FIRST_ESCALATED_TIMEOUT_MS: RangeInclusive<u64> = 4700..=5300;

/// Reply window for attempts following any later wrong-typed reply.
pub const REPEAT_ESCALATED_TIMEOUT_MS: RangeInclusive<u64> = 9700..=10300;

/// Receive timeout of the background monitor loop.
pub const MONITOR_POLL_TIMEOUT_MS: u64 = 1500;

/// Capacity of the monitor loop's capture queue.
pub const RX_QUEUE_CAPACITY: usize = 4096;

/// Default on-air frame length handed to the line codec.
pub const DEFAULT_FRAME_LENGTH: usize = 512;

/// Default cap on follow-up messages a response handler may chain.
pub const DEFAULT_MAX_CHAINED_EXCHANGES: usize = 8;
