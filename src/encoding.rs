//! Manchester line coding and on-air frame assembly.
//!
//! Every logical byte is sent as a 2-byte Manchester symbol: each bit, least
//! significant first, becomes two line bits, `10` for a zero and `01` for a one.
//! The first input bit lands in the lowest two bits of the 16-bit symbol, which
//! is then sent high byte first.
//!
//! A transmission is assembled as
//!
//! ```text
//! [ preamble (0x66 0x65 x 200, 0xa5 0x5a) ][ encoded payload ][ noise line ]
//! ```
//!
//! and then trimmed to a window around the payload, see [`ManchesterCodec::encode`].
//!
//! ## Noise
//!
//! The tail is padded with one of [`NOISE_LINE_COUNT`] pseudo-random lines,
//! rotated round-robin per transmission. Noise lines start with an `0xf` nibble
//! and only use nibbles that can't appear in a Manchester symbol, so
//! [`ManchesterCodec::decode`] stops exactly where the payload ends.
//!
//! ## Limitations
//!
//! - Decoding is best-effort: it returns the longest valid prefix and never errors
//! - Input must be aligned on a symbol boundary; the radio's sync word does that

use std::collections::HashMap;

use rand::Rng;

use crate::consts::{
    MIN_NOISE_BYTES, MIN_PREAMBLE_BYTES, NOISE_LEAD_NIBBLE, NOISE_LINE_COUNT, NOISE_LINE_LEN,
    NOISE_NIBBLES, PREAMBLE_LEN, PREAMBLE_REPEAT, PREAMBLE_SYNC, PREAMBLE_TONE,
};

/// Encodes a single byte into its 2-byte Manchester symbol.
pub const fn encode_manchester(byte: u8) -> [u8; 2] {
    let mut d = byte;
    let mut e: u16 = 0;
    let mut shift = 0;
    while shift < 16 {
        if d & 0x01 == 0 {
            e |= 2 << shift;
        } else {
            e |= 1 << shift;
        }
        d >>= 1;
        shift += 2;
    }
    e.to_be_bytes()
}

/// Builds the fixed transmit preamble.
pub fn preamble() -> Vec<u8> {
    let mut preamble = Vec::with_capacity(PREAMBLE_LEN);
    for _ in 0..PREAMBLE_REPEAT {
        preamble.extend_from_slice(&PREAMBLE_TONE);
    }
    preamble.extend_from_slice(&PREAMBLE_SYNC);
    preamble
}

/// Manchester encoder/decoder owning the symbol tables and noise rotation.
///
/// Tables are built once per instance. The only state that changes over the
/// codec's life is the noise index, advanced by every [`encode`](Self::encode).
#[derive(Debug, Clone)]
pub struct ManchesterCodec {
    encode_table: [[u8; 2]; 256],
    decode_table: HashMap<[u8; 2], u8>,
    preamble: Vec<u8>,
    noise_lines: Vec<[u8; NOISE_LINE_LEN]>,
    noise_index: usize,
}

impl ManchesterCodec {
    /// Creates a codec whose noise lines are drawn from `rng`.
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        let mut encode_table = [[0u8; 2]; 256];
        let mut decode_table = HashMap::with_capacity(256);
        for byte in 0..=u8::MAX {
            let symbol = encode_manchester(byte);
            encode_table[byte as usize] = symbol;
            let _ = decode_table.insert(symbol, byte);
        }
        let noise_lines = (0..NOISE_LINE_COUNT)
            .map(|_| Self::noise_line_from(&mut *rng))
            .collect();
        Self {
            encode_table,
            decode_table,
            preamble: preamble(),
            noise_lines,
            noise_index: 0,
        }
    }

    fn noise_line_from<R: Rng>(rng: &mut R) -> [u8; NOISE_LINE_LEN] {
        let mut line = [0u8; NOISE_LINE_LEN];
        let mut nibble = || NOISE_NIBBLES[rng.gen_range(0..NOISE_NIBBLES.len())];
        for (i, byte) in line.iter_mut().enumerate() {
            let hi = if i == 0 { NOISE_LEAD_NIBBLE } else { nibble() };
            *byte = (hi << 4) | nibble();
        }
        line
    }

    /// Returns the symbol for `byte`.
    pub fn encode_byte(&self, byte: u8) -> [u8; 2] {
        self.encode_table[byte as usize]
    }

    /// Returns the byte for `symbol`, or `None` if it isn't a Manchester symbol.
    pub fn decode_symbol(&self, symbol: [u8; 2]) -> Option<u8> {
        self.decode_table.get(&symbol).copied()
    }

    /// Line-encodes `data` without any framing.
    pub fn encode_symbols(&self, data: &[u8]) -> Vec<u8> {
        data.iter().flat_map(|&b| self.encode_byte(b)).collect()
    }

    /// Index of the noise line the next [`encode`](Self::encode) will use.
    pub fn noise_index(&self) -> usize {
        self.noise_index
    }

    /// Returns noise line `index`, wrapping past [`NOISE_LINE_COUNT`].
    pub fn noise_line(&self, index: usize) -> &[u8] {
        &self.noise_lines[index % NOISE_LINE_COUNT]
    }

    /// Builds the on-air buffer for `payload`, trimmed for a `frame_length` frame.
    ///
    /// The full buffer is `preamble + symbols(payload) + noise`. Out of it a window
    /// is cut: `available = frame_length - payload.len() - 4 - 2` is split into
    /// `floor(available / 2)` extra preamble bytes and the rest as extra noise
    /// bytes. The window starts `4 + extra_preamble` bytes before the payload and
    /// ends `2 + extra_noise` bytes after the *start* of the payload.
    ///
    /// Note that `available` is measured against the un-encoded payload, and the
    /// window end against the payload start. The pod firmware is built around this
    /// framing, so a short `frame_length` truncates the encoded payload itself and
    /// the window is `frame_length - payload.len()` bytes long whenever it fits
    /// inside the assembled buffer.
    ///
    /// Window bounds follow end-relative slice rules: a negative bound counts
    /// back from the end of the assembled buffer, bounds past either end are
    /// clamped, and an inverted window gives an empty buffer. Once
    /// `frame_length` exceeds the payload length by twice the preamble, the start
    /// goes negative and the window shrinks to the buffer's tail; the pod's
    /// frame sizes never get there.
    ///
    /// Advances the noise rotation by one.
    pub fn encode(&mut self, payload: &[u8], frame_length: usize) -> Vec<u8> {
        let mut full = Vec::with_capacity(PREAMBLE_LEN + payload.len() * 2 + NOISE_LINE_LEN);
        full.extend_from_slice(&self.preamble);
        for &b in payload {
            full.extend_from_slice(&self.encode_byte(b));
        }
        full.extend_from_slice(&self.noise_lines[self.noise_index]);
        self.noise_index = (self.noise_index + 1) % NOISE_LINE_COUNT;

        let available = frame_length as i64
            - payload.len() as i64
            - MIN_PREAMBLE_BYTES as i64
            - MIN_NOISE_BYTES as i64;
        let extra_preamble = available.div_euclid(2);
        let preamble_included = MIN_PREAMBLE_BYTES as i64 + extra_preamble;
        let noise_included = MIN_NOISE_BYTES as i64 + available - extra_preamble;

        let data_index = self.preamble.len() as i64;
        let len = full.len() as i64;
        let start = slice_bound(data_index - preamble_included, len);
        let end = slice_bound(data_index + noise_included, len);
        if start >= end {
            return Vec::new();
        }
        full[start..end].to_vec()
    }

    /// Decodes `data` two bytes at a time, stopping at the first invalid symbol.
    ///
    /// Returns everything decoded up to that point, which is empty if the very
    /// first symbol is invalid. A trailing odd byte is ignored.
    pub fn decode(&self, data: &[u8]) -> Vec<u8> {
        let mut decoded = Vec::with_capacity(data.len() / 2);
        for pair in data.chunks_exact(2) {
            match self.decode_symbol([pair[0], pair[1]]) {
                Some(byte) => decoded.push(byte),
                None => break,
            }
        }
        decoded
    }
}

/// Resolves a possibly negative window bound against a buffer of `len` bytes.
fn slice_bound(index: i64, len: i64) -> usize {
    let resolved = if index < 0 { len + index } else { index };
    resolved.clamp(0, len) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn codec() -> ManchesterCodec {
        ManchesterCodec::new(&mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_known_symbols() {
        assert_eq!(encode_manchester(0x00), [0xaa, 0xaa]);
        assert_eq!(encode_manchester(0xff), [0x55, 0x55]);
        // LSB first: bit 0 set lands in the lowest pair
        assert_eq!(encode_manchester(0x01), [0xaa, 0xa9]);
        assert_eq!(encode_manchester(0x80), [0x6a, 0xaa]);
    }

    #[test]
    fn test_symbol_table_is_a_bijection() {
        let codec = codec();
        let mut seen = HashSet::new();
        for byte in 0..=u8::MAX {
            let symbol = codec.encode_byte(byte);
            assert!(seen.insert(symbol), "duplicate symbol for {byte:#04x}");
            assert_eq!(codec.decode_symbol(symbol), Some(byte));
            assert_eq!(codec.decode(&symbol), vec![byte]);
        }
    }

    #[test]
    fn test_preamble_layout() {
        let preamble = preamble();
        assert_eq!(preamble.len(), 402);
        assert_eq!(&preamble[..4], &[0x66, 0x65, 0x66, 0x65]);
        assert_eq!(&preamble[398..], &[0x66, 0x65, 0xa5, 0x5a]);
    }

    #[test]
    fn test_noise_lines_never_decode() {
        let codec = codec();
        for i in 0..NOISE_LINE_COUNT {
            let line = codec.noise_line(i);
            assert_eq!(line.len(), NOISE_LINE_LEN);
            assert_eq!(line[0] >> 4, 0xf);
            assert!(codec.decode(line).is_empty());
            for byte in line {
                assert!(NOISE_NIBBLES.contains(&(byte >> 4)));
                assert!(NOISE_NIBBLES.contains(&(byte & 0xf)));
            }
        }
    }

    #[test]
    fn test_decode_stops_at_first_invalid_symbol() {
        let codec = codec();
        let mut data = codec.encode_symbols(&[0x1f, 0x07, 0xe3]);
        data.extend_from_slice(&[0xff, 0x00]);
        data.extend_from_slice(&codec.encode_symbols(&[0x42]));
        assert_eq!(codec.decode(&data), vec![0x1f, 0x07, 0xe3]);
    }

    #[test]
    fn test_decode_invalid_first_symbol_is_empty() {
        let codec = codec();
        assert!(codec.decode(&[0x00, 0x00, 0xaa, 0xaa]).is_empty());
        assert!(codec.decode(&[]).is_empty());
        assert!(codec.decode(&[0xaa]).is_empty());
    }

    #[test]
    fn test_encode_window_layout() {
        let mut codec = codec();
        let payload = [0x1f, 0x01, 0x48, 0x2a, 0xad, 0x1f, 0x01, 0x48, 0x2a, 0xad, 0x10];
        let noise = codec.noise_line(0).to_vec();
        let wire = codec.encode(&payload, 80);

        // available = 80 - 11 - 6 = 63 -> 35 preamble bytes, 34 bytes from payload start
        assert_eq!(wire.len(), 80 - payload.len());
        assert_eq!(&wire[31..35], &[0x66, 0x65, 0xa5, 0x5a]);
        assert_eq!(&wire[35..57], codec.encode_symbols(&payload).as_slice());
        assert_eq!(&wire[57..], &noise[..12]);
        assert_eq!(codec.decode(&wire[35..]), payload.to_vec());
    }

    #[test]
    fn test_encode_short_frame_truncates_payload() {
        let mut codec = codec();
        let payload = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80, 0x90, 0xa0];
        // available = 20 - 10 - 6 = 4 -> 6 preamble bytes, 4 bytes from payload start
        let wire = codec.encode(&payload, 20);
        assert_eq!(wire.len(), 10);
        assert_eq!(&wire[..6], &[0x66, 0x65, 0x66, 0x65, 0xa5, 0x5a]);
        assert_eq!(codec.decode(&wire[6..]), vec![0x10, 0x20]);
    }

    #[test]
    fn test_encode_odd_available_favours_noise() {
        let mut codec = codec();
        // available = 13 - 2 - 6 = 5 -> 2 extra preamble, 3 extra noise
        let wire = codec.encode(&[0xab, 0xcd], 13);
        assert_eq!(wire.len(), 11);
        assert_eq!(&wire[4..6], &PREAMBLE_SYNC);
        assert_eq!(&wire[6..10], codec.encode_symbols(&[0xab, 0xcd]).as_slice());
    }

    #[test]
    fn test_encode_lengths_across_frame_sizes() {
        let mut codec = codec();
        for payload_len in [1usize, 6, 17, 31] {
            let payload = vec![0x5a; payload_len];
            for frame_length in (payload_len + 6)..(payload_len + 6 + 160) {
                let wire = codec.encode(&payload, frame_length);
                assert_eq!(wire.len(), frame_length - payload_len);
            }
        }
    }

    #[test]
    fn test_encode_clamps_to_assembled_buffer() {
        let mut codec = codec();
        let wire = codec.encode(&[0x01, 0x02], 512);
        // 256 preamble bytes, then all symbols and the whole noise line
        assert_eq!(wire.len(), 256 + 4 + NOISE_LINE_LEN);
        assert!(codec.encode(&[0x01; 10], 6).is_empty());
    }

    #[test]
    fn test_encode_oversized_frame_counts_start_from_the_end() {
        let mut codec = codec();
        let wire = codec.encode(&[0x01], 1024);
        // start lands 110 bytes before the end of the 484-byte buffer
        assert_eq!(wire.len(), 110);
        assert_eq!(&wire[28..30], &encode_manchester(0x01));
        assert_eq!(&wire[30..], codec.noise_line(0));
        assert!(wire[..26].chunks(2).all(|pair| pair == PREAMBLE_TONE));
        assert_eq!(&wire[26..28], &PREAMBLE_SYNC);
    }

    #[test]
    fn test_noise_rotation_is_round_robin() {
        let mut codec = codec();
        let payload = [0x33];
        for round in 0..2 {
            for i in 0..NOISE_LINE_COUNT {
                assert_eq!(codec.noise_index(), i, "round {round}");
                let wire = codec.encode(&payload, 1024);
                let tail = &wire[wire.len() - NOISE_LINE_LEN..];
                assert_eq!(tail, codec.noise_line(i));
            }
        }
        assert_eq!(codec.noise_index(), 0);
    }
}
