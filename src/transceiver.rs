//! Raw radio I/O and the hardware settings it runs with.
//!
//! The engine talks to hardware only through [`Transceiver`]: configure once at
//! start, transmit finished on-air buffers, receive buffers with a timeout, and
//! release on stop. What the transceiver hands back from [`Transceiver::receive`]
//! is whatever the radio captured after matching its sync word, so the buffer
//! starts at the Manchester-encoded payload.
//!
//! Transceiver faults are never fatal to an exchange: a failed receive reads as
//! "nothing arrived", a failed transmit as a transmission the pod didn't hear.

use std::time::{Duration, SystemTime};

/// A buffer received from the air and when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCapture {
    /// Raw line-encoded bytes following the sync word.
    pub data: Vec<u8>,
    /// Receive time reported by the transceiver.
    pub timestamp: SystemTime,
}

/// Errors reported by a transceiver.
#[derive(Debug, thiserror::Error)]
pub enum TransceiverError {
    /// The device did not complete the request in time.
    #[error("transceiver timed out")]
    Timeout,

    /// Any other device failure.
    #[error("device error: {0}")]
    Device(String),
}

/// Modulation schemes the pod radio may be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modulation {
    /// 2-level frequency shift keying, what the pod speaks.
    #[default]
    Fsk2,
    /// Gaussian FSK.
    Gfsk,
    /// On-off keying.
    Ook,
}

/// How the radio qualifies a sync word match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// No sync word, capture everything.
    None,
    /// 16 of 16 sync bits must match.
    Bits16of16,
    /// 16 of 16 sync bits plus carrier sense.
    #[default]
    Carrier16of16,
}

/// Fixed radio parameters handed to [`Transceiver::configure`].
///
/// These are deployment settings, not protocol: the defaults match the
/// reference setup, and the sync word / preamble count are chosen so the radio
/// never mistakes the Manchester-encoded preamble for its own sync pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    /// Carrier frequency in Hz.
    pub frequency_hz: u32,
    /// Modulation scheme.
    pub modulation: Modulation,
    /// FSK deviation in Hz.
    pub deviation_hz: u32,
    /// Data rate in baud.
    pub data_rate_baud: u32,
    /// Sync word the radio strips received frames at.
    pub sync_word: u16,
    /// Sync qualification mode.
    pub sync_mode: SyncMode,
    /// Hardware preamble bytes sent before the sync word.
    pub preamble_bytes: u8,
    /// Preamble quality threshold.
    pub preamble_quality_threshold: u8,
    /// Whether the radio applies its own Manchester coding. Always off; the
    /// codec here does it.
    pub hardware_manchester: bool,
    /// Fixed packet length the radio receives, in bytes.
    pub packet_length: u8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 433_910_000,
            modulation: Modulation::Fsk2,
            deviation_hz: 26_370,
            data_rate_baud: 40_625,
            sync_word: 0xa55a,
            sync_mode: SyncMode::Carrier16of16,
            preamble_bytes: 2,
            preamble_quality_threshold: 1,
            hardware_manchester: false,
            packet_length: 80,
        }
    }
}

/// Raw radio access used by the engine.
pub trait Transceiver: Send {
    /// Applies `config`. Called once per engine start.
    fn configure(&mut self, config: &RadioConfig) -> Result<(), TransceiverError>;

    /// Sends an on-air buffer.
    fn transmit(&mut self, data: &[u8]) -> Result<(), TransceiverError>;

    /// Waits up to `timeout` for a buffer. `Ok(None)` means nothing arrived.
    fn receive(&mut self, timeout: Duration) -> Result<Option<RawCapture>, TransceiverError>;

    /// Releases the hardware. Called once per engine stop.
    fn release(&mut self) {}
}

/// Receives from `radio`, folding any transceiver error into "nothing arrived".
pub(crate) fn receive_or_nothing<T: Transceiver>(
    radio: &mut T,
    timeout: Duration,
) -> Option<RawCapture> {
    match radio.receive(timeout) {
        Ok(capture) => capture,
        Err(err) => {
            log::debug!("receive failed, treating as silence: {err}");
            None
        }
    }
}

/// Transmits on `radio`, logging and discarding any transceiver error.
pub(crate) fn transmit_or_log<T: Transceiver>(radio: &mut T, data: &[u8]) {
    if let Err(err) = radio.transmit(data) {
        log::warn!("transmit failed: {err}");
    }
}
