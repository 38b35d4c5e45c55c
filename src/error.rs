//! Errors raised at the radio engine boundary.
//!
//! Two kinds matter to a controller: [`RadioError::Communication`] when the pod
//! stayed silent through a whole retry budget, and [`RadioError::Protocol`] when
//! replies arrived but could not complete the exchange. Channel noise, single
//! undecodable captures and transceiver timeouts never show up here; they are
//! retried or dropped where they happen.

use std::io;

use crate::packet::PacketType;
use crate::transceiver::TransceiverError;

/// Errors that can occur in radio engine operations.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    /// No usable reply arrived within a full round of attempts.
    #[error("no {expected} reply after {attempts} attempts")]
    Communication {
        /// Frame type that was being waited for.
        expected: PacketType,
        /// Transmissions made in the silent round.
        attempts: u32,
    },

    /// Replies arrived but the exchange could not be completed.
    #[error("protocol failure: {0}")]
    Protocol(#[from] ProtocolFault),

    /// Transceiver setup failed.
    #[error("transceiver error: {0}")]
    Transceiver(#[from] TransceiverError),

    /// `start` was called on a running engine.
    #[error("radio is already running")]
    AlreadyStarted,

    /// The engine has to be started before exchanging or stopping.
    #[error("radio has not been started")]
    NotStarted,

    /// Exchanges were attempted while the monitor loop owns the receive path.
    #[error("exchanges need driver mode; the monitor loop would take the replies")]
    MonitorActive,

    /// The background loop thread could not be spawned.
    #[error("failed to spawn background loop: {0}")]
    Spawn(#[source] io::Error),

    /// The background loop panicked before it could be joined.
    #[error("background loop panicked")]
    MonitorPanicked,

    /// A message body does not fit the 10-bit length field.
    #[error("message body of {0} bytes exceeds the 1023 byte limit")]
    MessageTooLong(usize),

    /// The monitor loop's capture queue filled up.
    #[error("receive queue overflowed at {0} captures")]
    QueueOverflow(usize),
}

/// Ways a reply can leave an exchange unsatisfiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolFault {
    /// Every escalation round ended on a reply of the wrong type.
    #[error("no {expected} reply after {rounds} escalation rounds")]
    RoundsExhausted {
        /// Frame type that was being waited for.
        expected: PacketType,
        /// Rounds consumed.
        rounds: u32,
    },

    /// The final reply frame could not start a message.
    #[error("reply frame does not start a message")]
    Unassembled,

    /// The reassembled response failed its structure or checksum check.
    #[error("response message is invalid")]
    InvalidMessage,

    /// The response handler kept chaining follow-up requests.
    #[error("response handler chained more than {0} follow-up requests")]
    ChainLimit(usize),
}
