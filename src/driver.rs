//! Request/response engine for the pod radio link.
//!
//! This module provides [`RadioEngine`], which owns the transceiver, the line
//! codec and both sequence counters, and turns a lossy half-duplex channel into
//! sequenced, acknowledged exchanges.
//!
//! ## Exchanges
//!
//! [`RadioEngine::send_request_to_pod`] drives one conversation:
//!
//! 1. the request's frames go out one by one; all but the last expect an ACK,
//!    the last expects the start of the pod's response (POD)
//! 2. while the response needs more frames, an ACK pulls the next CON frame
//! 3. an optional response handler may chain a follow-up request
//! 4. a final ACK is repeated until the pod goes quiet, and the message
//!    sequence moves past the response's
//!
//! Every frame goes through a single-frame exchange: up to
//! [`MAX_EXCHANGE_ROUNDS`] rounds of up to [`MAX_ATTEMPTS_PER_ROUND`]
//! transmissions. A round ends early when the pod answers with the wrong frame
//! type, and the next round waits much longer (see [`crate::timer`]).
//!
//! ## Background modes
//!
//! [`RadioEngine::start`] spawns one background thread. In
//! [`RadioMode::Monitor`] it runs the receive loop from [`crate::monitor`],
//! dispatching decoded traffic to observers. [`RadioMode::Driver`] is reserved
//! for an active loop and idles until stopped. Exchanges need driver mode: the
//! monitor loop holds the receiver for most of its life and would swallow the
//! pod's replies. Only one exchange may run at a time; the counters are only
//! ever touched from the exchange path.
//!
//! ## Example
//!
//! ```
//! use podlink::driver::{EngineConfig, RadioEngine, RadioMode};
//! use podlink::error::RadioError;
//! use podlink::message::{Message, MessageType};
//! use podlink::observer::LogObserver;
//! # use std::time::Duration;
//! # use podlink::transceiver::{RadioConfig, RawCapture, Transceiver, TransceiverError};
//! # struct OutOfRange;
//! # impl Transceiver for OutOfRange {
//! #     fn configure(&mut self, _: &RadioConfig) -> Result<(), TransceiverError> { Ok(()) }
//! #     fn transmit(&mut self, _: &[u8]) -> Result<(), TransceiverError> { Ok(()) }
//! #     fn receive(&mut self, _: Duration) -> Result<Option<RawCapture>, TransceiverError> {
//! #         Ok(None)
//! #     }
//! # }
//! # fn main() -> Result<(), RadioError> {
//! # let transceiver = OutOfRange;
//!
//! let mut engine = RadioEngine::new(transceiver, EngineConfig::default());
//! engine.start(LogObserver, LogObserver, RadioMode::Driver, Some(0x1f01482a), 512)?;
//!
//! let status = Message::new(MessageType::Pdm, 0x1f01482a, vec![0x0e, 0x01, 0x00])?;
//! match engine.send_request_to_pod(status) {
//!     Ok(response) => println!("pod answered: {response}"),
//!     Err(RadioError::Communication { attempts, .. }) => {
//!         println!("no answer after {attempts} attempts, pod out of range?")
//!     }
//!     Err(err) => return Err(err),
//! }
//! engine.stop()?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::consts::{
    DEFAULT_MAX_CHAINED_EXCHANGES, MAX_ATTEMPTS_PER_ROUND, MAX_EXCHANGE_ROUNDS,
    MESSAGE_SEQUENCE_MODULUS, MONITOR_POLL_TIMEOUT_MS, PACKET_SEQUENCE_MODULUS, QUIET_ATTEMPTS,
};
use crate::encoding::ManchesterCodec;
use crate::error::{ProtocolFault, RadioError};
use crate::message::{Message, MessageState};
use crate::monitor::{Monitor, StopSignal};
use crate::observer::{FrameObserver, MessageObserver};
use crate::packet::{Frame, PacketType, decode_capture, encode_frame};
use crate::timer::ReplyTimer;
use crate::transceiver::{RadioConfig, Transceiver, receive_or_nothing, transmit_or_log};

/// Background behaviour selected at [`RadioEngine::start`].
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum RadioMode {
    ///   Passive receive loop dispatching every valid, non-duplicate frame
    ///   (and every reassembled message) to the observers.
    #[default]
    Monitor,
    ///   Reserved for an active command loop. Currently idles until stopped;
    ///   exchanges are driven from the caller's thread.
    Driver,
}

/// Runtime settings for a [`RadioEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Hardware parameters applied at start.
    pub radio: RadioConfig,
    /// Packet sequence to resume from.
    pub initial_packet_sequence: u8,
    /// Message sequence to resume from.
    pub initial_message_sequence: u8,
    /// Follow-up requests a response handler may chain before the exchange
    /// is abandoned.
    pub max_chained_exchanges: usize,
    /// Receive timeout of the monitor loop.
    pub monitor_poll_timeout: Duration,
    /// Seed for noise lines and timeout jitter. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            radio: RadioConfig::default(),
            initial_packet_sequence: 0,
            initial_message_sequence: 0,
            max_chained_exchanges: DEFAULT_MAX_CHAINED_EXCHANGES,
            monitor_poll_timeout: Duration::from_millis(MONITOR_POLL_TIMEOUT_MS),
            seed: None,
        }
    }
}

#[derive(Debug)]
struct Session {
    mode: RadioMode,
    address: Option<u32>,
    frame_length: usize,
    stop: Sender<()>,
    worker: JoinHandle<()>,
}

/// The radio protocol engine.
///
/// ## Type Parameters
///
/// - `T`: the [`Transceiver`] doing raw radio I/O
///
/// ## Notes
///
/// - Only one exchange may be in flight per engine; exchanges take `&mut self`.
/// - Dropping a running engine stops it.
#[derive(Debug)]
pub struct RadioEngine<T>
where
    T: Transceiver + 'static,
{
    transceiver: Arc<Mutex<T>>,
    codec: ManchesterCodec,
    timer: ReplyTimer,
    config: EngineConfig,
    packet_sequence: u8,
    message_sequence: u8,
    session: Option<Session>,
}

impl<T> RadioEngine<T>
where
    T: Transceiver + 'static,
{
    /// Creates an engine around `transceiver`. Nothing touches the radio until
    /// [`start`](Self::start).
    pub fn new(transceiver: T, config: EngineConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let codec = ManchesterCodec::new(&mut rng);
        let timer = ReplyTimer::new(StdRng::seed_from_u64(rng.r#gen()));
        Self {
            transceiver: Arc::new(Mutex::new(transceiver)),
            codec,
            timer,
            packet_sequence: config.initial_packet_sequence % PACKET_SEQUENCE_MODULUS,
            message_sequence: config.initial_message_sequence % MESSAGE_SEQUENCE_MODULUS,
            config,
            session: None,
        }
    }

    /// Configures the transceiver and launches the background thread for `mode`.
    ///
    /// # Arguments
    /// - `on_frame`: receives decoded frames in [`RadioMode::Monitor`]
    /// - `on_message`: receives reassembled messages in [`RadioMode::Monitor`]
    /// - `mode`: background behaviour
    /// - `address`: pod address this session talks to, if known
    /// - `frame_length`: on-air frame length passed to the line codec
    pub fn start<F, M>(
        &mut self,
        on_frame: F,
        on_message: M,
        mode: RadioMode,
        address: Option<u32>,
        frame_length: usize,
    ) -> Result<(), RadioError>
    where
        F: FrameObserver + 'static,
        M: MessageObserver + 'static,
    {
        if self.session.is_some() {
            return Err(RadioError::AlreadyStarted);
        }
        log::debug!("starting radio in {mode:?} mode");
        self.radio().configure(&self.config.radio)?;

        let (stop, stop_rx) = channel::bounded(1);
        let mut stop_rx = StopSignal::new(stop_rx);
        let spawned = match mode {
            RadioMode::Monitor => {
                let monitor = Monitor::new(
                    Arc::clone(&self.transceiver),
                    self.codec.clone(),
                    on_frame,
                    on_message,
                    self.config.monitor_poll_timeout,
                    stop_rx,
                );
                thread::Builder::new()
                    .name("radio-monitor".into())
                    .spawn(move || monitor.run())
            }
            RadioMode::Driver => thread::Builder::new()
                .name("radio-driver".into())
                .spawn(move || stop_rx.wait()),
        };
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                self.radio().release();
                return Err(RadioError::Spawn(err));
            }
        };
        self.session = Some(Session {
            mode,
            address,
            frame_length,
            stop,
            worker,
        });
        Ok(())
    }

    /// Signals the background thread, waits for it to exit and releases the
    /// transceiver.
    pub fn stop(&mut self) -> Result<(), RadioError> {
        let session = self.session.take().ok_or(RadioError::NotStarted)?;
        log::debug!("stopping radio in {:?} mode", session.mode);
        // The loop may already have exited on its own.
        let _ = session.stop.send(());
        let joined = session.worker.join();
        self.radio().release();
        joined.map_err(|_| RadioError::MonitorPanicked)
    }

    /// Whether the engine has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Background mode of the running session.
    pub fn mode(&self) -> Option<RadioMode> {
        self.session.as_ref().map(|s| s.mode)
    }

    /// Pod address the running session was started with.
    pub fn device_address(&self) -> Option<u32> {
        self.session.as_ref().and_then(|s| s.address)
    }

    /// Sequence the next transmitted frame will carry.
    pub fn packet_sequence(&self) -> u8 {
        self.packet_sequence
    }

    /// Sequence the next request message will carry.
    pub fn message_sequence(&self) -> u8 {
        self.message_sequence
    }

    /// Sends `message` and returns the pod's response.
    ///
    /// # Errors
    /// - [`RadioError::Communication`] if the pod stays silent through a round
    /// - [`RadioError::Protocol`] if the replies can't complete the exchange
    /// - [`RadioError::NotStarted`] before [`start`](Self::start)
    /// - [`RadioError::MonitorActive`] unless started in [`RadioMode::Driver`]
    pub fn send_request_to_pod(&mut self, message: Message) -> Result<Message, RadioError> {
        self.send_request_to_pod_with(message, |_: &Message, _: &Message| None)
    }

    /// Sends `message`, letting `handler` chain follow-up requests.
    ///
    /// After each complete response `handler(request, response)` is called.
    /// Returning `Some(next)` sends `next` as a new request without closing the
    /// exchange; returning `None` makes the last response final. At most
    /// [`EngineConfig::max_chained_exchanges`] follow-ups are sent.
    pub fn send_request_to_pod_with<H>(
        &mut self,
        message: Message,
        mut handler: H,
    ) -> Result<Message, RadioError>
    where
        H: FnMut(&Message, &Message) -> Option<Message>,
    {
        let frame_length = self.frame_length()?;
        let mut message = message;
        let mut chained = 0;
        loop {
            message.set_sequence(self.message_sequence);
            log::debug!("sending request: {message}");
            let response = self.exchange_message(&message, frame_length)?;
            log::debug!("received response: {response}");

            let Some(next) = handler(&message, &response) else {
                self.send_frame_until_quiet(Frame::ack(message.address(), true), frame_length);
                self.message_sequence = (response.sequence() + 1) % MESSAGE_SEQUENCE_MODULUS;
                return Ok(response);
            };
            chained += 1;
            if chained > self.config.max_chained_exchanges {
                return Err(ProtocolFault::ChainLimit(self.config.max_chained_exchanges).into());
            }
            message = next;
        }
    }

    fn exchange_message(
        &mut self,
        message: &Message,
        frame_length: usize,
    ) -> Result<Message, RadioError> {
        let frames = message.frames();
        let last = frames.len().saturating_sub(1);
        let mut received = None;
        for (i, frame) in frames.into_iter().enumerate() {
            let expected = if i == last {
                PacketType::Pod
            } else {
                PacketType::Ack
            };
            received = Some(self.send_frame_and_get_response(frame, expected, frame_length)?);
        }

        let mut response = received
            .as_ref()
            .and_then(Message::from_frame)
            .ok_or(ProtocolFault::Unassembled)?;
        while response.state() == MessageState::NeedsContinuation {
            let ack = Frame::ack(message.address(), false);
            let con = self.send_frame_and_get_response(ack, PacketType::Con, frame_length)?;
            response.add_continuation_frame(&con);
        }
        if response.state() == MessageState::Invalid {
            return Err(ProtocolFault::InvalidMessage.into());
        }
        Ok(response)
    }

    /// Sends `frame` until a reply of type `expected` from the same address
    /// arrives.
    ///
    /// Each round stamps the current packet sequence and transmits up to
    /// [`MAX_ATTEMPTS_PER_ROUND`] times. A correctly addressed reply of the
    /// wrong type ends the round and escalates the next attempt's timeout;
    /// from the second such reply on, the packet sequence is also rewound by
    /// one so the retry reuses the previous number.
    fn send_frame_and_get_response(
        &mut self,
        mut frame: Frame,
        expected: PacketType,
        frame_length: usize,
    ) -> Result<Frame, RadioError> {
        let mut escalated: Option<Duration> = None;
        let mut rounds = 0;
        while rounds < MAX_EXCHANGE_ROUNDS {
            frame.set_sequence(self.packet_sequence);
            log::debug!("sending frame: {frame}");
            let wire = encode_frame(&mut self.codec, &frame, frame_length);

            let mut mismatched = false;
            for _ in 0..MAX_ATTEMPTS_PER_ROUND {
                self.transmit(&wire);
                let timeout = escalated.take().unwrap_or_else(|| self.timer.reply());
                let Some(reply) = self.receive_frame(timeout) else {
                    continue;
                };
                if reply.address() != frame.address() {
                    log::trace!("ignoring frame for another address: {reply}");
                    continue;
                }
                log::debug!("received frame: {reply}");
                if reply.packet_type() == expected {
                    self.packet_sequence = (reply.sequence() + 1) % PACKET_SEQUENCE_MODULUS;
                    return Ok(reply);
                }

                rounds += 1;
                escalated = Some(self.timer.escalated(rounds));
                if rounds > 1 {
                    self.packet_sequence =
                        (self.packet_sequence + PACKET_SEQUENCE_MODULUS - 1) % PACKET_SEQUENCE_MODULUS;
                }
                mismatched = true;
                break;
            }
            if !mismatched {
                return Err(RadioError::Communication {
                    expected,
                    attempts: MAX_ATTEMPTS_PER_ROUND,
                });
            }
        }
        Err(ProtocolFault::RoundsExhausted { expected, rounds }.into())
    }

    /// Repeats `frame` until the pod stops answering, up to [`QUIET_ATTEMPTS`]
    /// times. Never fails.
    ///
    /// The packet sequence only advances when silence was observed; a pod that
    /// answers every attempt leaves it unchanged.
    fn send_frame_until_quiet(&mut self, mut frame: Frame, frame_length: usize) {
        frame.set_sequence(self.packet_sequence);
        log::debug!("sending until quiet: {frame}");
        let wire = encode_frame(&mut self.codec, &frame, frame_length);
        for _ in 0..QUIET_ATTEMPTS {
            self.transmit(&wire);
            let timeout = self.timer.quiet();
            if receive_or_nothing(&mut *self.radio(), timeout).is_none() {
                self.packet_sequence = (self.packet_sequence + 1) % PACKET_SEQUENCE_MODULUS;
                return;
            }
        }
        log::debug!("pod kept answering the final ack");
    }

    fn transmit(&self, wire: &[u8]) {
        transmit_or_log(&mut *self.radio(), wire);
    }

    fn receive_frame(&self, timeout: Duration) -> Option<Frame> {
        let capture = receive_or_nothing(&mut *self.radio(), timeout)?;
        decode_capture(&self.codec, &capture)
    }

    fn frame_length(&self) -> Result<usize, RadioError> {
        match &self.session {
            None => Err(RadioError::NotStarted),
            Some(session) if session.mode == RadioMode::Monitor => {
                Err(RadioError::MonitorActive)
            }
            Some(session) => Ok(session.frame_length),
        }
    }

    fn radio(&self) -> MutexGuard<'_, T> {
        self.transceiver.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for RadioEngine<T>
where
    T: Transceiver + 'static,
{
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(err) = self.stop() {
                log::warn!("failed to stop radio on drop: {err}");
            }
        }
    }
}
