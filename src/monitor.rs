//! Background receive loop for monitor mode.
//!
//! The loop alternates between two phases until it is told to stop:
//!
//! 1. **Fill**: receive from the transceiver with a bounded timeout and push
//!    every capture onto a bounded queue, until a receive comes back empty.
//!    Nothing but the queue push happens here, so radio reception never waits
//!    on observers.
//! 2. **Drain**: pop every queued capture, decode and checksum it into a
//!    [`Frame`], drop it if it repeats the previously dispatched sequence
//!    number, and otherwise hand it to the [`FrameObserver`]. PDM/POD frames
//!    and the CON frames that follow are reassembled into [`Message`]s for the
//!    [`MessageObserver`].
//!
//! Undecodable captures are dropped. A full queue is fatal to the loop: it is
//! logged at error level and the loop exits, leaving the engine to be stopped.
//! Stop requests arrive on a channel and are checked before every receive.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam::channel::{Receiver, TryRecvError};
use heapless::Deque;

use crate::consts::RX_QUEUE_CAPACITY;
use crate::encoding::ManchesterCodec;
use crate::error::RadioError;
use crate::message::{Message, MessageState};
use crate::observer::{FrameObserver, MessageObserver};
use crate::packet::{Frame, PacketType, decode_capture};
use crate::transceiver::{RawCapture, Transceiver, receive_or_nothing};

type CaptureQueue = Deque<RawCapture, RX_QUEUE_CAPACITY>;

/// Cancellation signal for a background loop.
pub(crate) struct StopSignal {
    receiver: Receiver<()>,
    stopped: bool,
}

impl StopSignal {
    pub(crate) fn new(receiver: Receiver<()>) -> Self {
        Self {
            receiver,
            stopped: false,
        }
    }

    /// True once a stop was requested or the engine side hung up.
    pub(crate) fn is_set(&mut self) -> bool {
        if !self.stopped {
            self.stopped = match self.receiver.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => true,
                Err(TryRecvError::Empty) => false,
            };
        }
        self.stopped
    }

    /// Blocks until a stop is requested.
    pub(crate) fn wait(&mut self) {
        if !self.stopped {
            let _ = self.receiver.recv();
            self.stopped = true;
        }
    }
}

pub(crate) struct Monitor<T, F, M> {
    transceiver: Arc<Mutex<T>>,
    codec: ManchesterCodec,
    queue: Box<CaptureQueue>,
    last_frame: Option<Frame>,
    assembling: Option<Message>,
    on_frame: F,
    on_message: M,
    poll_timeout: Duration,
    stop: StopSignal,
}

impl<T, F, M> Monitor<T, F, M>
where
    T: Transceiver,
    F: FrameObserver,
    M: MessageObserver,
{
    pub(crate) fn new(
        transceiver: Arc<Mutex<T>>,
        codec: ManchesterCodec,
        on_frame: F,
        on_message: M,
        poll_timeout: Duration,
        stop: StopSignal,
    ) -> Self {
        Self {
            transceiver,
            codec,
            queue: Box::new(Deque::new()),
            last_frame: None,
            assembling: None,
            on_frame,
            on_message,
            poll_timeout,
            stop,
        }
    }

    /// Runs until stopped or until the queue overflows.
    pub(crate) fn run(mut self) {
        log::debug!("monitor loop started");
        while !self.stop.is_set() {
            if let Err(err) = self.fill() {
                log::error!("monitor loop terminated: {err}");
                return;
            }
            self.drain();
        }
        log::debug!("monitor loop stopped");
    }

    fn fill(&mut self) -> Result<(), RadioError> {
        while !self.stop.is_set() {
            let capture = {
                let mut radio = self.transceiver.lock().unwrap_or_else(PoisonError::into_inner);
                receive_or_nothing(&mut *radio, self.poll_timeout)
            };
            let Some(capture) = capture else {
                break;
            };
            self.queue
                .push_back(capture)
                .map_err(|_| RadioError::QueueOverflow(RX_QUEUE_CAPACITY))?;
        }
        Ok(())
    }

    fn drain(&mut self) {
        while let Some(capture) = self.queue.pop_front() {
            let Some(frame) = decode_capture(&self.codec, &capture) else {
                continue;
            };
            let duplicate = self
                .last_frame
                .as_ref()
                .is_some_and(|last| last.sequence() == frame.sequence());
            if duplicate {
                log::trace!("dropping repeated frame: {frame}");
                continue;
            }
            self.on_frame.on_frame(&frame);
            self.assemble(&frame);
            self.last_frame = Some(frame);
        }
    }

    fn assemble(&mut self, frame: &Frame) {
        match frame.packet_type() {
            PacketType::Pdm | PacketType::Pod => {
                self.assembling = Message::from_frame(frame);
            }
            PacketType::Con => match self.assembling.as_mut() {
                Some(message) => message.add_continuation_frame(frame),
                None => return,
            },
            PacketType::Ack => return,
        }
        match self.assembling.as_ref().map(Message::state) {
            Some(MessageState::Complete) => {
                if let Some(message) = self.assembling.take() {
                    self.on_message.on_message(&message);
                }
            }
            Some(MessageState::Invalid) => {
                log::trace!("dropping invalid message");
                self.assembling = None;
            }
            Some(MessageState::NeedsContinuation) | None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::transceiver::mock::{MockTransceiver, Reply};
    use crossbeam::channel::{self, Sender};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::thread::{self, JoinHandle};

    const ADDRESS: u32 = 0x1f01482a;

    type Seen<X> = Arc<Mutex<Vec<X>>>;

    struct Running {
        stop: Sender<()>,
        worker: JoinHandle<()>,
        frames: Seen<Frame>,
        messages: Seen<Message>,
    }

    impl Running {
        fn wait_for_frames(&self, count: usize) {
            for _ in 0..1000 {
                if self.frames.lock().unwrap().len() >= count {
                    return;
                }
                thread::sleep(Duration::from_millis(2));
            }
        }

        fn stop(self) -> (Vec<Frame>, Vec<Message>) {
            self.stop.send(()).unwrap();
            self.worker.join().unwrap();
            let frames = self.frames.lock().unwrap().clone();
            let messages = self.messages.lock().unwrap().clone();
            (frames, messages)
        }
    }

    fn spawn(mock: &MockTransceiver) -> Running {
        let (stop, stop_rx) = channel::bounded(1);
        let frames: Seen<Frame> = Arc::default();
        let messages: Seen<Message> = Arc::default();
        let (seen_frames, seen_messages) = (Arc::clone(&frames), Arc::clone(&messages));
        let monitor = Monitor::new(
            Arc::new(Mutex::new(mock.clone())),
            ManchesterCodec::new(&mut StdRng::seed_from_u64(5)),
            move |frame: &Frame| seen_frames.lock().unwrap().push(frame.clone()),
            move |message: &Message| seen_messages.lock().unwrap().push(message.clone()),
            Duration::from_millis(10),
            StopSignal::new(stop_rx),
        );
        let worker = thread::spawn(move || monitor.run());
        Running {
            stop,
            worker,
            frames,
            messages,
        }
    }

    fn quiet_mock() -> MockTransceiver {
        let mock = MockTransceiver::new();
        mock.idle_delay(Duration::from_millis(1));
        mock
    }

    #[test]
    fn test_repeated_sequence_is_dispatched_once() {
        let mock = quiet_mock();
        let frame = Frame::new(ADDRESS, PacketType::Pdm, 4, vec![0x0e; 8]);
        mock.reply_with(frame.clone());
        mock.reply_with(frame.clone());
        mock.reply_with(Frame::new(ADDRESS, PacketType::Pdm, 6, vec![0x0e; 8]));

        let running = spawn(&mock);
        running.wait_for_frames(2);
        let (frames, _) = running.stop();

        let sequences: Vec<u8> = frames.iter().map(Frame::sequence).collect();
        assert_eq!(sequences, vec![4, 6]);
    }

    #[test]
    fn test_undecodable_captures_are_dropped() {
        let mock = quiet_mock();
        mock.push(Reply::Raw(vec![0xff, 0x00, 0x12, 0x34]));
        mock.push(Reply::Fail);
        mock.reply_with(Frame::ack(ADDRESS, true));

        let running = spawn(&mock);
        running.wait_for_frames(1);
        let (frames, messages) = running.stop();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet_type(), PacketType::Ack);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_messages_are_reassembled() {
        let mock = quiet_mock();
        let mut message = Message::new(MessageType::Pod, ADDRESS, (0u8..40).collect()).unwrap();
        message.set_sequence(9);
        for (i, mut frame) in message.frames().into_iter().enumerate() {
            frame.set_sequence(10 + i as u8);
            mock.reply_with(frame);
        }

        let running = spawn(&mock);
        running.wait_for_frames(2);
        let (frames, messages) = running.stop();

        assert_eq!(frames.len(), 2);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sequence(), 9);
        assert_eq!(messages[0].body(), message.body());
    }

    #[test]
    fn test_stray_continuation_is_not_a_message() {
        let mock = quiet_mock();
        let message = Message::new(MessageType::Pod, ADDRESS, (0u8..40).collect()).unwrap();
        let con = message.frames().remove(1);
        mock.reply_with(con);

        let running = spawn(&mock);
        running.wait_for_frames(1);
        let (frames, messages) = running.stop();

        assert_eq!(frames.len(), 1);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_full_queue_ends_the_loop() {
        let mock = MockTransceiver::new();
        mock.endless(Reply::Frame(Frame::ack(ADDRESS, false)));

        let running = spawn(&mock);
        // exits on its own; the stop channel stays open throughout
        running.worker.join().unwrap();

        assert_eq!(mock.receive_count(), RX_QUEUE_CAPACITY + 1);
        assert!(running.frames.lock().unwrap().is_empty());
        drop(running.stop);
    }

    #[test]
    fn test_stop_signal_latches() {
        let (stop, stop_rx) = channel::bounded(1);
        let mut signal = StopSignal::new(stop_rx);
        assert!(!signal.is_set());

        stop.send(()).unwrap();

        assert!(signal.is_set());
        assert!(signal.is_set());
        signal.wait();
    }

    #[test]
    fn test_hung_up_engine_stops_the_loop() {
        let mock = quiet_mock();
        let running = spawn(&mock);

        drop(running.stop);

        running.worker.join().unwrap();
        assert!(running.frames.lock().unwrap().is_empty());
    }
}
