//! Callbacks for traffic seen by the background loop.
//!
//! Observers are handed to [`RadioEngine::start`](crate::driver::RadioEngine::start)
//! and move into the loop's thread. Any `FnMut(&Frame)` / `FnMut(&Message)`
//! closure that is `Send` works; [`LogObserver`] is the no-op default that only
//! logs.

use crate::message::Message;
use crate::packet::Frame;

/// Receives every valid, non-duplicate frame the monitor loop decodes.
pub trait FrameObserver: Send {
    /// Called once per dispatched frame.
    fn on_frame(&mut self, frame: &Frame);
}

/// Receives every message the monitor loop manages to reassemble.
pub trait MessageObserver: Send {
    /// Called once per complete message.
    fn on_message(&mut self, message: &Message);
}

impl<F> FrameObserver for F
where
    F: FnMut(&Frame) + Send,
{
    fn on_frame(&mut self, frame: &Frame) {
        self(frame)
    }
}

impl<F> MessageObserver for F
where
    F: FnMut(&Message) + Send,
{
    fn on_message(&mut self, message: &Message) {
        self(message)
    }
}

/// Default observer: logs traffic at debug level and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl FrameObserver for LogObserver {
    fn on_frame(&mut self, frame: &Frame) {
        log::debug!("frame received: {frame}");
    }
}

impl MessageObserver for LogObserver {
    fn on_message(&mut self, message: &Message) {
        log::debug!("message received: {message}");
    }
}
