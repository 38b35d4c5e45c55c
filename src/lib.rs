//! # podlink
//!
//! Link and transport layer for the 433.91 MHz half-duplex radio spoken by
//! insulin pods and their controllers.
//!
//! The crate is split the way the air interface is:
//!
//! - [`encoding`]: the Manchester line codec, preamble and noise padding that
//!   turn a frame into a fixed-length on-air buffer and back
//! - [`packet`] and [`message`]: frames with their checksum, and the messages
//!   that span one or more frames
//! - [`driver`]: [`RadioEngine`], which sequences request/response exchanges
//!   over an unreliable channel, and runs the background monitor loop
//! - [`transceiver`]: the hardware boundary; anything that can configure,
//!   transmit and receive raw buffers can drive the engine
//!
//! ## Usage
//!
//! Sniffing traffic in monitor mode, with closures as observers:
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use podlink::{EngineConfig, Frame, LogObserver, RadioEngine, RadioMode};
//! # use std::time::Duration;
//! # use podlink::{RadioConfig, RawCapture, Transceiver, TransceiverError};
//! # struct QuietBand;
//! # impl Transceiver for QuietBand {
//! #     fn configure(&mut self, _: &RadioConfig) -> Result<(), TransceiverError> { Ok(()) }
//! #     fn transmit(&mut self, _: &[u8]) -> Result<(), TransceiverError> { Ok(()) }
//! #     fn receive(&mut self, _: Duration) -> Result<Option<RawCapture>, TransceiverError> {
//! #         std::thread::sleep(Duration::from_millis(1));
//! #         Ok(None)
//! #     }
//! # }
//! # fn main() -> Result<(), podlink::RadioError> {
//! # let my_transceiver = QuietBand;
//!
//! let heard = Arc::new(Mutex::new(Vec::new()));
//! let log = Arc::clone(&heard);
//!
//! let mut engine = RadioEngine::new(my_transceiver, EngineConfig::default());
//! engine.start(
//!     move |frame: &Frame| log.lock().unwrap().push(frame.clone()),
//!     LogObserver,
//!     RadioMode::Monitor,
//!     None,
//!     512,
//! )?;
//! // ... later
//! engine.stop()?;
//!
//! for frame in heard.lock().unwrap().iter() {
//!     println!("{frame}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Request/response exchanges run in [`RadioMode::Driver`]; see [`driver`].
//!
//! ## Integration Notes
//!
//! - The transceiver must strip everything up to and including the `0xa55a`
//!   sync word; received buffers start at the encoded frame.
//! - Exchanges block the calling thread for up to several minutes when the pod
//!   is out of range. Run them off any latency-sensitive thread.
//! - Logging goes through the `log` facade; install any logger to see traffic.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]

pub mod consts;
pub mod crc;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod message;
mod monitor;
pub mod observer;
pub mod packet;
pub mod timer;
pub mod transceiver;

pub use driver::{EngineConfig, RadioEngine, RadioMode};
pub use error::{ProtocolFault, RadioError};
pub use message::{Message, MessageState, MessageType};
pub use observer::{FrameObserver, LogObserver, MessageObserver};
pub use packet::{Frame, PacketType};
pub use transceiver::{RadioConfig, RawCapture, Transceiver, TransceiverError};
