//! Reply timeouts for single-frame exchanges.
//!
//! Every wait is drawn at random from a millisecond window so that a
//! controller and pod that fell into lockstep drift apart again:
//!
//! | Situation                                   | Window (ms)      |
//! |---------------------------------------------|------------------|
//! | normal attempt                              | `1000..=1300`    |
//! | attempt after the first wrong-typed reply   | `4700..=5300`    |
//! | attempt after any later wrong-typed reply   | `9700..=10300`   |
//! | final acknowledgement, waiting for silence  | `500`            |
//!
//! The escalation reflects the pod answering "still busy": once it has been
//! heard at all, it gets much longer to produce the real answer.

use core::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;

use crate::consts::{
    FIRST_ESCALATED_TIMEOUT_MS, QUIET_TIMEOUT_MS, REPEAT_ESCALATED_TIMEOUT_MS, REPLY_TIMEOUT_MS,
};

/// Draws reply timeouts.
#[derive(Debug)]
pub struct ReplyTimer {
    rng: StdRng,
}

impl ReplyTimer {
    /// Creates a timer drawing from `rng`.
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    /// Timeout for an ordinary attempt.
    pub fn reply(&mut self) -> Duration {
        self.pick(REPLY_TIMEOUT_MS)
    }

    /// Timeout for the attempt after the `mismatches`-th wrong-typed reply.
    pub fn escalated(&mut self, mismatches: u32) -> Duration {
        if mismatches <= 1 {
            self.pick(FIRST_ESCALATED_TIMEOUT_MS)
        } else {
            self.pick(REPEAT_ESCALATED_TIMEOUT_MS)
        }
    }

    /// Timeout while waiting for the pod to go quiet.
    pub fn quiet(&self) -> Duration {
        Duration::from_millis(QUIET_TIMEOUT_MS)
    }

    fn pick(&mut self, window: RangeInclusive<u64>) -> Duration {
        Duration::from_millis(self.rng.gen_range(window))
    }
}
