//! Injectable delays for the activation retry loop

use std::{fmt, time::Duration};

/// Something that can pause the calling thread
pub trait Delay: Send + fmt::Debug {
    /// Pause for `duration`
    fn sleep(&self, duration: Duration);
}

/// Delay backed by [`std::thread::sleep`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Delay for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
