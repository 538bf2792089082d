//! Time source used by the retry policy and the polling port.

use core::time::Duration;

/// Monotonic time source.
///
/// The protocol engine only measures elapsed time and sleeps,
/// so any monotonic counter with millisecond resolution is sufficient.
pub trait Clock {
    /// Returns the time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;

    /// Blocks the calling thread for the given duration.
    fn delay(&self, duration: Duration);
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Duration {
        T::now(self)
    }

    fn delay(&self, duration: Duration) {
        T::delay(self, duration);
    }
}

/// Clock backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
#[derive(Copy, Clone, Debug)]
pub struct SystemClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// Constructs a clock whose origin is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
