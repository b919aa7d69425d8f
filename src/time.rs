//! Monotonic time and blocking delays.
//!
//! The client never reads a wall clock directly. Deadlines for pending
//! acknowledgments and keep-alive bookkeeping are expressed as [`Instant`]s
//! produced by a [`Clock`], and the reconnect backoff sleeps through a
//! [`Delay`]. Both are traits so firmware can back them with a hardware timer
//! while hosted builds use the `std` implementations.

use core::ops::{Add, Sub};
use core::time::Duration;

/// A point on a monotonic millisecond timeline.
///
/// The origin is whatever the [`Clock`] chooses (boot, process start, ...);
/// only differences between instants from the same clock are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant {
    millis: u64,
}

impl Instant {
    /// Creates an instant `millis` milliseconds after the clock origin.
    pub const fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    /// Milliseconds since the clock origin.
    pub const fn as_millis(&self) -> u64 {
        self.millis
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_millis(self.millis.saturating_sub(earlier.millis))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Instant {
            millis: self.millis.saturating_add(millis),
        }
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.duration_since(rhs)
    }
}

/// A source of monotonic time.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// A blocking sleep.
pub trait Delay {
    /// Blocks the caller for `duration`.
    fn delay(&mut self, duration: Duration);
}

/// [`Clock`] backed by `std::time::Instant`, with its origin at construction.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> Instant {
        let elapsed = self.origin.elapsed().as_millis();
        Instant::from_millis(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}

/// [`Delay`] backed by `std::thread::sleep`.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl Delay for StdDelay {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_arithmetic() {
        let t0 = Instant::from_millis(1_000);
        let t1 = t0 + Duration::from_secs(10);
        assert_eq!(t1.as_millis(), 11_000);
        assert_eq!(t1 - t0, Duration::from_secs(10));
        // Going backwards saturates instead of panicking.
        assert_eq!(t0 - t1, Duration::ZERO);
    }

    #[test]
    fn test_instant_add_saturates() {
        let t = Instant::from_millis(u64::MAX - 1) + Duration::from_secs(1);
        assert_eq!(t.as_millis(), u64::MAX);
    }
}
