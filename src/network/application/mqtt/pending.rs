//! Packet identifiers and the acknowledgments waiting on them.

use core::time::Duration;

use heapless::{FnvIndexMap, Vec};

use crate::network::error::Error;
use crate::time::Instant;

/// How many QoS 1 publishes and subscriptions may await acknowledgment at once.
///
/// Must be a power of two.
pub const MAX_PENDING: usize = 32;

/// Wrapping packet-identifier generator.
///
/// Yields 1, 2, ..., 65535, 1, ... and never 0, which the protocol reserves.
#[derive(Debug, Clone, Default)]
pub struct PacketIds {
    last: u16,
}

impl PacketIds {
    /// A generator whose first identifier is 1.
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// The next identifier in sequence.
    pub fn next_id(&mut self) -> u16 {
        self.last = match self.last {
            u16::MAX => 1,
            last => last + 1,
        };
        self.last
    }
}

/// Outstanding acknowledgments keyed by packet identifier.
///
/// Each entry holds the deadline after which the acknowledgment is given up
/// on. Iteration order carries no meaning; [`PendingAcks::sweep`] visits every
/// entry.
#[derive(Debug, Clone)]
pub struct PendingAcks {
    timeout: Duration,
    deadlines: FnvIndexMap<u16, Instant, MAX_PENDING>,
}

impl PendingAcks {
    /// An empty tracker; every entry expires `timeout` after registration.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadlines: FnvIndexMap::new(),
        }
    }

    /// How long an entry lives.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts waiting for the acknowledgment of `pid`, with a deadline of
    /// `now` plus the tracker timeout.
    ///
    /// # Errors
    ///
    /// * [`Error::Configuration`] - `pid` is already pending
    /// * [`Error::BufferOverflow`] - [`MAX_PENDING`] entries are already pending
    pub fn register(&mut self, pid: u16, now: Instant) -> Result<(), Error> {
        if self.deadlines.contains_key(&pid) {
            return Err(Error::Configuration);
        }
        self.deadlines
            .insert(pid, now + self.timeout)
            .map_err(|_| Error::BufferOverflow)?;
        Ok(())
    }

    /// Stops waiting for `pid`. Returns whether it was pending.
    pub fn resolve(&mut self, pid: u16) -> bool {
        self.deadlines.remove(&pid).is_some()
    }

    /// Removes and returns every entry whose deadline is at or before `now`.
    pub fn sweep(&mut self, now: Instant) -> Vec<u16, MAX_PENDING> {
        let mut expired: Vec<u16, MAX_PENDING> = Vec::new();
        for (&pid, &deadline) in self.deadlines.iter() {
            if deadline <= now {
                // Cannot overflow: both collections share the same capacity.
                let _ = expired.push(pid);
            }
        }
        for pid in &expired {
            self.deadlines.remove(pid);
        }
        expired
    }

    /// Whether `pid` is awaiting acknowledgment.
    pub fn contains(&self, pid: u16) -> bool {
        self.deadlines.contains_key(&pid)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Whether another entry would be refused.
    pub fn is_full(&self) -> bool {
        self.deadlines.len() == self.deadlines.capacity()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}
