//! In-memory connections, a scripted connector and a hand-driven clock.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use greenfinger_mqtt::network::error::Error;
use greenfinger_mqtt::network::{Close, Connect, Connection, Read, Readiness, Remote, Write};
use greenfinger_mqtt::time::{Clock, Delay, Instant};

/// CONNACK accepting a new session.
pub const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

/// Both directions of one mock connection.
#[derive(Debug, Default)]
pub struct Wire {
    /// Bytes the client will read.
    pub inbound: VecDeque<u8>,
    /// Bytes the client wrote.
    pub outbound: Vec<u8>,
    /// Peer hung up: reads return EOF, writes make no progress.
    pub peer_closed: bool,
    /// The client closed its end.
    pub closed: bool,
}

impl Wire {
    pub fn push(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }
}

#[derive(Debug)]
pub struct MockConnection {
    wire: Rc<RefCell<Wire>>,
}

impl MockConnection {
    pub fn new(wire: Rc<RefCell<Wire>>) -> Self {
        Self { wire }
    }
}

impl Read for MockConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        let len = buf.len().min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for MockConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.peer_closed {
            return Ok(0);
        }
        wire.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Readiness for MockConnection {
    type Error = Error;

    fn poll_read(&mut self, _timeout: Option<Duration>) -> Result<bool, Self::Error> {
        let wire = self.wire.borrow();
        Ok(!wire.inbound.is_empty() || wire.peer_closed)
    }

    fn poll_write(&mut self, _timeout: Option<Duration>) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

impl Close for MockConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        self.wire.borrow_mut().closed = true;
        Ok(())
    }
}

impl Connection for MockConnection {}

/// What the mock broker does on the next connect.
#[derive(Debug, Default)]
pub struct Broker {
    /// Scripted outcomes, consumed in order. Once empty every connect
    /// succeeds and the broker answers with [`CONNACK_OK`].
    pub outcomes: VecDeque<Result<Vec<u8>, Error>>,
    /// One wire per successful connect, oldest first.
    pub wires: Vec<Rc<RefCell<Wire>>>,
    /// Every remote dialed.
    pub dialed: Vec<(String, u16, bool)>,
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    broker: Rc<RefCell<Broker>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next connect fails with `error`.
    pub fn fail_next(&self, error: Error) {
        self.broker.borrow_mut().outcomes.push_back(Err(error));
    }

    /// Next connect succeeds and the broker first sends `bytes`.
    pub fn answer_next(&self, bytes: &[u8]) {
        self.broker.borrow_mut().outcomes.push_back(Ok(bytes.to_vec()));
    }

    /// The wire of the most recent successful connect.
    pub fn wire(&self) -> Rc<RefCell<Wire>> {
        self.broker
            .borrow()
            .wires
            .last()
            .cloned()
            .expect("no connection was opened")
    }

    pub fn connections(&self) -> usize {
        self.broker.borrow().wires.len()
    }

    pub fn attempts(&self) -> usize {
        self.broker.borrow().dialed.len()
    }

    pub fn dialed(&self) -> Vec<(String, u16, bool)> {
        self.broker.borrow().dialed.clone()
    }
}

impl Connect for MockConnector {
    type Connection = MockConnection;
    type Error = Error;

    fn connect(&mut self, remote: &Remote<'_>) -> Result<Self::Connection, Self::Error> {
        let mut broker = self.broker.borrow_mut();
        broker
            .dialed
            .push((remote.host.to_string(), remote.port, remote.tls.is_some()));
        let greeting = match broker.outcomes.pop_front() {
            Some(Err(e)) => return Err(e),
            Some(Ok(bytes)) => bytes,
            None => CONNACK_OK.to_vec(),
        };
        let wire = Rc::new(RefCell::new(Wire {
            inbound: greeting.into(),
            ..Wire::default()
        }));
        broker.wires.push(wire.clone());
        Ok(MockConnection::new(wire))
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis.set(self.millis.get() + by.as_millis() as u64);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.millis.get())
    }
}

/// A delay that returns at once and remembers what it was asked to wait.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    delays: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Delay for RecordingDelay {
    fn delay(&mut self, duration: Duration) {
        self.delays.borrow_mut().push(duration);
    }
}

/// Shared log a status handler appends to.
pub type StatusLog<T> = Rc<RefCell<Vec<T>>>;
