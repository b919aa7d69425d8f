//! MQTT 3.1.1 session client for embedded systems.
//!
//! [`Client`] owns one broker session at a time. It opens the byte stream
//! through a [`Connect`] implementation, frames packets with the
//! [`packet`](super::packet) codec, and keeps the QoS 1 bookkeeping in
//! [`PendingAcks`].
//!
//! # Polling model
//!
//! Nothing runs in the background. The application loop is expected to call
//! [`Client::check_message`] regularly: each call reads at most one packet,
//! dispatches it to the configured handlers and expires acknowledgments that
//! are overdue. Keep-alive is caller-driven as well, via [`Client::ping`].
//!
//! ```rust,no_run
//! use greenfinger_mqtt::network::application::mqtt::{Client, Delivery, Options, QoS};
//! # use core::time::Duration;
//! # use greenfinger_mqtt::network::{Close, Connect, Connection, Read, Readiness, Remote, Write};
//! # use greenfinger_mqtt::network::error::Error;
//! # use greenfinger_mqtt::time::{Clock, Instant};
//! # struct Modem;
//! # impl Read for Modem {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Write for Modem {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Readiness for Modem {
//! #     type Error = ();
//! #     fn poll_read(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(false) }
//! #     fn poll_write(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(true) }
//! # }
//! # impl Close for Modem {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Connection for Modem {}
//! # struct Dialer;
//! # impl Connect for Dialer {
//! #     type Connection = Modem;
//! #     type Error = Error;
//! #     fn connect(&mut self, _remote: &Remote<'_>) -> Result<Modem, Error> { Ok(Modem) }
//! # }
//! # struct Ticks;
//! # impl Clock for Ticks { fn now(&self) -> Instant { Instant::from_millis(0) } }
//!
//! let options = Options::new("greenfinger1", "192.168.1.10");
//! let mut client = Client::new(Dialer, Ticks, options)
//!     .on_message(|topic: &str, payload: &[u8], _retained: bool, _dup: bool| {
//!         // react to commands
//!         let _ = (topic, payload);
//!     })
//!     .on_status(|pid: u16, delivery: Delivery| {
//!         let _ = (pid, delivery);
//!     });
//!
//! client.connect(true)?;
//! client.subscribe("greenfinger1/pump/set", QoS::AtLeastOnce)?;
//! let pid = client.publish("greenfinger1/moisture", b"42", false, QoS::AtLeastOnce)?;
//! loop {
//!     client.check_message()?;
//! #   break;
//! }
//! # Ok::<(), Error>(())
//! ```

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use super::options::Options;
use super::packet::{
    ConnAck, Connect as ConnectPacket, PUBLISH, Packet, Publish, QoS, Subscribe,
};
use super::pending::{PacketIds, PendingAcks};
use super::varint;
use crate::network::Connect;
use crate::network::error::Error;
use crate::network::transport::Transport;
use crate::time::{Clock, Instant};

/// Longest topic an inbound PUBLISH is expected to carry.
pub const MAX_TOPIC_LEN: usize = 256;
/// Largest inbound payload.
pub const MAX_PAYLOAD_LEN: usize = 1024;
/// Largest inbound packet body: topic, packet identifier and payload.
///
/// Bigger PUBLISH packets are read off the stream and discarded.
pub const MAX_PACKET_LEN: usize = 2 + MAX_TOPIC_LEN + 2 + MAX_PAYLOAD_LEN;

/// Chunk size used when discarding an oversized body.
const DISCARD_CHUNK: usize = 64;

/// Whether the client currently holds a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No transport. Only [`Client::connect`] does anything useful.
    Disconnected,
    /// CONNACK accepted, transport open.
    Connected,
}

/// What became of a packet that needed acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Delivery {
    /// The broker acknowledged it.
    Delivered,
    /// No acknowledgment arrived within the message timeout.
    TimedOut,
    /// An acknowledgment arrived for an identifier nothing was waiting on.
    Unexpected,
}

/// Receives application messages from subscribed topics.
pub trait MessageHandler {
    /// Called once per inbound PUBLISH.
    fn on_message(&mut self, topic: &str, payload: &[u8], retained: bool, duplicate: bool);
}

impl<F> MessageHandler for F
where
    F: FnMut(&str, &[u8], bool, bool),
{
    fn on_message(&mut self, topic: &str, payload: &[u8], retained: bool, duplicate: bool) {
        self(topic, payload, retained, duplicate)
    }
}

/// Receives the outcome of QoS 1 publishes and subscriptions.
pub trait StatusHandler {
    /// Called when `pid` is acknowledged, times out, or is acknowledged unexpectedly.
    fn on_status(&mut self, pid: u16, delivery: Delivery);
}

impl<F> StatusHandler for F
where
    F: FnMut(u16, Delivery),
{
    fn on_status(&mut self, pid: u16, delivery: Delivery) {
        self(pid, delivery)
    }
}

/// Placeholder for a handler that was not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHandler;

impl MessageHandler for NoHandler {
    fn on_message(&mut self, _topic: &str, _payload: &[u8], _retained: bool, _duplicate: bool) {}
}

impl StatusHandler for NoHandler {
    fn on_status(&mut self, _pid: u16, _delivery: Delivery) {}
}

/// A packet [`Client::check_message`] processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// PINGRESP.
    PingResp,
    /// PUBACK, with what it meant for the pending table.
    PubAck {
        /// Acknowledged identifier.
        pid: u16,
        /// `Delivered`, or `Unexpected` if nothing was pending.
        delivery: Delivery,
    },
    /// Successful SUBACK.
    SubAck {
        /// Acknowledged identifier.
        pid: u16,
        /// QoS granted by the broker.
        granted: QoS,
    },
    /// PUBLISH, already handed to the message handler.
    Publish {
        /// Delivery QoS.
        qos: QoS,
        /// Packet identifier for QoS 1; its PUBACK has been sent.
        pid: Option<u16>,
        /// Retain flag.
        retained: bool,
        /// Duplicate-delivery flag.
        duplicate: bool,
    },
    /// PUBLISH too large for the receive buffer. It was skipped without
    /// reaching the message handler; QoS 1 is still acknowledged.
    Discarded {
        /// Delivery QoS.
        qos: QoS,
        /// Packet identifier for QoS 1; its PUBACK has been sent.
        pid: Option<u16>,
        /// Size of the packet body.
        len: usize,
    },
}

/// An MQTT 3.1.1 client for publish-subscribe messaging.
///
/// # Type Parameters
///
/// * `N` - Opens the transport, see [`Connect`]
/// * `K` - Monotonic time source for acknowledgment deadlines
/// * `M` - Message handler, set with [`Client::on_message`]
/// * `S` - Status handler, set with [`Client::on_status`]
pub struct Client<'a, N: Connect, K, M = NoHandler, S = NoHandler> {
    connector: N,
    clock: K,
    options: Options<'a>,
    transport: Option<Transport<N::Connection>>,
    ids: PacketIds,
    pending: PendingAcks,
    on_message: Option<M>,
    on_status: S,
    rx: Vec<u8, MAX_PACKET_LEN>,
    session_present: bool,
    last_ping: Instant,
    last_packet: Instant,
}

impl<'a, N, K> Client<'a, N, K>
where
    N: Connect,
    K: Clock,
{
    /// Creates a disconnected client.
    ///
    /// Nothing touches the network until [`Client::connect`].
    pub fn new(connector: N, clock: K, options: Options<'a>) -> Self {
        let now = clock.now();
        Self {
            connector,
            clock,
            pending: PendingAcks::new(options.message_timeout),
            options,
            transport: None,
            ids: PacketIds::new(),
            on_message: None,
            on_status: NoHandler,
            rx: Vec::new(),
            session_present: false,
            last_ping: now,
            last_packet: now,
        }
    }
}

impl<'a, N, K, M, S> Client<'a, N, K, M, S>
where
    N: Connect,
    N::Error: Into<Error>,
    K: Clock,
    M: MessageHandler,
    S: StatusHandler,
{
    /// Sets the handler for inbound messages. Required before [`Client::subscribe`].
    pub fn on_message<H: MessageHandler>(self, handler: H) -> Client<'a, N, K, H, S> {
        Client {
            connector: self.connector,
            clock: self.clock,
            options: self.options,
            transport: self.transport,
            ids: self.ids,
            pending: self.pending,
            on_message: Some(handler),
            on_status: self.on_status,
            rx: self.rx,
            session_present: self.session_present,
            last_ping: self.last_ping,
            last_packet: self.last_packet,
        }
    }

    /// Sets the handler for acknowledgment outcomes.
    pub fn on_status<H: StatusHandler>(self, handler: H) -> Client<'a, N, K, M, H> {
        Client {
            connector: self.connector,
            clock: self.clock,
            options: self.options,
            transport: self.transport,
            ids: self.ids,
            pending: self.pending,
            on_message: self.on_message,
            on_status: handler,
            rx: self.rx,
            session_present: self.session_present,
            last_ping: self.last_ping,
            last_packet: self.last_packet,
        }
    }

    /// Opens the transport and performs the CONNECT/CONNACK handshake.
    ///
    /// Any existing transport is closed first. With `clean_session` the
    /// pending-acknowledgment table is emptied as well, since the broker will
    /// not acknowledge anything from the old session.
    ///
    /// Returns the session-present flag from CONNACK.
    ///
    /// # Errors
    ///
    /// * [`Error::ConnectionRefused`] - The broker refused, with its reason
    /// * [`Error::ProtocolViolation`] - The answer was not a CONNACK
    /// * Transport errors from opening, writing or reading
    pub fn connect(&mut self, clean_session: bool) -> Result<bool, Error> {
        self.close_transport();
        if clean_session {
            self.pending.clear();
        }

        let remote = self.options.remote();
        debug!("connecting to {}:{}", remote.host, remote.port);
        let connection = self.connector.connect(&remote).map_err(Into::into)?;
        let mut transport = Transport::new(connection, self.options.socket_timeout);

        let connect = self.options.connect_packet(clean_session);
        let session_present = match Self::handshake(&mut transport, connect) {
            Ok(session_present) => session_present,
            Err(e) => {
                warn!("connect failed: {}", e);
                transport.shutdown();
                return Err(e);
            }
        };

        let now = self.clock.now();
        self.transport = Some(transport);
        self.session_present = session_present;
        self.last_ping = now;
        self.last_packet = now;
        info!(
            "connected as {} (session present: {})",
            self.options.client_id,
            session_present
        );
        Ok(session_present)
    }

    fn handshake(
        transport: &mut Transport<N::Connection>,
        connect: ConnectPacket<'_>,
    ) -> Result<bool, Error> {
        Packet::Connect(connect).encode(transport)?;
        let mut frame = [0u8; 4];
        transport.read_exact(&mut frame)?;
        ConnAck::from_frame(&frame)?.accept()
    }

    /// Publishes a message to a topic.
    ///
    /// For QoS 1 a packet identifier is allocated, registered with a deadline
    /// of now plus the message timeout, and returned so the caller can
    /// correlate it with the status handler. QoS 0 returns `None`.
    ///
    /// # Errors
    ///
    /// * [`Error::Unsupported`] - `qos` is [`QoS::ExactlyOnce`]
    /// * [`Error::NotOpen`] - Not connected
    /// * [`Error::BufferOverflow`] - Too many acknowledgments outstanding
    /// * [`Error::Encoding`] - Topic or payload too long
    /// * Transport errors from writing, after which the client is disconnected
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use greenfinger_mqtt::network::application::mqtt::{Client, Options, QoS};
    /// # use core::time::Duration;
    /// # use greenfinger_mqtt::network::{Close, Connect, Connection, Read, Readiness, Remote, Write};
    /// # use greenfinger_mqtt::network::error::Error;
    /// # use greenfinger_mqtt::time::{Clock, Instant};
    /// # struct MockConnection;
    /// # impl Connection for MockConnection {}
    /// # impl Read for MockConnection {
    /// #     type Error = ();
    /// #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
    /// # }
    /// # impl Write for MockConnection {
    /// #     type Error = ();
    /// #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
    /// #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
    /// # }
    /// # impl Readiness for MockConnection {
    /// #     type Error = ();
    /// #     fn poll_read(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(false) }
    /// #     fn poll_write(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(true) }
    /// # }
    /// # impl Close for MockConnection {
    /// #     type Error = ();
    /// #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
    /// # }
    /// # struct MockConnector;
    /// # impl Connect for MockConnector {
    /// #     type Connection = MockConnection;
    /// #     type Error = Error;
    /// #     fn connect(&mut self, _r: &Remote<'_>) -> Result<MockConnection, Error> { Ok(MockConnection) }
    /// # }
    /// # struct MockClock;
    /// # impl Clock for MockClock { fn now(&self) -> Instant { Instant::from_millis(0) } }
    ///
    /// let mut client = Client::new(MockConnector, MockClock, Options::new("sensor_01", "10.0.0.2"));
    /// client.connect(true)?;
    ///
    /// // Fire and forget
    /// assert_eq!(client.publish("sensors/moisture", b"42", false, QoS::AtMostOnce)?, None);
    ///
    /// // Acknowledged; the identifier comes back through the status handler
    /// let pid = client.publish("sensors/moisture", b"41", true, QoS::AtLeastOnce)?;
    /// assert!(pid.is_some());
    /// # Ok::<(), Error>(())
    /// ```
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
        qos: QoS,
    ) -> Result<Option<u16>, Error> {
        if qos == QoS::ExactlyOnce {
            return Err(Error::Unsupported);
        }
        let pid = match qos {
            QoS::AtMostOnce => None,
            _ => Some(self.allocate_pid()?),
        };
        let packet = Packet::Publish(Publish {
            topic,
            payload,
            qos,
            pid,
            retain,
            dup: false,
        });
        self.send(&packet)?;

        if let Some(pid) = pid {
            self.pending.register(pid, self.clock.now())?;
        }
        trace!("published {} bytes to {}", payload.len(), topic);
        Ok(pid)
    }

    /// Subscribes to a single topic filter.
    ///
    /// Subscriptions always wait for a SUBACK, so a packet identifier is
    /// registered and returned whatever the QoS. The SUBACK itself is picked
    /// up by [`Client::check_message`].
    ///
    /// # Errors
    ///
    /// * [`Error::Configuration`] - No message handler is set
    /// * [`Error::Unsupported`] - `qos` is [`QoS::ExactlyOnce`]
    /// * Everything [`Client::publish`] can return
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use greenfinger_mqtt::network::application::mqtt::{Client, Options, QoS};
    /// # use core::time::Duration;
    /// # use greenfinger_mqtt::network::{Close, Connect, Connection, Read, Readiness, Remote, Write};
    /// # use greenfinger_mqtt::network::error::Error;
    /// # use greenfinger_mqtt::time::{Clock, Instant};
    /// # struct MockConnection;
    /// # impl Connection for MockConnection {}
    /// # impl Read for MockConnection {
    /// #     type Error = ();
    /// #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
    /// # }
    /// # impl Write for MockConnection {
    /// #     type Error = ();
    /// #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
    /// #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
    /// # }
    /// # impl Readiness for MockConnection {
    /// #     type Error = ();
    /// #     fn poll_read(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(false) }
    /// #     fn poll_write(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(true) }
    /// # }
    /// # impl Close for MockConnection {
    /// #     type Error = ();
    /// #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
    /// # }
    /// # struct MockConnector;
    /// # impl Connect for MockConnector {
    /// #     type Connection = MockConnection;
    /// #     type Error = Error;
    /// #     fn connect(&mut self, _r: &Remote<'_>) -> Result<MockConnection, Error> { Ok(MockConnection) }
    /// # }
    /// # struct MockClock;
    /// # impl Clock for MockClock { fn now(&self) -> Instant { Instant::from_millis(0) } }
    ///
    /// let mut client = Client::new(MockConnector, MockClock, Options::new("sensor_01", "10.0.0.2"))
    ///     .on_message(|topic: &str, payload: &[u8], _retained: bool, _dup: bool| {
    ///         let _ = (topic, payload);
    ///     });
    /// client.connect(true)?;
    /// let pid = client.subscribe("sensor_01/pump/set", QoS::AtLeastOnce)?;
    /// # let _ = pid;
    /// # Ok::<(), Error>(())
    /// ```
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, Error> {
        if self.on_message.is_none() {
            return Err(Error::Configuration);
        }
        if qos == QoS::ExactlyOnce {
            return Err(Error::Unsupported);
        }
        let pid = self.allocate_pid()?;
        self.send(&Packet::Subscribe(Subscribe { pid, topic, qos }))?;
        self.pending.register(pid, self.clock.now())?;
        debug!("subscribing to {} as packet {}", topic, pid);
        Ok(pid)
    }

    /// Reads and handles one packet if one arrives within the poll window.
    ///
    /// Returns `None` when nothing arrived. Regardless of the outcome, pending
    /// acknowledgments past their deadline are reported as
    /// [`Delivery::TimedOut`] and dropped.
    ///
    /// # Errors
    ///
    /// * [`Error::SubscriptionRejected`] - A SUBACK carried the failure code
    /// * [`Error::Unsupported`] - A QoS 2 PUBLISH arrived
    /// * [`Error::ProtocolViolation`] - Malformed or unexpected packet; the
    ///   client is disconnected
    /// * [`Error::BufferOverflow`] - A packet other than PUBLISH larger than
    ///   [`MAX_PACKET_LEN`]; the client is disconnected
    /// * Transport errors, after which the client is disconnected
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use greenfinger_mqtt::network::application::mqtt::{Client, Incoming, Options};
    /// # use core::time::Duration;
    /// # use greenfinger_mqtt::network::{Close, Connect, Connection, Read, Readiness, Remote, Write};
    /// # use greenfinger_mqtt::network::error::Error;
    /// # use greenfinger_mqtt::time::{Clock, Instant};
    /// # struct MockConnection;
    /// # impl Connection for MockConnection {}
    /// # impl Read for MockConnection {
    /// #     type Error = ();
    /// #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
    /// # }
    /// # impl Write for MockConnection {
    /// #     type Error = ();
    /// #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
    /// #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
    /// # }
    /// # impl Readiness for MockConnection {
    /// #     type Error = ();
    /// #     fn poll_read(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(false) }
    /// #     fn poll_write(&mut self, _t: Option<Duration>) -> Result<bool, Self::Error> { Ok(true) }
    /// # }
    /// # impl Close for MockConnection {
    /// #     type Error = ();
    /// #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
    /// # }
    /// # struct MockConnector;
    /// # impl Connect for MockConnector {
    /// #     type Connection = MockConnection;
    /// #     type Error = Error;
    /// #     fn connect(&mut self, _r: &Remote<'_>) -> Result<MockConnection, Error> { Ok(MockConnection) }
    /// # }
    /// # struct MockClock;
    /// # impl Clock for MockClock { fn now(&self) -> Instant { Instant::from_millis(0) } }
    ///
    /// let mut client = Client::new(MockConnector, MockClock, Options::new("sensor_01", "10.0.0.2"))
    ///     .on_message(|topic: &str, payload: &[u8], _retained: bool, _dup: bool| {
    ///         let _ = (topic, payload);
    ///     });
    /// client.connect(true)?;
    ///
    /// match client.check_message()? {
    ///     Some(Incoming::Discarded { len, .. }) => { let _ = len; }
    ///     Some(_) => {}
    ///     None => { /* nothing arrived within the poll window */ }
    /// }
    /// # Ok::<(), Error>(())
    /// ```
    pub fn check_message(&mut self) -> Result<Option<Incoming>, Error> {
        let window = Some(self.options.poll_window);
        self.receive(window)
    }

    /// Like [`Client::check_message`], but waits up to the socket timeout.
    pub fn wait_message(&mut self) -> Result<Option<Incoming>, Error> {
        let window = self.options.socket_timeout;
        self.receive(window)
    }

    /// Sends PINGREQ and records the time.
    pub fn ping(&mut self) -> Result<(), Error> {
        self.send(&Packet::PingReq)?;
        self.last_ping = self.clock.now();
        Ok(())
    }

    /// Sends DISCONNECT, ignoring failures, and closes the transport.
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = Packet::Disconnect.encode(&mut transport);
            transport.shutdown();
            info!("disconnected");
        }
    }

    /// Closes the transport without DISCONNECT, so the broker sends the will.
    pub fn close_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
    }

    /// Current connection state.
    pub fn state(&self) -> State {
        match self.transport {
            Some(_) => State::Connected,
            None => State::Disconnected,
        }
    }

    /// Session-present flag of the last accepted CONNACK.
    pub fn session_present(&self) -> bool {
        self.session_present
    }

    /// When PINGREQ was last sent (or the session established).
    pub fn last_ping(&self) -> Instant {
        self.last_ping
    }

    /// When a control packet last proved the broker alive.
    pub fn last_packet(&self) -> Instant {
        self.last_packet
    }

    /// Whether `pid` still awaits acknowledgment.
    pub fn is_pending(&self, pid: u16) -> bool {
        self.pending.contains(pid)
    }

    /// Number of acknowledgments outstanding.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The options the client was built with.
    pub fn options(&self) -> &Options<'a> {
        &self.options
    }

    /// Next identifier that is not already awaiting acknowledgment.
    fn allocate_pid(&mut self) -> Result<u16, Error> {
        if self.pending.is_full() {
            return Err(Error::BufferOverflow);
        }
        loop {
            let pid = self.ids.next_id();
            if !self.pending.contains(pid) {
                return Ok(pid);
            }
        }
    }

    fn send(&mut self, packet: &Packet<'_>) -> Result<(), Error> {
        let transport = self.transport.as_mut().ok_or(Error::NotOpen)?;
        packet.encode(transport).map_err(|e| self.fail(e))
    }

    fn receive(&mut self, window: Option<Duration>) -> Result<Option<Incoming>, Error> {
        let result = self.receive_packet(window);
        self.expire_pending();
        result.map_err(|e| self.fail(e))
    }

    fn receive_packet(&mut self, window: Option<Duration>) -> Result<Option<Incoming>, Error> {
        let transport = self.transport.as_mut().ok_or(Error::NotOpen)?;
        if !transport.poll_ready(window)? {
            return Ok(None);
        }

        let header = transport.read_byte()?;
        let remaining = varint::decode(|| transport.read_byte())? as usize;
        if remaining > MAX_PACKET_LEN {
            let incoming = Self::discard_publish(transport, header, remaining)?;
            self.last_packet = self.clock.now();
            return Ok(Some(incoming));
        }
        self.rx.clear();
        self.rx
            .resize(remaining, 0)
            .map_err(|_| Error::BufferOverflow)?;
        transport.read_exact(&mut self.rx)?;

        let packet = Packet::decode(header, &self.rx)?;
        let now = self.clock.now();
        match packet {
            Packet::PingResp => {
                self.last_packet = now;
                Ok(Some(Incoming::PingResp))
            }
            Packet::PubAck(pid) => {
                let delivery = if self.pending.resolve(pid) {
                    self.last_packet = now;
                    Delivery::Delivered
                } else {
                    warn!("PUBACK for unknown packet {}", pid);
                    Delivery::Unexpected
                };
                self.on_status.on_status(pid, delivery);
                Ok(Some(Incoming::PubAck { pid, delivery }))
            }
            Packet::SubAck(suback) => {
                let resolved = self.pending.resolve(suback.pid);
                let granted = match suback.granted() {
                    Ok(granted) => granted,
                    Err(e) => {
                        warn!("subscription {} rejected", suback.pid);
                        return Err(e);
                    }
                };
                let delivery = if resolved {
                    self.last_packet = now;
                    Delivery::Delivered
                } else {
                    warn!("SUBACK for unknown packet {}", suback.pid);
                    Delivery::Unexpected
                };
                self.on_status.on_status(suback.pid, delivery);
                Ok(Some(Incoming::SubAck {
                    pid: suback.pid,
                    granted,
                }))
            }
            Packet::Publish(publish) => {
                if publish.qos == QoS::ExactlyOnce {
                    warn!("QoS 2 message on {} not supported", publish.topic);
                    return Err(Error::Unsupported);
                }
                match self.on_message.as_mut() {
                    Some(handler) => {
                        handler.on_message(publish.topic, publish.payload, publish.retain, publish.dup)
                    }
                    None => warn!("no message handler, dropping message on {}", publish.topic),
                }
                self.last_packet = now;
                if let Some(pid) = publish.pid {
                    Packet::PubAck(pid).encode(transport)?;
                }
                Ok(Some(Incoming::Publish {
                    qos: publish.qos,
                    pid: publish.pid,
                    retained: publish.retain,
                    duplicate: publish.dup,
                }))
            }
            _ => Err(Error::ProtocolViolation),
        }
    }

    /// Reads an oversized PUBLISH off the stream, keeping only its packet
    /// identifier so it can be acknowledged.
    fn discard_publish(
        transport: &mut Transport<N::Connection>,
        header: u8,
        remaining: usize,
    ) -> Result<Incoming, Error> {
        if header & 0xF0 != PUBLISH {
            return Err(Error::BufferOverflow);
        }
        let qos = QoS::from_bits((header >> 1) & 0x03)?;
        let pid_len = if qos == QoS::AtMostOnce { 0 } else { 2 };

        let mut word = [0u8; 2];
        transport.read_exact(&mut word)?;
        let topic_len = usize::from(u16::from_be_bytes(word));
        let payload_len = remaining
            .checked_sub(2 + topic_len + pid_len)
            .ok_or(Error::ProtocolViolation)?;
        Self::skip(transport, topic_len)?;
        let pid = if pid_len == 0 {
            None
        } else {
            transport.read_exact(&mut word)?;
            match u16::from_be_bytes(word) {
                0 => return Err(Error::ProtocolViolation),
                pid => Some(pid),
            }
        };
        Self::skip(transport, payload_len)?;

        if qos == QoS::ExactlyOnce {
            warn!("QoS 2 message not supported");
            return Err(Error::Unsupported);
        }
        warn!(
            "dropped {} byte message, receive buffer holds {}",
            remaining,
            MAX_PACKET_LEN
        );
        if let Some(pid) = pid {
            Packet::PubAck(pid).encode(transport)?;
        }
        Ok(Incoming::Discarded {
            qos,
            pid,
            len: remaining,
        })
    }

    fn skip(transport: &mut Transport<N::Connection>, mut len: usize) -> Result<(), Error> {
        let mut scratch = [0u8; DISCARD_CHUNK];
        while len > 0 {
            let chunk = len.min(DISCARD_CHUNK);
            transport.read_exact(&mut scratch[..chunk])?;
            len -= chunk;
        }
        Ok(())
    }

    fn expire_pending(&mut self) {
        let now = self.clock.now();
        for pid in self.pending.sweep(now) {
            warn!("no acknowledgment for packet {}", pid);
            self.on_status.on_status(pid, Delivery::TimedOut);
        }
    }

    /// Drops the session if `error` leaves the stream unusable or out of frame.
    fn fail(&mut self, error: Error) -> Error {
        let fatal = error.is_transport()
            || matches!(error, Error::ProtocolViolation | Error::BufferOverflow);
        if fatal {
            if let Some(transport) = self.transport.take() {
                warn!("session lost: {}", error);
                transport.shutdown();
            }
        }
        error
    }
}

impl<N: Connect, K, M, S> fmt::Debug for Client<'_, N, K, M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.options.client_id)
            .field("connected", &self.transport.is_some())
            .field("session_present", &self.session_present)
            .field("pending", &self.pending.len())
            .finish()
    }
}
