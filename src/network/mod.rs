//! A network abstraction layer for embedded systems
//!
//! This module provides the small set of traits the MQTT client is written
//! against. Anything that can move bytes (a TCP socket, a modem UART, an
//! encrypted stream from a TLS provider) plugs in by implementing
//! [`Connection`], and anything that can open such a byte stream implements
//! [`Connect`].
//!

#![allow(missing_docs)]
#![deny(unsafe_code)]

use core::time::Duration;

/// Common error types for network operations
pub mod error;

/// Readiness-polled, exactly-n wrapper around a [`Connection`]
pub mod transport;

/// `std::net` TCP implementation of the network traits
#[cfg(feature = "std")]
pub mod tcp;

/// Application layer protocols
pub mod application;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, Readiness, Write};
}

// Core synchronous traits
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection.
    ///
    /// Returns `Ok(0)` once the peer has closed the stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// Readiness polling, the `select`/`poll` half of a non-blocking socket.
pub trait Readiness {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Wait up to `timeout` for data (or EOF) to become readable.
    ///
    /// `None` waits indefinitely. Returns `Ok(false)` if the timeout elapsed.
    fn poll_read(&mut self, timeout: Option<Duration>) -> Result<bool, Self::Error>;
    /// Wait up to `timeout` for the connection to accept more data.
    fn poll_write(&mut self, timeout: Option<Duration>) -> Result<bool, Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close + Readiness {}

/// Parameters handed to an encrypted-stream provider.
///
/// The client never interprets these; they travel inside [`Remote`] to the
/// [`Connect`] implementation, which is responsible for the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsParams<'a> {
    /// Server name for SNI and certificate verification.
    pub server_name: Option<&'a str>,
    /// DER or PEM encoded CA certificate to trust.
    pub ca_certificate: Option<&'a [u8]>,
    /// Client certificate for mutual authentication.
    pub client_certificate: Option<&'a [u8]>,
    /// Private key matching `client_certificate`.
    pub client_key: Option<&'a [u8]>,
}

/// Where to connect, and whether the stream must be encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remote<'a> {
    /// Host name or address literal.
    pub host: &'a str,
    /// TCP port.
    pub port: u16,
    /// `Some` when the stream must be wrapped in TLS.
    pub tls: Option<&'a TlsParams<'a>>,
}

/// A synchronous connector (client)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection
    fn connect(&mut self, remote: &Remote<'_>) -> Result<Self::Connection, Self::Error>;
}
