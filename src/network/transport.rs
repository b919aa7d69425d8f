//! The transport poller.
//!
//! [`Transport`] owns exactly one [`Connection`] and turns its "read what is
//! there" primitives into the all-or-nothing operations a packet codec wants:
//! every read waits for readiness up to the configured timeout and returns
//! exactly the requested number of bytes or fails.

use core::time::Duration;

use crate::network::error::Error;
use crate::network::{Close, Connection, Read, Readiness, Write};

/// A single-owner, readiness-polled byte stream.
#[derive(Debug)]
pub struct Transport<C: Connection> {
    connection: C,
    timeout: Option<Duration>,
}

impl<C: Connection> Transport<C> {
    /// Wraps `connection`; `timeout` bounds every wait for readiness.
    ///
    /// `None` waits indefinitely.
    pub fn new(connection: C, timeout: Option<Duration>) -> Self {
        Self {
            connection,
            timeout,
        }
    }

    /// The per-operation readiness timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether at least one byte (or EOF) can be read within `window`.
    pub fn poll_ready(&mut self, window: Option<Duration>) -> Result<bool, Error> {
        self.connection
            .poll_read(window)
            .map_err(|_| Error::ReadError)
    }

    /// Reads exactly `buf.len()` bytes.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] - No data became readable within the timeout
    /// * [`Error::ConnectionClosed`] - The peer closed the stream first
    /// * [`Error::ReadError`] - The connection reported a failure
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let mut total_read = 0;
        while total_read < buf.len() {
            if !self.poll_ready(self.timeout)? {
                return Err(Error::Timeout);
            }
            match self.connection.read(&mut buf[total_read..]) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => total_read += n,
                Err(_) => return Err(Error::ReadError),
            }
        }
        Ok(())
    }

    /// Reads a single byte.
    pub fn read_byte(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Writes the whole buffer in one write call and flushes.
    ///
    /// A non-blocking socket may accept only part of a buffer; that is
    /// reported rather than retried, since the stream can no longer be framed.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] - The connection did not become writable in time
    /// * [`Error::ConnectionClosed`] - Nothing could be written
    /// * [`Error::ShortWrite`] - Only part of `buf` was written
    /// * [`Error::WriteError`] - The connection reported a failure
    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let writable = self
            .connection
            .poll_write(self.timeout)
            .map_err(|_| Error::WriteError)?;
        if !writable {
            return Err(Error::Timeout);
        }
        match self.connection.write(buf) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) if n < buf.len() => return Err(Error::ShortWrite),
            Ok(_) => {}
            Err(_) => return Err(Error::WriteError),
        }
        self.connection.flush().map_err(|_| Error::WriteError)
    }

    /// Closes the underlying connection, ignoring errors.
    pub fn shutdown(self) {
        // The stream is being abandoned either way.
        let _ = self.connection.close();
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Get a mutable reference to the underlying connection
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }
}
