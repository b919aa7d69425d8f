//! Plain TCP over `std::net`.
//!
//! Readiness is emulated with a read timeout plus `peek`. There is no TLS
//! here: a [`Remote`] asking for it is rejected with [`Error::Unsupported`].

use std::io::{self, Read as StdRead, Write as StdWrite};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::network::error::Error;
use crate::network::{Close, Connect, Connection, Read, Readiness, Remote, Write};

/// The smallest timeout `set_read_timeout` accepts; zero is an error there.
const MIN_POLL: Duration = Duration::from_millis(1);

/// Opens [`TcpConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector {
    /// Bound on the TCP handshake; `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
}

impl TcpConnector {
    /// A connector with an optional handshake timeout.
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

impl Connect for TcpConnector {
    type Connection = TcpConnection;
    type Error = Error;

    fn connect(&mut self, remote: &Remote<'_>) -> Result<Self::Connection, Self::Error> {
        if remote.tls.is_some() {
            return Err(Error::Unsupported);
        }

        let addr = (remote.host, remote.port)
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress)?
            .next()
            .ok_or(Error::InvalidAddress)?;

        let stream = match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout.max(MIN_POLL)),
            None => TcpStream::connect(addr),
        }
        .map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Unreachable,
        })?;
        stream.set_nodelay(true).map_err(|_| Error::Unreachable)?;

        Ok(TcpConnection { stream })
    }
}

/// A connected TCP stream.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl TcpConnection {
    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Read for TcpConnection {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.stream.read(buf)
    }
}

impl Write for TcpConnection {
    type Error = io::Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush()
    }
}

impl Readiness for TcpConnection {
    type Error = io::Error;

    fn poll_read(&mut self, timeout: Option<Duration>) -> Result<bool, Self::Error> {
        self.stream.set_read_timeout(timeout.map(|t| t.max(MIN_POLL)))?;
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            // Zero bytes is EOF, which the following read reports.
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn poll_write(&mut self, timeout: Option<Duration>) -> Result<bool, Self::Error> {
        self.stream.set_write_timeout(timeout.map(|t| t.max(MIN_POLL)))?;
        Ok(true)
    }
}

impl Close for TcpConnection {
    type Error = io::Error;

    fn close(self) -> Result<(), Self::Error> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

impl Connection for TcpConnection {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::TlsParams;

    #[test]
    fn test_tls_is_rejected() {
        let params = TlsParams::default();
        let remote = Remote {
            host: "127.0.0.1",
            port: 8883,
            tls: Some(&params),
        };
        let mut connector = TcpConnector::default();
        assert_eq!(connector.connect(&remote).err(), Some(Error::Unsupported));
    }

    #[test]
    fn test_peer_close_is_readable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let remote = Remote {
            host: "127.0.0.1",
            port,
            tls: None,
        };
        let mut connection = TcpConnector::default().connect(&remote).unwrap();
        let (peer, _) = listener.accept().unwrap();

        // Nothing sent yet: the poll window elapses.
        assert!(!connection.poll_read(Some(Duration::from_millis(10))).unwrap());

        drop(peer);
        assert!(connection.poll_read(Some(Duration::from_secs(1))).unwrap());
        let mut buf = [0u8; 1];
        assert_eq!(connection.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_accepted_stream_round_trip() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let remote = Remote {
            host: "127.0.0.1",
            port,
            tls: None,
        };
        let mut client = TcpConnector::default().connect(&remote).unwrap();
        let (stream, _) = listener.accept().unwrap();
        let mut server = TcpConnection::from_stream(stream);

        assert!(server.poll_write(Some(Duration::from_secs(1))).unwrap());
        assert_eq!(server.write(&[0xD0, 0x00]).unwrap(), 2);
        server.flush().unwrap();

        assert!(client.poll_read(Some(Duration::from_secs(1))).unwrap());
        let mut buf = [0u8; 2];
        let mut read = 0;
        while read < buf.len() {
            read += client.read(&mut buf[read..]).unwrap();
        }
        assert_eq!(buf, [0xD0, 0x00]);
        server.close().unwrap();
    }
}
