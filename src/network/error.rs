//! Common error types for network operations

use core::fmt;

/// Why a broker refused a CONNECT, decoded from the CONNACK return code.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RefusalReason {
    /// Return code 1: the broker does not speak protocol level 4.
    UnacceptableProtocolVersion,
    /// Return code 2: the client identifier is not allowed.
    IdentifierRejected,
    /// Return code 3: the MQTT service is unavailable.
    ServerUnavailable,
    /// Return code 4: malformed user name or password.
    BadCredentials,
    /// Return code 5: the client is not authorized to connect.
    NotAuthorized,
    /// Any other non-zero return code.
    Unknown(u8),
}

impl RefusalReason {
    /// Maps a non-zero CONNACK return code to a refusal reason.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => RefusalReason::UnacceptableProtocolVersion,
            2 => RefusalReason::IdentifierRejected,
            3 => RefusalReason::ServerUnavailable,
            4 => RefusalReason::BadCredentials,
            5 => RefusalReason::NotAuthorized,
            other => RefusalReason::Unknown(other),
        }
    }
}

impl fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefusalReason::UnacceptableProtocolVersion => f.write_str("unacceptable protocol version"),
            RefusalReason::IdentifierRejected => f.write_str("identifier rejected"),
            RefusalReason::ServerUnavailable => f.write_str("server unavailable"),
            RefusalReason::BadCredentials => f.write_str("bad user name or password"),
            RefusalReason::NotAuthorized => f.write_str("not authorized"),
            RefusalReason::Unknown(code) => write!(f, "unknown refusal code {}", code),
        }
    }
}

/// A common error type for network operations.
///
/// This enum defines the errors that can occur when talking to a broker. It is
/// designed to be simple and portable for `no_std` environments: every
/// variant is `Copy` and carries at most a few bytes of context.
///
/// The variants fall into two categories, see [`Error::is_transport`]:
/// transport failures, which a reconnect can cure, and everything else, which
/// a reconnect cannot.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a client with no open transport.
    NotOpen,
    /// The underlying connection reported a write failure.
    WriteError,
    /// The underlying connection reported a read failure.
    ReadError,
    /// A write made progress but did not transfer the whole buffer.
    ShortWrite,
    /// No readiness within the socket timeout.
    Timeout,
    /// The peer closed the connection.
    ConnectionClosed,
    /// The remote host name could not be resolved.
    InvalidAddress,
    /// The transport to the remote host could not be opened.
    Unreachable,
    /// The broker answered CONNECT with a non-zero return code.
    ConnectionRefused(RefusalReason),
    /// Malformed or unexpected bytes from the peer.
    ProtocolViolation,
    /// A value does not fit its wire representation.
    Encoding,
    /// The client is missing configuration required by the operation.
    Configuration,
    /// The broker answered SUBSCRIBE with the failure code 0x80.
    SubscriptionRejected,
    /// The operation or packet needs a feature this client does not have.
    Unsupported,
    /// A fixed-capacity buffer or table is full.
    BufferOverflow,
}

impl Error {
    /// Whether this error means the transport is unusable.
    ///
    /// These are the only errors the resilient wrapper answers with a
    /// reconnect. Protocol, encoding and configuration errors are not.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::NotOpen
                | Error::WriteError
                | Error::ReadError
                | Error::ShortWrite
                | Error::Timeout
                | Error::ConnectionClosed
                | Error::InvalidAddress
                | Error::Unreachable
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotOpen => f.write_str("transport not open"),
            Error::WriteError => f.write_str("write error"),
            Error::ReadError => f.write_str("read error"),
            Error::ShortWrite => f.write_str("short write"),
            Error::Timeout => f.write_str("timed out"),
            Error::ConnectionClosed => f.write_str("connection closed"),
            Error::InvalidAddress => f.write_str("invalid address"),
            Error::Unreachable => f.write_str("remote unreachable"),
            Error::ConnectionRefused(reason) => write!(f, "connection refused: {}", reason),
            Error::ProtocolViolation => f.write_str("protocol violation"),
            Error::Encoding => f.write_str("value out of encodable range"),
            Error::Configuration => f.write_str("configuration error"),
            Error::SubscriptionRejected => f.write_str("subscription rejected"),
            Error::Unsupported => f.write_str("unsupported"),
            Error::BufferOverflow => f.write_str("buffer overflow"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::ShortWrite => defmt::write!(f, "ShortWrite"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
            Error::InvalidAddress => defmt::write!(f, "InvalidAddress"),
            Error::Unreachable => defmt::write!(f, "Unreachable"),
            Error::ConnectionRefused(reason) => defmt::write!(f, "ConnectionRefused({})", reason),
            Error::ProtocolViolation => defmt::write!(f, "ProtocolViolation"),
            Error::Encoding => defmt::write!(f, "Encoding"),
            Error::Configuration => defmt::write!(f, "Configuration"),
            Error::SubscriptionRejected => defmt::write!(f, "SubscriptionRejected"),
            Error::Unsupported => defmt::write!(f, "Unsupported"),
            Error::BufferOverflow => defmt::write!(f, "BufferOverflow"),
        }
    }
}
