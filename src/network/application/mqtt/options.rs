//! Client identity and tuning knobs.

use core::time::Duration;

use super::packet::{Connect, LastWill};
use crate::network::{Remote, TlsParams};

/// Broker port used when [`Options::port`] is 0 and TLS is off.
pub const DEFAULT_PORT: u16 = 1883;
/// Broker port used when [`Options::port`] is 0 and TLS is on.
pub const DEFAULT_TLS_PORT: u16 = 8883;
/// Default bound on every wait for socket readiness.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(5);
/// Default time to wait for a PUBACK or SUBACK.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default window [`check_message`](super::Client::check_message) waits for data.
pub const DEFAULT_POLL_WINDOW: Duration = Duration::from_millis(1);

/// Configuration options for the MQTT client.
///
/// These are fixed when the client is built and never change afterwards;
/// every (re)connect sends the same identity to the broker.
///
/// # Examples
///
/// ```rust
/// use core::time::Duration;
/// use greenfinger_mqtt::network::application::mqtt::{LastWill, Options, QoS};
///
/// let mut options = Options::new("greenfinger1", "192.168.1.10");
/// options.keep_alive_seconds = 60;
/// options.message_timeout = Duration::from_secs(5);
/// options.last_will = Some(LastWill {
///     topic: "greenfinger1/status",
///     message: b"offline",
///     qos: QoS::AtLeastOnce,
///     retain: true,
/// });
///
/// assert_eq!(options.port(), 1883);
/// ```
#[derive(Debug, Clone)]
pub struct Options<'a> {
    /// The client identifier, must be unique within the broker.
    pub client_id: &'a str,

    /// Broker host name or address literal.
    pub host: &'a str,

    /// Broker port; 0 picks [`DEFAULT_PORT`] or [`DEFAULT_TLS_PORT`].
    pub port: u16,

    /// Optional user name.
    pub username: Option<&'a str>,

    /// Optional password; ignored without a user name.
    pub password: Option<&'a [u8]>,

    /// The keep-alive time interval in seconds.
    ///
    /// The client only announces it. Sending [`ping`](super::Client::ping)
    /// often enough is up to the caller. A value of 0 disables keep-alive.
    pub keep_alive_seconds: u16,

    /// Message the broker publishes if the client vanishes.
    pub last_will: Option<LastWill<'a>>,

    /// `Some` to ask the connector for an encrypted stream.
    pub tls: Option<TlsParams<'a>>,

    /// Bound on every wait for socket readiness; `None` waits forever.
    pub socket_timeout: Option<Duration>,

    /// How long a QoS 1 publish or a subscription waits for its acknowledgment.
    pub message_timeout: Duration,

    /// How long [`check_message`](super::Client::check_message) waits for
    /// the first byte of a packet.
    pub poll_window: Duration,
}

impl<'a> Options<'a> {
    /// Options with the defaults for everything but identity and broker.
    pub fn new(client_id: &'a str, host: &'a str) -> Self {
        Self {
            client_id,
            host,
            port: 0,
            username: None,
            password: None,
            keep_alive_seconds: 0,
            last_will: None,
            tls: None,
            socket_timeout: Some(DEFAULT_SOCKET_TIMEOUT),
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            poll_window: DEFAULT_POLL_WINDOW,
        }
    }

    /// The port actually dialed.
    pub fn port(&self) -> u16 {
        match (self.port, self.tls.is_some()) {
            (0, false) => DEFAULT_PORT,
            (0, true) => DEFAULT_TLS_PORT,
            (port, _) => port,
        }
    }

    /// Where the connector should dial.
    pub fn remote(&self) -> Remote<'_> {
        Remote {
            host: self.host,
            port: self.port(),
            tls: self.tls.as_ref(),
        }
    }

    /// The CONNECT packet for this identity.
    pub fn connect_packet(&self, clean_session: bool) -> Connect<'a> {
        Connect {
            client_id: self.client_id,
            keep_alive: self.keep_alive_seconds,
            clean_session,
            last_will: self.last_will,
            username: self.username,
            password: self.password,
        }
    }
}
