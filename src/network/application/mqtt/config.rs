//! Device configuration read from JSON.
//!
//! Firmware keeps its broker settings in a small JSON document next to the
//! Wi-Fi credentials. [`Config`] is that document, parsed in place with
//! `serde-json-core` (strings borrow from the input, so they must not contain
//! escape sequences) and turned into [`Options`] by [`Config::options`].
//!
//! ```json
//! {
//!   "client_id": "greenfinger1",
//!   "server": "192.168.1.10",
//!   "port": 1883,
//!   "user": "plants",
//!   "password": "hunter2",
//!   "keepalive": 60,
//!   "socket_timeout_ms": 5000,
//!   "message_timeout_ms": 10000,
//!   "last_will": { "topic": "greenfinger1/status", "message": "offline", "qos": 1, "retain": true }
//! }
//! ```

use core::time::Duration;

use serde::Deserialize;

use super::options::{DEFAULT_MESSAGE_TIMEOUT, DEFAULT_SOCKET_TIMEOUT, Options};
use super::packet::{LastWill, QoS};
use crate::network::TlsParams;
use crate::network::error::Error;

fn default_socket_timeout_ms() -> Option<u32> {
    Some(DEFAULT_SOCKET_TIMEOUT.as_millis() as u32)
}

fn default_message_timeout_ms() -> u32 {
    DEFAULT_MESSAGE_TIMEOUT.as_millis() as u32
}

/// Last will as written in the configuration file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WillConfig<'a> {
    /// Will topic.
    pub topic: &'a str,
    /// Will payload, as text.
    pub message: &'a str,
    /// Will QoS, 0 to 2.
    #[serde(default)]
    pub qos: u8,
    /// Whether the will is retained.
    #[serde(default)]
    pub retain: bool,
}

/// Broker settings as written in the configuration file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config<'a> {
    /// Client identifier.
    pub client_id: &'a str,
    /// Broker host.
    pub server: &'a str,
    /// Broker port, 0 or absent for the default.
    #[serde(default)]
    pub port: u16,
    /// Optional user name.
    #[serde(default, borrow)]
    pub user: Option<&'a str>,
    /// Optional password.
    #[serde(default, borrow)]
    pub password: Option<&'a str>,
    /// Keep-alive interval in seconds.
    #[serde(default)]
    pub keepalive: u16,
    /// Ask the connector for TLS.
    #[serde(default)]
    pub ssl: bool,
    /// Server name for TLS verification.
    #[serde(default, borrow)]
    pub ssl_server_name: Option<&'a str>,
    /// Socket readiness timeout in milliseconds, `null` to wait forever.
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: Option<u32>,
    /// Acknowledgment timeout in milliseconds.
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u32,
    /// Optional last will.
    #[serde(default, borrow)]
    pub last_will: Option<WillConfig<'a>>,
}

impl<'a> Config<'a> {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the document is not valid JSON or misses
    /// a required field.
    pub fn from_json(json: &'a str) -> Result<Self, Error> {
        match serde_json_core::from_str::<Config<'a>>(json) {
            Ok((config, _)) => Ok(config),
            Err(_) => {
                warn!("broker configuration could not be parsed");
                Err(Error::Configuration)
            }
        }
    }

    /// Client options for this configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for an empty client id or server, or a will
    /// QoS above 2.
    pub fn options(&self) -> Result<Options<'a>, Error> {
        if self.client_id.is_empty() || self.server.is_empty() {
            return Err(Error::Configuration);
        }

        let mut options = Options::new(self.client_id, self.server);
        options.port = self.port;
        options.username = self.user;
        options.password = self.password.map(str::as_bytes);
        options.keep_alive_seconds = self.keepalive;
        options.socket_timeout = self
            .socket_timeout_ms
            .map(|ms| Duration::from_millis(ms as u64));
        options.message_timeout = Duration::from_millis(self.message_timeout_ms as u64);
        if self.ssl {
            options.tls = Some(TlsParams {
                server_name: self.ssl_server_name,
                ..TlsParams::default()
            });
        }
        if let Some(will) = &self.last_will {
            options.last_will = Some(LastWill {
                topic: will.topic,
                message: will.message.as_bytes(),
                qos: QoS::from_bits(will.qos).map_err(|_| Error::Configuration)?,
                retain: will.retain,
            });
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_json(r#"{"client_id":"gf1","server":"10.0.0.2"}"#).unwrap();
        let options = config.options().unwrap();
        assert_eq!(options.client_id, "gf1");
        assert_eq!(options.host, "10.0.0.2");
        assert_eq!(options.port(), 1883);
        assert_eq!(options.socket_timeout, Some(DEFAULT_SOCKET_TIMEOUT));
        assert_eq!(options.message_timeout, DEFAULT_MESSAGE_TIMEOUT);
        assert!(options.last_will.is_none());
        assert!(options.tls.is_none());
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "client_id": "greenfinger1",
            "server": "broker.local",
            "user": "plants",
            "password": "hunter2",
            "keepalive": 60,
            "ssl": true,
            "ssl_server_name": "broker.local",
            "socket_timeout_ms": null,
            "message_timeout_ms": 2500,
            "last_will": {"topic": "greenfinger1/status", "message": "offline", "qos": 1, "retain": true}
        }"#;
        let options = Config::from_json(json).unwrap().options().unwrap();
        assert_eq!(options.port(), 8883);
        assert_eq!(options.username, Some("plants"));
        assert_eq!(options.password, Some(&b"hunter2"[..]));
        assert_eq!(options.keep_alive_seconds, 60);
        assert_eq!(options.socket_timeout, None);
        assert_eq!(options.message_timeout, Duration::from_millis(2500));
        assert_eq!(options.tls.unwrap().server_name, Some("broker.local"));
        let will = options.last_will.unwrap();
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
        assert_eq!(will.message, b"offline");
    }

    #[test]
    fn test_invalid_configs() {
        assert_eq!(Config::from_json("{"), Err(Error::Configuration));
        assert_eq!(
            Config::from_json(r#"{"server":"x"}"#),
            Err(Error::Configuration)
        );
        let config = Config::from_json(
            r#"{"client_id":"c","server":"s","last_will":{"topic":"t","message":"m","qos":3}}"#,
        )
        .unwrap();
        assert_eq!(config.options().err(), Some(Error::Configuration));
        let empty = Config::from_json(r#"{"client_id":"","server":"s"}"#).unwrap();
        assert_eq!(empty.options().err(), Some(Error::Configuration));
    }
}
