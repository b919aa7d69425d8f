//! # greenfinger-mqtt
//!
//! The MQTT 3.1.1 client of the greenfinger plant-watering controller. It
//! opens a session with a broker over any byte stream, publishes sensor
//! readings with QoS 0 or 1, receives commands on subscribed topics, tracks
//! acknowledgments with timeouts and reconnects on its own when the link
//! drops. The crate is `no_std` and allocation-free unless the `std` feature
//! is enabled.
//!
//! ## Layout
//!
//! - [`network`]: the byte-stream traits, the readiness-polled
//!   [`Transport`](network::transport::Transport), the error type, and the
//!   MQTT client under [`network::application::mqtt`]
//! - [`time`]: the monotonic [`Clock`](time::Clock) and the
//!   [`Delay`](time::Delay) the reconnect backoff sleeps on
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! greenfinger-mqtt = "0.1.0"
//! ```
//!
//! Broker settings usually come from the device configuration file:
//!
//! ```rust
//! use greenfinger_mqtt::network::application::mqtt::{Config, QoS};
//!
//! let json = r#"{
//!     "client_id": "greenfinger1",
//!     "server": "192.168.1.10",
//!     "keepalive": 60,
//!     "last_will": {"topic": "greenfinger1/status", "message": "offline", "qos": 1, "retain": true}
//! }"#;
//! let options = Config::from_json(json)?.options()?;
//!
//! assert_eq!(options.port(), 1883);
//! assert_eq!(options.last_will.map(|will| will.qos), Some(QoS::AtLeastOnce));
//! # Ok::<(), greenfinger_mqtt::network::error::Error>(())
//! ```
//!
//! The options, a [`Connect`](network::Connect) implementation and a clock
//! make a [`Client`](network::application::mqtt::Client); see its module
//! documentation for the polling loop.
//!
//! ## Optional Features
//!
//! - `std`: `std::net` TCP connector, wall-clock [`Clock`](time::Clock) and
//!   sleeping [`Delay`](time::Delay), `std::error::Error` for the error type
//! - `defmt`: `defmt` formatting and logging for embedded debugging
//! - `log`: logging through the `log` facade on hosted targets

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

// Must come first so the logging macros are visible to the other modules.
#[macro_use]
mod fmt;

/// Network abstraction layer and the MQTT client built on it.
pub mod network;

/// Monotonic time and delays.
pub mod time;
