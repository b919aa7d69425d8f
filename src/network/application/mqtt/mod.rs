//! MQTT 3.1.1 protocol implementation for embedded systems.
//!
//! This module provides an MQTT 3.1.1 client designed for embedded systems and
//! `no_std` environments. MQTT (Message Queuing Telemetry Transport) is a
//! lightweight publish-subscribe messaging protocol ideal for IoT applications.
//!
//! # Protocol Overview
//!
//! MQTT uses a publish-subscribe pattern where:
//! - **Publishers** send messages to topics
//! - **Subscribers** receive messages from topics they're interested in
//! - **Brokers** route messages between publishers and subscribers
//!
//! # Key Features
//!
//! - Quality of Service levels 0 and 1, with acknowledgment timeouts
//! - Clean session and persistent session support
//! - Last will and credentials
//! - Automatic reconnect with linear backoff ([`RobustClient`])
//! - Fixed-size buffers, no heap allocation
//!
//! # Layers
//!
//! From the bottom up: [`varint`] and [`packet`] do the framing, [`pending`]
//! tracks what awaits acknowledgment, [`client`] runs one session over a
//! [`Transport`](crate::network::transport::Transport), and [`robust`] keeps
//! that session alive. [`options`] and [`config`] describe who to connect as.

/// Remaining-length integer codec.
pub mod varint;

/// Control packet types, encoding and decoding.
pub mod packet;

/// Packet identifiers and the acknowledgment tracker.
pub mod pending;

/// Client identity and timeouts.
pub mod options;

/// JSON device configuration.
pub mod config;

/// The session client.
pub mod client;

/// Reconnecting wrapper around [`Client`].
pub mod robust;

pub use client::{Client, Delivery, Incoming, MessageHandler, NoHandler, State, StatusHandler};
pub use config::Config;
pub use options::Options;
pub use packet::{LastWill, Packet, QoS};
pub use pending::{PacketIds, PendingAcks};
pub use robust::{LinearBackoff, RetryPolicy, RobustClient};
