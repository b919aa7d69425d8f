//! # Application Layer Network Protocols
//!
//! Application layer (OSI Layer 7) protocols written against the core network
//! traits. Currently this is the MQTT client the controller uses to report
//! readings and receive commands.
//!
//! ## Design Principles
//!
//! - **Connection Agnostic**: Work with any type implementing [`Connection`](crate::network::Connection)
//! - **No-std Compatible**: Designed for embedded systems without heap allocation
//! - **Resource Conscious**: Use fixed-size buffers and minimal memory

/// MQTT (Message Queuing Telemetry Transport) client implementation.
///
/// Provides an MQTT 3.1.1 client for publish-subscribe messaging with QoS 0
/// and 1, acknowledgment tracking and automatic reconnect.
pub mod mqtt;
