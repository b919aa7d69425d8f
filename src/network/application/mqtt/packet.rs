//! MQTT 3.1.1 control packets.
//!
//! Every packet is a fixed header byte (type in the high nibble, flags in the
//! low nibble), a [`varint`](super::varint) remaining length and a
//! type-specific body. This module covers the nine packet types a QoS 0/1
//! client exchanges with a broker.
//!
//! Encoding streams straight into a [`Sink`] (a transport, or a heapless
//! buffer in tests) after validating every length up front, so a packet that
//! cannot be represented is rejected before its first byte is written.
//! Decoding works on a complete, already-read body and returns borrowed views
//! into it; it has no side effects, so a malformed packet cannot leave the
//! client half-updated.

use heapless::Vec;

use super::varint;
use crate::network::Connection;
use crate::network::error::Error;
use crate::network::transport::Transport;

// MQTT Control Packet types - these are the fixed header packet type values
/// MQTT CONNECT packet type identifier.
pub const CONNECT: u8 = 0x10;
/// MQTT CONNACK packet type identifier.
pub const CONNACK: u8 = 0x20;
/// MQTT PUBLISH packet type identifier (flags clear).
pub const PUBLISH: u8 = 0x30;
/// MQTT PUBACK packet type identifier.
pub const PUBACK: u8 = 0x40;
/// MQTT SUBSCRIBE packet type identifier, including its mandatory 0x2 flags.
pub const SUBSCRIBE: u8 = 0x82;
/// MQTT SUBACK packet type identifier.
pub const SUBACK: u8 = 0x90;
/// MQTT PINGREQ packet type identifier.
pub const PINGREQ: u8 = 0xC0;
/// MQTT PINGRESP packet type identifier.
pub const PINGRESP: u8 = 0xD0;
/// MQTT DISCONNECT packet type identifier.
pub const DISCONNECT: u8 = 0xE0;

/// SUBACK return code for a refused subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

// Protocol constants defined by MQTT 3.1.1 specification
/// MQTT protocol name as defined in the specification.
const PROTOCOL_NAME: &[u8] = b"MQTT";
/// MQTT protocol level for version 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// Protocol name, level, connect flags and keep-alive.
const CONNECT_HEADER_LEN: usize = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2;

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

const PUBLISH_RETAIN: u8 = 0x01;
const PUBLISH_DUP: u8 = 0x08;

/// Quality of Service levels for MQTT messages.
///
/// The client sends and receives QoS 0 and 1. `ExactlyOnce` exists so the
/// codec can represent what a broker puts on the wire, and so a QoS 2
/// request can be turned away explicitly.
///
/// # Examples
///
/// ```rust
/// use greenfinger_mqtt::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::AtLeastOnce as u8, 1);
/// assert_eq!(QoS::from_bits(2), Ok(QoS::ExactlyOnce));
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// **QoS 0**: At most once delivery, fire and forget.
    #[default]
    AtMostOnce = 0,
    /// **QoS 1**: At least once delivery, acknowledged and possibly duplicated.
    AtLeastOnce = 1,
    /// **QoS 2**: Exactly once delivery. Not supported by the client.
    ExactlyOnce = 2,
}

impl QoS {
    /// Parses the two-bit wire value.
    ///
    /// # Errors
    ///
    /// [`Error::ProtocolViolation`] for 3 or any value wider than two bits.
    pub fn from_bits(bits: u8) -> Result<Self, Error> {
        match bits {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::ProtocolViolation),
        }
    }
}

/// A message the broker publishes on the client's behalf if it drops off
/// the network without a DISCONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastWill<'a> {
    /// Topic the will is published to.
    pub topic: &'a str,
    /// Will payload.
    pub message: &'a [u8],
    /// QoS the broker uses for the will.
    pub qos: QoS,
    /// Whether the broker retains the will.
    pub retain: bool,
}

/// CONNECT: opens a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connect<'a> {
    /// Client identifier.
    pub client_id: &'a str,
    /// Keep-alive interval in seconds, 0 disables it.
    pub keep_alive: u16,
    /// Discard any previous session state on the broker.
    pub clean_session: bool,
    /// Optional last will.
    pub last_will: Option<LastWill<'a>>,
    /// Optional user name.
    pub username: Option<&'a str>,
    /// Optional password. Only sent together with a user name.
    pub password: Option<&'a [u8]>,
}

/// CONNACK: the broker's answer to CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// The broker resumed a stored session.
    pub session_present: bool,
    /// 0 on success, otherwise a refusal code.
    pub return_code: u8,
}

impl ConnAck {
    /// Parses the four-byte CONNACK frame read right after CONNECT.
    ///
    /// The fixed header must be exactly `0x20 0x02`. Only the session-present
    /// bit of the acknowledge-flags byte is looked at.
    ///
    /// # Errors
    ///
    /// [`Error::ProtocolViolation`] if the fixed header is anything else.
    pub fn from_frame(frame: &[u8; 4]) -> Result<Self, Error> {
        if frame[0] != CONNACK || frame[1] != 0x02 {
            return Err(Error::ProtocolViolation);
        }
        Ok(Self {
            session_present: frame[2] & 0x01 != 0,
            return_code: frame[3],
        })
    }

    /// Turns the return code into the session-present flag or a refusal.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionRefused`] with the decoded reason for any non-zero code.
    pub fn accept(&self) -> Result<bool, Error> {
        match self.return_code {
            0 => Ok(self.session_present),
            code => Err(Error::ConnectionRefused(
                crate::network::error::RefusalReason::from_code(code),
            )),
        }
    }
}

/// PUBLISH: an application message, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publish<'a> {
    /// Topic name.
    pub topic: &'a str,
    /// Message payload.
    pub payload: &'a [u8],
    /// Delivery QoS.
    pub qos: QoS,
    /// Packet identifier, present exactly when `qos` is above 0.
    pub pid: Option<u16>,
    /// Retain flag.
    pub retain: bool,
    /// Duplicate-delivery flag.
    pub dup: bool,
}

/// SUBSCRIBE with a single topic filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscribe<'a> {
    /// Packet identifier.
    pub pid: u16,
    /// Topic filter, wildcards allowed.
    pub topic: &'a str,
    /// Maximum QoS requested for the filter.
    pub qos: QoS,
}

/// SUBACK for a single-filter SUBSCRIBE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubAck {
    /// Packet identifier of the SUBSCRIBE being acknowledged.
    pub pid: u16,
    /// Granted QoS, or [`SUBACK_FAILURE`].
    pub return_code: u8,
}

impl SubAck {
    /// The granted QoS.
    ///
    /// # Errors
    ///
    /// [`Error::SubscriptionRejected`] if the broker returned [`SUBACK_FAILURE`].
    pub fn granted(&self) -> Result<QoS, Error> {
        match self.return_code {
            SUBACK_FAILURE => Err(Error::SubscriptionRejected),
            code => QoS::from_bits(code),
        }
    }
}

/// An MQTT control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Session request.
    Connect(Connect<'a>),
    /// Session response.
    ConnAck(ConnAck),
    /// Application message.
    Publish(Publish<'a>),
    /// QoS 1 publish acknowledgment.
    PubAck(u16),
    /// Subscription request.
    Subscribe(Subscribe<'a>),
    /// Subscription response.
    SubAck(SubAck),
    /// Keep-alive probe.
    PingReq,
    /// Keep-alive answer.
    PingResp,
    /// Orderly session end.
    Disconnect,
}

/// Somewhere encoded packet bytes can go.
pub trait Sink {
    /// Appends `bytes`, entirely or not at all.
    fn put(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

impl<const N: usize> Sink for Vec<u8, N> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.extend_from_slice(bytes)
            .map_err(|_| Error::BufferOverflow)
    }
}

impl<C: Connection> Sink for Transport<C> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_all(bytes)
    }
}

/// Length of a 2-byte-prefixed string field.
fn prefixed_len(bytes: &[u8]) -> Result<usize, Error> {
    if bytes.len() > u16::MAX as usize {
        return Err(Error::Encoding);
    }
    Ok(2 + bytes.len())
}

fn put_u16<W: Sink>(out: &mut W, value: u16) -> Result<(), Error> {
    out.put(&value.to_be_bytes())
}

/// Writes a 2-byte big-endian length followed by the raw bytes.
fn put_prefixed<W: Sink>(out: &mut W, bytes: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(bytes.len()).map_err(|_| Error::Encoding)?;
    put_u16(out, len)?;
    out.put(bytes)
}

fn require_pid(pid: u16) -> Result<u16, Error> {
    if pid == 0 {
        return Err(Error::Encoding);
    }
    Ok(pid)
}

impl<'a> Connect<'a> {
    /// The password actually sent: the protocol forbids one without a user name.
    fn effective_password(&self) -> Option<&'a [u8]> {
        self.username.and(self.password)
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }
        if let Some(will) = &self.last_will {
            flags |= FLAG_WILL | (will.qos as u8) << 3;
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.effective_password().is_some() {
            flags |= FLAG_PASSWORD;
        }
        flags
    }

    fn remaining_len(&self) -> Result<usize, Error> {
        let mut len = CONNECT_HEADER_LEN + prefixed_len(self.client_id.as_bytes())?;
        if let Some(will) = &self.last_will {
            len += prefixed_len(will.topic.as_bytes())? + prefixed_len(will.message)?;
        }
        if let Some(username) = self.username {
            len += prefixed_len(username.as_bytes())?;
        }
        if let Some(password) = self.effective_password() {
            len += prefixed_len(password)?;
        }
        Ok(len)
    }

    fn encode_body<W: Sink>(&self, out: &mut W) -> Result<(), Error> {
        let mut header = [0u8; CONNECT_HEADER_LEN];
        header[..2].copy_from_slice(&(PROTOCOL_NAME.len() as u16).to_be_bytes());
        header[2..6].copy_from_slice(PROTOCOL_NAME);
        header[6] = PROTOCOL_LEVEL;
        header[7] = self.flags();
        header[8..].copy_from_slice(&self.keep_alive.to_be_bytes());
        out.put(&header)?;

        put_prefixed(out, self.client_id.as_bytes())?;
        if let Some(will) = &self.last_will {
            put_prefixed(out, will.topic.as_bytes())?;
            put_prefixed(out, will.message)?;
        }
        if let Some(username) = self.username {
            put_prefixed(out, username.as_bytes())?;
        }
        if let Some(password) = self.effective_password() {
            put_prefixed(out, password)?;
        }
        Ok(())
    }
}

impl Publish<'_> {
    fn header_byte(&self) -> u8 {
        let mut byte = PUBLISH | (self.qos as u8) << 1;
        if self.dup {
            byte |= PUBLISH_DUP;
        }
        if self.retain {
            byte |= PUBLISH_RETAIN;
        }
        byte
    }

    fn remaining_len(&self) -> Result<usize, Error> {
        let pid_len = match (self.qos, self.pid) {
            (QoS::AtMostOnce, None) => 0,
            (QoS::AtMostOnce, Some(_)) | (_, None) => return Err(Error::Encoding),
            (_, Some(pid)) => {
                require_pid(pid)?;
                2
            }
        };
        Ok(prefixed_len(self.topic.as_bytes())? + pid_len + self.payload.len())
    }

    fn encode_body<W: Sink>(&self, out: &mut W) -> Result<(), Error> {
        put_prefixed(out, self.topic.as_bytes())?;
        if let Some(pid) = self.pid {
            put_u16(out, pid)?;
        }
        out.put(self.payload)
    }
}

impl<'a> Packet<'a> {
    /// The fixed header byte, type and flags.
    pub fn header_byte(&self) -> u8 {
        match self {
            Packet::Connect(_) => CONNECT,
            Packet::ConnAck(_) => CONNACK,
            Packet::Publish(publish) => publish.header_byte(),
            Packet::PubAck(_) => PUBACK,
            Packet::Subscribe(_) => SUBSCRIBE,
            Packet::SubAck(_) => SUBACK,
            Packet::PingReq => PINGREQ,
            Packet::PingResp => PINGRESP,
            Packet::Disconnect => DISCONNECT,
        }
    }

    /// Size of the body in bytes, validating every field length on the way.
    fn remaining_len(&self) -> Result<u32, Error> {
        let len = match self {
            Packet::Connect(connect) => connect.remaining_len()?,
            Packet::ConnAck(_) => 2,
            Packet::Publish(publish) => publish.remaining_len()?,
            Packet::PubAck(pid) => {
                require_pid(*pid)?;
                2
            }
            Packet::Subscribe(subscribe) => {
                require_pid(subscribe.pid)?;
                2 + prefixed_len(subscribe.topic.as_bytes())? + 1
            }
            Packet::SubAck(suback) => {
                require_pid(suback.pid)?;
                3
            }
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => 0,
        };
        let len = u32::try_from(len).map_err(|_| Error::Encoding)?;
        varint::encoded_len(len)?;
        Ok(len)
    }

    /// Total encoded size, fixed header included.
    ///
    /// # Errors
    ///
    /// [`Error::Encoding`] if any field or the packet as a whole is too long.
    pub fn encoded_len(&self) -> Result<usize, Error> {
        let remaining = self.remaining_len()?;
        Ok(1 + varint::encoded_len(remaining)? + remaining as usize)
    }

    /// Writes the packet to `out`.
    ///
    /// Nothing is written unless the whole packet is encodable.
    ///
    /// # Errors
    ///
    /// * [`Error::Encoding`] - A string longer than 65535 bytes, a body of
    ///   2^28 bytes or more, or a packet identifier that is 0 or missing
    /// * Any error returned by `out`
    pub fn encode<W: Sink>(&self, out: &mut W) -> Result<(), Error> {
        let remaining = self.remaining_len()?;
        let mut header = [0u8; 1 + varint::MAX_LEN];
        header[0] = self.header_byte();
        let mut len_buf = [0u8; varint::MAX_LEN];
        let len_bytes = varint::encode(remaining, &mut len_buf)?;
        header[1..1 + len_bytes].copy_from_slice(&len_buf[..len_bytes]);
        out.put(&header[..1 + len_bytes])?;

        match self {
            Packet::Connect(connect) => connect.encode_body(out),
            Packet::ConnAck(connack) => {
                out.put(&[connack.session_present as u8, connack.return_code])
            }
            Packet::Publish(publish) => publish.encode_body(out),
            Packet::PubAck(pid) => put_u16(out, *pid),
            Packet::Subscribe(subscribe) => {
                put_u16(out, subscribe.pid)?;
                put_prefixed(out, subscribe.topic.as_bytes())?;
                out.put(&[subscribe.qos as u8])
            }
            Packet::SubAck(suback) => {
                put_u16(out, suback.pid)?;
                out.put(&[suback.return_code])
            }
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => Ok(()),
        }
    }

    /// Decodes a packet from its fixed header byte and complete body.
    ///
    /// # Errors
    ///
    /// [`Error::ProtocolViolation`] for an unknown packet type, reserved or
    /// invalid flags, a truncated or over-long body, a zero packet identifier
    /// or a string that is not UTF-8.
    pub fn decode(header: u8, body: &'a [u8]) -> Result<Self, Error> {
        let flags = header & 0x0F;
        let mut cursor = Cursor::new(body);
        let packet = match header >> 4 {
            0x1 => {
                expect_flags(flags, 0)?;
                Packet::Connect(decode_connect(&mut cursor)?)
            }
            0x2 => {
                expect_flags(flags, 0)?;
                let ack_flags = cursor.u8()?;
                if ack_flags & 0xFE != 0 {
                    return Err(Error::ProtocolViolation);
                }
                Packet::ConnAck(ConnAck {
                    session_present: ack_flags & 0x01 != 0,
                    return_code: cursor.u8()?,
                })
            }
            0x3 => Packet::Publish(decode_publish(flags, &mut cursor)?),
            0x4 => {
                expect_flags(flags, 0)?;
                Packet::PubAck(cursor.pid()?)
            }
            0x8 => {
                expect_flags(flags, SUBSCRIBE & 0x0F)?;
                let pid = cursor.pid()?;
                let topic = cursor.str()?;
                let qos = QoS::from_bits(cursor.u8()?)?;
                Packet::Subscribe(Subscribe { pid, topic, qos })
            }
            0x9 => {
                expect_flags(flags, 0)?;
                let pid = cursor.pid()?;
                let return_code = cursor.u8()?;
                if return_code != SUBACK_FAILURE {
                    QoS::from_bits(return_code)?;
                }
                Packet::SubAck(SubAck { pid, return_code })
            }
            0xC => {
                expect_flags(flags, 0)?;
                Packet::PingReq
            }
            0xD => {
                expect_flags(flags, 0)?;
                Packet::PingResp
            }
            0xE => {
                expect_flags(flags, 0)?;
                Packet::Disconnect
            }
            _ => return Err(Error::ProtocolViolation),
        };
        cursor.finish()?;
        Ok(packet)
    }

    /// Decodes one complete frame from the front of `buf`.
    ///
    /// Returns the packet and the number of bytes it occupied.
    pub fn from_bytes(buf: &'a [u8]) -> Result<(Self, usize), Error> {
        let (&header, rest) = buf.split_first().ok_or(Error::ProtocolViolation)?;
        let (remaining, len_bytes) = varint::decode_slice(rest)?;
        let start = 1 + len_bytes;
        let end = start + remaining as usize;
        let body = buf.get(start..end).ok_or(Error::ProtocolViolation)?;
        Ok((Self::decode(header, body)?, end))
    }
}

fn expect_flags(flags: u8, expected: u8) -> Result<(), Error> {
    if flags != expected {
        return Err(Error::ProtocolViolation);
    }
    Ok(())
}

fn decode_connect<'a>(cursor: &mut Cursor<'a>) -> Result<Connect<'a>, Error> {
    if cursor.prefixed()? != PROTOCOL_NAME || cursor.u8()? != PROTOCOL_LEVEL {
        return Err(Error::ProtocolViolation);
    }
    let flags = cursor.u8()?;
    let keep_alive = cursor.u16()?;
    let has_will = flags & FLAG_WILL != 0;
    // Bit 0 is reserved; will QoS and retain must be clear without a will.
    if flags & 0x01 != 0 || (!has_will && flags & 0x38 != 0) {
        return Err(Error::ProtocolViolation);
    }
    if flags & FLAG_PASSWORD != 0 && flags & FLAG_USERNAME == 0 {
        return Err(Error::ProtocolViolation);
    }

    let client_id = cursor.str()?;
    let last_will = if has_will {
        Some(LastWill {
            topic: cursor.str()?,
            message: cursor.prefixed()?,
            qos: QoS::from_bits((flags >> 3) & 0x03)?,
            retain: flags & FLAG_WILL_RETAIN != 0,
        })
    } else {
        None
    };
    let username = match flags & FLAG_USERNAME {
        0 => None,
        _ => Some(cursor.str()?),
    };
    let password = match flags & FLAG_PASSWORD {
        0 => None,
        _ => Some(cursor.prefixed()?),
    };

    Ok(Connect {
        client_id,
        keep_alive,
        clean_session: flags & FLAG_CLEAN_SESSION != 0,
        last_will,
        username,
        password,
    })
}

fn decode_publish<'a>(flags: u8, cursor: &mut Cursor<'a>) -> Result<Publish<'a>, Error> {
    let qos = QoS::from_bits((flags >> 1) & 0x03)?;
    let dup = flags & PUBLISH_DUP != 0;
    if dup && qos == QoS::AtMostOnce {
        return Err(Error::ProtocolViolation);
    }
    let topic = cursor.str()?;
    let pid = match qos {
        QoS::AtMostOnce => None,
        _ => Some(cursor.pid()?),
    };
    Ok(Publish {
        topic,
        payload: cursor.rest(),
        qos,
        pid,
        retain: flags & PUBLISH_RETAIN != 0,
        dup,
    })
}

/// Bounds-checked reader over a packet body.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(n).ok_or(Error::ProtocolViolation)?;
        let bytes = self.buf.get(self.pos..end).ok_or(Error::ProtocolViolation)?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn pid(&mut self) -> Result<u16, Error> {
        match self.u16()? {
            0 => Err(Error::ProtocolViolation),
            pid => Ok(pid),
        }
    }

    fn prefixed(&mut self) -> Result<&'a [u8], Error> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    fn str(&mut self) -> Result<&'a str, Error> {
        core::str::from_utf8(self.prefixed()?).map_err(|_| Error::ProtocolViolation)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    fn finish(self) -> Result<(), Error> {
        if self.pos != self.buf.len() {
            return Err(Error::ProtocolViolation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::error::RefusalReason;

    fn encode(packet: &Packet<'_>) -> Vec<u8, 512> {
        let mut out = Vec::new();
        packet.encode(&mut out).unwrap();
        assert_eq!(out.len(), packet.encoded_len().unwrap());
        out
    }

    fn decode(buf: &[u8]) -> Packet<'_> {
        let (packet, used) = Packet::from_bytes(buf).unwrap();
        assert_eq!(used, buf.len());
        packet
    }

    #[test]
    fn test_connect_minimal_bytes() {
        let packet = Packet::Connect(Connect {
            client_id: "dev1",
            keep_alive: 60,
            clean_session: true,
            last_will: None,
            username: None,
            password: None,
        });
        let bytes = encode(&packet);
        assert_eq!(
            &bytes[..],
            &[
                0x10, 16, // fixed header
                0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, // protocol name, level
                0x02, // clean session only
                0x00, 0x3C, // keep-alive
                0x00, 0x04, b'd', b'e', b'v', b'1',
            ]
        );
        assert_eq!(decode(&bytes), packet);
    }

    #[test]
    fn test_connect_full_flags() {
        let connect = Connect {
            client_id: "greenfinger1",
            keep_alive: 0x1234,
            clean_session: false,
            last_will: Some(LastWill {
                topic: "greenfinger/status",
                message: b"offline",
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            username: Some("user"),
            password: Some(&b"secret"[..]),
        };
        let bytes = encode(&Packet::Connect(connect));
        // user | password | will retain | will qos 1 | will
        assert_eq!(bytes[9], 0x80 | 0x40 | 0x20 | 0x08 | 0x04);
        assert_eq!(&bytes[10..12], &[0x12, 0x34]);
        assert_eq!(decode(&bytes), Packet::Connect(connect));
    }

    #[test]
    fn test_connect_password_needs_username() {
        let connect = Connect {
            client_id: "c",
            keep_alive: 0,
            clean_session: true,
            last_will: None,
            username: None,
            password: Some(&b"orphan"[..]),
        };
        let bytes = encode(&Packet::Connect(connect));
        assert_eq!(bytes[9] & 0xC0, 0);
        match decode(&bytes) {
            Packet::Connect(decoded) => assert_eq!(decoded.password, None),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_connack_frames() {
        let ok = ConnAck::from_frame(&[0x20, 0x02, 0x00, 0x00]).unwrap();
        assert_eq!(ok.accept(), Ok(false));

        let resumed = ConnAck::from_frame(&[0x20, 0x02, 0x01, 0x00]).unwrap();
        assert_eq!(resumed.accept(), Ok(true));

        let refused = ConnAck::from_frame(&[0x20, 0x02, 0x00, 0x02]).unwrap();
        assert_eq!(
            refused.accept(),
            Err(Error::ConnectionRefused(RefusalReason::IdentifierRejected))
        );

        let unknown = ConnAck::from_frame(&[0x20, 0x02, 0x00, 0x07]).unwrap();
        assert_eq!(
            unknown.accept(),
            Err(Error::ConnectionRefused(RefusalReason::Unknown(7)))
        );

        assert_eq!(
            ConnAck::from_frame(&[0x20, 0x03, 0x00, 0x00]),
            Err(Error::ProtocolViolation)
        );
        assert_eq!(
            ConnAck::from_frame(&[0x90, 0x02, 0x00, 0x00]),
            Err(Error::ProtocolViolation)
        );
    }

    #[test]
    fn test_publish_qos1_round_trip() {
        let publish = Publish {
            topic: "t",
            payload: b"hi",
            qos: QoS::AtLeastOnce,
            pid: Some(0x0102),
            retain: false,
            dup: false,
        };
        let bytes = encode(&Packet::Publish(publish));
        assert_eq!(&bytes[..], &[0x32, 7, 0x00, 0x01, b't', 0x01, 0x02, b'h', b'i']);
        match decode(&bytes) {
            Packet::Publish(decoded) => {
                assert_eq!(decoded.topic, "t");
                assert_eq!(decoded.payload, b"hi");
                assert_eq!(decoded.pid, Some(0x0102));
                assert_eq!(decoded.qos, QoS::AtLeastOnce);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_publish_flags() {
        let publish = Publish {
            topic: "a/b",
            payload: b"",
            qos: QoS::AtLeastOnce,
            pid: Some(9),
            retain: true,
            dup: true,
        };
        let bytes = encode(&Packet::Publish(publish));
        assert_eq!(bytes[0], 0x30 | 0x08 | 0x02 | 0x01);
        assert_eq!(decode(&bytes), Packet::Publish(publish));
    }

    #[test]
    fn test_publish_pid_must_match_qos() {
        let mut out: Vec<u8, 64> = Vec::new();
        let missing = Publish {
            topic: "t",
            payload: b"x",
            qos: QoS::AtLeastOnce,
            pid: None,
            retain: false,
            dup: false,
        };
        assert_eq!(Packet::Publish(missing).encode(&mut out), Err(Error::Encoding));
        let extra = Publish {
            qos: QoS::AtMostOnce,
            pid: Some(1),
            ..missing
        };
        assert_eq!(Packet::Publish(extra).encode(&mut out), Err(Error::Encoding));
        assert!(out.is_empty());
    }

    #[test]
    fn test_publish_malformed_flags() {
        // QoS 3
        assert_eq!(
            Packet::decode(0x36, &[0x00, 0x01, b't', 0x00, 0x01]),
            Err(Error::ProtocolViolation)
        );
        // DUP on QoS 0
        assert_eq!(
            Packet::decode(0x38, &[0x00, 0x01, b't']),
            Err(Error::ProtocolViolation)
        );
    }

    #[test]
    fn test_subscribe_bytes() {
        let packet = Packet::Subscribe(Subscribe {
            pid: 10,
            topic: "a/#",
            qos: QoS::AtLeastOnce,
        });
        let bytes = encode(&packet);
        assert_eq!(&bytes[..], &[0x82, 8, 0x00, 0x0A, 0x00, 0x03, b'a', b'/', b'#', 0x01]);
        assert_eq!(decode(&bytes), packet);
    }

    #[test]
    fn test_suback_codes() {
        match decode(&[0x90, 0x03, 0x00, 0x05, 0x01]) {
            Packet::SubAck(suback) => {
                assert_eq!(suback.pid, 5);
                assert_eq!(suback.granted(), Ok(QoS::AtLeastOnce));
            }
            other => panic!("unexpected packet {:?}", other),
        }
        match decode(&[0x90, 0x03, 0x00, 0x05, 0x80]) {
            Packet::SubAck(suback) => assert_eq!(suback.granted(), Err(Error::SubscriptionRejected)),
            other => panic!("unexpected packet {:?}", other),
        }
        assert_eq!(
            Packet::from_bytes(&[0x90, 0x03, 0x00, 0x05, 0x03]),
            Err(Error::ProtocolViolation)
        );
    }

    #[test]
    fn test_empty_packets() {
        assert_eq!(&encode(&Packet::PingReq)[..], &[0xC0, 0x00]);
        assert_eq!(&encode(&Packet::PingResp)[..], &[0xD0, 0x00]);
        assert_eq!(&encode(&Packet::Disconnect)[..], &[0xE0, 0x00]);
        assert_eq!(&encode(&Packet::PubAck(0x0203))[..], &[0x40, 0x02, 0x02, 0x03]);
        assert_eq!(decode(&[0xD0, 0x00]), Packet::PingResp);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        // Unknown type
        assert_eq!(Packet::decode(0xF0, &[]), Err(Error::ProtocolViolation));
        // Truncated PUBACK
        assert_eq!(Packet::decode(0x40, &[0x01]), Err(Error::ProtocolViolation));
        // Trailing bytes after PINGRESP
        assert_eq!(Packet::decode(0xD0, &[0x00]), Err(Error::ProtocolViolation));
        // Zero packet identifier
        assert_eq!(Packet::decode(0x40, &[0x00, 0x00]), Err(Error::ProtocolViolation));
        // SUBSCRIBE without its mandatory flags
        assert_eq!(
            Packet::decode(0x80, &[0x00, 0x01, 0x00, 0x01, b'a', 0x00]),
            Err(Error::ProtocolViolation)
        );
        // Topic that is not UTF-8
        assert_eq!(
            Packet::decode(0x30, &[0x00, 0x01, 0xFF]),
            Err(Error::ProtocolViolation)
        );
        // Frame shorter than its remaining length
        assert_eq!(
            Packet::from_bytes(&[0x40, 0x02, 0x00]),
            Err(Error::ProtocolViolation)
        );
    }

    #[test]
    fn test_oversized_fields() {
        let topic = "a".repeat(u16::MAX as usize + 1);
        let publish = Packet::Publish(Publish {
            topic: &topic,
            payload: b"",
            qos: QoS::AtMostOnce,
            pid: None,
            retain: false,
            dup: false,
        });
        assert_eq!(publish.encoded_len(), Err(Error::Encoding));
    }

    #[test]
    fn test_sink_overflow() {
        let mut out: Vec<u8, 4> = Vec::new();
        let publish = Packet::Publish(Publish {
            topic: "topic",
            payload: b"payload",
            qos: QoS::AtMostOnce,
            pid: None,
            retain: false,
            dup: false,
        });
        assert_eq!(publish.encode(&mut out), Err(Error::BufferOverflow));
    }
}
