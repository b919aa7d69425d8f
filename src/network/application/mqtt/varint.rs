//! The "remaining length" variable-length integer.
//!
//! Seven value bits per byte, least significant group first, with the high
//! bit set on every byte except the last. At most four bytes, which caps the
//! value at 268,435,455 (`0xFF 0xFF 0xFF 0x7F`).

use crate::network::error::Error;

/// Largest encodable value, `2^28 - 1`.
pub const MAX_VALUE: u32 = (1 << 28) - 1;

/// Longest encoding in bytes.
pub const MAX_LEN: usize = 4;

const CONTINUATION: u8 = 0x80;
const VALUE_MASK: u8 = 0x7F;

/// Number of bytes `value` occupies once encoded.
///
/// # Errors
///
/// [`Error::Encoding`] if `value` exceeds [`MAX_VALUE`].
pub fn encoded_len(value: u32) -> Result<usize, Error> {
    match value {
        0..=0x7F => Ok(1),
        0x80..=0x3FFF => Ok(2),
        0x4000..=0x1F_FFFF => Ok(3),
        0x20_0000..=MAX_VALUE => Ok(4),
        _ => Err(Error::Encoding),
    }
}

/// Encodes `value` into the front of `buf`, returning the bytes used.
///
/// # Errors
///
/// [`Error::Encoding`] if `value` exceeds [`MAX_VALUE`].
pub fn encode(mut value: u32, buf: &mut [u8; MAX_LEN]) -> Result<usize, Error> {
    if value > MAX_VALUE {
        return Err(Error::Encoding);
    }
    let mut len = 0;
    loop {
        let mut byte = (value & VALUE_MASK as u32) as u8;
        value >>= 7;
        if value > 0 {
            byte |= CONTINUATION;
        }
        buf[len] = byte;
        len += 1;
        if value == 0 {
            return Ok(len);
        }
    }
}

/// Decodes a value one byte at a time from `next_byte`.
///
/// Stops as soon as a byte without the continuation bit arrives, so it never
/// pulls more than [`MAX_LEN`] bytes from the source.
///
/// # Errors
///
/// * [`Error::ProtocolViolation`] - The fourth byte still has its continuation bit set
/// * Any error returned by `next_byte`
pub fn decode<F>(mut next_byte: F) -> Result<u32, Error>
where
    F: FnMut() -> Result<u8, Error>,
{
    let mut value = 0u32;
    for i in 0..MAX_LEN {
        let byte = next_byte()?;
        value |= ((byte & VALUE_MASK) as u32) << (7 * i);
        if byte & CONTINUATION == 0 {
            return Ok(value);
        }
    }
    Err(Error::ProtocolViolation)
}

/// Decodes a value from the front of `buf`, returning it and the bytes used.
///
/// # Errors
///
/// [`Error::ProtocolViolation`] if `buf` ends mid-value or the value is
/// longer than [`MAX_LEN`] bytes.
pub fn decode_slice(buf: &[u8]) -> Result<(u32, usize), Error> {
    let mut bytes = buf.iter().copied();
    let mut used = 0;
    let value = decode(|| {
        used += 1;
        bytes.next().ok_or(Error::ProtocolViolation)
    })?;
    Ok((value, used))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn round_trip(value: u32) -> u32 {
        let mut buf = [0u8; MAX_LEN];
        let len = encode(value, &mut buf).unwrap();
        assert_eq!(len, encoded_len(value).unwrap());
        let (decoded, used) = decode_slice(&buf[..len]).unwrap();
        assert_eq!(used, len);
        decoded
    }

    #[test]
    fn test_known_encodings() {
        let cases: [(u32, &[u8]); 8] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xFF, 0x7F]),
            (16_384, &[0x80, 0x80, 0x01]),
            (2_097_151, &[0xFF, 0xFF, 0x7F]),
            (2_097_152, &[0x80, 0x80, 0x80, 0x01]),
            (MAX_VALUE, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for (value, expected) in cases {
            let mut buf = [0u8; MAX_LEN];
            let len = encode(value, &mut buf).unwrap();
            assert_eq!(&buf[..len], expected, "encoding {}", value);
        }
    }

    #[test]
    fn test_round_trip_boundaries_and_random() {
        for value in [0, 1, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, MAX_VALUE] {
            assert_eq!(round_trip(value), value);
        }
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let value = rng.gen_range(0..=MAX_VALUE);
            assert_eq!(round_trip(value), value);
        }
    }

    #[test]
    fn test_encode_out_of_range() {
        let mut buf = [0u8; MAX_LEN];
        assert_eq!(encode(MAX_VALUE + 1, &mut buf), Err(Error::Encoding));
        assert_eq!(encode(u32::MAX, &mut buf), Err(Error::Encoding));
        assert_eq!(encoded_len(MAX_VALUE + 1), Err(Error::Encoding));
    }

    #[test]
    fn test_decode_stops_after_four_bytes() {
        let mut pulled = 0;
        let result = decode(|| {
            pulled += 1;
            Ok(0xFF)
        });
        assert_eq!(result, Err(Error::ProtocolViolation));
        assert_eq!(pulled, MAX_LEN);
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(decode_slice(&[0x80, 0x80]), Err(Error::ProtocolViolation));
        assert_eq!(decode_slice(&[]), Err(Error::ProtocolViolation));
    }
}
