//! Encoders for the ECMA-335 compressed integer forms.
//!
//! The decoders live on [`crate::Parser`]. These are the inverse operations, used to build
//! synthetic blobs and by the image builder.

use crate::Result;

/// Append `value` as a compressed unsigned integer.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for values above `0x1FFF_FFFF`.
pub fn write_compressed_uint(value: u32, buffer: &mut Vec<u8>) -> Result<()> {
    #[allow(clippy::cast_possible_truncation)]
    match value {
        0..=0x7F => buffer.push(value as u8),
        0x80..=0x3FFF => {
            buffer.push(0x80 | (value >> 8) as u8);
            buffer.push(value as u8);
        }
        0x4000..=0x1FFF_FFFF => {
            buffer.push(0xC0 | (value >> 24) as u8);
            buffer.push((value >> 16) as u8);
            buffer.push((value >> 8) as u8);
            buffer.push(value as u8);
        }
        _ => {
            return Err(malformed_error!(
                "Value too large for compressed uint - 0x{:x}",
                value
            ))
        }
    }

    Ok(())
}

/// Append `value` as a compressed signed integer.
///
/// The two's complement value is truncated to 7, 14 or 29 bits and rotated left by one,
/// then written with the matching width.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for values outside `-2^28..2^28`.
pub fn write_compressed_int(value: i32, buffer: &mut Vec<u8>) -> Result<()> {
    #[allow(clippy::cast_sign_loss)]
    let bits = value as u32;
    let sign = u32::from(value < 0);

    #[allow(clippy::cast_possible_truncation)]
    match value {
        -0x40..=0x3F => {
            let encoded = ((bits << 1) & 0x7F) | sign;
            buffer.push(encoded as u8);
        }
        -0x2000..=0x1FFF => {
            let encoded = ((bits << 1) & 0x3FFF) | sign;
            buffer.push(0x80 | (encoded >> 8) as u8);
            buffer.push(encoded as u8);
        }
        -0x1000_0000..=0x0FFF_FFFF => {
            let encoded = ((bits << 1) & 0x1FFF_FFFF) | sign;
            buffer.push(0xC0 | (encoded >> 24) as u8);
            buffer.push((encoded >> 16) as u8);
            buffer.push((encoded >> 8) as u8);
            buffer.push(encoded as u8);
        }
        _ => {
            return Err(malformed_error!(
                "Value out of range for compressed int - {}",
                value
            ))
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_widths() {
        let cases: [(u32, &[u8]); 5] = [
            (0x03, &[0x03]),
            (0x80, &[0x80, 0x80]),
            (0x2E57, &[0xAE, 0x57]),
            (0x4000, &[0xC0, 0x00, 0x40, 0x00]),
            (0x1FFF_FFFF, &[0xDF, 0xFF, 0xFF, 0xFF]),
        ];

        for (value, expected) in cases {
            let mut buffer = Vec::new();
            write_compressed_uint(value, &mut buffer).unwrap();
            assert_eq!(buffer, expected);
        }

        assert!(write_compressed_uint(0x2000_0000, &mut Vec::new()).is_err());
    }

    #[test]
    fn signed_widths() {
        let cases: [(i32, &[u8]); 6] = [
            (3, &[0x06]),
            (-3, &[0x7B]),
            (64, &[0x80, 0x80]),
            (-64, &[0x01]),
            (-8192, &[0x80, 0x01]),
            (-268_435_456, &[0xC0, 0x00, 0x00, 0x01]),
        ];

        for (value, expected) in cases {
            let mut buffer = Vec::new();
            write_compressed_int(value, &mut buffer).unwrap();
            assert_eq!(buffer, expected, "{value}");
        }

        assert!(write_compressed_int(0x1000_0000, &mut Vec::new()).is_err());
    }
}
