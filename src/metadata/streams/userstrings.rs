//! The `#US` heap: length-prefixed UTF-16LE literals addressed by offset.

use widestring::U16String;

use crate::{file::parser::Parser, Result};

/// View over a `#US` heap
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Wrap heap bytes; a valid heap starts with the empty entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with `0x00`.
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("Invalid memory for #US heap"));
        }

        Ok(UserStrings { data })
    }

    /// The string at `index`.
    ///
    /// Each entry carries a trailing flag byte after the UTF-16 code units; it is skipped.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry runs past the heap.
    pub fn get(&self, index: usize) -> Result<String> {
        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(&self.data[index..]);
        let length = parser.read_compressed_uint()? as usize;
        let bytes = parser.read_bytes(length & !1)?;

        Ok(decode_utf16(bytes))
    }
}

/// Decode little-endian UTF-16, replacing unpaired surrogates
#[must_use]
pub fn decode_utf16(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    U16String::from_vec(units).to_string_lossy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let data = [0x00, 0x05, b'H', 0x00, b'i', 0x00, 0x00, 0x01, 0x00];
        let heap = UserStrings::from(&data).unwrap();

        assert_eq!(heap.get(1).unwrap(), "Hi");
        assert_eq!(heap.get(7).unwrap(), "");
    }

    #[test]
    fn lossy() {
        assert_eq!(decode_utf16(&[0x41, 0x00, 0x00, 0xD8]), "A\u{FFFD}");
    }
}
