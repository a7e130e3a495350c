//! The `#Strings` heap: null-terminated UTF-8 identifiers addressed by byte offset.

use std::ffi::CStr;

use crate::Result;

/// View over a `#Strings` heap
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wrap heap bytes; a valid heap starts with the empty string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with `0x00`.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("Provided #Strings heap is invalid"));
        }

        Ok(Strings { data })
    }

    /// The string starting at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an index past the heap and
    /// [`crate::Error::Malformed`] for unterminated or non-UTF-8 data.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        CStr::from_bytes_until_nul(&self.data[index..])
            .ok()
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| malformed_error!("Invalid string at index - {}", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let data = b"\0Foo\0System\0";
        let strings = Strings::from(data).unwrap();

        assert_eq!(strings.get(0).unwrap(), "");
        assert_eq!(strings.get(1).unwrap(), "Foo");
        assert_eq!(strings.get(5).unwrap(), "System");
        assert_eq!(strings.get(7).unwrap(), "stem");
        assert!(strings.get(12).is_err());
    }

    #[test]
    fn invalid() {
        assert!(Strings::from(b"Foo\0").is_err());
        assert!(Strings::from(b"").is_err());

        let strings = Strings::from(b"\0Foo").unwrap();
        assert!(strings.get(1).is_err());
    }
}
