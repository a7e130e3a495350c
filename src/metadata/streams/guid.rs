//! The `#GUID` heap: 16-byte entries addressed by 1-based index.

use crate::Result;

/// View over a `#GUID` heap
pub struct Guid<'a> {
    data: &'a [u8],
}

impl<'a> Guid<'a> {
    /// Wrap heap bytes
    #[must_use]
    pub fn from(data: &'a [u8]) -> Guid<'a> {
        Guid { data }
    }

    /// The GUID at 1-based `index`; index 0 means "no GUID".
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the heap.
    pub fn get(&self, index: usize) -> Result<Option<uguid::Guid>> {
        if index == 0 {
            return Ok(None);
        }

        let start = (index - 1) * 16;
        let bytes = self
            .data
            .get(start..start + 16)
            .ok_or(out_of_bounds_error!())?;

        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(bytes);
        Ok(Some(uguid::Guid::from_bytes(buffer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let mut data = vec![0x11; 16];
        data.extend_from_slice(&[0x22; 16]);
        let heap = Guid::from(&data);

        assert_eq!(heap.get(0).unwrap(), None);
        assert_eq!(heap.get(1).unwrap().unwrap().to_bytes(), [0x11; 16]);
        assert_eq!(heap.get(2).unwrap().unwrap().to_bytes(), [0x22; 16]);
        assert!(heap.get(3).is_err());
    }
}
