//! Fixed-width little/big-endian primitives over byte slices.
//!
//! Everything in metadata is little-endian except the two- and four-byte forms of the
//! compressed integer, which are big-endian. [`CilIO`] abstracts over the numeric types so
//! that [`read_le_at`] and friends can be written once.

use crate::Result;

/// Numeric types that can be decoded from and encoded to raw bytes.
pub trait CilIO: Sized + Copy {
    /// Byte array type matching `size_of::<Self>()`.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;
    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cilio {
    ($($ty:ty),*) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_cilio!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Reads a `T` in little-endian at `offset` and advances it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let bytes = take::<T>(data, *offset)?;
    *offset += std::mem::size_of::<T>();
    Ok(T::from_le_bytes(bytes))
}

/// Reads a `T` in big-endian at `offset` and advances it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_be_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let bytes = take::<T>(data, *offset)?;
    *offset += std::mem::size_of::<T>();
    Ok(T::from_be_bytes(bytes))
}

/// Reads a `T` in little-endian from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0;
    read_le_at(data, &mut offset)
}

/// Reads either a 2-byte or a 4-byte little-endian index, widened to `u32`.
///
/// Heap and table indices switch width depending on the size of the thing they index.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Appends `value` in little-endian.
pub fn write_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Appends a 2-byte or 4-byte little-endian index.
pub fn write_le_dyn(buffer: &mut Vec<u8>, value: u32, is_large: bool) {
    if is_large {
        write_le::<u32>(buffer, value);
    } else {
        #[allow(clippy::cast_possible_truncation)]
        write_le::<u16>(buffer, value as u16);
    }
}

fn take<T: CilIO>(data: &[u8], offset: usize) -> Result<T::Bytes> {
    let end = offset
        .checked_add(std::mem::size_of::<T>())
        .ok_or(out_of_bounds_error!())?;
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    T::Bytes::try_from(&data[offset..end]).map_err(|_| out_of_bounds_error!())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn read_le_advances() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let mut offset = 0;

        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 0x0201);
        assert_eq!(read_le_at::<u32>(&data, &mut offset).unwrap(), 0x0605_0403);
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_be() {
        let data = [0x12, 0x34];
        let mut offset = 0;

        assert_eq!(read_be_at::<u16>(&data, &mut offset).unwrap(), 0x1234);
    }

    #[test]
    fn read_dyn() {
        let data = [0xFF, 0xEE, 0xDD, 0xCC];

        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&data, &mut offset, false).unwrap(), 0xEEFF);
        assert_eq!(offset, 2);

        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&data, &mut offset, true).unwrap(), 0xCCDD_EEFF);
        assert_eq!(offset, 4);
    }

    #[test]
    fn read_past_end() {
        let data = [0x01, 0x02, 0x03];
        let mut offset = 2;

        assert!(matches!(
            read_le_at::<u16>(&data, &mut offset),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(offset, 2);
    }

    #[test]
    fn write_dyn() {
        let mut buffer = Vec::new();
        write_le_dyn(&mut buffer, 0x1234, false);
        write_le_dyn(&mut buffer, 0x1234, true);

        assert_eq!(buffer, [0x34, 0x12, 0x34, 0x12, 0x00, 0x00]);
    }
}
