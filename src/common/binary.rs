//! Binary data parsing utilities shared across formats.
//!
//! This module provides the little-endian readers and writers used by the
//! fixed-layout records of the legacy binary formats (plexes, formatted disk
//! pages, piece descriptors, FIB slots).

use thiserror::Error;
use zerocopy::{FromBytes, I16, I32, LE, U16, U32};

/// Binary parsing error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryError {
    /// Not enough data to read the requested type
    #[error("Insufficient data: expected {expected}, got {available}")]
    InsufficientData { expected: usize, available: usize },
    /// Failed to parse the data
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for binary operations
pub type BinaryResult<T> = Result<T, BinaryError>;

/// Borrow `len` bytes starting at `offset`.
///
/// # Examples
///
/// ```
/// use loquat::common::binary::slice;
/// let data = [1u8, 2, 3, 4];
/// assert_eq!(slice(&data, 1, 2).unwrap(), &[2, 3]);
/// assert!(slice(&data, 3, 2).is_err());
/// ```
#[inline]
pub fn slice(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    let end = offset.saturating_add(len);
    data.get(offset..end).ok_or(BinaryError::InsufficientData {
        expected: end,
        available: data.len(),
    })
}

#[inline]
fn slice_mut(data: &mut [u8], offset: usize, len: usize) -> BinaryResult<&mut [u8]> {
    let end = offset.saturating_add(len);
    let available = data.len();
    data.get_mut(offset..end)
        .ok_or(BinaryError::InsufficientData {
            expected: end,
            available,
        })
}

/// Read a single byte at the given offset.
#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> BinaryResult<u8> {
    data.get(offset)
        .copied()
        .ok_or(BinaryError::InsufficientData {
            expected: offset + 1,
            available: data.len(),
        })
}

/// Read a little-endian u16 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use loquat::common::binary::read_u16_le;
/// let data = [0x34, 0x12, 0x78, 0x56];
/// assert_eq!(read_u16_le(&data, 0).unwrap(), 0x1234);
/// assert_eq!(read_u16_le(&data, 2).unwrap(), 0x5678);
/// ```
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> BinaryResult<u16> {
    U16::<LE>::read_from_bytes(slice(data, offset, 2)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u16".to_string()))
}

/// Read a little-endian i16 from a byte slice at the given offset.
#[inline]
pub fn read_i16_le(data: &[u8], offset: usize) -> BinaryResult<i16> {
    I16::<LE>::read_from_bytes(slice(data, offset, 2)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read i16".to_string()))
}

/// Read a little-endian u32 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use loquat::common::binary::read_u32_le;
/// let data = [0x78, 0x56, 0x34, 0x12];
/// assert_eq!(read_u32_le(&data, 0).unwrap(), 0x12345678);
/// ```
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> BinaryResult<u32> {
    U32::<LE>::read_from_bytes(slice(data, offset, 4)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u32".to_string()))
}

/// Read a little-endian i32 from a byte slice at the given offset.
#[inline]
pub fn read_i32_le(data: &[u8], offset: usize) -> BinaryResult<i32> {
    I32::<LE>::read_from_bytes(slice(data, offset, 4)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read i32".to_string()))
}

/// Write a little-endian u16 into `buf` at `offset`.
#[inline]
pub fn write_u16_le(buf: &mut [u8], offset: usize, value: u16) -> BinaryResult<()> {
    slice_mut(buf, offset, 2)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Write a little-endian u32 into `buf` at `offset`.
#[inline]
pub fn write_u32_le(buf: &mut [u8], offset: usize, value: u32) -> BinaryResult<()> {
    slice_mut(buf, offset, 4)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}
