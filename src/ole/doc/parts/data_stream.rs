//! The auxiliary Data stream, as far as paragraph properties need it.
//!
//! A paragraph grpprl too large for an FKP is stored here as a 2-byte length
//! followed by the grpprl bytes; the page keeps an `sprmPHugePapx` whose
//! 4-byte operand is the record's offset.

use crate::common::binary::{self, read_u16_le};
use crate::common::error::{Error, Result};
use memchr::memmem;
use tracing::trace;

/// Number of bytes a 4-byte stream offset can address.
const ADDRESSABLE_BYTES: usize = u32::MAX as usize;

/// Data stream with a bounded capacity for relocated grpprls.
///
/// # Examples
///
/// ```
/// use loquat::ole::doc::parts::data_stream::DataStream;
///
/// let mut data = DataStream::with_capacity_limit(vec![0; 4], 16);
/// let offset = data.append_grpprl(&[1, 2, 3]).unwrap();
/// assert_eq!(offset, 4);
/// assert_eq!(data.read_grpprl(offset).unwrap(), &[1, 2, 3]);
/// assert!(data.append_grpprl(&[0; 8]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStream {
    bytes: Vec<u8>,
    capacity: usize,
}

impl Default for DataStream {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DataStream {
    /// Wrap existing stream bytes; the stream may grow to the largest offset
    /// an `sprmPHugePapx` operand can express.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            capacity: ADDRESSABLE_BYTES,
        }
    }

    /// Wrap existing stream bytes, refusing to grow past `limit` bytes.
    pub fn with_capacity_limit(bytes: Vec<u8>, limit: usize) -> Self {
        Self {
            bytes,
            capacity: limit.min(ADDRESSABLE_BYTES),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a length-prefixed grpprl and return its offset.
    ///
    /// When the stream already holds the same length and bytes, for example
    /// a record relocated by an earlier save, that offset is returned and the
    /// stream is left as is. Otherwise the record is appended.
    pub fn append_grpprl(&mut self, grpprl: &[u8]) -> Result<u32> {
        let size = u16::try_from(grpprl.len()).map_err(|_| {
            Error::CorruptedFile(format!(
                "grpprl of {} bytes cannot be length-prefixed",
                grpprl.len()
            ))
        })?;
        let mut record = Vec::with_capacity(2 + grpprl.len());
        record.extend_from_slice(&size.to_le_bytes());
        record.extend_from_slice(grpprl);

        if let Some(offset) = memmem::find(&self.bytes, &record) {
            trace!(offset, size, "reusing stored grpprl");
            return Ok(offset as u32);
        }

        let offset = self.bytes.len();
        let required = offset + record.len();
        if required > self.capacity {
            return Err(Error::DataStreamCapacity {
                required,
                available: self.capacity,
            });
        }
        self.bytes.extend_from_slice(&record);
        Ok(offset as u32)
    }

    /// Read the grpprl stored at `offset`.
    pub fn read_grpprl(&self, offset: u32) -> Result<&[u8]> {
        let offset = offset as usize;
        let size = read_u16_le(&self.bytes, offset)? as usize;
        Ok(binary::slice(&self.bytes, offset + 2, size)?)
    }
}
