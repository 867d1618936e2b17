//! Plex of character positions (PLCF).
//!
//! The generic on-disk interval index of the legacy binary formats: `n + 1`
//! little-endian 4-byte boundaries followed by `n` fixed-size structures,
//! where structure `i` describes `[boundary[i], boundary[i + 1])`.

use crate::common::binary;
use crate::common::error::{Error, Result};
use crate::ole::property_node::GenericPropertyNode;
use bytes::Bytes;

/// Plex of CPs, read from or written to a table stream.
///
/// Based on Apache POI's PlexOfCps.
///
/// # Format
///
/// - n+1 boundaries (4 bytes each)
/// - n structures (`struct_size` bytes each)
///
/// # Examples
///
/// ```
/// use loquat::ole::plcf::PlexOfCps;
///
/// // 2 elements, struct_size = 2
/// let data = vec![
///     0x00, 0x00, 0x00, 0x00, // 0
///     0x0A, 0x00, 0x00, 0x00, // 10
///     0x14, 0x00, 0x00, 0x00, // 20
///     0x01, 0x02, // struct 0
///     0x03, 0x04, // struct 1
/// ];
///
/// let plex = PlexOfCps::parse(&data, 0, data.len(), 2).unwrap();
/// assert_eq!(plex.len(), 2);
/// let node = plex.property(1).unwrap();
/// assert_eq!((node.start(), node.end()), (10, 20));
/// assert_eq!(&node.payload()[..], &[0x03, 0x04]);
/// assert_eq!(plex.to_bytes(), data);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlexOfCps {
    struct_size: usize,
    props: Vec<GenericPropertyNode>,
}

impl PlexOfCps {
    /// Create an empty plex for structures of `struct_size` bytes.
    pub fn new(struct_size: usize) -> Self {
        Self {
            struct_size,
            props: Vec::new(),
        }
    }

    /// Decode a plex of `size` bytes at `offset` in `data`.
    ///
    /// The element count is derived from the size alone. A size that does not
    /// match `struct_size` yields whatever the bytes decode to; only reads past
    /// the end of `data` are reported.
    pub fn parse(data: &[u8], offset: usize, size: usize, struct_size: usize) -> Result<Self> {
        let count = size.saturating_sub(4) / (4 + struct_size);
        let structs_at = offset + 4 * (count + 1);

        let mut props = Vec::with_capacity(count);
        for i in 0..count {
            let start = binary::read_u32_le(data, offset + 4 * i)?;
            let end = binary::read_u32_le(data, offset + 4 * (i + 1))?;
            let raw = binary::slice(data, structs_at + i * struct_size, struct_size)?;
            props.push(GenericPropertyNode::new(
                start,
                end,
                Bytes::copy_from_slice(raw),
            )?);
        }

        Ok(Self { struct_size, props })
    }

    /// Number of structures.
    #[inline]
    pub fn len(&self) -> usize {
        self.props.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    #[inline]
    pub fn struct_size(&self) -> usize {
        self.struct_size
    }

    /// Get the `index`-th interval and its structure.
    pub fn property(&self, index: usize) -> Result<&GenericPropertyNode> {
        self.props
            .get(index)
            .ok_or_else(|| Error::index(index, self.props.len()))
    }

    /// All nodes in append order.
    #[inline]
    pub fn properties(&self) -> &[GenericPropertyNode] {
        &self.props
    }

    /// Nodes overlapping `[start, end)`.
    pub fn properties_in_range(
        &self,
        start: u32,
        end: u32,
    ) -> impl Iterator<Item = &GenericPropertyNode> {
        self.props
            .iter()
            .filter(move |node| node.start() < end && node.end() > start)
    }

    /// Append a node. No sorting is done: callers add nodes in start order.
    pub fn add_property(&mut self, node: GenericPropertyNode) -> Result<()> {
        if node.payload().len() != self.struct_size {
            return Err(Error::StructSize {
                expected: self.struct_size,
                actual: node.payload().len(),
            });
        }
        self.props.push(node);
        Ok(())
    }

    /// Serialized size in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        4 * (self.props.len() + 1) + self.struct_size * self.props.len()
    }

    /// Serialize as boundaries then structures.
    ///
    /// The final boundary is the `end` of the last node added.
    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.props.len();
        let structs_at = 4 * (count + 1);
        let mut buf = vec![0u8; self.byte_len()];

        let mut last_end = 0;
        for (i, node) in self.props.iter().enumerate() {
            buf[4 * i..4 * i + 4].copy_from_slice(&node.start().to_le_bytes());
            let at = structs_at + i * self.struct_size;
            buf[at..at + self.struct_size].copy_from_slice(node.payload());
            last_end = node.end();
        }
        buf[4 * count..4 * count + 4].copy_from_slice(&last_end.to_le_bytes());
        buf
    }

    /// Serialize into `out`, returning the `(offset, size)` written.
    pub fn write_to(&self, out: &mut Vec<u8>) -> (u32, u32) {
        let offset = out.len();
        out.extend_from_slice(&self.to_bytes());
        (offset as u32, (out.len() - offset) as u32)
    }
}

/// Build a 4-byte structure holding `value`, as used by bin tables.
pub(crate) fn u32_struct(value: u32) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}
