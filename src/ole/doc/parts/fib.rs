//! File Information Block (FIB) for DOC files.
//!
//! The FIB is located at the beginning of the WordDocument stream and holds
//! the text bounds and the (offset, length) pairs locating every table in the
//! table stream. Only the Word 97+ layout is handled.
//!
//! # Structure (simplified)
//!
//! - Bytes 0-1: wIdent (magic number, 0xA5EC)
//! - Bytes 2-3: nFib (version number)
//! - Bytes 10-11: flags (including which table stream to use)
//! - Bytes 24-31: fcMin, fcMac
//! - Byte 32: FibRgW, then FibRgLw (ccpText at 76), then FibRgFcLcb at 154

use crate::common::binary::{self, read_u16_le, read_u32_le};
use crate::common::error::{Error, Result};

/// Word 97+ magic number
const FIB_MAGIC: u16 = 0xA5EC;
/// nFib written for new documents (Word 97)
const NFIB_WORD97: u16 = 0x00C1;

const FLAGS_OFFSET: usize = 0x0A;
const FC_MIN_OFFSET: usize = 0x18;
const FC_MAC_OFFSET: usize = 0x1C;
const CSW_OFFSET: usize = 0x20;
const CSLW_OFFSET: usize = 0x3E;
const CCP_TEXT_OFFSET: usize = 0x4C;
const CB_RG_FC_LCB_OFFSET: usize = 0x98;
const RG_FC_LCB_OFFSET: usize = 0x9A;

/// fWhichTblStm: the table stream is "1Table"
const FLAG_WHICH_TABLE_STREAM: u16 = 0x0200;

/// Counts of the Word 97 FIB arrays
const CSW_WORD97: u16 = 14;
const CSLW_WORD97: u16 = 22;
const CB_RG_FC_LCB_WORD97: u16 = 93;

/// FibRgFcLcb97 slots used by the storage tables.
///
/// Each slot is an `(fc, lcb)` pair of 4-byte values; the discriminant is the
/// slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum FibField {
    /// Section table (PlcfSed)
    PlcfSed = 6,
    /// Character bin table (PlcfBteChpx)
    PlcfBteChpx = 12,
    /// Paragraph bin table (PlcfBtePapx)
    PlcfBtePapx = 13,
    /// Complex file table
    Clx = 33,
}

impl FibField {
    /// Index of the slot in FibRgFcLcb.
    #[inline]
    pub const fn slot(self) -> usize {
        self as usize
    }

    #[inline]
    const fn byte_offset(self) -> usize {
        RG_FC_LCB_OFFSET + self.slot() * 8
    }
}

/// File Information Block.
///
/// Keeps the raw FIB bytes; setters patch them in place so the block can be
/// written back unchanged apart from the updated fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInformationBlock {
    data: Vec<u8>,
}

impl Default for FileInformationBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl FileInformationBlock {
    /// A zeroed Word 97 FIB using the "1Table" stream.
    pub fn new() -> Self {
        let len = RG_FC_LCB_OFFSET + CB_RG_FC_LCB_WORD97 as usize * 8 + 2;
        let mut data = vec![0u8; len];
        data[0..2].copy_from_slice(&FIB_MAGIC.to_le_bytes());
        data[2..4].copy_from_slice(&NFIB_WORD97.to_le_bytes());
        data[FLAGS_OFFSET..FLAGS_OFFSET + 2].copy_from_slice(&FLAG_WHICH_TABLE_STREAM.to_le_bytes());
        data[CSW_OFFSET..CSW_OFFSET + 2].copy_from_slice(&CSW_WORD97.to_le_bytes());
        data[CSLW_OFFSET..CSLW_OFFSET + 2].copy_from_slice(&CSLW_WORD97.to_le_bytes());
        data[CB_RG_FC_LCB_OFFSET..CB_RG_FC_LCB_OFFSET + 2]
            .copy_from_slice(&CB_RG_FC_LCB_WORD97.to_le_bytes());
        Self { data }
    }

    /// Parse a FIB from the start of the WordDocument stream.
    pub fn parse(word_document: &[u8]) -> Result<Self> {
        let magic = read_u16_le(word_document, 0)?;
        if magic != FIB_MAGIC {
            return Err(Error::CorruptedFile(format!(
                "Invalid FIB magic number: 0x{magic:04X}"
            )));
        }

        let cb_rg_fc_lcb = read_u16_le(word_document, CB_RG_FC_LCB_OFFSET)? as usize;
        let csw_new_at = RG_FC_LCB_OFFSET + cb_rg_fc_lcb * 8;
        let csw_new = read_u16_le(word_document, csw_new_at)? as usize;
        let len = csw_new_at + 2 + csw_new * 2;

        Ok(Self {
            data: binary::slice(word_document, 0, len)?.to_vec(),
        })
    }

    /// Get the file format version.
    #[inline]
    pub fn version(&self) -> u16 {
        self.read_u16(2)
    }

    /// Returns `true` for "1Table", `false` for "0Table".
    #[inline]
    pub fn which_table_stream(&self) -> bool {
        self.read_u16(FLAGS_OFFSET) & FLAG_WHICH_TABLE_STREAM != 0
    }

    /// Name of the table stream this FIB refers to.
    pub fn table_stream_name(&self) -> &'static str {
        if self.which_table_stream() {
            "1Table"
        } else {
            "0Table"
        }
    }

    /// File offset of the first text character.
    #[inline]
    pub fn fc_min(&self) -> u32 {
        self.read_u32(FC_MIN_OFFSET)
    }

    pub fn set_fc_min(&mut self, fc: u32) {
        self.write_u32(FC_MIN_OFFSET, fc);
    }

    /// File offset just past the last text character.
    #[inline]
    pub fn fc_mac(&self) -> u32 {
        self.read_u32(FC_MAC_OFFSET)
    }

    pub fn set_fc_mac(&mut self, fc: u32) {
        self.write_u32(FC_MAC_OFFSET, fc);
    }

    /// Length of the main document text in characters.
    #[inline]
    pub fn ccp_text(&self) -> u32 {
        self.read_u32(CCP_TEXT_OFFSET)
    }

    pub fn set_ccp_text(&mut self, ccp: u32) {
        self.write_u32(CCP_TEXT_OFFSET, ccp);
    }

    /// `(offset, length)` of `field` in the table stream.
    pub fn field(&self, field: FibField) -> Result<(u32, u32)> {
        let at = field.byte_offset();
        Ok((read_u32_le(&self.data, at)?, read_u32_le(&self.data, at + 4)?))
    }

    pub fn set_field(&mut self, field: FibField, offset: u32, length: u32) -> Result<()> {
        let at = field.byte_offset();
        binary::write_u32_le(&mut self.data, at, offset)?;
        binary::write_u32_le(&mut self.data, at + 4, length)?;
        Ok(())
    }

    /// Size of the FIB in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The FIB bytes, including patched fields.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    // The fixed header fields always lie inside a parsed FIB.
    fn read_u16(&self, offset: usize) -> u16 {
        read_u16_le(&self.data, offset).unwrap_or(0)
    }

    fn read_u32(&self, offset: usize) -> u32 {
        read_u32_le(&self.data, offset).unwrap_or(0)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        if let Some(slot) = self.data.get_mut(offset..offset + 4) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }
}
