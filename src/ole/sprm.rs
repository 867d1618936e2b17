//! SPRM (Single Property Modifier) parsing and owned grpprl buffers.
//!
//! A grpprl is a packed sequence of SPRMs; each SPRM is a 2-byte opcode whose
//! top three bits select the operand width. Based on Apache POI's
//! SprmOperation, SprmIterator and SprmBuffer.

use crate::common::binary::{read_u16_le, read_u32_le};
use crate::ole::sprm_operations::{SPRM_P_CHG_TABS, SPRM_T_DEF_TABLE};
use smallvec::SmallVec;

/// SPRM operation types based on size code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprmOperation {
    /// Size code 0 - toggle, 1 byte operand
    Toggle,
    /// Size code 1 - 1 byte operand
    Byte,
    /// Size code 2 - 2 byte operand
    Word,
    /// Size code 3 - 4 byte operand
    DWord,
    /// Size code 4 - 2 byte operand
    Word2,
    /// Size code 5 - 2 byte operand
    Word3,
    /// Size code 6 - variable length operand
    Variable,
    /// Size code 7 - 3 byte operand
    ThreeByte,
}

impl From<u8> for SprmOperation {
    fn from(size_code: u8) -> Self {
        match size_code & 0x07 {
            0 => SprmOperation::Toggle,
            1 => SprmOperation::Byte,
            2 => SprmOperation::Word,
            3 => SprmOperation::DWord,
            4 => SprmOperation::Word2,
            5 => SprmOperation::Word3,
            6 => SprmOperation::Variable,
            _ => SprmOperation::ThreeByte,
        }
    }
}

/// A decoded SPRM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sprm {
    /// SPRM opcode
    pub opcode: u16,
    /// SPRM operation type
    pub operation: SprmOperation,
    /// SPRM operand data
    pub operand: SmallVec<[u8; 4]>,
}

impl Sprm {
    /// The 9-bit operation code (`opcode & 0x01FF`).
    #[inline]
    pub fn operation_code(&self) -> u16 {
        self.opcode & 0x01FF
    }

    /// The 3-bit operand size code.
    #[inline]
    pub fn size_code(&self) -> u8 {
        ((self.opcode & 0xE000) >> 13) as u8
    }

    #[inline]
    pub fn operand_byte(&self) -> Option<u8> {
        self.operand.first().copied()
    }

    #[inline]
    pub fn operand_word(&self) -> Option<u16> {
        read_u16_le(&self.operand, 0).ok()
    }

    #[inline]
    pub fn operand_dword(&self) -> Option<u32> {
        read_u32_le(&self.operand, 0).ok()
    }
}

/// Parse SPRMs from a grpprl.
///
/// Always 2-byte opcodes (Word 97+). A truncated trailing SPRM ends the scan.
///
/// # Examples
///
/// ```
/// use loquat::ole::sprm::parse_sprms;
/// // sprmCFBold(1), sprmCHps(24)
/// let sprms = parse_sprms(&[0x35, 0x08, 0x01, 0x43, 0x4A, 0x18, 0x00]);
/// assert_eq!(sprms.len(), 2);
/// assert_eq!(sprms[1].operand_word(), Some(24));
/// ```
pub fn parse_sprms(grpprl: &[u8]) -> Vec<Sprm> {
    let mut sprms = Vec::new();
    let mut offset = 0;

    while let Ok(opcode) = read_u16_le(grpprl, offset) {
        offset += 2;
        let size_code = ((opcode & 0xE000) >> 13) as u8;
        let operation = SprmOperation::from(size_code);

        let operand_size = match operation {
            SprmOperation::Toggle | SprmOperation::Byte => 1,
            SprmOperation::Word | SprmOperation::Word2 | SprmOperation::Word3 => 2,
            SprmOperation::DWord => 4,
            SprmOperation::ThreeByte => 3,
            SprmOperation::Variable => {
                if opcode == SPRM_P_CHG_TABS || opcode == SPRM_T_DEF_TABLE {
                    // Long SPRM - 2 byte size, counted with the operand
                    match read_u16_le(grpprl, offset) {
                        Ok(size) => size as usize + 1,
                        Err(_) => break,
                    }
                } else {
                    match grpprl.get(offset) {
                        Some(&size) => size as usize + 1,
                        None => break,
                    }
                }
            },
        };

        let Some(operand) = grpprl.get(offset..offset + operand_size) else {
            break;
        };
        offset += operand_size;

        sprms.push(Sprm {
            opcode,
            operation,
            operand: SmallVec::from_slice(operand),
        });
    }

    sprms
}

/// An owned grpprl, optionally preceded by a 2-byte style index.
///
/// Paragraph buffers carry the `istd` in their first two bytes
/// (`sprm_start == 2`); character and section buffers start directly with
/// SPRMs. `Clone` copies the bytes, so the two halves of a split run never
/// share storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SprmBuffer {
    bytes: Vec<u8>,
    sprm_start: usize,
}

impl SprmBuffer {
    /// Wrap raw bytes whose SPRMs begin at `sprm_start`.
    pub fn new(bytes: Vec<u8>, sprm_start: usize) -> Self {
        Self { bytes, sprm_start }
    }

    /// A character or section buffer (no style prefix).
    pub fn from_grpprl(grpprl: &[u8]) -> Self {
        Self::new(grpprl.to_vec(), 0)
    }

    /// An empty paragraph buffer for style `istd`.
    pub fn with_istd(istd: u16) -> Self {
        Self::new(istd.to_le_bytes().to_vec(), 2)
    }

    /// Style index of a paragraph buffer.
    pub fn istd(&self) -> Option<u16> {
        if self.sprm_start < 2 {
            return None;
        }
        read_u16_le(&self.bytes, 0).ok()
    }

    /// The whole buffer, style prefix included.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The SPRM part only.
    #[inline]
    pub fn grpprl(&self) -> &[u8] {
        &self.bytes[self.sprm_start.min(self.bytes.len())..]
    }

    #[inline]
    pub fn sprm_start(&self) -> usize {
        self.sprm_start
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn sprms(&self) -> Vec<Sprm> {
        parse_sprms(self.grpprl())
    }

    pub fn find_sprm(&self, opcode: u16) -> Option<Sprm> {
        self.sprms().into_iter().find(|sprm| sprm.opcode == opcode)
    }

    pub fn add_sprm_u8(&mut self, opcode: u16, operand: u8) {
        self.bytes.extend_from_slice(&opcode.to_le_bytes());
        self.bytes.push(operand);
    }

    pub fn add_sprm_u16(&mut self, opcode: u16, operand: u16) {
        self.bytes.extend_from_slice(&opcode.to_le_bytes());
        self.bytes.extend_from_slice(&operand.to_le_bytes());
    }

    pub fn add_sprm_u32(&mut self, opcode: u16, operand: u32) {
        self.bytes.extend_from_slice(&opcode.to_le_bytes());
        self.bytes.extend_from_slice(&operand.to_le_bytes());
    }

    /// Append already-encoded SPRMs.
    pub fn append(&mut self, grpprl: &[u8]) {
        self.bytes.extend_from_slice(grpprl);
    }
}
