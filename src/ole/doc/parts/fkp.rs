//! FKP (Formatted Disk Page) parsing and packing for DOC files.
//!
//! FKPs are 512-byte pages holding `crun + 1` FC boundaries at the front, a
//! per-run offset record after them, and grpprls growing backwards from the
//! end of the page. The last byte is `crun`.
//!
//! References:
//! - org.apache.poi.hwpf.model.FormattedDiskPage
//! - org.apache.poi.hwpf.model.CHPFormattedDiskPage
//! - org.apache.poi.hwpf.model.PAPFormattedDiskPage
//! - [MS-DOC] 2.9.33 ChpxFkp, 2.9.175 PapxFkp

use super::data_stream::DataStream;
use super::piece_table::CharIndexTranslator;
use crate::common::binary::{self, read_u32_le};
use crate::common::error::{Error, Result};
use crate::ole::property_node::PropertyNode;
use crate::ole::sprm::{SprmBuffer, parse_sprms};
use crate::ole::sprm_operations::{HUGE_PAPX_OPERATIONS, SPRM_P_HUGE_PAPX};
use tracing::{debug, trace};
use zerocopy::{FromBytes, I32, IntoBytes, LE, U32};
use zerocopy_derive::{FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes};

/// Size of an FKP page in bytes (always 512)
pub const FKP_PAGE_SIZE: usize = 512;

/// Size of one FC boundary
const FC_SIZE: usize = 4;

/// Size of a PAPX BX record: 1-byte offset plus the 12-byte PHE
const BX_SIZE: usize = 13;

/// Paragraph grpprls longer than this go to the Data stream.
pub const HUGE_GRPPRL_THRESHOLD: usize = 488;

/// A character run: interval plus CHPX grpprl.
pub type Chpx = PropertyNode<SprmBuffer>;

/// A paragraph run: interval plus PAPX grpprl and paragraph height.
pub type Papx = PropertyNode<PapxProperties>;

/// Paragraph height (PHE), stored in each PAPX BX record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, DeriveFromBytes, DeriveIntoBytes, Immutable)]
#[repr(C)]
pub struct ParagraphHeight {
    /// fSpare, fUnk, fDiffLines and clMac packed
    pub info: U32<LE>,
    pub dxa_col: I32<LE>,
    pub dym_height: I32<LE>,
}

impl ParagraphHeight {
    pub const SIZE: usize = 12;

    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::read_from_bytes(binary::slice(raw, 0, Self::SIZE)?).map_err(|_| Error::StructSize {
            expected: Self::SIZE,
            actual: raw.len(),
        })
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut raw = [0u8; Self::SIZE];
        raw.copy_from_slice(self.as_bytes());
        raw
    }
}

/// PAPX payload: the grpprl (style index first) and its paragraph height.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PapxProperties {
    sprm_buf: SprmBuffer,
    height: ParagraphHeight,
}

impl PapxProperties {
    pub fn new(sprm_buf: SprmBuffer, height: ParagraphHeight) -> Self {
        Self { sprm_buf, height }
    }

    /// Style index of the paragraph.
    pub fn istd(&self) -> u16 {
        self.sprm_buf.istd().unwrap_or(0)
    }

    #[inline]
    pub fn sprm_buf(&self) -> &SprmBuffer {
        &self.sprm_buf
    }

    #[inline]
    pub fn sprm_buf_mut(&mut self) -> &mut SprmBuffer {
        &mut self.sprm_buf
    }

    #[inline]
    pub fn height(&self) -> &ParagraphHeight {
        &self.height
    }

    /// The grpprl as stored in a page, style index included.
    #[inline]
    pub fn grpprl(&self) -> &[u8] {
        self.sprm_buf.as_bytes()
    }
}

/// A serialized page and how many runs it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPage {
    pub bytes: Vec<u8>,
    pub consumed: usize,
}

impl PackedPage {
    /// Runs that did not fit and belong on a later page.
    pub fn overflow<'r, T>(&self, runs: &'r [T]) -> &'r [T] {
        &runs[self.consumed.min(runs.len())..]
    }
}

/// Common layout of a formatted disk page.
///
/// Implementors provide the page bytes and their own grpprl addressing; the
/// boundary array and run count are shared.
pub trait FormattedDiskPage {
    /// The 512 page bytes.
    fn page(&self) -> &[u8];

    /// Grpprl of run `index`.
    fn grpprl(&self, index: usize) -> Result<&[u8]>;

    /// Number of runs (`crun`, the last byte of the page).
    fn run_count(&self) -> usize {
        self.page().last().map_or(0, |&crun| crun as usize)
    }

    /// Byte-domain start of run `index`.
    fn start(&self, index: usize) -> Result<u32> {
        Ok(read_u32_le(self.page(), index * FC_SIZE)?)
    }

    /// Byte-domain end of run `index`.
    fn end(&self, index: usize) -> Result<u32> {
        Ok(read_u32_le(self.page(), (index + 1) * FC_SIZE)?)
    }

    /// Character-domain interval of run `index`. The end is resolved with the
    /// start as a hint.
    fn char_bounds(
        &self,
        index: usize,
        translator: &dyn CharIndexTranslator,
    ) -> Result<(u32, u32)> {
        let start = translator.get_char_index(self.start(index)?)?;
        let end = translator.get_char_index_from(self.end(index)?, start)?;
        // Runs never invert, even over garbage boundaries
        Ok((start, end.max(start)))
    }
}

fn page_at(document_stream: &[u8], offset: usize) -> Result<&[u8]> {
    Ok(binary::slice(document_stream, offset, FKP_PAGE_SIZE)?)
}

/// CHPX FKP (Character Property Formatted Disk Page).
///
/// Each run has a 1-byte word offset to a size-prefixed grpprl; offset 0
/// means no formatting.
#[derive(Debug, Clone, Copy)]
pub struct ChpxFkp<'a> {
    page: &'a [u8],
}

impl<'a> ChpxFkp<'a> {
    /// View the page at `offset` in the WordDocument stream.
    pub fn parse(document_stream: &'a [u8], offset: usize) -> Result<Self> {
        Ok(Self {
            page: page_at(document_stream, offset)?,
        })
    }

    /// Decode every run into the character domain.
    pub fn runs(&self, translator: &dyn CharIndexTranslator) -> Result<Vec<Chpx>> {
        (0..self.run_count())
            .map(|index| {
                let (start, end) = self.char_bounds(index, translator)?;
                PropertyNode::new(start, end, SprmBuffer::from_grpprl(self.grpprl(index)?))
            })
            .collect()
    }

    /// Pack as many leading `runs` as fit into one page.
    pub fn pack(runs: &[Chpx], translator: &dyn CharIndexTranslator) -> Result<PackedPage> {
        let mut total_size = FC_SIZE + 2;
        let mut index = 0;
        while index < runs.len() {
            let grpprl_len = runs[index].payload().len();
            if grpprl_len > u8::MAX as usize {
                return Err(Error::CorruptedFile(format!(
                    "character grpprl of {grpprl_len} bytes does not fit a size byte"
                )));
            }
            let addition = FC_SIZE + 2 + grpprl_len;
            if total_size + addition > 511 + index % 2 {
                break;
            }
            total_size += addition;
            // grpprls start on word boundaries
            if (1 + grpprl_len) % 2 > 0 {
                total_size += 1;
            }
            index += 1;
        }
        if index == 0 && !runs.is_empty() {
            return Err(Error::CorruptedFile(
                "character run does not fit an empty page".to_string(),
            ));
        }

        let mut buf = vec![0u8; FKP_PAGE_SIZE];
        buf[FKP_PAGE_SIZE - 1] = index as u8;

        let mut grpprl_offset = 511;
        let mut offset_offset = FC_SIZE * index + FC_SIZE;
        let mut fc_offset = 0;
        for chpx in &runs[..index] {
            let grpprl = chpx.payload().as_bytes();
            binary::write_u32_le(&mut buf, fc_offset, translator.get_byte_index(chpx.start()))?;

            grpprl_offset -= 1 + grpprl.len();
            grpprl_offset -= grpprl_offset % 2;
            buf[offset_offset] = (grpprl_offset / 2) as u8;
            buf[grpprl_offset] = grpprl.len() as u8;
            buf[grpprl_offset + 1..grpprl_offset + 1 + grpprl.len()].copy_from_slice(grpprl);

            offset_offset += 1;
            fc_offset += FC_SIZE;
        }
        if let Some(last) = runs[..index].last() {
            binary::write_u32_le(&mut buf, fc_offset, translator.get_byte_index(last.end()))?;
        }

        Ok(PackedPage {
            bytes: buf,
            consumed: index,
        })
    }
}

impl FormattedDiskPage for ChpxFkp<'_> {
    fn page(&self) -> &[u8] {
        self.page
    }

    fn grpprl(&self, index: usize) -> Result<&[u8]> {
        let offset_at = (self.run_count() + 1) * FC_SIZE + index;
        let grpprl_offset = 2 * binary::read_u8(self.page, offset_at)? as usize;

        // Offset 0: the run takes the Normal style unchanged
        if grpprl_offset == 0 {
            return Ok(&[]);
        }
        let size = binary::read_u8(self.page, grpprl_offset)? as usize;
        Ok(binary::slice(self.page, grpprl_offset + 1, size)?)
    }
}

/// PAPX FKP (Paragraph Property Formatted Disk Page).
///
/// Each run has a 13-byte BX: a word offset to the PAPX and the paragraph
/// height. The PAPX size byte counts words; an even grpprl length is stored
/// after a zero pad byte.
#[derive(Debug, Clone, Copy)]
pub struct PapxFkp<'a> {
    page: &'a [u8],
}

impl<'a> PapxFkp<'a> {
    /// View the page at `offset` in the WordDocument stream.
    pub fn parse(document_stream: &'a [u8], offset: usize) -> Result<Self> {
        Ok(Self {
            page: page_at(document_stream, offset)?,
        })
    }

    fn bx_offset(&self, index: usize) -> usize {
        (self.run_count() + 1) * FC_SIZE + index * BX_SIZE
    }

    /// Paragraph height of run `index`.
    pub fn paragraph_height(&self, index: usize) -> Result<ParagraphHeight> {
        ParagraphHeight::parse(binary::slice(
            self.page,
            self.bx_offset(index) + 1,
            ParagraphHeight::SIZE,
        )?)
    }

    /// Decode every run into the character domain, following huge PAPX
    /// pointers into `data_stream`.
    pub fn runs(
        &self,
        translator: &dyn CharIndexTranslator,
        data_stream: &DataStream,
    ) -> Result<Vec<Papx>> {
        (0..self.run_count())
            .map(|index| {
                let (start, end) = self.char_bounds(index, translator)?;
                let sprm_buf = resolve_huge_papx(self.grpprl(index)?, data_stream);
                PropertyNode::new(
                    start,
                    end,
                    PapxProperties::new(sprm_buf, self.paragraph_height(index)?),
                )
            })
            .collect()
    }

    /// Pack as many leading `runs` as fit into one page.
    ///
    /// Identical consecutive grpprls share storage. A grpprl longer than
    /// [`HUGE_GRPPRL_THRESHOLD`] is appended to `data_stream` and replaced by
    /// an 8-byte `sprmPHugePapx` pointer.
    pub fn pack(
        runs: &[Papx],
        translator: &dyn CharIndexTranslator,
        data_stream: &mut DataStream,
    ) -> Result<PackedPage> {
        let mut total_size = FC_SIZE;
        let mut last_grpprl: &[u8] = &[];
        let mut index = 0;
        while index < runs.len() {
            let grpprl = runs[index].payload().grpprl();
            let mut grpprl_len = grpprl.len();
            if grpprl_len > HUGE_GRPPRL_THRESHOLD {
                grpprl_len = 8;
            }
            let addition = if grpprl == last_grpprl {
                FC_SIZE + BX_SIZE
            } else {
                FC_SIZE + BX_SIZE + grpprl_len + 1
            };
            if total_size + addition > 511 + index % 2 {
                break;
            }
            total_size += addition;
            // grpprls start on word boundaries
            total_size += if grpprl_len % 2 > 0 { 1 } else { 2 };
            last_grpprl = grpprl;
            index += 1;
        }
        if index == 0 && !runs.is_empty() {
            return Err(Error::CorruptedFile(
                "paragraph run does not fit an empty page".to_string(),
            ));
        }

        let mut buf = vec![0u8; FKP_PAGE_SIZE];
        buf[FKP_PAGE_SIZE - 1] = index as u8;

        let mut bx_offset = FC_SIZE * index + FC_SIZE;
        let mut grpprl_offset = 511;
        let mut fc_offset = 0;
        // (as held by the run, as stored in the page)
        let mut last: Option<(&[u8], Vec<u8>)> = None;
        for papx in &runs[..index] {
            let original = papx.payload().grpprl();
            let same = last.as_ref().is_some_and(|(previous, _)| *previous == original);
            let grpprl = match &last {
                Some((_, stored)) if same => stored.clone(),
                _ if original.len() > HUGE_GRPPRL_THRESHOLD => {
                    relocate_huge_papx(papx.payload(), data_stream)?
                },
                _ => original.to_vec(),
            };

            if !same {
                grpprl_offset -= grpprl.len() + (2 - grpprl.len() % 2);
                grpprl_offset -= grpprl_offset % 2;
            }

            binary::write_u32_le(&mut buf, fc_offset, translator.get_byte_index(papx.start()))?;
            buf[bx_offset] = (grpprl_offset / 2) as u8;
            buf[bx_offset + 1..bx_offset + BX_SIZE]
                .copy_from_slice(&papx.payload().height().to_bytes());

            if !same {
                let mut copy_offset = grpprl_offset;
                if grpprl.len() % 2 > 0 {
                    buf[copy_offset] = grpprl.len().div_ceil(2) as u8;
                    copy_offset += 1;
                } else {
                    buf[copy_offset + 1] = (grpprl.len() / 2) as u8;
                    copy_offset += 2;
                }
                buf[copy_offset..copy_offset + grpprl.len()].copy_from_slice(&grpprl);
                last = Some((original, grpprl));
            }

            bx_offset += BX_SIZE;
            fc_offset += FC_SIZE;
        }
        if let Some(last_run) = runs[..index].last() {
            binary::write_u32_le(&mut buf, fc_offset, translator.get_byte_index(last_run.end()))?;
        }

        Ok(PackedPage {
            bytes: buf,
            consumed: index,
        })
    }
}

impl FormattedDiskPage for PapxFkp<'_> {
    fn page(&self) -> &[u8] {
        self.page
    }

    fn grpprl(&self, index: usize) -> Result<&[u8]> {
        let mut papx_offset = 2 * binary::read_u8(self.page, self.bx_offset(index))? as usize;
        let mut size = 2 * binary::read_u8(self.page, papx_offset)? as usize;
        if size == 0 {
            papx_offset += 1;
            size = 2 * binary::read_u8(self.page, papx_offset)? as usize;
        } else {
            size -= 1;
        }
        Ok(binary::slice(self.page, papx_offset + 1, size)?)
    }
}

/// Replace an 8-byte huge PAPX pointer by the grpprl it points at, keeping
/// the style index from the page. Anything else is taken as-is.
fn resolve_huge_papx(grpprl: &[u8], data_stream: &DataStream) -> SprmBuffer {
    let inline = SprmBuffer::new(grpprl.to_vec(), 2);
    if grpprl.len() != 8 {
        return inline;
    }
    let Some(sprm) = parse_sprms(&grpprl[2..]).into_iter().next() else {
        return inline;
    };
    if !HUGE_PAPX_OPERATIONS.contains(&sprm.operation_code()) || sprm.size_code() != 3 {
        return inline;
    }
    let Some(offset) = sprm.operand_dword() else {
        return inline;
    };

    match data_stream.read_grpprl(offset) {
        Ok(huge) => {
            trace!(offset, len = huge.len(), "resolved huge PAPX");
            let mut bytes = Vec::with_capacity(2 + huge.len());
            bytes.extend_from_slice(&grpprl[..2]);
            bytes.extend_from_slice(huge);
            SprmBuffer::new(bytes, 2)
        },
        Err(err) => {
            debug!(offset, %err, "huge PAPX pointer outside the data stream");
            inline
        },
    }
}

/// Append the SPRMs of `props` to the data stream and build the 8-byte
/// pointer grpprl that replaces them in the page.
fn relocate_huge_papx(props: &PapxProperties, data_stream: &mut DataStream) -> Result<Vec<u8>> {
    let offset = data_stream.append_grpprl(props.sprm_buf().grpprl())?;
    debug!(offset, len = props.grpprl().len(), "relocated huge PAPX");

    let mut pointer = SprmBuffer::with_istd(props.istd());
    pointer.add_sprm_u32(SPRM_P_HUGE_PAPX, offset);
    Ok(pointer.as_bytes().to_vec())
}
