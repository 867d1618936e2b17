//! Section table (PlcfSed) and section property exceptions (SEPX).
//!
//! The plex maps byte ranges of the WordDocument stream to 12-byte section
//! descriptors; each descriptor points at a size-prefixed SEPX grpprl in the
//! same stream.
//!
//! References:
//! - org.apache.poi.hwpf.model.SectionTable
//! - org.apache.poi.hwpf.model.SectionDescriptor
//! - [MS-DOC] 2.8.26 PlcfSed, 2.9.253 Sed

use super::bin_table::{
    adjust_runs_for_delete, adjust_runs_for_insert, check_runs_cover, run_index_for_char,
};
use super::piece_table::CharIndexTranslator;
use crate::common::binary::{self, read_u16_le};
use crate::common::error::{Error, Result};
use crate::ole::plcf::PlexOfCps;
use crate::ole::property_node::{GenericPropertyNode, PropertyNode};
use crate::ole::sprm::SprmBuffer;
use bytes::Bytes;
use tracing::{debug, warn};
use zerocopy::{FromBytes, IntoBytes, LE, U16, U32};
use zerocopy_derive::{FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes};

/// `fcSepx` value meaning the section has no SEPX.
const NO_SEPX: u32 = 0xFFFF_FFFF;

/// Section descriptor (SED), 12 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveFromBytes, DeriveIntoBytes, Immutable)]
#[repr(C)]
pub struct SectionDescriptor {
    fn_info: U16<LE>,
    fc_sepx: U32<LE>,
    fn_mpr: U16<LE>,
    fc_mpr: U32<LE>,
}

impl Default for SectionDescriptor {
    fn default() -> Self {
        Self {
            fn_info: U16::new(0),
            fc_sepx: U32::new(NO_SEPX),
            fn_mpr: U16::new(0),
            fc_mpr: U32::new(0),
        }
    }
}

impl SectionDescriptor {
    pub const SIZE: usize = 12;

    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::read_from_bytes(binary::slice(raw, 0, Self::SIZE)?).map_err(|_| Error::StructSize {
            expected: Self::SIZE,
            actual: raw.len(),
        })
    }

    /// Offset of the SEPX in the WordDocument stream, if there is one.
    pub fn sepx_offset(&self) -> Option<u32> {
        Some(self.fc_sepx.get()).filter(|&fc| fc != NO_SEPX)
    }

    pub fn set_sepx_offset(&mut self, fc: u32) {
        self.fc_sepx.set(fc);
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

/// SEPX payload: the descriptor and the section grpprl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionProperties {
    descriptor: SectionDescriptor,
    sprm_buf: SprmBuffer,
}

impl SectionProperties {
    pub fn new(descriptor: SectionDescriptor, sprm_buf: SprmBuffer) -> Self {
        Self {
            descriptor,
            sprm_buf,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &SectionDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn sprm_buf(&self) -> &SprmBuffer {
        &self.sprm_buf
    }

    #[inline]
    pub fn sprm_buf_mut(&mut self) -> &mut SprmBuffer {
        &mut self.sprm_buf
    }
}

/// A section: interval plus SEPX.
pub type Sepx = PropertyNode<SectionProperties>;

/// Section table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionTable {
    sections: Vec<Sepx>,
}

impl SectionTable {
    pub fn from_sections(sections: Vec<Sepx>) -> Self {
        Self { sections }
    }

    /// Decode the PlcfSed at `offset..offset + size` of the table stream.
    ///
    /// `main_length` is the length of the main document text (`ccpText`).
    pub fn parse(
        document_stream: &[u8],
        table_stream: &[u8],
        offset: usize,
        size: usize,
        translator: &dyn CharIndexTranslator,
        main_length: u32,
    ) -> Result<Self> {
        let plex = PlexOfCps::parse(table_stream, offset, size, SectionDescriptor::SIZE)?;

        let mut sections = Vec::with_capacity(plex.len());
        for node in plex.properties() {
            let descriptor = SectionDescriptor::parse(node.payload())?;
            let sprm_buf = match descriptor.sepx_offset() {
                None => SprmBuffer::default(),
                Some(fc) => {
                    let fc = fc as usize;
                    let sepx_size = read_u16_le(document_stream, fc)? as usize;
                    SprmBuffer::from_grpprl(binary::slice(document_stream, fc + 2, sepx_size)?)
                },
            };

            let start = translator.get_char_index(node.start())?;
            let end = translator.get_char_index_from(node.end(), start)?;
            sections.push(PropertyNode::new(
                start,
                end.max(start),
                SectionProperties::new(descriptor, sprm_buf),
            )?);
        }

        Self::repair_byte_units(&mut sections, plex.properties(), main_length)?;
        sections.sort_by_key(PropertyNode::start);

        debug!(sections = sections.len(), "loaded section table");
        Ok(Self { sections })
    }

    /// Some producers record section bounds in the wrong unit. When no section
    /// ends at `main_length` but one ends just before it, take every bound
    /// straight from the plex.
    fn repair_byte_units(
        sections: &mut [Sepx],
        plex_nodes: &[GenericPropertyNode],
        main_length: u32,
    ) -> Result<()> {
        let mut match_at = false;
        let mut match_half = false;
        for section in sections.iter() {
            if section.end() == main_length {
                match_at = true;
            } else if section.end() == main_length || section.end() + 1 == main_length {
                match_half = true;
            }
        }
        if match_at || !match_half {
            return Ok(());
        }

        warn!(
            main_length,
            "section table appears to be recorded in bytes, using raw plex bounds"
        );
        for (section, node) in sections.iter_mut().zip(plex_nodes) {
            if node.start() > node.end() {
                return Err(Error::InvalidRange {
                    start: node.start(),
                    end: node.end(),
                });
            }
            section.set_start(node.start());
            section.set_end(node.end());
        }
        Ok(())
    }

    #[inline]
    pub fn sections(&self) -> &[Sepx] {
        &self.sections
    }

    #[inline]
    pub fn sections_mut(&mut self) -> &mut [Sepx] {
        &mut self.sections
    }

    pub fn run_index_for_char(&self, cp: u32) -> Option<usize> {
        run_index_for_char(&self.sections, cp)
    }

    pub fn adjust_for_insert(&mut self, list_index: usize, length: u32) -> Result<()> {
        adjust_runs_for_insert(&mut self.sections, list_index, length)
    }

    pub fn adjust_for_delete(&mut self, list_index: usize, offset: u32, length: u32) -> Result<()> {
        adjust_runs_for_delete(&mut self.sections, list_index, offset, length)
    }

    pub fn check_coverage(&self, total_chars: u32) -> Result<()> {
        check_runs_cover(&self.sections, total_chars)
    }

    /// Write each SEPX (2-byte size then grpprl) to `doc_stream`, point its
    /// descriptor at it, and append the byte-domain PlcfSed to
    /// `table_stream`. Returns the plex `(offset, size)`.
    pub fn write_to(
        &mut self,
        doc_stream: &mut Vec<u8>,
        table_stream: &mut Vec<u8>,
        translator: &dyn CharIndexTranslator,
    ) -> Result<(u32, u32)> {
        let mut plex = PlexOfCps::new(SectionDescriptor::SIZE);

        for section in &mut self.sections {
            let grpprl = section.payload().sprm_buf().as_bytes();
            let size = u16::try_from(grpprl.len()).map_err(|_| {
                Error::CorruptedFile(format!("SEPX of {} bytes is too large", grpprl.len()))
            })?;
            let fc = doc_stream.len() as u32;
            doc_stream.extend_from_slice(&size.to_le_bytes());
            doc_stream.extend_from_slice(grpprl);

            let props = section.payload_mut();
            props.descriptor.set_sepx_offset(fc);
            plex.add_property(GenericPropertyNode::new(
                translator.get_byte_index(section.start()),
                translator.get_byte_index(section.end()),
                section.payload().descriptor().to_bytes(),
            )?)?;
        }

        Ok(plex.write_to(table_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::doc::parts::piece_table::TextPieceTable;
    use crate::ole::doc::parts::piece_table::tests::{ansi_piece, unicode_piece};
    use crate::ole::sprm_operations::SPRM_S_F_TITLE_PAGE;

    fn section(start: u32, end: u32, title_page: Option<u8>) -> Sepx {
        let mut buf = SprmBuffer::default();
        if let Some(flag) = title_page {
            buf.add_sprm_u8(SPRM_S_F_TITLE_PAGE, flag);
        }
        PropertyNode::new(
            start,
            end,
            SectionProperties::new(SectionDescriptor::default(), buf),
        )
        .unwrap()
    }

    /// A PlcfSed with the given byte bounds and no SEPXs.
    fn raw_plex(bounds: &[(u32, u32)]) -> Vec<u8> {
        let mut plex = PlexOfCps::new(SectionDescriptor::SIZE);
        for &(start, end) in bounds {
            plex.add_property(
                GenericPropertyNode::new(start, end, SectionDescriptor::default().to_bytes())
                    .unwrap(),
            )
            .unwrap();
        }
        plex.to_bytes()
    }

    #[test]
    fn test_descriptor_layout() {
        let mut sed = SectionDescriptor::default();
        assert_eq!(sed.sepx_offset(), None);
        sed.set_sepx_offset(0x0400);
        let raw = sed.to_bytes();
        assert_eq!(raw.len(), SectionDescriptor::SIZE);
        assert_eq!(&raw[2..6], &0x0400u32.to_le_bytes());
        assert_eq!(SectionDescriptor::parse(&raw).unwrap(), sed);
    }

    #[test]
    fn test_write_then_parse() {
        let translator = TextPieceTable::from_pieces(vec![
            ansi_piece(0, 30, 512, b's'),
            unicode_piece(30, "tail", 1024),
        ]);
        let mut table =
            SectionTable::from_sections(vec![section(0, 30, Some(1)), section(30, 34, None)]);

        let mut doc = vec![0u8; 7];
        let mut table_stream = Vec::new();
        let (offset, size) = table
            .write_to(&mut doc, &mut table_stream, &translator)
            .unwrap();
        assert_eq!(table.sections()[0].payload().descriptor().sepx_offset(), Some(7));
        assert_eq!(read_u16_le(&doc, 7).unwrap(), 3);

        let parsed = SectionTable::parse(
            &doc,
            &table_stream,
            offset as usize,
            size as usize,
            &translator,
            34,
        )
        .unwrap();
        assert_eq!(parsed, table);
        assert!(
            parsed.sections()[0]
                .payload()
                .sprm_buf()
                .find_sprm(SPRM_S_F_TITLE_PAGE)
                .is_some()
        );
        parsed.check_coverage(34).unwrap();
    }

    #[test]
    fn test_unit_repair_uses_raw_bounds() {
        // Text starts at byte 100, but the section was recorded as [0, 109)
        let translator = TextPieceTable::from_pieces(vec![ansi_piece(0, 20, 100, b'z')]);
        let plex = raw_plex(&[(0, 109)]);
        let table = SectionTable::parse(&[], &plex, 0, plex.len(), &translator, 10).unwrap();
        let s = &table.sections()[0];
        assert_eq!((s.start(), s.end()), (0, 109));
    }

    #[test]
    fn test_no_repair_when_a_section_ends_at_main_length() {
        let translator = TextPieceTable::from_pieces(vec![ansi_piece(0, 20, 100, b'z')]);
        let plex = raw_plex(&[(100, 109), (109, 110)]);
        let table = SectionTable::parse(&[], &plex, 0, plex.len(), &translator, 10).unwrap();
        let bounds: Vec<_> = table.sections().iter().map(|s| (s.start(), s.end())).collect();
        assert_eq!(bounds, vec![(0, 9), (9, 10)]);
    }

    #[test]
    fn test_missing_sepx_reported() {
        let translator = TextPieceTable::from_pieces(vec![ansi_piece(0, 4, 0, b'z')]);
        let mut sed = SectionDescriptor::default();
        sed.set_sepx_offset(4000);
        let mut plex = PlexOfCps::new(SectionDescriptor::SIZE);
        plex.add_property(GenericPropertyNode::new(0, 4, sed.to_bytes()).unwrap())
            .unwrap();
        let bytes = plex.to_bytes();
        assert!(matches!(
            SectionTable::parse(&[0; 16], &bytes, 0, bytes.len(), &translator, 4),
            Err(Error::Binary(_))
        ));
    }

    #[test]
    fn test_adjust_keeps_sections_aligned() {
        let mut table =
            SectionTable::from_sections(vec![section(0, 30, None), section(30, 40, None)]);
        table.adjust_for_insert(0, 5).unwrap();
        table.check_coverage(45).unwrap();
        table.adjust_for_delete(0, 20, 20).unwrap();
        table.check_coverage(25).unwrap();
        assert_eq!(table.run_index_for_char(24), Some(1));
    }
}
