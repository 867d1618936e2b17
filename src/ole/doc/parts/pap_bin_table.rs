//! PAPBinTable (Paragraph Property Bin Table).
//!
//! Same two-level layout as the character table: a PlcfBtePapx of page
//! numbers and 512-byte PAPX FKPs. Paragraph grpprls start with the style
//! index, and oversized ones live in the Data stream.
//!
//! References:
//! - org.apache.poi.hwpf.model.PAPBinTable
//! - org.apache.poi.hwpf.model.PAPFormattedDiskPage
//! - [MS-DOC] 2.8.6 PlcfBtePapx

use super::bin_table::{
    adjust_runs_for_delete, adjust_runs_for_insert, check_runs_cover, insert_run, page_offsets,
    run_index_for_char, split_runs_at, write_pages,
};
use super::data_stream::DataStream;
use super::fkp::{ParagraphHeight, Papx, PapxFkp, PapxProperties};
use super::piece_table::CharIndexTranslator;
use crate::common::error::Result;
use crate::ole::sprm::SprmBuffer;
use tracing::debug;

/// PAPBinTable - the paragraphs of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PapBinTable {
    paragraphs: Vec<Papx>,
}

impl PapBinTable {
    pub fn from_paragraphs(paragraphs: Vec<Papx>) -> Self {
        Self { paragraphs }
    }

    /// Load every PAPX FKP listed by the PlcfBtePapx at
    /// `offset..offset + size` of the table stream.
    pub fn parse(
        document_stream: &[u8],
        table_stream: &[u8],
        data_stream: &DataStream,
        offset: usize,
        size: usize,
        translator: &dyn CharIndexTranslator,
    ) -> Result<Self> {
        let mut paragraphs = Vec::new();
        for page_offset in page_offsets(table_stream, offset, size)? {
            let fkp = PapxFkp::parse(document_stream, page_offset)?;
            paragraphs.extend(fkp.runs(translator, data_stream)?);
        }

        debug!(paragraphs = paragraphs.len(), "loaded paragraph bin table");
        Ok(Self { paragraphs })
    }

    #[inline]
    pub fn paragraphs(&self) -> &[Papx] {
        &self.paragraphs
    }

    #[inline]
    pub fn paragraphs_mut(&mut self) -> &mut [Papx] {
        &mut self.paragraphs
    }

    pub fn run_index_for_char(&self, cp: u32) -> Option<usize> {
        run_index_for_char(&self.paragraphs, cp)
    }

    /// Insert an empty paragraph with properties `buf` at `cp_start`. The
    /// paragraph height is left at zero, Word recomputes it.
    pub fn insert(&mut self, list_index: usize, cp_start: u32, buf: SprmBuffer) -> Result<usize> {
        let props = PapxProperties::new(buf, ParagraphHeight::default());
        insert_run(&mut self.paragraphs, list_index, cp_start, props)
    }

    pub fn adjust_for_insert(&mut self, list_index: usize, length: u32) -> Result<()> {
        adjust_runs_for_insert(&mut self.paragraphs, list_index, length)
    }

    pub fn adjust_for_delete(&mut self, list_index: usize, offset: u32, length: u32) -> Result<()> {
        adjust_runs_for_delete(&mut self.paragraphs, list_index, offset, length)
    }

    pub fn check_coverage(&self, total_chars: u32) -> Result<()> {
        check_runs_cover(&self.paragraphs, total_chars)
    }

    /// Write the paragraphs as PAPX FKPs into `doc_stream` and the
    /// PlcfBtePapx into `table_stream`; huge grpprls go to `data_stream`.
    /// Returns the plex `(offset, size)`.
    pub fn write_to(
        &mut self,
        doc_stream: &mut Vec<u8>,
        table_stream: &mut Vec<u8>,
        data_stream: &mut DataStream,
        fc_min: u32,
        translator: &dyn CharIndexTranslator,
    ) -> Result<(u32, u32)> {
        split_runs_at(&mut self.paragraphs, &translator.file_breaks());
        let plex = write_pages(&self.paragraphs, doc_stream, fc_min, |runs| {
            PapxFkp::pack(runs, translator, data_stream)
        })?;
        Ok(plex.write_to(table_stream))
    }
}
