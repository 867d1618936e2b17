//! CHPBinTable (Character Property Bin Table).
//!
//! Based on Apache POI's CHPBinTable class.
//! This handles the two-level structure of character properties in DOC files:
//! 1. PlcfBteChpx: Contains BTE entries with page numbers
//! 2. CHPXFKP pages: 512-byte pages containing actual character runs
//!
//! Once loaded the table is a flat, character-ordered list of runs.
//!
//! References:
//! - org.apache.poi.hwpf.model.CHPBinTable
//! - org.apache.poi.hwpf.model.CHPFormattedDiskPage
//! - [MS-DOC] 2.8.5 PlcfBteChpx

use super::bin_table::{
    adjust_runs_for_delete, adjust_runs_for_insert, check_runs_cover, insert_run, page_offsets,
    run_index_for_char, split_runs_at, write_pages,
};
use super::fkp::{Chpx, ChpxFkp};
use super::piece_table::CharIndexTranslator;
use crate::common::error::Result;
use crate::ole::sprm::SprmBuffer;
use tracing::debug;

/// CHPBinTable - the character runs of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChpBinTable {
    text_runs: Vec<Chpx>,
}

impl ChpBinTable {
    pub fn from_runs(text_runs: Vec<Chpx>) -> Self {
        Self { text_runs }
    }

    /// Load every CHPX FKP listed by the PlcfBteChpx at
    /// `offset..offset + size` of the table stream.
    ///
    /// Runs are appended in page order, which is character order.
    pub fn parse(
        document_stream: &[u8],
        table_stream: &[u8],
        offset: usize,
        size: usize,
        translator: &dyn CharIndexTranslator,
    ) -> Result<Self> {
        let mut text_runs = Vec::new();
        for page_offset in page_offsets(table_stream, offset, size)? {
            let fkp = ChpxFkp::parse(document_stream, page_offset)?;
            text_runs.extend(fkp.runs(translator)?);
        }

        debug!(runs = text_runs.len(), "loaded character bin table");
        Ok(Self { text_runs })
    }

    /// Character runs in character order, dead (zero-length) runs included.
    #[inline]
    pub fn text_runs(&self) -> &[Chpx] {
        &self.text_runs
    }

    #[inline]
    pub fn text_runs_mut(&mut self) -> &mut [Chpx] {
        &mut self.text_runs
    }

    /// Index of the run holding `cp`.
    pub fn run_index_for_char(&self, cp: u32) -> Option<usize> {
        run_index_for_char(&self.text_runs, cp)
    }

    /// Insert an empty run with properties `buf` at `cp_start`, splitting run
    /// `list_index` if it strictly contains the position. Returns the index
    /// of the new run.
    pub fn insert(&mut self, list_index: usize, cp_start: u32, buf: SprmBuffer) -> Result<usize> {
        insert_run(&mut self.text_runs, list_index, cp_start, buf)
    }

    pub fn adjust_for_insert(&mut self, list_index: usize, length: u32) -> Result<()> {
        adjust_runs_for_insert(&mut self.text_runs, list_index, length)
    }

    pub fn adjust_for_delete(&mut self, list_index: usize, offset: u32, length: u32) -> Result<()> {
        adjust_runs_for_delete(&mut self.text_runs, list_index, offset, length)
    }

    /// Verify the runs tile `[0, total_chars)`.
    pub fn check_coverage(&self, total_chars: u32) -> Result<()> {
        check_runs_cover(&self.text_runs, total_chars)
    }

    /// Write the runs as CHPX FKPs into `doc_stream` and the PlcfBteChpx
    /// into `table_stream`. Returns the plex `(offset, size)`.
    pub fn write_to(
        &mut self,
        doc_stream: &mut Vec<u8>,
        table_stream: &mut Vec<u8>,
        fc_min: u32,
        translator: &dyn CharIndexTranslator,
    ) -> Result<(u32, u32)> {
        split_runs_at(&mut self.text_runs, &translator.file_breaks());
        let plex = write_pages(&self.text_runs, doc_stream, fc_min, |runs| {
            ChpxFkp::pack(runs, translator)
        })?;
        Ok(plex.write_to(table_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::doc::parts::piece_table::TextPieceTable;
    use crate::ole::doc::parts::piece_table::tests::{ansi_piece, unicode_piece};
    use crate::ole::property_node::PropertyNode;
    use crate::ole::sprm_operations::{SPRM_C_F_BOLD, SPRM_C_F_ITALIC, SPRM_C_HPS};

    fn run(start: u32, end: u32, hps: u16) -> Chpx {
        let mut buf = SprmBuffer::default();
        buf.add_sprm_u16(SPRM_C_HPS, hps);
        PropertyNode::new(start, end, buf).unwrap()
    }

    #[test]
    fn test_write_then_parse_many_pages() {
        let translator = TextPieceTable::from_pieces(vec![ansi_piece(0, 3000, 1024, b'm')]);
        let runs: Vec<Chpx> = (0..300).map(|i| run(i * 10, i * 10 + 10, i as u16)).collect();
        let mut table = ChpBinTable::from_runs(runs);

        let mut doc = vec![0u8; 1500];
        let mut table_stream = vec![0u8; 3];
        let (offset, size) = table
            .write_to(&mut doc, &mut table_stream, 1024, &translator)
            .unwrap();
        assert_eq!(offset, 3);
        assert_eq!(doc.len() % 512, 0);
        // More than one page was needed
        assert!(size > 12);

        let parsed = ChpBinTable::parse(
            &doc,
            &table_stream,
            offset as usize,
            size as usize,
            &translator,
        )
        .unwrap();
        assert_eq!(parsed, table);
        parsed.check_coverage(3000).unwrap();
    }

    #[test]
    fn test_round_trip_over_unicode_pieces() {
        let translator = TextPieceTable::from_pieces(vec![
            ansi_piece(0, 20, 2048, b'a'),
            unicode_piece(20, "wide text", 4096),
        ]);
        let mut table =
            ChpBinTable::from_runs(vec![run(0, 15, 20), run(15, 24, 22), run(24, 29, 24)]);

        let mut doc = Vec::new();
        let mut table_stream = Vec::new();
        let (offset, size) = table
            .write_to(&mut doc, &mut table_stream, 2048, &translator)
            .unwrap();
        let parsed =
            ChpBinTable::parse(&doc, &table_stream, offset as usize, size as usize, &translator)
                .unwrap();
        assert_eq!(parsed, table);
        // [15, 24) spans the jump from byte 2068 to 4096 and is written as two runs
        let bounds: Vec<_> = parsed.text_runs().iter().map(|r| (r.start(), r.end())).collect();
        assert_eq!(bounds, vec![(0, 15), (15, 20), (20, 24), (24, 29)]);
    }

    #[test]
    fn test_run_over_reversed_pieces() {
        // Contiguous in the file, reversed in character order
        let translator = TextPieceTable::from_pieces(vec![
            ansi_piece(0, 5, 105, b'a'),
            ansi_piece(5, 5, 100, b'b'),
        ]);
        let mut italic = SprmBuffer::default();
        italic.add_sprm_u8(SPRM_C_F_ITALIC, 1);
        let mut table = ChpBinTable::from_runs(vec![PropertyNode::new(0, 10, italic).unwrap()]);

        let mut doc = Vec::new();
        let mut table_stream = Vec::new();
        let (offset, size) = table
            .write_to(&mut doc, &mut table_stream, 100, &translator)
            .unwrap();
        let parsed =
            ChpBinTable::parse(&doc, &table_stream, offset as usize, size as usize, &translator)
                .unwrap();

        assert_eq!(parsed, table);
        let bounds: Vec<_> = parsed.text_runs().iter().map(|r| (r.start(), r.end())).collect();
        assert_eq!(bounds, vec![(0, 5), (5, 10)]);
        assert!(parsed
            .text_runs()
            .iter()
            .all(|r| r.payload().find_sprm(SPRM_C_F_ITALIC).is_some()));
        parsed.check_coverage(10).unwrap();
    }

    #[test]
    fn test_formatted_insert_and_delete() {
        let mut table = ChpBinTable::from_runs(vec![run(0, 10, 20), run(10, 20, 24)]);
        let index = table.run_index_for_char(5).unwrap();
        let mut bold = SprmBuffer::default();
        bold.add_sprm_u8(SPRM_C_F_BOLD, 1);

        let at = table.insert(index, 5, bold).unwrap();
        table.adjust_for_insert(at, 3).unwrap();
        table.check_coverage(23).unwrap();
        assert!(table.text_runs()[at].payload().find_sprm(SPRM_C_F_BOLD).is_some());
        assert_eq!(
            (table.text_runs()[at].start(), table.text_runs()[at].end()),
            (5, 8)
        );

        table.adjust_for_delete(0, 2, 10).unwrap();
        table.check_coverage(13).unwrap();
    }

    #[test]
    fn test_empty_table_writes_empty_plex() {
        let translator = TextPieceTable::from_pieces(vec![ansi_piece(0, 1, 0, b'x')]);
        let mut doc = Vec::new();
        let mut table_stream = Vec::new();
        let (_, size) = ChpBinTable::default()
            .write_to(&mut doc, &mut table_stream, 0, &translator)
            .unwrap();
        assert_eq!(size, 4);
        assert!(doc.is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use crate::ole::doc::parts::piece_table::tests::touching_pieces;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(48))]

            #[test]
            fn prop_write_parse_round_trip(
                specs in prop::collection::vec((1u32..40, prop::collection::vec(any::<u8>(), 0..60)), 1..150),
                split_seed in any::<u32>(),
                reversed in any::<bool>(),
            ) {
                let total: u32 = specs.iter().map(|(len, _)| len).sum();
                let translator = touching_pieces(total, split_seed, reversed);

                let mut cp = 0;
                let runs: Vec<Chpx> = specs
                    .into_iter()
                    .map(|(len, grpprl)| {
                        let node = PropertyNode::new(cp, cp + len, SprmBuffer::from_grpprl(&grpprl)).unwrap();
                        cp += len;
                        node
                    })
                    .collect();
                let mut table = ChpBinTable::from_runs(runs);

                let mut doc = vec![0u8; 512];
                let mut table_stream = Vec::new();
                let (offset, size) = table.write_to(&mut doc, &mut table_stream, 512, &translator).unwrap();
                let parsed = ChpBinTable::parse(&doc, &table_stream, offset as usize, size as usize, &translator).unwrap();
                prop_assert_eq!(&parsed, &table);
                prop_assert!(parsed.check_coverage(total).is_ok());
            }
        }
    }
}
