//! Document storage tables.
//!
//! [`DocumentTables`] owns the piece table, the character and paragraph bin
//! tables and the section table of one document and keeps them aligned while
//! text is inserted or deleted. Loading reads them from the three streams of
//! a Word 97+ file; writing lays them out again.
//!
//! # Stream layout on write
//!
//! ```text
//! WordDocument: [FIB][pad][piece text, 512-aligned][SEPX..][pad][CHPX FKPs][PAPX FKPs]
//! 1Table:       [loaded table stream][CLX][PlcfSed][PlcfBteChpx][PlcfBtePapx]
//! Data:         [loaded data stream][relocated huge PAPX grpprls]
//! ```

use super::chp_bin_table::ChpBinTable;
use super::clx::ComplexFileTable;
use super::data_stream::DataStream;
use super::fib::{FibField, FileInformationBlock};
use super::fkp::{ParagraphHeight, PapxProperties};
use super::pap_bin_table::PapBinTable;
use super::piece_table::{PieceDescriptor, TextPiece, TextPieceTable};
use super::section_table::{SectionDescriptor, SectionProperties, SectionTable};
use crate::common::error::{Error, Result};
use crate::ole::property_node::PropertyNode;
use crate::ole::sprm::SprmBuffer;
use tracing::debug;

/// Streams produced by [`DocumentTables::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenStreams {
    pub word_document: Vec<u8>,
    pub table_stream: Vec<u8>,
    pub data_stream: Vec<u8>,
    /// "0Table" or "1Table", as selected by the FIB.
    pub table_stream_name: &'static str,
}

/// List indices of the entries covering one character position.
#[derive(Debug, Clone, Copy)]
struct EditTargets {
    piece: usize,
    run: usize,
    paragraph: usize,
    section: usize,
}

/// The storage tables of a document.
#[derive(Debug, Clone)]
pub struct DocumentTables {
    fib: FileInformationBlock,
    clx: ComplexFileTable,
    character_table: ChpBinTable,
    paragraph_table: PapBinTable,
    section_table: SectionTable,
    table_stream: Vec<u8>,
    data_stream: DataStream,
    main_length: u32,
}

impl DocumentTables {
    /// A blank document holding `text` in a single unicode piece, with one
    /// unformatted run, paragraph and section spanning it.
    pub fn new(text: &str) -> Result<Self> {
        let piece = TextPiece::from_text(0, text, PieceDescriptor::new(0, true));
        let length = piece.end();

        let mut fib = FileInformationBlock::new();
        fib.set_ccp_text(length);

        let run = PropertyNode::new(0, length, SprmBuffer::default())?;
        let paragraph = PropertyNode::new(
            0,
            length,
            PapxProperties::new(SprmBuffer::with_istd(0), ParagraphHeight::default()),
        )?;
        let section = PropertyNode::new(
            0,
            length,
            SectionProperties::new(SectionDescriptor::default(), SprmBuffer::default()),
        )?;

        Ok(Self {
            fib,
            clx: ComplexFileTable::new(TextPieceTable::from_pieces(vec![piece])),
            character_table: ChpBinTable::from_runs(vec![run]),
            paragraph_table: PapBinTable::from_paragraphs(vec![paragraph]),
            section_table: SectionTable::from_sections(vec![section]),
            table_stream: Vec::new(),
            data_stream: DataStream::default(),
            main_length: length,
        })
    }

    /// Load the tables from the WordDocument stream, the table stream named
    /// by the FIB and the Data stream (empty when the file has none).
    pub fn load(word_document: &[u8], table_stream: &[u8], data_stream: &[u8]) -> Result<Self> {
        let fib = FileInformationBlock::parse(word_document)?;
        let fc_min = fib.fc_min();
        let main_length = fib.ccp_text();
        let data_stream = DataStream::new(data_stream.to_vec());

        let (clx_offset, _) = fib.field(FibField::Clx)?;
        let clx = ComplexFileTable::parse(word_document, table_stream, clx_offset as usize, fc_min)?;
        let pieces = clx.text_pieces();

        let (offset, size) = fib.field(FibField::PlcfBteChpx)?;
        let character_table = ChpBinTable::parse(
            word_document,
            table_stream,
            offset as usize,
            size as usize,
            pieces,
        )?;

        let (offset, size) = fib.field(FibField::PlcfBtePapx)?;
        let paragraph_table = PapBinTable::parse(
            word_document,
            table_stream,
            &data_stream,
            offset as usize,
            size as usize,
            pieces,
        )?;

        let (offset, size) = fib.field(FibField::PlcfSed)?;
        let section_table = SectionTable::parse(
            word_document,
            table_stream,
            offset as usize,
            size as usize,
            pieces,
            main_length,
        )?;

        debug!(
            pieces = pieces.len(),
            runs = character_table.text_runs().len(),
            paragraphs = paragraph_table.paragraphs().len(),
            sections = section_table.sections().len(),
            "loaded document tables"
        );

        Ok(Self {
            fib,
            clx,
            character_table,
            paragraph_table,
            section_table,
            table_stream: table_stream.to_vec(),
            data_stream,
            main_length,
        })
    }

    #[inline]
    pub fn fib(&self) -> &FileInformationBlock {
        &self.fib
    }

    #[inline]
    pub fn complex_file_table(&self) -> &ComplexFileTable {
        &self.clx
    }

    #[inline]
    pub fn text_pieces(&self) -> &TextPieceTable {
        self.clx.text_pieces()
    }

    #[inline]
    pub fn character_table(&self) -> &ChpBinTable {
        &self.character_table
    }

    #[inline]
    pub fn character_table_mut(&mut self) -> &mut ChpBinTable {
        &mut self.character_table
    }

    #[inline]
    pub fn paragraph_table(&self) -> &PapBinTable {
        &self.paragraph_table
    }

    #[inline]
    pub fn paragraph_table_mut(&mut self) -> &mut PapBinTable {
        &mut self.paragraph_table
    }

    #[inline]
    pub fn section_table(&self) -> &SectionTable {
        &self.section_table
    }

    #[inline]
    pub fn data_stream(&self) -> &DataStream {
        &self.data_stream
    }

    /// Length of the main document text (`ccpText`), kept up to date by
    /// edits.
    #[inline]
    pub fn main_length(&self) -> u32 {
        self.main_length
    }

    /// The whole document text.
    pub fn text(&self) -> String {
        self.clx.text_pieces().text()
    }

    fn locate(&self, cp: u32) -> Result<EditTargets> {
        let pieces = self.clx.text_pieces();
        let piece = pieces
            .piece_index_for_char(cp)
            .ok_or_else(|| Error::index(cp as usize, pieces.total_chars() as usize))?;
        let missing = |what: &str| Error::CorruptedFile(format!("no {what} covers character {cp}"));

        Ok(EditTargets {
            piece,
            run: self
                .character_table
                .run_index_for_char(cp)
                .ok_or_else(|| missing("character run"))?,
            paragraph: self
                .paragraph_table
                .run_index_for_char(cp)
                .ok_or_else(|| missing("paragraph"))?,
            section: self
                .section_table
                .run_index_for_char(cp)
                .ok_or_else(|| missing("section"))?,
        })
    }

    /// Insert `text` at `cp`. The text takes the formatting of the run,
    /// paragraph and section it lands in.
    pub fn insert_text(&mut self, cp: u32, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let targets = self.locate(cp)?;
        self.apply_insert(cp, text, targets)
    }

    /// Insert `text` at `cp` as a new character run with properties `chpx`.
    pub fn insert_formatted_text(&mut self, cp: u32, text: &str, chpx: SprmBuffer) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut targets = self.locate(cp)?;
        targets.run = self.character_table.insert(targets.run, cp, chpx)?;
        self.apply_insert(cp, text, targets)
    }

    fn apply_insert(&mut self, cp: u32, text: &str, targets: EditTargets) -> Result<()> {
        let pieces = self.clx.text_pieces_mut();
        let piece = pieces.piece_mut(targets.piece)?;
        let offset = cp - piece.start();
        let length = piece.insert_text(offset, text);
        let length = pieces.adjust_for_insert(targets.piece, length)?;

        self.character_table.adjust_for_insert(targets.run, length)?;
        self.paragraph_table.adjust_for_insert(targets.paragraph, length)?;
        self.section_table.adjust_for_insert(targets.section, length)?;
        if cp <= self.main_length {
            self.main_length += length;
        }

        debug!(cp, length, "inserted text");
        Ok(())
    }

    /// Delete `length` characters starting at `cp`.
    pub fn delete(&mut self, cp: u32, length: u32) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        let end = cp.checked_add(length).ok_or(Error::InvalidRange {
            start: cp,
            end: u32::MAX,
        })?;
        if end > self.clx.text_pieces().total_chars() {
            return Err(Error::InvalidRange { start: cp, end });
        }
        let targets = self.locate(cp)?;

        self.character_table.adjust_for_delete(targets.run, cp, length)?;
        self.paragraph_table.adjust_for_delete(targets.paragraph, cp, length)?;
        self.section_table.adjust_for_delete(targets.section, cp, length)?;
        self.clx.text_pieces_mut().adjust_for_delete(cp, length);

        if cp < self.main_length {
            self.main_length -= end.min(self.main_length) - cp;
        }

        debug!(cp, length, "deleted text");
        Ok(())
    }

    /// Verify every property table tiles `[0, total_chars)`.
    pub fn check_coverage(&self) -> Result<()> {
        let total = self.clx.text_pieces().total_chars();
        self.character_table.check_coverage(total)?;
        self.paragraph_table.check_coverage(total)?;
        self.section_table.check_coverage(total)
    }

    /// Lay the tables out into new streams and patch the FIB to match.
    ///
    /// Piece and SEPX positions held in memory are updated to the written
    /// layout.
    pub fn write(&mut self) -> Result<WrittenStreams> {
        let mut word_document = vec![0u8; self.fib.len()];
        let mut table_stream = self.table_stream.clone();
        let mut data_stream = self.data_stream.clone();

        let (clx_offset, clx_len) = self.clx.write_to(&mut word_document, &mut table_stream)?;
        let pieces = self.clx.text_pieces();
        let fc_min = pieces
            .pieces_by_file_position()
            .next()
            .map_or(word_document.len() as u32, TextPiece::fc_start);
        let fc_mac = pieces.pieces().map(TextPiece::fc_end).max().unwrap_or(fc_min);

        let (sed_offset, sed_len) =
            self.section_table
                .write_to(&mut word_document, &mut table_stream, pieces)?;
        let (chp_offset, chp_len) = self.character_table.write_to(
            &mut word_document,
            &mut table_stream,
            fc_min,
            pieces,
        )?;
        let (pap_offset, pap_len) = self.paragraph_table.write_to(
            &mut word_document,
            &mut table_stream,
            &mut data_stream,
            fc_min,
            pieces,
        )?;

        self.fib.set_fc_min(fc_min);
        self.fib.set_fc_mac(fc_mac);
        self.fib.set_ccp_text(self.main_length);
        self.fib.set_field(FibField::Clx, clx_offset, clx_len)?;
        self.fib.set_field(FibField::PlcfSed, sed_offset, sed_len)?;
        self.fib.set_field(FibField::PlcfBteChpx, chp_offset, chp_len)?;
        self.fib.set_field(FibField::PlcfBtePapx, pap_offset, pap_len)?;
        word_document[..self.fib.len()].copy_from_slice(self.fib.as_bytes());

        debug!(
            word_document = word_document.len(),
            table_stream = table_stream.len(),
            data_stream = data_stream.len(),
            "wrote document tables"
        );

        Ok(WrittenStreams {
            word_document,
            table_stream,
            data_stream: data_stream.into_bytes(),
            table_stream_name: self.fib.table_stream_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::sprm_operations::{SPRM_C_F_BOLD, SPRM_P_DXA_LEFT, SPRM_P_JC};

    fn reload(tables: &mut DocumentTables) -> DocumentTables {
        let streams = tables.write().unwrap();
        DocumentTables::load(
            &streams.word_document,
            &streams.table_stream,
            &streams.data_stream,
        )
        .unwrap()
    }

    fn run_bounds(tables: &DocumentTables) -> Vec<(u32, u32)> {
        tables
            .character_table()
            .text_runs()
            .iter()
            .filter(|run| !run.is_empty())
            .map(|run| (run.start(), run.end()))
            .collect()
    }

    #[test]
    fn test_new_document_round_trip() {
        let mut tables = DocumentTables::new("Hello, world\r").unwrap();
        tables.check_coverage().unwrap();

        let loaded = reload(&mut tables);
        assert_eq!(loaded.text(), "Hello, world\r");
        assert_eq!(loaded.main_length(), 13);
        assert_eq!(loaded.text_pieces(), tables.text_pieces());
        assert_eq!(loaded.character_table(), tables.character_table());
        assert_eq!(loaded.paragraph_table(), tables.paragraph_table());
        assert_eq!(loaded.section_table(), tables.section_table());
        loaded.check_coverage().unwrap();
    }

    #[test]
    fn test_written_fib_points_at_text() {
        let mut tables = DocumentTables::new("abc").unwrap();
        let streams = tables.write().unwrap();
        assert_eq!(streams.table_stream_name, "1Table");

        let fib = FileInformationBlock::parse(&streams.word_document).unwrap();
        assert_eq!(fib.fc_min() % 512, 0);
        assert_eq!(fib.fc_mac(), fib.fc_min() + 6);
        assert_eq!(fib.ccp_text(), 3);
        let start = fib.fc_min() as usize;
        assert_eq!(&streams.word_document[start..start + 6], &[b'a', 0, b'b', 0, b'c', 0]);
    }

    #[test]
    fn test_insert_text_in_the_middle() {
        let mut tables = DocumentTables::new("first second\r").unwrap();
        tables.insert_text(6, "and ").unwrap();
        assert_eq!(tables.text(), "first and second\r");
        assert_eq!(tables.main_length(), 17);
        tables.check_coverage().unwrap();

        let loaded = reload(&mut tables);
        assert_eq!(loaded.text(), "first and second\r");
        assert_eq!(run_bounds(&loaded), vec![(0, 17)]);
        loaded.check_coverage().unwrap();
    }

    #[test]
    fn test_append_at_document_end() {
        let mut tables = DocumentTables::new("body").unwrap();
        tables.insert_text(4, " text").unwrap();
        assert_eq!(tables.text(), "body text");
        assert_eq!(tables.main_length(), 9);
        tables.check_coverage().unwrap();
    }

    #[test]
    fn test_insert_formatted_text_survives_write() {
        let mut tables = DocumentTables::new("plain plain\r").unwrap();
        let mut bold = SprmBuffer::default();
        bold.add_sprm_u8(SPRM_C_F_BOLD, 1);
        tables.insert_formatted_text(6, "bold ", bold).unwrap();

        assert_eq!(tables.text(), "plain bold plain\r");
        assert_eq!(run_bounds(&tables), vec![(0, 6), (6, 11), (11, 17)]);
        tables.check_coverage().unwrap();

        let loaded = reload(&mut tables);
        assert_eq!(run_bounds(&loaded), vec![(0, 6), (6, 11), (11, 17)]);
        let runs = loaded.character_table().text_runs();
        let bold_run = runs.iter().find(|run| run.start() == 6).unwrap();
        assert!(bold_run.payload().find_sprm(SPRM_C_F_BOLD).is_some());
        assert!(runs[0].payload().find_sprm(SPRM_C_F_BOLD).is_none());
    }

    #[test]
    fn test_delete_across_runs() {
        let mut tables = DocumentTables::new("one two three\r").unwrap();
        let mut bold = SprmBuffer::default();
        bold.add_sprm_u8(SPRM_C_F_BOLD, 1);
        tables.insert_formatted_text(4, "big ", bold).unwrap();
        assert_eq!(tables.text(), "one big two three\r");

        tables.delete(2, 8).unwrap();
        assert_eq!(tables.text(), "ono three\r");
        assert_eq!(tables.main_length(), 10);
        tables.check_coverage().unwrap();

        let loaded = reload(&mut tables);
        assert_eq!(loaded.text(), "ono three\r");
        loaded.check_coverage().unwrap();
    }

    #[test]
    fn test_paragraph_properties_survive_edits() {
        let mut tables = DocumentTables::new("centered\r").unwrap();
        tables.paragraph_table_mut().paragraphs_mut()[0]
            .payload_mut()
            .sprm_buf_mut()
            .add_sprm_u8(SPRM_P_JC, 1);
        tables.insert_text(0, "now ").unwrap();

        let loaded = reload(&mut tables);
        let paragraph = &loaded.paragraph_table().paragraphs()[0];
        assert_eq!((paragraph.start(), paragraph.end()), (0, 13));
        assert!(paragraph.payload().sprm_buf().find_sprm(SPRM_P_JC).is_some());
    }

    #[test]
    fn test_blank_document_accepts_text() {
        let mut tables = DocumentTables::new("").unwrap();
        assert_eq!(tables.main_length(), 0);
        tables.check_coverage().unwrap();

        tables.insert_text(0, "typed\r").unwrap();
        assert_eq!(tables.text(), "typed\r");
        assert_eq!(tables.main_length(), 6);
        tables.check_coverage().unwrap();

        let loaded = reload(&mut tables);
        assert_eq!(loaded.text(), "typed\r");
        assert_eq!(run_bounds(&loaded), vec![(0, 6)]);
        loaded.check_coverage().unwrap();
    }

    #[test]
    fn test_refill_after_deleting_everything() {
        let mut tables = DocumentTables::new("abc").unwrap();
        tables.delete(0, 3).unwrap();
        assert_eq!(tables.text(), "");
        assert_eq!(tables.main_length(), 0);
        tables.check_coverage().unwrap();

        let mut bold = SprmBuffer::default();
        bold.add_sprm_u8(SPRM_C_F_BOLD, 1);
        tables.insert_formatted_text(0, "x", bold).unwrap();
        assert_eq!(tables.text(), "x");
        assert_eq!(tables.main_length(), 1);
        tables.check_coverage().unwrap();

        let loaded = reload(&mut tables);
        assert_eq!(loaded.text(), "x");
        assert_eq!(run_bounds(&loaded), vec![(0, 1)]);
        let run = loaded
            .character_table()
            .text_runs()
            .iter()
            .find(|run| !run.is_empty())
            .unwrap();
        assert!(run.payload().find_sprm(SPRM_C_F_BOLD).is_some());
    }

    #[test]
    fn test_resave_reuses_relocated_paragraph_properties() {
        let mut tables = DocumentTables::new("a long styled paragraph\r").unwrap();
        let sprms = tables.paragraph_table_mut().paragraphs_mut()[0]
            .payload_mut()
            .sprm_buf_mut();
        for _ in 0..170 {
            sprms.add_sprm_u16(SPRM_P_DXA_LEFT, 720);
        }
        let first = tables.write().unwrap();
        assert!(!first.data_stream.is_empty());

        let mut loaded = DocumentTables::load(
            &first.word_document,
            &first.table_stream,
            &first.data_stream,
        )
        .unwrap();
        assert_eq!(loaded.paragraph_table(), tables.paragraph_table());

        let second = loaded.write().unwrap();
        assert_eq!(second.data_stream, first.data_stream);
        let again = reload(&mut loaded);
        assert_eq!(again.paragraph_table(), tables.paragraph_table());
    }

    #[test]
    fn test_delete_out_of_range() {
        let mut tables = DocumentTables::new("short").unwrap();
        assert!(matches!(
            tables.delete(3, 5),
            Err(Error::InvalidRange { start: 3, end: 8 })
        ));
        assert_eq!(tables.text(), "short");
    }

    #[test]
    fn test_insert_past_end() {
        let mut tables = DocumentTables::new("short").unwrap();
        assert!(matches!(
            tables.insert_text(9, "x"),
            Err(Error::IndexOutOfRange { index: 9, len: 5 })
        ));
    }

    #[test]
    fn test_rewrite_keeps_loaded_table_stream() {
        let mut tables = DocumentTables::new("again\r").unwrap();
        let first = tables.write().unwrap();
        let mut loaded = DocumentTables::load(
            &first.word_document,
            &first.table_stream,
            &first.data_stream,
        )
        .unwrap();

        let second = loaded.write().unwrap();
        assert!(second.table_stream.starts_with(&first.table_stream));
        let (clx_offset, _) = loaded.fib().field(FibField::Clx).unwrap();
        assert_eq!(clx_offset as usize, first.table_stream.len());
        assert_eq!(reload(&mut loaded).text(), "again\r");
    }

    #[test]
    fn test_load_rejects_bad_fib() {
        let result = DocumentTables::load(&[0u8; 1024], &[], &[]);
        assert!(matches!(result, Err(Error::CorruptedFile(_))));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Edit {
            Insert(u32, String),
            Delete(u32, u32),
        }

        fn edit() -> impl Strategy<Value = Edit> {
            prop_oneof![
                (any::<u32>(), "[a-z ]{1,12}").prop_map(|(at, text)| Edit::Insert(at, text)),
                (any::<u32>(), 1u32..10).prop_map(|(at, len)| Edit::Delete(at, len)),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(48))]

            #[test]
            fn prop_edits_keep_tables_aligned(
                initial in "[a-z ]{1,40}",
                edits in prop::collection::vec(edit(), 1..20)
            ) {
                let mut tables = DocumentTables::new(&initial).unwrap();
                let mut model: Vec<char> = initial.chars().collect();

                for edit in edits {
                    match edit {
                        Edit::Insert(at, text) => {
                            let cp = at % (model.len() as u32 + 1);
                            tables.insert_text(cp, &text).unwrap();
                            let tail = model.split_off(cp as usize);
                            model.extend(text.chars());
                            model.extend(tail);
                        }
                        Edit::Delete(at, len) => {
                            // keep at least one character
                            if model.len() < 2 {
                                continue;
                            }
                            let cp = at % (model.len() as u32 - 1);
                            let len = len.min(model.len() as u32 - 1 - cp).max(1);
                            tables.delete(cp, len).unwrap();
                            model.drain(cp as usize..(cp + len) as usize);
                        }
                    }
                    tables.check_coverage().unwrap();
                    prop_assert_eq!(tables.text(), model.iter().collect::<String>());
                    prop_assert_eq!(tables.main_length() as usize, model.len());
                }

                let loaded = reload(&mut tables);
                prop_assert_eq!(loaded.text(), model.iter().collect::<String>());
                loaded.check_coverage().unwrap();
            }
        }
    }
}
