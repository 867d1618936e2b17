//! Piece table for DOC files.
//!
//! The piece table maps character positions (CP) to file positions (FC) in
//! the WordDocument stream. Pieces are contiguous in character space but may
//! sit anywhere, in any order, in the file, and each piece is independently
//! single-byte (Windows-1252) or UTF-16LE encoded.
//!
//! Pieces live in one arena; two index arrays give the character-order and
//! file-order views, so both views always hold exactly the same pieces.
//!
//! References:
//! - org.apache.poi.hwpf.model.TextPieceTable
//! - org.apache.poi.hwpf.model.TextPiece
//! - org.apache.poi.hwpf.model.PieceDescriptor
//! - [MS-DOC] 2.9.179 Pcd (Piece Descriptor)

use crate::common::binary::{self, read_u16_le, read_u32_le};
use crate::common::error::{Error, Result};
use crate::ole::plcf::PlexOfCps;
use crate::ole::property_node::{GenericPropertyNode, PropertyNode};
use bytes::Bytes;
use encoding_rs::WINDOWS_1252;
use tracing::debug;

/// FKP pages and relocated piece text start on 512-byte boundaries.
pub const PAGE_SIZE: usize = 512;

/// Bit 30 of the stored FC: set for single-byte ("compressed") text.
const FC_COMPRESSED: u32 = 0x4000_0000;

/// Converts between byte offsets in the WordDocument stream and character
/// positions.
pub trait CharIndexTranslator {
    /// File position of character `char_pos`.
    fn get_byte_index(&self, char_pos: u32) -> u32;

    /// Character position of file position `byte_pos`.
    fn get_char_index(&self, byte_pos: u32) -> Result<u32> {
        self.get_char_index_from(byte_pos, 0)
    }

    /// Character position of `byte_pos`, preferring an answer `>= start_cp`
    /// when more than one piece covers the position.
    fn get_char_index_from(&self, byte_pos: u32, start_cp: u32) -> Result<u32>;

    /// Snap `byte_pos` to the nearest covered position at or after it.
    fn look_index_forward(&self, byte_pos: u32) -> Result<u32>;

    /// Snap `byte_pos` to the nearest covered position at or before it.
    fn look_index_backward(&self, byte_pos: u32) -> u32;

    /// Whether some piece's byte range (end inclusive) covers `byte_pos`.
    fn is_index_in_table(&self, byte_pos: u32) -> bool;

    /// Character positions where the text continues at a file position other
    /// than the end of the preceding text, in ascending order.
    fn file_breaks(&self) -> Vec<u32>;
}

/// Piece descriptor (PCD), 8 bytes.
///
/// Based on Apache POI's PieceDescriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceDescriptor {
    descriptor: u16,
    fc: u32,
    prm: u16,
    unicode: bool,
}

impl PieceDescriptor {
    pub const SIZE: usize = 8;

    /// A descriptor for text at `fc`.
    pub fn new(fc: u32, unicode: bool) -> Self {
        Self {
            descriptor: 0,
            fc,
            prm: 0,
            unicode,
        }
    }

    /// Decode a PCD.
    ///
    /// Bit 30 of the FC clear means UTF-16LE text at `fc`; set means
    /// single-byte text at `(fc & !bit30) / 2`.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let descriptor = read_u16_le(raw, 0)?;
        let fc_raw = read_u32_le(raw, 2)?;
        let prm = read_u16_le(raw, 6)?;

        let unicode = fc_raw & FC_COMPRESSED == 0;
        let fc = if unicode {
            fc_raw
        } else {
            (fc_raw & !FC_COMPRESSED) / 2
        };

        Ok(Self {
            descriptor,
            fc,
            prm,
            unicode,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let fc = if self.unicode {
            self.fc
        } else {
            (self.fc * 2) | FC_COMPRESSED
        };
        let mut raw = [0u8; Self::SIZE];
        raw[0..2].copy_from_slice(&self.descriptor.to_le_bytes());
        raw[2..6].copy_from_slice(&fc.to_le_bytes());
        raw[6..8].copy_from_slice(&self.prm.to_le_bytes());
        raw
    }

    /// Byte offset of the piece text in the WordDocument stream.
    #[inline]
    pub fn file_position(&self) -> u32 {
        self.fc
    }

    #[inline]
    pub fn set_file_position(&mut self, fc: u32) {
        self.fc = fc;
    }

    #[inline]
    pub fn is_unicode(&self) -> bool {
        self.unicode
    }

    /// Property modifier applied to the whole piece.
    #[inline]
    pub fn prm(&self) -> u16 {
        self.prm
    }
}

/// A text piece: a character interval backed by one byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPiece {
    /// Character interval; the payload holds UTF-16 code units, one per
    /// character position.
    node: PropertyNode<Vec<u16>>,
    descriptor: PieceDescriptor,
}

impl TextPiece {
    /// Build a piece from its raw bytes.
    pub fn new(start: u32, end: u32, raw: &[u8], descriptor: PieceDescriptor) -> Result<Self> {
        let text = if descriptor.is_unicode() {
            raw.chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect()
        } else {
            let (decoded, _) = WINDOWS_1252.decode_without_bom_handling(raw);
            decoded.encode_utf16().collect()
        };

        Ok(Self {
            node: PropertyNode::new(start, end, text)?,
            descriptor,
        })
    }

    /// Build a piece holding `text` at character `start`.
    pub fn from_text(start: u32, text: &str, descriptor: PieceDescriptor) -> Self {
        let text: Vec<u16> = text.encode_utf16().collect();
        let end = start + text.len() as u32;
        let mut node = PropertyNode::empty_at(start, text);
        node.set_end(end);
        Self { node, descriptor }
    }

    #[inline]
    pub fn start(&self) -> u32 {
        self.node.start()
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.node.end()
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.node.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    #[inline]
    pub fn is_unicode(&self) -> bool {
        self.descriptor.is_unicode()
    }

    #[inline]
    pub fn descriptor(&self) -> &PieceDescriptor {
        &self.descriptor
    }

    #[inline]
    fn bytes_per_char(&self) -> u32 {
        if self.is_unicode() { 2 } else { 1 }
    }

    /// Length of the backing byte range.
    #[inline]
    pub fn bytes_len(&self) -> u32 {
        self.len() * self.bytes_per_char()
    }

    #[inline]
    pub fn fc_start(&self) -> u32 {
        self.descriptor.file_position()
    }

    #[inline]
    pub fn fc_end(&self) -> u32 {
        self.fc_start() + self.bytes_len()
    }

    /// Decoded text of the piece.
    pub fn text(&self) -> String {
        String::from_utf16_lossy(self.node.payload())
    }

    /// Text as UTF-16 code units.
    #[inline]
    pub fn units(&self) -> &[u16] {
        self.node.payload()
    }

    /// Insert `text` at `char_offset` within the piece's buffer.
    ///
    /// Only the buffer changes; the interval is extended by
    /// [`TextPieceTable::adjust_for_insert`]. Returns the inserted length.
    pub fn insert_text(&mut self, char_offset: u32, text: &str) -> u32 {
        let buffer = self.node.payload_mut();
        let at = (char_offset as usize).min(buffer.len());
        let units: Vec<u16> = text.encode_utf16().collect();
        let inserted = units.len() as u32;
        buffer.splice(at..at, units);
        inserted
    }

    /// Encode the buffer back into the piece's own encoding.
    ///
    /// Characters with no Windows-1252 mapping become `?` so the byte length
    /// stays one per character.
    pub fn raw_bytes(&self) -> Vec<u8> {
        if self.is_unicode() {
            return self.units().iter().flat_map(|u| u.to_le_bytes()).collect();
        }
        self.units()
            .iter()
            .map(|&unit| encode_single_byte(unit))
            .collect()
    }

    fn adjust_for_delete(&mut self, offset: u32, length: u32) {
        let (start, end) = (self.start(), self.end());
        let overlap_start = start.max(offset);
        let overlap_end = end.min(offset + length);
        if overlap_start < overlap_end {
            let buffer = self.node.payload_mut();
            let from = ((overlap_start - start) as usize).min(buffer.len());
            let to = ((overlap_end - start) as usize).min(buffer.len());
            buffer.drain(from..to);
        }
        self.node.adjust_for_delete(offset, length);
    }
}

fn encode_single_byte(unit: u16) -> u8 {
    if unit < 0x80 {
        return unit as u8;
    }
    let Some(ch) = char::from_u32(unit as u32) else {
        return b'?';
    };
    let mut utf8 = [0u8; 4];
    let (encoded, _, had_errors) = WINDOWS_1252.encode(ch.encode_utf8(&mut utf8));
    match encoded.as_ref() {
        [byte] if !had_errors => *byte,
        _ => b'?',
    }
}

/// Text piece table.
///
/// Based on Apache POI's TextPieceTable.
#[derive(Debug, Clone, Default)]
pub struct TextPieceTable {
    pieces: Vec<TextPiece>,
    /// Arena indices sorted by character start.
    by_char: Vec<usize>,
    /// Arena indices sorted by file position.
    by_fc: Vec<usize>,
    cp_min: u32,
}

impl TextPieceTable {
    /// Decode the piece-table plex at `offset..offset + size` of the table
    /// stream and load each piece's text from the document stream.
    pub fn parse(
        document_stream: &[u8],
        table_stream: &[u8],
        offset: usize,
        size: usize,
        fc_min: u32,
    ) -> Result<Self> {
        let plex = PlexOfCps::parse(table_stream, offset, size, PieceDescriptor::SIZE)?;

        let descriptors = plex
            .properties()
            .iter()
            .map(|node| PieceDescriptor::parse(node.payload()))
            .collect::<Result<Vec<_>>>()?;

        // Pieces need not be stored in order, so take the smallest position.
        let cp_min = descriptors
            .iter()
            .map(|d| d.file_position().saturating_sub(fc_min))
            .min()
            .unwrap_or(0);

        let mut pieces = Vec::with_capacity(descriptors.len());
        for (node, descriptor) in plex.properties().iter().zip(descriptors) {
            let multiple = if descriptor.is_unicode() { 2 } else { 1 };
            let text_size_bytes = (node.len() * multiple) as usize;
            let raw = binary::slice(
                document_stream,
                descriptor.file_position() as usize,
                text_size_bytes,
            )?;
            pieces.push(TextPiece::new(node.start(), node.end(), raw, descriptor)?);
        }

        debug!(pieces = pieces.len(), cp_min, "parsed text piece table");

        let mut table = Self::from_pieces(pieces);
        table.cp_min = cp_min;
        Ok(table)
    }

    /// Build a table from pieces in any order.
    pub fn from_pieces(pieces: Vec<TextPiece>) -> Self {
        let mut table = Self {
            by_char: (0..pieces.len()).collect(),
            by_fc: (0..pieces.len()).collect(),
            pieces,
            cp_min: 0,
        };
        table.reindex();
        table
    }

    fn reindex(&mut self) {
        let pieces = &self.pieces;
        self.by_char.sort_by_key(|&i| pieces[i].start());
        self.by_fc.sort_by_key(|&i| pieces[i].fc_start());
    }

    /// Add a piece and re-sort both views.
    pub fn add(&mut self, piece: TextPiece) {
        let index = self.pieces.len();
        self.pieces.push(piece);
        self.by_char.push(index);
        self.by_fc.push(index);
        self.reindex();
    }

    /// Smallest piece file position relative to `fc_min`.
    #[inline]
    pub fn cp_min(&self) -> u32 {
        self.cp_min
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Pieces in character order.
    pub fn pieces(&self) -> impl Iterator<Item = &TextPiece> {
        self.by_char.iter().map(|&i| &self.pieces[i])
    }

    /// Pieces in file-position order.
    pub fn pieces_by_file_position(&self) -> impl Iterator<Item = &TextPiece> {
        self.by_fc.iter().map(|&i| &self.pieces[i])
    }

    /// The `list_index`-th piece in character order.
    pub fn piece(&self, list_index: usize) -> Result<&TextPiece> {
        self.by_char
            .get(list_index)
            .map(|&i| &self.pieces[i])
            .ok_or_else(|| Error::index(list_index, self.by_char.len()))
    }

    pub fn piece_mut(&mut self, list_index: usize) -> Result<&mut TextPiece> {
        let len = self.by_char.len();
        let i = *self
            .by_char
            .get(list_index)
            .ok_or_else(|| Error::index(list_index, len))?;
        Ok(&mut self.pieces[i])
    }

    /// End of the last piece in character order.
    pub fn total_chars(&self) -> u32 {
        self.pieces().map(TextPiece::end).max().unwrap_or(0)
    }

    /// List index of the piece holding `cp`; the document end maps to the
    /// last non-empty piece so text can be appended. When every piece is
    /// empty the last piece takes the text.
    pub fn piece_index_for_char(&self, cp: u32) -> Option<usize> {
        let mut last_non_empty = None;
        for (index, piece) in self.pieces().enumerate() {
            if piece.start() <= cp && cp < piece.end() {
                return Some(index);
            }
            if !piece.is_empty() {
                last_non_empty = Some(index);
            }
        }
        last_non_empty
            .or_else(|| self.len().checked_sub(1))
            .filter(|_| cp == self.total_chars())
    }

    pub fn is_unicode_at_char(&self, cp: u32) -> bool {
        self.pieces()
            .find(|piece| piece.start() <= cp && cp < piece.end())
            .is_some_and(TextPiece::is_unicode)
    }

    /// Whole document text in character order.
    pub fn text(&self) -> String {
        let units: Vec<u16> = self.pieces().flat_map(|p| p.units().iter().copied()).collect();
        String::from_utf16_lossy(&units)
    }

    /// Extend piece `list_index` by `length` characters and shift every later
    /// piece. File positions are left alone: the inserted text lives in the
    /// piece's own buffer until the table is written.
    pub fn adjust_for_insert(&mut self, list_index: usize, length: u32) -> Result<u32> {
        if list_index >= self.by_char.len() {
            return Err(Error::index(list_index, self.by_char.len()));
        }
        let target = &mut self.pieces[self.by_char[list_index]].node;
        target.set_end(target.end() + length);
        for &i in &self.by_char[list_index + 1..] {
            self.pieces[i].node.shift_right(length);
        }
        Ok(length)
    }

    /// Remove `[offset, offset + length)` from every piece's buffer and
    /// interval. Emptied pieces stay in the table with zero length.
    pub fn adjust_for_delete(&mut self, offset: u32, length: u32) {
        for &i in &self.by_char {
            self.pieces[i].adjust_for_delete(offset, length);
        }
        self.reindex();
    }

    /// Lay every piece's text out again in `doc_stream` and return the
    /// piece-table plex bytes for the table stream.
    ///
    /// Each piece starts on a 512-byte boundary; descriptors are updated to
    /// the new positions.
    pub fn write_to(&mut self, doc_stream: &mut Vec<u8>) -> Result<Vec<u8>> {
        let mut plex = PlexOfCps::new(PieceDescriptor::SIZE);

        for &i in &self.by_char {
            let piece = &mut self.pieces[i];
            let padding = (PAGE_SIZE - doc_stream.len() % PAGE_SIZE) % PAGE_SIZE;
            doc_stream.resize(doc_stream.len() + padding, 0);

            piece.descriptor.set_file_position(doc_stream.len() as u32);
            doc_stream.extend_from_slice(&piece.raw_bytes());

            plex.add_property(GenericPropertyNode::new(
                piece.start(),
                piece.end(),
                Bytes::copy_from_slice(&piece.descriptor.to_bytes()),
            )?)?;
        }

        self.reindex();
        Ok(plex.to_bytes())
    }
}

impl PartialEq for TextPieceTable {
    fn eq(&self, other: &Self) -> bool {
        self.pieces().eq(other.pieces())
    }
}

impl CharIndexTranslator for TextPieceTable {
    fn get_byte_index(&self, char_pos: u32) -> u32 {
        let mut byte_count = 0;
        for piece in self.pieces() {
            if char_pos >= piece.end() {
                // Keep going: a following piece starting here wins.
                byte_count = piece.fc_end();
                continue;
            }
            let left = char_pos.saturating_sub(piece.start());
            byte_count = piece.fc_start() + left * piece.bytes_per_char();
            break;
        }
        byte_count
    }

    fn get_char_index_from(&self, byte_pos: u32, start_cp: u32) -> Result<u32> {
        let byte_pos = self.look_index_forward(byte_pos)?;

        // Pieces whose range holds the position strictly are tried before
        // pieces merely ending there, so a shared boundary resolves to the
        // piece starting at it.
        let mut fallback = None;
        for half_open in [true, false] {
            for piece in self.pieces_by_file_position() {
                let (fc_start, fc_end) = (piece.fc_start(), piece.fc_end());
                let covered = if half_open {
                    fc_start <= byte_pos && byte_pos < fc_end
                } else {
                    byte_pos == fc_end
                };
                if !covered {
                    continue;
                }
                let cp = piece.start() + (byte_pos - fc_start) / piece.bytes_per_char();
                if cp >= start_cp {
                    return Ok(cp);
                }
                fallback = Some(cp);
            }
        }

        Ok(fallback.unwrap_or_else(|| self.total_chars()))
    }

    fn look_index_forward(&self, byte_pos: u32) -> Result<u32> {
        let first = self.by_fc.first().ok_or(Error::EmptyPieceTable)?;
        let first_fc = self.pieces[*first].fc_start();
        if byte_pos < first_fc {
            return Ok(first_fc);
        }

        let pieces = &self.pieces;
        let at = self
            .by_fc
            .partition_point(|&i| pieces[i].fc_start() <= byte_pos)
            - 1;
        if byte_pos <= pieces[self.by_fc[at]].fc_end() {
            return Ok(byte_pos);
        }
        Ok(self
            .by_fc
            .get(at + 1)
            .map_or(byte_pos, |&next| pieces[next].fc_start()))
    }

    fn look_index_backward(&self, byte_pos: u32) -> u32 {
        let mut last_end = 0;
        for piece in self.pieces_by_file_position() {
            if byte_pos > piece.fc_end() {
                last_end = piece.fc_end();
                continue;
            }
            if piece.fc_start() > byte_pos {
                return last_end;
            }
            break;
        }
        byte_pos
    }

    fn is_index_in_table(&self, byte_pos: u32) -> bool {
        for piece in self.pieces_by_file_position() {
            if byte_pos > piece.fc_end() {
                continue;
            }
            return piece.fc_start() <= byte_pos;
        }
        false
    }

    fn file_breaks(&self) -> Vec<u32> {
        let mut breaks = Vec::new();
        let mut previous_end = None;
        for piece in self.pieces().filter(|piece| !piece.is_empty()) {
            if previous_end.is_some_and(|fc| fc != piece.fc_start()) {
                breaks.push(piece.start());
            }
            previous_end = Some(piece.fc_end());
        }
        breaks
    }
}
