//! Complex file table (CLX).
//!
//! The CLX sits in the table stream at `fcClx`: zero or more `Prc` entries
//! (type 0x01, a 2-byte size and a grpprl, left by fast saves) followed by the
//! `Pcdt` (type 0x02, a 4-byte size and the piece-table plex).
//!
//! Based on Apache POI's ComplexFileTable.

use super::piece_table::TextPieceTable;
use crate::common::binary::{self, read_u16_le, read_u32_le};
use crate::common::error::{Error, Result};
use crate::ole::sprm::SprmBuffer;

/// Prc marker.
pub const GRPPRL_TYPE: u8 = 0x01;
/// Pcdt marker.
pub const TEXT_PIECE_TABLE_TYPE: u8 = 0x02;

/// Parsed CLX: the fast-save grpprls and the text piece table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexFileTable {
    grpprls: Vec<SprmBuffer>,
    text_pieces: TextPieceTable,
}

impl ComplexFileTable {
    pub fn new(text_pieces: TextPieceTable) -> Self {
        Self {
            grpprls: Vec::new(),
            text_pieces,
        }
    }

    /// Parse the CLX starting at `offset` in the table stream.
    pub fn parse(
        document_stream: &[u8],
        table_stream: &[u8],
        offset: usize,
        fc_min: u32,
    ) -> Result<Self> {
        let mut offset = offset;
        let mut grpprls = Vec::new();

        while binary::read_u8(table_stream, offset)? == GRPPRL_TYPE {
            let size = read_u16_le(table_stream, offset + 1)? as usize;
            let grpprl = binary::slice(table_stream, offset + 3, size)?;
            grpprls.push(SprmBuffer::from_grpprl(grpprl));
            offset += 3 + size;
        }

        let marker = binary::read_u8(table_stream, offset)?;
        if marker != TEXT_PIECE_TABLE_TYPE {
            return Err(Error::CorruptedFile(format!(
                "expected piece table marker 0x02 at {offset}, found {marker:#04x}"
            )));
        }

        let size = read_u32_le(table_stream, offset + 1)? as usize;
        let text_pieces =
            TextPieceTable::parse(document_stream, table_stream, offset + 5, size, fc_min)?;

        Ok(Self {
            grpprls,
            text_pieces,
        })
    }

    /// Fast-save property grpprls, in file order.
    #[inline]
    pub fn grpprls(&self) -> &[SprmBuffer] {
        &self.grpprls
    }

    #[inline]
    pub fn text_pieces(&self) -> &TextPieceTable {
        &self.text_pieces
    }

    #[inline]
    pub fn text_pieces_mut(&mut self) -> &mut TextPieceTable {
        &mut self.text_pieces
    }

    /// Relocate the piece text into `doc_stream` and append the CLX to
    /// `table_stream`. Returns the `(offset, size)` of the CLX.
    pub fn write_to(
        &mut self,
        doc_stream: &mut Vec<u8>,
        table_stream: &mut Vec<u8>,
    ) -> Result<(u32, u32)> {
        let start = table_stream.len();

        for grpprl in &self.grpprls {
            let size = u16::try_from(grpprl.len()).map_err(|_| {
                Error::CorruptedFile(format!("grpprl of {} bytes exceeds a Prc", grpprl.len()))
            })?;
            table_stream.push(GRPPRL_TYPE);
            table_stream.extend_from_slice(&size.to_le_bytes());
            table_stream.extend_from_slice(grpprl.as_bytes());
        }

        let plex = self.text_pieces.write_to(doc_stream)?;
        table_stream.push(TEXT_PIECE_TABLE_TYPE);
        table_stream.extend_from_slice(&(plex.len() as u32).to_le_bytes());
        table_stream.extend_from_slice(&plex);

        Ok((start as u32, (table_stream.len() - start) as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::doc::parts::piece_table::tests::ansi_piece;

    #[test]
    fn test_clx_with_prc_round_trip() {
        let mut clx = ComplexFileTable::new(TextPieceTable::from_pieces(vec![ansi_piece(
            0, 4, 0, b'w',
        )]));
        clx.grpprls.push(SprmBuffer::from_grpprl(&[0x35, 0x08, 0x01]));

        let mut doc = Vec::new();
        let mut table = vec![0u8; 6];
        let (offset, size) = clx.write_to(&mut doc, &mut table).unwrap();
        assert_eq!(offset, 6);
        assert_eq!(size as usize, table.len() - 6);
        assert_eq!(table[6], GRPPRL_TYPE);
        assert_eq!(table[12], TEXT_PIECE_TABLE_TYPE);

        let parsed = ComplexFileTable::parse(&doc, &table, offset as usize, 0).unwrap();
        assert_eq!(parsed, clx);
        assert_eq!(parsed.text_pieces().text(), "wwww");
    }

    #[test]
    fn test_missing_piece_table_marker() {
        let table = [0x07, 0, 0, 0, 0];
        assert!(matches!(
            ComplexFileTable::parse(&[], &table, 0, 0),
            Err(Error::CorruptedFile(_))
        ));
    }
}
