/// Storage structures of Word 97+ documents.
///
/// This module contains the binary tables that map document text to its
/// position in the WordDocument stream and to its formatting:
/// - FIB (File Information Block)
/// - Piece table and CLX
/// - Character and paragraph bin tables with their formatted disk pages
/// - Section table
/// - [`tables::DocumentTables`], which keeps all of them aligned across edits
pub mod bin_table;
pub mod chp_bin_table;
pub mod clx;
pub mod data_stream;
pub mod fib;
pub mod fkp;
pub mod pap_bin_table;
pub mod piece_table;
pub mod section_table;
pub mod tables;
