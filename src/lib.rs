//! Loquat - storage tables of legacy Microsoft Word documents
//!
//! This library loads, edits and writes the structures that locate text and
//! formatting inside a Word 97+ (.doc) file: the piece table, the character
//! and paragraph bin tables with their formatted disk pages, and the section
//! table.
//!
//! # Features
//!
//! - **Piece table**: translate between character positions and byte offsets
//!   across unicode and single-byte pieces
//! - **Formatting tables**: character runs, paragraphs and sections that stay
//!   aligned with the text through inserts and deletes
//! - **Writer**: lay the tables out again as 512-byte pages, relocating
//!   oversized paragraph properties to the Data stream
//!
//! # Example
//!
//! ```rust
//! use loquat::ole::doc::DocumentTables;
//! use loquat::ole::sprm::SprmBuffer;
//! use loquat::ole::sprm_operations::SPRM_C_F_BOLD;
//!
//! let mut tables = DocumentTables::new("plain text\r")?;
//!
//! let mut bold = SprmBuffer::default();
//! bold.add_sprm_u8(SPRM_C_F_BOLD, 1);
//! tables.insert_formatted_text(6, "bold ", bold)?;
//! tables.delete(0, 6)?;
//!
//! assert_eq!(tables.text(), "bold text\r");
//! tables.check_coverage()?;
//! # Ok::<(), loquat::common::Error>(())
//! ```

/// Shared binary helpers and the crate error type
pub mod common;

/// OLE2-based legacy formats
///
/// The `ole` module contains the `doc` submodule with the Word document
/// storage tables.
#[cfg(feature = "ole")]
pub mod ole;

pub use common::{Error, Result};
#[cfg(feature = "ole")]
pub use ole::doc;
