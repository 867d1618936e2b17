/// Word (.doc) document storage.
///
/// A .doc file is an OLE2 structured storage containing several streams:
/// - **WordDocument**: the FIB, the text and the formatted disk pages
/// - **1Table** or **0Table**: the piece table, bin tables and section table
/// - **Data**: oversized paragraph properties and embedded objects
///
/// This module works on the raw bytes of those streams; reading them out of
/// the OLE container is left to the caller.
///
/// # Example
///
/// ```rust
/// use loquat::ole::doc::DocumentTables;
///
/// let mut tables = DocumentTables::new("Hello\r")?;
/// tables.insert_text(5, ", world")?;
/// tables.check_coverage()?;
///
/// let streams = tables.write()?;
/// let reloaded = DocumentTables::load(
///     &streams.word_document,
///     &streams.table_stream,
///     &streams.data_stream,
/// )?;
/// assert_eq!(reloaded.text(), "Hello, world\r");
/// # Ok::<(), loquat::common::Error>(())
/// ```
pub mod parts;

pub use parts::fib::{FibField, FileInformationBlock};
pub use parts::piece_table::CharIndexTranslator;
pub use parts::tables::{DocumentTables, WrittenStreams};
