/// Character-position intervals carrying a payload
pub mod property_node;

/// Plex of character positions (PLCF)
pub mod plcf;

/// Single property modifiers and grpprl buffers
pub mod sprm;

/// SPRM opcode constants
pub mod sprm_operations;

/// Legacy Word document (.doc) storage
///
/// This module provides the piece table, formatting tables and section table
/// of Microsoft Word documents in the legacy binary format.
pub mod doc;
