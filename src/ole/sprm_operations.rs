//! SPRM opcode constants used by the property tables.
//!
//! An opcode packs the operation code (bits 0-8), a special flag (bit 9),
//! the property group (bits 10-12: PAP=1, CHP=2, SEP=3, TAP=5) and the
//! operand size code (bits 13-15).
//!
//! Reference: Apache POI's hwpf/sprm package

// CHP (Character Properties)

/// sprmCFBold - Bold
pub const SPRM_C_F_BOLD: u16 = 0x0835;

/// sprmCFItalic - Italic
pub const SPRM_C_F_ITALIC: u16 = 0x0836;

/// sprmCHps - Font size in half-points
pub const SPRM_C_HPS: u16 = 0x4A43;

// PAP (Paragraph Properties)

/// sprmPJc80 - Justification
pub const SPRM_P_JC: u16 = 0x2403;

/// sprmPDxaLeft80 - Left indent
pub const SPRM_P_DXA_LEFT: u16 = 0x840F;

/// sprmPChgTabs - Tab changes; a long SPRM with a 2-byte operand length
pub const SPRM_P_CHG_TABS: u16 = 0xC615;

/// sprmPHugePapx - Grpprl relocated to the Data stream (operation 0x46)
pub const SPRM_P_HUGE_PAPX: u16 = 0x6646;

/// sprmPHugePapx as written by Word 97 (operation 0x45)
pub const SPRM_P_HUGE_PAPX_OLD: u16 = 0x6645;

/// Operation codes accepted as a huge PAPX pointer.
pub const HUGE_PAPX_OPERATIONS: [u16; 2] = [SPRM_P_HUGE_PAPX_OLD & 0x01FF, SPRM_P_HUGE_PAPX & 0x01FF];

// SEP (Section Properties)

/// sprmSFTitlePage - Different first page
pub const SPRM_S_F_TITLE_PAGE: u16 = 0x300A;

// TAP (Table Properties)

/// sprmTDefTable - Table definition; a long SPRM with a 2-byte operand length
pub const SPRM_T_DEF_TABLE: u16 = 0xD608;
