//! Unified error types for the loquat library.
//!
//! The storage layer is a codec, not a validator: format-trust violations
//! yield whatever the bytes say, while contract violations (bad indices,
//! inverted ranges) and out-of-buffer reads are reported here.

// Submodule declarations
pub mod types;

// Re-exports
pub use types::{Error, Result};
