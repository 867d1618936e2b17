//! Common types and utilities shared across formats.

pub mod binary;
pub mod error;

pub use error::{Error, Result};
