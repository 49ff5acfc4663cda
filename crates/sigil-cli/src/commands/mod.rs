//! CLI command implementations for Sigil.

pub mod keys;
pub mod token;
