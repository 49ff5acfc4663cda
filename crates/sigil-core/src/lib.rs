//! # sigil-core
//!
//! Identifiers and configuration shared by every Sigil crate.
//!
//! - [`constants`]: well-known users, roles, sentinels and claim markers
//! - [`ApplicationName`]: `name-version` identity of a service in the mesh
//! - [`config`]: `sigil.yaml` configuration types

pub mod application;
pub mod config;
pub mod constants;

pub use application::{ApplicationName, ParseApplicationNameError};
pub use config::{ConfigError, KeyConfig, SigilConfig, TokenConfig};
