//! # jvet Common Library
//!
//! Shared code for the jvet venue assessment workspace:
//! - Error and result types
//! - TOML configuration loading and config file resolution

pub mod config;
pub mod error;

pub use config::TomlConfig;
pub use error::{Error, Result};
