//! Configuration module.
//!
//! Handles loading and validating client, server, and logging settings
//! from TOML files.

mod settings;

pub use settings::*;
