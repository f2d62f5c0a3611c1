//! Configuration module for PagePress
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, plus the in-memory capture settings assembled by the front-ends.
//!
//! # Example
//!
//! ```no_run
//! use pagepress::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Asset workers: {}", config.asset_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{CaptureConfig, RenderSettle};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

// Re-export validation entry point
pub use validation::validate;
