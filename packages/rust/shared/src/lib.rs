//! Shared types, error model, and configuration for SiteGen.
//!
//! This crate is the foundation depended on by all other SiteGen crates.
//! It provides:
//! - [`SitegenError`] — the unified error type
//! - Domain types ([`Brief`], [`ContextValue`], [`PageSpec`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnthropicConfig, AppConfig, DefaultsConfig, PolicyConfig, RetryConfig, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{Result, SitegenError};
pub use types::{Brief, ContextValue, PageSpec, RunId, default_pages_for, slugify};
