//! Shared types, error model, and configuration for the tax-rate updater.
//!
//! This crate is the foundation depended on by all other workspace crates.
//! It provides:
//! - [`TaxRatesError`], the unified error type
//! - Domain types ([`CountryRecord`], [`Dataset`], [`TraceId`])
//! - The record schema validator ([`schema`])
//! - HTTP failure classification ([`http`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)
//! - Static country tables ([`countries`])

pub mod config;
pub mod countries;
pub mod error;
pub mod http;
pub mod schema;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ContentConfig, DefaultsConfig, LlmConfig, PathsConfig, PipelineConfig,
    RetryPolicy, config_dir, config_file_path, init_config, load_config, load_config_from,
    openai_api_key,
};
pub use error::{Result, TaxRatesError};
pub use types::{CountryRecord, Dataset, SpecialTax, TaxBracket, TaxSystem, TraceId, VatInfo};
