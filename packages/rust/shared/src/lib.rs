//! Shared types, error model, and configuration for protosync.
//!
//! This crate is the foundation depended on by all other protosync crates.
//! It provides:
//! - [`ProtoSyncError`]: the unified error type
//! - Domain types ([`Module`], [`SchemaFile`], [`MappingConfig`], [`SyncStatus`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompilerConfig, ElasticsearchConfig, ModuleEntry, ModulesConfig, ProjectConfig,
    SnapshotConfig, config_file_path, init_config, load_config,
};
pub use error::{ProtoSyncError, Result};
pub use types::{MappingConfig, MappingDeclaration, Module, SchemaFile, SyncStatus};
