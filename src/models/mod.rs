//! Data models for the build orchestration engine.
//!
//! This module contains the typed configuration tree and validation types:
//! - [`BuildConfig`]: Root of the declarative build description loaded from `build_config.yaml`
//! - [`ProjectConfig`] / [`BuildSection`] / [`InstallerConfig`] / [`DebugConfig`]: its sections
//! - [`ValidationIssue`] / [`Severity`]: structured findings from config validation
//!
//! # Architecture Note
//!
//! The models are designed to be:
//! - **Serializable**: all config structs derive `Serialize`/`Deserialize` for YAML persistence
//! - **Fully populated**: every optional field has a serde default, so downstream builders only
//!   ever inspect resolved values, never field presence
//! - **Immutable**: once loaded by [`ConfigManager`](crate::config::ConfigManager) a config is
//!   consumed read-only for the duration of one build invocation

pub mod config;
pub mod validation;

pub use config::{
    BuildConfig, BuildSection, ConsoleConfig, ConsoleMode, DataDir, DebugConfig, IncludeConfig,
    InstallerConfig, InstallerMetadata, InstallerOutput, InstallerUi, OptionsConfig, OutputConfig,
    ProjectConfig, Shortcuts,
};
pub use validation::{Severity, ValidationIssue};
