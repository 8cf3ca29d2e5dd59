// installer-forge - Build orchestration for Python executables and installers
//
// This is the library crate containing the core business logic and data
// structures. The binary crate (main.rs) provides the CLI entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ConfigManager};
pub use models::{BuildConfig, Severity, ValidationIssue};
pub use services::{
    CommandPlan, CompilerPlanBuilder, ExcludeFilter, InstallerManifestBuilder, ProcessRunner,
};
pub use state::{BuildCoordinator, BuildError, BuildEvent, BuildMode, BuildOutcome, BuildPhase};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
