//! Services module - Pure business logic for the build pipeline.
//!
//! This module contains the core logic for turning a validated build
//! configuration into external-tool invocations and installer sources. The
//! services are **framework-agnostic**: they know nothing about the CLI
//! layer, which makes them testable and reusable.
//!
//! # Components
//!
//! - [`CompilerPlanBuilder`]: Translates a configuration into the compiler's
//!   full argument vector. Deterministic: equal configs yield byte-identical
//!   plans.
//! - [`InstallerManifestBuilder`]: Scans the compiled output, renders the
//!   installer source document, and plans the packaging invocation.
//! - [`ProcessRunner`]: Generic subprocess driver. Streams stdout/stderr
//!   line-by-line and supports cooperative cancellation of the whole process
//!   tree. Both build stages run through it.
//! - [`ExcludeFilter`]: Glob-style exclude patterns applied to every
//!   file-gathering input before it reaches a plan or manifest.
//! - [`ident`]: Stable name-derived UUIDs for upgrade codes and component
//!   identities.

pub mod compiler;
pub mod exclude;
pub mod ident;
pub mod manifest;
pub mod process;

pub use compiler::{CompilerPlanBuilder, find_default_interpreter};
pub use exclude::ExcludeFilter;
pub use manifest::{InstallerManifestBuilder, ManifestDocument, ManifestError};
pub use process::{
    CommandPlan, OutputLine, ProcessError, ProcessRunner, RunResult, StreamKind,
};
