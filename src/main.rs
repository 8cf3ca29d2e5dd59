//! installer-forge - Build orchestration for Python executables and installers
//!
//! Main entry point for the CLI.
//!
//! # Overview
//!
//! This binary crate drives the build pipeline from the command line. It
//! initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime (4 worker threads for subprocess execution)
//! - Build coordination ([`BuildCoordinator`])
//! - Configuration loading ([`ConfigManager`])
//!
//! # Execution Flow
//!
//! 1. Parse arguments
//! 2. Initialize logging -> logs/installer-forge.<date>
//! 3. Create tokio runtime with 4 worker threads
//! 4. Run the requested command (subprocess stages stream their output to
//!    the terminal as they run; Ctrl-C cancels cooperatively)
//! 5. Shutdown the runtime and map the outcome to an exit code
//!
//! # Exit codes
//!
//! - 0: success
//! - 1: configuration error
//! - 2: installer manifest / packaging toolkit error
//! - 3: external tool failed to launch
//! - 4: build cancelled
//! - otherwise: the failing tool's own exit code

use anyhow::Result;
use clap::{Parser, Subcommand};
use installer_forge::state::{BuildEvent, BuildStage};
use installer_forge::services::process::StreamKind;
use installer_forge::{
    APP_NAME, BuildCoordinator, BuildError, BuildMode, BuildOutcome, ConfigManager, VERSION,
    services::ident,
};
use std::sync::Arc;

/// Default configuration file looked up in the working directory.
const DEFAULT_CONFIG: &str = "build_config.yaml";

/// Build standalone executables and Windows installers from a declarative
/// YAML configuration.
///
/// EXAMPLES:
///     installer-forge build-exe                   Compile the executable
///     installer-forge build-installer             Compile and package an MSI
///     installer-forge generate-uuid -s MyApp      Derive a stable upgrade code
///     installer-forge init-config                 Write a starter config file
#[derive(Parser)]
#[command(name = "installer-forge")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the standalone executable
    ///
    /// Runs the compile stage only; the installer section of the config is
    /// ignored even when enabled.
    BuildExe {
        /// Path to the build configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
        /// Interpreter to compile with, overriding the config for this run
        #[arg(long)]
        python_path: Option<String>,
        /// Also print log records to the console
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Debug-level logging
        #[arg(long)]
        debug: bool,
    },

    /// Build the executable and package it into an installer
    ///
    /// Honors `installer.reuse_compiled` to skip the compile stage when a
    /// compiled output already exists.
    BuildInstaller {
        /// Path to the build configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
        /// Debug-level logging
        #[arg(long)]
        debug: bool,
    },

    /// Derive or generate an installer upgrade code
    ///
    /// EXAMPLES:
    ///     installer-forge generate-uuid -s MyAppName
    ///     installer-forge generate-uuid --random
    GenerateUuid {
        /// Seed string; the same seed always yields the same UUID
        #[arg(short = 's', long = "string", conflicts_with = "random")]
        seed: Option<String>,
        /// Generate a random one-off UUID instead
        #[arg(short, long)]
        random: bool,
    },

    /// Create a documented default configuration file if none exists
    InitConfig {
        /// Path of the configuration file to create
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
}

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    match cli.command {
        Commands::GenerateUuid { seed, random } => {
            // No logging or runtime needed for a pure derivation.
            if random {
                println!("{}", ident::random());
            } else {
                println!("{}", ident::derive(seed.as_deref().unwrap_or("")));
            }
            0
        }
        Commands::InitConfig { config } => match init_config(&config) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("error: {e:#}");
                1
            }
        },
        Commands::BuildExe {
            config,
            python_path,
            verbose,
            debug,
        } => run_build(&config, BuildMode::ExecutableOnly, python_path, verbose, debug),
        Commands::BuildInstaller { config, debug } => {
            run_build(&config, BuildMode::WithInstaller, None, false, debug)
        }
    }
}

fn init_config(path: &str) -> Result<()> {
    let manager = ConfigManager::new(path);
    let config = manager.ensure_default()?;
    println!("Configuration ready at {path} (project: {})", config.project.name);
    Ok(())
}

fn run_build(
    config: &str,
    mode: BuildMode,
    python_override: Option<String>,
    verbose: bool,
    debug: bool,
) -> i32 {
    let _log_guard =
        match installer_forge::logging::setup_logging_with_console("logs", APP_NAME, debug, verbose)
        {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("warning: logging unavailable: {e:#}");
                None
            }
        };

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("forge-worker")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            return 1;
        }
    };

    let coordinator = BuildCoordinator::new(Arc::new(installer_forge::metrics::Metrics::new()));

    let exit_code = runtime.block_on(async {
        let mut handle = match coordinator.start(config, mode, python_override) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("error: {e}");
                return error_exit_code(&e);
            }
        };

        // Ctrl-C requests cooperative cancellation; the pipeline resolves
        // once the running tool is confirmed dead.
        let mut events = handle.take_events();
        let cancel = handle.canceller();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling build...");
                let _ = cancel.send(true);
            }
        });

        let printer = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(BuildEvent::Output(line)) => match line.stream {
                        StreamKind::Out => println!("{}", line.text),
                        StreamKind::Err => eprintln!("{}", line.text),
                    },
                    Ok(BuildEvent::PhaseChanged(phase)) => {
                        eprintln!("==> {phase}");
                    }
                    Ok(BuildEvent::Finished(_)) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Dropped {n} build events, output is behind");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let outcome = handle.wait().await;
        let _ = printer.await;

        match outcome {
            BuildOutcome::Success => {
                eprintln!("Build succeeded");
                0
            }
            BuildOutcome::Cancelled => {
                eprintln!("Build cancelled");
                4
            }
            BuildOutcome::Failed(error) => {
                eprintln!("error: {error}");
                if let BuildError::StageFailed {
                    stage: BuildStage::Compile,
                    stderr_tail,
                    ..
                } = &error
                {
                    if !stderr_tail.is_empty() {
                        eprintln!("last compiler errors:");
                        for line in stderr_tail {
                            eprintln!("  {line}");
                        }
                    }
                }
                error_exit_code(&error)
            }
        }
    });

    coordinator.metrics().log_summary();
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    exit_code
}

fn error_exit_code(error: &BuildError) -> i32 {
    match error {
        BuildError::Config(_) => 1,
        BuildError::Manifest(_) | BuildError::ToolkitUnavailable(_) => 2,
        BuildError::Launch { .. } => 3,
        BuildError::StageFailed { exit_code, .. } => {
            if *exit_code > 0 { *exit_code } else { 1 }
        }
        BuildError::Busy | BuildError::Io(_) => 1,
    }
}
