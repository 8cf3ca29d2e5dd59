// Build coordination module
//
// This module provides the BuildCoordinator which drives the build pipeline
// through its phases and broadcasts events for observers (CLI progress
// output today, a GUI tomorrow).

use crate::config::{ConfigError, ConfigManager};
use crate::metrics::Metrics;
use crate::models::BuildConfig;
use crate::services::compiler::{CompilerPlanBuilder, compiled_artifact_path};
use crate::services::exclude::ExcludeFilter;
use crate::services::manifest::{InstallerManifestBuilder, ManifestError};
use crate::services::process::{
    CommandPlan, OutputLine, ProcessError, ProcessRunner, RunResult,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Phases of the build pipeline.
///
/// `Idle -> LoadingConfig -> Compiling -> (Packaging) -> Done`, with
/// `Failed` and `Cancelled` as the other terminals. The compile phase is
/// skipped when the config opts into reusing an existing compiled output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    LoadingConfig,
    Compiling,
    Packaging,
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BuildPhase::Idle => "idle",
            BuildPhase::LoadingConfig => "loading config",
            BuildPhase::Compiling => "compiling",
            BuildPhase::Packaging => "packaging",
            BuildPhase::Done => "done",
            BuildPhase::Failed => "failed",
            BuildPhase::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Which external-tool stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Compile,
    Package,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Compile => f.write_str("compile stage"),
            BuildStage::Package => f.write_str("packaging stage"),
        }
    }
}

/// Errors that end a build in the Failed phase.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("{stage} could not start: {source}")]
    Launch {
        stage: BuildStage,
        #[source]
        source: ProcessError,
    },

    #[error("{stage} failed with exit code {exit_code}")]
    StageFailed {
        stage: BuildStage,
        exit_code: i32,
        stderr_tail: Vec<String>,
    },

    #[error("packaging toolkit unavailable: {0}")]
    ToolkitUnavailable(String),

    #[error("a build is already running")]
    Busy,

    #[error("build I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal outcome of one build, returned by [`BuildHandle::wait`].
#[derive(Debug)]
pub enum BuildOutcome {
    Success,
    Failed(BuildError),
    Cancelled,
}

/// What to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Compile only; the installer section is ignored even when enabled.
    ExecutableOnly,
    /// Compile, then package when `installer.enabled` is set.
    WithInstaller,
}

/// Events broadcast while a build runs.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    PhaseChanged(BuildPhase),
    Output(OutputLine),
    Finished(BuildPhase),
}

/// Handle to a running build: event stream, cancellation, completion.
pub struct BuildHandle {
    events: broadcast::Receiver<BuildEvent>,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<BuildOutcome>,
}

impl BuildHandle {
    /// Take the build's event receiver.
    ///
    /// The receiver was subscribed before the pipeline task spawned, so it
    /// sees every event from `PhaseChanged(LoadingConfig)` on. The handle
    /// keeps a tail subscription for any later call.
    pub fn take_events(&mut self) -> broadcast::Receiver<BuildEvent> {
        let tail = self.events.resubscribe();
        std::mem::replace(&mut self.events, tail)
    }

    /// Request cooperative cancellation. Returns immediately; the build
    /// resolves to [`BuildOutcome::Cancelled`] once the running tool is
    /// confirmed dead.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// A detached cancel sender, for signal handlers that outlive the
    /// handle.
    pub fn canceller(&self) -> watch::Sender<bool> {
        self.cancel_tx.clone()
    }

    /// Wait for the build to reach a terminal phase.
    pub async fn wait(self) -> BuildOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => BuildOutcome::Failed(BuildError::Io(std::io::Error::other(e))),
        }
    }
}

/// Drives the full build pipeline and broadcasts its progress.
///
/// At most one build runs at a time; [`start`](Self::start) fails fast with
/// [`BuildError::Busy`] while a build is in flight. Observers subscribe to
/// the broadcast channel and receive phase changes, streamed tool output,
/// and the final outcome.
pub struct BuildCoordinator {
    events_tx: broadcast::Sender<BuildEvent>,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
}

impl BuildCoordinator {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            events_tx,
            metrics,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to build events independently of any particular build.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events_tx.subscribe()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Start a build of the given config.
    ///
    /// `python_override` replaces the config's interpreter path for this run
    /// only; the file on disk is never touched.
    ///
    /// Returns [`BuildError::Busy`] without touching anything if a build is
    /// already in flight.
    pub fn start(
        &self,
        config_path: impl AsRef<Utf8Path>,
        mode: BuildMode,
        python_override: Option<String>,
    ) -> Result<BuildHandle, BuildError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BuildError::Busy);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let events = self.events_tx.subscribe();
        let events_tx = self.events_tx.clone();
        let metrics = self.metrics.clone();
        let running = self.running.clone();
        let config_path = config_path.as_ref().to_path_buf();

        let task = tokio::spawn(async move {
            let _guard = RunningGuard(running);
            let started = Instant::now();

            let result = run_pipeline(
                &events_tx,
                &metrics,
                &config_path,
                mode,
                python_override,
                cancel_rx,
            )
            .await;
            metrics.record_build_time(started.elapsed());

            let (phase, outcome) = match result {
                Ok(PipelineEnd::Completed) => {
                    metrics.record_build_succeeded();
                    (BuildPhase::Done, BuildOutcome::Success)
                }
                Ok(PipelineEnd::Cancelled) => {
                    metrics.record_build_cancelled();
                    (BuildPhase::Cancelled, BuildOutcome::Cancelled)
                }
                Err(error) => {
                    metrics.record_build_failed();
                    tracing::error!("Build failed: {error}");
                    (BuildPhase::Failed, BuildOutcome::Failed(error))
                }
            };

            broadcast_event(&events_tx, &metrics, BuildEvent::PhaseChanged(phase));
            broadcast_event(&events_tx, &metrics, BuildEvent::Finished(phase));
            outcome
        });

        Ok(BuildHandle {
            events,
            cancel_tx,
            task,
        })
    }
}

/// Clears the single-build guard when the pipeline task ends, however it
/// ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum PipelineEnd {
    Completed,
    Cancelled,
}

async fn run_pipeline(
    events_tx: &broadcast::Sender<BuildEvent>,
    metrics: &Arc<Metrics>,
    config_path: &Utf8Path,
    mode: BuildMode,
    python_override: Option<String>,
    cancel_rx: watch::Receiver<bool>,
) -> Result<PipelineEnd, BuildError> {
    set_phase(events_tx, metrics, BuildPhase::LoadingConfig);

    let manager = ConfigManager::new(config_path);
    let mut config = manager.load()?;
    if let Some(python_path) = python_override {
        config.project.python_path = python_path;
    }
    let project_dir = manager.project_dir();
    let compiled = compiled_artifact_path(&config);

    let reuse = mode == BuildMode::WithInstaller
        && config.installer.reuse_compiled
        && compiled.is_file();

    if reuse {
        tracing::info!("Reusing existing compiled output at {compiled}");
    } else {
        fs::create_dir_all(&config.build.output.directory)?;
        set_phase(events_tx, metrics, BuildPhase::Compiling);

        let plan = CompilerPlanBuilder::new(&project_dir).build_plan(&config);
        match run_stage(events_tx, metrics, BuildStage::Compile, &plan, cancel_rx.clone()).await? {
            StageEnd::Completed => {}
            StageEnd::Cancelled => return Ok(PipelineEnd::Cancelled),
        }

        copy_beside_items(&config, &project_dir)?;
    }

    if mode == BuildMode::ExecutableOnly || !config.installer.enabled {
        return Ok(PipelineEnd::Completed);
    }

    if *cancel_rx.borrow() {
        return Ok(PipelineEnd::Cancelled);
    }

    set_phase(events_tx, metrics, BuildPhase::Packaging);

    let builder = InstallerManifestBuilder::new();
    ensure_toolkit(&builder, &cancel_rx).await?;
    if *cancel_rx.borrow() {
        return Ok(PipelineEnd::Cancelled);
    }

    let (document, plan) = builder.build_manifest(&config, &compiled)?;

    fs::create_dir_all(&config.installer.output.directory)?;
    let wxs = builder.wxs_path(&config);
    fs::write(&wxs, document.to_xml())?;
    tracing::info!("Wrote installer source to {wxs}");

    match run_stage(events_tx, metrics, BuildStage::Package, &plan, cancel_rx).await? {
        StageEnd::Completed => Ok(PipelineEnd::Completed),
        StageEnd::Cancelled => Ok(PipelineEnd::Cancelled),
    }
}

enum StageEnd {
    Completed,
    Cancelled,
}

/// Run one external-tool stage, forwarding its output lines into the event
/// stream.
async fn run_stage(
    events_tx: &broadcast::Sender<BuildEvent>,
    metrics: &Arc<Metrics>,
    stage: BuildStage,
    plan: &CommandPlan,
    cancel_rx: watch::Receiver<bool>,
) -> Result<StageEnd, BuildError> {
    let (line_tx, mut line_rx) = mpsc::channel::<OutputLine>(256);
    let forward_tx = events_tx.clone();
    let forward_metrics = metrics.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            forward_metrics.record_line_streamed();
            broadcast_event(&forward_tx, &forward_metrics, BuildEvent::Output(line));
        }
    });

    let result = ProcessRunner::new().run(plan, line_tx, cancel_rx).await;
    let _ = forwarder.await;
    metrics.record_stage_run();

    match result {
        Ok(RunResult::Success) => Ok(StageEnd::Completed),
        Ok(RunResult::Cancelled) => Ok(StageEnd::Cancelled),
        Ok(RunResult::Failure {
            exit_code,
            stderr_tail,
        }) => Err(BuildError::StageFailed {
            stage,
            exit_code,
            stderr_tail,
        }),
        Err(source) => Err(BuildError::Launch { stage, source }),
    }
}

/// Verify the packaging toolkit is installed and carries the UI extension,
/// installing the extension when absent.
async fn ensure_toolkit(
    builder: &InstallerManifestBuilder,
    cancel_rx: &watch::Receiver<bool>,
) -> Result<(), BuildError> {
    let runner = ProcessRunner::new();

    match run_quiet(&runner, &builder.toolkit_probe_plan(), cancel_rx).await {
        Ok((RunResult::Success, _)) => {}
        Ok((RunResult::Cancelled, _)) => return Ok(()),
        Ok((RunResult::Failure { exit_code, .. }, _)) => {
            return Err(BuildError::ToolkitUnavailable(format!(
                "`wix --version` exited with code {exit_code}"
            )));
        }
        Err(ProcessError::LaunchFailed { .. }) => {
            return Err(BuildError::ToolkitUnavailable(
                "`wix` not found on PATH; install the WiX toolset".to_string(),
            ));
        }
        Err(source) => {
            return Err(BuildError::Launch {
                stage: BuildStage::Package,
                source,
            });
        }
    }

    let (result, lines) = run_quiet(&runner, &builder.extension_list_plan(), cancel_rx)
        .await
        .map_err(|source| BuildError::Launch {
            stage: BuildStage::Package,
            source,
        })?;
    let installed = matches!(result, RunResult::Success)
        && lines
            .iter()
            .any(|line| line.contains(InstallerManifestBuilder::UI_EXTENSION));
    if installed {
        return Ok(());
    }

    tracing::info!(
        "Installing packaging extension {}",
        InstallerManifestBuilder::UI_EXTENSION
    );
    match run_quiet(&runner, &builder.extension_add_plan(), cancel_rx).await {
        Ok((RunResult::Success, _)) | Ok((RunResult::Cancelled, _)) => Ok(()),
        Ok((RunResult::Failure { exit_code, .. }, _)) => Err(BuildError::ToolkitUnavailable(
            format!(
                "failed to install {} (exit code {exit_code})",
                InstallerManifestBuilder::UI_EXTENSION
            ),
        )),
        Err(source) => Err(BuildError::Launch {
            stage: BuildStage::Package,
            source,
        }),
    }
}

/// Run a short toolkit command, collecting its output instead of
/// broadcasting it.
async fn run_quiet(
    runner: &ProcessRunner,
    plan: &CommandPlan,
    cancel_rx: &watch::Receiver<bool>,
) -> Result<(RunResult, Vec<String>), ProcessError> {
    let (tx, mut rx) = mpsc::channel::<OutputLine>(64);
    let collector = tokio::spawn(async move {
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line.text);
        }
        lines
    });

    let result = runner.run(plan, tx, cancel_rx.clone()).await?;
    let lines = collector.await.unwrap_or_default();
    Ok((result, lines))
}

/// Copy the configured copy-beside items from the project directory into the
/// build output directory, honoring the exclude filter. Missing items are
/// logged and skipped.
fn copy_beside_items(config: &BuildConfig, project_dir: &Utf8Path) -> Result<(), BuildError> {
    let exclude = ExcludeFilter::new(&config.exclude);
    let output_dir = Utf8Path::new(&config.build.output.directory);

    for item in &exclude.filter(&config.build.copy_beside) {
        let source = project_dir.join(item);
        if !source.exists() {
            tracing::warn!("Copy-beside item {item} not found at {source}, skipping");
            continue;
        }

        let dest = output_dir.join(item);
        if source.is_dir() {
            copy_dir(&source, &dest, item, &exclude)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &dest)?;
        }
        tracing::info!("Copied {item} beside the executable");
    }

    Ok(())
}

fn copy_dir(
    source: &Utf8Path,
    dest: &Utf8Path,
    relative: &str,
    exclude: &ExcludeFilter,
) -> Result<(), BuildError> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let path = entry?.path();
        let Ok(path) = Utf8PathBuf::try_from(path) else {
            continue;
        };
        let name = path.file_name().unwrap_or_default().to_string();
        let entry_rel = format!("{relative}/{name}");
        if exclude.is_excluded(&entry_rel) {
            tracing::debug!("Excluding copy-beside entry: {entry_rel}");
            continue;
        }
        if path.is_dir() {
            copy_dir(&path, &dest.join(&name), &entry_rel, exclude)?;
        } else {
            fs::copy(&path, dest.join(&name))?;
        }
    }
    Ok(())
}

fn set_phase(tx: &broadcast::Sender<BuildEvent>, metrics: &Arc<Metrics>, phase: BuildPhase) {
    tracing::info!("Build phase: {phase}");
    broadcast_event(tx, metrics, BuildEvent::PhaseChanged(phase));
}

fn broadcast_event(tx: &broadcast::Sender<BuildEvent>, metrics: &Arc<Metrics>, event: BuildEvent) {
    metrics.record_event_broadcast();
    // send fails only when nobody is subscribed, which is fine for a
    // fire-and-forget progress stream.
    if tx.send(event).is_err() {
        metrics.record_event_dropped();
    }
}
