use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Lines of stderr retained for failure diagnostics.
pub const STDERR_TAIL_LINES: usize = 20;

/// Grace period between the polite termination signal and the forced kill.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// A fully resolved external command invocation.
///
/// Plan builders produce these; the [`ProcessRunner`] is their only
/// consumer. The environment is an ordered map so two identical configs
/// produce identical plans down to env iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    pub program: Utf8PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<Utf8PathBuf>,
    pub env: IndexMap<String, String>,
}

impl CommandPlan {
    pub fn new<P: AsRef<Utf8Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
            env: IndexMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd<P: AsRef<Utf8Path>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Human-readable command line for logs.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.to_string()];
        for arg in &self.args {
            if arg.contains(' ') {
                parts.push(format!("\"{arg}\""));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Which pipe a streamed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Out,
    Err,
}

/// One line of tool output, tagged with its stream and a monotonic sequence
/// number spanning both streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub seq: u64,
    pub text: String,
}

/// Terminal result of one external process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Success,
    Failure {
        exit_code: i32,
        stderr_tail: Vec<String>,
    },
    Cancelled,
}

/// Errors that prevent a run from producing a [`RunResult`].
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to launch {program}: executable not found")]
    LaunchFailed { program: String },

    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generic external-process driver used by both build stages.
///
/// Launches the plan's command, streams stdout and stderr to the provided
/// sink line-by-line with independent reader tasks per pipe (so neither pipe
/// can fill and deadlock the child), and races the child against a
/// cancellation channel. Cancellation signals the whole process tree and
/// only resolves after the child is confirmed dead. The runner knows nothing
/// about compiler or packager semantics.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(
        &self,
        plan: &CommandPlan,
        output: mpsc::Sender<OutputLine>,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> Result<RunResult, ProcessError> {
        if *cancel_rx.borrow() {
            return Ok(RunResult::Cancelled);
        }

        tracing::info!("Executing: {}", plan.command_line());

        let mut cmd = Command::new(plan.program.as_str());
        cmd.args(&plan.args)
            .envs(&plan.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &plan.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::LaunchFailed {
                    program: plan.program.to_string(),
                }
            } else {
                ProcessError::Io(e)
            }
        })?;

        let seq = Arc::new(AtomicU64::new(0));
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let out_task = spawn_reader(stdout, StreamKind::Out, seq.clone(), output.clone(), None);
        let err_task = spawn_reader(
            stderr,
            StreamKind::Err,
            seq,
            output,
            Some(stderr_tail.clone()),
        );

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                changed = cancel_rx.changed() => {
                    match changed {
                        Ok(()) if *cancel_rx.borrow() => {
                            terminate(&mut child).await?;
                            join_readers(out_task, err_task).await;
                            tracing::warn!("Process cancelled: {}", plan.program);
                            return Ok(RunResult::Cancelled);
                        }
                        Ok(()) => continue,
                        // Cancel handle dropped; just wait the child out.
                        Err(_) => break child.wait().await?,
                    }
                }
            }
        };

        join_readers(out_task, err_task).await;

        if status.success() {
            tracing::info!("Process succeeded: {}", plan.program);
            Ok(RunResult::Success)
        } else {
            let exit_code = status.code().unwrap_or(-1);
            let tail = stderr_tail.lock().unwrap().iter().cloned().collect();
            tracing::error!("Process failed with exit code {}: {}", exit_code, plan.program);
            Ok(RunResult::Failure {
                exit_code,
                stderr_tail: tail,
            })
        }
    }
}

/// Stream one pipe to the sink line-by-line.
///
/// If the observer goes away the reader keeps draining to EOF so the child
/// never blocks on a full pipe.
fn spawn_reader<R>(
    stream: R,
    kind: StreamKind,
    seq: Arc<AtomicU64>,
    sink: mpsc::Sender<OutputLine>,
    tail: Option<Arc<Mutex<VecDeque<String>>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut sink_open = true;

        while let Ok(Some(text)) = lines.next_line().await {
            if let Some(tail) = &tail {
                let mut tail = tail.lock().unwrap();
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(text.clone());
            }

            if sink_open {
                let line = OutputLine {
                    stream: kind,
                    seq: seq.fetch_add(1, Ordering::SeqCst),
                    text,
                };
                if sink.send(line).await.is_err() {
                    sink_open = false;
                }
            }
        }
    })
}

async fn join_readers(out_task: JoinHandle<()>, err_task: JoinHandle<()>) {
    if let Err(e) = out_task.await {
        tracing::error!("stdout reader task failed: {e}");
    }
    if let Err(e) = err_task.await {
        tracing::error!("stderr reader task failed: {e}");
    }
}

/// Terminate the child's process tree and wait until it is confirmed dead.
///
/// Sends a polite signal first; if the tree ignores it for [`TERM_GRACE`]
/// the kill is forced.
async fn terminate(child: &mut Child) -> Result<(), ProcessError> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    signal_tree(pid, false).await;

    if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_err() {
        tracing::warn!("Process {pid} ignored termination signal, force killing");
        signal_tree(pid, true).await;
        let _ = child.start_kill();
        child.wait().await?;
    }

    Ok(())
}

// The child is spawned in its own process group, so signalling the negative
// pid reaches any grandchildren the tool spawned.
#[cfg(unix)]
async fn signal_tree(pid: u32, force: bool) {
    let signal = if force { "KILL" } else { "TERM" };
    let _ = Command::new("kill")
        .args(["-s", signal, "--", &format!("-{pid}")])
        .status()
        .await;
}

#[cfg(windows)]
async fn signal_tree(pid: u32, force: bool) {
    let mut cmd = Command::new("taskkill");
    cmd.args(["/PID", &pid.to_string(), "/T"]);
    if force {
        cmd.arg("/F");
    }
    let _ = cmd.status().await;
}
