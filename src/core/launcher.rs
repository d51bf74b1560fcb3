//! Task launcher: admission, subprocess supervision and outcome checks.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shell_escape::escape;
use tokio::process::{Child, Command};

use crate::config::{JobConfig, MpiLauncher};
use crate::core::cost::{resource_cost, Footprint};
use crate::core::dispatcher::Dispatcher;
use crate::core::partition::partition;
use crate::core::task::{OnTimeout, TaskCommand, TaskSpec, Timeout, TimeoutContext};
use crate::core::SchedulerError;
use crate::infra::artifacts::{ArtifactPaths, TaskArtifact, WorkerTarget};
use crate::util::clock::{format_elapsed, now_ms};

/// Result of waiting on a subprocess with an optional deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Process exited.
    Completed(ExitStatus),
    /// Deadline passed first; the process may still be running.
    TimedOut,
}

/// Wait for `child` to exit, giving up after `deadline`. Giving up does not
/// terminate the process.
///
/// # Errors
///
/// Propagates the OS error from waiting on the child.
pub async fn wait_with_deadline(child: &mut Child, deadline: Option<Duration>) -> io::Result<WaitOutcome> {
    match deadline {
        None => child.wait().await.map(WaitOutcome::Completed),
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status.map(WaitOutcome::Completed),
            Err(_) => Ok(WaitOutcome::TimedOut),
        },
    }
}

/// Summary of a finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Artifact base name.
    pub name: String,
    /// Effective process count after argument partitioning.
    pub nprocs: u64,
    /// Admission time, milliseconds since epoch.
    pub dispatched_at_ms: u128,
    /// Wall-clock time spent waiting on the subprocess.
    pub elapsed: Duration,
    /// Whether the wait ended by timeout.
    pub timed_out: bool,
}

/// Launches tasks as subprocesses once the dispatcher admits them.
#[derive(Clone)]
pub struct Launcher {
    dispatcher: Dispatcher,
    job: Arc<JobConfig>,
    mpi: Arc<dyn MpiLauncher>,
}

impl Launcher {
    /// Launcher with its own dispatcher sized from `job`.
    #[must_use]
    pub fn new(job: JobConfig) -> Self {
        let dispatcher = Dispatcher::from_config(&job);
        let mpi = Arc::new(job.launcher.clone());
        Self {
            dispatcher,
            job: Arc::new(job),
            mpi,
        }
    }

    /// Share an existing dispatcher.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Replace the configured launch template.
    #[must_use]
    pub fn with_mpi_launcher(mut self, mpi: Arc<dyn MpiLauncher>) -> Self {
        self.mpi = mpi;
        self
    }

    /// Admission control used by this launcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Job configuration.
    #[must_use]
    pub fn job(&self) -> &JobConfig {
        &self.job
    }

    /// Run `spec` with `dir` as its task directory, waiting for capacity first.
    /// Capacity is released before any failure is returned.
    ///
    /// # Errors
    ///
    /// Any [`SchedulerError`] kind: invalid footprint, worker failure,
    /// non-zero exit, timeout under [`OnTimeout::Raise`], output validation,
    /// or I/O while preparing artifacts.
    pub async fn run(&self, spec: TaskSpec, dir: &Path) -> Result<TaskReport, SchedulerError> {
        let mut nprocs = spec.nprocs.resolve(dir);
        if let Some(per_rank) = spec.command.per_rank() {
            nprocs = nprocs.min(per_rank.len() as u64);
        }

        let footprint = Footprint {
            nprocs,
            cpus_per_proc: spec.cpus_per_proc,
            gpus_per_proc: spec.gpus_per_proc,
            mps: spec.mps,
            multiprocessing: spec.multiprocessing,
        };
        let cost = resource_cost(&footprint, &self.job)?;

        let permit = self.dispatcher.acquire(cost).await?;
        let dispatched_at_ms = now_ms();

        let result = self.execute(&spec, nprocs, dir, dispatched_at_ms).await;
        drop(permit);

        if let Err(e) = &result {
            tracing::error!("task {} failed: {}", spec.artifact_name(), e);
        }
        result
    }

    fn resolve_timeout(&self, timeout: Timeout) -> Option<Duration> {
        let limit = match timeout {
            Timeout::Auto => self.job.remaining(),
            Timeout::Never => None,
            Timeout::After(limit) => Some(limit),
        };
        // a zero budget means no limit, matching an unset timeout
        limit.filter(|d| !d.is_zero())
    }

    /// Build the command line, writing the worker input when one is needed.
    fn prepare(
        &self,
        spec: &TaskSpec,
        paths: &ArtifactPaths,
        nprocs: u64,
    ) -> Result<(String, Option<PathBuf>, u64), SchedulerError> {
        paths.clear()?;

        let (cmd, cwd, nprocs) = match (&spec.command, spec.multiprocessing) {
            (TaskCommand::Shell(cmd), false) => (cmd.clone(), Some(paths.dir().to_path_buf()), nprocs),
            (command, _) => {
                let (target, shared) = match command {
                    TaskCommand::Shell(cmd) => (WorkerTarget::Shell(cmd.clone()), None),
                    TaskCommand::Function { name, args } => {
                        (WorkerTarget::Function(name.clone()), args.shared.clone())
                    }
                };
                let chunks = command.per_rank().map(|list| partition(list.to_vec(), nprocs));
                let nprocs = chunks.as_ref().map_or(nprocs, |c| c.len() as u64);

                paths.write_input(&TaskArtifact {
                    target,
                    shared,
                    per_rank: chunks,
                })?;

                let cmd = format!(
                    "{} {}",
                    escape(self.job.worker_program.to_string_lossy()),
                    escape(paths.prefix().to_string_lossy()),
                );
                (cmd, None, nprocs)
            }
        };

        let cmd = if spec.multiprocessing {
            format!("{cmd} -mp {nprocs}")
        } else {
            self.mpi.render(&cmd, nprocs, spec.cpus_per_proc, spec.gpus_per_proc)
        };

        Ok((cmd, cwd, nprocs))
    }

    async fn execute(
        &self,
        spec: &TaskSpec,
        nprocs: u64,
        dir: &Path,
        dispatched_at_ms: u128,
    ) -> Result<TaskReport, SchedulerError> {
        let name = spec.artifact_name();
        let paths = ArtifactPaths::new(dir, &name);
        let (cmd, cwd, nprocs) = self.prepare(spec, &paths, nprocs)?;

        fs::write(paths.log(), format!("{cmd}\n\n"))?;
        let mut log = OpenOptions::new().append(true).open(paths.log())?;

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?))
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(cwd) = &cwd {
            command.current_dir(cwd);
        }

        tracing::info!("launching {} ({} procs): {}", name, nprocs, cmd);
        let started = Instant::now();
        let mut child = command.spawn()?;

        let deadline = self.resolve_timeout(spec.timeout);
        let outcome = wait_with_deadline(&mut child, deadline).await?;

        let mut timed_out = None;
        if let (WaitOutcome::TimedOut, Some(limit)) = (outcome, deadline) {
            tracing::warn!("task {} exceeded {:?}", name, limit);
            match &spec.on_timeout {
                OnTimeout::Raise => timed_out = Some(SchedulerError::Timeout(limit)),
                OnTimeout::Handler(handler) => handler(&TimeoutContext {
                    name: name.clone(),
                    pid: child.id(),
                    timeout: limit,
                }),
                OnTimeout::Ignore => {}
            }
        }

        // after the handler, so anything it logs precedes the elapsed line
        let elapsed = started.elapsed();
        writeln!(log, "\nelapsed: {}", format_elapsed(elapsed))?;
        drop(log);

        if let Some(err) = timed_out {
            return Err(err);
        }

        if let Some(trace) = paths.read_error()? {
            return Err(SchedulerError::WorkerFailed(trace));
        }

        if let WaitOutcome::Completed(status) = outcome {
            if !status.success() {
                return Err(SchedulerError::NonZeroExit {
                    command: cmd,
                    code: status.code(),
                });
            }
        }

        if let Some(check) = &spec.check_output {
            let output = fs::read_to_string(paths.log())?;
            check(&output).map_err(SchedulerError::Validation)?;
        }

        tracing::info!("task {} finished in {}", name, format_elapsed(elapsed));

        Ok(TaskReport {
            name,
            nprocs,
            dispatched_at_ms,
            elapsed,
            timed_out: outcome == WaitOutcome::TimedOut,
        })
    }
}
