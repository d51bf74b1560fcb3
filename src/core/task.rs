//! Task descriptions submitted to the launcher.
//!
//! A task is either a shell command or a named worker function. Only worker
//! functions carry arguments, so attaching arguments to a shell command cannot
//! be expressed.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::AppResult;

/// Arguments handed to a worker function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionArgs {
    /// Passed to every rank, first.
    pub shared: Option<Value>,
    /// Split into contiguous chunks, one per rank.
    pub per_rank: Option<Vec<Value>>,
}

/// What the task runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCommand {
    /// Shell command line.
    Shell(String),
    /// Function registered with the worker bootstrap, by name.
    Function {
        /// Registry name.
        name: String,
        /// Call arguments.
        args: FunctionArgs,
    },
}

impl TaskCommand {
    /// Shell command.
    pub fn shell(cmd: impl Into<String>) -> Self {
        Self::Shell(cmd.into())
    }

    /// Worker function without arguments.
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function {
            name: name.into(),
            args: FunctionArgs::default(),
        }
    }

    /// Worker function with a shared argument and/or per-rank arguments.
    pub fn function_with(name: impl Into<String>, shared: Option<Value>, per_rank: Option<Vec<Value>>) -> Self {
        Self::Function {
            name: name.into(),
            args: FunctionArgs { shared, per_rank },
        }
    }

    /// Per-rank argument list, when non-empty.
    #[must_use]
    pub fn per_rank(&self) -> Option<&[Value]> {
        match self {
            Self::Function {
                args: FunctionArgs {
                    per_rank: Some(list), ..
                },
                ..
            } if !list.is_empty() => Some(list.as_slice()),
            _ => None,
        }
    }
}

/// Number of processes, fixed or derived from the task directory.
#[derive(Clone)]
pub enum ProcessCount {
    /// Literal count.
    Fixed(u64),
    /// Evaluated against the task directory at launch.
    FromDir(Arc<dyn Fn(&Path) -> u64 + Send + Sync>),
}

impl ProcessCount {
    /// Resolve against the task directory.
    #[must_use]
    pub fn resolve(&self, dir: &Path) -> u64 {
        match self {
            Self::Fixed(n) => *n,
            Self::FromDir(f) => f(dir),
        }
    }
}

impl fmt::Debug for ProcessCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "Fixed({n})"),
            Self::FromDir(_) => f.write_str("FromDir(..)"),
        }
    }
}

/// How long to wait for the subprocess.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Timeout {
    /// Remaining queue walltime inside a batch job, otherwise unbounded.
    #[default]
    Auto,
    /// Wait indefinitely.
    Never,
    /// Wait at most this long.
    After(Duration),
}

/// Passed to a timeout handler.
#[derive(Debug, Clone)]
pub struct TimeoutContext {
    /// Task artifact name.
    pub name: String,
    /// OS pid of the still-running subprocess.
    pub pid: Option<u32>,
    /// The deadline that expired.
    pub timeout: Duration,
}

/// Caller-supplied reaction to a timeout.
pub type TimeoutHandler = Arc<dyn Fn(&TimeoutContext) + Send + Sync>;

/// Caller-supplied check of the task log.
pub type OutputCheck = Arc<dyn Fn(&str) -> AppResult<()> + Send + Sync>;

/// Reaction when the subprocess outlives its timeout.
#[derive(Clone, Default)]
pub enum OnTimeout {
    /// Fail the task with [`SchedulerError::Timeout`](crate::core::SchedulerError::Timeout).
    #[default]
    Raise,
    /// Run the handler, then continue as if the task finished.
    Handler(TimeoutHandler),
    /// Continue silently.
    Ignore,
}

impl fmt::Debug for OnTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raise => f.write_str("Raise"),
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Ignore => f.write_str("Ignore"),
        }
    }
}

/// One unit of work for the launcher.
#[derive(Clone)]
pub struct TaskSpec {
    /// Command or function to run.
    pub command: TaskCommand,
    /// Process count.
    pub nprocs: ProcessCount,
    /// CPUs per process.
    pub cpus_per_proc: u64,
    /// GPUs per process.
    pub gpus_per_proc: u64,
    /// Processes sharing one GPU context.
    pub mps: Option<u64>,
    /// Artifact base name override.
    pub name: Option<String>,
    /// Output validator.
    pub check_output: Option<OutputCheck>,
    /// Launch as a local multiprocessing pool.
    pub multiprocessing: bool,
    /// Wait policy.
    pub timeout: Timeout,
    /// Timeout reaction.
    pub on_timeout: OnTimeout,
    /// Extra environment for the subprocess.
    pub env: Vec<(String, String)>,
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("command", &self.command)
            .field("nprocs", &self.nprocs)
            .field("cpus_per_proc", &self.cpus_per_proc)
            .field("gpus_per_proc", &self.gpus_per_proc)
            .field("mps", &self.mps)
            .field("name", &self.name)
            .field("multiprocessing", &self.multiprocessing)
            .field("timeout", &self.timeout)
            .field("on_timeout", &self.on_timeout)
            .finish_non_exhaustive()
    }
}

impl TaskSpec {
    /// Single-process, single-CPU task.
    #[must_use]
    pub fn new(command: TaskCommand) -> Self {
        Self {
            command,
            nprocs: ProcessCount::Fixed(1),
            cpus_per_proc: 1,
            gpus_per_proc: 0,
            mps: None,
            name: None,
            check_output: None,
            multiprocessing: false,
            timeout: Timeout::Auto,
            on_timeout: OnTimeout::Raise,
            env: Vec::new(),
        }
    }

    /// Set a fixed process count.
    #[must_use]
    pub fn with_nprocs(mut self, nprocs: u64) -> Self {
        self.nprocs = ProcessCount::Fixed(nprocs);
        self
    }

    /// Derive the process count from the task directory.
    #[must_use]
    pub fn with_nprocs_from(mut self, f: impl Fn(&Path) -> u64 + Send + Sync + 'static) -> Self {
        self.nprocs = ProcessCount::FromDir(Arc::new(f));
        self
    }

    /// Set CPUs per process.
    #[must_use]
    pub fn with_cpus_per_proc(mut self, cpus: u64) -> Self {
        self.cpus_per_proc = cpus;
        self
    }

    /// Set GPUs per process.
    #[must_use]
    pub fn with_gpus_per_proc(mut self, gpus: u64) -> Self {
        self.gpus_per_proc = gpus;
        self
    }

    /// Let `mps` processes share one GPU context.
    #[must_use]
    pub fn with_mps(mut self, mps: u64) -> Self {
        self.mps = Some(mps);
        self
    }

    /// Override the artifact base name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validate the task log after a successful run.
    #[must_use]
    pub fn with_check_output(mut self, f: impl Fn(&str) -> AppResult<()> + Send + Sync + 'static) -> Self {
        self.check_output = Some(Arc::new(f));
        self
    }

    /// Launch as a local multiprocessing pool.
    #[must_use]
    pub fn with_multiprocessing(mut self, enabled: bool) -> Self {
        self.multiprocessing = enabled;
        self
    }

    /// Set the wait policy.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the timeout reaction.
    #[must_use]
    pub fn with_on_timeout(mut self, on_timeout: OnTimeout) -> Self {
        self.on_timeout = on_timeout;
        self
    }

    /// Add an environment variable for the subprocess.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Artifact base name: the override, or one derived from the command.
    #[must_use]
    pub fn artifact_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        match &self.command {
            TaskCommand::Shell(cmd) => {
                let program = cmd.split(' ').next().unwrap_or_default();
                let base = program.rsplit('/').next().unwrap_or_default();
                format!("mpiexec_{base}")
            }
            TaskCommand::Function { name, .. } => {
                let name = name.trim_start_matches('_');
                if name.is_empty() {
                    "mpiexec".to_string()
                } else {
                    format!("mpiexec_{name}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_artifact_name_from_shell() {
        let spec = TaskSpec::new(TaskCommand::shell("/opt/bin/specfem3d --mesh mesh.bin"));
        assert_eq!(spec.artifact_name(), "mpiexec_specfem3d");
    }

    #[test]
    fn test_artifact_name_from_function() {
        let spec = TaskSpec::new(TaskCommand::function("__preprocess"));
        assert_eq!(spec.artifact_name(), "mpiexec_preprocess");
        assert_eq!(TaskSpec::new(TaskCommand::function("_")).artifact_name(), "mpiexec");
    }

    #[test]
    fn test_artifact_name_override() {
        let spec = TaskSpec::new(TaskCommand::shell("ls")).with_name("listing");
        assert_eq!(spec.artifact_name(), "listing");
    }

    #[test]
    fn test_empty_per_rank_is_absent() {
        let cmd = TaskCommand::function_with("f", Some(json!(1)), Some(vec![]));
        assert!(cmd.per_rank().is_none());

        let cmd = TaskCommand::function_with("f", None, Some(vec![json!("a")]));
        assert_eq!(cmd.per_rank().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_process_count_from_dir() {
        let spec = TaskSpec::new(TaskCommand::shell("true"))
            .with_nprocs_from(|dir| dir.components().count() as u64);
        assert_eq!(spec.nprocs.resolve(Path::new("/a/b")), 3);
    }
}
