//! Job-level capacity configuration and launch command rendering.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// Renders the parallel launch of `cmd` over `nprocs` MPI ranks.
pub trait MpiLauncher: Send + Sync {
    /// Wrap `cmd` in the cluster's MPI launch invocation.
    fn render(&self, cmd: &str, nprocs: u64, cpus_per_proc: u64, gpus_per_proc: u64) -> String;
}

/// Placeholder-based launch command, e.g. `mpiexec -n {nprocs} {cmd}`.
///
/// Recognised placeholders: `{nprocs}`, `{cpus}`, `{gpus}`, `{cmd}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchTemplate(pub String);

impl LaunchTemplate {
    /// Plain `mpiexec`.
    #[must_use]
    pub fn mpiexec() -> Self {
        Self("mpiexec -n {nprocs} {cmd}".into())
    }

    /// Slurm `srun` with per-task CPU and GPU binding.
    #[must_use]
    pub fn srun() -> Self {
        Self("srun -n {nprocs} --cpus-per-task {cpus} --gpus-per-task {gpus} --export ALL {cmd}".into())
    }

    /// Run the command as is, ignoring the process count.
    #[must_use]
    pub fn direct() -> Self {
        Self("{cmd}".into())
    }
}

impl Default for LaunchTemplate {
    fn default() -> Self {
        Self::mpiexec()
    }
}

impl MpiLauncher for LaunchTemplate {
    fn render(&self, cmd: &str, nprocs: u64, cpus_per_proc: u64, gpus_per_proc: u64) -> String {
        // cmd last so placeholders inside the command text are left alone
        self.0
            .replace("{nprocs}", &nprocs.to_string())
            .replace("{cpus}", &cpus_per_proc.to_string())
            .replace("{gpus}", &gpus_per_proc.to_string())
            .replace("{cmd}", cmd)
    }
}

/// Walltime budget of a job running under a queueing system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueBudget {
    /// Requested walltime in minutes.
    pub walltime_mins: f64,
    /// Job start, milliseconds since epoch.
    pub started_at_ms: u128,
}

impl QueueBudget {
    /// Walltime left, saturating at zero.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        let used_ms = now_ms().saturating_sub(self.started_at_ms);
        #[allow(clippy::cast_precision_loss)]
        let left_secs = self.walltime_mins.mul_add(60.0, -(used_ms as f64 / 1000.0));
        Duration::try_from_secs_f64(left_secs.max(0.0)).unwrap_or(Duration::ZERO)
    }
}

/// Capacity and launch settings shared by every task of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Nodes available to MPI tasks.
    pub nnodes: u64,
    /// Worker slots available to multiprocessing tasks.
    pub mp_nprocs_max: u64,
    /// CPUs per node.
    pub cpus_per_node: u64,
    /// GPUs per node.
    pub gpus_per_node: u64,
    /// Whether several tasks may share one node.
    pub node_splittable: bool,
    /// Walltime budget when running inside a batch allocation.
    pub queue: Option<QueueBudget>,
    /// MPI launch template.
    pub launcher: LaunchTemplate,
    /// Worker bootstrap executable.
    pub worker_program: PathBuf,
}

impl Default for JobConfig {
    fn default() -> Self {
        let cpus = num_cpus::get() as u64;
        Self {
            nnodes: 1,
            mp_nprocs_max: cpus,
            cpus_per_node: cpus,
            gpus_per_node: 0,
            node_splittable: true,
            queue: None,
            launcher: LaunchTemplate::default(),
            worker_program: PathBuf::from("nodequeue-worker"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{key}: cannot parse `{raw}`")),
        Err(_) => Ok(None),
    }
}

impl JobConfig {
    /// Whether the job runs under a queueing system.
    #[must_use]
    pub const fn inqueue(&self) -> bool {
        self.queue.is_some()
    }

    /// Walltime left in the allocation, `None` outside a queueing system.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.queue.as_ref().map(QueueBudget::remaining)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.nnodes == 0 {
            return Err("nnodes must be greater than 0".into());
        }
        if self.mp_nprocs_max == 0 {
            return Err("mp_nprocs_max must be greater than 0".into());
        }
        if self.cpus_per_node == 0 {
            return Err("cpus_per_node must be greater than 0".into());
        }
        if !self.launcher.0.contains("{cmd}") {
            return Err("launcher template must contain {cmd}".into());
        }
        if let Some(queue) = &self.queue {
            if queue.walltime_mins.is_nan() || queue.walltime_mins <= 0.0 {
                return Err("queue walltime must be positive".into());
            }
        }
        Ok(())
    }

    /// Parse job configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults, a `.env` file if present, and
    /// `NODEQUEUE_*` environment variables. `SLURM_JOB_ID` with
    /// `NODEQUEUE_WALLTIME_MINS` marks the job as queued, starting now.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or the
    /// first invalid field.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        if let Some(v) = env_parse("NODEQUEUE_NNODES")? {
            cfg.nnodes = v;
        }
        if let Some(v) = env_parse("NODEQUEUE_MP_NPROCS_MAX")? {
            cfg.mp_nprocs_max = v;
        }
        if let Some(v) = env_parse("NODEQUEUE_CPUS_PER_NODE")? {
            cfg.cpus_per_node = v;
        }
        if let Some(v) = env_parse("NODEQUEUE_GPUS_PER_NODE")? {
            cfg.gpus_per_node = v;
        }
        if let Some(v) = env_parse("NODEQUEUE_NODE_SPLITTABLE")? {
            cfg.node_splittable = v;
        }
        if let Ok(template) = env::var("NODEQUEUE_LAUNCHER") {
            cfg.launcher = LaunchTemplate(template);
        }
        if let Ok(program) = env::var("NODEQUEUE_WORKER") {
            cfg.worker_program = PathBuf::from(program);
        }
        if env::var_os("SLURM_JOB_ID").is_some() {
            if let Some(walltime_mins) = env_parse("NODEQUEUE_WALLTIME_MINS")? {
                cfg.queue = Some(QueueBudget {
                    walltime_mins,
                    started_at_ms: now_ms(),
                });
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }
}
