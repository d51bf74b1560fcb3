//! Entry point of the process launched for each task.
//!
//! The launcher starts `<worker> <prefix>` under MPI, or
//! `<worker> <prefix> -mp N` for a local pool. The worker reads
//! `<prefix>.json`, runs its rank(s), and on failure appends the error chain
//! to `<prefix>.error` so the launcher can report it.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use serde_json::Value;
use tokio::process::Command;
use tokio::task::JoinSet;

use super::registry::join_failure;
use super::{FunctionRegistry, WorkerContext};
use crate::core::AppResult;
use crate::infra::artifacts::{ArtifactPaths, TaskArtifact, WorkerTarget};
use crate::util::telemetry::init_tracing;

/// Command line of the worker process.
#[derive(Debug, Parser)]
#[command(name = "nodequeue-worker", author, version, about = "Runs the ranks of one dispatched task")]
pub struct WorkerArgs {
    /// Artifact prefix of the task (path without extension)
    pub artifact: PathBuf,

    /// Run N ranks as a local pool instead of reading the MPI rank
    #[arg(long = "mp", value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub mp: Option<u64>,
}

impl WorkerArgs {
    /// Parse the process arguments.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }
}

/// Accept the single-dash `-mp` spelling used in launch commands.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| if arg == "-mp" { OsString::from("--mp") } else { arg })
        .collect()
}

/// Arguments handed to the function for `rank`.
fn rank_args(artifact: &TaskArtifact, rank: usize) -> AppResult<Vec<Value>> {
    let mut args = Vec::with_capacity(2);
    if let Some(shared) = &artifact.shared {
        args.push(shared.clone());
    }
    if let Some(chunks) = &artifact.per_rank {
        let chunk = chunks
            .get(rank)
            .with_context(|| format!("no argument chunk for rank {rank} of {}", chunks.len()))?;
        args.push(Value::Array(chunk.clone()));
    }
    Ok(args)
}

/// Run one rank of `artifact`.
///
/// # Errors
///
/// Fails when the function is not registered, the function fails, or the
/// shell command exits with a non-zero status.
pub async fn run_rank(artifact: &TaskArtifact, ctx: &WorkerContext, registry: &FunctionRegistry) -> AppResult<()> {
    match &artifact.target {
        WorkerTarget::Function(name) => {
            let function = registry.get(name).ok_or_else(|| {
                anyhow!("function `{name}` is not registered (known: {:?})", registry.names())
            })?;
            function.call(ctx, rank_args(artifact, ctx.rank())?).await
        }
        WorkerTarget::Shell(cmd) => {
            let status = Command::new("sh")
                .arg("-c")
                .arg(cmd)
                .current_dir(ctx.dir())
                .status()
                .await
                .with_context(|| format!("spawning `{cmd}`"))?;
            if !status.success() {
                bail!("command `{cmd}` failed with {status}");
            }
            Ok(())
        }
    }
}

/// Run every rank this process is responsible for.
///
/// # Errors
///
/// Returns the first rank failure, after all ranks have finished.
pub async fn run(args: &WorkerArgs, registry: &FunctionRegistry) -> AppResult<()> {
    let paths = ArtifactPaths::from_prefix(&args.artifact);
    let artifact = paths
        .read_input()
        .with_context(|| format!("reading {}", paths.input().display()))?;
    let dir = paths.dir().to_path_buf();

    let contexts: Vec<_> = match args.mp {
        None => {
            let ctx = WorkerContext::from_mpi_env(dir);
            tracing::debug!("rank {} of {}", ctx.rank(), ctx.size());
            vec![ctx]
        }
        Some(n) => {
            let size = usize::try_from(n)?;
            (0..size).map(|rank| WorkerContext::new(rank, size, dir.clone())).collect()
        }
    };

    // every rank runs as a task so a panic surfaces as an error to record
    let artifact = Arc::new(artifact);
    let mut ranks = JoinSet::new();
    for ctx in contexts {
        let artifact = Arc::clone(&artifact);
        let registry = registry.clone();
        ranks.spawn(async move { run_rank(&artifact, &ctx, &registry).await });
    }

    let mut first_error = None;
    while let Some(joined) = ranks.join_next().await {
        if let Err(e) = joined.map_err(join_failure).and_then(|r| r) {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Record `err` in the task's failure file and on stderr.
pub fn report_failure(prefix: impl Into<PathBuf>, err: &anyhow::Error) {
    let trace = format!("{err:?}");
    eprintln!("{trace}");
    if let Err(e) = ArtifactPaths::from_prefix(prefix).append_error(&trace) {
        tracing::error!("could not write failure record: {}", e);
    }
}

/// Full worker process: parse arguments, run the ranks, record any failure.
///
/// Worker binaries call this from `main` with the functions they provide.
/// The process exits normally even on failure; the launcher detects failure
/// from the `.error` file.
pub fn main_with(registry: FunctionRegistry) {
    init_tracing();
    let args = WorkerArgs::from_env();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building worker runtime")
        .and_then(|runtime| runtime.block_on(run(&args, &registry)));

    if let Err(e) = result {
        report_failure(&args.artifact, &e);
    }
}
