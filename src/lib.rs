//! # nodequeue
//!
//! Resource-aware dispatch of MPI and multiprocessing tasks on the nodes of a
//! shared cluster allocation.
//!
//! Many independent tasks are started concurrently from one driver. Each one
//! declares its footprint (process count, CPUs and GPUs per process, MPS
//! slots) and waits until the allocation has room for it. When capacity frees
//! up, waiting tasks are woken largest first, so big jobs are not starved by
//! a stream of small ones.
//!
//! ## Pieces
//!
//! - **Dispatcher**: admission ledger with two independent pools, fractional
//!   nodes for MPI tasks and worker slots for multiprocessing tasks
//! - **Launcher**: turns a task into a command line, supervises the
//!   subprocess under the remaining walltime, and checks the outcome
//! - **Worker**: the process on the other side, running a registered
//!   function (or a shell command) once per rank
//!
//! ```rust,ignore
//! use nodequeue::config::JobConfig;
//! use nodequeue::core::{Launcher, TaskCommand, TaskSpec};
//!
//! let launcher = Launcher::new(JobConfig::from_env()?);
//!
//! let spec = TaskSpec::new(TaskCommand::shell("solver --input mesh.h5"))
//!     .with_nprocs(32)
//!     .with_gpus_per_proc(1);
//! let report = launcher.run(spec, "runs/iter01".as_ref()).await?;
//! ```
//!
//! Worker binaries that provide functions register them and hand over to
//! the bootstrap:
//!
//! ```rust,ignore
//! use nodequeue::worker::{main_with, FunctionRegistry};
//!
//! fn main() {
//!     main_with(FunctionRegistry::new().register_fn("smooth", |ctx, args| {
//!         // ...
//!         Ok(())
//!     }));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Cost model, admission ledger, dispatcher and task launcher.
pub mod core;
/// Job configuration and launch templates.
pub mod config;
/// On-disk task artifacts and payload codecs.
pub mod infra;
/// Worker bootstrap, rank context and function registry.
pub mod worker;
/// Shared utilities.
pub mod util;
