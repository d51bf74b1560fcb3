//! Worker side: the process that runs a task's ranks.

pub mod bootstrap;
pub mod context;
pub mod registry;

pub use bootstrap::{main_with, run, run_rank, WorkerArgs};
pub use context::{RankPayload, WorkerContext};
pub use registry::{FunctionRegistry, WorkerFunction};
