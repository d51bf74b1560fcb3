//! Conversion of a task's process/CPU/GPU footprint into node cost.
//!
//! MPI-style tasks are charged a rational number of nodes so several small
//! tasks can share one node; multiprocessing tasks are charged whole worker
//! slots. The two kinds live in separate capacity pools and never mix.

use std::fmt;

use num::{BigInt, BigRational};
use serde::{Deserialize, Serialize};

use crate::config::JobConfig;
use crate::core::SchedulerError;

/// Which capacity pool a cost is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Fractional-node pool for MPI launches.
    Nodes,
    /// Discrete-worker pool for multiprocessing launches.
    Workers,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes => f.write_str("nodes"),
            Self::Workers => f.write_str("workers"),
        }
    }
}

/// Resource charge of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCost {
    /// Fractional node occupancy.
    Nodes(BigRational),
    /// Worker slots.
    Workers(u64),
}

impl ResourceCost {
    /// Whole-node cost.
    #[must_use]
    pub fn nodes(n: i64) -> Self {
        Self::Nodes(BigRational::from_integer(BigInt::from(n)))
    }

    /// Fractional node cost `numer / denom`.
    ///
    /// # Panics
    ///
    /// Panics if `denom` is zero.
    #[must_use]
    pub fn node_fraction(numer: i64, denom: i64) -> Self {
        Self::Nodes(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    /// Pool this cost belongs to.
    #[must_use]
    pub const fn pool(&self) -> PoolKind {
        match self {
            Self::Nodes(_) => PoolKind::Nodes,
            Self::Workers(_) => PoolKind::Workers,
        }
    }
}

impl fmt::Display for ResourceCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes(n) => write!(f, "{n} nodes"),
            Self::Workers(w) => write!(f, "{w} workers"),
        }
    }
}

/// Requested parallel footprint of a task, after process-count resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    /// Number of processes (ranks or pool workers).
    pub nprocs: u64,
    /// CPUs per process.
    pub cpus_per_proc: u64,
    /// GPUs per process.
    pub gpus_per_proc: u64,
    /// Processes allowed to share one GPU context.
    pub mps: Option<u64>,
    /// Launch as a multiprocessing pool instead of MPI ranks.
    pub multiprocessing: bool,
}

/// `count * per / denom` in nodes, without fixed-width overflow.
fn share(count: u64, per: u64, denom: u64) -> BigRational {
    BigRational::new(BigInt::from(count) * BigInt::from(per), BigInt::from(denom))
}

/// Compute the node cost of `footprint` under `job`'s node shape.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidTask`] when the footprint cannot be mapped
/// onto the job's nodes (zero processes, zero MPS factor, GPUs requested on a
/// job without GPUs).
pub fn resource_cost(footprint: &Footprint, job: &JobConfig) -> Result<ResourceCost, SchedulerError> {
    if footprint.nprocs == 0 {
        return Err(SchedulerError::InvalidTask("process count must be positive".into()));
    }

    if footprint.multiprocessing {
        return Ok(ResourceCost::Workers(footprint.nprocs));
    }

    if job.cpus_per_node == 0 {
        return Err(SchedulerError::Config("cpus_per_node must be greater than 0".into()));
    }

    let mut nodes = share(footprint.nprocs, footprint.cpus_per_proc, job.cpus_per_node);

    match footprint.mps {
        Some(0) => {
            return Err(SchedulerError::InvalidTask("mps factor must be positive".into()));
        }
        Some(mps) => nodes = nodes.max(share(footprint.nprocs, 1, mps)),
        None if footprint.gpus_per_proc > 0 => {
            if job.gpus_per_node == 0 {
                return Err(SchedulerError::InvalidTask(
                    "gpus requested but job has no gpus per node".into(),
                ));
            }
            nodes = nodes.max(share(footprint.nprocs, footprint.gpus_per_proc, job.gpus_per_node));
        }
        None => {}
    }

    if !job.node_splittable {
        nodes = nodes.ceil();
    }

    Ok(ResourceCost::Nodes(nodes))
}
