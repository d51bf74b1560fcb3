//! Rank identity and per-rank payload files.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

use crate::core::AppResult;
use crate::infra::npy::{self, NpyArray};

/// Intermediate result stored by one rank.
#[derive(Debug, Clone, PartialEq)]
pub enum RankPayload {
    /// Numeric array, stored as `.npy`.
    Array(NpyArray),
    /// Anything else, stored as `.json`.
    Value(Value),
}

const RANK_VARS: &[&str] = &["OMPI_COMM_WORLD_RANK", "PMI_RANK", "PMIX_RANK", "SLURM_PROCID"];
const SIZE_VARS: &[&str] = &["OMPI_COMM_WORLD_SIZE", "PMI_SIZE", "SLURM_NTASKS"];

/// First of `keys` whose value parses; unset or garbled ones are skipped.
fn first_parsed(keys: &[&str], lookup: impl Fn(&str) -> Option<String>) -> Option<usize> {
    keys.iter().find_map(|key| lookup(key)?.trim().parse().ok())
}

fn first_env(keys: &[&str]) -> Option<usize> {
    first_parsed(keys, |key| env::var(key).ok())
}

/// Where a rank runs and which rank it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerContext {
    rank: usize,
    size: usize,
    dir: PathBuf,
}

impl WorkerContext {
    /// Context for rank `rank` of `size`, rooted at `dir`.
    pub fn new(rank: usize, size: usize, dir: impl Into<PathBuf>) -> Self {
        Self {
            rank,
            size: size.max(1),
            dir: dir.into(),
        }
    }

    /// Rank and size as exported by the MPI launcher; rank 0 of 1 when none
    /// is detected.
    pub fn from_mpi_env(dir: impl Into<PathBuf>) -> Self {
        let rank = first_env(RANK_VARS).unwrap_or(0);
        let size = first_env(SIZE_VARS).unwrap_or(1);
        Self::new(rank, size, dir)
    }

    /// Index of this rank.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.rank
    }

    /// Total number of ranks.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Task directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File stem for this rank, zero-padded to the width of the largest rank,
    /// e.g. `p07` of 12.
    #[must_use]
    pub fn pid(&self) -> String {
        let width = (self.size - 1).to_string().len();
        format!("p{:0width$}", self.rank)
    }

    /// Load this rank's payload from `src` (relative to the task directory),
    /// preferring `<pid>.npy` over `<pid>.json`.
    ///
    /// # Errors
    ///
    /// Fails when neither file can be read or decoded.
    pub fn load(&self, src: impl AsRef<Path>) -> AppResult<RankPayload> {
        let base = self.dir.join(src);
        let array = base.join(format!("{}.npy", self.pid()));

        if array.is_file() {
            let bytes = fs::read(&array).with_context(|| format!("reading {}", array.display()))?;
            let decoded = npy::decode(&bytes).with_context(|| format!("decoding {}", array.display()))?;
            return Ok(RankPayload::Array(decoded));
        }

        let value = base.join(format!("{}.json", self.pid()));
        let raw = fs::read(&value).with_context(|| format!("reading {}", value.display()))?;
        Ok(RankPayload::Value(serde_json::from_slice(&raw)?))
    }

    /// Store this rank's payload under `dst` (relative to the task directory).
    /// The directory must already exist.
    ///
    /// # Errors
    ///
    /// Fails on encoding or write errors.
    pub fn dump(&self, payload: &RankPayload, dst: impl AsRef<Path>) -> AppResult<PathBuf> {
        let base = self.dir.join(dst);
        let (path, bytes) = match payload {
            RankPayload::Array(array) => (base.join(format!("{}.npy", self.pid())), npy::encode(array)?),
            RankPayload::Value(value) => (base.join(format!("{}.json", self.pid())), serde_json::to_vec(value)?),
        };
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
