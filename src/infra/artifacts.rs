//! On-disk task artifacts shared by the launcher and the worker bootstrap.
//!
//! For a task named `T` in directory `D`:
//! - `D/T.json`  serialized target and arguments, read by the worker
//! - `D/T.out`   launch command, subprocess output, elapsed time
//! - `D/T.error` failure trace appended by the worker

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::SchedulerError;

/// What a worker rank executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WorkerTarget {
    /// Shell command run in the artifact directory.
    Shell(String),
    /// Registered worker function.
    Function(String),
}

/// Serialized input of the worker bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArtifact {
    /// What to run.
    pub target: WorkerTarget,
    /// Argument passed to every rank.
    pub shared: Option<Value>,
    /// One argument chunk per rank.
    pub per_rank: Option<Vec<Vec<Value>>>,
}

/// Paths of one task's artifacts, derived from a common prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    prefix: PathBuf,
}

impl ArtifactPaths {
    /// Artifacts of task `name` in `dir`.
    #[must_use]
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            prefix: dir.join(name),
        }
    }

    /// Artifacts sharing an explicit prefix, as passed to the worker.
    #[must_use]
    pub fn from_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut path = OsString::from(self.prefix.as_os_str());
        path.push(suffix);
        PathBuf::from(path)
    }

    /// Common prefix.
    #[must_use]
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Directory holding the artifacts.
    #[must_use]
    pub fn dir(&self) -> &Path {
        match self.prefix.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Serialized task input.
    #[must_use]
    pub fn input(&self) -> PathBuf {
        self.with_suffix(".json")
    }

    /// Task log.
    #[must_use]
    pub fn log(&self) -> PathBuf {
        self.with_suffix(".out")
    }

    /// Worker failure record.
    #[must_use]
    pub fn error(&self) -> PathBuf {
        self.with_suffix(".error")
    }

    /// Remove every `<name>.*` file left by an earlier run.
    ///
    /// # Errors
    ///
    /// Propagates directory listing and removal failures.
    pub fn clear(&self) -> io::Result<()> {
        let Some(name) = self.prefix.file_name().and_then(|n| n.to_str()) else {
            return Ok(());
        };
        let stem = format!("{name}.");

        let entries = match fs::read_dir(self.dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        for entry in entries {
            let entry = entry?;
            let matches = entry.file_name().to_str().is_some_and(|f| f.starts_with(&stem));
            if matches && entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Write the task input.
    ///
    /// # Errors
    ///
    /// Returns I/O or serialization failures.
    pub fn write_input(&self, artifact: &TaskArtifact) -> Result<(), SchedulerError> {
        let encoded = serde_json::to_vec(artifact)?;
        fs::write(self.input(), encoded)?;
        Ok(())
    }

    /// Read the task input.
    ///
    /// # Errors
    ///
    /// Returns I/O or deserialization failures.
    pub fn read_input(&self) -> Result<TaskArtifact, SchedulerError> {
        let raw = fs::read(self.input())?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Failure record, if the worker wrote one.
    ///
    /// # Errors
    ///
    /// Propagates read failures other than a missing file.
    pub fn read_error(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(self.error()) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Append `text` to the failure record.
    ///
    /// # Errors
    ///
    /// Propagates open and write failures.
    pub fn append_error(&self, text: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(self.error())?;
        file.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        Ok(())
    }
}
