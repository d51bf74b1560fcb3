//! Filesystem adapters for task artifacts and rank payloads.

pub mod artifacts;
pub mod npy;

pub use artifacts::{ArtifactPaths, TaskArtifact, WorkerTarget};
pub use npy::NpyArray;
