//! Configuration models for job capacity and launch commands.

pub mod job;

pub use job::{JobConfig, LaunchTemplate, MpiLauncher, QueueBudget};
