//! Core scheduling abstractions and capacity accounting.

pub mod audit;
pub mod cost;
pub mod dispatcher;
pub mod error;
pub mod launcher;
pub mod ledger;
pub mod partition;
pub mod task;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use cost::{resource_cost, Footprint, PoolKind, ResourceCost};
pub use dispatcher::{Dispatcher, Permit};
pub use error::{AppResult, SchedulerError};
pub use launcher::{wait_with_deadline, Launcher, TaskReport, WaitOutcome};
pub use ledger::{AdmissionLedger, CapacityPool, GateId, LedgerSnapshot};
pub use task::{FunctionArgs, OnTimeout, ProcessCount, TaskCommand, TaskSpec, Timeout, TimeoutContext};
