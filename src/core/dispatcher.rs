//! Dispatcher: the owned scheduler object every launch goes through.
//!
//! [`Dispatcher::acquire`] either admits a request at once or parks the caller
//! on a oneshot until a release admits it. The returned [`Permit`] hands the
//! capacity back when dropped, so success, failure, timeout and cancellation
//! all release through the same path.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::JobConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::cost::{PoolKind, ResourceCost};
use crate::core::ledger::{AdmissionLedger, GateId, LedgerSnapshot};
use crate::core::SchedulerError;

struct DispatcherState {
    ledger: AdmissionLedger,
    audit: Option<Box<dyn AuditSink>>,
}

impl DispatcherState {
    fn record(&mut self, gate: GateId, pool: PoolKind, action: AuditAction, cost: Option<&ResourceCost>) {
        if let Some(sink) = self.audit.as_mut() {
            sink.record(build_audit_event(gate, pool, action, cost.map(ToString::to_string)));
        }
    }
}

/// Shared admission control for one job. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<Mutex<DispatcherState>>,
}

impl Dispatcher {
    /// Create a dispatcher over `nnodes` nodes and `nworkers` worker slots.
    #[must_use]
    pub fn new(nnodes: u64, nworkers: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(DispatcherState {
                ledger: AdmissionLedger::new(nnodes, nworkers),
                audit: None,
            })),
        }
    }

    /// Create a dispatcher sized from the job's capacity.
    #[must_use]
    pub fn from_config(job: &JobConfig) -> Self {
        Self::new(job.nnodes, job.mp_nprocs_max)
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(self, audit: Box<dyn AuditSink>) -> Self {
        self.state.lock().audit = Some(audit);
        self
    }

    /// Wait until `cost` is admitted into its pool.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::GateClosed`] if the queued request is
    /// discarded without being admitted.
    pub async fn acquire(&self, cost: ResourceCost) -> Result<Permit, SchedulerError> {
        let gate = GateId::new();
        let pool = cost.pool();

        let waiter = {
            let mut state = self.state.lock();
            let waiter = state.ledger.request(gate, cost.clone());
            let action = if waiter.is_some() { AuditAction::Queue } else { AuditAction::Admit };
            state.record(gate, pool, action, Some(&cost));
            waiter
        };

        let permit = Permit {
            dispatcher: self.clone(),
            gate,
            pool,
            cost,
        };

        match waiter {
            None => tracing::debug!("gate {} admitted ({})", gate, permit.cost),
            Some(waiter) => {
                tracing::debug!("gate {} queued ({})", gate, permit.cost);
                waiter.await.map_err(|_| SchedulerError::GateClosed)?;
                tracing::debug!("gate {} woken", gate);
            }
        }

        Ok(permit)
    }

    fn release(&self, pool: PoolKind, gate: GateId) {
        let mut state = self.state.lock();
        state.record(gate, pool, AuditAction::Release, None);

        let woken = state.ledger.release(pool, gate);
        for (gate, cost) in &woken {
            state.record(*gate, pool, AuditAction::Wake, Some(cost));
        }
        drop(state);

        if !woken.is_empty() {
            tracing::debug!("release of {} woke {} pending gate(s) in {} pool", gate, woken.len(), pool);
        }
    }

    /// Current occupancy of both pools.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.state.lock().ledger.snapshot()
    }
}

/// Admission held by one task. Dropping it releases the capacity and
/// re-admits queued tasks.
pub struct Permit {
    dispatcher: Dispatcher,
    gate: GateId,
    pool: PoolKind,
    cost: ResourceCost,
}

impl Permit {
    /// Gate identity of this admission.
    #[must_use]
    pub const fn gate(&self) -> GateId {
        self.gate
    }

    /// Admitted cost.
    #[must_use]
    pub const fn cost(&self) -> &ResourceCost {
        &self.cost
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.dispatcher.release(self.pool, self.gate);
    }
}
