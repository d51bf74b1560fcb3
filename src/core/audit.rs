//! Audit trail of admission decisions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::cost::PoolKind;
use crate::core::ledger::GateId;
use crate::util::clock::now_ms;

/// What happened to a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Admitted on request.
    Admit,
    /// Queued on request.
    Queue,
    /// Admitted later by a release rescan.
    Wake,
    /// Removed from the ledger.
    Release,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Admit => "admit",
            Self::Queue => "queue",
            Self::Wake => "wake",
            Self::Release => "release",
        };
        f.write_str(s)
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Gate the event concerns.
    pub gate: GateId,
    /// Pool the gate lives in.
    pub pool: PoolKind,
    /// Action taken.
    pub action: AuditAction,
    /// Rendered cost, when known.
    pub cost: Option<String>,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev. Clones share one buffer, so a
/// caller can keep a handle after giving the sink to a dispatcher.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Helper to build an audit event stamped with the current time.
#[must_use]
pub fn build_audit_event(
    gate: GateId,
    pool: PoolKind,
    action: AuditAction,
    cost: Option<String>,
) -> AuditEvent {
    AuditEvent {
        gate,
        pool,
        action,
        cost,
        created_at_ms: now_ms(),
    }
}
