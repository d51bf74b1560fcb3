//! Admission ledger: running and pending sets for the two capacity pools.
//!
//! A pool admits a request when nothing is running or when the request fits
//! in the remaining capacity. The empty-pool escape lets a request larger than
//! the whole pool run alone instead of waiting forever. Pending requests keep
//! arrival order; each release rescans them largest-first and wakes every one
//! that independently fits.

use std::collections::HashMap;
use std::fmt;
use std::ops::Add;

use num::{BigInt, BigRational, CheckedAdd, Zero};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::core::cost::{PoolKind, ResourceCost};

/// Identity of one admission request. Equal costs never share a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateId(Uuid);

impl GateId {
    /// Fresh, unique gate identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Quantities a capacity pool can account in.
pub trait Units: Clone + Ord + Zero + Add<Output = Self> + CheckedAdd + fmt::Display {}

impl<T> Units for T where T: Clone + Ord + Zero + Add<Output = T> + CheckedAdd + fmt::Display {}

struct PendingEntry<U> {
    gate: GateId,
    cost: U,
    admit: oneshot::Sender<()>,
}

/// One capacity pool with its running set and arrival-ordered pending queue.
pub struct CapacityPool<U> {
    capacity: U,
    running: HashMap<GateId, U>,
    pending: Vec<PendingEntry<U>>,
}

impl<U: Units> CapacityPool<U> {
    /// Create an empty pool of the given capacity.
    pub fn new(capacity: U) -> Self {
        Self {
            capacity,
            running: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Total capacity.
    pub const fn capacity(&self) -> &U {
        &self.capacity
    }

    /// Sum of admitted costs.
    pub fn nrunning(&self) -> U {
        self.running.values().cloned().fold(U::zero(), |acc, c| acc + c)
    }

    /// Number of admitted gates.
    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    /// Number of queued gates.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Admit `gate` into the running set if capacity allows.
    pub fn try_admit(&mut self, gate: GateId, cost: &U) -> bool {
        let nrunning = self.nrunning();

        // an unrepresentable total is over capacity
        let fits = nrunning.checked_add(cost).is_some_and(|total| total <= self.capacity);
        if nrunning.is_zero() || fits {
            self.running.insert(gate, cost.clone());
            return true;
        }

        false
    }

    /// Admit immediately or queue. A queued request gets a receiver that
    /// resolves once a later [`release`](Self::release) admits it.
    pub fn request(&mut self, gate: GateId, cost: U) -> Option<oneshot::Receiver<()>> {
        if self.try_admit(gate, &cost) {
            return None;
        }

        let (admit, waiter) = oneshot::channel();
        self.pending.push(PendingEntry { gate, cost, admit });
        Some(waiter)
    }

    /// Drop `gate` from whichever set holds it, then rescan the pending queue
    /// by descending cost (arrival order on ties) and admit every entry that
    /// fits. Returns the gates woken by this release.
    pub fn release(&mut self, gate: GateId) -> Vec<(GateId, U)> {
        if let Some(idx) = self.pending.iter().position(|e| e.gate == gate) {
            self.pending.remove(idx);
        } else {
            self.running.remove(&gate);
        }

        let mut order: Vec<usize> = (0..self.pending.len()).collect();
        // sort_by is stable, so equal costs stay in arrival order
        order.sort_by(|&a, &b| self.pending[b].cost.cmp(&self.pending[a].cost));

        let mut admitted = vec![false; self.pending.len()];
        for idx in order {
            let (gate, cost) = (self.pending[idx].gate, self.pending[idx].cost.clone());
            admitted[idx] = self.try_admit(gate, &cost);
        }

        let mut woken = Vec::new();
        for (entry, admitted) in std::mem::take(&mut self.pending).into_iter().zip(admitted) {
            if admitted {
                // a dropped receiver means the waiter is being released concurrently
                let _ = entry.admit.send(());
                woken.push((entry.gate, entry.cost));
            } else {
                self.pending.push(entry);
            }
        }

        woken
    }
}

/// Read-only view of ledger occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Running MPI tasks.
    pub running_nodes: usize,
    /// Queued MPI tasks.
    pub pending_nodes: usize,
    /// Running multiprocessing tasks.
    pub running_workers: usize,
    /// Queued multiprocessing tasks.
    pub pending_workers: usize,
}

impl LedgerSnapshot {
    /// No task is running or queued in either pool.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.running_nodes == 0
            && self.pending_nodes == 0
            && self.running_workers == 0
            && self.pending_workers == 0
    }
}

/// Both capacity pools of a job.
pub struct AdmissionLedger {
    nodes: CapacityPool<BigRational>,
    workers: CapacityPool<u64>,
}

impl AdmissionLedger {
    /// Create a ledger with `nnodes` whole nodes and `nworkers` worker slots.
    #[must_use]
    pub fn new(nnodes: u64, nworkers: u64) -> Self {
        Self {
            nodes: CapacityPool::new(BigRational::from_integer(BigInt::from(nnodes))),
            workers: CapacityPool::new(nworkers),
        }
    }

    /// Admit or queue `gate` in the pool its cost belongs to.
    pub fn request(&mut self, gate: GateId, cost: ResourceCost) -> Option<oneshot::Receiver<()>> {
        match cost {
            ResourceCost::Nodes(n) => self.nodes.request(gate, n),
            ResourceCost::Workers(w) => self.workers.request(gate, w),
        }
    }

    /// Release `gate` from `pool` and wake whatever now fits.
    pub fn release(&mut self, pool: PoolKind, gate: GateId) -> Vec<(GateId, ResourceCost)> {
        match pool {
            PoolKind::Nodes => self
                .nodes
                .release(gate)
                .into_iter()
                .map(|(g, c)| (g, ResourceCost::Nodes(c)))
                .collect(),
            PoolKind::Workers => self
                .workers
                .release(gate)
                .into_iter()
                .map(|(g, c)| (g, ResourceCost::Workers(c)))
                .collect(),
        }
    }

    /// Current occupancy.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            running_nodes: self.nodes.running_len(),
            pending_nodes: self.nodes.pending_len(),
            running_workers: self.workers.running_len(),
            pending_workers: self.workers.pending_len(),
        }
    }
}
