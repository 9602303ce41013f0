//! Ambient counters exposed for observability (§4.12, AMBIENT-STATS). Pure
//! bookkeeping: nothing here affects control flow.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Statistics {
    pub client_actors_spawned: AtomicU64,
    pub client_actors_active: AtomicU64,
    pub acceptors_spawned: AtomicU64,
    pub acceptors_active: AtomicU64,
    pub calls_sent: AtomicU64,
    pub calls_replied: AtomicU64,
    pub calls_timed_out: AtomicU64,
    pub casts_sent: AtomicU64,
    pub calls_rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
    pub client_actors_spawned: u64,
    pub client_actors_active: u64,
    pub acceptors_spawned: u64,
    pub acceptors_active: u64,
    pub calls_sent: u64,
    pub calls_replied: u64,
    pub calls_timed_out: u64,
    pub casts_sent: u64,
    pub calls_rejected: u64,
}

impl Statistics {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            client_actors_spawned: self.client_actors_spawned.load(Ordering::Relaxed),
            client_actors_active: self.client_actors_active.load(Ordering::Relaxed),
            acceptors_spawned: self.acceptors_spawned.load(Ordering::Relaxed),
            acceptors_active: self.acceptors_active.load(Ordering::Relaxed),
            calls_sent: self.calls_sent.load(Ordering::Relaxed),
            calls_replied: self.calls_replied.load(Ordering::Relaxed),
            calls_timed_out: self.calls_timed_out.load(Ordering::Relaxed),
            casts_sent: self.casts_sent.load(Ordering::Relaxed),
            calls_rejected: self.calls_rejected.load(Ordering::Relaxed),
        }
    }
}
