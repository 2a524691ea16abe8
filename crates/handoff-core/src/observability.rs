use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of a `TaskQueue`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Submitted and not yet taken by a worker.
    pub queued: usize,
    /// Taken by a worker and not yet finished.
    pub running: usize,
    pub fulfilled: u64,
    pub failed: u64,
    /// Leases dropped without running their task.
    pub abandoned: u64,
    pub closed: bool,
}

impl QueueCounts {
    /// Tasks that went through a worker, whatever the outcome.
    pub fn finished(&self) -> u64 {
        self.fulfilled + self.failed + self.abandoned
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.running == 0
    }
}
