use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::Shared;
use super::record::QueuedTask;
use crate::error::HandoffError;
use crate::ids::TaskId;
use crate::task::OutcomeKind;

/// A task taken out of the queue for execution.
///
/// The holder owns the task and should `run` it. Dropping the lease without
/// running it drops the task, so its consumer sees a broken promise; the queue
/// counts it as abandoned.
pub struct TaskLease {
    record: QueuedTask,
    queue: Arc<Shared>,
    outcome: Option<OutcomeKind>,
}

impl TaskLease {
    pub(super) fn new(record: QueuedTask, queue: Arc<Shared>) -> Self {
        Self {
            record,
            queue,
            outcome: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.record.id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.record.submitted_at
    }

    /// Invoke the task on the calling thread and report the outcome to the queue.
    pub fn run(mut self) -> Result<OutcomeKind, HandoffError> {
        let kind = self.record.task.invoke()?;
        self.outcome = Some(kind);
        Ok(kind)
    }
}

impl Drop for TaskLease {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            log::warn!("{} released without running", self.record.id);
        }
        self.queue.finish(self.outcome);
    }
}

impl fmt::Debug for TaskLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLease")
            .field("id", &self.record.id)
            .field("submitted_at", &self.record.submitted_at)
            .finish_non_exhaustive()
    }
}
