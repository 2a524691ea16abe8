//! Queue entry: id + submission time + erased task.

use chrono::{DateTime, Utc};

use crate::ids::TaskId;
use crate::task::Invoke;

/// One submitted task while it sits in the queue.
///
/// The queue owns it until a worker takes it; from then on the lease owns it
/// for the duration of a single invocation.
pub(crate) struct QueuedTask {
    pub(crate) id: TaskId,
    pub(crate) submitted_at: DateTime<Utc>,
    pub(crate) task: Box<dyn Invoke>,
}

impl QueuedTask {
    pub(crate) fn new(id: TaskId, task: Box<dyn Invoke>) -> Self {
        Self {
            id,
            submitted_at: Utc::now(),
            task,
        }
    }
}
