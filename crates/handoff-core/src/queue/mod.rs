//! Queue module: FIFO of type-erased tasks shared between producers and workers.
//!
//! # 実装詳細
//! - `VecDeque` を一つの `Mutex` で保護（排他ドメインは一つだけ）
//! - `Condvar` で submit / close を待機中の worker に通知
//! - `take_next` は「空かつ open」の間だけ待つ。closed かつ空なら `None`（退役の合図）

mod lease;
mod record;

pub use lease::TaskLease;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use record::QueuedTask;

use crate::error::HandoffError;
use crate::ids::{IdGenerator, TaskId};
use crate::observability::QueueCounts;
use crate::task::{DeferredTask, Invoke, OutcomeKind};

struct QueueState {
    pending: VecDeque<QueuedTask>,
    closed: bool,
    running: usize,
    fulfilled: u64,
    failed: u64,
    abandoned: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            closed: false,
            running: 0,
            fulfilled: 0,
            failed: 0,
            abandoned: 0,
        }
    }

    fn counts(&self) -> QueueCounts {
        QueueCounts {
            queued: self.pending.len(),
            running: self.running,
            fulfilled: self.fulfilled,
            failed: self.failed,
            abandoned: self.abandoned,
            closed: self.closed,
        }
    }
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    ids: IdGenerator,
}

impl Shared {
    /// Tasks never run under this lock, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by a lease when it is released.
    fn finish(&self, outcome: Option<OutcomeKind>) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        match outcome {
            Some(OutcomeKind::Fulfilled) => state.fulfilled += 1,
            Some(OutcomeKind::Failed) => state.failed += 1,
            None => state.abandoned += 1,
        }
    }
}

/// Thread-safe FIFO of deferred tasks.
///
/// Cloning is cheap and every clone refers to the same queue.
///
/// # 使用例
/// ```ignore
/// let queue = TaskQueue::new();
/// let (task, mut result) = DeferredTask::new(|| 20 * 10);
/// queue.submit(task)?;
///
/// // worker 側
/// while let Some(lease) = queue.take_next() {
///     lease.run()?;
/// }
/// ```
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::new()),
                available: Condvar::new(),
                ids: IdGenerator::new(),
            }),
        }
    }

    /// Append a task to the tail and wake one waiting worker.
    ///
    /// On a closed queue the task is dropped (its consumer sees a broken
    /// promise) and `QueueClosed` is returned.
    pub fn submit<T: Send + 'static>(&self, task: DeferredTask<T>) -> Result<TaskId, HandoffError> {
        self.submit_boxed(Box::new(task))
    }

    /// Same as [`submit`](Self::submit) for an already erased task.
    pub fn submit_boxed(&self, task: Box<dyn Invoke>) -> Result<TaskId, HandoffError> {
        let id = self.shared.ids.next_id();
        let refused = {
            let mut state = self.shared.lock();
            if state.closed {
                Some(task)
            } else {
                state.pending.push_back(QueuedTask::new(id, task));
                None
            }
        };

        // 拒否したタスクの drop はロックの外で（consumer 側の通知が走るため）
        if let Some(task) = refused {
            log::warn!("submit refused for {id}: queue is closed");
            drop(task);
            return Err(HandoffError::QueueClosed);
        }

        log::trace!("submitted {id}");
        self.shared.available.notify_one();
        Ok(id)
    }

    /// Remove and return the head, blocking while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and drained: the caller should
    /// retire.
    pub fn take_next(&self) -> Option<TaskLease> {
        let mut state = self
            .shared
            .available
            .wait_while(self.shared.lock(), |s| s.pending.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        let record = state.pending.pop_front()?;
        state.running += 1;
        drop(state);
        Some(TaskLease::new(record, Arc::clone(&self.shared)))
    }

    /// Non-blocking variant of [`take_next`](Self::take_next).
    pub fn try_take_next(&self) -> Option<TaskLease> {
        let mut state = self.shared.lock();
        let record = state.pending.pop_front()?;
        state.running += 1;
        drop(state);
        Some(TaskLease::new(record, Arc::clone(&self.shared)))
    }

    /// Stop accepting submissions and wake every waiting worker.
    ///
    /// Already queued tasks stay queued; workers drain them before retiring.
    /// Closing twice is harmless.
    pub fn close(&self) {
        let pending = {
            let mut state = self.shared.lock();
            state.closed = true;
            state.pending.len()
        };
        log::debug!("queue closed with {pending} task(s) pending");
        self.shared.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of tasks waiting to be taken.
    pub fn len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> QueueCounts {
        self.shared.lock().counts()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
