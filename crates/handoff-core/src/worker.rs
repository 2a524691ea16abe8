use std::io;
use std::thread::{self, JoinHandle};

use chrono::Utc;

use crate::error::HandoffError;
use crate::queue::TaskQueue;
use crate::task::OutcomeKind;

pub const DEFAULT_THREAD_NAME_PREFIX: &str = "handoff-worker";

/// Worker group handle.
/// - `join_all()` で全ワーカーの退役を待つ（queue は閉じない）
/// - `shutdown_and_join()` は close してから待つ
/// - drop すると close + join（グループより長生きするワーカーはいない）
pub struct WorkerGroup {
    queue: TaskQueue,
    joins: Vec<JoinHandle<()>>,
}

/// Spawn `count` workers draining `queue`, named `handoff-worker-<n>`.
pub fn start_workers(queue: &TaskQueue, count: usize) -> io::Result<WorkerGroup> {
    WorkerGroup::spawn(queue, count, DEFAULT_THREAD_NAME_PREFIX)
}

impl WorkerGroup {
    /// Spawn `count` workers with thread names `<prefix>-<n>`.
    ///
    /// If the OS refuses a thread, the queue is closed and the workers that
    /// did start are joined before the error is returned.
    pub fn spawn(queue: &TaskQueue, count: usize, prefix: &str) -> io::Result<Self> {
        let mut group = Self {
            queue: queue.clone(),
            joins: Vec::with_capacity(count),
        };

        for worker_id in 0..count {
            let q = queue.clone();
            let join = thread::Builder::new()
                .name(format!("{prefix}-{worker_id}"))
                .spawn(move || worker_loop(worker_id, q))?;
            // `?` で抜けると group の Drop が起動済みワーカーを片付ける
            group.joins.push(join);
        }

        log::debug!("started {count} worker(s)");
        Ok(group)
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Wait for every worker to retire.
    ///
    /// Workers only retire once the queue is closed and drained, so someone
    /// else must call `close()` on the queue, or this blocks forever.
    pub fn join_all(mut self) -> Result<(), HandoffError> {
        self.join_inner()
    }

    /// Close the queue, let the workers drain it, and wait for them.
    ///
    /// This does not interrupt a task that is already running.
    pub fn shutdown_and_join(mut self) -> Result<(), HandoffError> {
        self.queue.close();
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<(), HandoffError> {
        let mut first_panic = None;
        for (worker, join) in self.joins.drain(..).enumerate() {
            if join.join().is_err() {
                log::error!("worker-{worker} panicked");
                first_panic.get_or_insert(HandoffError::WorkerPanicked { worker });
            }
        }
        match first_panic {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        if self.joins.is_empty() {
            return;
        }
        self.queue.close();
        // panic はすでに log 済み。drop からは返せない
        let _ = self.join_inner();
    }
}

fn worker_loop(worker_id: usize, queue: TaskQueue) {
    log::trace!("worker-{worker_id} running");

    // None = closed かつ空。それまでは take_next の中で待つ
    while let Some(lease) = queue.take_next() {
        let id = lease.id();
        let waited_ms = (Utc::now() - lease.submitted_at()).num_milliseconds();

        // 計算の失敗は invoke の中で捕まえて channel に流すので、ここには来ない
        match lease.run() {
            Ok(OutcomeKind::Fulfilled) => {
                log::trace!("[worker-{worker_id}] {id} fulfilled (queued {waited_ms}ms)");
            }
            Ok(OutcomeKind::Failed) => {
                log::debug!("[worker-{worker_id}] {id} failed (queued {waited_ms}ms)");
            }
            Err(e) => {
                log::error!("[worker-{worker_id}] {id} could not run: {e}");
            }
        }
    }

    log::trace!("worker-{worker_id} retired");
}
