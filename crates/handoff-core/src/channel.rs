//! One-shot result channel.
//!
//! # 学習ポイント
//! - Mutex + Condvar による blocking retrieval
//! - 述語付き wait (`wait_while`) で spurious wakeup / lost wakeup を防ぐ
//! - Drop で「約束破り」を検知して consumer を起こす
//!
//! A channel carries exactly one outcome (a value or a `TaskFailure`) from one
//! `ProducerHandle` to one `ConsumerHandle`. Neither handle is `Clone`; each
//! side is moved to whoever produces or awaits the result.

use std::fmt;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{HandoffError, TaskFailure};
use crate::task::DeferredTask;

/// Slot state.
///
/// Transitions:
/// - Empty -> Fulfilled | Failed | Abandoned (exactly once, by the producer)
/// - Fulfilled | Failed | Abandoned -> Consumed (exactly once, by the consumer)
enum Slot<T> {
    Empty,
    Fulfilled(T),
    Failed(TaskFailure),
    Abandoned,
    Consumed,
}

impl<T> Slot<T> {
    fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    outcome_ready: Condvar,
}

impl<T> Shared<T> {
    /// No user code ever runs under this lock, so a poisoned guard still
    /// holds a consistent slot.
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, outcome: Slot<T>) {
        {
            let mut slot = self.lock();
            *slot = outcome;
        }
        self.outcome_ready.notify_one();
    }
}

/// Creates a connected pair of [`ProducerHandle`] and [`ConsumerHandle`].
pub fn channel<T>() -> (ProducerHandle<T>, ConsumerHandle<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Empty),
        outcome_ready: Condvar::new(),
    });
    (
        ProducerHandle {
            shared: Arc::clone(&shared),
            published: false,
        },
        ConsumerHandle {
            shared,
            deferred: None,
        },
    )
}

/// The writing half of a channel.
///
/// Dropping it without publishing wakes the consumer with
/// [`HandoffError::BrokenPromise`].
pub struct ProducerHandle<T> {
    shared: Arc<Shared<T>>,
    published: bool,
}

impl<T> ProducerHandle<T> {
    /// Publish the value. Wakes a blocked consumer.
    pub fn publish(&mut self, value: T) -> Result<(), HandoffError> {
        self.publish_outcome(Slot::Fulfilled(value))
    }

    /// Publish a failure. Wakes a blocked consumer.
    pub fn publish_failure(&mut self, failure: TaskFailure) -> Result<(), HandoffError> {
        self.publish_outcome(Slot::Failed(failure))
    }

    /// Publish whichever outcome the computation produced.
    pub fn publish_result(&mut self, result: Result<T, TaskFailure>) -> Result<(), HandoffError> {
        match result {
            Ok(value) => self.publish(value),
            Err(failure) => self.publish_failure(failure),
        }
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    fn publish_outcome(&mut self, outcome: Slot<T>) -> Result<(), HandoffError> {
        if self.published {
            return Err(HandoffError::BrokenContract("result already published"));
        }
        self.published = true;
        self.shared.set(outcome);
        log::trace!("channel outcome published");
        Ok(())
    }
}

impl<T> Drop for ProducerHandle<T> {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        log::debug!("producer dropped without publishing; consumer will see a broken promise");
        self.shared.set(Slot::Abandoned);
    }
}

impl<T> fmt::Debug for ProducerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("published", &self.published)
            .finish_non_exhaustive()
    }
}

/// The reading half of a channel.
pub struct ConsumerHandle<T> {
    shared: Arc<Shared<T>>,
    /// Computation run inline by the first retrieval (lazy launch).
    deferred: Option<DeferredTask<T>>,
}

impl<T> ConsumerHandle<T> {
    /// A consumer whose producer lives inside `task`; the task is run on the
    /// waiting thread the first time a result is requested.
    pub(crate) fn with_deferred(mut self, task: DeferredTask<T>) -> Self {
        self.deferred = Some(task);
        self
    }

    /// Block until the outcome is available and take it.
    ///
    /// Returns the value, the computation's failure, `BrokenPromise` when the
    /// producer was dropped unpublished, or `ChannelAlreadyConsumed` on any
    /// call after the outcome has been taken.
    pub fn wait(&mut self) -> Result<T, HandoffError> {
        self.run_deferred();
        let slot = self
            .shared
            .outcome_ready
            .wait_while(self.shared.lock(), |slot| slot.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        take_outcome(slot)
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    ///
    /// On `TimedOut` the channel is left untouched and can be waited on again.
    pub fn try_wait(&mut self, timeout: Duration) -> Result<T, HandoffError> {
        self.run_deferred();
        let (slot, _) = self
            .shared
            .outcome_ready
            .wait_timeout_while(self.shared.lock(), timeout, |slot| slot.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        take_outcome(slot)
    }

    /// Would `wait` return without blocking?
    ///
    /// A lazily launched computation that has not run yet reports `false`.
    pub fn is_ready(&self) -> bool {
        !self.shared.lock().is_empty()
    }

    /// Await the outcome from async code without stalling the runtime.
    ///
    /// The blocking wait runs on tokio's blocking pool.
    pub async fn wait_async(mut self) -> Result<T, HandoffError>
    where
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(move || self.wait())
            .await
            .map_err(|e| HandoffError::Blocking(e.to_string()))?
    }

    fn run_deferred(&mut self) {
        if let Some(mut task) = self.deferred.take() {
            // 2 回目の invoke は起こり得ない (take 済み)。失敗は slot 経由で返る
            if let Err(e) = task.invoke() {
                log::warn!("deferred computation could not run: {e}");
            }
        }
    }
}

impl<T> fmt::Debug for ConsumerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("ready", &self.is_ready())
            .field("deferred", &self.deferred.is_some())
            .finish_non_exhaustive()
    }
}

fn take_outcome<T>(mut slot: MutexGuard<'_, Slot<T>>) -> Result<T, HandoffError> {
    if slot.is_empty() {
        return Err(HandoffError::TimedOut);
    }
    match mem::replace(&mut *slot, Slot::Consumed) {
        Slot::Fulfilled(value) => Ok(value),
        Slot::Failed(failure) => Err(HandoffError::ComputationFailure(failure)),
        Slot::Abandoned => Err(HandoffError::BrokenPromise),
        Slot::Consumed => Err(HandoffError::ChannelAlreadyConsumed),
        Slot::Empty => unreachable!("checked above"),
    }
}
