//! DeferredTask - 結果チャネルに束縛された計算
//!
//! # 二層構造
//! - **表層（Typed）**: `DeferredTask<T>` - 結果の型 `T` を知っている
//! - **内部（Dyn）**: `Invoke` trait - object-safe、キューは `T` を知らない

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::channel::{ConsumerHandle, ProducerHandle, channel};
use crate::error::{HandoffError, TaskFailure};

type Computation<T> = Box<dyn FnOnce() -> Result<T, TaskFailure> + Send + 'static>;

/// What a single invocation published into its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Fulfilled,
    Failed,
}

/// A computation bound to the producer half of a channel.
///
/// # 使用例
/// ```ignore
/// let (mut task, mut result) = DeferredTask::new(|| factorial(6));
/// task.invoke()?;                // どのスレッドでもよい
/// assert_eq!(result.wait()?, 720);
/// ```
pub struct DeferredTask<T> {
    computation: Option<Computation<T>>,
    producer: ProducerHandle<T>,
}

impl<T: Send + 'static> DeferredTask<T> {
    /// Wrap an infallible computation and create its channel.
    pub fn new<F>(f: F) -> (Self, ConsumerHandle<T>)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (producer, consumer) = channel();
        (Self::bind(producer, f), consumer)
    }

    /// Wrap a computation that may fail and create its channel.
    ///
    /// `Err(e)` is published as a `TaskFailure` carrying `e.to_string()`.
    pub fn fallible<F, E>(f: F) -> (Self, ConsumerHandle<T>)
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: fmt::Display,
    {
        let (producer, consumer) = channel();
        (Self::bind_fallible(producer, f), consumer)
    }

    /// Bind an infallible computation to an existing producer.
    pub fn bind<F>(producer: ProducerHandle<T>, f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            computation: Some(Box::new(move || Ok(f()))),
            producer,
        }
    }

    /// Bind a fallible computation to an existing producer.
    pub fn bind_fallible<F, E>(producer: ProducerHandle<T>, f: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: fmt::Display,
    {
        Self {
            computation: Some(Box::new(move || f().map_err(TaskFailure::from_display))),
            producer,
        }
    }
}

impl<T> DeferredTask<T> {
    /// Run the computation on the calling thread and publish its outcome.
    ///
    /// Errors and panics raised by the computation are published into the
    /// channel, never returned from here. The only error `invoke` itself
    /// reports is `BrokenContract` on a second call.
    pub fn invoke(&mut self) -> Result<OutcomeKind, HandoffError> {
        let computation = self
            .computation
            .take()
            .ok_or(HandoffError::BrokenContract("task already invoked"))?;

        let result = panic::catch_unwind(AssertUnwindSafe(computation))
            .unwrap_or_else(|payload| Err(TaskFailure::from_panic(payload)));

        let kind = match &result {
            Ok(_) => OutcomeKind::Fulfilled,
            Err(failure) => {
                log::debug!("computation failed: {failure}");
                OutcomeKind::Failed
            }
        };
        self.producer.publish_result(result)?;
        Ok(kind)
    }

    pub fn is_invoked(&self) -> bool {
        self.computation.is_none()
    }
}

impl<T> fmt::Debug for DeferredTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask")
            .field("invoked", &self.is_invoked())
            .finish_non_exhaustive()
    }
}

/// Invoke は object-safe な DeferredTask の抽象化
///
/// `Box<dyn Invoke>` にすることで、結果の型が異なるタスクを
/// 一つのキューに並べられる。
pub trait Invoke: Send {
    fn invoke(&mut self) -> Result<OutcomeKind, HandoffError>;
}

impl<T: Send> Invoke for DeferredTask<T> {
    fn invoke(&mut self) -> Result<OutcomeKind, HandoffError> {
        DeferredTask::invoke(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use rstest::rstest;

    fn factorial(n: u64) -> u64 {
        (1..=n).product()
    }

    fn divide(num: i32, den: i32) -> Result<i32, String> {
        if den == 0 {
            return Err(format!("Illegal division by 0: {num} / {den}"));
        }
        Ok(num / den)
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(6, 720)]
    #[case(10, 3_628_800)]
    fn invoke_publishes_return_value(#[case] n: u64, #[case] expected: u64) {
        let (mut task, mut result) = DeferredTask::new(move || factorial(n));
        assert_eq!(task.invoke().unwrap(), OutcomeKind::Fulfilled);
        assert_eq!(result.wait().unwrap(), expected);
    }

    #[rstest]
    #[case(20, 10, Ok(2))]
    #[case(20, 0, Err("Illegal division by 0: 20 / 0"))]
    fn invoke_relays_computation_errors(
        #[case] num: i32,
        #[case] den: i32,
        #[case] expected: Result<i32, &str>,
    ) {
        let (mut task, mut result) = DeferredTask::fallible(move || divide(num, den));
        task.invoke().unwrap();
        match expected {
            Ok(v) => assert_eq!(result.wait().unwrap(), v),
            Err(msg) => {
                let err = result.wait().unwrap_err();
                assert_eq!(err.as_failure().map(TaskFailure::message), Some(msg));
            }
        }
    }

    #[test]
    fn panics_are_caught_at_the_task_boundary() {
        let (mut task, mut result) = DeferredTask::<i32>::new(|| panic!("exploded"));
        assert_eq!(task.invoke().unwrap(), OutcomeKind::Failed);

        let err = result.wait().unwrap_err();
        let failure = err.as_failure().unwrap();
        assert_eq!(failure.kind(), FailureKind::Panic);
        assert_eq!(failure.message(), "exploded");
    }

    #[test]
    fn second_invoke_is_a_broken_contract() {
        let (mut task, mut result) = DeferredTask::new(|| 1);
        task.invoke().unwrap();
        assert!(task.is_invoked());
        assert_eq!(
            task.invoke(),
            Err(HandoffError::BrokenContract("task already invoked"))
        );
        assert_eq!(result.wait().unwrap(), 1);
    }

    #[test]
    fn dropping_an_uninvoked_task_breaks_the_promise() {
        let (task, mut result) = DeferredTask::new(|| "never");
        drop(task);
        assert_eq!(result.wait(), Err(HandoffError::BrokenPromise));
    }

    #[test]
    fn bind_uses_the_given_producer() {
        let (producer, mut consumer) = channel();
        let mut task = DeferredTask::bind(producer, || vec![1, 2, 3]);
        task.invoke().unwrap();
        assert_eq!(consumer.wait().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn erased_tasks_with_different_result_types_share_a_vec() {
        let (a, mut ra) = DeferredTask::new(|| 20 * 10);
        let (b, mut rb) = DeferredTask::new(|| "two hundred".to_string());
        let mut erased: Vec<Box<dyn Invoke>> = vec![Box::new(a), Box::new(b)];
        for task in &mut erased {
            task.invoke().unwrap();
        }
        assert_eq!(ra.wait().unwrap(), 200);
        assert_eq!(rb.wait().unwrap(), "two hundred");
    }

    #[test]
    fn invoke_on_another_thread() {
        let (mut task, mut result) = DeferredTask::new(|| factorial(6));
        let worker = std::thread::spawn(move || task.invoke());
        assert_eq!(result.wait().unwrap(), 720);
        assert_eq!(worker.join().unwrap().unwrap(), OutcomeKind::Fulfilled);
    }
}
