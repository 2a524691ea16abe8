//! Launch policies for one-off computations that do not go through a queue.
//!
//! - `spawn*`: eager. The computation starts right away on its own thread.
//! - `lazy*`: deferred. Nothing runs until the consumer asks for the result,
//!   and then it runs on the consumer's thread.

use std::fmt;
use std::io;
use std::thread;

use crate::channel::{ConsumerHandle, channel};
use crate::task::DeferredTask;

/// Run `f` now on a new thread; the handle yields its result.
///
/// Dropping the handle detaches the computation (fire and forget).
pub fn spawn<T, F>(f: F) -> io::Result<ConsumerHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (task, consumer) = DeferredTask::new(f);
    spawn_task(task)?;
    Ok(consumer)
}

/// Like [`spawn`] for a computation that may fail.
pub fn spawn_fallible<T, E, F>(f: F) -> io::Result<ConsumerHandle<T>>
where
    T: Send + 'static,
    E: fmt::Display,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    let (task, consumer) = DeferredTask::fallible(f);
    spawn_task(task)?;
    Ok(consumer)
}

/// Defer `f` until the first `wait`/`try_wait` on the returned handle.
pub fn lazy<T, F>(f: F) -> ConsumerHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (producer, consumer) = channel();
    consumer.with_deferred(DeferredTask::bind(producer, f))
}

/// Like [`lazy`] for a computation that may fail.
pub fn lazy_fallible<T, E, F>(f: F) -> ConsumerHandle<T>
where
    T: Send + 'static,
    E: fmt::Display,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    let (producer, consumer) = channel();
    consumer.with_deferred(DeferredTask::bind_fallible(producer, f))
}

fn spawn_task<T: Send + 'static>(mut task: DeferredTask<T>) -> io::Result<()> {
    // JoinHandle は捨てる（detach）。結果は channel 経由で受け取る
    thread::Builder::new()
        .name("handoff-launch".to_string())
        .spawn(move || {
            if let Err(e) = task.invoke() {
                log::error!("launched task could not run: {e}");
            }
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandoffError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn spawn_runs_eagerly_on_another_thread() {
        let caller = thread::current().id();
        let mut handle = spawn(move || thread::current().id() != caller).unwrap();
        assert!(handle.wait().unwrap());
    }

    #[test]
    fn spawn_fallible_relays_errors() {
        let mut handle = spawn_fallible(|| Err::<i32, _>("Illegal division by 0: 20 / 0")).unwrap();
        let err = handle.wait().unwrap_err();
        assert!(err.to_string().contains("20 / 0"));
    }

    #[test]
    fn lazy_runs_only_when_waited_on() {
        let ran = Arc::new(AtomicBool::new(false));
        let mut handle = {
            let ran = Arc::clone(&ran);
            lazy(move || {
                ran.store(true, Ordering::SeqCst);
                thread::current().id()
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(!handle.is_ready());

        let ran_on = handle.wait().unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(ran_on, thread::current().id());
    }

    #[test]
    fn lazy_evaluates_after_eager() {
        let begin = Instant::now();
        let mut lazy_handle = lazy(Instant::now);
        let mut eager_handle = spawn(Instant::now).unwrap();

        thread::sleep(Duration::from_millis(50));

        let lazy_at = lazy_handle.wait().unwrap() - begin;
        let eager_at = eager_handle.wait().unwrap() - begin;
        assert!(lazy_at >= Duration::from_millis(50));
        assert!(eager_at < lazy_at);
    }

    #[test]
    fn dropping_unwaited_lazy_handle_never_runs_it() {
        let ran = Arc::new(AtomicBool::new(false));
        let handle = {
            let ran = Arc::clone(&ran);
            lazy(move || ran.store(true, Ordering::SeqCst))
        };
        drop(handle);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn lazy_fallible_surfaces_failure_then_reports_consumed() {
        let mut handle = lazy_fallible(|| "x".parse::<i32>());
        assert!(matches!(
            handle.wait(),
            Err(HandoffError::ComputationFailure(_))
        ));
        assert_eq!(handle.wait(), Err(HandoffError::ChannelAlreadyConsumed));
    }
}
