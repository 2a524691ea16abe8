//! InitOnce - 一度だけ初期化して安定した参照を返す
//!
//! 高速パスはロックなしで読む。低速パスは Mutex の下でもう一度確認してから初期化する
//! (check-under-exclusion)。初期化に失敗した場合はセルは空のまま、次の呼び出しで再試行できる。

use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

/// A cell initialized at most once, by whichever caller gets there first.
///
/// Unlike a `static`, the cell is an ordinary value: put it in the struct
/// that needs it, or behind an `Arc`.
pub struct InitOnce<T> {
    value: OnceLock<T>,
    init_lock: Mutex<()>,
}

impl<T> InitOnce<T> {
    pub const fn new() -> Self {
        Self {
            value: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// The value, if initialization already happened.
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    pub fn get_or_init<F>(&self, init: F) -> &T
    where
        F: FnOnce() -> T,
    {
        match self.get_or_try_init(|| Ok::<T, std::convert::Infallible>(init())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Run `init` if the cell is empty, otherwise return the stored value.
    ///
    /// Concurrent callers block until the first one finishes; `init` runs at
    /// most once per successful initialization.
    pub fn get_or_try_init<F, E>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        let value = init()?;
        log::debug!("one-time initialization completed");
        Ok(self.value.get_or_init(|| value))
    }
}

impl<T> Default for InitOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for InitOnce<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InitOnce").field(&self.value.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn initializes_once_across_threads() {
        let cell = Arc::new(InitOnce::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    let value: &String = cell.get_or_init(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(10));
                        "instance".to_string()
                    });
                    value as *const String as usize
                })
            })
            .collect();

        let addrs: Vec<usize> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn failed_init_can_be_retried() {
        let cell: InitOnce<u32> = InitOnce::new();
        let err = cell.get_or_try_init(|| Err("not yet")).unwrap_err();
        assert_eq!(err, "not yet");
        assert!(cell.get().is_none());

        assert_eq!(*cell.get_or_try_init(|| Ok::<_, &str>(7)).unwrap(), 7);
        assert_eq!(*cell.get_or_init(|| 8), 7);
    }
}
