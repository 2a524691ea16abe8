//! ReadinessGate - 「データ準備完了」の一回限りの通知
//!
//! # 学習ポイント
//! - フラグの更新は waiter が述語を確認するのと同じ Mutex の下で行う
//! - set → unlock → notify の順
//! - 述語なしの `Condvar::wait` は使わない（spurious wakeup で抜ける / 通知を取りこぼすと永久に待つ）

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One-shot "ready" announcement, decoupled from any value.
///
/// Once set, the gate stays open. Share it with `Arc`.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the gate and wake every waiter. Idempotent.
    pub fn set_ready(&self) {
        {
            let mut ready = self.lock();
            *ready = true;
        }
        log::trace!("readiness gate opened");
        self.cv.notify_all();
    }

    /// Block until the gate is open. Returns immediately if it already is.
    pub fn wait_until_ready(&self) {
        let _ready = self
            .cv
            .wait_while(self.lock(), |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Bounded variant of [`wait_until_ready`](Self::wait_until_ready).
    ///
    /// Returns whether the gate was open when the wait ended.
    pub fn wait_until_ready_timeout(&self, timeout: Duration) -> bool {
        let (ready, _) = self
            .cv
            .wait_timeout_while(self.lock(), timeout, |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
        *ready
    }

    pub fn is_ready(&self) -> bool {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_before_wait_returns_immediately() {
        let gate = ReadinessGate::new();
        gate.set_ready();
        gate.wait_until_ready();
        assert!(gate.is_ready());
    }

    #[test]
    fn wait_before_set_is_released() {
        let gate = Arc::new(ReadinessGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait_until_ready())
        };
        thread::sleep(Duration::from_millis(30));
        gate.set_ready();
        waiter.join().unwrap();
    }

    #[test]
    fn no_missed_wakeup_across_many_races() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let gate = Arc::new(ReadinessGate::new());
            let waiter_delay = Duration::from_micros(rng.gen_range(0..200));
            let setter_delay = Duration::from_micros(rng.gen_range(0..200));

            let waiter = {
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    thread::sleep(waiter_delay);
                    gate.wait_until_ready_timeout(Duration::from_secs(5))
                })
            };
            let setter = {
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    thread::sleep(setter_delay);
                    gate.set_ready();
                })
            };

            setter.join().unwrap();
            assert!(waiter.join().unwrap(), "waiter missed the announcement");
        }
    }

    #[test]
    fn every_waiter_is_released() {
        let gate = Arc::new(ReadinessGate::new());
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.wait_until_ready_timeout(Duration::from_secs(5)))
            })
            .collect();
        gate.set_ready();
        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn timeout_reports_closed_gate() {
        let gate = ReadinessGate::new();
        assert!(!gate.wait_until_ready_timeout(Duration::from_millis(10)));
        assert!(!gate.is_ready());
    }
}
