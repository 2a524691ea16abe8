//! Task identifiers.
//!
//! IDs are ULIDs: sortable by creation time, so the ids of tasks submitted
//! from one thread sort in submission order (within the same millisecond the
//! monotonic generator keeps them increasing).

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

/// Identifier assigned to a task when it enters a `TaskQueue`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Ulid);

impl TaskId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Monotonic id source owned by one queue.
pub(crate) struct IdGenerator {
    inner: Mutex<Generator>,
}

impl IdGenerator {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    pub(crate) fn next_id(&self) -> TaskId {
        let mut generator = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // 同一ミリ秒内で 80bit を使い切ったときだけ失敗する。その場合は非単調な ULID で妥協
        match generator.generate() {
            Ok(ulid) => TaskId(ulid),
            Err(_) => TaskId(Ulid::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_has_task_prefix() {
        let id = TaskId::from_ulid(Ulid::new());
        assert!(id.to_string().starts_with("task-"));
    }

    #[test]
    fn generated_ids_are_increasing() {
        let ids = IdGenerator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn ids_can_be_serialized() {
        let id = TaskId::from_ulid(Ulid::new());
        let s = serde_json::to_string(&id).unwrap();
        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(id, back);
    }
}
