//! handoff-core
//!
//! Deferred task execution: submit a computation, keep a handle, and receive
//! exactly one value or failure through it, whether the computation ran
//! inline, on its own thread, or on a worker draining a shared queue.
//!
//! # モジュール構成
//! - **channel**: 一回限りの結果チャネル（ProducerHandle / ConsumerHandle）
//! - **task**: DeferredTask と型消去用の Invoke trait
//! - **queue**: TaskQueue（FIFO、close による graceful shutdown）と TaskLease
//! - **worker**: WorkerGroup（queue を消費する OS スレッド群）
//! - **gate**: ReadinessGate（値を伴わない「準備完了」通知）
//! - **once**: InitOnce（一度だけの初期化）
//! - **launch**: eager / lazy な単発実行
//! - **engine**: EngineBuilder / Engine（queue + workers）
//! - **observability**: QueueCounts
//! - **error**: HandoffError / TaskFailure

pub mod channel;
pub mod engine;
pub mod error;
pub mod gate;
pub mod ids;
pub mod launch;
pub mod observability;
pub mod once;
pub mod queue;
pub mod task;
pub mod worker;

pub use channel::{ConsumerHandle, ProducerHandle, channel};
pub use engine::{BuildError, Engine, EngineBuilder, EngineConfig};
pub use error::{FailureKind, HandoffError, TaskFailure};
pub use gate::ReadinessGate;
pub use ids::TaskId;
pub use observability::QueueCounts;
pub use once::InitOnce;
pub use queue::{TaskLease, TaskQueue};
pub use task::{DeferredTask, Invoke, OutcomeKind};
pub use worker::{WorkerGroup, start_workers};
