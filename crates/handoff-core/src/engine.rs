//! Engine - キューとワーカーの組み立て
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 明示的なハンドル（グローバルな singleton は持たない）

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::channel::ConsumerHandle;
use crate::error::HandoffError;
use crate::observability::QueueCounts;
use crate::queue::TaskQueue;
use crate::task::DeferredTask;
use crate::worker::{DEFAULT_THREAD_NAME_PREFIX, WorkerGroup};

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of worker threads.
    pub workers: usize,

    /// Worker threads are named `<prefix>-<n>`.
    pub thread_name_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("worker thread name prefix must not be empty")]
    EmptyThreadName,

    #[error("failed to spawn worker threads: {0}")]
    Spawn(#[from] io::Error),
}

/// EngineBuilder は設定を検証して Engine を起動する
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new()
///     .workers(2)
///     .thread_name_prefix("calc")
///     .build()?;
/// let mut product = engine.submit(|| 20 * 10)?;
/// assert_eq!(product.wait()?, 200);
/// engine.shutdown()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Validate the configuration and start the workers.
    pub fn build(self) -> Result<Engine, BuildError> {
        let config = self.config;
        if config.workers == 0 {
            return Err(BuildError::ZeroWorkers);
        }
        if config.thread_name_prefix.is_empty() {
            return Err(BuildError::EmptyThreadName);
        }

        let queue = TaskQueue::new();
        let workers = WorkerGroup::spawn(&queue, config.workers, &config.thread_name_prefix)?;
        log::debug!(
            "engine started: workers={} prefix={}",
            config.workers,
            config.thread_name_prefix
        );
        Ok(Engine {
            config,
            queue,
            workers,
        })
    }
}

/// A task queue plus the worker group draining it.
///
/// Dropping the engine closes the queue and joins the workers.
pub struct Engine {
    config: EngineConfig,
    queue: TaskQueue,
    workers: WorkerGroup,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Queue an infallible computation; the handle yields its value.
    pub fn submit<T, F>(&self, f: F) -> Result<ConsumerHandle<T>, HandoffError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (task, consumer) = DeferredTask::new(f);
        self.queue.submit(task)?;
        Ok(consumer)
    }

    /// Queue a computation that may fail.
    pub fn submit_fallible<T, E, F>(&self, f: F) -> Result<ConsumerHandle<T>, HandoffError>
    where
        T: Send + 'static,
        E: fmt::Display,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let (task, consumer) = DeferredTask::fallible(f);
        self.queue.submit(task)?;
        Ok(consumer)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying queue, for submitting pre-built tasks or closing early.
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn counts(&self) -> QueueCounts {
        self.queue.counts()
    }

    /// Close the queue, drain what is left, and join the workers.
    pub fn shutdown(self) -> Result<(), HandoffError> {
        let Engine { queue, workers, .. } = self;
        let result = workers.shutdown_and_join();
        log::debug!("engine stopped: {:?}", queue.counts());
        result
    }
}
