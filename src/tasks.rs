//! Process-wide registry of ingestion tasks.
//!
//! One writer (the background ingestion job) and many readers (polling clients) share this map.
//! Records are never edited in place: a transition builds a fresh [`TaskRecord`] and swaps the
//! `Arc` under the write lock, so a reader always holds either the old or the new record.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Errors raised by [`TaskRegistry`].
#[derive(Debug, Error)]
pub enum TaskError {
    /// A task with this id is already registered.
    #[error("task '{0}' already exists")]
    Duplicate(String),
}

/// Lifecycle state of one ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Work is scheduled or running.
    Processing,
    /// The document is indexed.
    Completed {
        /// Short summary of the document.
        summary: String,
    },
    /// A stage failed.
    Failed {
        /// Human-readable cause.
        error: String,
    },
}

impl TaskState {
    /// Whether no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// Immutable record of a task at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Original upload file name.
    pub filename: String,
    /// Current state.
    pub state: TaskState,
}

/// What a caller sees when polling a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskSnapshot {
    /// Still running.
    Processing {
        /// Original upload file name.
        file: String,
    },
    /// Finished successfully.
    Completed {
        /// Original upload file name.
        file: String,
        /// Short summary of the document.
        summary: String,
    },
    /// Finished with an error.
    Failed {
        /// Original upload file name.
        file: String,
        /// Human-readable cause.
        error: String,
    },
    /// No task with this id was ever registered.
    NotFound {
        /// Fixed explanation.
        error: String,
    },
}

impl TaskSnapshot {
    fn from_record(record: &TaskRecord) -> Self {
        let file = record.filename.clone();
        match &record.state {
            TaskState::Processing => Self::Processing { file },
            TaskState::Completed { summary } => Self::Completed {
                file,
                summary: summary.clone(),
            },
            TaskState::Failed { error } => Self::Failed {
                file,
                error: error.clone(),
            },
        }
    }

    fn not_found() -> Self {
        Self::NotFound {
            error: "Invalid task ID".to_string(),
        }
    }
}

/// Concurrency-safe map from task id to its latest record.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<TaskRecord>>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task_id` in the processing state.
    pub fn create(&self, task_id: &str, filename: &str) -> Result<(), TaskError> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        if tasks.contains_key(task_id) {
            return Err(TaskError::Duplicate(task_id.to_string()));
        }
        tasks.insert(
            task_id.to_string(),
            Arc::new(TaskRecord {
                filename: filename.to_string(),
                state: TaskState::Processing,
            }),
        );
        tracing::debug!(task_id, filename, "Task registered");
        Ok(())
    }

    /// Move a processing task into a terminal state.
    ///
    /// Returns `false` and leaves the record untouched when the task is unknown, already terminal,
    /// or `state` is not terminal.
    pub fn set_result(&self, task_id: &str, state: TaskState) -> bool {
        if !state.is_terminal() {
            tracing::warn!(task_id, "Ignoring transition back to processing");
            return false;
        }

        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = tasks.get(task_id) else {
            tracing::warn!(task_id, "Ignoring result for unknown task");
            return false;
        };
        if current.state.is_terminal() {
            tracing::warn!(task_id, "Ignoring result for task already finished");
            return false;
        }

        let next = Arc::new(TaskRecord {
            filename: current.filename.clone(),
            state,
        });
        tasks.insert(task_id.to_string(), next);
        true
    }

    /// Latest record for `task_id`, if any.
    pub fn record(&self, task_id: &str) -> Option<Arc<TaskRecord>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    /// Snapshot suitable for returning to a poller; `not_found` for unknown ids.
    pub fn get(&self, task_id: &str) -> TaskSnapshot {
        self.record(task_id)
            .map(|record| TaskSnapshot::from_record(&record))
            .unwrap_or_else(TaskSnapshot::not_found)
    }
}
