//! Task storage.
//!
//! The [`TaskStore`] trait is the persistence seam for task records; the
//! in-memory implementation keeps tasks in a [`DashMap`] so every mutation of
//! a single task happens under that task's entry lock. Compound operations
//! (finish an execution, claim a continuation, cancel) are single critical
//! sections, which is what preserves the append-only and terminal-state
//! invariants under concurrent access.

use async_trait::async_trait;
use capstan_types::{Artifact, Message, Task, TaskStatus, WebhookConfig};
use dashmap::DashMap;

use crate::errors::{EngineError, EngineResult};
use crate::status;

/// Persistence interface for task records, mutated only by the engine.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts or replaces a full task record.
    async fn save_task(&self, task: &Task) -> EngineResult<()>;

    /// Read-only snapshot. `None` when the task does not exist.
    async fn get_task(&self, task_id: &str) -> EngineResult<Option<Task>>;

    /// Snapshot of all tasks, newest first.
    async fn list_tasks(&self) -> EngineResult<Vec<Task>>;

    /// Atomically records an execution result: appends the engine message,
    /// appends the artifact when present, and applies the status transition.
    /// Rejected with `InvalidTaskTransition` when the task has already
    /// reached a terminal state (e.g. canceled while the handler ran), in
    /// which case nothing is appended.
    async fn complete_execution(
        &self,
        task_id: &str,
        message: Message,
        artifact: Option<Artifact>,
        status: TaskStatus,
    ) -> EngineResult<Task>;

    /// Atomically claims a task for continuation: requires `input-required`,
    /// appends the requester message and moves the task to `working`.
    /// Exactly one of two concurrent claims can win; the loser sees
    /// `InvalidTaskTransition` and the task is left untouched.
    async fn begin_continue(
        &self,
        task_id: &str,
        message: Message,
        status: TaskStatus,
    ) -> EngineResult<Task>;

    /// Atomically cancels a non-terminal task. Returns `false` (not an
    /// error) when the task is missing or already terminal.
    async fn cancel(&self, task_id: &str, status: TaskStatus) -> EngineResult<bool>;

    /// Remembers the webhook configuration supplied at creation.
    async fn set_webhook(&self, task_id: &str, config: WebhookConfig) -> EngineResult<()>;

    /// Webhook configuration for a task, when one was supplied.
    async fn webhook(&self, task_id: &str) -> EngineResult<Option<WebhookConfig>>;
}

/// In-memory [`TaskStore`] keyed by task id.
///
/// Suitable for a single process; tasks live until shutdown. Per-key entry
/// locks give the single-writer-per-task discipline without a global lock.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<String, Task>,
    webhooks: DashMap<String, WebhookConfig>,
}

impl InMemoryTaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save_task(&self, task: &Task) -> EngineResult<()> {
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> EngineResult<Option<Task>> {
        Ok(self.tasks.get(task_id).map(|entry| entry.clone()))
    }

    async fn list_tasks(&self) -> EngineResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self.tasks.iter().map(|entry| entry.clone()).collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn complete_execution(
        &self,
        task_id: &str,
        message: Message,
        artifact: Option<Artifact>,
        status: TaskStatus,
    ) -> EngineResult<Task> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        if !status::can_transition(task.status.state, status.state) {
            return Err(EngineError::InvalidTaskTransition {
                task_id: task_id.to_string(),
                from: task.status.state.as_str().to_string(),
                to: status.state.as_str().to_string(),
            });
        }

        task.messages.push(message);
        if let Some(artifact) = artifact {
            task.artifacts.push(artifact);
        }
        task.updated_at = status.timestamp.clone();
        task.status = status;
        Ok(task.clone())
    }

    async fn begin_continue(
        &self,
        task_id: &str,
        message: Message,
        status: TaskStatus,
    ) -> EngineResult<Task> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        if !status::can_continue(task.status.state) {
            return Err(EngineError::InvalidTaskTransition {
                task_id: task_id.to_string(),
                from: task.status.state.as_str().to_string(),
                to: status.state.as_str().to_string(),
            });
        }

        task.messages.push(message);
        task.updated_at = status.timestamp.clone();
        task.status = status;
        Ok(task.clone())
    }

    async fn cancel(&self, task_id: &str, status: TaskStatus) -> EngineResult<bool> {
        let Some(mut task) = self.tasks.get_mut(task_id) else {
            return Ok(false);
        };

        if status::is_terminal(task.status.state) {
            return Ok(false);
        }

        task.updated_at = status.timestamp.clone();
        task.status = status;
        Ok(true)
    }

    async fn set_webhook(&self, task_id: &str, config: WebhookConfig) -> EngineResult<()> {
        self.webhooks.insert(task_id.to_string(), config);
        Ok(())
    }

    async fn webhook(&self, task_id: &str) -> EngineResult<Option<WebhookConfig>> {
        Ok(self.webhooks.get(task_id).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use capstan_types::{Task, TaskMetadata, TASK_KIND};

    use crate::status;

    /// A fresh `working` task for store and parser tests.
    pub(crate) fn task_fixture(capability: &str) -> Task {
        let status = status::working_status();
        let now = status.timestamp.clone();
        Task {
            kind: TASK_KIND.to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            status,
            messages: Vec::new(),
            artifacts: Vec::new(),
            metadata: TaskMetadata {
                capability: capability.to_string(),
                principal: None,
                context_id: None,
            },
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
