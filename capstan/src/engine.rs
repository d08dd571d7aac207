//! The task engine: creation, execution, continuation, cancellation and
//! subscription of capability invocations.
//!
//! An inbound message becomes a [`Task`] that is persisted before its handler
//! runs; the handler runs on a spawned background task so creation returns a
//! snapshot immediately. Every observable change is persisted first, then
//! published on the event bus, so the store is always at least as current as
//! what subscribers see.

use std::sync::Arc;

use capstan_types::{
    Artifact, Message, Part, Task, TaskErrorEvent, TaskMetadata, TaskStatus,
    TaskStatusUpdateEvent, WebhookConfig, CANCELED_CODE, ERROR_EVENT_KIND, NOT_IMPLEMENTED_CODE,
    TASK_KIND,
};
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult, HandlerError};
use crate::events::{TaskEvent, TaskEventBus, TaskEventReceiver};
use crate::invocation::{self, SkillInvocation};
use crate::registry::{CapabilityRegistry, HandlerStatus};
use crate::status;
use crate::store::{InMemoryTaskStore, TaskStore};
use crate::webhook::{HttpWebhookSink, WebhookPayload, WebhookSink};

/// Initial snapshot plus the live subscription for one observer of a task.
/// `receiver` is `None` when the snapshot is already final and no further
/// events will ever arrive.
#[derive(Debug)]
pub struct TaskSubscription {
    pub snapshot: TaskStatusUpdateEvent,
    pub receiver: Option<TaskEventReceiver>,
}

/// Orchestrates tracked capability invocations.
///
/// Cheap to clone; all state is behind `Arc`s, and every HTTP request handler
/// and background execution shares the same registry, store and bus.
#[derive(Clone)]
pub struct TaskEngine {
    registry: Arc<CapabilityRegistry>,
    store: Arc<dyn TaskStore>,
    bus: Arc<TaskEventBus>,
    webhooks: Arc<dyn WebhookSink>,
}

impl TaskEngine {
    /// Engine over an in-memory store with real HTTP webhook delivery.
    #[must_use]
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            store: Arc::new(InMemoryTaskStore::new()),
            bus: Arc::new(TaskEventBus::new()),
            webhooks: Arc::new(HttpWebhookSink::new()),
        }
    }

    /// Replaces the persistence backend.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the webhook delivery seam, used by tests to record payloads.
    #[must_use]
    pub fn with_webhook_sink(mut self, sink: Arc<dyn WebhookSink>) -> Self {
        self.webhooks = sink;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Creates a task from an inbound requester message and starts executing
    /// it in the background. Returns the `working` snapshot immediately.
    ///
    /// Structural validation (parts present, capability name derivable)
    /// happens here and rejects the request before any task exists. Whether
    /// the capability is actually registered is decided during execution:
    /// an unknown name produces a task that fails with `NOT_IMPLEMENTED`.
    pub async fn create_task(
        &self,
        mut message: Message,
        webhook: Option<WebhookConfig>,
        principal: Option<String>,
    ) -> EngineResult<Task> {
        let parsed = invocation::parse_invocation(&message.parts)?;
        // parse_invocation guarantees a derivable name
        let capability = parsed
            .capability_name()
            .ok_or_else(|| EngineError::Internal {
                component: "engine".into(),
                reason: "parsed invocation lost its capability name".into(),
            })?
            .to_string();

        let task_id = Uuid::new_v4().to_string();
        message.task_id = Some(task_id.clone());

        let submitted = status::submitted_status();
        let mut task = Task {
            kind: TASK_KIND.to_string(),
            id: task_id.clone(),
            status: submitted.clone(),
            messages: vec![message.clone()],
            artifacts: Vec::new(),
            metadata: TaskMetadata {
                capability: capability.clone(),
                principal,
                context_id: message.correlation_id.clone(),
            },
            created_at: submitted.timestamp.clone(),
            updated_at: submitted.timestamp,
        };

        // The engine accepts the task as soon as it is persisted, so the
        // snapshot callers receive is already `working`.
        let working = status::working_status();
        task.updated_at = working.timestamp.clone();
        task.status = working.clone();
        self.store.save_task(&task).await?;

        if let Some(config) = webhook {
            self.store.set_webhook(&task_id, config).await?;
        }

        self.bus.publish(&TaskEvent::Message(message));
        self.bus
            .publish(&TaskEvent::StatusUpdate(status::status_update_event(
                &task_id, working,
            )));

        info!(task_id = %task_id, capability = %capability, "task created");
        self.spawn_execution(task_id, parsed);
        Ok(task)
    }

    /// Read-only snapshot of a task.
    pub async fn get_task(&self, task_id: &str) -> EngineResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Snapshot of all tasks, newest first.
    pub async fn list_tasks(&self) -> EngineResult<Vec<Task>> {
        self.store.list_tasks().await
    }

    /// Appends a requester turn to an `input-required` task and resumes its
    /// execution. Exactly one of several concurrent continuations wins; the
    /// others fail with `InvalidTaskTransition` and leave the task untouched.
    pub async fn continue_task(&self, task_id: &str, mut message: Message) -> EngineResult<Task> {
        if message.parts.is_empty() {
            return Err(EngineError::validation(
                "parts",
                "at least one part is required",
            ));
        }
        message.task_id = Some(task_id.to_string());

        let working = status::working_status();
        let task = self
            .store
            .begin_continue(task_id, message.clone(), working.clone())
            .await?;

        self.bus.publish(&TaskEvent::Message(message));
        self.bus
            .publish(&TaskEvent::StatusUpdate(status::status_update_event(
                task_id, working,
            )));

        let parsed = invocation::invocation_from_history(&task)?;
        info!(task_id = %task_id, capability = %task.metadata.capability, "task continued");
        self.spawn_execution(task_id.to_string(), parsed);
        Ok(task)
    }

    /// Cancels a non-terminal task. The in-flight handler is not interrupted;
    /// its eventual result is discarded because the terminal `canceled` state
    /// wins the store-side transition check.
    ///
    /// Idempotent: a missing or already-terminal task yields `None` and
    /// produces no new events.
    pub async fn cancel_task(&self, task_id: &str) -> EngineResult<Option<Task>> {
        let status = status::canceled_status("canceled by requester");
        if !self.store.cancel(task_id, status.clone()).await? {
            return Ok(None);
        }

        self.publish_error(task_id, CANCELED_CODE, "canceled by requester", status);
        info!(task_id = %task_id, "task canceled");
        Ok(Some(self.get_task(task_id).await?))
    }

    /// Attaches an observer to a task. The snapshot reflects the status at
    /// subscription time; when it is already final the receiver is `None`
    /// and the caller should not wait for more events.
    pub async fn subscribe(&self, task_id: &str) -> EngineResult<TaskSubscription> {
        // Subscribe before reading the snapshot so a transition landing in
        // between is seen on the channel rather than lost.
        let receiver = self.bus.subscribe(task_id);
        let task = self.get_task(task_id).await?;
        let snapshot = status::status_update_event(task_id, task.status);

        let receiver = if snapshot.is_final {
            // the task will never publish again; free the slot this
            // subscription just claimed
            drop(receiver);
            self.bus.prune(task_id);
            None
        } else {
            Some(receiver)
        };
        Ok(TaskSubscription { snapshot, receiver })
    }

    fn spawn_execution(&self, task_id: String, parsed: SkillInvocation) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.execute(&task_id, parsed).await {
                error!(task_id = %task_id, error = %err, "task execution failed");
            }
        });
    }

    /// Runs the handler and lands its result. The compound store operation is
    /// what guards against a cancellation that raced the handler: when the
    /// transition is rejected, the result is discarded and nothing further is
    /// published.
    async fn execute(&self, task_id: &str, parsed: SkillInvocation) -> EngineResult<()> {
        let task = self.get_task(task_id).await?;
        let capability = task.metadata.capability.clone();

        let Some(handler) = self.registry.get(&capability) else {
            let missing = EngineError::CapabilityNotFound { capability };
            let webhook = self.store.webhook(task_id).await?;
            return self
                .fail_task(
                    task_id,
                    HandlerError::new(NOT_IMPLEMENTED_CODE, missing.to_string()),
                    webhook,
                )
                .await;
        };

        let principal = task.metadata.principal.clone();
        match handler.invoke(&parsed, principal.as_deref()).await {
            Ok(outcome) => {
                let status = match outcome.status {
                    HandlerStatus::Completed => status::completed_status(&outcome.message),
                    HandlerStatus::InputRequired => status::input_required_status(&outcome.message),
                };
                self.land_result(
                    task_id,
                    engine_message(task_id, &outcome.message, outcome.data.clone()),
                    outcome.artifact,
                    status,
                    outcome.data,
                )
                .await
            }
            Err(handler_error) => {
                let webhook = self.store.webhook(task_id).await?;
                self.fail_task(task_id, handler_error, webhook).await
            }
        }
    }

    async fn land_result(
        &self,
        task_id: &str,
        message: Message,
        artifact: Option<Artifact>,
        status: TaskStatus,
        data: Option<Value>,
    ) -> EngineResult<()> {
        let completed = status.state == capstan_types::TaskState::Completed;
        let updated = match self
            .store
            .complete_execution(task_id, message.clone(), artifact.clone(), status.clone())
            .await
        {
            Ok(task) => task,
            Err(EngineError::InvalidTaskTransition { from, .. }) => {
                debug!(task_id = %task_id, from = %from, "result discarded, task no longer running");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        self.bus.publish(&TaskEvent::Message(message));
        if let Some(artifact) = artifact {
            self.bus
                .publish(&TaskEvent::ArtifactUpdate(capstan_types::TaskArtifactUpdateEvent {
                    kind: capstan_types::ARTIFACT_UPDATE_KIND.to_string(),
                    task_id: task_id.to_string(),
                    artifact,
                    last_chunk: Some(true),
                }));
        }
        self.bus
            .publish(&TaskEvent::StatusUpdate(status::status_update_event(
                task_id,
                updated.status.clone(),
            )));

        if completed {
            if let Some(config) = self.store.webhook(task_id).await? {
                let payload =
                    WebhookPayload::new(task_id, "completed", updated.status).with_data(data);
                self.webhooks.deliver(&config, &payload).await;
            }
        }
        Ok(())
    }

    async fn fail_task(
        &self,
        task_id: &str,
        handler_error: HandlerError,
        webhook: Option<WebhookConfig>,
    ) -> EngineResult<()> {
        let status = status::failed_status(&handler_error.message);
        match self
            .store
            .complete_execution(
                task_id,
                engine_message(task_id, &handler_error.message, None),
                None,
                status.clone(),
            )
            .await
        {
            Ok(_) => {}
            Err(EngineError::InvalidTaskTransition { from, .. }) => {
                debug!(task_id = %task_id, from = %from, "failure discarded, task no longer running");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        self.publish_error(
            task_id,
            &handler_error.code,
            &handler_error.message,
            status.clone(),
        );

        if let Some(config) = webhook {
            let payload = WebhookPayload::new(task_id, "failed", status);
            self.webhooks.deliver(&config, &payload).await;
        }
        Ok(())
    }

    fn publish_error(&self, task_id: &str, code: &str, message: &str, status: TaskStatus) {
        self.bus.publish(&TaskEvent::Error(TaskErrorEvent {
            kind: ERROR_EVENT_KIND.to_string(),
            task_id: task_id.to_string(),
            code: code.to_string(),
            message: message.to_string(),
            status,
        }));
    }
}

/// Builds the engine's response turn: the summary line plus the structured
/// result when one was produced.
fn engine_message(task_id: &str, text: &str, data: Option<Value>) -> Message {
    let mut parts = vec![Part::text(text)];
    if let Some(data) = data {
        parts.push(Part::Data { data });
    }
    Message::engine(parts).with_task_id(task_id)
}
