//! # Capstan Wire Types
//!
//! Data structures shared by the capstan task orchestration engine and its
//! transport bindings. A capability invocation is tracked as a [`Task`] that
//! accumulates [`Message`]s and [`Artifact`]s while moving through the
//! [`TaskState`] machine; observers receive the streaming event types defined
//! at the bottom of this module.
//!
//! All types serialize with the camelCase field names and `kind` tags the
//! wire protocol requires, and carry no behavior beyond constructors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `kind` discriminator for [`Task`].
pub const TASK_KIND: &str = "task";
/// `kind` discriminator for [`Message`].
pub const MESSAGE_KIND: &str = "message";
/// `kind` discriminator for [`TaskStatusUpdateEvent`].
pub const STATUS_UPDATE_KIND: &str = "status-update";
/// `kind` discriminator for [`TaskArtifactUpdateEvent`].
pub const ARTIFACT_UPDATE_KIND: &str = "artifact-update";
/// `kind` discriminator for [`TaskErrorEvent`].
pub const ERROR_EVENT_KIND: &str = "error";

/// Error code attached to tasks that reference an unregistered capability.
pub const NOT_IMPLEMENTED_CODE: &str = "NOT_IMPLEMENTED";
/// Error code attached to the event published when a task is canceled.
pub const CANCELED_CODE: &str = "canceled";

// ============================================================================
// Task
// ============================================================================

/// Lifecycle states of a task.
///
/// `Completed`, `Failed` and `Canceled` are terminal; the engine enforces the
/// legal edges between the remaining states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
}

impl TaskState {
    /// Wire name of the state, as it appears in serialized payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::Completed => "completed",
            TaskState::Canceled => "canceled",
            TaskState::Failed => "failed",
        }
    }
}

/// Current status of a task: the state plus a human-readable line, optional
/// progress percentage, and the timestamp of the last transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// RFC 3339 timestamp of the transition into this status.
    pub timestamp: String,
}

/// Immutable creation-time metadata of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskMetadata {
    /// Name of the capability this task executes.
    pub capability: String,
    /// Identifier of the requesting principal, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "contextId")]
    pub context_id: Option<String>,
}

/// The tracked unit of work created per capability invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub kind: String, // Always "task"
    pub id: String,
    pub status: TaskStatus,
    /// Append-only conversation history, oldest first.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub messages: Vec<Message>,
    /// Append-only outputs produced during execution.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub artifacts: Vec<Artifact>,
    pub metadata: TaskMetadata,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

// ============================================================================
// Messages and parts
// ============================================================================

/// Who produced a message turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Requester,
    Engine,
}

/// One turn of conversation attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub kind: String, // Always "message"
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "taskId")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "correlationId")]
    pub correlation_id: Option<String>,
}

impl Message {
    /// Builds a message with a fresh id and timestamp.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            kind: MESSAGE_KIND.to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            role,
            parts,
            timestamp: chrono::Utc::now().to_rfc3339(),
            task_id: None,
            correlation_id: None,
        }
    }

    pub fn requester(parts: Vec<Part>) -> Self {
        Self::new(Role::Requester, parts)
    }

    pub fn engine(parts: Vec<Part>) -> Self {
        Self::new(Role::Engine, parts)
    }

    #[must_use]
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// One atomic piece of a message: free text, a structured document, or a
/// file reference. Opaque to the engine except for invocation parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
    File { file: FileReference },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn data(data: Value) -> Self {
        Part::Data { data }
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Part::Data { data } => Some(data),
            _ => None,
        }
    }
}

/// A file attached by reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileReference {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ============================================================================
// Artifacts
// ============================================================================

/// A named output object produced during execution. Never mutated once
/// appended to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    #[serde(rename = "artifactId")]
    pub artifact_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parts: Vec<Part>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl Artifact {
    pub fn new(name: Option<String>, parts: Vec<Part>) -> Self {
        Self {
            artifact_id: uuid::Uuid::new_v4().to_string(),
            name,
            parts,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ============================================================================
// Webhooks
// ============================================================================

/// Out-of-band notification target supplied at task creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    /// Bearer token echoed back on delivery, when supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// ============================================================================
// Request parameters
// ============================================================================

/// Parameters of `message/send` and `message/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendParams {
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<SendConfiguration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SendConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
}

/// Parameters of `tasks/cancel` and `tasks/resubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIdParams {
    pub id: String,
}

/// Parameters of `tasks/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueryParams {
    pub id: String,
    /// When set, only the most recent N messages are returned.
    #[serde(skip_serializing_if = "Option::is_none", rename = "historyLength")]
    pub history_length: Option<usize>,
}

// ============================================================================
// Streaming event types
// ============================================================================

/// Published on every state transition; `final` marks the last event a
/// subscriber will see for the task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusUpdateEvent {
    pub kind: String, // Always "status-update"
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Published when an artifact is appended to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskArtifactUpdateEvent {
    pub kind: String, // Always "artifact-update"
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub artifact: Artifact,
    #[serde(skip_serializing_if = "Option::is_none", rename = "lastChunk")]
    pub last_chunk: Option<bool>,
}

/// Published when a task fails or is canceled. The carried status lets
/// observers tell a deliberate stop (`canceled`) from a real failure
/// (`failed`) without inspecting the message text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskErrorEvent {
    pub kind: String, // Always "error"
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Stable machine-readable code, e.g. `NOT_IMPLEMENTED` or `canceled`.
    pub code: String,
    pub message: String,
    pub status: TaskStatus,
}
