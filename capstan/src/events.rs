//! Per-task fan-out for task events.
//!
//! The event bus lets any number of observers (SSE streams, tests) receive
//! updates for a given task while the store stays the source of truth.
//! Channels are unbounded; a subscriber disappears by dropping its receiver,
//! and dead senders are pruned on the next publish for that task.

use capstan_types::{
    Message, TaskArtifactUpdateEvent, TaskErrorEvent, TaskStatusUpdateEvent,
};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Receiver half of one subscription.
pub type TaskEventReceiver = UnboundedReceiver<TaskEvent>;

type TaskId = String;

/// Everything an observer of a task can see. Serializes as the inner
/// payload; each variant already carries its own `kind` discriminator.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TaskEvent {
    StatusUpdate(TaskStatusUpdateEvent),
    Message(Message),
    ArtifactUpdate(TaskArtifactUpdateEvent),
    Error(TaskErrorEvent),
}

impl TaskEvent {
    /// The task this event belongs to. `None` only for messages that were
    /// never attached to a task, which the engine does not publish.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            TaskEvent::StatusUpdate(update) => Some(&update.task_id),
            TaskEvent::ArtifactUpdate(update) => Some(&update.task_id),
            TaskEvent::Error(error) => Some(&error.task_id),
            TaskEvent::Message(message) => message.task_id.as_deref(),
        }
    }

    /// Whether no further events will follow on this subscription.
    pub fn is_final(&self) -> bool {
        match self {
            TaskEvent::StatusUpdate(update) => update.is_final,
            TaskEvent::Error(_) => true,
            TaskEvent::Message(_) | TaskEvent::ArtifactUpdate(_) => false,
        }
    }
}

#[derive(Default)]
struct Subscribers {
    senders: Vec<UnboundedSender<TaskEvent>>,
}

impl Subscribers {
    fn add(&mut self, sender: UnboundedSender<TaskEvent>) {
        self.senders.push(sender);
    }

    fn broadcast(&mut self, event: &TaskEvent) {
        self.senders
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn drop_closed(&mut self) {
        self.senders.retain(|sender| !sender.is_closed());
    }

    const fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

/// Multiplexes [`TaskEvent`]s to subscribers per task.
#[derive(Default)]
pub struct TaskEventBus {
    inner: DashMap<TaskId, Subscribers>,
}

impl TaskEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to events for the provided task identifier. Dropping the
    /// returned receiver is the unsubscription.
    #[must_use]
    pub fn subscribe(&self, task_id: &str) -> TaskEventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.entry(task_id.to_string()).or_default().add(tx);
        rx
    }

    /// Publishes an event to all subscribers of its task. A final event is
    /// the last one the task will ever produce, so its entry is dropped
    /// afterwards, closing every subscriber channel.
    pub fn publish(&self, event: &TaskEvent) {
        let Some(task_id) = event.task_id().map(str::to_string) else {
            return;
        };
        if event.is_final() {
            if let Some((_, mut subscribers)) = self.inner.remove(&task_id) {
                subscribers.broadcast(event);
            }
            return;
        }
        if let Some(mut entry) = self.inner.get_mut(&task_id) {
            entry.broadcast(event);
            if entry.is_empty() {
                drop(entry);
                self.inner.remove(&task_id);
            }
        }
    }

    /// Drops subscribers whose receivers are gone, and the whole entry when
    /// none are left. Used when a subscription is abandoned on a task that
    /// will never publish again.
    pub fn prune(&self, task_id: &str) {
        if let Some(mut entry) = self.inner.get_mut(task_id) {
            entry.drop_closed();
            if entry.is_empty() {
                drop(entry);
                self.inner.remove(task_id);
            }
        }
    }
}
