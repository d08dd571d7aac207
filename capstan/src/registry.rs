//! Capability registry and the handler contract.
//!
//! A capability is a named operation (e.g. `"get_products"`,
//! `"build_creative"`) backed by a [`CapabilityHandler`]. The registry is a
//! static name-to-handler mapping resolved once at startup; the engine looks
//! handlers up by name at execution time and treats a miss as a task failure
//! rather than a request rejection, so callers can still poll the failed task.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use capstan_types::Artifact;
use serde_json::Value;

use crate::errors::HandlerError;
use crate::invocation::SkillInvocation;

/// State a handler declares for its task on success. The handler's choice is
/// authoritative; the engine never infers a different resulting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    Completed,
    InputRequired,
}

/// Successful result of a handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub status: HandlerStatus,
    /// Human-readable summary, becomes the task's status line and the text
    /// part of the engine's response message.
    pub message: String,
    /// Structured result payload, forwarded verbatim.
    pub data: Option<Value>,
    /// Optional output object attached to the task.
    pub artifact: Option<Artifact>,
}

impl HandlerOutcome {
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: HandlerStatus::Completed,
            message: message.into(),
            data: None,
            artifact: None,
        }
    }

    /// Declares that the task needs more input before it can finish.
    pub fn input_required(message: impl Into<String>) -> Self {
        Self {
            status: HandlerStatus::InputRequired,
            message: message.into(),
            data: None,
            artifact: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

/// Business-logic handler for one capability.
///
/// Handlers are pure with respect to the engine: they receive the parsed
/// invocation and the requesting principal, and report domain failures as
/// [`HandlerError`] values. They deserialize their own typed parameters from
/// `invocation.parameters` and surface mismatches as `invalid_params`
/// handler errors.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn invoke(
        &self,
        invocation: &SkillInvocation,
        principal: Option<&str>,
    ) -> Result<HandlerOutcome, HandlerError>;
}

/// Static mapping from capability name to handler, built once at startup.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(
        mut self,
        name: impl Into<String>,
        handler: impl CapabilityHandler + 'static,
    ) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered capability names, sorted for stable display.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
