//! # Capstan
//!
//! A task orchestration engine for tracked capability invocations. Callers
//! send a message naming a capability; the engine creates a [`Task`], runs
//! the registered [`CapabilityHandler`] in the background, and exposes the
//! task through polling ([`TaskEngine::get_task`]), live subscription
//! ([`TaskEngine::subscribe`]) and terminal webhooks.
//!
//! A paused task (`input-required`) is resumed with
//! [`TaskEngine::continue_task`]; a running one is stopped with
//! [`TaskEngine::cancel_task`]. Transport bindings live in the
//! `capstan-axum` crate.
//!
//! ```no_run
//! use capstan::{CapabilityHandler, CapabilityRegistry, HandlerOutcome, TaskEngine};
//! use capstan::{HandlerError, SkillInvocation};
//! use capstan_types::{Message, Part};
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl CapabilityHandler for Greeter {
//!     async fn invoke(
//!         &self,
//!         invocation: &SkillInvocation,
//!         _principal: Option<&str>,
//!     ) -> Result<HandlerOutcome, HandlerError> {
//!         let name = invocation.context.as_deref().unwrap_or("world");
//!         Ok(HandlerOutcome::completed(format!("hello, {name}")))
//!     }
//! }
//!
//! # async fn run() -> Result<(), capstan::EngineError> {
//! let engine = TaskEngine::new(CapabilityRegistry::new().register("greet", Greeter));
//! let _task = engine
//!     .create_task(
//!         Message::requester(vec![Part::text("greet")]),
//!         None,
//!         None,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod errors;
pub mod events;
pub mod invocation;
pub mod registry;
pub mod status;
pub mod store;
pub mod webhook;

pub use engine::{TaskEngine, TaskSubscription};
pub use errors::{EngineError, EngineResult, HandlerError};
pub use events::{TaskEvent, TaskEventBus, TaskEventReceiver};
pub use invocation::{parse_invocation, SkillInvocation};
pub use registry::{CapabilityHandler, CapabilityRegistry, HandlerOutcome, HandlerStatus};
pub use store::{InMemoryTaskStore, TaskStore};
pub use webhook::{HttpWebhookSink, WebhookPayload, WebhookSink};

// Re-exported so binding crates and handler implementations agree on one
// version of the wire types.
pub use capstan_types as types;
pub use capstan_types::Task;
