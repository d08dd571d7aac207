//! Axum binding for the capstan task engine.
//!
//! Exposes the engine as JSON-RPC 2.0 over HTTP POST with Server-Sent Events
//! for `message/stream` and `tasks/resubscribe`. Build a
//! [`TaskEngine`](capstan::TaskEngine), hand it to [`EngineServer::builder`],
//! and `serve` it:
//!
//! ```no_run
//! use capstan::{CapabilityRegistry, TaskEngine};
//! use capstan_axum::EngineServer;
//!
//! # async fn run() -> Result<(), std::io::Error> {
//! capstan_axum::init_tracing();
//! let engine = TaskEngine::new(CapabilityRegistry::new());
//! EngineServer::builder(engine).build().serve("0.0.0.0:3000").await
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod json_rpc;
pub mod routes;
pub mod server;

pub use auth::{HeaderPrincipalExtractor, PrincipalContext, PrincipalExtractor};
pub use error::{Error, Result};
pub use json_rpc::{JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
pub use server::{init_tracing, EngineServer, EngineServerBuilder};
