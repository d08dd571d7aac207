//! Minimal task engine server with two demo capabilities.
//!
//! ```bash
//! cargo run --example basic_server
//! curl -s localhost:3000/message/send \
//!   -H 'content-type: application/json' \
//!   -d '{"jsonrpc":"2.0","id":1,"method":"message/send","params":{"message":{
//!         "kind":"message","messageId":"m1","role":"requester",
//!         "timestamp":"2026-01-01T00:00:00Z",
//!         "parts":[{"kind":"data","data":{"skill":"greet","name":"capstan"}}]}}}'
//! ```

use async_trait::async_trait;
use capstan::{
    CapabilityHandler, CapabilityRegistry, HandlerError, HandlerOutcome, SkillInvocation,
    TaskEngine,
};
use capstan_axum::EngineServer;
use serde::Deserialize;
use serde_json::json;

/// Completes immediately.
struct Greet;

#[derive(Deserialize)]
struct GreetParams {
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl CapabilityHandler for Greet {
    async fn invoke(
        &self,
        invocation: &SkillInvocation,
        principal: Option<&str>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let params: GreetParams = invocation
            .parameters_as()
            .map_err(|e| HandlerError::new("invalid_params", e.to_string()))?;
        let name = params
            .name
            .or_else(|| principal.map(str::to_string))
            .unwrap_or_else(|| "world".to_string());

        Ok(HandlerOutcome::completed(format!("hello, {name}"))
            .with_data(json!({"greeted": name})))
    }
}

/// Pauses for input on the first turn.
struct PlanTrip;

#[async_trait]
impl CapabilityHandler for PlanTrip {
    async fn invoke(
        &self,
        invocation: &SkillInvocation,
        _principal: Option<&str>,
    ) -> Result<HandlerOutcome, HandlerError> {
        match invocation.parameters.get("budget") {
            None => Ok(HandlerOutcome::input_required("what is your budget?")),
            Some(budget) => Ok(HandlerOutcome::completed(format!(
                "trip planned within {budget}"
            ))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    capstan_axum::init_tracing();

    let engine = TaskEngine::new(
        CapabilityRegistry::new()
            .register("greet", Greet)
            .register("plan_trip", PlanTrip),
    );

    EngineServer::builder(engine)
        .build()
        .serve("0.0.0.0:3000")
        .await?;
    Ok(())
}
