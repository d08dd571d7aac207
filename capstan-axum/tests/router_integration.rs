//! End-to-end tests of the JSON-RPC routes against an in-process engine.
//!
//! Requests go through the full router (principal middleware included) via
//! `tower::ServiceExt::oneshot`, so no sockets are involved.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use capstan::{
    CapabilityHandler, CapabilityRegistry, HandlerError, HandlerOutcome, SkillInvocation,
    TaskEngine,
};
use capstan_axum::EngineServer;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

struct EchoHandler;

#[async_trait]
impl CapabilityHandler for EchoHandler {
    async fn invoke(
        &self,
        invocation: &SkillInvocation,
        principal: Option<&str>,
    ) -> Result<HandlerOutcome, HandlerError> {
        Ok(HandlerOutcome::completed("echoed").with_data(json!({
            "echo": invocation.parameters,
            "principal": principal,
        })))
    }
}

struct BudgetHandler;

#[async_trait]
impl CapabilityHandler for BudgetHandler {
    async fn invoke(
        &self,
        invocation: &SkillInvocation,
        _principal: Option<&str>,
    ) -> Result<HandlerOutcome, HandlerError> {
        if invocation.parameters.contains_key("budget") {
            Ok(HandlerOutcome::completed("plan ready"))
        } else {
            Ok(HandlerOutcome::input_required("what is your budget?"))
        }
    }
}

fn test_router() -> Router {
    let engine = TaskEngine::new(
        CapabilityRegistry::new()
            .register("echo", EchoHandler)
            .register("plan_trip", BudgetHandler),
    );
    EngineServer::builder(engine).build().into_router()
}

async fn rpc(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    rpc_with_headers(router, path, body, &[]).await
}

async fn rpc_with_headers(
    router: &Router,
    path: &str,
    body: Value,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let request = request.body(Body::from(body.to_string())).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn send_body(parts: Value, task_id: Option<&str>) -> Value {
    let mut message = json!({
        "kind": "message",
        "messageId": "m1",
        "role": "requester",
        "parts": parts,
        "timestamp": "2026-01-01T00:00:00Z",
    });
    if let Some(task_id) = task_id {
        message["taskId"] = json!(task_id);
    }
    json!({
        "jsonrpc": "2.0",
        "method": "message/send",
        "params": {"message": message},
        "id": 1
    })
}

async fn wait_for_state(router: &Router, task_id: &str, state: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = rpc(
            router,
            "/tasks/get",
            json!({"jsonrpc": "2.0", "method": "tasks/get", "params": {"id": task_id}, "id": 2}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        if body["result"]["status"]["state"] == state {
            return body["result"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never reached {state}");
}

#[tokio::test]
async fn send_creates_task_and_get_observes_completion() {
    let router = test_router();

    let (status, body) = rpc(
        &router,
        "/message/send",
        send_body(json!([{"kind": "data", "data": {"skill": "echo", "x": 1}}]), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["id"], 1);
    let task = &body["result"];
    assert_eq!(task["kind"], "task");
    assert_eq!(task["status"]["state"], "working");
    assert_eq!(task["metadata"]["capability"], "echo");

    let task_id = task["id"].as_str().unwrap();
    let done = wait_for_state(&router, task_id, "completed").await;
    assert_eq!(done["status"]["progress"], 100);
    assert_eq!(done["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn principal_header_reaches_the_handler() {
    let router = test_router();

    let (status, body) = rpc_with_headers(
        &router,
        "/message/send",
        send_body(json!([{"kind": "data", "data": {"skill": "echo"}}]), None),
        &[("x-principal-id", "buyer-42")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let task_id = body["result"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["result"]["metadata"]["principal"], "buyer-42");

    let done = wait_for_state(&router, &task_id, "completed").await;
    let reply = &done["messages"].as_array().unwrap()[1];
    assert_eq!(reply["parts"][1]["data"]["principal"], "buyer-42");
}

#[tokio::test]
async fn send_with_task_id_continues_a_paused_task() {
    let router = test_router();

    let (_, body) = rpc(
        &router,
        "/message/send",
        send_body(json!([{"kind": "data", "data": {"skill": "plan_trip"}}]), None),
    )
    .await;
    let task_id = body["result"]["id"].as_str().unwrap().to_string();
    wait_for_state(&router, &task_id, "input-required").await;

    let (status, body) = rpc(
        &router,
        "/message/send",
        send_body(
            json!([{"kind": "data", "data": {"budget": 2000}}]),
            Some(&task_id),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["status"]["state"], "working");

    let done = wait_for_state(&router, &task_id, "completed").await;
    assert_eq!(done["status"]["message"], "plan ready");
}

#[tokio::test]
async fn continuing_a_finished_task_conflicts() {
    let router = test_router();

    let (_, body) = rpc(
        &router,
        "/message/send",
        send_body(json!([{"kind": "data", "data": {"skill": "echo"}}]), None),
    )
    .await;
    let task_id = body["result"]["id"].as_str().unwrap().to_string();
    wait_for_state(&router, &task_id, "completed").await;

    let (status, body) = rpc(
        &router,
        "/message/send",
        send_body(json!([{"kind": "text", "text": "more"}]), Some(&task_id)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], -32002);
}

#[tokio::test]
async fn cancel_stops_a_running_task_and_rejects_unknown_ids() {
    let router = test_router();

    let (_, body) = rpc(
        &router,
        "/message/send",
        send_body(json!([{"kind": "data", "data": {"skill": "plan_trip"}}]), None),
    )
    .await;
    let task_id = body["result"]["id"].as_str().unwrap().to_string();
    wait_for_state(&router, &task_id, "input-required").await;

    let (status, body) = rpc(
        &router,
        "/tasks/cancel",
        json!({"jsonrpc": "2.0", "method": "tasks/cancel", "params": {"id": &task_id}, "id": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["status"]["state"], "canceled");

    // canceling again conflicts on the wire even though the engine treats
    // it as a no-op
    let (status, body) = rpc(
        &router,
        "/tasks/cancel",
        json!({"jsonrpc": "2.0", "method": "tasks/cancel", "params": {"id": &task_id}, "id": 4}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], -32002);

    let (status, body) = rpc(
        &router,
        "/tasks/cancel",
        json!({"jsonrpc": "2.0", "method": "tasks/cancel", "params": {"id": "missing"}, "id": 4}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], -32001);
}

#[tokio::test]
async fn get_truncates_history_when_asked() {
    let router = test_router();

    let (_, body) = rpc(
        &router,
        "/message/send",
        send_body(json!([{"kind": "data", "data": {"skill": "echo"}}]), None),
    )
    .await;
    let task_id = body["result"]["id"].as_str().unwrap().to_string();
    wait_for_state(&router, &task_id, "completed").await;

    let (status, body) = rpc(
        &router,
        "/tasks/get",
        json!({
            "jsonrpc": "2.0",
            "method": "tasks/get",
            "params": {"id": task_id, "historyLength": 1},
            "id": 5
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["result"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    // only the most recent turn survives
    assert_eq!(messages[0]["role"], "engine");
}

#[tokio::test]
async fn list_returns_all_tasks() {
    let router = test_router();

    for _ in 0..2 {
        rpc(
            &router,
            "/message/send",
            send_body(json!([{"kind": "data", "data": {"skill": "echo"}}]), None),
        )
        .await;
    }

    let (status, body) = rpc(
        &router,
        "/tasks/list",
        json!({"jsonrpc": "2.0", "method": "tasks/list", "id": 6}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let router = test_router();

    // wrong JSON-RPC version
    let (status, body) = rpc(
        &router,
        "/tasks/get",
        json!({"jsonrpc": "1.0", "method": "tasks/get", "params": {"id": "x"}, "id": 7}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32600);

    // missing params
    let (status, body) = rpc(
        &router,
        "/tasks/get",
        json!({"jsonrpc": "2.0", "method": "tasks/get", "id": 8}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32602);

    // message with no parts never creates a task
    let (status, body) = rpc(&router, "/message/send", send_body(json!([]), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn resubscribe_to_finished_task_streams_final_snapshot_and_closes() {
    let router = test_router();

    let (_, body) = rpc(
        &router,
        "/message/send",
        send_body(json!([{"kind": "data", "data": {"skill": "echo"}}]), None),
    )
    .await;
    let task_id = body["result"]["id"].as_str().unwrap().to_string();
    wait_for_state(&router, &task_id, "completed").await;

    let request = Request::builder()
        .method("POST")
        .uri("/tasks/resubscribe")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "jsonrpc": "2.0",
                "method": "tasks/resubscribe",
                "params": {"id": task_id},
                "id": 9
            })
            .to_string(),
        ))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    // the subscription is already final, so the body terminates
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body_text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body_text.contains("status-update"), "got: {body_text}");
    assert!(body_text.contains("\"final\":true"), "got: {body_text}");
    assert!(body_text.contains("\"state\":\"completed\""), "got: {body_text}");
}
