use axum::{
    extract::{Extension, State},
    response::Sse,
    routing::post,
    Json, Router,
};
use capstan::{EngineError, TaskEngine, TaskEvent, TaskSubscription};
use capstan_types::{SendParams, Task, TaskIdParams, TaskQueryParams, TaskState};
use futures::stream::Stream;
use std::{convert::Infallible, time::Duration};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};

use crate::{
    auth::PrincipalContext,
    error::{Error, Result},
    json_rpc::{JsonRpcId, JsonRpcRequest, JsonRpcResponse},
};

/// State shared across all routes
#[derive(Clone)]
pub struct ServerState {
    pub engine: TaskEngine,
}

/// Create all protocol routes (JSON-RPC over HTTP, SSE for streams)
pub fn create_routes(state: ServerState) -> Router {
    Router::new()
        .route("/message/send", post(message_send))
        .route("/message/stream", post(message_stream))
        .route("/tasks/get", post(tasks_get))
        .route("/tasks/list", post(tasks_list))
        .route("/tasks/cancel", post(tasks_cancel))
        .route("/tasks/resubscribe", post(tasks_resubscribe))
        .with_state(state)
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T> {
    match params {
        Some(value) => serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string())),
        None => Err(Error::InvalidParams("Missing params".to_string())),
    }
}

/// Routes a send to creation or continuation based on the presence of a
/// `taskId` on the inbound message.
async fn dispatch_send(
    engine: &TaskEngine,
    params: SendParams,
    principal: Option<String>,
) -> Result<Task> {
    let webhook = params.configuration.and_then(|c| c.webhook);
    match params.message.task_id.clone() {
        Some(task_id) => Ok(engine.continue_task(&task_id, params.message).await?),
        None => Ok(engine.create_task(params.message, webhook, principal).await?),
    }
}

/// Handler for message/send
async fn message_send(
    State(state): State<ServerState>,
    Extension(principal): Extension<PrincipalContext>,
    Json(request): Json<JsonRpcRequest>,
) -> Result<Json<JsonRpcResponse>> {
    crate::json_rpc::validate_request(&request)?;
    let params: SendParams = parse_params(request.params)?;

    let task = dispatch_send(&state.engine, params, principal.principal).await?;

    Ok(Json(JsonRpcResponse::success(
        request.id,
        serde_json::to_value(task)?,
    )))
}

/// Handler for message/stream (SSE)
async fn message_stream(
    State(state): State<ServerState>,
    Extension(principal): Extension<PrincipalContext>,
    Json(request): Json<JsonRpcRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<axum::response::sse::Event, Infallible>>>> {
    crate::json_rpc::validate_request(&request)?;
    let params: SendParams = parse_params(request.params)?;

    let task = dispatch_send(&state.engine, params, principal.principal).await?;
    let subscription = state.engine.subscribe(&task.id).await?;

    Ok(sse_from_subscription(request.id, subscription))
}

/// Handler for tasks/get
async fn tasks_get(
    State(state): State<ServerState>,
    Json(request): Json<JsonRpcRequest>,
) -> Result<Json<JsonRpcResponse>> {
    crate::json_rpc::validate_request(&request)?;
    let params: TaskQueryParams = parse_params(request.params)?;

    let mut task = state.engine.get_task(&params.id).await?;
    if let Some(limit) = params.history_length {
        let len = task.messages.len();
        if len > limit {
            task.messages.drain(..len - limit);
        }
    }

    Ok(Json(JsonRpcResponse::success(
        request.id,
        serde_json::to_value(task)?,
    )))
}

/// Handler for tasks/list
async fn tasks_list(
    State(state): State<ServerState>,
    Json(request): Json<JsonRpcRequest>,
) -> Result<Json<JsonRpcResponse>> {
    crate::json_rpc::validate_request(&request)?;

    let tasks = state.engine.list_tasks().await?;
    Ok(Json(JsonRpcResponse::success(
        request.id,
        serde_json::to_value(tasks)?,
    )))
}

/// Handler for tasks/cancel
async fn tasks_cancel(
    State(state): State<ServerState>,
    Json(request): Json<JsonRpcRequest>,
) -> Result<Json<JsonRpcResponse>> {
    crate::json_rpc::validate_request(&request)?;
    let params: TaskIdParams = parse_params(request.params)?;

    // The engine treats a missed cancel as an idempotent no-op; this wire
    // binding still reports why it missed, keeping 404 and 409 apart.
    let task = match state.engine.cancel_task(&params.id).await? {
        Some(task) => task,
        None => {
            let task = state.engine.get_task(&params.id).await?;
            return Err(EngineError::InvalidTaskTransition {
                task_id: params.id,
                from: task.status.state.as_str().to_string(),
                to: TaskState::Canceled.as_str().to_string(),
            }
            .into());
        }
    };
    Ok(Json(JsonRpcResponse::success(
        request.id,
        serde_json::to_value(task)?,
    )))
}

/// Handler for tasks/resubscribe (SSE)
async fn tasks_resubscribe(
    State(state): State<ServerState>,
    Json(request): Json<JsonRpcRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<axum::response::sse::Event, Infallible>>>> {
    crate::json_rpc::validate_request(&request)?;
    let params: TaskIdParams = parse_params(request.params)?;

    let subscription = state.engine.subscribe(&params.id).await?;
    Ok(sse_from_subscription(request.id, subscription))
}

/// Turns a task subscription into an SSE stream of JSON-RPC-framed events:
/// the snapshot first, then live events until the final one, after which the
/// stream closes.
fn sse_from_subscription(
    request_id: Option<JsonRpcId>,
    subscription: TaskSubscription,
) -> Sse<impl Stream<Item = std::result::Result<axum::response::sse::Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

    let snapshot = TaskEvent::StatusUpdate(subscription.snapshot);
    let _ = tx.send(frame_event(&request_id, &snapshot));

    if let Some(mut receiver) = subscription.receiver {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let is_final = event.is_final();
                if tx.send(frame_event(&request_id, &event)).is_err() {
                    break;
                }
                if is_final {
                    break;
                }
            }
        });
    }

    let sse_stream = UnboundedReceiverStream::new(rx).map(|response| {
        Ok::<_, Infallible>(
            axum::response::sse::Event::default()
                .data(serde_json::to_string(&response).unwrap_or_default()),
        )
    });

    Sse::new(sse_stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

fn frame_event(request_id: &Option<JsonRpcId>, event: &TaskEvent) -> JsonRpcResponse {
    JsonRpcResponse::success(
        request_id.clone(),
        serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
    )
}
