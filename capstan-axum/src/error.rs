use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use capstan::EngineError;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid JSON-RPC request: {0}")]
    InvalidRequest(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl Error {
    /// HTTP status and JSON-RPC error code for this error.
    fn codes(&self) -> (StatusCode, i32) {
        match self {
            Error::Engine(engine) => match engine {
                EngineError::Validation { .. } => (StatusCode::BAD_REQUEST, -32602),
                EngineError::TaskNotFound { .. } => (StatusCode::NOT_FOUND, -32001),
                // a task that cannot be continued or canceled anymore
                EngineError::InvalidTaskTransition { .. } => (StatusCode::CONFLICT, -32002),
                EngineError::CapabilityNotFound { .. } => (StatusCode::NOT_IMPLEMENTED, -32004),
                EngineError::Handler(_)
                | EngineError::Serialization { .. }
                | EngineError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, -32603),
            },
            Error::Json(_) => (StatusCode::BAD_REQUEST, -32700),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, -32600),
            Error::InvalidParams(_) => (StatusCode::BAD_REQUEST, -32602),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = self.codes();
        let message = match &self {
            Error::Json(_) => "Parse error".to_string(),
            Error::Engine(engine) => engine.to_string(),
            Error::InvalidRequest(msg) | Error::InvalidParams(msg) => msg.clone(),
        };

        let body = json!({
            "jsonrpc": "2.0",
            "error": {
                "code": error_code,
                "message": message,
            },
            "id": null
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_protocol_codes() {
        let cases = [
            (
                Error::Engine(EngineError::validation("parts", "empty")),
                StatusCode::BAD_REQUEST,
                -32602,
            ),
            (
                Error::Engine(EngineError::TaskNotFound {
                    task_id: "t1".into(),
                }),
                StatusCode::NOT_FOUND,
                -32001,
            ),
            (
                Error::Engine(EngineError::InvalidTaskTransition {
                    task_id: "t1".into(),
                    from: "completed".into(),
                    to: "canceled".into(),
                }),
                StatusCode::CONFLICT,
                -32002,
            ),
            (
                Error::Engine(EngineError::CapabilityNotFound {
                    capability: "x".into(),
                }),
                StatusCode::NOT_IMPLEMENTED,
                -32004,
            ),
            (
                Error::InvalidRequest("bad version".into()),
                StatusCode::BAD_REQUEST,
                -32600,
            ),
        ];

        for (error, expected_status, expected_code) in cases {
            let (status, code) = error.codes();
            assert_eq!(status, expected_status);
            assert_eq!(code, expected_code);
        }
    }
}
