use async_trait::async_trait;
use axum::{
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use std::fmt::Debug;

/// Identity of the caller, attached to every task the request creates.
#[derive(Debug, Clone, Default)]
pub struct PrincipalContext {
    /// The requesting principal, when the request carries one.
    pub principal: Option<String>,
}

/// Trait for deriving the principal from HTTP requests.
///
/// Implementers typically read an Authorization header, an API key, or a
/// session cookie and resolve it to a stable principal identifier.
#[async_trait]
pub trait PrincipalExtractor: Send + Sync + 'static {
    async fn extract(&self, parts: &mut Parts) -> Result<PrincipalContext, AuthError>;
}

/// Authentication error that can be converted to an HTTP response
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingCredentials,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Authentication failed: {0}")]
    Failed(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingCredentials => (StatusCode::UNAUTHORIZED, "Missing credentials"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::Failed(ref msg) => (StatusCode::UNAUTHORIZED, msg.as_str()),
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Default extractor for development: reads the `X-Principal-Id` header and
/// treats an absent header as an anonymous caller.
pub struct HeaderPrincipalExtractor;

#[async_trait]
impl PrincipalExtractor for HeaderPrincipalExtractor {
    async fn extract(&self, parts: &mut Parts) -> Result<PrincipalContext, AuthError> {
        let principal = parts
            .headers
            .get("x-principal-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(PrincipalContext { principal })
    }
}
