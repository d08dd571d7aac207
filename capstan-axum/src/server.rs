use axum::{middleware, response::IntoResponse, Router};
use capstan::TaskEngine;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth::{HeaderPrincipalExtractor, PrincipalExtractor},
    routes::{create_routes, ServerState},
};

/// HTTP server exposing a [`TaskEngine`] over the JSON-RPC/SSE protocol.
pub struct EngineServer {
    engine: TaskEngine,
    principal_extractor: Arc<dyn PrincipalExtractor>,
}

impl EngineServer {
    /// Create a new server builder
    pub fn builder(engine: TaskEngine) -> EngineServerBuilder {
        EngineServerBuilder::new(engine)
    }

    fn display_server_info(&self, local_addr: &std::net::SocketAddr) {
        tracing::info!("Task engine listening at http://{}", local_addr);
        let names = self.engine.registry().names();
        if names.is_empty() {
            tracing::warn!("no capabilities registered, every task will fail");
        } else {
            tracing::info!("{} capabilities registered", names.len());
            for name in names {
                tracing::info!("  - {}", name);
            }
        }
    }

    /// Convert the server into an Axum router
    pub fn into_router(self) -> Router {
        let state = ServerState {
            engine: self.engine.clone(),
        };

        let principal_extractor = self.principal_extractor.clone();

        create_routes(state)
            .layer(middleware::from_fn(
                move |req: axum::extract::Request, next: middleware::Next| {
                    let extractor = principal_extractor.clone();
                    async move {
                        let (mut parts, body) = req.into_parts();
                        match extractor.extract(&mut parts).await {
                            Ok(principal) => {
                                parts.extensions.insert(principal);
                                let req = axum::extract::Request::from_parts(parts, body);
                                Ok(next.run(req).await)
                            }
                            Err(e) => Err(e.into_response()),
                        }
                    }
                },
            ))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Run the server on the specified address
    pub async fn serve(self, addr: impl tokio::net::ToSocketAddrs) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        self.display_server_info(&local_addr);

        let app = self.into_router();
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Builder for configuring an [`EngineServer`]
pub struct EngineServerBuilder {
    engine: TaskEngine,
    principal_extractor: Option<Arc<dyn PrincipalExtractor>>,
}

impl EngineServerBuilder {
    fn new(engine: TaskEngine) -> Self {
        Self {
            engine,
            principal_extractor: None,
        }
    }

    /// Set the principal extractor
    pub fn with_principal_extractor<E: PrincipalExtractor>(mut self, extractor: E) -> Self {
        self.principal_extractor = Some(Arc::new(extractor));
        self
    }

    /// Build the server. Without an explicit extractor, the development
    /// default reads the `X-Principal-Id` header.
    pub fn build(self) -> EngineServer {
        let principal_extractor = self
            .principal_extractor
            .unwrap_or_else(|| Arc::new(HeaderPrincipalExtractor));

        EngineServer {
            engine: self.engine,
            principal_extractor,
        }
    }
}

/// Installs a `tracing` subscriber reading its filter from `RUST_LOG`,
/// defaulting to `info` for binaries that never set one.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
