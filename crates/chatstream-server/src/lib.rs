//! WebSocket session server for real-time streaming chat
//!
//! This crate implements the chatstream session protocol: one persistent
//! WebSocket channel per chat session, a strict one-turn-at-a-time exchange,
//! and incremental delivery of assistant replies as they are produced. The
//! design keeps the model integration behind a small trait so the session
//! engine, the part that governs ordering, turn state, and failure recovery,
//! stays independent of any particular inference backend.

pub mod connection;
pub mod error;
pub mod registry;
pub mod source;

mod turn;

pub use connection::ConnectionHandle;
pub use error::{Result, ServerError};
pub use registry::{Session, SessionHandle, SessionRegistry, TurnState};
pub use source::{sources, EchoSource, SourceError, TokenSource, TokenStream};

// Re-export commonly used types from chatstream-protocol
pub use chatstream_protocol::{ChatMessage, ClientFrame, Frame, FrameKind, Role};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::{middleware, Router};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Configuration for the chatstream server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Enable request logging
    pub enable_logging: bool,
    /// How long to wait for the next reply fragment before failing the turn
    pub stream_timeout: Duration,
    /// Status text sent to every client on connect
    pub greeting: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".parse().expect("default bind address"),
            enable_cors: true,
            cors_origins: None, // Allow any origin
            enable_logging: true,
            stream_timeout: Duration::from_secs(30),
            greeting: "Connected to AI. Ask me anything!".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address: {}", e)))?;
        Ok(self)
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Set allowed CORS origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Enable or disable request logging.
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    /// Set the per-fragment stream timeout.
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Set the connect greeting.
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }
}

/// Shared application state: the token source, live sessions, configuration.
#[derive(Clone)]
pub struct AppState<S: TokenSource> {
    pub source: S,
    pub registry: SessionRegistry,
    pub config: ServerConfig,
}

/// Handler for the /sessions GET endpoint.
async fn sessions_handler<S: TokenSource>(
    State(state): State<AppState<S>>,
) -> Json<serde_json::Value> {
    let mut sessions = Vec::new();
    for id in state.registry.session_ids().await {
        if let Some(session) = state.registry.get(&id).await {
            let session = session.lock().await;
            sessions.push(json!({
                "session_id": session.id(),
                "message_count": session.history().len(),
                "streaming": session.turn_state() == TurnState::AwaitingCompletion,
            }));
        }
    }

    Json(json!({
        "sessions": sessions,
        "count": sessions.len(),
        "timestamp": chrono::Utc::now(),
    }))
}

/// Handler for the /sessions/{session_id} GET endpoint.
async fn session_history_handler<S: TokenSource>(
    Path(session_id): Path<String>,
    State(state): State<AppState<S>>,
) -> std::result::Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let session = state.registry.get(&session_id).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Session not found",
                "session_id": session_id,
                "timestamp": chrono::Utc::now(),
            })),
        )
    })?;

    let session = session.lock().await;
    Ok(Json(json!({
        "session_id": session.id(),
        "messages": session.history(),
        "timestamp": chrono::Utc::now(),
    })))
}

/// The main chatstream server.
pub struct ChatServer<S: TokenSource> {
    source: S,
    registry: SessionRegistry,
    config: ServerConfig,
}

impl<S: TokenSource> ChatServer<S> {
    /// Create a new server with the given token source and default configuration.
    pub fn new(source: S) -> Self {
        Self {
            source,
            registry: SessionRegistry::new(),
            config: ServerConfig::default(),
        }
    }

    /// Create a new server with custom configuration.
    pub fn with_config(source: S, config: ServerConfig) -> Self {
        Self {
            source,
            registry: SessionRegistry::new(),
            config,
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the live session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            source: self.source.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route(
                "/health",
                get(|| async {
                    Json(HealthResponse {
                        status: "healthy".to_string(),
                        timestamp: chrono::Utc::now(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    })
                }),
            )
            .route("/sessions", get(sessions_handler::<S>))
            .route("/sessions/{session_id}", get(session_history_handler::<S>))
            // Main chat endpoint
            .route("/ws/{session_id}", get(connection::ws_handler::<S>))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    log::info!("Request {} {} {}", request_id, method, uri);

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    log::info!("Response {} completed in {:?}", request_id, duration);

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = if let Some(ref origins) = self.config.cors_origins {
                let origins: std::result::Result<Vec<_>, _> =
                    origins.iter().map(|s| s.parse()).collect();
                match origins {
                    Ok(origins) => CorsLayer::new()
                        .allow_origin(origins)
                        .allow_methods(Any)
                        .allow_headers(Any),
                    Err(_) => CorsLayer::permissive(),
                }
            } else {
                CorsLayer::permissive()
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Start the server and listen for connections.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("chatstream server starting on {}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Sessions: http://{}/sessions", self.config.bind_addr);
        log::info!(
            "Chat endpoint: ws://{}/ws/{{session_id}}",
            self.config.bind_addr
        );

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server will shut down when the provided shutdown signal is received.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "chatstream server starting on {} with graceful shutdown",
            self.config.bind_addr
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("chatstream server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
