//! HTTP server implementation using Axum.
//!
//! Every route answers with a complete JSON record. Execution outcomes,
//! including timeouts and refused paths, are `200` with `success:false`;
//! only an undecodable body or a crashed handler produces a `500`, and even
//! then the body has the route's usual shape.

use crate::deadline::{Deadline, SHELL_TIMEOUT_CEILING, SNIPPET_TIMEOUT_CEILING};
use crate::error::{ApiError, FailureRecord, StartupError};
use crate::files::{self, ReadFileRequest, WriteFileRequest};
use crate::shell::ShellRequest;
use crate::snippet::SnippetRequest;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health).post(health).fallback(not_found))
        .route("/execute", post(execute).fallback(not_found))
        .route("/bash", post(bash).fallback(not_found))
        .route("/read-file", post(read_file).fallback(not_found))
        .route("/write-file", post(write_file).fallback(not_found))
        .fallback(not_found)
        // No body cap: an over-limit rejection would be plain text, not a record.
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until SIGINT or SIGTERM.
pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<(), StartupError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    serve(listener, state, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), StartupError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Starting HTTP server on {}", addr);
    }
    info!("Workspace: {}", state.workspace.root().display());

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(StartupError::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn execute(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch("/execute", body, move |req: SnippetRequest| async move {
        let _slot = state.admit().await?;
        let deadline = Deadline::clamp(req.timeout, SNIPPET_TIMEOUT_CEILING);
        Ok(state.snippets.run(&req.code, deadline).await)
    })
    .await
}

async fn bash(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch("/bash", body, move |req: ShellRequest| async move {
        let _slot = state.admit().await?;
        let deadline = Deadline::clamp(req.timeout, SHELL_TIMEOUT_CEILING);
        Ok(state.shell.run(&req.command, deadline).await)
    })
    .await
}

async fn read_file(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch("/read-file", body, move |req: ReadFileRequest| async move {
        let workspace = state.workspace.clone();
        tokio::task::spawn_blocking(move || files::read_file(&workspace, &req.path))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))
    })
    .await
}

async fn write_file(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch("/write-file", body, move |req: WriteFileRequest| async move {
        let workspace = state.workspace.clone();
        tokio::task::spawn_blocking(move || files::write_file(&workspace, &req.path, &req.content))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))
    })
    .await
}

/// Decode the body, run the handler on its own task, and turn anything that
/// went wrong on the way into the route's failure record with a `500`.
async fn dispatch<Req, Res, F, Fut>(route: &'static str, body: Bytes, handler: F) -> Response
where
    Req: DeserializeOwned,
    Res: Serialize + FailureRecord + Send + 'static,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = Result<Res, ApiError>> + Send + 'static,
{
    let outcome = match serde_json::from_slice::<Req>(&body) {
        Ok(request) => match tokio::spawn(handler(request)).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(ApiError::Internal(panic_message(e.into_panic()))),
            Err(e) => Err(ApiError::Internal(e.to_string())),
        },
        Err(e) => Err(ApiError::from(e)),
    };

    match outcome {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            error!(route, error = %e, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Res::failure(e.to_string()))).into_response()
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
