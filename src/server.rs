use crate::pipeline::SyncPipeline;
use axum::{
    extract::Path,
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Json as AxumJson, Router,
};
use hyper::Server;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub languages: Option<Vec<String>>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "culture-sync",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Blocking sync: responds only once the whole batch has finished
async fn sync_handler(
    Extension(pipeline): Extension<Arc<SyncPipeline>>,
    AxumJson(params): AxumJson<SyncParams>,
) -> impl IntoResponse {
    match pipeline
        .run_sync(
            params.start_date.as_deref(),
            params.end_date.as_deref(),
            params.languages,
        )
        .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            error!("Blocking sync failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Fire-and-forget sync: hands back a run id for status polling
async fn sync_async_handler(
    Extension(pipeline): Extension<Arc<SyncPipeline>>,
    AxumJson(params): AxumJson<SyncParams>,
) -> impl IntoResponse {
    match pipeline
        .run_sync_async(params.start_date, params.end_date)
        .await
    {
        Ok(run_id) => Json(serde_json::json!({ "run_id": run_id })).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn status_handler(
    Extension(pipeline): Extension<Arc<SyncPipeline>>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    match pipeline.get_status(&run_id).await {
        Ok(Some(status)) => Json(status).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("no run {}", run_id)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Create the HTTP server with all routes
pub fn create_server(pipeline: Arc<SyncPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/admin/sync", post(sync_handler))
        .route("/admin/sync/async", post(sync_async_handler))
        .route("/status/:run_id", get(status_handler))
        .layer(Extension(pipeline))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(
    pipeline: Arc<SyncPipeline>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(pipeline);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("🚀 HTTP server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("🔄 Blocking sync:  POST http://localhost:{port}/admin/sync");
    println!("📫 Async sync:     POST http://localhost:{port}/admin/sync/async");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
