use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use tower_http::services::ServeDir;

use crate::types::{CaptureOutcome, ScanResult};

/// Read-only snapshot of a finished run, shared by the API handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<RunSnapshot>,
}

struct RunSnapshot {
    scan: ScanResult,
    outcomes: Vec<CaptureOutcome>,
}

/// Serve the finished report directory over HTTP: the HTML report and its
/// screenshots as static files, plus JSON endpoints with the raw run data.
pub async fn serve_report(
    bind: &str,
    output_dir: PathBuf,
    scan: ScanResult,
    outcomes: Vec<CaptureOutcome>,
) -> Result<()> {
    let state = AppState {
        inner: Arc::new(RunSnapshot { scan, outcomes }),
    };

    let api = Router::new()
        .route("/scan", get(get_scan))
        .route("/outcomes", get(get_outcomes))
        .with_state(state);

    let static_svc = ServeDir::new(output_dir);

    let app = Router::new()
        .route("/", get(|| async { Redirect::temporary("/report.html") }))
        .nest("/api", api)
        .fallback_service(static_svc);

    println!("Serving report on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_scan(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.inner.scan.clone())
}

async fn get_outcomes(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.inner.outcomes.clone())
}
