use std::path::PathBuf;

use axum::{
    Router,
    extract::{Path as UrlPath, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use eyre::Result;
use tokio::{fs, net::TcpListener};
use tracing::debug;

#[derive(Clone)]
struct FigState {
    figs_dir: PathBuf,
}

/// Serves the rendered figures: an index page linking every HTML figure plus
/// the figure files themselves.
pub async fn serve_figs(figs_dir: PathBuf, addr: String) -> Result<()> {
    let app = Router::new()
        .route("/", get(index))
        .route("/figs/{benchmark}/{file}", get(figure))
        .with_state(FigState { figs_dir });
    let listener = TcpListener::bind(&addr).await?;
    debug!("Serving figures on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(state): State<FigState>) -> Response {
    let mut items = Vec::new();
    if let Ok(mut benchmarks) = fs::read_dir(&state.figs_dir).await {
        while let Ok(Some(bench)) = benchmarks.next_entry().await {
            let is_dir = bench.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let name = bench.file_name().to_string_lossy().into_owned();
            if let Ok(mut files) = fs::read_dir(bench.path()).await {
                while let Ok(Some(file)) = files.next_entry().await {
                    let fname = file.file_name().to_string_lossy().into_owned();
                    if fname.ends_with(".html") {
                        items.push(format!(
                            "<li><a href=\"/figs/{name}/{fname}\">{name}/{fname}</a></li>"
                        ));
                    }
                }
            }
        }
    }
    items.sort();
    Html(format!(
        "<!DOCTYPE html><html><body><h1>Figures</h1><ul>{}</ul></body></html>",
        items.join("\n")
    ))
    .into_response()
}

async fn figure(
    State(state): State<FigState>,
    UrlPath((benchmark, file)): UrlPath<(String, String)>,
) -> Response {
    if has_traversal(&benchmark) || has_traversal(&file) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = state.figs_dir.join(&benchmark).join(&file);
    match fs::read(&path).await {
        Ok(bytes) => {
            let mime = match path.extension().and_then(|e| e.to_str()) {
                Some("html") => "text/html; charset=utf-8",
                Some("csv") => "text/csv",
                Some("json") => "application/json",
                _ => "application/octet-stream",
            };
            ([(CONTENT_TYPE, mime)], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn has_traversal(component: &str) -> bool {
    component.contains("..") || component.contains('/') || component.contains('\\')
}
