//! HTTP Surface
//!
//! `GET /` and `GET /index.<name>` render documents; `/favicon.ico` and
//! `/static/...` are served byte-for-byte; everything else is 404. Rendering
//! runs on the blocking pool under the configured request timeout.

use axum::extract::{Path as AxumPath, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::service::{PageService, RenderedPage, ServiceError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Server failed: {0}")]
    Serve(#[source] io::Error),
}

pub fn router(service: Arc<PageService>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/favicon.ico", get(favicon))
        .route("/static/{*path}", get(static_asset))
        .route("/{page}", get(named_page))
        .fallback(not_found)
        .with_state(service)
}

pub async fn serve(service: Arc<PageService>) -> Result<(), ServerError> {
    let addr = format!("0.0.0.0:{}", service.config().port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(
        url = %format!("http://localhost:{}", service.config().port),
        design_mode = service.config().design_mode,
        "server starting"
    );
    axum::serve(listener, router(service))
        .await
        .map_err(ServerError::Serve)
}

async fn index(State(service): State<Arc<PageService>>, headers: HeaderMap) -> Response {
    render_page(service, None, &headers).await
}

async fn named_page(
    State(service): State<Arc<PageService>>,
    AxumPath(page): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    match page.strip_prefix("index.") {
        Some(name) => render_page(service, Some(name.to_string()), &headers).await,
        None => not_found().await,
    }
}

async fn render_page(service: Arc<PageService>, name: Option<String>, headers: &HeaderMap) -> Response {
    let timeout = service.config().request_timeout;
    let page = match render_blocking(timeout, move || service.render_named(name.as_deref())).await {
        Ok(page) => page,
        Err(response) => return response,
    };

    let fresh = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == page.etag);
    if fresh {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, page.etag)]).into_response();
    }
    (StatusCode::OK, [(header::ETAG, page.etag)], Html(page.html)).into_response()
}

/// Run `render` on the blocking pool under `timeout`. Failures come back as
/// finished error responses.
async fn render_blocking<F>(timeout: Duration, render: F) -> Result<RenderedPage, Response>
where
    F: FnOnce() -> Result<RenderedPage, ServiceError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(render);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(page))) => Ok(page),
        Ok(Ok(Err(e))) => {
            if e.is_not_found() {
                tracing::debug!(error = %e, "page not found");
                return Err((StatusCode::NOT_FOUND, e.public_message()).into_response());
            }
            tracing::error!(error = %e, "page failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.public_message()).into_response())
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "render task failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "render failed").into_response())
        }
        Err(_) => {
            tracing::error!(timeout_ms = timeout.as_millis() as u64, "render timed out");
            Err((StatusCode::GATEWAY_TIMEOUT, "render timed out").into_response())
        }
    }
}

async fn favicon(State(service): State<Arc<PageService>>) -> Response {
    serve_static(&service.config().static_dir.join("favicon.ico")).await
}

async fn static_asset(
    State(service): State<Arc<PageService>>,
    AxumPath(path): AxumPath<String>,
) -> Response {
    match sanitize_rel_path(&path) {
        Some(rel) => serve_static(&service.config().static_dir.join(rel)).await,
        None => (StatusCode::BAD_REQUEST, "invalid path").into_response(),
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

fn sanitize_rel_path(path: &str) -> Option<PathBuf> {
    let rel = PathBuf::from(path.trim_start_matches('/'));
    if rel.as_os_str().is_empty() {
        return None;
    }
    for comp in rel.components() {
        if !matches!(comp, Component::Normal(_)) {
            return None;
        }
    }
    Some(rel)
}

async fn serve_static(path: &Path) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return not_found().await,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read static file");
            return (StatusCode::INTERNAL_SERVER_ERROR, "could not read file").into_response();
        }
    };

    let content_type = match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
    {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    };

    let mut response = bytes.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(root: &TempDir) -> Router {
        router(Arc::new(PageService::new(ServerConfig::rooted(root.path()))))
    }

    async fn get_path(app: Router, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    #[tokio::test]
    async fn test_index_renders_default_document() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("index.json"), r#"{"main": {"h1": "Home"}}"#).unwrap();
        let (status, headers, body) = get_path(app(&root), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(header::ETAG).is_some());
        assert!(String::from_utf8(body).unwrap().contains("<h1>Home</h1>"));
    }

    #[tokio::test]
    async fn test_named_document() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("index.about.json"), r#"{"main": {"p": "About"}}"#).unwrap();
        let (status, _, body) = get_path(app(&root), "/index.about").await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("<p>About</p>"));
    }

    #[tokio::test]
    async fn test_unknown_paths_are_not_found() {
        let root = TempDir::new().unwrap();
        for uri in ["/about", "/index.missing", "/a/b", "/static/nope.css"] {
            let (status, _, _) = get_path(app(&root), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_malformed_document_is_sanitized() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("index.json"), "{ nope").unwrap();
        let (status, _, body) = get_path(app(&root), "/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"could not parse document");
    }

    #[tokio::test]
    async fn test_if_none_match_returns_not_modified() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("index.json"), r#"{"main": {"p": "x"}}"#).unwrap();
        let (_, headers, _) = get_path(app(&root), "/").await;
        let etag = headers.get(header::ETAG).unwrap().clone();

        let response = app(&root)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::IF_NONE_MATCH, etag)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_static_files_byte_for_byte() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("static").join("css")).unwrap();
        fs::write(root.path().join("static").join("css").join("site.css"), "p{}").unwrap();
        fs::write(root.path().join("static").join("favicon.ico"), [0u8, 1, 2]).unwrap();

        let (status, headers, body) = get_path(app(&root), "/static/css/site.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/css; charset=utf-8");
        assert_eq!(body, b"p{}");

        let (status, _, body) = get_path(app(&root), "/favicon.ico").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, vec![0u8, 1, 2]);
    }

    #[tokio::test]
    async fn test_slow_render_times_out() {
        let slow = || -> Result<RenderedPage, ServiceError> {
            std::thread::sleep(Duration::from_millis(300));
            Err(ServiceError::InvalidName("slow".into()))
        };
        let response = render_blocking(Duration::from_millis(20), slow).await.unwrap_err();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"render timed out");

        // The runtime keeps serving after an expired request
        let page = RenderedPage {
            html: "<p>ok</p>".into(),
            etag: "\"x\"".into(),
            design: None,
        };
        let fast = move || -> Result<RenderedPage, ServiceError> { Ok(page) };
        let served = render_blocking(Duration::from_secs(5), fast).await.unwrap();
        assert_eq!(served.html, "<p>ok</p>");
    }

    #[test]
    fn test_sanitize_rel_path() {
        assert_eq!(sanitize_rel_path("css/a.css"), Some(PathBuf::from("css/a.css")));
        assert_eq!(sanitize_rel_path("../etc/passwd"), None);
        assert_eq!(sanitize_rel_path("a/../../b"), None);
        assert_eq!(sanitize_rel_path(""), None);
    }
}
