// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Resource Router: maps an incoming request onto a static resource, an
//! IIIF image/info endpoint, or a Deep Zoom descriptor/tile endpoint, and
//! enforces the method-set / redirect / 404 rules shared by all of them.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Router, extract::Request};

use isrv_core::{ApiVersion, MetaIdentifier};
use isrv_error::{ErrorCode, ServerError};
use isrv_uri::{deepzoom, iiif};

use crate::errors::AppError;
use crate::handlers::{self, ImageRequestParams, QueryParams};
use crate::middleware;
use crate::state::AppState;

/// Build the full Axum [`Router`] for the image server.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(landing))
        .route("/health", any(health))
        .route("/status", any(status))
        .route("/configuration", any(configuration))
        .route("/tasks", any(tasks))
        .route("/tasks/{id}", any(tasks))
        .route("/static/{*path}", get(static_file))
        .fallback(dispatch)
        .layer(axum::middleware::from_fn(middleware::common_headers_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn(middleware::RequestLogger::layer))
        .layer(middleware::cors_layer())
        .with_state(state)
}

fn allow_header(methods: &[&str]) -> HeaderValue {
    HeaderValue::from_str(&methods.join(", ")).unwrap_or_else(|_| HeaderValue::from_static("GET"))
}

/// Dispatch a request to `body` if `method` is `GET`, a 204 with `Allow` if
/// it's `OPTIONS`, and a 405 with `Allow` otherwise. Every static resource
/// in this server accepts exactly `GET` and `OPTIONS`.
fn gate_get_only(method: &Method, body: impl FnOnce() -> Response) -> Response {
    const ALLOWED: &[&str] = &["GET", "OPTIONS"];
    match *method {
        Method::GET => body(),
        Method::OPTIONS => {
            let mut resp = StatusCode::NO_CONTENT.into_response();
            resp.headers_mut().insert(header::ALLOW, allow_header(ALLOWED));
            resp
        }
        _ => {
            let mut resp = StatusCode::METHOD_NOT_ALLOWED.into_response();
            resp.headers_mut().insert(header::ALLOW, allow_header(ALLOWED));
            resp
        }
    }
}

async fn landing(method: Method) -> Response {
    gate_get_only(&method, || {
        (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "isrv image server\n",
        )
            .into_response()
    })
}

async fn health() -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({"status": "ok"}).to_string(),
    )
        .into_response()
}

async fn status(State(state): State<AppState>) -> Response {
    let in_flight = state.coordinator.in_flight_count().await;
    (
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({"status": "ok", "builds_in_flight": in_flight}).to_string(),
    )
        .into_response()
}

async fn configuration(State(state): State<AppState>) -> Response {
    let summary = serde_json::json!({
        "endpoints": state.config.endpoints,
        "cache": {
            "variant_cache_enabled": state.config.variant_cache.enabled,
            "info_cache_enabled": state.config.info_cache.enabled,
            "resolve_first": state.config.cache.resolve_first,
        },
        "max_pixels": state.config.max_pixels,
        "max_scale": state.config.max_scale,
    });
    ([(header::CONTENT_TYPE, "application/json")], summary.to_string()).into_response()
}

/// No task-queue subsystem exists in this server; the route exists purely
/// so it takes router precedence over a like-named image identifier.
async fn tasks() -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({"tasks": []}).to_string(),
    )
        .into_response()
}

/// No bundled static assets ship with this crate.
async fn static_file() -> Response {
    AppError::new(ServerError::new(ErrorCode::RouteNotFound, "no static assets are bundled"))
        .into_response()
}

/// Whether `path`, once stripped of a trailing slash, resolves to a
/// configured endpoint mount — the condition under which a trailing slash
/// earns a 301 rather than falling straight through to the image grammar.
fn trailing_slash_redirect(state: &AppState, path: &str) -> Option<Response> {
    if path.len() <= 1 || !path.ends_with('/') {
        return None;
    }
    let stripped = &path[..path.len() - 1];
    state.endpoints.resolve(stripped)?;
    let mut resp = StatusCode::MOVED_PERMANENTLY.into_response();
    resp.headers_mut()
        .insert(header::LOCATION, HeaderValue::from_str(stripped).unwrap_or_else(|_| HeaderValue::from_static("/")));
    Some(resp)
}

/// The generic fallback: resolves the endpoint mount, then hands off to the
/// IIIF or Deep Zoom grammar for that version.
async fn dispatch(
    State(state): State<AppState>,
    Query(query_params): Query<QueryParams>,
    req: Request,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let full_uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let headers = req.headers().clone();

    if let Some(resp) = trailing_slash_redirect(&state, &path) {
        return resp;
    }

    let Some((version, remainder)) = state.endpoints.resolve(&path) else {
        return AppError::new(ServerError::new(ErrorCode::RouteNotFound, "no such route")).into_response();
    };

    if version == ApiVersion::DeepZoom {
        return dispatch_deepzoom(&state, &headers, &method, remainder, &query_params).await;
    }
    if let Err(e) = iiif::check_uri_length(&full_uri, version) {
        return AppError::new(e).with_accept(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())).into_response();
    }
    dispatch_iiif(&state, &headers, &method, version, remainder, &query_params).await
}

/// Build an absolute redirect response to `location` under `version`'s
/// configured mount prefix.
fn redirect_to_canonical(state: &AppState, version: ApiVersion, new_remainder: &str) -> Response {
    let prefix = state.endpoints.path_for(version).unwrap_or("");
    let location = format!("/{prefix}/{new_remainder}");
    let mut resp = StatusCode::MOVED_PERMANENTLY.into_response();
    resp.headers_mut()
        .insert(header::LOCATION, HeaderValue::from_str(&location).unwrap_or_else(|_| HeaderValue::from_static("/")));
    resp
}

async fn dispatch_iiif(
    state: &AppState,
    headers: &axum::http::HeaderMap,
    method: &Method,
    version: ApiVersion,
    remainder: &str,
    query: &QueryParams,
) -> Response {
    // The v2 "bare meta-identifier" shorthand: a single path segment after
    // the endpoint prefix redirects to its info.json rather than 404ing.
    let segments: Vec<&str> = remainder.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() == 1 {
        return match MetaIdentifier::parse(segments[0]) {
            Ok(meta) => {
                let (canonical, _) = meta.normalize();
                match *method {
                    Method::OPTIONS => {
                        let mut resp = StatusCode::NO_CONTENT.into_response();
                        resp.headers_mut().insert(header::ALLOW, allow_header(&["GET", "OPTIONS"]));
                        resp
                    }
                    Method::GET => {
                        let mut resp = StatusCode::SEE_OTHER.into_response();
                        let location = format!("{}/info.json", canonical.serialize());
                        resp.headers_mut()
                            .insert(header::LOCATION, HeaderValue::from_str(&location).unwrap_or_else(|_| HeaderValue::from_static("/")));
                        resp
                    }
                    _ => {
                        let mut resp = StatusCode::METHOD_NOT_ALLOWED.into_response();
                        resp.headers_mut().insert(header::ALLOW, allow_header(&["GET", "OPTIONS"]));
                        resp
                    }
                }
            }
            Err(e) => AppError::new(e).with_accept(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())).into_response(),
        };
    }

    match iiif::parse_path(remainder, version) {
        Ok((meta, kind)) => {
            let (canonical, changed) = meta.normalize();
            if changed {
                let new_remainder = format!("{}/{}", canonical.serialize(), segments[1..].join("/"));
                return redirect_to_canonical(state, version, &new_remainder);
            }
            match kind {
                iiif::RequestKind::Info => match *method {
                    Method::GET => handlers::info_request(state, headers, version, meta).await,
                    Method::OPTIONS => options_response(&["GET", "OPTIONS"]),
                    _ => method_not_allowed(&["GET", "OPTIONS"]),
                },
                iiif::RequestKind::Image(image_req) => match *method {
                    Method::GET => {
                        let params = ImageRequestParams {
                            region: image_req.region,
                            size: image_req.size,
                            rotation: image_req.rotation,
                            quality: image_req.quality,
                            format: image_req.format,
                        };
                        handlers::image_request(state, headers, version, meta, params, query).await
                    }
                    Method::OPTIONS => options_response(&["GET", "OPTIONS"]),
                    _ => method_not_allowed(&["GET", "OPTIONS"]),
                },
            }
        }
        Err(e) => AppError::new(e).with_accept(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())).into_response(),
    }
}

async fn dispatch_deepzoom(
    state: &AppState,
    headers: &axum::http::HeaderMap,
    method: &Method,
    remainder: &str,
    query: &QueryParams,
) -> Response {
    match deepzoom::parse_path(remainder) {
        Ok((meta, kind)) => {
            let (canonical, changed) = meta.normalize();
            if changed {
                let new_remainder = match &kind {
                    deepzoom::RequestKind::Descriptor => format!("{}.dzi", canonical.serialize()),
                    deepzoom::RequestKind::Tile { level, column, row, format } => {
                        format!("{}_files/{level}/{column}_{row}.{format}", canonical.serialize())
                    }
                };
                return redirect_to_canonical(state, ApiVersion::DeepZoom, &new_remainder);
            }
            match kind {
                deepzoom::RequestKind::Descriptor => match *method {
                    Method::GET => handlers::deepzoom_descriptor(state, headers, meta).await,
                    Method::OPTIONS => options_response(&["GET", "OPTIONS"]),
                    _ => method_not_allowed(&["GET", "OPTIONS"]),
                },
                deepzoom::RequestKind::Tile { level, column, row, format } => match *method {
                    Method::GET => handlers::deepzoom_tile(state, headers, meta, level, column, row, format, query).await,
                    Method::OPTIONS => options_response(&["GET", "OPTIONS"]),
                    _ => method_not_allowed(&["GET", "OPTIONS"]),
                },
            }
        }
        Err(e) => AppError::new(e).with_accept(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())).into_response(),
    }
}

fn options_response(methods: &[&str]) -> Response {
    let mut resp = StatusCode::NO_CONTENT.into_response();
    resp.headers_mut().insert(header::ALLOW, allow_header(methods));
    resp
}

fn method_not_allowed(methods: &[&str]) -> Response {
    let mut resp = StatusCode::METHOD_NOT_ALLOWED.into_response();
    resp.headers_mut().insert(header::ALLOW, allow_header(methods));
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FixtureSource;
    use isrv_cache::{CacheFacade, CacheFacadeOptions};
    use isrv_cache::backend::{InMemoryInfoCache, InMemoryVariantCache};
    use isrv_config::ServerConfig;
    use isrv_core::SessionStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let cache = CacheFacade::new(
            Arc::new(InMemoryInfoCache::default()),
            Arc::new(InMemoryVariantCache::default()),
            Some(10),
            CacheFacadeOptions::default(),
        );
        let sessions = SessionStore::new(Duration::from_secs(600));
        let source = FixtureSource::new();
        source.register(
            isrv_core::Identifier::new("rgb-64x56"),
            crate::source::Fixture {
                info: isrv_core::Info::flat("rgb-64x56", 64, 56, "jpg"),
                bytes: vec![0xFF; 64 * 56 * 3],
                modified: chrono::Utc::now(),
            },
        );
        AppState::new(ServerConfig::default(), cache, sessions, Arc::new(source))
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bare_meta_identifier_redirects_to_info_json() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/iiif/2/rgb-64x56")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "rgb-64x56/info.json");
    }

    #[tokio::test]
    async fn info_json_returns_document() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/iiif/2/rgb-64x56/info.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn image_request_returns_bytes() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/iiif/2/rgb-64x56/full/full/0/default.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/jpeg");
    }

    #[tokio::test]
    async fn non_reduced_scale_constraint_redirects_to_canonical_form() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/iiif/2/rgb-64x56;2:4/info.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/iiif/2/rgb-64x56;1:2/info.json"
        );
    }

    #[tokio::test]
    async fn equal_scale_constraint_redirects_with_constraint_dropped() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/iiif/2/rgb-64x56;1:1/full/full/0/default.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/iiif/2/rgb-64x56/full/full/0/default.jpg"
        );
    }

    #[tokio::test]
    async fn options_on_known_resource_is_204_with_allow() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/iiif/2/rgb-64x56/info.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.headers().contains_key(header::ALLOW));
    }

    #[tokio::test]
    async fn post_on_image_resource_is_405() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/iiif/2/rgb-64x56/info.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn trailing_slash_on_mount_redirects() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/iiif/2/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[tokio::test]
    async fn deep_zoom_non_canonical_scale_constraint_redirects() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/dzi/rgb-64x56;3:3.dzi")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/dzi/rgb-64x56.dzi");
    }

    #[tokio::test]
    async fn overlong_v1_uri_is_414() {
        let app = build_router(test_state());
        let long_id = "a".repeat(2000);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/iiif/1/{long_id}/info.json"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::URI_TOO_LONG);
    }

    #[tokio::test]
    async fn missing_source_image_is_404() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/iiif/2/does-not-exist/info.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
