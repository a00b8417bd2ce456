// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Information Request Handler and Image Request Handler: the two
//! request pipelines every IIIF/Deep Zoom endpoint ultimately runs through.

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use isrv_core::{
    ApiVersion, Identifier, IdentifierDelegate, Info, MetaIdentifier, OperationList, RequestContext,
};
use isrv_error::{ErrorCode, ServerError};
use isrv_uri::deepzoom;

use crate::callbacks::AuthDecision;
use crate::errors::AppError;
use crate::factory;
use crate::source::SourceStat;
use crate::state::AppState;
use crate::validation::{CacheDirective, content_disposition};

/// Query parameters recognized on every endpoint.
#[derive(Debug, Default, serde::Deserialize)]
pub struct QueryParams {
    /// The `cache` directive (`nocache` / `false` / `recache`).
    pub cache: Option<String>,
    /// Requested `Content-Disposition` mode and filename hint.
    #[serde(rename = "response-content-disposition")]
    pub response_content_disposition: Option<String>,
}

struct SlashDelegate<'a>(Option<&'a str>);
impl IdentifierDelegate for SlashDelegate<'_> {
    fn slash_substitute(&self) -> Option<&str> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Shared Info resolution (Information Request Handler rules, §4.7)
// ---------------------------------------------------------------------------

/// Resolve `Info` for `identifier` per the configured resolve-first policy.
/// Returns the stat observed from a fresh source probe, or `None` if the
/// value came from a cache tier without touching the source.
async fn resolve_info_with_policy(
    state: &AppState,
    identifier: &Identifier,
) -> Result<(Info, Option<SourceStat>), ServerError> {
    let resolve_first = state.config.cache.resolve_first;

    async fn handle_missing_source(state: &AppState, identifier: &Identifier) -> ServerError {
        if state.config.cache.evict_missing {
            let _ = state.cache.purge(identifier).await;
        }
        ServerError::not_found(format!("no such source: {identifier}"))
    }

    if resolve_first {
        let stat = state.source.stat(identifier).await?;
        let Some(stat) = stat else {
            return Err(handle_missing_source(state, identifier).await);
        };
        if let Ok(Some(info)) = state.cache.get_info(identifier).await {
            return Ok((info, Some(stat)));
        }
        let info = state.source.read_info(identifier).await?;
        let _ = state.cache.put_info(identifier, info.clone()).await;
        Ok((info, Some(stat)))
    } else {
        if let Ok(Some(info)) = state.cache.get_info(identifier).await {
            return Ok((info, None));
        }
        let stat = state.source.stat(identifier).await?;
        let Some(stat) = stat else {
            return Err(handle_missing_source(state, identifier).await);
        };
        let info = state.source.read_info(identifier).await?;
        let _ = state.cache.put_info(identifier, info.clone()).await;
        Ok((info, Some(stat)))
    }
}

fn check_page_index(meta: &MetaIdentifier, info: &Info) -> Result<(), ServerError> {
    if let Some(page) = meta.page
        && page >= info.page_count
    {
        return Err(ServerError::illegal_argument(
            ErrorCode::InvalidPageIndex,
            format!("page {page} is out of range (page_count = {})", info.page_count),
        ));
    }
    Ok(())
}

fn allow_upscale(state: &AppState) -> bool {
    state.config.max_scale.is_some_and(|m| m > 1.0)
}

/// Reconstruct the externally visible base URI: the configured `base_uri`
/// wins outright; otherwise `X-Forwarded-*` headers are consulted, falling
/// back to the request's own `Host` header.
fn effective_base_uri(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.config.base_uri {
        return base.trim_end_matches('/').to_string();
    }
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let proto = header_str("x-forwarded-proto").unwrap_or("http");
    let host = header_str("x-forwarded-host")
        .or_else(|| header_str("host"))
        .unwrap_or("localhost");
    let base_path = header_str("x-forwarded-basepath").unwrap_or("");
    match header_str("x-forwarded-port") {
        Some(port) => format!("{proto}://{host}:{port}{base_path}"),
        None => format!("{proto}://{host}{base_path}"),
    }
}

fn canonical_uri(state: &AppState, headers: &HeaderMap, version: ApiVersion, meta: &MetaIdentifier) -> String {
    let base = effective_base_uri(state, headers);
    let prefix = state.endpoints.path_for(version).unwrap_or("");
    let delegate = SlashDelegate(state.config.slash_substitute.as_deref());
    let public_id = headers
        .get("x-iiif-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| meta.for_uri(&delegate));
    format!("{base}/{prefix}/{public_id}")
}

fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn stamp_date_headers(resp: &mut Response, last_modified: Option<DateTime<Utc>>) {
    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&http_date(Utc::now())) {
        headers.insert(header::DATE, v);
    }
    if let Some(lm) = last_modified
        && let Ok(v) = HeaderValue::from_str(&http_date(lm))
    {
        headers.insert(header::LAST_MODIFIED, v);
    }
}

fn stamp_cache_control(resp: &mut Response, state: &AppState, directive: CacheDirective) {
    if directive.emits_cache_control() && state.config.client_cache.enabled {
        let value = format!("max-age={}", state.config.client_cache.max_age);
        if let Ok(v) = HeaderValue::from_str(&value) {
            resp.headers_mut().insert(header::CACHE_CONTROL, v);
        }
    }
}

fn stamp_link(resp: &mut Response, uri: &str) {
    if let Ok(v) = HeaderValue::from_str(&format!("<{uri}>; rel=\"canonical\"")) {
        resp.headers_mut().insert(header::LINK, v);
    }
}

fn accept_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())
}

// ---------------------------------------------------------------------------
// Information Request Handler (§4.7)
// ---------------------------------------------------------------------------

/// Serve `{endpoint}/{meta-id}/info.json` (or the Deep Zoom `.dzi` body,
/// via the `version == ApiVersion::DeepZoom` path taken by
/// [`crate::router`]).
pub async fn info_request(
    state: &AppState,
    headers: &HeaderMap,
    version: ApiVersion,
    meta: MetaIdentifier,
) -> Response {
    let accept = accept_header(headers);
    let ctx = RequestContext::new();
    ctx.update(|f| f.identifier = Some(meta.identifier.as_str().to_string()));

    match state.info_callbacks.authorize_before_access(&ctx).await {
        AuthDecision::Allow => {}
        AuthDecision::Unauthenticated => {
            return AppError::new(ServerError::new(ErrorCode::Unauthenticated, "unauthenticated"))
                .with_accept(accept)
                .into_response();
        }
        AuthDecision::Forbidden => {
            return AppError::new(ServerError::forbidden("access denied")).with_accept(accept).into_response();
        }
    }

    let (info, stat) = match resolve_info_with_policy(state, &meta.identifier).await {
        Ok(v) => v,
        Err(e) => return AppError::new(e).with_accept(accept).into_response(),
    };

    if let Err(e) = check_page_index(&meta, &info) {
        return AppError::new(e).with_accept(accept).into_response();
    }

    ctx.update(|f| {
        f.page_count = Some(info.page_count);
        f.full_size = Some((info.width, info.height));
        f.metadata = serde_json::to_value(&info.metadata).ok();
    });

    match state.info_callbacks.authorize(&ctx).await {
        AuthDecision::Allow => {}
        AuthDecision::Unauthenticated => {
            return AppError::new(ServerError::new(ErrorCode::Unauthenticated, "unauthenticated"))
                .with_accept(accept)
                .into_response();
        }
        AuthDecision::Forbidden => {
            return AppError::new(ServerError::forbidden("access denied")).with_accept(accept).into_response();
        }
    }

    match stat {
        Some(s) => state.info_callbacks.source_accessed(&ctx, s).await,
        None => state.info_callbacks.cache_accessed(&ctx).await,
    }

    let uri = canonical_uri(state, headers, version, &meta);
    let doc = factory::build_info_document(
        version,
        &info,
        &uri,
        meta.scale_constraint,
        state.config.max_pixels,
        allow_upscale(state),
    );
    let content_type = match version {
        ApiVersion::V1 => "application/json",
        ApiVersion::V2 | ApiVersion::V3 | ApiVersion::DeepZoom => "application/ld+json",
    };
    let mut resp = (
        [(header::CONTENT_TYPE, content_type)],
        serde_json::to_string(&doc).unwrap_or_default(),
    )
        .into_response();
    stamp_date_headers(&mut resp, stat.map(|s| s.modified));
    stamp_link(&mut resp, &uri);
    resp
}

/// Serve `{endpoint}/{meta-id}.dzi`.
pub async fn deepzoom_descriptor(state: &AppState, headers: &HeaderMap, meta: MetaIdentifier) -> Response {
    let accept = accept_header(headers);
    let (info, stat) = match resolve_info_with_policy(state, &meta.identifier).await {
        Ok(v) => v,
        Err(e) => return AppError::new(e).with_accept(accept).into_response(),
    };
    let tile_size = info.tile_width.unwrap_or(254);
    let xml = factory::build_dzi_document(&info, tile_size, 1, &info.format);
    let mut resp = ([(header::CONTENT_TYPE, "application/xml")], xml).into_response();
    stamp_date_headers(&mut resp, stat.map(|s| s.modified));
    resp
}

// ---------------------------------------------------------------------------
// Image Request Handler (§4.8)
// ---------------------------------------------------------------------------

/// Parameters resolved from the image-request grammar, independent of which
/// API version produced them.
pub struct ImageRequestParams {
    /// Resolved region/size/rotation/quality/format parameters.
    pub region: isrv_core::Region,
    /// Resolved size parameter.
    pub size: isrv_core::Size,
    /// Resolved rotation parameter.
    pub rotation: isrv_core::Rotation,
    /// Resolved quality parameter.
    pub quality: isrv_core::Quality,
    /// Requested output format extension.
    pub format: String,
}

/// Serve an IIIF image request or a Deep Zoom tile (after the caller has
/// translated the tile coordinates into an equivalent region/size pair).
pub async fn image_request(
    state: &AppState,
    headers: &HeaderMap,
    version: ApiVersion,
    meta: MetaIdentifier,
    params: ImageRequestParams,
    query: &QueryParams,
) -> Response {
    let accept = accept_header(headers);
    let directive = CacheDirective::parse(query.cache.as_deref());
    let ctx = RequestContext::new();
    ctx.update(|f| f.identifier = Some(meta.identifier.as_str().to_string()));

    // AUTH_PRE
    match state.image_callbacks.authorize_before_access(&ctx).await {
        AuthDecision::Allow => {}
        AuthDecision::Unauthenticated => {
            return AppError::new(ServerError::new(ErrorCode::Unauthenticated, "unauthenticated"))
                .with_accept(accept)
                .into_response();
        }
        AuthDecision::Forbidden => {
            return AppError::new(ServerError::forbidden("access denied")).with_accept(accept).into_response();
        }
    }

    let (info, stat) = match resolve_info_with_policy(state, &meta.identifier).await {
        Ok(v) => v,
        Err(e) => return AppError::new(e).with_accept(accept).into_response(),
    };
    if let Err(e) = check_page_index(&meta, &info) {
        return AppError::new(e).with_accept(accept).into_response();
    }

    let operations = match OperationList::build(
        meta.clone(),
        params.region,
        params.size,
        params.rotation,
        params.quality,
        &params.format,
        info.width,
        info.height,
    ) {
        Ok(ops) => ops,
        Err(e) => return AppError::new(e).with_accept(accept).into_response(),
    };
    let fingerprint = operations.fingerprint();

    // RESOLVE_OR_CACHE_HIT_CHECK
    let variant_enabled = state.config.variant_cache.enabled;
    let cached = if variant_enabled && !directive.forces_recache() {
        state.cache.get_variant(&fingerprint).await.unwrap_or(None)
    } else {
        None
    };

    // AUTH_POST
    match state.image_callbacks.authorize(&ctx).await {
        AuthDecision::Allow => {}
        AuthDecision::Unauthenticated => {
            return AppError::new(ServerError::new(ErrorCode::Unauthenticated, "unauthenticated"))
                .with_accept(accept)
                .into_response();
        }
        AuthDecision::Forbidden => {
            return AppError::new(ServerError::forbidden("access denied")).with_accept(accept).into_response();
        }
    }

    let format = match isrv_core::resolve_writable_format(&params.format) {
        Ok(f) => f,
        Err(e) => return AppError::new(e).with_accept(accept).into_response(),
    };

    let body_bytes = if let Some(bytes) = cached {
        state.image_callbacks.will_stream_image_from_variant_cache(&ctx).await;
        bytes
    } else {
        state.image_callbacks.info_available(&ctx, &info).await;
        state.image_callbacks.will_process_image(&ctx, &info).await;

        // Single-flight: only the leader renders; followers wait and then
        // re-check the cache for the leader's committed result.
        let role = state.coordinator.join(&fingerprint).await;
        let rendered = match role {
            isrv_session::Role::Leader => {
                let result = state.source.render(&meta.identifier, &operations).await;
                state.coordinator.finish(&fingerprint).await;
                result
            }
            isrv_session::Role::Follower(notify) => {
                let waited = isrv_session::Coordinator::wait(
                    notify,
                    &fingerprint,
                    std::time::Duration::from_secs(30),
                )
                .await;
                match waited {
                    Ok(()) => match state.cache.get_variant(&fingerprint).await.unwrap_or(None) {
                        Some(bytes) => Ok(bytes),
                        None => state.source.render(&meta.identifier, &operations).await,
                    },
                    Err(_) => state.source.render(&meta.identifier, &operations).await,
                }
            }
        };
        let bytes = match rendered {
            Ok(b) => b,
            Err(e) => return AppError::new(e).with_accept(accept).into_response(),
        };

        if variant_enabled {
            let mut writer = state.cache.new_variant_writer(&meta.identifier, &fingerprint);
            writer.write(&bytes);
            let _ = writer.commit().await;
        }
        bytes
    };

    let mut headers_out = vec![(header::CONTENT_TYPE, HeaderValue::from_static(format.media_type))];
    if let Some(disposition) = &query.response_content_disposition {
        let filename = format!("{}.{}", meta.identifier.as_str(), format.extension);
        if let Ok(v) = HeaderValue::from_str(&content_disposition(disposition, &filename)) {
            headers_out.push((header::CONTENT_DISPOSITION, v));
        }
    }

    let mut resp = (headers_out, body_bytes).into_response();
    stamp_date_headers(&mut resp, stat.map(|s| s.modified));
    stamp_cache_control(&mut resp, state, directive);
    let uri = canonical_uri(state, headers, version, &meta);
    stamp_link(&mut resp, &uri);
    resp
}

/// Translate a Deep Zoom tile address into the equivalent region/size pair
/// and serve it through [`image_request`].
pub async fn deepzoom_tile(
    state: &AppState,
    headers: &HeaderMap,
    meta: MetaIdentifier,
    level: u32,
    column: u32,
    row: u32,
    format: String,
    query: &QueryParams,
) -> Response {
    let accept = accept_header(headers);
    let (info, _stat) = match resolve_info_with_policy(state, &meta.identifier).await {
        Ok(v) => v,
        Err(e) => return AppError::new(e).with_accept(accept).into_response(),
    };

    let tile_w = info.tile_width.unwrap_or(254);
    let tile_h = info.tile_height.unwrap_or(254);
    let num_resolutions = info.num_resolutions.max(1);

    if let Err(e) =
        deepzoom::check_tile_in_range(level, column, row, num_resolutions, info.width, info.height, tile_w, tile_h)
    {
        return AppError::new(e).with_accept(accept).into_response();
    }

    let scale_down = 1u32 << (num_resolutions - 1 - level);
    let level_w = info.width.div_ceil(scale_down);
    let level_h = info.height.div_ceil(scale_down);
    let x = (column * tile_w * scale_down).min(info.width.saturating_sub(1));
    let y = (row * tile_h * scale_down).min(info.height.saturating_sub(1));
    let w = tile_w.min(level_w.saturating_sub(column * tile_w)) * scale_down;
    let h = tile_h.min(level_h.saturating_sub(row * tile_h)) * scale_down;

    let params = ImageRequestParams {
        region: isrv_core::Region::Pixels { x, y, w: w.max(1), h: h.max(1) },
        size: isrv_core::Size { kind: isrv_core::SizeKind::Width(tile_w.min(level_w)), upscale: false },
        rotation: isrv_core::Rotation { degrees: 0.0, mirror: false },
        quality: isrv_core::Quality::Default,
        format,
    };
    image_request(state, headers, ApiVersion::DeepZoom, meta, params, query).await
}
