//! IIIF Image API v1/v2/v3 path grammar.
//!
//! Callers are expected to have already percent-decoded path segments (as
//! axum's extractors do) and to have stripped any endpoint prefix
//! (`/iiif/2`, ...) before calling [`parse_path`].

use isrv_core::{ApiVersion, MetaIdentifier, Quality, Region, Rotation, Size};
use isrv_error::{ErrorCode, ServerError};

/// What an IIIF path resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    /// `{identifier}/info.json`
    Info,
    /// `{identifier}/{region}/{size}/{rotation}/{quality}.{format}`
    Image(ImageRequest),
}

/// The four image parameters plus output format parsed from an image
/// request path.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    /// Parsed `region` segment.
    pub region: Region,
    /// Parsed `size` segment.
    pub size: Size,
    /// Parsed `rotation` segment.
    pub rotation: Rotation,
    /// Parsed `quality` segment.
    pub quality: Quality,
    /// Requested output format extension.
    pub format: String,
}

/// Parse a path (with the endpoint prefix already stripped) into a
/// meta-identifier and the kind of request it names.
///
/// Expects exactly two segments (`{identifier}/info.json`) for an
/// information request, or exactly five (`{identifier}/{region}/{size}/
/// {rotation}/{quality}.{format}`) for an image request.
pub fn parse_path(path: &str, version: ApiVersion) -> Result<(MetaIdentifier, RequestKind), ServerError> {
    let path = path.trim_start_matches('/');
    let segments: Vec<&str> = path.split('/').collect();

    match segments.as_slice() {
        [identifier, "info.json"] => {
            let meta_identifier = MetaIdentifier::parse(identifier)?;
            Ok((meta_identifier, RequestKind::Info))
        }
        [identifier, region, size, rotation, quality_and_format] => {
            let meta_identifier = MetaIdentifier::parse(identifier)?;
            let (quality, format) = quality_and_format.rsplit_once('.').ok_or_else(|| {
                ServerError::new(
                    ErrorCode::InvalidQuality,
                    format!("expected 'quality.format': {quality_and_format}"),
                )
            })?;
            let request = ImageRequest {
                region: Region::parse(region)?,
                size: Size::parse(size, version)?,
                rotation: Rotation::parse(rotation)?,
                quality: Quality::parse(quality, version)?,
                format: format.to_string(),
            };
            Ok((meta_identifier, RequestKind::Image(request)))
        }
        _ => Err(ServerError::new(
            ErrorCode::RouteNotFound,
            format!("path does not match the IIIF image request grammar: {path}"),
        )),
    }
}

/// Check a full, unstripped request URI against IIIF Image API 1's 1024
/// byte length limit. A no-op for other API versions.
pub fn check_uri_length(full_uri: &str, version: ApiVersion) -> Result<(), ServerError> {
    const V1_MAX_URI_BYTES: usize = 1024;
    if version == ApiVersion::V1 && full_uri.len() > V1_MAX_URI_BYTES {
        return Err(ServerError::new(
            ErrorCode::UriTooLong,
            format!("request URI exceeds {V1_MAX_URI_BYTES} bytes"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_info_request() {
        let (id, kind) = parse_path("foo/info.json", ApiVersion::V3).unwrap();
        assert_eq!(id.identifier.as_str(), "foo");
        assert_eq!(kind, RequestKind::Info);
    }

    #[test]
    fn parses_image_request() {
        let (id, kind) = parse_path("foo/full/max/0/default.jpg", ApiVersion::V3).unwrap();
        assert_eq!(id.identifier.as_str(), "foo");
        let RequestKind::Image(req) = kind else { panic!("expected image request") };
        assert_eq!(req.format, "jpg");
        assert_eq!(req.region, Region::Full);
    }

    #[test]
    fn parses_meta_identifier_with_page_and_scale_constraint() {
        let (id, _) = parse_path("book;3;1:2/full/max/0/default.jpg", ApiVersion::V3).unwrap();
        assert_eq!(id.page, Some(3));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(parse_path("foo/full/max/0", ApiVersion::V3).is_err());
        assert!(parse_path("foo/full/max/0/default.jpg/extra", ApiVersion::V3).is_err());
    }

    #[test]
    fn rejects_missing_format_dot() {
        assert!(parse_path("foo/full/max/0/default", ApiVersion::V3).is_err());
    }

    #[test]
    fn v1_uri_length_limit_enforced() {
        let long = format!("foo/{}", "a".repeat(2000));
        assert!(check_uri_length(&long, ApiVersion::V1).is_err());
        assert!(check_uri_length(&long, ApiVersion::V3).is_ok());
    }

    proptest::proptest! {
        /// Any well-formed pixel region `x,y,w,h` with `w,h > 0` parses to
        /// exactly the `Region::Pixels` it names, for every path shape the
        /// grammar accepts it in.
        #[test]
        fn pixel_region_round_trips_through_parse(
            x in 0u32..10_000, y in 0u32..10_000,
            w in 1u32..10_000, h in 1u32..10_000,
        ) {
            let path = format!("id/{x},{y},{w},{h}/max/0/default.jpg");
            let (_, kind) = parse_path(&path, ApiVersion::V3).unwrap();
            let RequestKind::Image(req) = kind else { panic!("expected image request") };
            prop_assert_eq!(req.region, Region::Pixels { x, y, w, h });
        }
    }
}
