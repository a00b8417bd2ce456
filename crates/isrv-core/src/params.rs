//! Region, size, rotation, and quality request parameters.

use isrv_error::{ErrorCode, ServerError};
use serde::{Deserialize, Serialize};

/// Which of the three IIIF Image API major versions (or Deep Zoom) produced
/// a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiVersion {
    /// IIIF Image API 1.x.
    V1,
    /// IIIF Image API 2.x.
    V2,
    /// IIIF Image API 3.x.
    V3,
    /// Deep Zoom (DZI).
    DeepZoom,
}

/// The `region` request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Region {
    /// The entire source image.
    Full,
    /// The largest centered square within the source image.
    Square,
    /// A pixel-space box `(x, y, w, h)`.
    Pixels { x: u32, y: u32, w: u32, h: u32 },
    /// A percentage-space box `(x, y, w, h)`, each in `[0, 100]`.
    Percent { x: f64, y: f64, w: f64, h: f64 },
}

impl Region {
    /// Parse a `region` path segment.
    pub fn parse(s: &str) -> Result<Self, ServerError> {
        match s {
            "full" => Ok(Self::Full),
            "square" => Ok(Self::Square),
            _ => {
                if let Some(rest) = s.strip_prefix("pct:") {
                    let (x, y, w, h) = parse_quad_f64(rest, ErrorCode::InvalidRegion)?;
                    if w <= 0.0 || h <= 0.0 {
                        return Err(ServerError::new(
                            ErrorCode::InvalidRegion,
                            "region width/height must be > 0",
                        ));
                    }
                    Ok(Self::Percent { x, y, w, h })
                } else {
                    let (x, y, w, h) = parse_quad_u32(s, ErrorCode::InvalidRegion)?;
                    if w == 0 || h == 0 {
                        return Err(ServerError::new(
                            ErrorCode::InvalidRegion,
                            "region width/height must be > 0",
                        ));
                    }
                    Ok(Self::Pixels { x, y, w, h })
                }
            }
        }
    }
}

/// The `size` request parameter, plus the v3 `^` upscaling marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Which sizing rule applies.
    pub kind: SizeKind,
    /// Whether the `^` marker permitted upscaling beyond the source's
    /// native resolution (IIIF 3 only).
    pub upscale: bool,
}

/// The sizing rule, independent of the upscale marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SizeKind {
    /// Maximum size allowed by the server (IIIF 3 `max`).
    Max,
    /// The region's native size, unscaled (legacy `full`).
    Full,
    /// Scale to exactly this width, height proportional.
    Width(u32),
    /// Scale to exactly this height, width proportional.
    Height(u32),
    /// Scale by this percentage of the region's size.
    Percent(f64),
    /// Scale to exactly this width and height, ignoring aspect ratio.
    Absolute(u32, u32),
    /// Scale to the largest size with this aspect-preserving bounding box.
    FitInside(u32, u32),
}

impl Size {
    /// Parse a `size` path segment for the given API version.
    pub fn parse(s: &str, version: ApiVersion) -> Result<Self, ServerError> {
        let (body, upscale) = if let Some(rest) = s.strip_prefix('^') {
            (rest, true)
        } else {
            (s, false)
        };
        if upscale && version != ApiVersion::V3 {
            return Err(ServerError::new(
                ErrorCode::InvalidSize,
                "'^' upscaling marker requires IIIF Image API 3",
            ));
        }

        let kind = match body {
            "max" => SizeKind::Max,
            "full" => {
                if version == ApiVersion::V3 {
                    return Err(ServerError::new(
                        ErrorCode::InvalidSize,
                        "'full' size was renamed 'max' in IIIF Image API 3",
                    ));
                }
                SizeKind::Full
            }
            _ => {
                if let Some(rest) = body.strip_prefix("pct:") {
                    let p: f64 = rest.parse().map_err(|_| {
                        ServerError::new(ErrorCode::InvalidSize, format!("invalid percent: {rest}"))
                    })?;
                    if p <= 0.0 {
                        return Err(ServerError::new(
                            ErrorCode::InvalidSize,
                            "size percent must be > 0",
                        ));
                    }
                    SizeKind::Percent(p)
                } else if let Some(rest) = body.strip_prefix('!') {
                    let (w, h) = parse_pair_u32(rest, ErrorCode::InvalidSize)?;
                    SizeKind::FitInside(w, h)
                } else if let Some((w_str, h_str)) = body.split_once(',') {
                    match (w_str.is_empty(), h_str.is_empty()) {
                        (false, true) => {
                            SizeKind::Width(parse_dim(w_str, ErrorCode::InvalidSize)?)
                        }
                        (true, false) => {
                            SizeKind::Height(parse_dim(h_str, ErrorCode::InvalidSize)?)
                        }
                        (false, false) => SizeKind::Absolute(
                            parse_dim(w_str, ErrorCode::InvalidSize)?,
                            parse_dim(h_str, ErrorCode::InvalidSize)?,
                        ),
                        (true, true) => {
                            return Err(ServerError::new(
                                ErrorCode::InvalidSize,
                                "size requires at least one of width, height",
                            ));
                        }
                    }
                } else {
                    return Err(ServerError::new(
                        ErrorCode::InvalidSize,
                        format!("unrecognized size syntax: {body}"),
                    ));
                }
            }
        };
        Ok(Self { kind, upscale })
    }
}

/// The `rotation` request parameter: degrees clockwise, optionally mirrored
/// first (`!` prefix).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    /// Degrees clockwise, in `[0, 360]`.
    pub degrees: f64,
    /// Whether the image is flipped horizontally before rotation.
    pub mirror: bool,
}

impl Rotation {
    /// Parse a `rotation` path segment.
    pub fn parse(s: &str) -> Result<Self, ServerError> {
        let (body, mirror) = match s.strip_prefix('!') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let degrees: f64 = body.parse().map_err(|_| {
            ServerError::new(ErrorCode::InvalidRotation, format!("invalid rotation: {body}"))
        })?;
        if !(0.0..=360.0).contains(&degrees) || degrees.is_nan() {
            return Err(ServerError::new(
                ErrorCode::InvalidRotation,
                format!("rotation out of [0, 360]: {degrees}"),
            ));
        }
        Ok(Self { degrees, mirror })
    }
}

/// The `quality` request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Version-appropriate default (`default` in v2/v3, `native` in v1).
    Default,
    /// Full color.
    Color,
    /// Grayscale.
    Gray,
    /// Bitonal (1-bit).
    Bitonal,
    /// IIIF 1 legacy synonym for [`Quality::Default`].
    Native,
}

impl Quality {
    /// Parse a `quality` path segment for the given API version.
    pub fn parse(s: &str, version: ApiVersion) -> Result<Self, ServerError> {
        match (s, version) {
            ("default", ApiVersion::V2 | ApiVersion::V3 | ApiVersion::DeepZoom) => Ok(Self::Default),
            ("native", ApiVersion::V1) => Ok(Self::Native),
            ("color", _) => Ok(Self::Color),
            ("gray" | "grey", _) => Ok(Self::Gray),
            ("bitonal", _) => Ok(Self::Bitonal),
            _ => Err(ServerError::new(
                ErrorCode::InvalidQuality,
                format!("unrecognized quality '{s}' for this API version"),
            )),
        }
    }
}

fn parse_dim(s: &str, code: ErrorCode) -> Result<u32, ServerError> {
    let v: u32 = s
        .parse()
        .map_err(|_| ServerError::new(code, format!("invalid dimension: {s}")))?;
    if v == 0 {
        return Err(ServerError::new(code, "dimension must be > 0"));
    }
    Ok(v)
}

fn parse_pair_u32(s: &str, code: ErrorCode) -> Result<(u32, u32), ServerError> {
    let (w_str, h_str) = s
        .split_once(',')
        .ok_or_else(|| ServerError::new(code, format!("expected 'w,h': {s}")))?;
    Ok((parse_dim(w_str, code)?, parse_dim(h_str, code)?))
}

fn parse_quad_u32(s: &str, code: ErrorCode) -> Result<(u32, u32, u32, u32), ServerError> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        return Err(ServerError::new(code, format!("expected 'x,y,w,h': {s}")));
    }
    let nums: Result<Vec<u32>, _> = parts.iter().map(|p| p.parse::<u32>()).collect();
    let nums = nums.map_err(|_| ServerError::new(code, format!("expected 'x,y,w,h': {s}")))?;
    Ok((nums[0], nums[1], nums[2], nums[3]))
}

fn parse_quad_f64(s: &str, code: ErrorCode) -> Result<(f64, f64, f64, f64), ServerError> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        return Err(ServerError::new(code, format!("expected 'x,y,w,h': {s}")));
    }
    let nums: Result<Vec<f64>, _> = parts.iter().map(|p| p.parse::<f64>()).collect();
    let nums = nums.map_err(|_| ServerError::new(code, format!("expected 'x,y,w,h': {s}")))?;
    Ok((nums[0], nums[1], nums[2], nums[3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_full_and_square() {
        assert_eq!(Region::parse("full").unwrap(), Region::Full);
        assert_eq!(Region::parse("square").unwrap(), Region::Square);
    }

    #[test]
    fn region_pixels() {
        assert_eq!(
            Region::parse("10,20,100,200").unwrap(),
            Region::Pixels { x: 10, y: 20, w: 100, h: 200 }
        );
    }

    #[test]
    fn region_percent() {
        assert_eq!(
            Region::parse("pct:10,20,50,50").unwrap(),
            Region::Percent { x: 10.0, y: 20.0, w: 50.0, h: 50.0 }
        );
    }

    #[test]
    fn region_rejects_zero_area() {
        assert!(Region::parse("10,20,0,200").is_err());
        assert!(Region::parse("pct:10,20,0,50").is_err());
    }

    #[test]
    fn size_max_and_full() {
        assert_eq!(Size::parse("max", ApiVersion::V3).unwrap().kind, SizeKind::Max);
        assert_eq!(Size::parse("full", ApiVersion::V2).unwrap().kind, SizeKind::Full);
    }

    #[test]
    fn size_full_rejected_in_v3() {
        assert!(Size::parse("full", ApiVersion::V3).is_err());
    }

    #[test]
    fn size_upscale_marker_requires_v3() {
        let s = Size::parse("^max", ApiVersion::V3).unwrap();
        assert!(s.upscale);
        assert!(Size::parse("^max", ApiVersion::V2).is_err());
    }

    #[test]
    fn size_width_height_absolute() {
        assert_eq!(Size::parse("150,", ApiVersion::V2).unwrap().kind, SizeKind::Width(150));
        assert_eq!(Size::parse(",150", ApiVersion::V2).unwrap().kind, SizeKind::Height(150));
        assert_eq!(
            Size::parse("150,100", ApiVersion::V2).unwrap().kind,
            SizeKind::Absolute(150, 100)
        );
    }

    #[test]
    fn size_fit_inside() {
        assert_eq!(
            Size::parse("!150,100", ApiVersion::V2).unwrap().kind,
            SizeKind::FitInside(150, 100)
        );
    }

    #[test]
    fn size_percent() {
        assert_eq!(Size::parse("pct:50", ApiVersion::V2).unwrap().kind, SizeKind::Percent(50.0));
        assert!(Size::parse("pct:0", ApiVersion::V2).is_err());
    }

    #[test]
    fn rotation_parses_plain_and_mirrored() {
        let r = Rotation::parse("90").unwrap();
        assert_eq!(r.degrees, 90.0);
        assert!(!r.mirror);

        let r = Rotation::parse("!180").unwrap();
        assert_eq!(r.degrees, 180.0);
        assert!(r.mirror);
    }

    #[test]
    fn rotation_rejects_out_of_range() {
        assert!(Rotation::parse("361").is_err());
        assert!(Rotation::parse("-1").is_err());
    }

    #[test]
    fn quality_version_specific() {
        assert_eq!(Quality::parse("default", ApiVersion::V2).unwrap(), Quality::Default);
        assert_eq!(Quality::parse("native", ApiVersion::V1).unwrap(), Quality::Native);
        assert!(Quality::parse("default", ApiVersion::V1).is_err());
        assert!(Quality::parse("native", ApiVersion::V2).is_err());
    }

    #[test]
    fn quality_gray_accepts_both_spellings() {
        assert_eq!(Quality::parse("gray", ApiVersion::V2).unwrap(), Quality::Gray);
        assert_eq!(Quality::parse("grey", ApiVersion::V2).unwrap(), Quality::Gray);
    }
}
