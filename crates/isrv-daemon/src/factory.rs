// SPDX-License-Identifier: MIT OR Apache-2.0
//! Projects an [`Info`] into a version-specific `info.json` (or `.dzi`)
//! descriptor document.

use isrv_core::{ApiVersion, Info, Orientation, ScaleConstraint};
use serde_json::{Value, json};

const V1_PROFILE: &str = "http://library.stanford.edu/iiif/image-api/1.1/compliance.html#level2";
const V2_PROFILE: &str = "http://iiif.io/api/image/2/level2.json";
const V2_CONTEXT: &str = "http://iiif.io/api/image/2/context.json";
const V3_CONTEXT: &str = "http://iiif.io/api/image/3/context.json";

/// Minimum axis length, in pixels, a `scale_factors`/`sizes` entry may shrink
/// down to before it's dropped from the list.
const MIN_SIZE: u32 = 64;

/// Swap width/height if `orientation` indicates the source is physically
/// rotated a quarter turn, and apply a scale constraint's divisor. Returns
/// the effective `(width, height)` a descriptor should advertise.
fn effective_dimensions(info: &Info, scale_constraint: Option<ScaleConstraint>) -> (u32, u32) {
    let (w, h) = match info.metadata.orientation {
        Some(Orientation::Rotate90) | Some(Orientation::Rotate270) => (info.height, info.width),
        _ => (info.width, info.height),
    };
    match scale_constraint {
        Some(sc) => (
            ((f64::from(w) / sc.factor()).round() as u32).max(1),
            ((f64::from(h) / sc.factor()).round() as u32).max(1),
        ),
        None => (w, h),
    }
}

/// Powers of two, largest first, down to (but not below) `MIN_SIZE` on
/// either axis.
fn scale_factors(width: u32, height: u32) -> Vec<u32> {
    let mut factors = vec![1u32];
    let mut f = 2u32;
    while width / f >= MIN_SIZE && height / f >= MIN_SIZE {
        factors.push(f);
        f *= 2;
    }
    factors
}

/// A halving list of `(w, h)` pairs, stopping once either axis would drop
/// below `MIN_SIZE` or the pixel count would exceed `max_pixels`.
fn sizes_halving(width: u32, height: u32, max_pixels: Option<u64>) -> Vec<(u32, u32)> {
    let mut sizes = Vec::new();
    let (mut w, mut h) = (width, height);
    loop {
        let within_budget = max_pixels.is_none_or(|m| u64::from(w) * u64::from(h) <= m);
        if within_budget {
            sizes.push((w, h));
        }
        if w / 2 < MIN_SIZE || h / 2 < MIN_SIZE {
            break;
        }
        w /= 2;
        h /= 2;
    }
    sizes.reverse();
    sizes
}

/// Build the `info.json` body for `version`, given the source's [`Info`],
/// its canonical `@id`/`id` URI, the active scale constraint (if any), and
/// whether upscaling beyond native resolution is permitted.
pub fn build_info_document(
    version: ApiVersion,
    info: &Info,
    canonical_uri: &str,
    scale_constraint: Option<ScaleConstraint>,
    max_pixels: Option<u64>,
    allow_upscale: bool,
) -> Value {
    let (width, height) = effective_dimensions(info, scale_constraint);
    let (tile_width, tile_height) = (
        info.tile_width.unwrap_or(width),
        info.tile_height.unwrap_or(height),
    );

    match version {
        ApiVersion::V1 => json!({
            "@context": "http://library.stanford.edu/iiif/image-api/1.1/context.json",
            "@id": canonical_uri,
            "width": width,
            "height": height,
            "scale_factors": scale_factors(width, height),
            "tile_width": tile_width,
            "tile_height": tile_height,
            "formats": ["jpg", "png", "tif"],
            "qualities": ["native", "color", "gray", "bitonal"],
            "profile": V1_PROFILE,
        }),
        ApiVersion::V2 => {
            let sizes = sizes_halving(width, height, max_pixels);
            let mut supports = vec!["regionByPx", "regionByPct", "sizeByW", "sizeByH", "sizeByPct"];
            if allow_upscale {
                supports.push("sizeAboveFull");
            }
            json!({
                "@context": V2_CONTEXT,
                "@id": canonical_uri,
                "protocol": "http://iiif.io/api/image",
                "width": width,
                "height": height,
                "sizes": sizes.iter().map(|(w, h)| json!({"width": w, "height": h})).collect::<Vec<_>>(),
                "tiles": [{
                    "width": tile_width,
                    "height": tile_height,
                    "scaleFactors": scale_factors(width, height),
                }],
                "profile": [
                    V2_PROFILE,
                    {
                        "formats": ["jpg", "png", "tif"],
                        "qualities": ["default", "color", "gray", "bitonal"],
                        "maxArea": max_pixels,
                        "supports": supports,
                    }
                ],
            })
        }
        ApiVersion::V3 | ApiVersion::DeepZoom => {
            let sizes = sizes_halving(width, height, max_pixels);
            let mut extra_features = vec![
                "regionByPx", "regionByPct", "regionSquare",
                "sizeByW", "sizeByH", "sizeByWh", "sizeByPct", "sizeByConfinedWh",
                "rotationBy90s", "rotationArbitrary", "mirroring",
                "profileLinkHeader", "jsonldMediaType", "canonicalLinkHeader",
                "cors", "baseUriRedirect",
            ];
            let sub_unity_constraint = scale_constraint.is_some_and(|sc| sc.factor() < 1.0);
            if allow_upscale && !sub_unity_constraint {
                extra_features.push("sizeUpscaling");
            }
            json!({
                "@context": V3_CONTEXT,
                "id": canonical_uri,
                "type": "ImageService3",
                "protocol": "http://iiif.io/api/image",
                "profile": "level2",
                "width": width,
                "height": height,
                "maxArea": max_pixels,
                "sizes": sizes.iter().map(|(w, h)| json!({"width": w, "height": h})).collect::<Vec<_>>(),
                "tiles": [{
                    "width": tile_width,
                    "height": tile_height,
                    "scaleFactors": scale_factors(width, height),
                }],
                "extraFormats": ["png", "tif", "webp"],
                "extraQualities": ["color", "gray", "bitonal"],
                "extraFeatures": extra_features,
                "pageCount": info.page_count,
            })
        }
    }
}

/// Build a Deep Zoom `.dzi` XML descriptor.
pub fn build_dzi_document(info: &Info, tile_size: u32, overlap: u32, format: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Image xmlns=\"http://schemas.microsoft.com/deepzoom/2008\" \
         Format=\"{format}\" Overlap=\"{overlap}\" TileSize=\"{tile_size}\">\n\
         \t<Size Width=\"{}\" Height=\"{}\"/>\n\
         </Image>\n",
        info.width, info.height
    )
}
