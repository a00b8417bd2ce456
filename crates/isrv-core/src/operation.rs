//! Operation lists: the resolved, source-size-independent pipeline derived
//! from request [`Parameters`](crate::params).

use crate::identifier::{MetaIdentifier, ScaleConstraint};
use crate::params::{Quality, Region, Rotation, Size, SizeKind};
use isrv_error::{ErrorCode, ServerError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single step in a resolved processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Crop to a pixel-space box relative to the full source.
    Crop { x: u32, y: u32, w: u32, h: u32 },
    /// Scale the (possibly cropped) region to an exact pixel size.
    Scale { w: u32, h: u32 },
    /// Flip horizontally.
    Transpose,
    /// Rotate clockwise by these degrees.
    Rotate { degrees: f64 },
    /// Apply a quality/color transform.
    ColorTransform(Quality),
    /// Encode to the named output format.
    Encode { format: String },
}

/// A fully resolved, ordered pipeline plus the identifier it applies to.
///
/// No-op steps (a region covering the whole image, a size matching the
/// region's native size, zero-degree unmirrored rotation, default quality)
/// are never materialized: building a list for an all-defaults request
/// yields a list containing only an [`Operation::Encode`] step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationList {
    /// Originating meta-identifier.
    pub meta_identifier: MetaIdentifier,
    /// Ordered, resolved pipeline steps.
    pub operations: Vec<Operation>,
}

impl OperationList {
    /// Resolve [`Parameters`](crate::params) against a source's natural
    /// pixel size into an ordered [`OperationList`].
    ///
    /// Lowering order is fixed: `Crop`, `Scale`, `Transpose`, `Rotate`,
    /// `ColorTransform`, `Encode`. Each step is omitted when it would be a
    /// no-op, so two requests that resolve to the same effective transform
    /// (e.g. `0,0,800,600` vs `full` against an 800x600 source) produce
    /// byte-identical operation lists and therefore identical fingerprints.
    pub fn build(
        meta_identifier: MetaIdentifier,
        region: Region,
        size: Size,
        rotation: Rotation,
        quality: Quality,
        format: &str,
        source_w: u32,
        source_h: u32,
    ) -> Result<Self, ServerError> {
        if source_w == 0 || source_h == 0 {
            return Err(ServerError::new(
                ErrorCode::OperationNotResolvable,
                "source has zero-area dimensions",
            ));
        }

        let mut operations = Vec::new();

        let (rx, ry, rw, rh) = resolve_region(region, source_w, source_h)?;
        if !(rx == 0 && ry == 0 && rw == source_w && rh == source_h) {
            operations.push(Operation::Crop { x: rx, y: ry, w: rw, h: rh });
        }

        let (sw, sh) = resolve_size(size, rw, rh)?;
        let (sw, sh) = match meta_identifier.scale_constraint {
            Some(sc) => apply_scale_constraint(sw, sh, sc)?,
            None => (sw, sh),
        };
        if !(sw == rw && sh == rh) {
            operations.push(Operation::Scale { w: sw, h: sh });
        }

        if rotation.mirror {
            operations.push(Operation::Transpose);
        }
        if rotation.degrees != 0.0 {
            operations.push(Operation::Rotate { degrees: rotation.degrees });
        }

        if quality != Quality::Default && quality != Quality::Native {
            operations.push(Operation::ColorTransform(quality));
        }

        if format.is_empty() {
            return Err(ServerError::new(ErrorCode::UnknownFormat, "empty format"));
        }
        operations.push(Operation::Encode { format: format.to_string() });

        Ok(Self { meta_identifier, operations })
    }

    /// A stable, content-addressed fingerprint of this operation list.
    ///
    /// Used to detect two in-flight requests that resolve to the same
    /// cache variant, so a concurrent second build can be short-circuited
    /// into waiting on the first rather than duplicating work.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).expect("operation list is always serializable");
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Multiply a resolved size by a meta-identifier's scale constraint
/// (`n/d`), erroring if the constrained result would be under 1 pixel on
/// either axis.
fn apply_scale_constraint(w: u32, h: u32, sc: ScaleConstraint) -> Result<(u32, u32), ServerError> {
    let factor = sc.factor();
    let cw = (f64::from(w) * factor).round() as u32;
    let ch = (f64::from(h) * factor).round() as u32;
    if cw == 0 || ch == 0 {
        return Err(ServerError::new(
            ErrorCode::InvalidSize,
            "scale constraint reduces the requested size below 1 pixel",
        ));
    }
    Ok((cw, ch))
}

fn resolve_region(region: Region, source_w: u32, source_h: u32) -> Result<(u32, u32, u32, u32), ServerError> {
    match region {
        Region::Full => Ok((0, 0, source_w, source_h)),
        Region::Square => {
            let side = source_w.min(source_h);
            let x = (source_w - side) / 2;
            let y = (source_h - side) / 2;
            Ok((x, y, side, side))
        }
        Region::Pixels { x, y, w, h } => clamp_pixel_region(x, y, w, h, source_w, source_h),
        Region::Percent { x, y, w, h } => {
            if !(0.0..=100.0).contains(&x) || !(0.0..=100.0).contains(&y) || w <= 0.0 || h <= 0.0 {
                return Err(ServerError::new(ErrorCode::InvalidRegion, "percent region out of range"));
            }
            let px = (x / 100.0 * f64::from(source_w)).round() as u32;
            let py = (y / 100.0 * f64::from(source_h)).round() as u32;
            let pw = (w / 100.0 * f64::from(source_w)).round().max(1.0) as u32;
            let ph = (h / 100.0 * f64::from(source_h)).round().max(1.0) as u32;
            clamp_pixel_region(px, py, pw, ph, source_w, source_h)
        }
    }
}

fn clamp_pixel_region(x: u32, y: u32, w: u32, h: u32, source_w: u32, source_h: u32) -> Result<(u32, u32, u32, u32), ServerError> {
    if x >= source_w || y >= source_h {
        return Err(ServerError::new(
            ErrorCode::InvalidRegion,
            "region origin lies outside the source image",
        ));
    }
    let w = w.min(source_w - x);
    let h = h.min(source_h - y);
    if w == 0 || h == 0 {
        return Err(ServerError::new(ErrorCode::InvalidRegion, "region has zero area after clamping"));
    }
    Ok((x, y, w, h))
}

fn resolve_size(size: Size, region_w: u32, region_h: u32) -> Result<(u32, u32), ServerError> {
    let (w, h) = match size.kind {
        SizeKind::Max | SizeKind::Full => (region_w, region_h),
        SizeKind::Width(w) => {
            let h = (f64::from(w) * f64::from(region_h) / f64::from(region_w)).round() as u32;
            (w, h.max(1))
        }
        SizeKind::Height(h) => {
            let w = (f64::from(h) * f64::from(region_w) / f64::from(region_h)).round() as u32;
            (w.max(1), h)
        }
        SizeKind::Percent(p) => {
            let w = (f64::from(region_w) * p / 100.0).round().max(1.0) as u32;
            let h = (f64::from(region_h) * p / 100.0).round().max(1.0) as u32;
            (w, h)
        }
        SizeKind::Absolute(w, h) => (w, h),
        SizeKind::FitInside(max_w, max_h) => {
            let scale = (f64::from(max_w) / f64::from(region_w)).min(f64::from(max_h) / f64::from(region_h));
            let w = (f64::from(region_w) * scale).round().max(1.0) as u32;
            let h = (f64::from(region_h) * scale).round().max(1.0) as u32;
            (w, h)
        }
    };

    if !size.upscale && (w > region_w || h > region_h) {
        return Err(ServerError::new(
            ErrorCode::InvalidSize,
            "resolved size exceeds region's native resolution and upscaling was not requested",
        ));
    }
    if w == 0 || h == 0 {
        return Err(ServerError::new(ErrorCode::InvalidSize, "resolved size has zero area"));
    }
    Ok((w, h))
}
