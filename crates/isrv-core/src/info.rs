//! Source image metadata, as surfaced to clients through the Information
//! Request (`info.json` / DZI descriptor) and consumed internally to
//! resolve request parameters against a source's actual dimensions.

use crate::identifier::Identifier;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// EXIF-derived orientation correction applied before any requested
/// rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Orientation {
    /// No correction needed.
    Rotate0,
    /// Source pixels are physically rotated 90 degrees clockwise.
    Rotate90,
    /// Source pixels are physically rotated 180 degrees.
    Rotate180,
    /// Source pixels are physically rotated 270 degrees clockwise.
    Rotate270,
}

/// Auxiliary descriptive metadata beyond raw dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InfoMetadata {
    /// EXIF orientation, if the decoder could determine one.
    pub orientation: Option<Orientation>,
}

/// Everything known about a source image, independent of any particular
/// request's region/size/rotation/quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Info {
    /// The source's identifier.
    pub identifier: Identifier,
    /// Native width in pixels.
    pub width: u32,
    /// Native height in pixels.
    pub height: u32,
    /// Tile width, if the source is internally tiled.
    pub tile_width: Option<u32>,
    /// Tile height, if the source is internally tiled.
    pub tile_height: Option<u32>,
    /// Number of power-of-two resolution levels available below native
    /// resolution (for pyramidal sources; `0` for flat ones).
    pub num_resolutions: u32,
    /// Canonical source format extension (e.g. `"tif"`).
    pub format: String,
    /// Auxiliary metadata.
    pub metadata: InfoMetadata,
    /// Number of pages/sub-images for multi-page sources (`1` otherwise).
    pub page_count: u32,
}

impl Info {
    /// Construct an [`Info`] for a flat, single-page, untiled source.
    pub fn flat(identifier: impl Into<Identifier>, width: u32, height: u32, format: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            width,
            height,
            tile_width: None,
            tile_height: None,
            num_resolutions: 0,
            format: format.into(),
            metadata: InfoMetadata::default(),
            page_count: 1,
        }
    }

    /// Whether this source is served pyramidally (has tiles and more than
    /// one resolution level).
    pub fn is_tiled(&self) -> bool {
        self.tile_width.is_some() && self.tile_height.is_some() && self.num_resolutions > 0
    }
}
