//! Output format registry.

use isrv_error::{ErrorCode, ServerError};

/// A format the server knows how to decode and/or encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// Canonical lowercase extension, e.g. `"jpg"`.
    pub extension: &'static str,
    /// IANA media type, e.g. `"image/jpeg"`.
    pub media_type: &'static str,
    /// Whether sources in this format can be decoded.
    pub readable: bool,
    /// Whether variants can be encoded to this format.
    pub writable: bool,
}

const FORMATS: &[Format] = &[
    Format { extension: "jpg", media_type: "image/jpeg", readable: true, writable: true },
    Format { extension: "tif", media_type: "image/tiff", readable: true, writable: true },
    Format { extension: "png", media_type: "image/png", readable: true, writable: true },
    Format { extension: "gif", media_type: "image/gif", readable: true, writable: true },
    Format { extension: "jp2", media_type: "image/jp2", readable: true, writable: false },
    Format { extension: "pdf", media_type: "application/pdf", readable: true, writable: false },
    Format { extension: "webp", media_type: "image/webp", readable: true, writable: true },
];

/// Look up a known [`Format`] by its extension (case-insensitive).
///
/// Aliases `"jpeg"` to `"jpg"` and `"tiff"` to `"tif"`, matching the
/// canonical extensions accepted in format-suffix positions.
pub fn lookup(extension: &str) -> Option<&'static Format> {
    let normalized = match extension.to_ascii_lowercase().as_str() {
        "jpeg" => "jpg".to_string(),
        "tiff" => "tif".to_string(),
        other => other.to_string(),
    };
    FORMATS.iter().find(|f| f.extension == normalized)
}

/// Resolve a format extension, erroring with [`ErrorCode::UnknownFormat`] if
/// unrecognized and [`ErrorCode::FormatNotWritable`] if it cannot be used as
/// an output encoding.
pub fn resolve_writable(extension: &str) -> Result<&'static Format, ServerError> {
    let format = lookup(extension).ok_or_else(|| {
        ServerError::new(
            ErrorCode::UnknownFormat,
            format!("unrecognized format: {extension}"),
        )
    })?;
    if !format.writable {
        return Err(ServerError::new(
            ErrorCode::FormatNotWritable,
            format!("format not writable: {extension}"),
        ));
    }
    Ok(format)
}
