//! Deep Zoom (DZI) path grammar.
//!
//! Two shapes are recognized: the descriptor (`{identifier}.dzi`) and a
//! tile (`{identifier}_files/{level}/{column}_{row}.{format}`).

use isrv_core::MetaIdentifier;
use isrv_error::{ErrorCode, ServerError};

/// What a Deep Zoom path resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// `{identifier}.dzi`
    Descriptor,
    /// `{identifier}_files/{level}/{column}_{row}.{format}`
    Tile {
        /// Zero-based resolution level, counting down from the full-size
        /// level at the top of the pyramid.
        level: u32,
        /// Zero-based tile column.
        column: u32,
        /// Zero-based tile row.
        row: u32,
        /// Requested tile output format extension.
        format: String,
    },
}

/// Parse a path (with the endpoint prefix already stripped) into a
/// meta-identifier and the kind of Deep Zoom request it names.
pub fn parse_path(path: &str) -> Result<(MetaIdentifier, RequestKind), ServerError> {
    let path = path.trim_start_matches('/');

    if let Some(identifier) = path.strip_suffix(".dzi") {
        let meta_identifier = MetaIdentifier::parse(identifier)?;
        return Ok((meta_identifier, RequestKind::Descriptor));
    }

    let (prefix, rest) = path.split_once("_files/").ok_or_else(|| {
        ServerError::new(
            ErrorCode::RouteNotFound,
            format!("path does not match the Deep Zoom request grammar: {path}"),
        )
    })?;
    let meta_identifier = MetaIdentifier::parse(prefix)?;

    let (level_str, tile_str) = rest.split_once('/').ok_or_else(|| {
        ServerError::new(
            ErrorCode::RouteNotFound,
            format!("expected '{{level}}/{{column}}_{{row}}.{{format}}': {rest}"),
        )
    })?;
    let level: u32 = level_str.parse().map_err(|_| {
        ServerError::new(ErrorCode::RouteNotFound, format!("invalid tile level: {level_str}"))
    })?;

    let (coords, format) = tile_str.rsplit_once('.').ok_or_else(|| {
        ServerError::new(
            ErrorCode::RouteNotFound,
            format!("expected '{{column}}_{{row}}.{{format}}': {tile_str}"),
        )
    })?;
    let (col_str, row_str) = coords.split_once('_').ok_or_else(|| {
        ServerError::new(ErrorCode::RouteNotFound, format!("expected '{{column}}_{{row}}': {coords}"))
    })?;
    let column: u32 = col_str.parse().map_err(|_| {
        ServerError::new(ErrorCode::RouteNotFound, format!("invalid tile column: {col_str}"))
    })?;
    let row: u32 = row_str.parse().map_err(|_| {
        ServerError::new(ErrorCode::RouteNotFound, format!("invalid tile row: {row_str}"))
    })?;

    Ok((
        meta_identifier,
        RequestKind::Tile { level, column, row, format: format.to_string() },
    ))
}

/// Validate `(level, column, row)` against a pyramid of `num_resolutions`
/// levels and `(full_w, full_h)` native size, tiled in `(tile_w, tile_h)`
/// pieces.
pub fn check_tile_in_range(
    level: u32,
    column: u32,
    row: u32,
    num_resolutions: u32,
    full_w: u32,
    full_h: u32,
    tile_w: u32,
    tile_h: u32,
) -> Result<(), ServerError> {
    if level >= num_resolutions {
        return Err(ServerError::new(
            ErrorCode::TileOutOfRange,
            format!("level {level} exceeds pyramid depth {num_resolutions}"),
        ));
    }
    let scale_down = 1u32 << (num_resolutions - 1 - level);
    let level_w = full_w.div_ceil(scale_down);
    let level_h = full_h.div_ceil(scale_down);
    let max_col = level_w.div_ceil(tile_w).saturating_sub(1);
    let max_row = level_h.div_ceil(tile_h).saturating_sub(1);
    if column > max_col || row > max_row {
        return Err(ServerError::new(
            ErrorCode::TileOutOfRange,
            format!("tile ({column}, {row}) out of range for level {level}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descriptor() {
        let (id, kind) = parse_path("foo.dzi").unwrap();
        assert_eq!(id.identifier.as_str(), "foo");
        assert_eq!(kind, RequestKind::Descriptor);
    }

    #[test]
    fn parses_tile() {
        let (id, kind) = parse_path("foo_files/3/1_2.jpg").unwrap();
        assert_eq!(id.identifier.as_str(), "foo");
        assert_eq!(kind, RequestKind::Tile { level: 3, column: 1, row: 2, format: "jpg".into() });
    }

    #[test]
    fn rejects_malformed_tile() {
        assert!(parse_path("foo_files/3/1-2.jpg").is_err());
        assert!(parse_path("foo_files/three/1_2.jpg").is_err());
        assert!(parse_path("foo_files/3/1_2").is_err());
    }

    #[test]
    fn tile_range_check_rejects_bad_level() {
        let err = check_tile_in_range(5, 0, 0, 4, 800, 600, 254, 254).unwrap_err();
        assert_eq!(err.code, ErrorCode::TileOutOfRange);
    }

    #[test]
    fn tile_range_check_accepts_top_level_single_tile() {
        assert!(check_tile_in_range(3, 0, 0, 4, 800, 600, 254, 254).is_ok());
    }

    #[test]
    fn tile_range_check_rejects_column_past_edge() {
        // Full-resolution level 3 of a 4-level pyramid over an 800x600 source
        // tiled at 254px needs ceil(800/254)=4 columns, so column index 4 is
        // out of range.
        let err = check_tile_in_range(3, 4, 0, 4, 800, 600, 254, 254).unwrap_err();
        assert_eq!(err.code, ErrorCode::TileOutOfRange);
    }
}
