//! Unified error taxonomy with stable error codes for the image server.
//!
//! Every error raised by the request pipeline carries an [`ErrorCode`] (a
//! machine-readable, stable string tag), a human-readable message, an
//! optional cause chain, and arbitrary key-value context. Use the builder
//! returned by [`ServerError::new`] to construct errors fluently. Each code
//! belongs to one [`ErrorCategory`], and each category maps to exactly one
//! HTTP status via [`ErrorCategory::status_code`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to, and the HTTP status it is
/// rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or unresolvable request parameter.
    ClientArgument,
    /// `authorize*` hook returned the "unauthenticated" marker.
    Unauthenticated,
    /// `authorize*` hook denied the request outright.
    Forbidden,
    /// Router miss or source-not-present.
    NotFound,
    /// HTTP method not in the matched resource's route set.
    MethodNotAllowed,
    /// Request URI exceeded the configured length ceiling.
    UriTooLong,
    /// Requested output format is unknown or cannot be written.
    UnsupportedFormat,
    /// Catch-all for decoder/encoder/cache-backend failures.
    Internal,
}

impl ErrorCategory {
    /// The single HTTP status code this category is always rendered as.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ClientArgument => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::UriTooLong => 414,
            Self::UnsupportedFormat => 415,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientArgument => "client_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::UriTooLong => "uri_too_long",
            Self::UnsupportedFormat => "unsupported_format",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serializes to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- ClientArgument --
    /// Region token failed to parse or resolved to a zero-area/out-of-bounds box.
    InvalidRegion,
    /// Size token failed to parse or resolved to a non-positive magnitude.
    InvalidSize,
    /// Rotation token is out of `[0, 360]` or non-numeric.
    InvalidRotation,
    /// Quality token is not one of the known per-version values.
    InvalidQuality,
    /// Meta-identifier could not be parsed (bad scale constraint, empty identifier, ...).
    InvalidIdentifier,
    /// Operation list could not be resolved against the source's actual size.
    OperationNotResolvable,
    /// Requested page index is `>= page_count`.
    InvalidPageIndex,

    // -- Unauthenticated --
    /// `authorize*` returned the unauthenticated marker.
    Unauthenticated,

    // -- Forbidden --
    /// `authorize_before_access()` or `authorize()` denied the request.
    AuthorizationDenied,
    /// `restrict_to_sizes` is enabled and the resolved size is not advertised.
    SizeNotAllowed,

    // -- NotFound --
    /// The identifier does not resolve to an existing source.
    SourceNotFound,
    /// No route matched the request path.
    RouteNotFound,
    /// Deep Zoom tile level/col/row exceeds the pyramid's extent.
    TileOutOfRange,

    // -- MethodNotAllowed --
    /// HTTP method is not registered for the matched resource.
    MethodNotAllowed,

    // -- UriTooLong --
    /// Request URI exceeded 1024 bytes (API v1).
    UriTooLong,

    // -- UnsupportedFormat --
    /// Output format extension is not registered.
    UnknownFormat,
    /// Output format is registered but has no writable encoder.
    FormatNotWritable,

    // -- Internal --
    /// Decoder failed to read pixels from the source.
    DecoderFailure,
    /// Encoder failed to produce output bytes.
    EncoderFailure,
    /// Declared source format did not match file magic; recoverable by retry
    /// with the sniffed format. Surfaces as `Internal` only if the retry
    /// also fails.
    SourceFormatMismatch,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRegion
            | Self::InvalidSize
            | Self::InvalidRotation
            | Self::InvalidQuality
            | Self::InvalidIdentifier
            | Self::OperationNotResolvable
            | Self::InvalidPageIndex => ErrorCategory::ClientArgument,

            Self::Unauthenticated => ErrorCategory::Unauthenticated,

            Self::AuthorizationDenied | Self::SizeNotAllowed => ErrorCategory::Forbidden,

            Self::SourceNotFound | Self::RouteNotFound | Self::TileOutOfRange => {
                ErrorCategory::NotFound
            }

            Self::MethodNotAllowed => ErrorCategory::MethodNotAllowed,

            Self::UriTooLong => ErrorCategory::UriTooLong,

            Self::UnknownFormat | Self::FormatNotWritable => ErrorCategory::UnsupportedFormat,

            Self::DecoderFailure
            | Self::EncoderFailure
            | Self::SourceFormatMismatch
            | Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Shorthand for `self.category().status_code()`.
    pub fn status_code(&self) -> u16 {
        self.category().status_code()
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"INVALID_REGION"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRegion => "INVALID_REGION",
            Self::InvalidSize => "INVALID_SIZE",
            Self::InvalidRotation => "INVALID_ROTATION",
            Self::InvalidQuality => "INVALID_QUALITY",
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::OperationNotResolvable => "OPERATION_NOT_RESOLVABLE",
            Self::InvalidPageIndex => "INVALID_PAGE_INDEX",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::AuthorizationDenied => "AUTHORIZATION_DENIED",
            Self::SizeNotAllowed => "SIZE_NOT_ALLOWED",
            Self::SourceNotFound => "SOURCE_NOT_FOUND",
            Self::RouteNotFound => "ROUTE_NOT_FOUND",
            Self::TileOutOfRange => "TILE_OUT_OF_RANGE",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::UriTooLong => "URI_TOO_LONG",
            Self::UnknownFormat => "UNKNOWN_FORMAT",
            Self::FormatNotWritable => "FORMAT_NOT_WRITABLE",
            Self::DecoderFailure => "DECODER_FAILURE",
            Self::EncoderFailure => "ENCODER_FAILURE",
            Self::SourceFormatMismatch => "SOURCE_FORMAT_MISMATCH",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ServerError
// ---------------------------------------------------------------------------

/// Unified request-pipeline error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use isrv_error::{ServerError, ErrorCode};
///
/// let err = ServerError::new(ErrorCode::InvalidRegion, "region out of bounds")
///     .with_context("x", 4096)
///     .with_context("image_width", 2048);
/// ```
pub struct ServerError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl ServerError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialization
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Shorthand for `self.code.status_code()`.
    pub fn status_code(&self) -> u16 {
        self.code.status_code()
    }

    /// Convenience constructor for [`ErrorCode::InvalidRegion`] and friends,
    /// covering the common "parser/validator rejected this value" path.
    pub fn illegal_argument(code: ErrorCode, message: impl Into<String>) -> Self {
        debug_assert_eq!(code.category(), ErrorCategory::ClientArgument);
        Self::new(code, message)
    }

    /// Convenience constructor for a source-not-found condition.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SourceNotFound, message)
    }

    /// Convenience constructor for an authorization denial.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthorizationDenied, message)
    }

    /// Convenience constructor for an opaque internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Debug for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ServerError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serializable snapshot of a [`ServerError`] (without the opaque source),
/// used for the JSON error envelope described in the content-negotiation
/// rules for error bodies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerErrorDto {
    /// HTTP status this error renders as.
    pub status: u16,
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_message: Option<String>,
}

impl From<&ServerError> for ServerErrorDto {
    fn from(err: &ServerError) -> Self {
        Self {
            status: err.status_code(),
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::InvalidRegion,
        ErrorCode::InvalidSize,
        ErrorCode::InvalidRotation,
        ErrorCode::InvalidQuality,
        ErrorCode::InvalidIdentifier,
        ErrorCode::OperationNotResolvable,
        ErrorCode::InvalidPageIndex,
        ErrorCode::Unauthenticated,
        ErrorCode::AuthorizationDenied,
        ErrorCode::SizeNotAllowed,
        ErrorCode::SourceNotFound,
        ErrorCode::RouteNotFound,
        ErrorCode::TileOutOfRange,
        ErrorCode::MethodNotAllowed,
        ErrorCode::UriTooLong,
        ErrorCode::UnknownFormat,
        ErrorCode::FormatNotWritable,
        ErrorCode::DecoderFailure,
        ErrorCode::EncoderFailure,
        ErrorCode::SourceFormatMismatch,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = ServerError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = ServerError::new(ErrorCode::SourceNotFound, "no such source");
        assert_eq!(err.to_string(), "[SOURCE_NOT_FOUND] no such source");
    }

    #[test]
    fn display_with_context() {
        let err = ServerError::new(ErrorCode::InvalidRegion, "bad region")
            .with_context("x", 4096);
        let s = err.to_string();
        assert!(s.starts_with("[INVALID_REGION] bad region"));
        assert!(s.contains("4096"));
    }

    #[test]
    fn status_codes_match_table() {
        assert_eq!(ErrorCode::InvalidRegion.status_code(), 400);
        assert_eq!(ErrorCode::Unauthenticated.status_code(), 401);
        assert_eq!(ErrorCode::AuthorizationDenied.status_code(), 403);
        assert_eq!(ErrorCode::SourceNotFound.status_code(), 404);
        assert_eq!(ErrorCode::MethodNotAllowed.status_code(), 405);
        assert_eq!(ErrorCode::UriTooLong.status_code(), 414);
        assert_eq!(ErrorCode::UnknownFormat.status_code(), 415);
        assert_eq!(ErrorCode::Internal.status_code(), 500);
    }

    #[test]
    fn debug_with_source() {
        let src = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let err = ServerError::new(ErrorCode::SourceNotFound, "missing").with_source(src);
        let dbg = format!("{err:?}");
        assert!(dbg.contains("source"));
        assert!(dbg.contains("file missing"));
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()));
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let expected = format!(r#""{}""#, code.as_str());
            assert_eq!(json, expected, "mismatch for {code:?}");
        }
    }

    #[test]
    fn dto_roundtrip_without_source() {
        let err = ServerError::new(ErrorCode::InvalidPageIndex, "page out of range")
            .with_context("page", 9);
        let dto: ServerErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: ServerErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
        assert!(back.source_message.is_none());
        assert_eq!(dto.status, 400);
    }

    #[test]
    fn std_error_source_chain() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "not found");
        let err = ServerError::new(ErrorCode::DecoderFailure, "decode").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "not found");
    }

    #[test]
    fn convenience_constructors() {
        assert_eq!(ServerError::not_found("x").code, ErrorCode::SourceNotFound);
        assert_eq!(ServerError::forbidden("x").code, ErrorCode::AuthorizationDenied);
        assert_eq!(ServerError::internal("x").code, ErrorCode::Internal);
    }
}
