// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! URI grammar for IIIF Image API v1/v2/v3 and Deep Zoom requests.
//!
//! This crate is pure path grammar: it has no knowledge of endpoint
//! prefixes, slash substitution, or HTTP framing. Callers strip the
//! endpoint-specific prefix (`/iiif/2`, `/dzi`, ...) and percent-decode
//! path segments before handing a path to [`iiif::parse_path`] or
//! [`deepzoom::parse_path`].

/// Deep Zoom (DZI) descriptor and tile path grammar.
pub mod deepzoom;
/// IIIF Image API v1/v2/v3 path grammar.
pub mod iiif;

pub use deepzoom::RequestKind as DeepZoomRequestKind;
pub use iiif::{ImageRequest, RequestKind as IiifRequestKind};
