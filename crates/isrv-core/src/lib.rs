// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Data model shared across the request pipeline: identifiers, request
//! parameters, resolved operation lists, source metadata, request context,
//! and sessions.
//!
//! If you only take one dependency from this workspace, take this one.

/// Per-request mutable context threaded through the handler pipeline.
pub mod context;
/// Output format registry.
pub mod format;
/// Identifiers and meta-identifiers.
pub mod identifier;
/// Source image metadata (`info.json` / DZI descriptor contents).
pub mod info;
/// Resolved, source-size-independent operation lists.
pub mod operation;
/// Region/size/rotation/quality request parameters.
pub mod params;
/// In-memory, TTL-bounded session store.
pub mod session;

pub use context::{ContextFields, RequestContext};
pub use format::{Format, lookup as lookup_format, resolve_writable as resolve_writable_format};
pub use identifier::{Identifier, IdentifierDelegate, MetaIdentifier, ScaleConstraint};
pub use info::{Info, InfoMetadata, Orientation};
pub use operation::{Operation, OperationList};
pub use params::{ApiVersion, Quality, Region, Rotation, Size, SizeKind};
pub use session::{Session, SessionStore, generate_session_id};

/// Current contract version embedded in `info.json`'s `@context`/`context`
/// negotiation and in diagnostic logs.
pub const CONTRACT_VERSION: &str = "isrv/v1";
