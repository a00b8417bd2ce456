// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Three-tier cache facade for the image server: an in-process heap cache
//! for [`isrv_core::Info`], a configurable info-cache backend, and a
//! configurable variant-cache backend for encoded image bytes.

/// Pluggable backend traits plus in-memory reference implementations.
pub mod backend;
/// The public [`CacheFacade`] composing all three tiers.
pub mod facade;
/// Bounded in-process `Info` cache.
pub mod heap;

pub use backend::{InMemoryInfoCache, InMemoryVariantCache, InfoCacheBackend, VariantCacheBackend};
pub use facade::{CacheFacade, CacheFacadeOptions, VariantWriteGuard};
pub use heap::HeapInfoCache;
