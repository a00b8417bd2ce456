//! The per-request context: a live, mutable view of request state threaded
//! through parsing, authorization, and the image handler's state machine,
//! and exposed as a read-only map to delegate callbacks.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mutable fields backing a [`RequestContext`].
///
/// Every field is optional because it is populated incrementally as the
/// request progresses through the handler pipeline; a delegate callback
/// invoked early (e.g. pre-authorization) sees only what has been filled in
/// so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextFields {
    pub client_ip: Option<String>,
    pub cookies: BTreeMap<String, String>,
    pub full_size: Option<(u32, u32)>,
    pub identifier: Option<String>,
    pub local_uri: Option<String>,
    pub metadata: Option<Value>,
    pub operations: Option<Vec<String>>,
    pub output_format: Option<String>,
    pub page_count: Option<u32>,
    pub page_number: Option<u32>,
    pub request_headers: BTreeMap<String, String>,
    pub request_uri: Option<String>,
    pub resource_class: Option<String>,
    pub resulting_size: Option<(u32, u32)>,
    pub scale_constraint: Option<(u32, u32)>,
}

/// A live, shared view over a request's [`ContextFields`].
///
/// Cloning a [`RequestContext`] clones the handle, not the data: all clones
/// observe writes made through any of them. This lets a handler populate
/// fields as it learns them (resolved size, chosen operations, ...) while a
/// delegate holding an earlier clone of the context sees the update without
/// any re-wiring.
#[derive(Debug, Clone, Default)]
pub struct RequestContext(Arc<RwLock<ContextFields>>);

impl RequestContext {
    /// Construct an empty context.
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(ContextFields::default())))
    }

    /// Run `f` against a read-only snapshot of the current fields.
    pub fn with<R>(&self, f: impl FnOnce(&ContextFields) -> R) -> R {
        let guard = self.0.read().expect("request context lock poisoned");
        f(&guard)
    }

    /// Run `f` against a mutable view of the fields, persisting any changes.
    pub fn update(&self, f: impl FnOnce(&mut ContextFields)) {
        let mut guard = self.0.write().expect("request context lock poisoned");
        f(&mut guard);
    }

    /// Snapshot the current fields as a JSON object, suitable for handing to
    /// a delegate callback.
    pub fn as_map(&self) -> Value {
        let guard = self.0.read().expect("request context lock poisoned");
        serde_json::to_value(&*guard).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        ctx.update(|f| f.identifier = Some("foo".into()));
        clone.with(|f| assert_eq!(f.identifier.as_deref(), Some("foo")));
    }

    #[test]
    fn as_map_reflects_updates() {
        let ctx = RequestContext::new();
        ctx.update(|f| {
            f.full_size = Some((800, 600));
            f.page_number = Some(2);
        });
        let map = ctx.as_map();
        assert_eq!(map["page_number"], 2);
        assert_eq!(map["full_size"], serde_json::json!([800, 600]));
    }

    #[test]
    fn defaults_are_empty() {
        let ctx = RequestContext::new();
        ctx.with(|f| {
            assert!(f.identifier.is_none());
            assert!(f.cookies.is_empty());
        });
    }
}
