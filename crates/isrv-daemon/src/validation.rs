// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request-level helpers that sit outside any single API version's URI
//! grammar: the `cache` query directive and `Content-Disposition` filename
//! sanitation.

/// The `cache` query parameter recognized across all endpoint families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    /// No directive present: normal caching behavior.
    Default,
    /// `cache=nocache` or `cache=false`: omit `Cache-Control` from the
    /// response, but do not otherwise disturb the cache tiers.
    NoCache,
    /// `cache=recache`: re-populate the variant cache if it is enabled;
    /// behaves like [`Self::Default`] otherwise.
    Recache,
}

impl CacheDirective {
    /// Parse the raw `cache` query value, if present.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("nocache") | Some("false") => Self::NoCache,
            Some("recache") => Self::Recache,
            _ => Self::Default,
        }
    }

    /// Whether `Cache-Control` should be emitted for this directive.
    pub fn emits_cache_control(&self) -> bool {
        !matches!(self, Self::NoCache)
    }

    /// Whether a fresh render should bypass a variant-cache hit and
    /// overwrite the committed entry.
    pub fn forces_recache(&self) -> bool {
        matches!(self, Self::Recache)
    }
}

/// Strip everything but printable ASCII (minus quotes and path separators)
/// from a client-requested filename, for safe use in a `filename=`
/// parameter. Falls back to `"image"` if nothing usable survives.
pub fn sanitize_ascii_filename(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | '/' | '\\'))
        .collect();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

/// Percent-encode `raw` per RFC 5987 for use in a `filename*=UTF-8''...`
/// extended parameter. Only unreserved characters pass through unescaped.
pub fn percent_encode_rfc5987(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Build a full `Content-Disposition` header value for `disposition`
/// (`"inline"` or `"attachment"`) from a client-requested filename. Appends
/// a `filename*=` parameter whenever sanitation changed the name, so
/// non-ASCII requests still round-trip for clients that honor RFC 5987.
pub fn content_disposition(disposition: &str, requested_filename: &str) -> String {
    let ascii = sanitize_ascii_filename(requested_filename);
    let mut value = format!("{disposition}; filename=\"{ascii}\"");
    if ascii != requested_filename {
        value.push_str(&format!(
            "; filename*=UTF-8''{}",
            percent_encode_rfc5987(requested_filename)
        ));
    }
    value
}
