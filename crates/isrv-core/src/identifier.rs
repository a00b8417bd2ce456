//! Identifiers and meta-identifiers.
//!
//! An [`Identifier`] is an opaque, server-facing key for a source image. A
//! [`MetaIdentifier`] bundles an identifier with an optional page number and
//! scale constraint, serialized on the wire as `identifier[;page][;n:d]`.

use isrv_error::{ErrorCode, ServerError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, server-facing key for a source image.
///
/// May contain `/`; callers are responsible for percent-encoding it on the
/// wire. See [`IdentifierDelegate`] for the slash-substitution indirection
/// used when a deployment's path delimiter conflicts with identifier
/// slashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap a raw identifier string. Does not perform any decoding.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the identifier's underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Rewrites an [`Identifier`] for inclusion in a public URI.
///
/// Default rewriting replaces literal `/` with the configured slash
/// substitute; a delegate MAY override this entirely (e.g. to reverse a
/// public-identifier mapping installed behind `X-IIIF-ID`).
pub trait IdentifierDelegate {
    /// Configured slash-substitute string, or `None` if slashes pass through
    /// unmodified.
    fn slash_substitute(&self) -> Option<&str>;

    /// Rewrite `identifier` for embedding in a response-visible URI.
    fn rewrite_for_uri(&self, identifier: &Identifier) -> String {
        match self.slash_substitute() {
            Some(sub) if !sub.is_empty() => identifier.as_str().replace('/', sub),
            _ => identifier.as_str().to_string(),
        }
    }
}

/// A reduced fraction `n:d` with `0 < n <= d`, limiting the accessible
/// resolution of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleConstraint {
    /// Numerator.
    pub numerator: u32,
    /// Denominator.
    pub denominator: u32,
}

impl ScaleConstraint {
    /// Construct a constraint, validating `0 < numerator <= denominator`.
    pub fn new(numerator: u32, denominator: u32) -> Result<Self, ServerError> {
        if numerator == 0 || denominator == 0 || numerator > denominator {
            return Err(ServerError::new(
                ErrorCode::InvalidIdentifier,
                format!("invalid scale constraint {numerator}:{denominator}"),
            ));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Reduce by the greatest common divisor, then return `None` if the
    /// result is `n == d` (an equivalent-to-absent constraint).
    ///
    /// This is the normalization rule used by [`MetaIdentifier::normalize`]:
    /// non-reduced fractions like `2:4` become `1:2`, and `n:n` constraints
    /// (including `1:1`) are dropped entirely.
    pub fn normalize(self) -> Option<Self> {
        let g = gcd(self.numerator, self.denominator);
        let (n, d) = (self.numerator / g, self.denominator / g);
        if n == d { None } else { Some(Self { numerator: n, denominator: d }) }
    }

    /// The constraint as a floating-point factor `n/d`.
    pub fn factor(&self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }
}

impl fmt::Display for ScaleConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.numerator, self.denominator)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a.max(1) } else { gcd(b, a % b) }
}

/// `(identifier, page_number?, scale_constraint?)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaIdentifier {
    /// The underlying source identifier.
    pub identifier: Identifier,
    /// Zero-based page number for multi-page sources.
    pub page: Option<u32>,
    /// Scale constraint limiting the accessible resolution.
    pub scale_constraint: Option<ScaleConstraint>,
}

impl MetaIdentifier {
    /// Construct a meta-identifier with no page or scale constraint.
    pub fn bare(identifier: impl Into<Identifier>) -> Self {
        Self {
            identifier: identifier.into(),
            page: None,
            scale_constraint: None,
        }
    }

    /// Parse `identifier[;page][;n:d]` into a [`MetaIdentifier`].
    ///
    /// `;` segments after the identifier are tried in order: a bare integer
    /// is a page number, an `n:d` pair is a scale constraint. At most one of
    /// each may appear.
    pub fn parse(s: &str) -> Result<Self, ServerError> {
        let mut parts = s.split(';');
        let identifier = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ServerError::new(ErrorCode::InvalidIdentifier, "empty identifier")
            })?;

        let mut page = None;
        let mut scale_constraint = None;
        for segment in parts {
            if let Some((n_str, d_str)) = segment.split_once(':') {
                let n: u32 = n_str.parse().map_err(|_| {
                    ServerError::new(
                        ErrorCode::InvalidIdentifier,
                        format!("invalid scale constraint numerator: {n_str}"),
                    )
                })?;
                let d: u32 = d_str.parse().map_err(|_| {
                    ServerError::new(
                        ErrorCode::InvalidIdentifier,
                        format!("invalid scale constraint denominator: {d_str}"),
                    )
                })?;
                if scale_constraint.is_some() {
                    return Err(ServerError::new(
                        ErrorCode::InvalidIdentifier,
                        "duplicate scale constraint segment",
                    ));
                }
                scale_constraint = Some(ScaleConstraint::new(n, d)?);
            } else {
                let p: u32 = segment.parse().map_err(|_| {
                    ServerError::new(
                        ErrorCode::InvalidIdentifier,
                        format!("invalid page segment: {segment}"),
                    )
                })?;
                if page.is_some() {
                    return Err(ServerError::new(
                        ErrorCode::InvalidIdentifier,
                        "duplicate page segment",
                    ));
                }
                page = Some(p);
            }
        }

        Ok(Self {
            identifier: Identifier::new(identifier),
            page,
            scale_constraint,
        })
    }

    /// Serialize back to `identifier[;page][;n:d]`, *without* normalizing.
    pub fn serialize(&self) -> String {
        let mut out = self.identifier.as_str().to_string();
        if let Some(p) = self.page {
            out.push(';');
            out.push_str(&p.to_string());
        }
        if let Some(sc) = self.scale_constraint {
            out.push(';');
            out.push_str(&sc.to_string());
        }
        out
    }

    /// Rewrite `self.identifier` for inclusion in a public URI via `delegate`.
    pub fn for_uri(&self, delegate: &dyn IdentifierDelegate) -> String {
        let mut out = delegate.rewrite_for_uri(&self.identifier);
        if let Some(p) = self.page {
            out.push(';');
            out.push_str(&p.to_string());
        }
        if let Some(sc) = self.scale_constraint {
            out.push(';');
            out.push_str(&sc.to_string());
        }
        out
    }

    /// Normalize the scale constraint (reduce, drop if `n == d`).
    ///
    /// Returns the normalized copy and whether anything changed, which is
    /// exactly the condition under which a router must issue a 301 to the
    /// canonical form.
    pub fn normalize(&self) -> (Self, bool) {
        let normalized_sc = self.scale_constraint.and_then(ScaleConstraint::normalize);
        let changed = normalized_sc != self.scale_constraint;
        (
            Self {
                identifier: self.identifier.clone(),
                page: self.page,
                scale_constraint: normalized_sc,
            },
            changed,
        )
    }
}

impl fmt::Display for MetaIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_identifier() {
        let m = MetaIdentifier::parse("foo/bar.jpg").unwrap();
        assert_eq!(m.identifier.as_str(), "foo/bar.jpg");
        assert!(m.page.is_none());
        assert!(m.scale_constraint.is_none());
    }

    #[test]
    fn parse_with_page_and_scale_constraint() {
        let m = MetaIdentifier::parse("book;3;1:2").unwrap();
        assert_eq!(m.page, Some(3));
        assert_eq!(
            m.scale_constraint,
            Some(ScaleConstraint { numerator: 1, denominator: 2 })
        );
    }

    #[test]
    fn parse_rejects_empty_identifier() {
        assert!(MetaIdentifier::parse("").is_err());
        assert!(MetaIdentifier::parse(";3").is_err());
    }

    #[test]
    fn parse_rejects_inverted_scale_constraint() {
        assert!(MetaIdentifier::parse("x;3:1").is_err());
    }

    #[test]
    fn serialize_roundtrip() {
        let m = MetaIdentifier::parse("book;3;1:2").unwrap();
        assert_eq!(m.serialize(), "book;3;1:2");
    }

    #[test]
    fn normalize_drops_equal_fraction() {
        let m = MetaIdentifier::parse("x;1:1").unwrap();
        let (normalized, changed) = m.normalize();
        assert!(changed);
        assert!(normalized.scale_constraint.is_none());

        let m = MetaIdentifier::parse("x;2:2").unwrap();
        let (normalized, changed) = m.normalize();
        assert!(changed);
        assert!(normalized.scale_constraint.is_none());
    }

    #[test]
    fn normalize_reduces_fraction() {
        let m = MetaIdentifier::parse("x;2:4").unwrap();
        let (normalized, changed) = m.normalize();
        assert!(changed);
        assert_eq!(
            normalized.scale_constraint,
            Some(ScaleConstraint { numerator: 1, denominator: 2 })
        );
    }

    #[test]
    fn normalize_is_noop_for_already_reduced() {
        let m = MetaIdentifier::parse("x;1:3").unwrap();
        let (normalized, changed) = m.normalize();
        assert!(!changed);
        assert_eq!(normalized.scale_constraint, m.scale_constraint);
    }

    struct FixedDelegate(Option<String>);
    impl IdentifierDelegate for FixedDelegate {
        fn slash_substitute(&self) -> Option<&str> {
            self.0.as_deref()
        }
    }

    #[test]
    fn for_uri_substitutes_slashes() {
        let m = MetaIdentifier::bare("a/b/c");
        let delegate = FixedDelegate(Some("%2F".to_string()));
        assert_eq!(m.for_uri(&delegate), "a%2Fb%2Fc");
    }

    #[test]
    fn for_uri_passes_through_without_delegate_substitute() {
        let m = MetaIdentifier::bare("a/b/c");
        let delegate = FixedDelegate(None);
        assert_eq!(m.for_uri(&delegate), "a/b/c");
    }

    #[test]
    fn scale_constraint_factor() {
        let sc = ScaleConstraint::new(1, 2).unwrap();
        assert_eq!(sc.factor(), 0.5);
    }
}
