//! Marketplace page addressing.
//!
//! Pages follow the `/{kind}/{slug}/{numeric id}` path convention. The slug
//! is decorative; when unknown a placeholder segment still resolves.

use crate::catalog::EntityKind;

/// URL scheme to build page URLs with. The direct proxy transport talks
/// plain http to keep the proxy hop cheap; the gateway always gets https.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlScheme {
    Http,
    Https,
}

impl UrlScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlScheme::Http => "http",
            UrlScheme::Https => "https",
        }
    }
}

/// Reference to one marketplace page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub kind: EntityKind,
    pub external_id: i64,
    pub slug: Option<String>,
}

impl PageRef {
    pub fn new(kind: EntityKind, external_id: i64, slug: Option<&str>) -> Self {
        Self {
            kind,
            external_id,
            slug: slug.map(str::to_string),
        }
    }

    fn slug_segment(&self) -> &str {
        match self.slug.as_deref() {
            Some(slug) if !slug.is_empty() => slug,
            _ => "-",
        }
    }

    pub fn path(&self) -> String {
        format!(
            "/{}/{}/{}",
            self.kind.as_str(),
            self.slug_segment(),
            self.external_id
        )
    }

    pub fn url(&self, scheme: UrlScheme, host: &str) -> String {
        format!("{}://{}{}", scheme.as_str(), host, self.path())
    }
}

impl std::fmt::Display for PageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.external_id)
    }
}
