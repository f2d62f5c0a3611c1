//! Asset discovery
//!
//! Parses the fetched document and collects references to images,
//! stylesheets, and scripts worth retrieving. Parsing is best-effort:
//! malformed fragments are skipped, never fatal. The produced set is
//! deduplicated by resolved absolute URL and kept in first-seen document
//! order so asset processing is reproducible across runs.

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use url::Url;

/// Category of a discovered asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Stylesheet,
    Script,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Stylesheet => "stylesheet",
            AssetKind::Script => "script",
        }
    }
}

/// A single asset reference discovered in the document
#[derive(Debug, Clone)]
pub struct AssetReference {
    /// Absolute URL, resolved against the page's effective base
    pub url: Url,
    /// What kind of asset the referencing element denotes
    pub kind: AssetKind,
    /// The attribute value exactly as written in the markup
    pub found_as: String,
    /// Deterministic local filename, unique within one capture
    pub local_name: String,
}

/// Extracts asset references from an HTML document
///
/// Collects `img[src]`, `script[src]`, and stylesheet `link[href]`
/// elements in document order, resolving each reference against `base_url`
/// (or an explicit `<base href>` when present). Data URIs and non-http(s)
/// schemes are skipped.
pub fn extract_assets(html: &str, base_url: &Url) -> Vec<AssetReference> {
    let document = Html::parse_document(html);
    let base = effective_base(&document, base_url);

    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    // One combined selector keeps discovery in document order across kinds.
    let selector = match Selector::parse("img[src], script[src], link[href]") {
        Ok(s) => s,
        Err(_) => return refs,
    };

    for element in document.select(&selector) {
        let (attr, kind) = match element.value().name() {
            "img" => ("src", AssetKind::Image),
            "script" => ("src", AssetKind::Script),
            "link" => {
                if !is_stylesheet(element.value().attr("rel")) {
                    continue;
                }
                ("href", AssetKind::Stylesheet)
            }
            _ => continue,
        };

        let Some(raw) = element.value().attr(attr) else {
            continue;
        };
        let Some(resolved) = resolve_reference(raw, &base) else {
            continue;
        };

        // Uniqueness by resolved absolute URL, first spelling wins
        if !seen.insert(resolved.to_string()) {
            continue;
        }

        let local_name = derive_local_name(&resolved, kind);
        refs.push(AssetReference {
            url: resolved,
            kind,
            found_as: raw.to_string(),
            local_name,
        });
    }

    refs
}

/// Resolves the document's effective base URL, honoring `<base href>`
fn effective_base(document: &Html, base_url: &Url) -> Url {
    if let Ok(selector) = Selector::parse("base[href]") {
        if let Some(element) = document.select(&selector).next() {
            if let Some(href) = element.value().attr("href") {
                if let Ok(joined) = base_url.join(href.trim()) {
                    return joined;
                }
            }
        }
    }
    base_url.clone()
}

fn is_stylesheet(rel: Option<&str>) -> bool {
    rel.is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
    })
}

/// Resolves a raw attribute value to an absolute fetchable URL
///
/// Returns None for empty values, data URIs, and anything that does not
/// resolve to http(s).
fn resolve_reference(raw: &str, base: &Url) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with("data:") || raw.starts_with("javascript:") || raw.starts_with("about:") {
        return None;
    }

    let resolved = base.join(raw).ok()?;
    if resolved.scheme() == "http" || resolved.scheme() == "https" {
        Some(resolved)
    } else {
        None
    }
}

/// Derives a deterministic local filename from the URL and kind
///
/// A short hash of the full URL prefixes the sanitized path basename, so
/// same-named assets from different paths or hosts never collide.
fn derive_local_name(url: &Url, kind: AssetKind) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    let digest = hex::encode(hasher.finalize());
    let prefix = &digest[..10];

    let basename = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or("asset");
    let mut safe: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(80)
        .collect();
    if safe.is_empty() {
        safe = "asset".to_string();
    }

    // Give extension-less stylesheet/script URLs a usable extension
    if !safe.contains('.') {
        match kind {
            AssetKind::Stylesheet => safe.push_str(".css"),
            AssetKind::Script => safe.push_str(".js"),
            AssetKind::Image => {}
        }
    }

    format!("{}-{}", prefix, safe)
}
