//! Materialization
//!
//! Rewrites saved asset references to local relative paths and writes the
//! document plus its assets under the output directory. This is the only
//! module that touches the filesystem, and it runs last: earlier failures
//! leave the output directory untouched. Re-running a capture into the
//! same directory overwrites files in place.

use crate::capture::{AssetOutcome, AssetReference, AssetStatus, CaptureResult, CaptureStatus};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Subdirectory holding retrieved assets, relative to the output directory
pub const ASSETS_DIR: &str = "assets";

/// Rewrites asset references in the document to local relative paths
///
/// Each replacement pair is (attribute value as written, local relative
/// path). Only quoted attribute-value occurrences are replaced, so a URL
/// that also appears in visible text stays intact.
pub fn rewrite_document(html: &str, replacements: &[(String, String)]) -> String {
    let mut out = html.to_string();
    for (found_as, local) in replacements {
        out = out.replace(
            &format!("\"{}\"", found_as),
            &format!("\"{}\"", local),
        );
        out = out.replace(&format!("'{}'", found_as), &format!("'{}'", local));
    }
    out
}

/// Derives the document filename from the page URL
///
/// `https://example.com:8443/docs/intro` becomes
/// `example.com_8443_docs_intro.html`; a bare origin becomes
/// `example.com_index.html`.
pub fn document_filename(page_url: &Url) -> String {
    let host = page_url.host_str().unwrap_or("page");
    let mut name = sanitize(host);
    if let Some(port) = page_url.port() {
        name.push_str(&format!("_{}", port));
    }

    let path = page_url.path().trim_matches('/');
    if path.is_empty() {
        name.push_str("_index");
    } else {
        name.push('_');
        name.push_str(&sanitize(path));
    }

    // Keep a real document extension if the path carried one
    let has_extension = path
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.contains('.'));
    if !has_extension {
        name.push_str(".html");
    }
    name
}

fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Writes the rewritten document and every fetched asset to disk
///
/// Saved references point at their local copies; failed and skipped
/// references are rewritten to their resolved absolute URLs so the saved
/// page still loads them online instead of resolving a relative path
/// against the local filesystem.
///
/// The output directory (and its assets subdirectory, when needed) is
/// created here and nowhere earlier. The result is partial when any asset
/// retrieval failed; skipped assets do not degrade the status.
pub fn materialize(
    html: &str,
    page_url: &Url,
    refs: Vec<AssetReference>,
    outcomes: Vec<AssetOutcome>,
    output_dir: &Path,
) -> std::io::Result<CaptureResult> {
    debug_assert_eq!(refs.len(), outcomes.len());

    let mut replacements = Vec::new();
    let mut assets = Vec::with_capacity(refs.len());
    let mut bodies: Vec<(PathBuf, Vec<u8>)> = Vec::new();

    for (reference, outcome) in refs.into_iter().zip(outcomes) {
        let status = match outcome {
            AssetOutcome::Fetched(body) => {
                let local = PathBuf::from(ASSETS_DIR).join(&reference.local_name);
                replacements.push((
                    reference.found_as.clone(),
                    format!("{}/{}", ASSETS_DIR, reference.local_name),
                ));
                bodies.push((local.clone(), body));
                AssetStatus::Saved(local)
            }
            AssetOutcome::Failed(e) => AssetStatus::Failed(e),
            AssetOutcome::Skipped => AssetStatus::Skipped,
        };
        if !matches!(status, AssetStatus::Saved(_)) && reference.found_as != reference.url.as_str()
        {
            replacements.push((reference.found_as.clone(), reference.url.to_string()));
        }
        assets.push((reference, status));
    }

    let rewritten = rewrite_document(html, &replacements);

    fs::create_dir_all(output_dir)?;
    if !bodies.is_empty() {
        fs::create_dir_all(output_dir.join(ASSETS_DIR))?;
    }

    let document_path = output_dir.join(document_filename(page_url));
    fs::write(&document_path, rewritten.as_bytes())?;
    tracing::debug!("Wrote document to {}", document_path.display());

    for (local, body) in bodies {
        fs::write(output_dir.join(&local), &body)?;
    }

    let status = if assets
        .iter()
        .any(|(_, s)| matches!(s, AssetStatus::Failed(_)))
    {
        CaptureStatus::Partial
    } else {
        CaptureStatus::Complete
    };

    Ok(CaptureResult {
        document_path,
        assets,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::extract_assets;
    use crate::FetchError;
    use tempfile::TempDir;

    fn page_url() -> Url {
        Url::parse("https://example.com/articles/page").unwrap()
    }

    #[test]
    fn test_rewrite_replaces_quoted_occurrences() {
        let html = r#"<img src="/logo.png"> and <img src='/logo.png'>"#;
        let out = rewrite_document(
            html,
            &[("/logo.png".to_string(), "assets/ab12-logo.png".to_string())],
        );
        assert_eq!(
            out,
            r#"<img src="assets/ab12-logo.png"> and <img src='assets/ab12-logo.png'>"#
        );
    }

    #[test]
    fn test_rewrite_leaves_unquoted_text_alone() {
        let html = r#"<p>see /logo.png</p><img src="/logo.png">"#;
        let out = rewrite_document(
            html,
            &[("/logo.png".to_string(), "assets/x.png".to_string())],
        );
        assert!(out.contains("see /logo.png"));
        assert!(out.contains(r#"src="assets/x.png""#));
    }

    #[test]
    fn test_document_filename_with_path() {
        let url = Url::parse("https://example.com/docs/intro").unwrap();
        assert_eq!(document_filename(&url), "example.com_docs_intro.html");
    }

    #[test]
    fn test_document_filename_bare_origin() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(document_filename(&url), "example.com_index.html");
    }

    #[test]
    fn test_document_filename_includes_port() {
        let url = Url::parse("http://127.0.0.1:8080/a/b").unwrap();
        assert_eq!(document_filename(&url), "127.0.0.1_8080_a_b.html");
    }

    #[test]
    fn test_document_filename_keeps_existing_extension() {
        let url = Url::parse("https://example.com/page.html").unwrap();
        assert_eq!(document_filename(&url), "example.com_page.html");
    }

    #[test]
    fn test_materialize_writes_document_and_assets() {
        let dir = TempDir::new().unwrap();
        let html = r#"<img src="/logo.png">"#;
        let refs = extract_assets(html, &page_url());
        let outcomes = vec![AssetOutcome::Fetched(b"PNGDATA".to_vec())];

        let result =
            materialize(html, &page_url(), refs, outcomes, dir.path()).unwrap();

        assert_eq!(result.status, CaptureStatus::Complete);
        assert!(result.document_path.exists());
        let doc = fs::read_to_string(&result.document_path).unwrap();
        assert!(doc.contains("assets/"));
        assert!(!doc.contains(r#"src="/logo.png""#));

        let (_, status) = &result.assets[0];
        let AssetStatus::Saved(local) = status else {
            panic!("expected saved asset");
        };
        assert_eq!(fs::read(dir.path().join(local)).unwrap(), b"PNGDATA");
    }

    #[test]
    fn test_materialize_failed_asset_points_at_absolute_url() {
        let dir = TempDir::new().unwrap();
        let html = r#"<img src="/a.png"><img src="/b.png">"#;
        let refs = extract_assets(html, &page_url());
        let outcomes = vec![
            AssetOutcome::Fetched(b"A".to_vec()),
            AssetOutcome::Failed(FetchError::Http(404)),
        ];

        let result =
            materialize(html, &page_url(), refs, outcomes, dir.path()).unwrap();

        assert_eq!(result.status, CaptureStatus::Partial);
        let doc = fs::read_to_string(&result.document_path).unwrap();
        // The failed reference must resolve online, not against local disk
        assert!(doc.contains(r#"src="https://example.com/b.png""#));
        assert!(!doc.contains(r#"src="/b.png""#));
        assert!(!doc.contains(r#"src="/a.png""#));
    }

    #[test]
    fn test_materialize_skipped_asset_does_not_degrade_status() {
        let dir = TempDir::new().unwrap();
        let html = r#"<img src="/a.png">"#;
        let refs = extract_assets(html, &page_url());
        let outcomes = vec![AssetOutcome::Skipped];

        let result =
            materialize(html, &page_url(), refs, outcomes, dir.path()).unwrap();
        assert_eq!(result.status, CaptureStatus::Complete);
        assert!(!dir.path().join(ASSETS_DIR).exists());
        let doc = fs::read_to_string(&result.document_path).unwrap();
        assert!(doc.contains(r#"src="https://example.com/a.png""#));
    }

    #[test]
    fn test_materialize_absolute_failed_reference_left_as_is() {
        let dir = TempDir::new().unwrap();
        let html = r#"<img src="https://cdn.example.net/pic.jpg">"#;
        let refs = extract_assets(html, &page_url());
        let outcomes = vec![AssetOutcome::Failed(FetchError::Timeout)];

        let result =
            materialize(html, &page_url(), refs, outcomes, dir.path()).unwrap();
        let doc = fs::read_to_string(&result.document_path).unwrap();
        assert!(doc.contains(r#"src="https://cdn.example.net/pic.jpg""#));
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let html = r#"<img src="/logo.png">"#;

        for _ in 0..2 {
            let refs = extract_assets(html, &page_url());
            let outcomes = vec![AssetOutcome::Fetched(b"PNGDATA".to_vec())];
            let result =
                materialize(html, &page_url(), refs, outcomes, dir.path()).unwrap();
            assert_eq!(result.status, CaptureStatus::Complete);
        }
    }
}
