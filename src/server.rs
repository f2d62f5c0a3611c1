//! HTTP capture service
//!
//! Exposes the capture pipeline over HTTP: POST a target URL, get back a
//! zip archive of the captured page and its assets. Captures run into a
//! temporary directory that is dropped once the archive is built.
//!
//! Requests naming hosts that resolve to loopback, private, or link-local
//! addresses are refused so the service cannot be used to probe the
//! network it runs on.

use crate::capture::{run_capture, CaptureRequest};
use crate::config::CaptureConfig;
use crate::CaptureError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use std::io::{Cursor, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use url::Url;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Request body for POST /capture
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CaptureParams {
    /// Target page, with or without a scheme
    pub url: String,
    #[serde(default)]
    pub render: bool,
    #[serde(default = "default_true")]
    pub save_assets: bool,
    #[serde(default = "default_true")]
    pub respect_policy: bool,
    #[serde(default)]
    pub max_assets: Option<usize>,
}

fn default_true() -> bool {
    true
}

pub fn router() -> Router {
    Router::new().route("/capture", post(capture_handler))
}

/// Binds and serves the capture API until the process exits
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Capture service listening on {}", addr);
    axum::serve(listener, router()).await
}

async fn capture_handler(Json(params): Json<CaptureParams>) -> Response {
    let candidate = if params.url.contains("://") {
        params.url.clone()
    } else {
        format!("https://{}", params.url)
    };
    let url = match Url::parse(&candidate) {
        Ok(url) => url,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid url: {}", e)),
    };
    let Some(host) = url.host_str() else {
        return error_response(StatusCode::BAD_REQUEST, "url has no host".to_string());
    };

    if let Err(reason) = ensure_public_host(host, url.port_or_known_default().unwrap_or(443)).await
    {
        tracing::warn!("Refusing capture of {}: {}", host, reason);
        return error_response(StatusCode::BAD_REQUEST, reason);
    }

    let workdir = match tempfile::TempDir::new() {
        Ok(dir) => dir,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("workspace creation failed: {}", e),
            )
        }
    };

    let request = CaptureRequest {
        url: url.to_string(),
        output_dir: workdir.path().to_path_buf(),
        config: CaptureConfig {
            render: params.render,
            save_assets: params.save_assets,
            respect_policy: params.respect_policy,
            max_assets: params.max_assets,
            ..CaptureConfig::default()
        },
    };

    match run_capture(request).await {
        Ok(result) => {
            tracing::info!(
                "Captured {} ({} asset(s) saved)",
                url,
                result.saved_count()
            );
            match zip_directory(workdir.path()) {
                Ok(archive) => zip_response(archive),
                Err(e) => error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("archive creation failed: {}", e),
                ),
            }
        }
        Err(e) => {
            let status = match &e {
                CaptureError::PolicyDenied { .. } => StatusCode::FORBIDDEN,
                CaptureError::Config(_) | CaptureError::UrlParse(_) => StatusCode::BAD_REQUEST,
                CaptureError::PageFetch { .. } => StatusCode::BAD_GATEWAY,
                CaptureError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn zip_response(archive: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"capture.zip\"".to_string(),
            ),
        ],
        archive,
    )
        .into_response()
}

/// Refuses hosts that resolve to any non-public address
async fn ensure_public_host(host: &str, port: u16) -> Result<(), String> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| format!("host does not resolve: {}", e))?;

    let mut any = false;
    for addr in addrs {
        any = true;
        if !is_public(addr.ip()) {
            return Err(format!(
                "host resolves to non-public address {}",
                addr.ip()
            ));
        }
    }
    if !any {
        return Err("host does not resolve".to_string());
    }
    Ok(())
}

fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            let unique_local = (segments[0] & 0xfe00) == 0xfc00;
            let link_local = (segments[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

/// Zips the capture output directory (document plus assets subdirectory)
fn zip_directory(dir: &Path) -> zip::result::ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    add_dir(&mut writer, dir, Path::new(""), options)?;

    Ok(writer.finish()?.into_inner())
}

fn add_dir(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    dir: &Path,
    prefix: &Path,
    options: FileOptions,
) -> zip::result::ZipResult<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = prefix.join(entry.file_name());
        let name = relative.to_string_lossy().replace('\\', "/");
        if path.is_dir() {
            writer.add_directory(format!("{}/", name), options)?;
            add_dir(writer, &path, &relative, options)?;
        } else {
            writer.start_file(name, options)?;
            writer.write_all(&std::fs::read(&path)?)?;
        }
    }
    Ok(())
}
