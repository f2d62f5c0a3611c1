//! PagePress: a polite single-page web capturer
//!
//! This crate fetches one web page (directly or via a scripting-capable
//! rendering engine), optionally retrieves its static assets, rewrites asset
//! references to local paths, and writes the result to an output directory
//! as a self-contained offline capture. It respects robots.txt and applies
//! a per-host rate limit.

pub mod capture;
pub mod config;
pub mod limiter;
pub mod output;
pub mod policy;
pub mod server;

use thiserror::Error;

/// Main error type for PagePress operations
///
/// A capture terminates with exactly one of these; per-asset failures are
/// collected in the [`CaptureResult`](capture::CaptureResult) instead of
/// being raised through this type.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetching {url} denied by site policy ({reason})")]
    PolicyDenied {
        url: String,
        reason: policy::PolicyReason,
    },

    #[error("Failed to fetch page {url}: {source}")]
    PageFetch { url: String, source: FetchError },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// The pipeline stage this error terminated in.
    pub fn stage(&self) -> capture::CaptureStage {
        match self {
            CaptureError::Config(_) => capture::CaptureStage::Idle,
            CaptureError::PolicyDenied { .. } => capture::CaptureStage::PolicyCheck,
            CaptureError::PageFetch { .. } => capture::CaptureStage::FetchingPage,
            CaptureError::UrlParse(_) => capture::CaptureStage::Idle,
            CaptureError::Io(_) => capture::CaptureStage::Materializing,
        }
    }
}

/// Classified fetch failure for a single request
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timeout")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP error {0}")]
    Http(u16),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("render driver error: {0}")]
    Driver(String),

    #[error("{0}")]
    Other(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for PagePress operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use capture::{run_capture, CaptureRequest, CaptureResult, CaptureStage, CaptureStatus};
pub use config::CaptureConfig;
pub use policy::{PolicyChecker, PolicyDecision, PolicyReason};
