use serde::Deserialize;

/// Capture behavior configuration
///
/// Every field has a default so a config file (or CLI invocation) only needs
/// to name what it changes. Immutable once a capture starts.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Use the rendering engine instead of a direct fetch
    #[serde(default)]
    pub render: bool,

    /// Fetch referenced images, stylesheets, and scripts
    #[serde(rename = "save-assets", default)]
    pub save_assets: bool,

    /// Honor the target site's robots.txt (recommended)
    #[serde(rename = "respect-policy", default = "default_true")]
    pub respect_policy: bool,

    /// Optional HTTP/HTTPS proxy endpoint for static fetches
    #[serde(default)]
    pub proxy: Option<String>,

    /// User-agent string sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Overall capture budget (seconds)
    #[serde(rename = "overall-timeout-secs", default = "default_overall_timeout")]
    pub overall_timeout_secs: u64,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "rate-limit-ms", default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Cap on the number of assets fetched; references beyond the cap are
    /// recorded as skipped
    #[serde(rename = "max-assets", default)]
    pub max_assets: Option<usize>,

    /// Number of concurrent asset fetch workers
    #[serde(rename = "asset-concurrency", default = "default_asset_concurrency")]
    pub asset_concurrency: usize,

    /// WebDriver endpoint used by rendered mode
    #[serde(rename = "render-endpoint", default = "default_render_endpoint")]
    pub render_endpoint: String,

    /// Quiescence signal for rendered mode
    #[serde(rename = "render-settle", default)]
    pub render_settle: RenderSettle,
}

/// How long rendered mode waits for page scripts to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum RenderSettle {
    /// Poll the driver until `document.readyState` is complete, then apply
    /// a short grace period
    NetworkIdle,
    /// Sleep a fixed duration after navigation
    Fixed { ms: u64 },
}

impl Default for RenderSettle {
    fn default() -> Self {
        RenderSettle::NetworkIdle
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            render: false,
            save_assets: false,
            respect_policy: true,
            proxy: None,
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            overall_timeout_secs: default_overall_timeout(),
            rate_limit_ms: default_rate_limit(),
            max_assets: None,
            asset_concurrency: default_asset_concurrency(),
            render_endpoint: default_render_endpoint(),
            render_settle: RenderSettle::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("pagepress/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_overall_timeout() -> u64 {
    120
}

fn default_rate_limit() -> u64 {
    500
}

fn default_asset_concurrency() -> usize {
    4
}

fn default_render_endpoint() -> String {
    "http://localhost:4444".to_string()
}
